use pretty_assertions::assert_eq;

use super::*;
use crate::step::StepKind;

#[test]
fn udp_filter_has_two_equality_steps() {
    let program = ProgramBuilder::new().eq16(12, 0x0800).eq8(23, 17).finish();
    assert_eq!(
        program.steps(),
        &[
            Step {
                level: 0,
                align: 4,
                ..Step::equality(12, Width::W16, 0xFFFF, 0x0800)
            },
            Step {
                level: 1,
                align: 1,
                ..Step::equality(23, Width::W8, 0xFF, 17)
            },
        ]
    );
}

#[test]
fn shifti_folds_into_every_later_offset() {
    let program = ProgramBuilder::new()
        .shifti(14)
        .eq8(9, 17)
        .shifti(6)
        .mshift8(0, 0x0F, 2)
        .eq16(2, 53)
        .finish();
    let offsets: Vec<u32> = program.steps().iter().map(|s| s.shape.offset).collect();
    assert_eq!(offsets, vec![23, 20, 22]);
}

#[test]
fn consecutive_shifti_collapse() {
    let a = ProgramBuilder::new().shifti(4).shifti(10).eq8(0, 1).finish();
    let b = ProgramBuilder::new().eq8(14, 1).finish();
    assert_eq!(a, b);
}

#[test]
fn finish_resets_the_builder() {
    let mut builder = ProgramBuilder::new();
    builder.shifti(3).eq8(0, 1);
    assert_eq!(builder.len(), 1);
    let first = builder.finish();
    assert!(builder.is_empty());
    let second = builder.eq8(0, 1).finish();
    assert_eq!(first.steps()[0].shape.offset, 3);
    assert_eq!(second.steps()[0].shape.offset, 0);
}

#[test]
fn empty_builder_yields_empty_program() {
    assert!(ProgramBuilder::new().finish().is_empty());
}

#[test]
fn masked_shift_records_amount() {
    let program = ProgramBuilder::new().mshift8(14, 0x0F, 2).finish();
    assert_eq!(program.steps()[0].kind, StepKind::Shift { amount: 2 });
    assert_eq!(program.steps()[0].shape.mask, 0x0F);
}

// Misuse is fatal

#[test]
#[should_panic(expected = "does not fit")]
fn mask_wider_than_field_panics() {
    ProgramBuilder::new().meq8(0, 0x100, 0);
}

#[test]
#[should_panic(expected = "outside mask")]
fn value_outside_mask_panics() {
    ProgramBuilder::new().meq16(0, 0x00FF, 0x0100);
}

#[test]
#[should_panic(expected = "not below 32")]
fn oversized_shift_panics() {
    ProgramBuilder::new().shift8(0, 32);
}

#[test]
#[should_panic(expected = "exceeds")]
fn too_many_steps_panics() {
    let mut builder = ProgramBuilder::new();
    for i in 0..=MAX_STEPS {
        builder.eq8(u32::try_from(i).unwrap_or(0), 0);
    }
}

#[test]
#[should_panic(expected = "overflows")]
fn pending_offset_overflow_panics() {
    ProgramBuilder::new().shifti(u32::MAX).shifti(1);
}
