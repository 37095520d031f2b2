use super::*;

// Field loads

#[test]
fn load_is_big_endian() {
    let msg = [0x12, 0x34, 0x56, 0x78, 0x9A];
    assert_eq!(Width::W8.load(&msg, 1), Some(0x34));
    assert_eq!(Width::W16.load(&msg, 0), Some(0x1234));
    assert_eq!(Width::W32.load(&msg, 1), Some(0x3456_789A));
}

#[test]
fn load_past_end_fails() {
    let msg = [0u8; 4];
    assert_eq!(Width::W32.load(&msg, 1), None);
    assert_eq!(Width::W16.load(&msg, 3), None);
    assert_eq!(Width::W8.load(&msg, 4), None);
    assert_eq!(Width::W8.load(&msg, usize::MAX), None);
}

#[test]
fn width_fits_mask() {
    assert!(Width::W8.fits(0xFF));
    assert!(!Width::W8.fits(0x100));
    assert!(Width::W16.fits(0xF0F0));
    assert!(!Width::W16.fits(0x1_0000));
    assert!(Width::W32.fits(u32::MAX));
}

#[test]
fn shape_load_applies_mask_and_base() {
    let shape = Shape {
        offset: 1,
        width: Width::W8,
        mask: 0x0F,
    };
    let msg = [0x00, 0x00, 0x45];
    assert_eq!(shape.load(&msg, 1), Some(0x05));
    assert_eq!(shape.load(&msg, 2), None);
}

// Step semantics

#[test]
fn eq_step_passes_on_match_and_keeps_base() {
    let step = Step::equality(12, Width::W16, 0xFFFF, 0x0800);
    let mut msg = [0u8; 14];
    msg[12] = 0x08;
    assert_eq!(step.run(&msg, 0), Some(0));
    msg[13] = 0x06;
    assert_eq!(step.run(&msg, 0), None);
}

#[test]
fn shift_step_advances_base() {
    // IPv4 header length: low nibble counts 32-bit words.
    let step = Step::shift(0, Width::W8, 0x0F, 2);
    let msg = [0x45, 0, 0, 0];
    assert_eq!(step.run(&msg, 0), Some(20));
    assert_eq!(step.run(&msg, 2), Some(2));
}

#[test]
fn same_test_ignores_level_and_align() {
    let a = Step::equality(4, Width::W8, 0xFF, 7);
    let mut b = a;
    b.level = 3;
    b.align = 1;
    assert!(a.same_test(&b));

    let c = Step::equality(4, Width::W8, 0xFF, 8);
    assert!(!a.same_test(&c));

    let d = Step::shift(4, Width::W8, 0xFF, 0);
    assert!(!a.same_test(&d));
}

#[test]
fn specificity_counts_mask_bits() {
    assert_eq!(Step::equality(0, Width::W16, 0xFFFF, 1).specificity(), 16);
    assert_eq!(Step::equality(0, Width::W8, 0xF0, 0x10).specificity(), 4);
    assert_eq!(Step::shift(0, Width::W8, 0x0F, 2).specificity(), 0);
}

#[test]
fn display_renders_both_kinds() {
    let eq = Step::equality(12, Width::W16, 0xFFFF, 0x0800);
    assert_eq!(eq.to_string(), "eq16 [12] & 0xffff == 0x800");
    let shift = Step::shift(14, Width::W8, 0x0F, 2);
    assert_eq!(shift.to_string(), "shift8 [14] & 0xf << 2");
}
