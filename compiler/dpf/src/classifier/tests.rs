#![allow(clippy::unwrap_used, reason = "tests unwrap freely")]

use dpf_ir::{BogusReason, ProgramBuilder, Step, Width};
use pretty_assertions::assert_eq;

use super::*;

fn ip_proto(proto: u32) -> Program {
    ProgramBuilder::new().eq16(12, 0x0800).eq8(23, proto).finish()
}

fn frame(proto: u8) -> Vec<u8> {
    let mut frame = vec![0; 64];
    frame[12] = 0x08;
    frame[23] = proto;
    frame
}

fn assert_consistent(dpf: &Classifier) {
    assert_eq!(dpf.check_consistency(), Ok(()));
}

// ── Insert validation ──

#[test]
fn empty_program_is_rejected() {
    let mut dpf = Classifier::new();
    assert_eq!(dpf.insert(&Program::default()), Err(InsertError::NilFilter));
    assert_eq!(dpf.atom_count(), 0);
}

#[test]
fn long_program_is_rejected() {
    let mut dpf = Classifier::with_config(DpfConfig::default().with_max_elems(2));
    let program = ProgramBuilder::new().eq8(0, 1).eq8(1, 2).eq8(2, 3).finish();
    assert_eq!(
        dpf.insert(&program),
        Err(InsertError::TooManyElems { len: 3, max: 2 })
    );
    assert_eq!(dpf.pids_in_use(), 1);
}

#[test]
fn malformed_step_is_rejected() {
    let mut dpf = Classifier::new();
    let program = Program::from_steps(vec![
        Step::equality(12, Width::W16, 0xFFFF, 0x0800),
        Step::equality(23, Width::W8, 0x1FF, 17),
    ]);
    assert_eq!(
        dpf.insert(&program),
        Err(InsertError::BogusOp {
            level: 1,
            reason: BogusReason::MaskExceedsWidth {
                mask: 0x1FF,
                width: Width::W8,
            },
        })
    );
    assert_eq!(dpf.atom_count(), 0);
    assert_consistent(&dpf);
}

#[test]
fn handle_exhaustion() {
    let mut dpf = Classifier::with_config(DpfConfig::default().with_max_filters(3));
    assert_eq!(dpf.insert(&ip_proto(17)), Ok(FilterId::new(1)));
    assert_eq!(dpf.insert(&ip_proto(6)), Ok(FilterId::new(2)));
    assert_eq!(
        dpf.insert(&ip_proto(1)),
        Err(InsertError::TooManyFilters { capacity: 3 })
    );
    assert_eq!(dpf.atom_count(), 3);
    assert_consistent(&dpf);

    dpf.delete(FilterId::new(1)).unwrap();
    assert_eq!(dpf.insert(&ip_proto(1)), Ok(FilterId::new(1)));
}

#[test]
fn overlap_releases_the_new_handle() {
    let mut dpf = Classifier::new();
    let udp = dpf.insert(&ip_proto(17)).unwrap();
    assert_eq!(
        dpf.insert(&ip_proto(17)),
        Err(InsertError::Overlap { existing: udp })
    );
    assert_eq!(dpf.pids_in_use(), 2);
    assert_eq!(dpf.insert(&ip_proto(6)), Ok(FilterId::new(2)));
    assert_consistent(&dpf);
}

#[test]
fn raised_program_limit_is_capped() {
    let mut dpf = Classifier::with_config(DpfConfig::default().with_max_elems(20_001));
    assert_eq!(dpf.config().max_elems, dpf_ir::MAX_STEPS);

    let steps = |last| {
        let mut steps = vec![Step::equality(0, Width::W8, 0xFF, 0); dpf_ir::MAX_STEPS - 1];
        steps.push(Step::equality(1, Width::W8, 0xFF, last));
        steps
    };
    let mut too_long = steps(1);
    too_long.push(Step::equality(2, Width::W8, 0xFF, 0));
    assert_eq!(
        dpf.insert(&Program::from_steps(too_long)),
        Err(InsertError::TooManyElems {
            len: dpf_ir::MAX_STEPS + 1,
            max: dpf_ir::MAX_STEPS,
        })
    );

    let one = dpf.insert(&Program::from_steps(steps(1))).unwrap();
    let two = dpf.insert(&Program::from_steps(steps(2))).unwrap();
    assert_eq!(dpf.dispatch(&[0, 1]), Some(one));
    assert_eq!(dpf.dispatch(&[0, 2]), Some(two));
    assert_consistent(&dpf);
}

// ── Priority ──

#[test]
fn more_specific_first_test_beats_a_longer_filter() {
    let mut dpf = Classifier::new();
    let byte = dpf.insert(&ProgramBuilder::new().eq8(0, 0x45).finish()).unwrap();
    let nibble = dpf
        .insert(&ProgramBuilder::new().meq8(0, 0xF0, 0x40).eq8(1, 1).finish())
        .unwrap();
    assert_eq!(dpf.dispatch(&[0x45, 1]), Some(byte));
    assert_eq!(dpf.dispatch(&[0x46, 1]), Some(nibble));
}

#[test]
fn promotion_does_not_change_existing_results() {
    for rebuild in [RebuildPolicy::Full, RebuildPolicy::Incremental] {
        let mut dpf = Classifier::with_config(DpfConfig::default().with_rebuild(rebuild));
        let at12 = |value| ProgramBuilder::new().eq16(12, value).finish();
        dpf.insert(&at12(1)).unwrap();
        dpf.insert(&ProgramBuilder::new().eq16(14, 5).finish()).unwrap();
        dpf.insert(&at12(2)).unwrap();
        let three = dpf.insert(&at12(3)).unwrap();

        let mut msg = [0u8; 16];
        msg[12..14].copy_from_slice(&3u16.to_be_bytes());
        msg[14..16].copy_from_slice(&5u16.to_be_bytes());
        let before = dpf.dispatch(&msg);
        assert_eq!(before, Some(three));

        let four = dpf.insert(&at12(4)).unwrap();
        assert!(dpf.dump().contains("hash16 [12]"));
        assert_eq!(dpf.dispatch(&msg), before);

        dpf.delete(four).unwrap();
        dpf.delete(FilterId::new(1)).unwrap();
        dpf.delete(FilterId::new(3)).unwrap();
        assert!(!dpf.dump().contains("hash16"));
        assert_eq!(dpf.dispatch(&msg), before);
        assert_consistent(&dpf);
    }
}

// ── Delete ──

#[test]
fn delete_unknown_handle() {
    let mut dpf = Classifier::new();
    assert_eq!(
        dpf.delete(FilterId::new(5)),
        Err(DeleteError::BogusId(FilterId::new(5)))
    );
    assert_eq!(
        dpf.delete(FilterId::ROOT),
        Err(DeleteError::BogusId(FilterId::ROOT))
    );

    let udp = dpf.insert(&ip_proto(17)).unwrap();
    assert_eq!(dpf.delete(udp), Ok(udp));
    assert_eq!(dpf.delete(udp), Err(DeleteError::BogusId(udp)));
}

#[test]
fn delete_under_both_rebuild_policies() {
    for rebuild in [RebuildPolicy::Full, RebuildPolicy::Incremental] {
        let mut dpf = Classifier::with_config(DpfConfig::default().with_rebuild(rebuild));
        let handles: Vec<_> = [17, 6, 1, 2, 50]
            .into_iter()
            .map(|proto| dpf.insert(&ip_proto(proto)).unwrap())
            .collect();
        assert_consistent(&dpf);

        for &pid in &handles[..4] {
            dpf.delete(pid).unwrap();
            assert_consistent(&dpf);
        }
        assert_eq!(dpf.dispatch(&frame(50)), Some(handles[4]));
        assert_eq!(dpf.dispatch(&frame(17)), None);
        assert_eq!(dpf.atom_count(), 2);
    }
}

#[test]
fn batch_dispatch_keeps_input_order() {
    let mut dpf = Classifier::new();
    let udp = dpf.insert(&ip_proto(17)).unwrap();
    let tcp = dpf.insert(&ip_proto(6)).unwrap();
    let frames: Vec<Vec<u8>> = [6, 1, 17, 6].into_iter().map(frame).collect();
    assert_eq!(
        dpf.dispatch_batch(&frames),
        vec![Some(tcp), None, Some(udp), Some(tcp)]
    );
    let empty: &[&[u8]] = &[];
    assert_eq!(dpf.dispatch_batch(empty), vec![]);
}

// ── Introspection ──

#[test]
fn path_refcnts_follow_sharing() {
    let mut dpf = Classifier::new();
    let udp = dpf.insert(&ip_proto(17)).unwrap();
    let tcp = dpf.insert(&ip_proto(6)).unwrap();
    assert_eq!(dpf.path_refcnts(udp), Some(vec![2, 1]));
    assert_eq!(dpf.path_refcnts(tcp), Some(vec![2, 1]));

    dpf.delete(tcp).unwrap();
    assert_eq!(dpf.path_refcnts(udp), Some(vec![1, 1]));
    assert_eq!(dpf.path_refcnts(tcp), None);
}

#[test]
fn path_refcnts_skip_hashed_atoms() {
    let mut dpf = Classifier::new();
    let handles: Vec<_> = [17, 6, 1, 2]
        .into_iter()
        .map(|proto| dpf.insert(&ip_proto(proto)).unwrap())
        .collect();
    assert_eq!(dpf.path_refcnts(handles[0]), Some(vec![4, 1]));
}

#[test]
fn counts_and_membership() {
    let mut dpf = Classifier::new();
    assert_eq!(dpf.active_filters(), 0);
    assert_eq!(dpf.pids_in_use(), 1);
    let udp = dpf.insert(&ip_proto(17)).unwrap();
    assert!(dpf.contains(udp));
    assert!(!dpf.contains(FilterId::ROOT));
    assert_eq!(dpf.active_filters(), 1);
    assert_eq!(dpf.pids_in_use(), 2);
    assert_eq!(dpf.atom_count(), 2);
}

#[test]
fn dump_matches_the_trie() {
    let mut dpf = Classifier::new();
    dpf.insert(&ip_proto(17)).unwrap();
    assert_eq!(
        dpf.dump(),
        "\
a0 root refs=1
  a1 eq16 [12] & 0xffff == 0x800 refs=1
    a2 eq8 [23] & 0xff == 0x11 refs=1 pid=1
"
    );
}

#[test]
fn verbose_mode_does_not_change_results() {
    let mut dpf = Classifier::new();
    dpf.set_verbose(true);
    let udp = dpf.insert(&ip_proto(17)).unwrap();
    assert_eq!(dpf.dispatch(&frame(17)), Some(udp));
    dpf.delete(udp).unwrap();
    dpf.set_verbose(false);
    assert_eq!(dpf.dispatch(&frame(17)), None);
}

// ── Configuration ──

#[test]
fn config_is_normalized() {
    let dpf = Classifier::with_config(
        DpfConfig::default()
            .with_max_filters(0)
            .with_hash_threshold(0),
    );
    assert_eq!(dpf.config().max_filters, 2);
    assert_eq!(dpf.config().hash_threshold, 2);
}

#[test]
fn coalescing_merges_adjacent_bytes() {
    let mut dpf = Classifier::with_config(DpfConfig::default().with_coalesce(true));
    let bytes = ProgramBuilder::new().eq8(12, 0x08).eq8(13, 0x00).finish();
    let ip = dpf.insert(&bytes).unwrap();
    assert_eq!(dpf.atom_count(), 1);
    assert_eq!(
        dpf.insert(&ProgramBuilder::new().eq16(12, 0x0800).finish()),
        Err(InsertError::Overlap { existing: ip })
    );
    assert_eq!(dpf.dispatch(&frame(0)), Some(ip));
}

#[test]
fn low_hash_threshold_promotes_early() {
    let mut dpf = Classifier::with_config(DpfConfig::default().with_hash_threshold(2));
    dpf.insert(&ip_proto(17)).unwrap();
    dpf.insert(&ip_proto(6)).unwrap();
    assert_eq!(dpf.atom_count(), 4);
    assert!(dpf.dump().contains("hash8 [23]"));
    assert_consistent(&dpf);
}
