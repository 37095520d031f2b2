//! Filter intermediate representation for the DPF classifier.
//!
//! A filter is a short straight-line program over the bytes of a message:
//!
//! - **Equality steps** load 8, 16 or 32 bits at an offset from the current
//!   base pointer, apply a mask, and compare against a constant.
//! - **Shift steps** load a field the same way and advance the base pointer
//!   by `(field & mask) << amount`, which is how variable-length headers
//!   (IP options, for instance) are skipped.
//!
//! Programs are assembled with [`ProgramBuilder`], which folds constant base
//! adjustments ([`ProgramBuilder::shifti`]) into the offsets of later steps and
//! annotates every step with its level and an alignment hint.
//!
//! # Crate Dependencies
//!
//! `dpf_ir` has no knowledge of the trie. The `dpf` crate consumes
//! [`Program`]s, validates them with [`Program::validate`], and merges them
//! into its shared discrimination structure.

mod builder;
mod coalesce;
mod program;
mod step;

pub use builder::ProgramBuilder;
pub use coalesce::coalesce;
pub use program::{BogusReason, Program, ProgramError};
pub use step::{Shape, Step, StepKind, Width};

/// Maximum number of steps in one filter program.
pub const MAX_STEPS: usize = 64;

/// Alignment (in bytes) assumed for the start of every message.
///
/// Alignment hints on steps are derived from this value and from the shift
/// amounts applied before each step.
pub const MESSAGE_ALIGN: u32 = 8;
