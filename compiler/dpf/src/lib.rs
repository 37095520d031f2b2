//! Dynamic packet filter classifier.
//!
//! Many independently submitted filters, each a short [`dpf_ir::Program`] of
//! masked equality tests and header-length shifts, are merged into one
//! discrimination trie. Filters with a common prefix share its atoms, and
//! wide branch points on a single field are served by a hash table, so
//! classifying a message costs time proportional to the bytes that tell the
//! filters apart rather than to the number of filters.
//!
//! # Architecture
//!
//! ```text
//! ProgramBuilder ──▶ Classifier::insert ──▶ Trie::merge ──▶ dirty atoms
//!                                                               │
//! message bytes ──▶ Classifier::dispatch ◀── Dispatcher ◀── regenerate
//! ```
//!
//! - [`pid`]: bounded filter handle allocation.
//! - `trie`: the atom arena with merge (insert) and unmerge (delete).
//! - `hash`: hash tables for wide equality branch points.
//! - `dispatch`: per-atom code blocks and the matcher that runs them.
//! - `diagnostics`: invariant checking behind
//!   [`Classifier::check_consistency`].
//!
//! # Tracing
//!
//! Set `RUST_LOG=dpf=debug` (or `trace`) and call [`init_tracing`] to see
//! inserts, deletes, hash promotions and code regeneration.

mod classifier;
mod config;
mod diagnostics;
mod dispatch;
mod dump;
mod error;
mod hash;
pub mod pid;
mod sync;
mod trie;

pub use classifier::Classifier;
pub use config::{DpfConfig, RebuildPolicy};
pub use diagnostics::Violation;
pub use error::{DeleteError, InsertError};
pub use pid::{FilterId, PidAllocator};
pub use sync::SharedClassifier;
pub use trie::AtomId;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize the tracing subscriber for debug output.
///
/// Call this early (e.g. in `main()` or at the start of a test) to enable
/// tracing output controlled by the `RUST_LOG` environment variable. Safe to
/// call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
