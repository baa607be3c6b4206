//! Error module root.
//!
//! Errors fall into three classes:
//!
//! 1. **Programmer/config invariants** — an unknown command type reaching a
//!    state's transition table, or a `PER_RANK` queue asked to host a
//!    per-bank refresh. Fatal: the core aborts with file/line context via
//!    [`fatal`]. These indicate a bug or unsupported configuration, never a
//!    runtime data condition, so they are not `Result` values.
//! 2. **Capacity backpressure** — [`crate::queue::CommandQueue::add_command`]
//!    returns `false` when a queue is full; [`crate::queue::CommandQueue::get_command_to_issue`]
//!    returns `None` when nothing is ready. Normal flow control, not errors.
//! 3. **Mitigation over-subscription** — prevented by assertion
//!    ([`crate::bank::Bank::is_sampler_full`] must be consulted before a
//!    DRFM insertion); see [`config::ConfigError`] for the one recoverable
//!    error class this crate exposes (configuration parse/validation).

pub use crate::config::ConfigError;

/// Abort with file/line context on a programmer/config invariant violation.
/// These paths are unreachable under any valid configuration, so a panic
/// with location context is the correct response, not a `Result`.
#[track_caller]
pub fn fatal(message: &str) -> ! {
    let location = std::panic::Location::caller();
    panic!("dram_controller fatal error at {location}: {message}");
}
