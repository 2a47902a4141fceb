//! Error handling
//!
//! Failures are split into two disjoint channels:
//!
//! * [`SimError::Input`]: invalid or inconsistent caller input, tagged with
//!   the configuration section it came from.  No replicate state has been
//!   touched; fixing the input and retrying is always safe.
//! * everything else: library-side failures (allocator exhaustion, table
//!   inconsistencies, violated invariants).  These terminate the current
//!   replicate; the simulator is safe to drop but must be
//!   [`reset`](crate::Simulator::reset) before reuse.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SimError {
    /// Invalid caller input, reported with the configuration section name.
    #[error("Input error in {section}: {message}")]
    Input { section: String, message: String },
    /// A block pool reached its configured cap.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// Array or id access out of range.
    #[error("Invalid index")]
    IndexError,
    /// Used when a value conversion fails.
    #[error("range error: {0}")]
    RangeError(String),
    /// The simulator was driven while in a state that does not permit it,
    /// e.g. running a replicate that previously failed without a reset.
    #[error("bad simulator state: {0}")]
    BadState(String),
    /// A table-collection inconsistency, bubbled verbatim.
    #[error("tables error: {0}")]
    Tables(String),
    /// Used when bad input is encountered outside any named
    /// configuration section.
    #[error("we received {got} but expected {expected}")]
    ValueError { got: String, expected: String },
}

impl SimError {
    /// `true` for the caller-recoverable input channel.
    pub fn is_input_error(&self) -> bool {
        matches!(self, SimError::Input { .. })
    }
}

/// Why [`Simulator::run`](crate::Simulator::run) returned.
///
/// These are the positive exit statuses of the event loop; errors travel
/// separately through [`SimError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// A single most recent common ancestor was found across the whole
    /// sequence interval.
    Coalesced,
    /// The event budget for this call was exhausted; call
    /// [`run`](crate::Simulator::run) again to continue.
    MaxEvents,
    /// The simulation clock reached `end_time` with uncoalesced material
    /// remaining.
    MaxTime,
}

impl ExitStatus {
    /// `true` when every interval of the sequence found its MRCA.
    pub fn coalesced(&self) -> bool {
        matches!(self, ExitStatus::Coalesced)
    }
}
