//! Execution state machine and control-operation outcome values.

use std::fmt;

use crate::breakpoint::Breakpoint;
use crate::registers::CpuState;
use crate::DebugError;

/// Externally observable state of one [`crate::ExecutionController`].
///
/// Transitions: `Stopped`/`Paused` enter `Running` for the duration of a
/// step or run operation and settle back in `Paused`; a backend failure
/// lands in `Error`; `Reset` returns `Stopped`/`Paused`/`Error` to
/// `Stopped`. Every transition is published as a
/// [`crate::DebugEvent::StateChanged`] pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionState {
    /// No execution has happened since construction or the last reset.
    #[default]
    Stopped,
    /// A step or run operation is in flight.
    Running,
    /// Execution is suspended at an instruction boundary.
    Paused,
    /// The backend failed; only a reset leaves this state.
    Error,
}

impl ExecutionState {
    /// Returns the lower-case display name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    /// Returns `true` when a step or run operation may start from this
    /// state.
    #[must_use]
    pub const fn is_steppable(self) -> bool {
        matches!(self, Self::Stopped | Self::Paused)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step-into or step-over operation.
///
/// Failures are reported here rather than raised past the controller
/// boundary, so presentation layers can render the message without
/// exception scaffolding around every call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StepResult {
    /// Program counter before the operation.
    pub start_address: u32,
    /// Program counter after the operation; `None` on failure.
    pub end_address: Option<u32>,
    /// Register snapshot after the operation; `None` on failure.
    pub registers: Option<CpuState>,
    /// Failure classification; `None` on success.
    pub error: Option<DebugError>,
}

impl StepResult {
    /// Builds the outcome of a completed step.
    #[must_use]
    pub fn success(start_address: u32, end_address: u32, registers: CpuState) -> Self {
        Self {
            start_address,
            end_address: Some(end_address),
            registers: Some(registers),
            error: None,
        }
    }

    /// Builds the outcome of a failed step.
    #[must_use]
    pub fn failure(start_address: u32, error: DebugError) -> Self {
        Self {
            start_address,
            end_address: None,
            registers: None,
            error: Some(error),
        }
    }

    /// Returns `true` when the operation completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// An enabled breakpoint matched; carries the matched breakpoint with
    /// its updated hit count.
    Breakpoint(Breakpoint),
    /// The instruction ceiling was reached without a breakpoint match; a
    /// safety valve, not an error.
    MaxInstructionsReached,
    /// A cooperative stop or pause request was honored at an instruction
    /// boundary.
    Interrupted,
    /// The operation failed; carries the failure classification.
    Exception(DebugError),
}

/// Outcome of one run operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunResult {
    /// Why the loop returned.
    pub stop_reason: StopReason,
    /// Instructions executed by this call.
    pub instructions_executed: u64,
    /// Program counter where the loop stopped.
    pub end_address: u32,
    /// Register snapshot at the stop point; `None` on failure.
    pub registers: Option<CpuState>,
}

impl RunResult {
    /// Returns `true` when the loop ended without a failure.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.stop_reason, StopReason::Exception(_))
    }
}
