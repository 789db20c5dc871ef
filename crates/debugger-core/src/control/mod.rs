//! Execution control: backend contract, state machine and stepping.

/// Execution backend collaborator contract.
pub mod backend;
/// Call-instruction classification for step-over.
pub mod classify;
/// Controller implementation.
pub mod controller;
/// Execution state and operation outcome values.
pub mod result;

pub use backend::{BackendError, ExecutionBackend};
pub use classify::{CallClassifier, FixedCallSites, FnCallClassifier, NoCalls};
pub use controller::{
    ControllerConfig, ExecutionController, DEFAULT_CALL_INSTRUCTION_WIDTH,
    DEFAULT_STEP_OVER_MAX_STEPS,
};
pub use result::{ExecutionState, RunResult, StepResult, StopReason};
