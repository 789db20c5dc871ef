//! Debugger control core: emulated address space, conditional breakpoints
//! and breakpoint-aware single-instruction stepping.
//!
//! The crate has three components, leaves first: [`AddressSpace`] unifies
//! user-loaded ROM/RAM regions into one bounds- and permission-checked
//! space; [`BreakpointTable`] owns conditional breakpoints and answers
//! "should execution stop here"; [`ExecutionController`] drives an injected
//! [`ExecutionBackend`] instruction by instruction, consulting both.
//! Instruction decoding, disassembly parsing and presentation are external
//! collaborators reached through the [`ExecutionBackend`] and
//! [`CallClassifier`] seams and the [`EventHub`] feed.

/// Conditional breakpoints: grammar, policy and the owning table.
pub mod breakpoint;
pub use breakpoint::{
    Breakpoint, BreakpointId, BreakpointSelector, BreakpointTable, Comparison, Condition,
    ConditionParseError, ConditionPolicy,
};

/// Execution control: backend contract, state machine and stepping.
pub mod control;
pub use control::{
    BackendError, CallClassifier, ControllerConfig, ExecutionBackend, ExecutionController,
    ExecutionState, FixedCallSites, FnCallClassifier, NoCalls, RunResult, StepResult,
    StopReason, DEFAULT_CALL_INSTRUCTION_WIDTH, DEFAULT_STEP_OVER_MAX_STEPS,
};

/// Crate-wide error taxonomy.
pub mod error;
pub use error::DebugError;

/// Observer feed for presentation collaborators.
pub mod event;
pub use event::{DebugEvent, EventHub, EventSink};

/// Memory model: regions and the unified checked address space.
pub mod memory;
pub use memory::{
    AddressSpace, MemoryRegion, RegionDescriptor, RegionKind, LONG_BYTES, WORD_BYTES,
};

/// CPU register snapshot model.
pub mod registers;
pub use registers::{
    CpuState, RegisterName, UnknownRegister, ADDRESS_REGISTER_COUNT, DATA_REGISTER_COUNT,
    STATUS_C, STATUS_INTERRUPT_MASK, STATUS_N, STATUS_RESET, STATUS_SUPERVISOR, STATUS_V,
    STATUS_X, STATUS_Z,
};
