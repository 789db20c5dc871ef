//! Execution controller: stepping primitives and the breakpoint-checked run
//! loop over the injected backend.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::breakpoint::BreakpointTable;
use crate::control::{
    CallClassifier, ExecutionBackend, ExecutionState, RunResult, StepResult, StopReason,
};
use crate::event::{DebugEvent, EventHub};
use crate::memory::{AddressSpace, MemoryRegion, RegionDescriptor};
use crate::registers::CpuState;
use crate::DebugError;

/// Default byte width assumed for a call instruction when computing the
/// step-over return address.
pub const DEFAULT_CALL_INSTRUCTION_WIDTH: u32 = 4;
/// Default single-step ceiling for one step-over operation.
pub const DEFAULT_STEP_OVER_MAX_STEPS: u64 = 10_000;

/// Tuning knobs for one [`ExecutionController`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ControllerConfig {
    /// Byte width assumed for a call instruction.
    ///
    /// A fixed width is an approximation that is wrong for variable-length
    /// instruction sets; it is isolated here so a listing-driven strategy
    /// can replace [`ControllerConfig::return_address`] without touching
    /// the stepping loop.
    pub call_instruction_width: u32,
    /// Hard iteration ceiling for one step-over before reporting
    /// [`DebugError::PossibleInfiniteLoop`].
    pub step_over_max_steps: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            call_instruction_width: DEFAULT_CALL_INSTRUCTION_WIDTH,
            step_over_max_steps: DEFAULT_STEP_OVER_MAX_STEPS,
        }
    }
}

impl ControllerConfig {
    /// Computes the address execution is expected to return to after the
    /// call instruction at `call_address` completes.
    #[must_use]
    pub const fn return_address(&self, call_address: u32) -> u32 {
        call_address.wrapping_add(self.call_instruction_width)
    }
}

/// State machine driving step, step-over and run against the execution
/// backend, consulting the address space and breakpoint table.
///
/// Stepping and run operations are a single-control-worker contract: one
/// worker at a time drives them, while state, breakpoints and memory may be
/// read or mutated concurrently from an interactive caller. The state is a
/// lock-protected snapshot; the backend sits behind its own lock and is
/// only touched at instruction boundaries.
pub struct ExecutionController<B: ExecutionBackend> {
    backend: Mutex<B>,
    state: Mutex<ExecutionState>,
    space: Arc<AddressSpace>,
    breakpoints: Arc<BreakpointTable>,
    classifier: Box<dyn CallClassifier>,
    config: ControllerConfig,
    events: Arc<EventHub>,
    instruction_count: AtomicU64,
    last_address: AtomicU32,
    stop_requested: AtomicBool,
    pause_requested: AtomicBool,
}

impl<B: ExecutionBackend> std::fmt::Debug for ExecutionController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("state", &self.state())
            .field("instruction_count", &self.instruction_count())
            .field("last_address", &self.last_address())
            .finish_non_exhaustive()
    }
}

impl<B: ExecutionBackend> ExecutionController<B> {
    /// Creates a controller with the default configuration.
    #[must_use]
    pub fn new(
        backend: B,
        space: Arc<AddressSpace>,
        breakpoints: Arc<BreakpointTable>,
        classifier: Box<dyn CallClassifier>,
        events: Arc<EventHub>,
    ) -> Self {
        Self::with_config(
            backend,
            space,
            breakpoints,
            classifier,
            events,
            ControllerConfig::default(),
        )
    }

    /// Creates a controller with an explicit configuration.
    #[must_use]
    pub fn with_config(
        backend: B,
        space: Arc<AddressSpace>,
        breakpoints: Arc<BreakpointTable>,
        classifier: Box<dyn CallClassifier>,
        events: Arc<EventHub>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            backend: Mutex::new(backend),
            state: Mutex::new(ExecutionState::Stopped),
            space,
            breakpoints,
            classifier,
            config,
            events,
            instruction_count: AtomicU64::new(0),
            last_address: AtomicU32::new(0),
            stop_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
        }
    }

    fn lock_backend(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of the current execution state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of instructions executed since the last reset.
    #[must_use]
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count.load(Ordering::Relaxed)
    }

    /// Returns the address of the most recently executed instruction.
    #[must_use]
    pub fn last_address(&self) -> u32 {
        self.last_address.load(Ordering::Relaxed)
    }

    /// Returns the address space this controller keeps the backend
    /// synchronized with.
    #[must_use]
    pub const fn address_space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// Returns the breakpoint table consulted by the run loop.
    #[must_use]
    pub const fn breakpoint_table(&self) -> &Arc<BreakpointTable> {
        &self.breakpoints
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> ControllerConfig {
        self.config
    }

    fn transition(&self, new: ExecutionState) {
        let old = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, new)
        };
        if old != new {
            trace!(from = old.as_str(), to = new.as_str(), "state transition");
            self.events
                .publish(&DebugEvent::StateChanged { old, new });
        }
    }

    /// Brings the backend up and synchronizes every already-loaded region
    /// into it.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Backend`] when the backend rejects
    /// initialization or a region transfer; the execution state is left
    /// unchanged.
    pub fn initialize(&self) -> Result<(), DebugError> {
        let mut backend = self.lock_backend();
        backend.initialize()?;
        for descriptor in self.space.memory_map() {
            let bytes = self
                .space
                .region_bytes(descriptor.start)
                .ok_or(DebugError::UnmappedAddress {
                    address: descriptor.start,
                })?;
            backend.map_region(descriptor.start, descriptor.size, descriptor.kind.is_writable())?;
            backend.write_bytes(descriptor.start, &bytes)?;
        }
        debug!("backend initialized");
        Ok(())
    }

    /// Resets the backend registers, zeroes the instruction counter and
    /// last-executed address, and transitions to `Stopped`.
    ///
    /// Returns the reset register snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Backend`] when the backend rejects the
    /// register write; counters and state are left unchanged.
    pub fn reset(&self) -> Result<CpuState, DebugError> {
        let registers = CpuState::default();
        {
            let mut backend = self.lock_backend();
            backend.write_registers(&registers)?;
        }
        self.instruction_count.store(0, Ordering::Relaxed);
        self.last_address.store(0, Ordering::Relaxed);
        self.transition(ExecutionState::Stopped);
        debug!("controller reset");
        Ok(registers)
    }

    /// Returns a fresh register snapshot from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::NotInitialized`] before
    /// [`ExecutionController::initialize`], or [`DebugError::Backend`] when
    /// the read fails.
    pub fn registers(&self) -> Result<CpuState, DebugError> {
        let mut backend = self.lock_backend();
        if !backend.is_initialized() {
            return Err(DebugError::NotInitialized);
        }
        Ok(backend.read_registers()?)
    }

    /// Points the program counter at `address` without changing the
    /// execution state.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when `address` is not
    /// covered by the address space, [`DebugError::NotInitialized`] before
    /// initialization, or [`DebugError::Backend`] when the register
    /// round-trip fails.
    pub fn set_program_counter(&self, address: u32) -> Result<(), DebugError> {
        if !self.space.contains(address) {
            return Err(DebugError::UnmappedAddress { address });
        }
        let mut backend = self.lock_backend();
        if !backend.is_initialized() {
            return Err(DebugError::NotInitialized);
        }
        let mut registers = backend.read_registers()?;
        registers.pc = address;
        backend.write_registers(&registers)?;
        self.last_address.store(address, Ordering::Relaxed);
        Ok(())
    }

    /// Maps `region` into the address space and mirrors it into the
    /// backend.
    ///
    /// When the backend is not initialized yet the region is only staged in
    /// the address space; [`ExecutionController::initialize`] transfers it
    /// later.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::RegionOverlap`] when the range conflicts, or
    /// [`DebugError::Backend`] when the backend rejects the transfer — the
    /// address space is rolled back in that case.
    pub fn load_region(&self, region: MemoryRegion) -> Result<RegionDescriptor, DebugError> {
        let bytes = region.bytes().to_vec();
        let writable = region.kind().is_writable();
        let descriptor = self.space.add_region(region)?;
        let mut backend = self.lock_backend();
        if backend.is_initialized() {
            let transfer = backend
                .map_region(descriptor.start, descriptor.size, writable)
                .and_then(|()| backend.write_bytes(descriptor.start, &bytes));
            if let Err(error) = transfer {
                drop(backend);
                let _ = self.space.remove_region(descriptor.start);
                return Err(error.into());
            }
        }
        Ok(descriptor)
    }

    /// Unmaps the region based at `base` from the address space and the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when no region is based at
    /// `base`, or [`DebugError::Backend`] when the backend rejects the
    /// unmap (the address space entry is already removed at that point).
    pub fn unload_region(&self, base: u32) -> Result<RegionDescriptor, DebugError> {
        let descriptor = self.space.remove_region(base)?;
        let mut backend = self.lock_backend();
        if backend.is_initialized() {
            backend.unmap_region(descriptor.start, descriptor.size)?;
        }
        Ok(descriptor)
    }

    /// Writes one byte through the address space and mirrors it into the
    /// backend.
    ///
    /// # Errors
    ///
    /// As [`AddressSpace::write_byte`], plus [`DebugError::Backend`] when
    /// the mirror write fails.
    pub fn write_byte(&self, address: u32, value: u8) -> Result<(), DebugError> {
        self.space.write_byte(address, value)?;
        self.mirror(address, &[value])
    }

    /// Writes a big-endian word through the address space and mirrors it
    /// into the backend.
    ///
    /// # Errors
    ///
    /// As [`AddressSpace::write_word`], plus [`DebugError::Backend`] when
    /// the mirror write fails.
    pub fn write_word(&self, address: u32, value: u16) -> Result<(), DebugError> {
        self.space.write_word(address, value)?;
        self.mirror(address, &value.to_be_bytes())
    }

    /// Writes a big-endian long word through the address space and mirrors
    /// it into the backend.
    ///
    /// # Errors
    ///
    /// As [`AddressSpace::write_long`], plus [`DebugError::Backend`] when
    /// the mirror write fails.
    pub fn write_long(&self, address: u32, value: u32) -> Result<(), DebugError> {
        self.space.write_long(address, value)?;
        self.mirror(address, &value.to_be_bytes())
    }

    fn mirror(&self, address: u32, bytes: &[u8]) -> Result<(), DebugError> {
        let mut backend = self.lock_backend();
        if backend.is_initialized() {
            backend.write_bytes(address, bytes)?;
        }
        Ok(())
    }

    /// Executes exactly one instruction, regardless of its kind.
    ///
    /// On success transitions `Running → Paused` and publishes one
    /// [`DebugEvent::InstructionExecuted`] carrying both addresses and the
    /// new snapshot. On backend failure transitions to `Error`, publishes
    /// [`DebugEvent::ExecutionFault`], and reports the failure through the
    /// returned result instead of raising.
    pub fn step_into(&self) -> StepResult {
        let mut backend = self.lock_backend();
        if !backend.is_initialized() {
            return StepResult::failure(self.last_address(), DebugError::NotInitialized);
        }
        self.transition(ExecutionState::Running);
        match self.step_once(&mut backend) {
            Ok((start, after)) => {
                self.transition(ExecutionState::Paused);
                let result = StepResult::success(start, after.pc, after);
                self.events.publish(&DebugEvent::InstructionExecuted {
                    result: result.clone(),
                });
                result
            }
            Err((address, error)) => self.fail_step(address, error),
        }
    }

    /// Executes one instruction, running an entire subroutine as a single
    /// step when the current instruction is a call form.
    ///
    /// The injected [`CallClassifier`] decides whether the instruction at
    /// the program counter is a call; if not, this behaves exactly like
    /// [`ExecutionController::step_into`]. For a call, single steps are
    /// repeated until the program counter equals the computed return
    /// address, up to the configured ceiling;
    /// [`DebugError::PossibleInfiniteLoop`] is reported past the ceiling
    /// with the controller left paused at its last completed step, not in
    /// `Error`.
    pub fn step_over(&self) -> StepResult {
        let mut backend = self.lock_backend();
        if !backend.is_initialized() {
            return StepResult::failure(self.last_address(), DebugError::NotInitialized);
        }
        let before = match backend.read_registers() {
            Ok(registers) => registers,
            Err(error) => return self.fail_step(self.last_address(), error.into()),
        };
        if !self.classifier.is_call_instruction(before.pc) {
            drop(backend);
            return self.step_into();
        }

        let call_address = before.pc;
        let return_address = self.config.return_address(call_address);
        trace!(call_address, return_address, "stepping over subroutine call");
        self.transition(ExecutionState::Running);
        let mut steps: u64 = 0;
        loop {
            if steps >= self.config.step_over_max_steps {
                self.transition(ExecutionState::Paused);
                return StepResult::failure(
                    call_address,
                    DebugError::PossibleInfiniteLoop {
                        call_address,
                        steps,
                    },
                );
            }
            match self.step_once(&mut backend) {
                Ok((_, after)) => {
                    steps += 1;
                    if after.pc == return_address {
                        self.transition(ExecutionState::Paused);
                        let result = StepResult::success(call_address, after.pc, after);
                        self.events.publish(&DebugEvent::InstructionExecuted {
                            result: result.clone(),
                        });
                        return result;
                    }
                }
                Err((address, error)) => return self.fail_step(address, error),
            }
        }
    }

    /// Runs until a breakpoint matches, `max_instructions` have executed, a
    /// stop or pause request arrives, or the backend fails.
    ///
    /// Before each instruction the breakpoint table is consulted with a
    /// fresh register snapshot; a match pauses the loop with the matched
    /// breakpoint attached. Reaching the ceiling is a safety valve reported
    /// as [`StopReason::MaxInstructionsReached`], not an error. Backend
    /// failures abort with [`StopReason::Exception`] and transition to
    /// `Error`.
    pub fn run(&self, max_instructions: u64) -> RunResult {
        let mut backend = self.lock_backend();
        if !backend.is_initialized() {
            return RunResult {
                stop_reason: StopReason::Exception(DebugError::NotInitialized),
                instructions_executed: 0,
                end_address: self.last_address(),
                registers: None,
            };
        }
        self.stop_requested.store(false, Ordering::Relaxed);
        self.pause_requested.store(false, Ordering::Relaxed);
        self.transition(ExecutionState::Running);
        let mut executed: u64 = 0;
        loop {
            let snapshot = match backend.read_registers() {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    return self.fail_run(executed, self.last_address(), error.into());
                }
            };
            let pc = snapshot.pc;

            if self.stop_requested.swap(false, Ordering::Relaxed) {
                self.transition(ExecutionState::Stopped);
                return interrupted(executed, pc, snapshot);
            }
            if self.pause_requested.swap(false, Ordering::Relaxed) {
                self.transition(ExecutionState::Paused);
                return interrupted(executed, pc, snapshot);
            }
            if let Some(breakpoint) = self.breakpoints.should_break_at(pc, &snapshot) {
                debug!(address = pc, id = breakpoint.id.0, "breakpoint reached");
                self.transition(ExecutionState::Paused);
                return RunResult {
                    stop_reason: StopReason::Breakpoint(breakpoint),
                    instructions_executed: executed,
                    end_address: pc,
                    registers: Some(snapshot),
                };
            }
            if executed >= max_instructions {
                self.transition(ExecutionState::Paused);
                return RunResult {
                    stop_reason: StopReason::MaxInstructionsReached,
                    instructions_executed: executed,
                    end_address: pc,
                    registers: Some(snapshot),
                };
            }
            if let Err(error) = backend.execute_one_instruction() {
                return self.fail_run(executed, pc, error.into());
            }
            executed += 1;
            self.instruction_count.fetch_add(1, Ordering::Relaxed);
            self.last_address.store(pc, Ordering::Relaxed);
        }
    }

    /// Requests a cooperative transition to `Stopped`.
    ///
    /// A run loop in flight honors the request at its next instruction
    /// boundary; an in-flight backend instruction is never interrupted.
    /// From `Paused` the transition happens immediately; `Error` is only
    /// left via [`ExecutionController::reset`].
    pub fn stop(&self) {
        match self.state() {
            ExecutionState::Running => self.stop_requested.store(true, Ordering::Relaxed),
            ExecutionState::Paused => self.transition(ExecutionState::Stopped),
            ExecutionState::Stopped | ExecutionState::Error => {}
        }
    }

    /// Requests a cooperative transition to `Paused` at the next
    /// instruction boundary of a run loop in flight.
    pub fn pause(&self) {
        if self.state() == ExecutionState::Running {
            self.pause_requested.store(true, Ordering::Relaxed);
        }
    }

    fn step_once(&self, backend: &mut B) -> Result<(u32, CpuState), (u32, DebugError)> {
        let before = backend
            .read_registers()
            .map_err(|error| (self.last_address(), DebugError::from(error)))?;
        let start = before.pc;
        backend
            .execute_one_instruction()
            .map_err(|error| (start, DebugError::from(error)))?;
        let after = backend
            .read_registers()
            .map_err(|error| (start, DebugError::from(error)))?;
        self.instruction_count.fetch_add(1, Ordering::Relaxed);
        self.last_address.store(start, Ordering::Relaxed);
        Ok((start, after))
    }

    fn fail_step(&self, address: u32, error: DebugError) -> StepResult {
        if error.is_backend() {
            self.transition(ExecutionState::Error);
            self.events.publish(&DebugEvent::ExecutionFault {
                error: error.clone(),
                address,
            });
        }
        StepResult::failure(address, error)
    }

    fn fail_run(&self, executed: u64, address: u32, error: DebugError) -> RunResult {
        self.transition(ExecutionState::Error);
        self.events.publish(&DebugEvent::ExecutionFault {
            error: error.clone(),
            address,
        });
        RunResult {
            stop_reason: StopReason::Exception(error),
            instructions_executed: executed,
            end_address: address,
            registers: None,
        }
    }
}

fn interrupted(executed: u64, pc: u32, snapshot: CpuState) -> RunResult {
    RunResult {
        stop_reason: StopReason::Interrupted,
        instructions_executed: executed,
        end_address: pc,
        registers: Some(snapshot),
    }
}
