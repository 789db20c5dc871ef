//! Contract consumed from the external CPU execution backend.

use thiserror::Error;

use crate::registers::CpuState;

/// Failure reported by the execution backend.
///
/// The backend owns instruction semantics, so the core treats its failures
/// as opaque: a message for display, nothing to branch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{message}")]
pub struct BackendError {
    /// Human-readable failure description.
    pub message: String,
}

impl BackendError {
    /// Creates a backend failure carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external component that decodes and executes instructions and owns
/// the authoritative register and memory state.
///
/// Injected into [`crate::ExecutionController`] at construction so multiple
/// controllers can be tested in isolation. The core never inspects opcode
/// bytes through this interface; instruction semantics stay on the backend
/// side of the boundary.
pub trait ExecutionBackend: Send {
    /// Prepares the backend for execution.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the backend cannot be brought up.
    fn initialize(&mut self) -> Result<(), BackendError>;

    /// Returns `true` once [`ExecutionBackend::initialize`] has succeeded.
    fn is_initialized(&self) -> bool;

    /// Makes `[base, base + size)` addressable on the backend side.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the range cannot be mapped.
    fn map_region(&mut self, base: u32, size: u64, writable: bool) -> Result<(), BackendError>;

    /// Reverses a prior [`ExecutionBackend::map_region`].
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the range cannot be unmapped.
    fn unmap_region(&mut self, base: u32, size: u64) -> Result<(), BackendError>;

    /// Returns a fresh snapshot of the register file.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the registers cannot be read.
    fn read_registers(&mut self) -> Result<CpuState, BackendError>;

    /// Replaces the register file with `registers`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the registers cannot be written.
    fn write_registers(&mut self, registers: &CpuState) -> Result<(), BackendError>;

    /// Decodes and executes exactly one instruction at the current program
    /// counter.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when execution faults.
    fn execute_one_instruction(&mut self) -> Result<(), BackendError>;

    /// Reads `length` raw bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the range cannot be read.
    fn read_bytes(&mut self, address: u32, length: usize) -> Result<Vec<u8>, BackendError>;

    /// Writes raw bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the range cannot be written.
    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), BackendError>;
}
