//! CPU register snapshot model and register naming.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of general-purpose data registers (`D0..D7`).
pub const DATA_REGISTER_COUNT: usize = 8;
/// Number of address registers (`A0..A7`); `A7` is the active stack pointer.
pub const ADDRESS_REGISTER_COUNT: usize = 8;

/// Status-register bit for carry/borrow.
pub const STATUS_C: u16 = 1 << 0;
/// Status-register bit for signed overflow.
pub const STATUS_V: u16 = 1 << 1;
/// Status-register bit for zero result.
pub const STATUS_Z: u16 = 1 << 2;
/// Status-register bit for negative result.
pub const STATUS_N: u16 = 1 << 3;
/// Status-register bit for extend.
pub const STATUS_X: u16 = 1 << 4;
/// Status-register bit for supervisor mode.
pub const STATUS_SUPERVISOR: u16 = 1 << 13;
/// Status-register field masking all interrupt priority levels.
pub const STATUS_INTERRUPT_MASK: u16 = 0x0700;
/// Reset value of the status register: supervisor mode, interrupts masked.
pub const STATUS_RESET: u16 = STATUS_SUPERVISOR | STATUS_INTERRUPT_MASK;

/// Architecturally visible register identifier.
///
/// Used by the breakpoint condition grammar and by hosts addressing a single
/// register of a [`CpuState`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum RegisterName {
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    Pc,
    Sr,
    Usp,
    Ssp,
}

impl RegisterName {
    /// Ordered list of every addressable register.
    pub const ALL: [Self; 20] = [
        Self::D0,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::D5,
        Self::D6,
        Self::D7,
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
        Self::A6,
        Self::A7,
        Self::Pc,
        Self::Sr,
        Self::Usp,
        Self::Ssp,
    ];

    /// Returns the canonical upper-case name of this register.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::D0 => "D0",
            Self::D1 => "D1",
            Self::D2 => "D2",
            Self::D3 => "D3",
            Self::D4 => "D4",
            Self::D5 => "D5",
            Self::D6 => "D6",
            Self::D7 => "D7",
            Self::A0 => "A0",
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::A7 => "A7",
            Self::Pc => "PC",
            Self::Sr => "SR",
            Self::Usp => "USP",
            Self::Ssp => "SSP",
        }
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection raised when a textual register name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown register name: {0}")]
pub struct UnknownRegister(
    /// The rejected name text.
    pub String,
);

impl FromStr for RegisterName {
    type Err = UnknownRegister;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownRegister(trimmed.to_owned()))
    }
}

/// Flat snapshot of the CPU register file.
///
/// Snapshots have value semantics: the controller obtains a fresh copy from
/// the backend before and after each step and never mutates one in place on
/// the backend's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuState {
    /// General-purpose data registers `D0..D7`.
    pub data: [u32; DATA_REGISTER_COUNT],
    /// Address registers `A0..A7`; `A7` is the active stack pointer.
    pub addr: [u32; ADDRESS_REGISTER_COUNT],
    /// Program counter.
    pub pc: u32,
    /// Status register, including the condition codes in the low byte.
    pub sr: u16,
    /// User stack pointer shadow.
    pub usp: u32,
    /// Supervisor stack pointer shadow.
    pub ssp: u32,
}

impl Default for CpuState {
    /// Returns the reset snapshot: all registers zero, status register at
    /// [`STATUS_RESET`].
    fn default() -> Self {
        Self {
            data: [0; DATA_REGISTER_COUNT],
            addr: [0; ADDRESS_REGISTER_COUNT],
            pc: 0,
            sr: STATUS_RESET,
            usp: 0,
            ssp: 0,
        }
    }
}

impl CpuState {
    /// Reads any register by name, widened to 32 bits.
    #[must_use]
    pub const fn register(&self, name: RegisterName) -> u32 {
        match name {
            RegisterName::D0 => self.data[0],
            RegisterName::D1 => self.data[1],
            RegisterName::D2 => self.data[2],
            RegisterName::D3 => self.data[3],
            RegisterName::D4 => self.data[4],
            RegisterName::D5 => self.data[5],
            RegisterName::D6 => self.data[6],
            RegisterName::D7 => self.data[7],
            RegisterName::A0 => self.addr[0],
            RegisterName::A1 => self.addr[1],
            RegisterName::A2 => self.addr[2],
            RegisterName::A3 => self.addr[3],
            RegisterName::A4 => self.addr[4],
            RegisterName::A5 => self.addr[5],
            RegisterName::A6 => self.addr[6],
            RegisterName::A7 => self.addr[7],
            RegisterName::Pc => self.pc,
            RegisterName::Sr => self.sr as u32,
            RegisterName::Usp => self.usp,
            RegisterName::Ssp => self.ssp,
        }
    }

    /// Writes any register by name; the status register keeps its low 16
    /// bits.
    pub const fn set_register(&mut self, name: RegisterName, value: u32) {
        match name {
            RegisterName::D0 => self.data[0] = value,
            RegisterName::D1 => self.data[1] = value,
            RegisterName::D2 => self.data[2] = value,
            RegisterName::D3 => self.data[3] = value,
            RegisterName::D4 => self.data[4] = value,
            RegisterName::D5 => self.data[5] = value,
            RegisterName::D6 => self.data[6] = value,
            RegisterName::D7 => self.data[7] = value,
            RegisterName::A0 => self.addr[0] = value,
            RegisterName::A1 => self.addr[1] = value,
            RegisterName::A2 => self.addr[2] = value,
            RegisterName::A3 => self.addr[3] = value,
            RegisterName::A4 => self.addr[4] = value,
            RegisterName::A5 => self.addr[5] = value,
            RegisterName::A6 => self.addr[6] = value,
            RegisterName::A7 => self.addr[7] = value,
            RegisterName::Pc => self.pc = value,
            RegisterName::Sr => self.sr = (value & 0xFFFF) as u16,
            RegisterName::Usp => self.usp = value,
            RegisterName::Ssp => self.ssp = value,
        }
    }

    /// Returns the active stack pointer (`A7`).
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.addr[7]
    }

    /// Returns `true` when the supervisor bit is set in the status register.
    #[must_use]
    pub const fn is_supervisor(&self) -> bool {
        (self.sr & STATUS_SUPERVISOR) != 0
    }
}
