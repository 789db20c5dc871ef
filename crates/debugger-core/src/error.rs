//! Crate-wide error taxonomy for memory, breakpoint and control failures.

use thiserror::Error;

use crate::control::BackendError;

/// Stable error taxonomy surfaced by address-space, breakpoint and control
/// operations.
///
/// Every variant except [`DebugError::Backend`] reports a local, recoverable
/// rejection that leaves the execution state machine untouched. Backend
/// failures raised during a step or run operation are the only errors that
/// transition the controller to [`crate::ExecutionState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DebugError {
    /// Adding a region whose range intersects an already-mapped region.
    #[error("region [{base:#010x}, {end:#010x}) overlaps an existing region")]
    RegionOverlap {
        /// Base address of the rejected region.
        base: u32,
        /// Exclusive end address of the rejected region.
        end: u64,
    },
    /// Region construction violated a structural invariant.
    #[error("region at {base:#010x} with size {size} is not constructible")]
    InvalidRegion {
        /// Requested base address.
        base: u32,
        /// Requested size in bytes.
        size: u64,
    },
    /// Access to an address not covered by any mapped region.
    #[error("address {address:#010x} is not mapped")]
    UnmappedAddress {
        /// The faulting address.
        address: u32,
    },
    /// Write to an address inside a read-only region.
    #[error("address {address:#010x} is read-only")]
    ReadOnly {
        /// The faulting address.
        address: u32,
    },
    /// Multi-byte access whose span is not contained in a single region.
    #[error("{width}-byte access at {address:#010x} crosses a region boundary")]
    SpanCrossesRegion {
        /// Start address of the access.
        address: u32,
        /// Access width in bytes.
        width: u8,
    },
    /// Control operation requested before the execution backend is ready.
    #[error("execution backend is not initialized")]
    NotInitialized,
    /// Step-over exceeded its iteration ceiling without reaching the
    /// computed return address.
    #[error("subroutine at {call_address:#010x} did not return within {steps} steps")]
    PossibleInfiniteLoop {
        /// Address of the call instruction being stepped over.
        call_address: u32,
        /// Number of single steps performed before giving up.
        steps: u64,
    },
    /// The execution backend itself failed.
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}

impl DebugError {
    /// Returns `true` when this error originated in the execution backend.
    ///
    /// Only backend-originated failures transition the controller state
    /// machine to `Error`; everything else is local to the rejected call.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::DebugError;
    use crate::control::BackendError;

    #[test]
    fn only_backend_failures_are_classified_as_backend() {
        let backend = DebugError::Backend(BackendError::new("bus error"));
        assert!(backend.is_backend());

        let local = [
            DebugError::RegionOverlap {
                base: 0x1000,
                end: 0x2000,
            },
            DebugError::InvalidRegion { base: 0, size: 0 },
            DebugError::UnmappedAddress { address: 0xFFFF },
            DebugError::ReadOnly { address: 0x0004 },
            DebugError::SpanCrossesRegion {
                address: 0x1FFF,
                width: 2,
            },
            DebugError::NotInitialized,
            DebugError::PossibleInfiniteLoop {
                call_address: 0x1000,
                steps: 10_000,
            },
        ];
        assert!(local.iter().all(|error| !error.is_backend()));
    }

    #[test]
    fn display_messages_carry_the_faulting_address() {
        let error = DebugError::UnmappedAddress { address: 0x00FF_0000 };
        assert_eq!(error.to_string(), "address 0x00ff0000 is not mapped");

        let error = DebugError::SpanCrossesRegion {
            address: 0x1FFF,
            width: 4,
        };
        assert_eq!(
            error.to_string(),
            "4-byte access at 0x00001fff crosses a region boundary"
        );
    }
}
