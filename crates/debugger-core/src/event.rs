//! Observer feed published by the address space, breakpoint table and
//! controller.

use std::sync::{Mutex, PoisonError};

use crate::breakpoint::Breakpoint;
use crate::control::{ExecutionState, StepResult};
use crate::memory::RegionDescriptor;
use crate::DebugError;

/// Notifications published to presentation and observability collaborators.
///
/// Events are emitted after the corresponding mutation has been committed,
/// in the order the mutations occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// The controller state machine transitioned.
    StateChanged {
        /// State before the transition.
        old: ExecutionState,
        /// State after the transition.
        new: ExecutionState,
    },
    /// A step operation completed successfully.
    InstructionExecuted {
        /// Outcome of the completed step.
        result: StepResult,
    },
    /// A backend failure aborted a control operation.
    ExecutionFault {
        /// The failure that aborted the operation.
        error: DebugError,
        /// Program counter active when the failure was observed.
        address: u32,
    },
    /// A breakpoint was created.
    BreakpointAdded {
        /// The newly created breakpoint.
        breakpoint: Breakpoint,
    },
    /// A breakpoint was removed.
    BreakpointRemoved {
        /// The removed breakpoint, as of removal.
        breakpoint: Breakpoint,
    },
    /// An enabled breakpoint matched during a run loop.
    BreakpointHit {
        /// The matched breakpoint with its updated hit count.
        breakpoint: Breakpoint,
    },
    /// A region was mapped into the address space.
    RegionAdded {
        /// Descriptor of the mapped region.
        descriptor: RegionDescriptor,
    },
    /// A region was unmapped from the address space.
    RegionRemoved {
        /// Descriptor of the unmapped region.
        descriptor: RegionDescriptor,
    },
}

/// Sink for [`DebugEvent`] notifications.
///
/// Sinks run while the publishing component may hold internal locks and must
/// not call back into that component.
pub trait EventSink: Send {
    /// Records one event in publication order.
    fn on_event(&mut self, event: &DebugEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&DebugEvent) + Send,
{
    fn on_event(&mut self, event: &DebugEvent) {
        self(event);
    }
}

/// Shared publish/subscribe hub carrying all debugger notifications.
///
/// One hub is shared by the address space, breakpoint table and controller so
/// observers see a single ordered feed.
#[derive(Default)]
pub struct EventHub {
    sinks: Mutex<Vec<Box<dyn EventSink>>>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventHub").field("sinks", &sinks).finish()
    }
}

impl EventHub {
    /// Creates a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink; it receives every event published afterwards.
    pub fn subscribe(&self, sink: Box<dyn EventSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Delivers one event to every registered sink, in subscription order.
    pub fn publish(&self, event: &DebugEvent) {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter_mut() {
            sink.on_event(event);
        }
    }

    /// Returns the number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
