//! Keyed set of conditional breakpoints with hit tracking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::debug;

use crate::breakpoint::{Condition, ConditionPolicy};
use crate::event::{DebugEvent, EventHub};
use crate::registers::CpuState;

/// Opaque breakpoint identity, unique within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BreakpointId(
    /// Raw identity value.
    pub u32,
);

/// A single breakpoint, returned to callers by value.
///
/// Breakpoints are owned by their [`BreakpointTable`]; copies handed out by
/// table operations are snapshots and never alias table state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Breakpoint {
    /// Table-unique identity.
    pub id: BreakpointId,
    /// Address execution stops at.
    pub address: u32,
    /// Raw condition text, when one is attached.
    pub condition: Option<String>,
    /// Free-form description for display.
    pub description: Option<String>,
    /// Disabled breakpoints never match.
    pub enabled: bool,
    /// Number of times the breakpoint has matched.
    pub hit_count: u64,
    /// Creation time.
    pub created_at: SystemTime,
    /// Time of the most recent match, if any.
    pub last_hit: Option<SystemTime>,
}

/// Addresses a table entry either by identity or by target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointSelector {
    /// Select by table-unique identity.
    Id(BreakpointId),
    /// Select by target address.
    Address(u32),
}

impl From<BreakpointId> for BreakpointSelector {
    fn from(id: BreakpointId) -> Self {
        Self::Id(id)
    }
}

impl From<u32> for BreakpointSelector {
    fn from(address: u32) -> Self {
        Self::Address(address)
    }
}

/// Pre-compiled evaluation form of a breakpoint's condition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompiledCondition {
    /// No condition attached; the breakpoint always matches.
    Always,
    /// Condition parsed; evaluated against the register snapshot.
    Parsed(Condition),
    /// Condition text did not parse; outcome decided by the table policy.
    Unparseable,
}

impl CompiledCondition {
    fn compile(text: Option<&str>) -> Self {
        text.map_or(Self::Always, |raw| {
            Condition::parse(raw).map_or(Self::Unparseable, Self::Parsed)
        })
    }

    const fn matches(&self, registers: &CpuState, policy: ConditionPolicy) -> bool {
        match self {
            Self::Always => true,
            Self::Parsed(condition) => condition.evaluate(registers),
            Self::Unparseable => policy.unparseable_matches(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    breakpoint: Breakpoint,
    compiled: CompiledCondition,
}

#[derive(Debug, Default)]
struct TableInner {
    entries: Vec<Entry>,
    next_id: u32,
}

impl TableInner {
    fn position(&self, selector: BreakpointSelector) -> Option<usize> {
        self.entries.iter().position(|entry| match selector {
            BreakpointSelector::Id(id) => entry.breakpoint.id == id,
            BreakpointSelector::Address(address) => entry.breakpoint.address == address,
        })
    }
}

/// Owner of the breakpoint set; answers "should execution stop here".
///
/// All operations take `&self` and serialize on one table-wide lock, so an
/// interactive caller may mutate breakpoints while a run loop evaluates
/// [`BreakpointTable::should_break_at`] on a worker thread. Condition text
/// is compiled once on entry creation; the run-loop path never re-parses.
#[derive(Debug)]
pub struct BreakpointTable {
    inner: Mutex<TableInner>,
    policy: ConditionPolicy,
    events: Arc<EventHub>,
}

impl BreakpointTable {
    /// Creates an empty table with the fail-open condition policy.
    #[must_use]
    pub fn new(events: Arc<EventHub>) -> Self {
        Self::with_policy(events, ConditionPolicy::default())
    }

    /// Creates an empty table with an explicit condition policy.
    #[must_use]
    pub fn with_policy(events: Arc<EventHub>, policy: ConditionPolicy) -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            policy,
            events,
        }
    }

    /// Returns the policy applied to unparseable conditions.
    #[must_use]
    pub const fn policy(&self) -> ConditionPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a breakpoint at `address`, or returns the existing one.
    ///
    /// Idempotent per address: when a breakpoint already exists at
    /// `address` it is returned unchanged and no entry is created. A
    /// [`DebugEvent::BreakpointAdded`] notification is published only for a
    /// newly created entry.
    pub fn add(
        &self,
        address: u32,
        condition: Option<&str>,
        description: Option<&str>,
    ) -> Breakpoint {
        let (breakpoint, created) = {
            let mut inner = self.lock();
            if let Some(position) = inner.position(BreakpointSelector::Address(address)) {
                (inner.entries[position].breakpoint.clone(), false)
            } else {
                let id = BreakpointId(inner.next_id);
                inner.next_id += 1;
                let breakpoint = Breakpoint {
                    id,
                    address,
                    condition: condition.map(ToOwned::to_owned),
                    description: description.map(ToOwned::to_owned),
                    enabled: true,
                    hit_count: 0,
                    created_at: SystemTime::now(),
                    last_hit: None,
                };
                inner.entries.push(Entry {
                    breakpoint: breakpoint.clone(),
                    compiled: CompiledCondition::compile(condition),
                });
                (breakpoint, true)
            }
        };
        if created {
            debug!(address, id = breakpoint.id.0, "breakpoint added");
            self.events.publish(&DebugEvent::BreakpointAdded {
                breakpoint: breakpoint.clone(),
            });
        }
        breakpoint
    }

    /// Removes the breakpoint matching `selector`.
    ///
    /// Returns the removed breakpoint, or `None` when nothing matched.
    pub fn remove(&self, selector: impl Into<BreakpointSelector>) -> Option<Breakpoint> {
        let selector = selector.into();
        let removed = {
            let mut inner = self.lock();
            let position = inner.position(selector)?;
            inner.entries.remove(position).breakpoint
        };
        debug!(address = removed.address, id = removed.id.0, "breakpoint removed");
        self.events.publish(&DebugEvent::BreakpointRemoved {
            breakpoint: removed.clone(),
        });
        Some(removed)
    }

    /// Removes every breakpoint; returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed: Vec<Entry> = {
            let mut inner = self.lock();
            inner.entries.drain(..).collect()
        };
        let count = removed.len();
        for entry in removed {
            self.events.publish(&DebugEvent::BreakpointRemoved {
                breakpoint: entry.breakpoint,
            });
        }
        debug!(count, "breakpoint table cleared");
        count
    }

    /// Enables or disables the breakpoint matching `selector`.
    ///
    /// Returns the updated breakpoint, or `None` when nothing matched.
    pub fn set_enabled(
        &self,
        selector: impl Into<BreakpointSelector>,
        enabled: bool,
    ) -> Option<Breakpoint> {
        let selector = selector.into();
        let mut inner = self.lock();
        let position = inner.position(selector)?;
        inner.entries[position].breakpoint.enabled = enabled;
        Some(inner.entries[position].breakpoint.clone())
    }

    /// Replaces the condition and description of the breakpoint with `id`.
    ///
    /// Both fields are replaced wholesale; passing `None` clears them. The
    /// condition is re-compiled. Returns the updated breakpoint, or `None`
    /// when the id is unknown.
    pub fn update(
        &self,
        id: BreakpointId,
        condition: Option<&str>,
        description: Option<&str>,
    ) -> Option<Breakpoint> {
        let mut inner = self.lock();
        let position = inner.position(BreakpointSelector::Id(id))?;
        let entry = &mut inner.entries[position];
        entry.breakpoint.condition = condition.map(ToOwned::to_owned);
        entry.breakpoint.description = description.map(ToOwned::to_owned);
        entry.compiled = CompiledCondition::compile(condition);
        Some(entry.breakpoint.clone())
    }

    /// Returns a copy of the breakpoint matching `selector`.
    #[must_use]
    pub fn get(&self, selector: impl Into<BreakpointSelector>) -> Option<Breakpoint> {
        let selector = selector.into();
        let inner = self.lock();
        inner
            .position(selector)
            .map(|position| inner.entries[position].breakpoint.clone())
    }

    /// Returns copies of all breakpoints in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Breakpoint> {
        self.lock()
            .entries
            .iter()
            .map(|entry| entry.breakpoint.clone())
            .collect()
    }

    /// Returns the number of breakpoints in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when the table holds no breakpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Decides whether execution should stop at `address`.
    ///
    /// Returns `None` unless an enabled breakpoint exists at `address` and
    /// its condition (if any) evaluates true against `registers`. On a
    /// match the hit count is incremented and the hit timestamp recorded;
    /// the increment and its [`DebugEvent::BreakpointHit`] notification
    /// happen together under the table lock, so a concurrent toggle can
    /// neither double-count nor drop the increment. A non-matching call has
    /// no observable side effect.
    ///
    /// Must be called at most once per address per instruction boundary.
    #[must_use]
    pub fn should_break_at(&self, address: u32, registers: &CpuState) -> Option<Breakpoint> {
        let mut inner = self.lock();
        let position = inner.position(BreakpointSelector::Address(address))?;
        let entry = &mut inner.entries[position];
        if !entry.breakpoint.enabled || !entry.compiled.matches(registers, self.policy) {
            return None;
        }
        entry.breakpoint.hit_count += 1;
        entry.breakpoint.last_hit = Some(SystemTime::now());
        let breakpoint = entry.breakpoint.clone();
        self.events.publish(&DebugEvent::BreakpointHit {
            breakpoint: breakpoint.clone(),
        });
        Some(breakpoint)
    }
}
