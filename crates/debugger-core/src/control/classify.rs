//! Opcode-agnostic call-instruction classification for step-over.

use std::collections::BTreeSet;

/// Decides whether the instruction at an address is a subroutine call.
///
/// The core never decodes opcode bytes; this capability is supplied by the
/// disassembly collaborator, which typically answers from a pre-parsed
/// listing (a mnemonic prefix match). [`crate::ExecutionController`] only
/// consults it at the start of a step-over.
pub trait CallClassifier: Send + Sync {
    /// Returns `true` when the instruction at `address` is a call form.
    fn is_call_instruction(&self, address: u32) -> bool;
}

/// Adapter presenting a plain predicate function as a [`CallClassifier`].
#[derive(Debug, Clone, Copy)]
pub struct FnCallClassifier<F>(
    /// The wrapped predicate.
    pub F,
);

impl<F> CallClassifier for FnCallClassifier<F>
where
    F: Fn(u32) -> bool + Send + Sync,
{
    fn is_call_instruction(&self, address: u32) -> bool {
        (self.0)(address)
    }
}

/// Classifier that never reports a call.
///
/// With no listing loaded step-over degenerates to step-into, which is the
/// correct conservative behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoCalls;

impl CallClassifier for NoCalls {
    fn is_call_instruction(&self, _address: u32) -> bool {
        false
    }
}

/// Classifier backed by an explicit set of call-instruction addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedCallSites {
    addresses: BTreeSet<u32>,
}

impl FixedCallSites {
    /// Creates a classifier reporting a call at every address in `sites`.
    #[must_use]
    pub fn new(sites: impl IntoIterator<Item = u32>) -> Self {
        Self {
            addresses: sites.into_iter().collect(),
        }
    }
}

impl CallClassifier for FixedCallSites {
    fn is_call_instruction(&self, address: u32) -> bool {
        self.addresses.contains(&address)
    }
}
