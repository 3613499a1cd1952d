//! Concurrency budget for a secondary mechanism kind.

use crate::mechanism::MechanismKind;

/// Serializes one secondary mechanism kind across legs: at most one leg's
/// instance runs at a time, and legs are started in registration order.
#[derive(Debug, Clone)]
pub struct SecondaryQueue {
    kind: MechanismKind,
    next: usize,
    in_flight: Option<usize>,
}

impl SecondaryQueue {
    pub fn new(kind: MechanismKind) -> Self {
        debug_assert!(!kind.is_canonical());
        Self {
            kind,
            next: 0,
            in_flight: None,
        }
    }

    pub fn kind(&self) -> MechanismKind {
        self.kind
    }

    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    /// Slots registered but not yet started
    pub fn waiting(&self, registered: usize) -> usize {
        registered.saturating_sub(self.next)
    }

    /// Claim the next slot to start, if the budget is free and a leg is waiting.
    pub fn claim_next(&mut self, registered: usize) -> Option<usize> {
        if self.in_flight.is_some() || self.next >= registered {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        self.in_flight = Some(slot);
        Some(slot)
    }

    /// Release the budget held by `slot`. Returns false if `slot` was not in flight.
    pub fn finish(&mut self, slot: usize) -> bool {
        if self.in_flight != Some(slot) {
            return false;
        }
        self.in_flight = None;
        true
    }

    pub fn reset(&mut self) {
        self.next = 0;
        self.in_flight = None;
    }
}
