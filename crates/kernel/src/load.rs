use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// In-flight request counters per endpoint address, plus their running total.
///
/// Membership changes need `&mut self`, counting only needs `&self`: counters are atomics so requests to
/// different endpoints never wait on each other. The total always equals the sum of the counters, except
/// for the units [`LoadTable::reserve`]d by resolves that have not settled yet.
#[derive(Debug, Default)]
pub struct LoadTable {
    counters: HashMap<Arc<str>, AtomicUsize>,
    total: AtomicUsize,
}

impl LoadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed counter for a new member and return the address allocation it is keyed by.
    ///
    /// That allocation stands for this membership only: [`LoadTable::release`] ignores any other one, so a
    /// release outliving a remove and re-add of the same address cannot consume a newer request's unit.
    /// `None` if the address already had a counter.
    pub fn insert(&mut self, address: &str) -> Option<Arc<str>> {
        if self.counters.contains_key(address) {
            return None;
        }
        let member: Arc<str> = Arc::from(address);
        self.counters.insert(member.clone(), AtomicUsize::new(0));
        Some(member)
    }

    /// Drop the counter of an address, returning its outstanding load.
    ///
    /// The outstanding load leaves the total too: releases arriving later for this address are no-ops.
    pub fn remove(&mut self, address: &str) -> Option<usize> {
        let outstanding = self.counters.remove(address)?.into_inner();
        if outstanding > 0 {
            let _ = self.total.fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| Some(total.saturating_sub(outstanding)));
        }
        Some(outstanding)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.counters.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn load(&self, address: &str) -> Option<usize> {
        self.counters.get(address).map(|counter| counter.load(Ordering::Acquire))
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Count one more request in the total before it is placed. Returns the new total.
    pub fn reserve(&self) -> usize {
        self.total.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Give back a reservation that could not be placed.
    pub fn unreserve(&self) {
        let _ = self.total.fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| total.checked_sub(1));
    }

    /// Increment the counter of `address` only if it stays within `capacity(total)`.
    ///
    /// The capacity is recomputed from the live total on every compare-and-swap attempt.
    pub fn try_acquire(&self, address: &str, capacity: impl Fn(usize) -> usize) -> bool {
        let Some(counter) = self.counters.get(address) else {
            return false;
        };
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| {
                let capacity = capacity(self.total.load(Ordering::Acquire));
                (load < capacity).then_some(load + 1)
            })
            .is_ok()
    }

    /// Increment the counter of `address` regardless of capacity.
    pub fn acquire(&self, address: &str) -> bool {
        match self.counters.get(address) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Decrement the counter of `member`, clamped at zero.
    ///
    /// Unknown addresses and allocations from an earlier membership of the address are ignored.
    pub fn release(&self, member: &Arc<str>) -> bool {
        let Some((current, counter)) = self.counters.get_key_value(member.as_ref()) else {
            return false;
        };
        if !Arc::ptr_eq(current, member) {
            return false;
        }
        let released = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| load.checked_sub(1)).is_ok();
        if released {
            self.unreserve();
        }
        released
    }

    /// Current counters sorted by address.
    pub fn snapshot(&self) -> Vec<(Arc<str>, usize)> {
        let mut loads: Vec<_> = self.counters.iter().map(|(address, counter)| (address.clone(), counter.load(Ordering::Acquire))).collect();
        loads.sort();
        loads
    }
}
