//! Controller-side breakpoint set.

use std::collections::BTreeSet;

use tracedbg_proto::{Entrypoint, SetBreakPoints};

/// The entrypoints the peer should pause before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    entrypoints: BTreeSet<Entrypoint>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Returns `true` if it was not already set.
    pub fn add(&mut self, entrypoint: Entrypoint) -> bool {
        self.entrypoints.insert(entrypoint)
    }

    /// Remove a breakpoint. Returns `true` if it was set.
    pub fn remove(&mut self, entrypoint: Entrypoint) -> bool {
        self.entrypoints.remove(&entrypoint)
    }

    /// Flip a breakpoint; returns whether it is set afterwards.
    pub fn toggle(&mut self, entrypoint: Entrypoint) -> bool {
        if self.entrypoints.remove(&entrypoint) {
            false
        } else {
            self.entrypoints.insert(entrypoint);
            true
        }
    }

    /// Replace the whole set. Returns `true` if anything changed.
    pub fn replace<I: IntoIterator<Item = Entrypoint>>(&mut self, entrypoints: I) -> bool {
        let next: BTreeSet<Entrypoint> = entrypoints.into_iter().collect();
        let changed = next != self.entrypoints;
        self.entrypoints = next;
        changed
    }

    pub fn contains(&self, entrypoint: Entrypoint) -> bool {
        self.entrypoints.contains(&entrypoint)
    }

    pub fn clear(&mut self) {
        self.entrypoints.clear();
    }

    pub fn len(&self) -> usize {
        self.entrypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entrypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entrypoint> + '_ {
        self.entrypoints.iter().copied()
    }

    /// The wire message that installs exactly this set on the peer.
    pub fn to_message(&self) -> SetBreakPoints {
        SetBreakPoints {
            entrypoints: self.entrypoints.clone(),
        }
    }
}

impl FromIterator<Entrypoint> for BreakpointSet {
    fn from_iter<I: IntoIterator<Item = Entrypoint>>(iter: I) -> Self {
        Self {
            entrypoints: iter.into_iter().collect(),
        }
    }
}
