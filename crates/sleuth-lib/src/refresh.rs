//! Force-refresh requests shared between the status API and the pipeline
//!
//! Requests accumulate as pending until a scan pass begins. `begin_pass`
//! latches them for that pass; only latched requests force re-analysis and
//! only they are acknowledged by `finish_pass`. A request arriving mid-pass
//! stays pending for the next one.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::models::UnitSnapshot;

#[derive(Debug, Default)]
struct Requests {
    all: bool,
    units: HashSet<String>,
}

impl Requests {
    fn is_empty(&self) -> bool {
        !self.all && self.units.is_empty()
    }

    fn covers(&self, qualified_name: &str) -> bool {
        self.all || self.units.contains(qualified_name)
    }

    fn absorb(&mut self, other: Requests) {
        self.all |= other.all;
        self.units.extend(other.units);
    }
}

/// Requests to bypass the diagnosis cache
#[derive(Debug, Default)]
pub struct RefreshSignal {
    pending: Mutex<Requests>,
    active: Mutex<Requests>,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force re-analysis of every unit on the next pass
    pub fn request_all(&self) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).all = true;
    }

    /// Force re-analysis of one unit on the next pass
    pub fn request_unit(&self, namespace: &str, name: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .units
            .insert(format!("{}/{}", namespace, name));
    }

    /// Latch pending requests for the pass about to run.
    ///
    /// Requests latched by a pass that never finished stay latched.
    pub fn begin_pass(&self) {
        let taken = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .absorb(taken);
    }

    /// Acknowledge the requests latched by `begin_pass`
    pub fn finish_pass(&self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Requests::default();
    }

    /// True when a latched request covers `unit`
    pub fn is_forced(&self, unit: &UnitSnapshot) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .covers(&unit.qualified_name())
    }

    /// True when requests are waiting for a pass to latch them
    pub fn is_pending(&self) -> bool {
        !self.pending.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}
