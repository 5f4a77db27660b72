//! Bounded history of executed calls.

use std::collections::VecDeque;

use tracedbg_proto::{AnyValue, CallTrace, CalledEntryPoint};

/// Ring of the most recent calls; the oldest record falls off when full.
#[derive(Debug, Clone)]
pub struct CallHistory {
    capacity: usize,
    calls: VecDeque<CalledEntryPoint>,
}

impl CallHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            calls: VecDeque::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, call: CalledEntryPoint) {
        if self.calls.len() == self.capacity {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest call, if any.
    pub fn last(&self) -> Option<&CalledEntryPoint> {
        self.calls.back()
    }

    /// Attach a return value to the newest call.
    pub fn set_ret_val(&mut self, value: AnyValue) {
        if let Some(last) = self.calls.back_mut() {
            last.ret_val = Some(value);
        }
    }

    /// Attach an error code to the newest call.
    pub fn set_error(&mut self, error: u32) {
        if let Some(last) = self.calls.back_mut() {
            last.error = error;
        }
    }

    /// Attach debug output to the newest call.
    pub fn set_debug_output(&mut self, output: String) {
        if let Some(last) = self.calls.back_mut() {
            last.debug_output = Some(output);
        }
    }

    /// Records `[start, end)` counted back from the newest call (offset 0),
    /// returned oldest first. `end` is clamped to the history length.
    pub fn query(&self, start: u64, end: u64) -> CallTrace {
        let len = self.calls.len();
        let start_off = usize::try_from(start).unwrap_or(usize::MAX);
        let end_off = usize::try_from(end).unwrap_or(usize::MAX).min(len);

        let records = if start_off >= end_off {
            Vec::new()
        } else {
            self.calls
                .range(len - end_off..len - start_off)
                .cloned()
                .collect()
        };
        CallTrace { start, records }
    }
}
