//! Decides where the traced process pauses.

use std::collections::BTreeSet;

use tracing::debug;

use tracedbg_proto::{BreakConfiguration, ContinueBreak, Entrypoint, StepMode};

/// Kind of the call that just returned, as far as stepping cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallKind {
    pub draw: bool,
    pub frame_delimiter: bool,
}

/// Pause bookkeeping for one traced process.
///
/// Starts paused so the controller sees the very first call.
#[derive(Debug, Clone)]
pub struct BreakState {
    paused: bool,
    break_next: bool,
    pending_step: Option<StepMode>,
    breakpoints: BTreeSet<Entrypoint>,
    configuration: BreakConfiguration,
}

impl Default for BreakState {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakState {
    pub fn new() -> Self {
        Self {
            paused: true,
            break_next: false,
            pending_step: None,
            breakpoints: BTreeSet::new(),
            configuration: BreakConfiguration::default(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn configuration(&self) -> &BreakConfiguration {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: BreakConfiguration) {
        self.configuration = configuration;
    }

    pub fn breakpoints(&self) -> &BTreeSet<Entrypoint> {
        &self.breakpoints
    }

    pub fn set_breakpoints(&mut self, breakpoints: BTreeSet<Entrypoint>) {
        self.breakpoints = breakpoints;
    }

    /// Apply a continue, step or interrupt command.
    pub fn handle_continue(&mut self, command: &ContinueBreak) {
        if command.interrupt {
            self.break_next = true;
            return;
        }
        self.paused = false;
        self.break_next = false;
        self.pending_step = None;
        match command.step_mode {
            None => {}
            Some(StepMode::Call) => self.break_next = true,
            Some(mode) => self.pending_step = Some(mode),
        }
    }

    /// Called before `entrypoint` executes. Returns `true` when the process
    /// must pause here, in which case the state is now paused.
    pub fn may_break_at(&mut self, entrypoint: Entrypoint) -> bool {
        let hit = self.paused || self.break_next || self.breakpoints.contains(&entrypoint);
        if hit {
            debug!(entrypoint, "breaking");
            self.paused = true;
            self.break_next = false;
            self.pending_step = None;
        }
        hit
    }

    /// Called after a call returns; completes draw-call and frame steps.
    pub fn after_call(&mut self, kind: CallKind) {
        let done = match self.pending_step {
            Some(StepMode::DrawCall) => kind.draw,
            Some(StepMode::Frame) => kind.frame_delimiter,
            _ => false,
        };
        if done {
            self.pending_step = None;
            self.break_next = true;
        }
    }

    /// The call raised an error; pause at the next call if configured to.
    pub fn set_break_on_error(&mut self) {
        if self.configuration.break_on_error {
            self.break_next = true;
        }
    }

    /// The call produced debug output; pause at the next call if configured to.
    pub fn set_break_on_debug_output(&mut self) {
        if self.configuration.break_on_debug_output {
            self.break_next = true;
        }
    }

    /// A shader failed to compile or a program failed to link.
    pub fn set_break_on_compiler_error(&mut self) {
        if self.configuration.break_on_compiler_error {
            self.break_next = true;
        }
    }
}
