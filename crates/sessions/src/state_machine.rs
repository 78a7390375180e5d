//! Engagement lifecycle state machine.
//!
//! States and legal transitions:
//!
//! ```text
//! INITIALIZING --start--> RUNNING
//! RUNNING      --pause--> PAUSED
//! PAUSED       --resume-> RUNNING
//! RUNNING      --stop---> STOPPED
//! PAUSED       --stop---> STOPPED
//! STOPPED      --complete-> COMPLETED
//! ```
//!
//! Pause/resume are hot-state transitions: no I/O, state lives in RAM.
//! Stop is a cold-state transition: the caller is expected to checkpoint
//! before calling [`EngagementStateMachine::stop`].

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngagementState {
    Initializing,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl fmt::Display for EngagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

#[must_use]
pub fn is_valid_transition(from: EngagementState, to: EngagementState) -> bool {
    use EngagementState::{Completed, Initializing, Paused, Running, Stopped};
    matches!(
        (from, to),
        (Initializing, Running)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Stopped)
            | (Paused, Stopped)
            | (Stopped, Completed)
    )
}

type Listener = Box<dyn Fn(EngagementState, EngagementState) + Send + Sync>;

/// Tracks one engagement's current state and notifies listeners on change.
pub struct EngagementStateMachine {
    engagement_id: String,
    current: EngagementState,
    listeners: Vec<Listener>,
}

impl EngagementStateMachine {
    #[must_use]
    pub fn new(engagement_id: impl Into<String>) -> Self {
        Self {
            engagement_id: engagement_id.into(),
            current: EngagementState::Initializing,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_state(&self) -> EngagementState {
        self.current
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(EngagementState, EngagementState) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn transition(&mut self, to: EngagementState) -> Result<EngagementState> {
        if !is_valid_transition(self.current, to) {
            return Err(Error::InvalidTransition {
                engagement_id: self.engagement_id.clone(),
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }
        let from = self.current;
        self.current = to;
        for listener in &self.listeners {
            listener(from, to);
        }
        Ok(to)
    }

    pub fn start(&mut self) -> Result<EngagementState> {
        self.transition(EngagementState::Running)
    }

    pub fn pause(&mut self) -> Result<EngagementState> {
        self.transition(EngagementState::Paused)
    }

    pub fn resume(&mut self) -> Result<EngagementState> {
        self.transition(EngagementState::Running)
    }

    pub fn stop(&mut self) -> Result<EngagementState> {
        self.transition(EngagementState::Stopped)
    }

    pub fn complete(&mut self) -> Result<EngagementState> {
        self.transition(EngagementState::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_initializing() {
        let sm = EngagementStateMachine::new("eng-1");
        assert_eq!(sm.current_state(), EngagementState::Initializing);
    }

    #[test]
    fn full_lifecycle_succeeds() {
        let mut sm = EngagementStateMachine::new("eng-1");
        assert_eq!(sm.start().unwrap(), EngagementState::Running);
        assert_eq!(sm.pause().unwrap(), EngagementState::Paused);
        assert_eq!(sm.resume().unwrap(), EngagementState::Running);
        assert_eq!(sm.stop().unwrap(), EngagementState::Stopped);
        assert_eq!(sm.complete().unwrap(), EngagementState::Completed);
    }

    #[test]
    fn cannot_pause_before_start() {
        let mut sm = EngagementStateMachine::new("eng-1");
        assert!(sm.pause().is_err());
    }

    #[test]
    fn cannot_complete_from_running() {
        let mut sm = EngagementStateMachine::new("eng-1");
        sm.start().unwrap();
        assert!(sm.complete().is_err());
    }

    #[test]
    fn paused_can_stop_directly() {
        let mut sm = EngagementStateMachine::new("eng-1");
        sm.start().unwrap();
        sm.pause().unwrap();
        assert_eq!(sm.stop().unwrap(), EngagementState::Stopped);
    }

    #[test]
    fn listener_observes_transition() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let observed = Arc::new(AtomicBool::new(false));
        let observed_clone = observed.clone();
        let mut sm = EngagementStateMachine::new("eng-1");
        sm.add_listener(move |from, to| {
            if from == EngagementState::Initializing && to == EngagementState::Running {
                observed_clone.store(true, Ordering::SeqCst);
            }
        });
        sm.start().unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }
}
