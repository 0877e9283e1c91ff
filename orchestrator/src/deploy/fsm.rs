//! Finite State Machine for instance lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Deploy job triggered, not finished yet
    Provisioning,

    /// Deploy job succeeded
    Running,

    /// Service confirmed complete by the deploy job callback
    Success,

    /// Deploy job failed
    Failed,

    /// Delete job succeeded; terminal
    Stopped,

    /// Delete job in flight
    Deleting,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Running => "running",
            InstanceStatus::Success => "success",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Deleting => "deleting",
        }
    }

    /// Whether an instance in this status occupies its deployment slot
    pub fn is_live(&self) -> bool {
        !matches!(self, InstanceStatus::Failed | InstanceStatus::Stopped)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance event
#[derive(Debug, Clone)]
pub enum InstanceEvent {
    /// Deploy build finished successfully
    JobSucceeded,

    /// Deploy build failed
    JobFailed(String),

    /// Deploy job reported the service through the callback
    Registered,

    /// Deploy job reported completion through the callback
    Complete,

    /// Delete job about to be triggered
    DeleteRequested,

    /// Delete build finished successfully
    DeleteSucceeded,

    /// Delete build failed or could not be triggered
    DeleteFailed(String),
}

/// Instance FSM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFsm {
    #[serde(rename = "status")]
    state: InstanceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(
        rename = "status_before_delete",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    restore_to: Option<InstanceStatus>,
}

impl InstanceFsm {
    /// Create a new FSM in provisioning state
    pub fn new() -> Self {
        Self {
            state: InstanceStatus::Provisioning,
            error: None,
            restore_to: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &InstanceStatus {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Status a failed delete falls back to
    pub fn restore_to(&self) -> Option<&InstanceStatus> {
        self.restore_to.as_ref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: InstanceEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            // From Provisioning
            (InstanceStatus::Provisioning, InstanceEvent::JobSucceeded)
            | (InstanceStatus::Provisioning, InstanceEvent::Registered) => {
                self.error = None;
                InstanceStatus::Running
            }
            (InstanceStatus::Provisioning, InstanceEvent::JobFailed(err)) => {
                self.error = Some(err.clone());
                InstanceStatus::Failed
            }

            // From Running
            (InstanceStatus::Running, InstanceEvent::Registered) => InstanceStatus::Running,
            (InstanceStatus::Running, InstanceEvent::Complete) => InstanceStatus::Success,

            // Delete from any settled or in-progress state
            (
                state @ (InstanceStatus::Provisioning
                | InstanceStatus::Running
                | InstanceStatus::Success
                | InstanceStatus::Failed),
                InstanceEvent::DeleteRequested,
            ) => {
                self.restore_to = Some(*state);
                InstanceStatus::Deleting
            }

            // From Deleting
            (InstanceStatus::Deleting, InstanceEvent::DeleteSucceeded) => {
                self.restore_to = None;
                InstanceStatus::Stopped
            }
            (InstanceStatus::Deleting, InstanceEvent::DeleteFailed(err)) => {
                self.error = Some(err.clone());
                self.restore_to
                    .take()
                    .ok_or_else(|| "Deleting without a previous status".to_string())?
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for InstanceFsm {
    fn default() -> Self {
        Self::new()
    }
}
