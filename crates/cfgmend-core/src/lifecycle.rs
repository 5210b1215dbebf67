use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Reconciliation run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Merged,
    FirstNormalized,
    Checking,
    Restoring,
    Rechecking,
    Converged,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Merged => "merged",
            Self::FirstNormalized => "first_normalized",
            Self::Checking => "checking",
            Self::Restoring => "restoring",
            Self::Rechecking => "rechecking",
            Self::Converged => "converged",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: ReconcileState, to: ReconcileState) -> Result<(), CoreError> {
    use ReconcileState::{
        Checking, Converged, Failed, FirstNormalized, Merged, Rechecking, Restoring,
    };

    let valid = matches!(
        (from, to),
        (Merged, FirstNormalized)
            | (FirstNormalized, Checking)
            | (Checking, Converged | Restoring)
            | (Restoring, Rechecking)
            | (Rechecking, Converged | Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Current state plus every state visited, validated on each step.
#[derive(Debug, Clone)]
pub struct StateTracker {
    history: Vec<ReconcileState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            history: vec![ReconcileState::Merged],
        }
    }
}

impl StateTracker {
    pub fn current(&self) -> ReconcileState {
        self.history
            .last()
            .copied()
            .unwrap_or(ReconcileState::Merged)
    }

    pub fn advance(&mut self, to: ReconcileState) -> Result<(), CoreError> {
        validate_transition(self.current(), to)?;
        self.history.push(to);
        Ok(())
    }

    pub fn into_history(self) -> Vec<ReconcileState> {
        self.history
    }
}
