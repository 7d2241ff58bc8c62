//! Controller lifecycle state machine
//!
//! | State | Serves fetches | Entered on |
//! |-------|----------------|------------|
//! | Installing | no | construction |
//! | Active | yes | activation |
//! | Superseded | no | a newer version activates |

use crate::error::{CampusError, CampusResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Installing,
    Active,
    Superseded,
}

impl ControllerState {
    /// Validate and return the next state
    pub fn transition(self, to: ControllerState) -> CampusResult<ControllerState> {
        use ControllerState::*;
        match (self, to) {
            (Installing, Active) | (Active, Superseded) => Ok(to),
            // A repeated activate event is harmless
            (Active, Active) => Ok(to),
            _ => Err(CampusError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Active => write!(f, "active"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// Lifecycle bookkeeping guarded by the controller's mutex
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lifecycle {
    pub state: ControllerState,
    /// Precache completed; activation is allowed
    pub installed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: ControllerState::Installing,
            installed: false,
        }
    }
}
