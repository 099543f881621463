use std::fmt;

use thiserror::Error;

use crate::shared::constants::{
    MESSAGE_CAMERA_FAILED, MESSAGE_INIT_FAILED, STATUS_ACCESSING_CAMERA, STATUS_ACTIVE,
    STATUS_INITIALIZING,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Initializing,
    AwaitingCamera,
    Active,
    Error,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderState::Initializing => "initializing",
            RenderState::AwaitingCamera => "awaiting-camera",
            RenderState::Active => "active",
            RenderState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    EngineReady,
    EngineFailed,
    FirstFrameDecoded,
    CameraFailed,
    Restart,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition: {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: RenderState,
    pub event: LifecycleEvent,
}

/// The only way the render state changes.
pub fn transition(
    from: &RenderState,
    event: LifecycleEvent,
) -> Result<RenderState, InvalidTransition> {
    use LifecycleEvent::*;
    use RenderState::*;

    match (*from, event) {
        (Initializing, EngineReady) => Ok(AwaitingCamera),
        (Initializing, EngineFailed) => Ok(Error),
        (AwaitingCamera, FirstFrameDecoded) => Ok(Active),
        (AwaitingCamera, CameraFailed) => Ok(Error),
        (Error, Restart) => Ok(Initializing),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

/// Failures that put the controller in [`RenderState::Error`].
///
/// `Display` is the message shown to the user; the technical cause is kept
/// in `detail` for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{}", MESSAGE_INIT_FAILED)]
    Initialization { detail: String },
    #[error("{}", MESSAGE_CAMERA_FAILED)]
    CameraAccess { detail: String },
}

impl LifecycleError {
    pub fn detail(&self) -> &str {
        match self {
            LifecycleError::Initialization { detail } | LifecycleError::CameraAccess { detail } => {
                detail
            }
        }
    }
}

/// Published on every state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: RenderState,
    pub message: String,
    /// Whether a loading indicator should be shown.
    pub loading: bool,
}

impl StatusUpdate {
    pub fn for_state(state: RenderState, error: Option<&LifecycleError>) -> Self {
        let message = match (state, error) {
            (RenderState::Initializing, _) => STATUS_INITIALIZING.to_string(),
            (RenderState::AwaitingCamera, _) => STATUS_ACCESSING_CAMERA.to_string(),
            (RenderState::Active, _) => STATUS_ACTIVE.to_string(),
            (RenderState::Error, Some(e)) => e.to_string(),
            (RenderState::Error, None) => MESSAGE_INIT_FAILED.to_string(),
        };
        Self {
            state,
            message,
            loading: matches!(state, RenderState::Initializing | RenderState::AwaitingCamera),
        }
    }
}
