//! Browser driver seam.
//!
//! The session manager only talks to this trait; the WebDriver backend is
//! one implementation and tests plug in an in-memory one.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors from the remote-browser layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session is not ready")]
    NotReady,

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

/// Opaque handle the driver hands back from `open`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowserHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// User input forwarded to the remote page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BrowserAction {
    Click { x: i64, y: i64 },
    Type { text: String },
    Scroll { dx: i64, dy: i64 },
    Key { key: String },
    Upload {
        #[serde(default)]
        selector: Option<String>,
        path: String,
    },
}

impl BrowserAction {
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserAction::Click { .. } => "click",
            BrowserAction::Type { .. } => "type",
            BrowserAction::Scroll { .. } => "scroll",
            BrowserAction::Key { .. } => "key",
            BrowserAction::Upload { .. } => "upload",
        }
    }

    /// Reject payloads no driver could act on.
    pub fn validate(&self) -> Result<(), SessionError> {
        match self {
            BrowserAction::Click { x, y } if *x < 0 || *y < 0 => Err(SessionError::InvalidAction(
                "click coordinates must be non-negative".into(),
            )),
            BrowserAction::Key { key } if key.is_empty() => {
                Err(SessionError::InvalidAction("key must not be empty".into()))
            }
            BrowserAction::Upload { path, .. } if path.is_empty() => {
                Err(SessionError::InvalidAction("upload path must not be empty".into()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    async fn open(&self, url: &Url, viewport: Viewport) -> Result<BrowserHandle, SessionError>;

    /// PNG screenshot of the current viewport.
    async fn screenshot(&self, handle: &BrowserHandle) -> Result<Bytes, SessionError>;

    async fn perform(&self, handle: &BrowserHandle, action: &BrowserAction) -> Result<(), SessionError>;

    async fn close(&self, handle: &BrowserHandle) -> Result<(), SessionError>;
}
