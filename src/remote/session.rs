//! Remote-browser session registry.
//!
//! # Responsibilities
//! - Start sessions without waiting for the browser to come up
//! - Route frames and input to the right browser handle
//! - Close sessions on request or after they sit idle too long
//!
//! # Design Decisions
//! - Registry entries are never borrowed across an `.await`; handles are
//!   cloned out first so driver latency cannot block the map
//! - A session stopped while still opening is closed by the opening task

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use crate::config::RemoteBrowserConfig;
use crate::observability::metrics;
use crate::remote::driver::{BrowserAction, BrowserDriver, BrowserHandle, SessionError, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Ready,
    Error,
}

#[derive(Debug)]
struct Session {
    target: Url,
    status: SessionStatus,
    handle: Option<BrowserHandle>,
    error: Option<String>,
    last_active: Instant,
}

/// Public view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    #[serde(rename = "sessionId")]
    pub id: String,
    pub status: SessionStatus,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    sessions: DashMap<String, Session>,
    idle_timeout: Duration,
    viewport: Viewport,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: &RemoteBrowserConfig) -> Self {
        Self {
            driver,
            sessions: DashMap::new(),
            idle_timeout: Duration::from_secs(config.session_idle_secs),
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
        }
    }

    /// Register a session and open the browser in the background.
    pub fn start(self: &Arc<Self>, target: Url) -> SessionInfo {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            target: target.clone(),
            status: SessionStatus::Initializing,
            handle: None,
            error: None,
            last_active: Instant::now(),
        };
        let info = info(&id, &session);
        self.sessions.insert(id.clone(), session);
        metrics::set_active_sessions(self.sessions.len());

        tracing::info!(session_id = %id, url = %target, "Remote session starting");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let opened = manager.driver.open(&target, manager.viewport).await;
            manager.finish_open(&id, opened).await;
        });

        info
    }

    async fn finish_open(&self, id: &str, opened: Result<BrowserHandle, SessionError>) {
        match opened {
            Ok(handle) => {
                let orphaned = match self.sessions.get_mut(id) {
                    Some(mut session) => {
                        session.status = SessionStatus::Ready;
                        session.handle = Some(handle.clone());
                        session.last_active = Instant::now();
                        false
                    }
                    None => true,
                };
                if orphaned {
                    tracing::debug!(session_id = %id, "Session stopped while opening");
                    self.close_handle(id, &handle).await;
                } else {
                    tracing::info!(session_id = %id, "Remote session ready");
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Remote session failed to open");
                if let Some(mut session) = self.sessions.get_mut(id) {
                    session.status = SessionStatus::Error;
                    session.error = Some(e.to_string());
                }
            }
        }
    }

    pub fn status(&self, id: &str) -> Result<SessionInfo, SessionError> {
        self.sessions
            .get(id)
            .map(|s| info(id, &s))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Latest screenshot. `NotReady` while the browser is still opening.
    pub async fn frame(&self, id: &str) -> Result<Bytes, SessionError> {
        let handle = self.ready_handle(id)?;
        self.driver.screenshot(&handle).await
    }

    pub async fn action(&self, id: &str, action: &BrowserAction) -> Result<(), SessionError> {
        action.validate()?;
        let handle = self.ready_handle(id)?;
        tracing::debug!(session_id = %id, kind = action.kind(), "Remote session action");
        self.driver.perform(&handle, action).await
    }

    pub async fn stop(&self, id: &str) -> Result<(), SessionError> {
        let (_, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        metrics::set_active_sessions(self.sessions.len());

        if let Some(handle) = session.handle {
            self.close_handle(id, &handle).await;
        }
        tracing::info!(session_id = %id, "Remote session stopped");
        Ok(())
    }

    /// Close sessions idle since before `now - idle_timeout`.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.last_active) >= self.idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for id in expired {
            if let Some((_, session)) = self.sessions.remove(&id) {
                if let Some(handle) = session.handle {
                    self.close_handle(&id, &handle).await;
                }
                closed += 1;
            }
        }

        if closed > 0 {
            tracing::info!(closed, remaining = self.sessions.len(), "Swept idle remote sessions");
            metrics::set_active_sessions(self.sessions.len());
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Periodic idle sweep until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_at(Instant::now()).await;
                }
                _ = shutdown.recv() => {
                    let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
                    for id in ids {
                        let _ = self.stop(&id).await;
                    }
                    tracing::debug!("Remote session sweeper stopped");
                    return;
                }
            }
        }
    }

    fn ready_handle(&self, id: &str) -> Result<BrowserHandle, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.last_active = Instant::now();

        match (session.status, &session.handle) {
            (SessionStatus::Ready, Some(handle)) => Ok(handle.clone()),
            (SessionStatus::Error, _) => Err(SessionError::Driver(
                session.error.clone().unwrap_or_else(|| "session failed".into()),
            )),
            _ => Err(SessionError::NotReady),
        }
    }

    async fn close_handle(&self, id: &str, handle: &BrowserHandle) {
        if let Err(e) = self.driver.close(handle).await {
            tracing::warn!(session_id = %id, error = %e, "Failed to close browser session");
        }
    }
}

fn info(id: &str, session: &Session) -> SessionInfo {
    SessionInfo {
        id: id.to_string(),
        status: session.status,
        url: session.target.to_string(),
        error: session.error.clone(),
    }
}
