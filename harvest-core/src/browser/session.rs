use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use super::error::BrowserResult;
use super::page::{PageSession, PageSessionFactory};

/// A live browser plus the page every sequential step drives.
#[async_trait(?Send)]
pub trait ManagedSession {
    fn main_page(&self) -> &dyn PageSession;
    /// Opens additional tabs in the same browser.
    fn pages(&self) -> &dyn PageSessionFactory;
    async fn shutdown(&self) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait SessionLauncher {
    type Session: ManagedSession;

    /// Launches a browser. Implementations close anything they started
    /// before returning an error.
    async fn launch(&self) -> BrowserResult<Self::Session>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Active,
    Destroyed,
}

enum SessionState<S> {
    Uninitialized,
    Active(Arc<S>),
    Destroyed,
}

impl<S> SessionState<S> {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Uninitialized => SessionPhase::Uninitialized,
            SessionState::Active(_) => SessionPhase::Active,
            SessionState::Destroyed => SessionPhase::Destroyed,
        }
    }
}

/// Owns at most one live session at a time and hands it out lazily.
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    state: AsyncMutex<SessionState<L::Session>>,
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            state: AsyncMutex::new(SessionState::Uninitialized),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase()
    }

    /// Returns the active session, launching one when none is live.
    pub async fn acquire(&self) -> BrowserResult<Arc<L::Session>> {
        let mut state = self.state.lock().await;
        if let SessionState::Active(session) = &*state {
            return Ok(Arc::clone(session));
        }
        match self.launcher.launch().await {
            Ok(session) => {
                let session = Arc::new(session);
                *state = SessionState::Active(Arc::clone(&session));
                info!("browser session active");
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "browser session launch failed");
                *state = SessionState::Destroyed;
                Err(err)
            }
        }
    }

    /// Closes the live session, if any. Safe to call repeatedly.
    pub async fn destroy(&self) -> BrowserResult<()> {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Destroyed)
        };
        match previous {
            SessionState::Active(session) => {
                info!("tearing down browser session");
                session.shutdown().await
            }
            SessionState::Uninitialized | SessionState::Destroyed => Ok(()),
        }
    }
}
