/// The application state is responsible for:
///
/// - Maintaining the lifecycle state of the server
/// - Exposing liveness/readiness answers for the health surface
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

/** Application lifecycle states. */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApplicationState {
    /// Unknown state, typically the initial state.
    Unknown = 0,
    /// The application is initializing.
    Initializing = 1,
    /// Loading plugins.
    LoadingPlugins = 2,
    /// Starting network services.
    StartingNetwork = 3,
    /// The application is ready to serve requests.
    Ready = 4,
    /// The application is terminating.
    Terminating = 5,
}

// Shared lifecycle state for the Harbor server.
//
// Transports and the health endpoint read this to answer liveness and
// readiness; `main` advances it through the startup sequence.
#[derive(Debug)]
pub struct AppState {
    /// Current application lifecycle state.
    state: AtomicU8,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ApplicationState::Unknown as u8),
        }
    }
}

impl AppState {
    /// Set application lifecycle state.
    pub fn set_state(&self, value: ApplicationState) {
        let v = value as u8;
        debug!("Application state changed to {:?}", v);
        self.state.store(v, Ordering::Relaxed);
    }

    /// Returns true if the application is running (liveness check).
    /// This is a basic check that the process is alive and not terminated.
    pub fn is_alive(&self) -> bool {
        let state = self.state.load(Ordering::SeqCst);
        state >= ApplicationState::Initializing as u8 && state < ApplicationState::Terminating as u8
    }

    /// Returns true if the application is ready to serve requests.
    /// This indicates the app has completed initialization and is fully operational.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ApplicationState::Ready as u8
    }
}
