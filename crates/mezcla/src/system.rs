//! Process-wide audio system lifecycle.
//!
//! One `init` with a chosen backend, any number of device opens, one
//! `done`. The backend handle is process-global so device enumeration and
//! opening can be reached from anywhere without threading the backend
//! through the call graph.

use std::sync::{Arc, Mutex};

use mezcla_core::{Error, Result};
use mezcla_io::{AudioBackend, DeviceInfo};

static BACKEND: Mutex<Option<Arc<dyn AudioBackend>>> = Mutex::new(None);

/// Process-wide audio system: owns the backend between `init` and `done`.
pub struct AudioSystem;

impl AudioSystem {
    /// Initialize the audio system with the given backend.
    ///
    /// Fails with a state error when already initialized, and propagates
    /// the backend's own init failure.
    pub fn init(backend: Arc<dyn AudioBackend>) -> Result<()> {
        let mut guard = BACKEND.lock().expect("audio system poisoned");
        if guard.is_some() {
            return Err(Error::State("audio system already initialized".into()));
        }
        backend.init()?;
        tracing::info!(backend = backend.name(), "audio system initialized");
        *guard = Some(backend);
        Ok(())
    }

    /// Shut the audio system down, closing all still-open devices through
    /// the backend. Idempotent.
    pub fn done() {
        let backend = BACKEND.lock().expect("audio system poisoned").take();
        if let Some(backend) = backend {
            backend.shutdown();
            tracing::info!("audio system shut down");
        }
    }

    /// Whether `init` has succeeded and `done` has not yet run.
    pub fn is_initialized() -> bool {
        BACKEND
            .lock()
            .expect("audio system poisoned")
            .as_ref()
            .is_some_and(|b| b.is_initialized())
    }

    /// The backend registered by `init`.
    pub fn backend() -> Result<Arc<dyn AudioBackend>> {
        BACKEND
            .lock()
            .expect("audio system poisoned")
            .clone()
            .ok_or_else(|| Error::State("audio system not initialized".into()))
    }

    /// Enumerate devices through the registered backend.
    pub fn enumerate_devices(playback: bool) -> Result<Vec<DeviceInfo>> {
        Self::backend()?.enumerate_devices(playback)
    }

    /// The default device for the given direction.
    pub fn default_device(playback: bool) -> Result<DeviceInfo> {
        Self::backend()?.default_device(playback)
    }
}
