//! Audio backend layer for the mezcla playback engine.
//!
//! This crate defines the [`AudioBackend`] capability set the engine
//! consumes — device enumeration, open/close, pause/resume, gain, and
//! stream creation — plus two implementations:
//!
//! - [`CpalBackend`]: the default desktop backend (ALSA, CoreAudio, WASAPI)
//! - [`NullBackend`]: a silent, manually-pumped backend for tests and
//!   headless hosts
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mezcla_io::{AudioBackend, CpalBackend};
//!
//! let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new());
//! backend.init()?;
//! for device in backend.enumerate_devices(true)? {
//!     println!("{} ({} Hz)", device.name, device.rate);
//! }
//! ```

mod backend;
mod cpal_backend;
mod null;

pub use backend::{
    AudioBackend, BackendStream, DeviceHandle, DeviceInfo, StreamCallback,
};
pub use cpal_backend::CpalBackend;
pub use null::NullBackend;
