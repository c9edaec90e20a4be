//! Pluggable audio backend abstraction.
//!
//! [`AudioBackend`] is the capability set the engine consumes to talk to an
//! OS audio subsystem: device enumeration, open/close, pause/resume, gain,
//! and stream-handle creation. The default implementation wraps cpal; the
//! trait is object-safe so backends can be swapped at runtime:
//!
//! - **Desktop**: [`CpalBackend`](crate::CpalBackend) (ALSA, CoreAudio,
//!   WASAPI) — the default
//! - **Headless / CI**: [`NullBackend`](crate::NullBackend), pumped by hand
//!
//! The engine only pushes: on every device callback it writes
//! float-converted bytes into the buffer the backend hands it. Queue-style
//! methods on [`BackendStream`] exist for backends whose native model is a
//! push queue rather than a pull callback.

use mezcla_core::{AudioSpec, Result, SampleFormat};

/// Information about one enumerable audio device.
///
/// `id` is opaque: it is only meaningful when passed back unchanged to
/// [`AudioBackend::open_device`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Opaque identifier for reopening this exact device.
    pub id: String,
    /// Whether this is the system default for its direction.
    pub is_default: bool,
    /// Channel count the device prefers.
    pub channels: u16,
    /// Sample rate the device prefers, in Hz.
    pub rate: u32,
}

/// Opaque handle to an opened device. Always nonzero for a live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Device callback: fill the byte buffer with audio in the negotiated
/// device format.
///
/// Invoked on the backend's audio thread; implementations must stay
/// realtime-safe (no blocking I/O, bounded work).
pub type StreamCallback = Box<dyn FnMut(&mut [u8]) + Send>;

/// A live audio stream bound to an opened device.
///
/// Dropping the stream stops playback; backends release their OS resources
/// in `Drop`.
pub trait BackendStream: Send {
    /// Queue raw bytes for playback. Callback-driven backends have no
    /// queue and return `0`.
    fn put_data(&mut self, _data: &[u8]) -> usize {
        0
    }

    /// Drain queued bytes. Callback-driven backends return `0`.
    fn get_data(&mut self, _data: &mut [u8]) -> usize {
        0
    }

    /// Discard any queued data.
    fn clear(&mut self) {}

    /// Number of bytes currently queued.
    fn queued_size(&self) -> usize {
        0
    }

    /// Pause this stream. Returns `false` if the backend refused.
    fn pause(&mut self) -> bool;

    /// Resume this stream. Returns `false` if the backend refused.
    fn resume(&mut self) -> bool;

    /// Whether the stream is paused.
    fn is_paused(&self) -> bool;

    /// Attach the stream to its device. Streams start bound; this exists
    /// for backends that support rebinding after an explicit unbind.
    fn bind_to_device(&mut self) -> bool {
        true
    }

    /// Detach the stream from its device without destroying it.
    fn unbind_from_device(&mut self) -> bool {
        false
    }
}

/// Abstract audio backend capability set.
///
/// One backend instance serves the whole process: `init` once, open and
/// close any number of devices, `shutdown` once. All methods take `&self`;
/// implementations guard their device table internally, because device
/// handles are used from both control threads and the audio thread.
pub trait AudioBackend: Send + Sync {
    /// Initialize OS-level resources. Must be called before any other
    /// operation.
    fn init(&self) -> Result<()>;

    /// Release all devices and OS-level resources.
    fn shutdown(&self);

    /// Whether `init` has succeeded and `shutdown` has not yet run.
    fn is_initialized(&self) -> bool;

    /// Short backend name, e.g. `"cpal"` or `"null"`.
    fn name(&self) -> &str;

    /// Enumerate playback (`true`) or capture (`false`) devices.
    fn enumerate_devices(&self, playback: bool) -> Result<Vec<DeviceInfo>>;

    /// The system default device for the given direction.
    fn default_device(&self, playback: bool) -> Result<DeviceInfo>;

    /// Open a device by opaque id, negotiating as close to `desired` as the
    /// hardware allows. Returns the handle and the spec actually obtained.
    fn open_device(&self, device_id: &str, desired: &AudioSpec)
    -> Result<(DeviceHandle, AudioSpec)>;

    /// Close a device handle. Idempotent.
    fn close_device(&self, handle: DeviceHandle);

    /// Negotiated sample format of an open device.
    fn device_format(&self, handle: DeviceHandle) -> Result<SampleFormat>;

    /// Negotiated sample rate of an open device.
    fn device_rate(&self, handle: DeviceHandle) -> Result<u32>;

    /// Negotiated channel count of an open device.
    fn device_channels(&self, handle: DeviceHandle) -> Result<u16>;

    /// Current device gain (1.0 = unity). Unknown handles report unity.
    fn device_gain(&self, handle: DeviceHandle) -> f32;

    /// Set device gain.
    fn set_device_gain(&self, handle: DeviceHandle, gain: f32);

    /// Pause playback on the device.
    fn pause_device(&self, handle: DeviceHandle) -> bool;

    /// Resume playback on the device.
    fn resume_device(&self, handle: DeviceHandle) -> bool;

    /// Whether the device is paused.
    fn is_device_paused(&self, handle: DeviceHandle) -> bool;

    /// Whether the backend can mute in hardware. When `true`,
    /// [`AudioBackend::set_hardware_mute`] actually silences the device;
    /// otherwise callers fall back to stashing the gain and setting it to
    /// zero.
    fn has_hardware_mute(&self) -> bool {
        false
    }

    /// Mute or unmute the device in hardware. Returns `false` when the
    /// backend has no hardware mute (the default).
    fn set_hardware_mute(&self, _handle: DeviceHandle, _muted: bool) -> bool {
        false
    }

    /// Whether the device is hardware-muted. Backends without hardware
    /// mute report `false`.
    fn is_hardware_muted(&self, _handle: DeviceHandle) -> bool {
        false
    }

    /// Create a stream on an open device. The callback is invoked on the
    /// audio thread to fill each buffer in the device's negotiated format.
    fn create_stream(
        &self,
        handle: DeviceHandle,
        spec: &AudioSpec,
        callback: StreamCallback,
    ) -> Result<Box<dyn BackendStream>>;
}
