//! Audio device: binds a backend stream to a negotiated format and wires
//! the mixer's float output into the device callback.
//!
//! At open time the device negotiates a spec with the backend, looks up the
//! from-float converter for the obtained format, and hands the backend a
//! callback that asks the mixer for that many bytes on every pull. Devices
//! are move-only; dropping one tears down the stream and closes the
//! backend handle.

use std::sync::{Arc, Mutex};

use mezcla_core::{AudioSpec, Error, FromFloatFn, Result, SampleFormat, from_float_fn};
use mezcla_io::{AudioBackend, BackendStream, DeviceHandle, DeviceInfo};

use crate::mixer::Mixer;
use crate::pc_speaker::PcSpeakerStream;
use crate::source::AudioSource;
use crate::stream::{AudioStream, StreamEntry};

/// Samples requested per callback when the caller does not override it.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// An opened playback device with its own mixer.
pub struct AudioDevice {
    // Dropped first so the callback stops before the handle closes.
    stream: Option<Box<dyn BackendStream>>,
    backend: Arc<dyn AudioBackend>,
    handle: DeviceHandle,
    name: String,
    id: String,
    spec: AudioSpec,
    frame_size: usize,
    converter: FromFloatFn,
    mixer: Arc<Mixer>,
    stashed_gain: Mutex<Option<f32>>,
}

impl AudioDevice {
    /// Enumerate the backend's devices. Convenience forwarding of
    /// [`AudioBackend::enumerate_devices`].
    pub fn enumerate(backend: &Arc<dyn AudioBackend>, playback: bool) -> Result<Vec<DeviceInfo>> {
        backend.enumerate_devices(playback)
    }

    /// Open the default playback device, optionally requesting a spec.
    pub fn open_default(
        backend: Arc<dyn AudioBackend>,
        spec: Option<AudioSpec>,
    ) -> Result<Self> {
        let info = backend.default_device(true)?;
        Self::open_with_info(backend, info, spec)
    }

    /// Open a specific device by the opaque id from enumeration.
    pub fn open(
        backend: Arc<dyn AudioBackend>,
        device_id: &str,
        spec: Option<AudioSpec>,
    ) -> Result<Self> {
        let info = backend
            .enumerate_devices(true)?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| Error::Device(format!("no device with id '{device_id}'")))?;
        Self::open_with_info(backend, info, spec)
    }

    fn open_with_info(
        backend: Arc<dyn AudioBackend>,
        info: DeviceInfo,
        spec: Option<AudioSpec>,
    ) -> Result<Self> {
        if !backend.is_initialized() {
            return Err(Error::State(
                "audio system not initialized; call AudioSystem::init first".into(),
            ));
        }

        let desired = spec.unwrap_or(AudioSpec {
            format: SampleFormat::Unknown,
            channels: 0,
            rate: 0,
        });
        let (handle, obtained) = backend.open_device(&info.id, &desired)?;

        let Some(converter) = from_float_fn(obtained.format) else {
            backend.close_device(handle);
            return Err(Error::Format(format!(
                "no from-float converter for device format {}",
                obtained.format
            )));
        };

        let mixer = Arc::new(Mixer::new(obtained, DEFAULT_FRAME_SIZE));
        let callback_mixer = Arc::clone(&mixer);
        let stream = backend
            .create_stream(
                handle,
                &obtained,
                Box::new(move |bytes: &mut [u8]| callback_mixer.mix_into(bytes, converter)),
            )
            .inspect_err(|_| backend.close_device(handle))?;

        tracing::info!(
            device = %info.name,
            format = %obtained.format,
            channels = obtained.channels,
            rate = obtained.rate,
            "audio device opened"
        );

        Ok(Self {
            stream: Some(stream),
            backend,
            handle,
            name: info.name,
            id: info.id,
            spec: obtained,
            frame_size: DEFAULT_FRAME_SIZE,
            converter,
            mixer,
            stashed_gain: Mutex::new(None),
        })
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque device id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Negotiated sample format.
    pub fn format(&self) -> SampleFormat {
        self.spec.format
    }

    /// Negotiated channel count.
    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    /// Negotiated sample rate in Hz.
    pub fn rate(&self) -> u32 {
        self.spec.rate
    }

    /// The backend handle this device was opened as.
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// The from-float converter chosen for the negotiated format.
    pub fn converter(&self) -> FromFloatFn {
        self.converter
    }

    /// The mixer every stream on this device is registered with.
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Pause device playback.
    pub fn pause(&self) -> bool {
        self.backend.pause_device(self.handle)
    }

    /// Resume device playback.
    pub fn resume(&self) -> bool {
        self.backend.resume_device(self.handle)
    }

    /// Whether the device is paused.
    pub fn is_paused(&self) -> bool {
        self.backend.is_device_paused(self.handle)
    }

    /// Device gain (1.0 = unity).
    pub fn gain(&self) -> f32 {
        self.backend.device_gain(self.handle)
    }

    /// Set device gain.
    pub fn set_gain(&self, gain: f32) {
        self.backend.set_device_gain(self.handle, gain);
    }

    /// Whether the backend mutes in hardware.
    pub fn has_hardware_mute(&self) -> bool {
        self.backend.has_hardware_mute()
    }

    /// Mute all output. Uses the backend's hardware mute when it has one;
    /// otherwise stashes the gain and sets it to zero.
    pub fn mute_all(&self) {
        if self.backend.has_hardware_mute() {
            self.backend.set_hardware_mute(self.handle, true);
            return;
        }
        let mut stashed = self.stashed_gain.lock().expect("gain stash poisoned");
        if stashed.is_none() {
            *stashed = Some(self.gain());
            self.set_gain(0.0);
        }
    }

    /// Undo [`AudioDevice::mute_all`]: lift the hardware mute, or restore
    /// the stashed gain on backends without one.
    pub fn unmute_all(&self) {
        if self.backend.has_hardware_mute() {
            self.backend.set_hardware_mute(self.handle, false);
            return;
        }
        let mut stashed = self.stashed_gain.lock().expect("gain stash poisoned");
        if let Some(gain) = stashed.take() {
            self.set_gain(gain);
        }
    }

    /// Whether [`AudioDevice::mute_all`] is in effect.
    pub fn is_all_muted(&self) -> bool {
        if self.backend.has_hardware_mute() {
            return self.backend.is_hardware_muted(self.handle);
        }
        self.stashed_gain
            .lock()
            .expect("gain stash poisoned")
            .is_some()
    }

    /// Create a playback stream for an audio source. The source is opened
    /// against this device's spec; the stream starts idle.
    pub fn create_stream(&self, mut source: AudioSource) -> Result<AudioStream> {
        source.open(self.spec.rate, self.spec.channels, self.frame_size)?;
        let token = self.mixer.register(StreamEntry::new(source));
        Ok(AudioStream::new(Arc::clone(&self.mixer), token))
    }

    /// Create a PC-speaker stream: a queue of square-wave tones with MML
    /// support, mixed like any other stream.
    pub fn create_pc_speaker_stream(&self) -> Result<PcSpeakerStream> {
        PcSpeakerStream::create(self)
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.stream.take();
        self.backend.close_device(self.handle);
    }
}
