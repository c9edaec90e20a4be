//! Silent in-process backend for tests and headless hosts.
//!
//! The null backend owns no OS resources and never spawns an audio thread;
//! instead the host drives playback by calling [`NullBackend::pump`], which
//! invokes the registered stream callback and returns the bytes it
//! produced. Device negotiation accepts whatever the caller asks for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mezcla_core::{AudioSpec, Error, Result, SAMPLE_F32_SYS, SampleFormat};

use crate::backend::{AudioBackend, BackendStream, DeviceHandle, DeviceInfo, StreamCallback};

/// Shared state between a [`NullBackend`] device entry and the stream
/// handle the engine owns.
struct StreamSlot {
    callback: Mutex<Option<StreamCallback>>,
    paused: AtomicBool,
    bound: AtomicBool,
    queue: Mutex<Vec<u8>>,
}

impl StreamSlot {
    fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            paused: AtomicBool::new(false),
            bound: AtomicBool::new(true),
            queue: Mutex::new(Vec::new()),
        }
    }
}

struct NullDevice {
    spec: AudioSpec,
    gain: f32,
    paused: bool,
    muted: bool,
    slot: Arc<StreamSlot>,
}

#[derive(Default)]
struct NullState {
    initialized: bool,
    next_handle: u64,
    devices: HashMap<u64, NullDevice>,
}

/// Backend that produces no sound and is pumped manually.
#[derive(Default)]
pub struct NullBackend {
    state: Mutex<NullState>,
    hardware_mute: bool,
}

impl NullBackend {
    /// Create an uninitialized null backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a null backend that advertises hardware mute, for exercising
    /// the hardware-mute path without real hardware.
    pub fn with_hardware_mute() -> Self {
        Self {
            hardware_mute: true,
            ..Self::default()
        }
    }

    /// Drive the device callback by hand: ask the stream bound to `handle`
    /// for `byte_len` bytes of audio.
    ///
    /// Returns `None` when the device or stream is paused, unbound, closed,
    /// or has no stream yet — the cases where a real backend would not be
    /// invoking the callback either.
    pub fn pump(&self, handle: DeviceHandle, byte_len: usize) -> Option<Vec<u8>> {
        let (slot, muted) = {
            let state = self.state.lock().expect("null backend poisoned");
            let device = state.devices.get(&handle.0)?;
            if device.paused {
                return None;
            }
            (Arc::clone(&device.slot), device.muted)
        };

        if slot.paused.load(Ordering::Acquire) || !slot.bound.load(Ordering::Acquire) {
            return None;
        }

        // Invoke outside the state lock: the callback takes the mixer lock
        // and must never nest inside ours.
        let mut guard = slot.callback.lock().expect("stream slot poisoned");
        let callback = guard.as_mut()?;
        let mut buf = vec![0u8; byte_len];
        callback(&mut buf);
        if muted {
            // Hardware mute silences at the jack; the callback still ran.
            buf.fill(0);
        }
        Some(buf)
    }
}

impl AudioBackend for NullBackend {
    fn init(&self) -> Result<()> {
        let mut state = self.state.lock().expect("null backend poisoned");
        state.initialized = true;
        tracing::info!("null backend initialized");
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().expect("null backend poisoned");
        state.devices.clear();
        state.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().expect("null backend poisoned").initialized
    }

    fn name(&self) -> &str {
        "null"
    }

    fn enumerate_devices(&self, playback: bool) -> Result<Vec<DeviceInfo>> {
        if !playback {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceInfo {
            name: "Null Output".into(),
            id: "null".into(),
            is_default: true,
            channels: 2,
            rate: 48000,
        }])
    }

    fn default_device(&self, playback: bool) -> Result<DeviceInfo> {
        self.enumerate_devices(playback)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Device("null backend has no capture devices".into()))
    }

    fn open_device(
        &self,
        _device_id: &str,
        desired: &AudioSpec,
    ) -> Result<(DeviceHandle, AudioSpec)> {
        let mut state = self.state.lock().expect("null backend poisoned");
        if !state.initialized {
            return Err(Error::State("null backend not initialized".into()));
        }

        // Accept the request verbatim, filling in defaults for blanks.
        let obtained = AudioSpec {
            format: if desired.format == SampleFormat::Unknown {
                SAMPLE_F32_SYS
            } else {
                desired.format
            },
            channels: if desired.channels == 0 {
                2
            } else {
                desired.channels
            },
            rate: if desired.rate == 0 { 48000 } else { desired.rate },
        };

        state.next_handle += 1;
        let handle = state.next_handle;
        state.devices.insert(
            handle,
            NullDevice {
                spec: obtained,
                gain: 1.0,
                paused: false,
                muted: false,
                slot: Arc::new(StreamSlot::new()),
            },
        );
        Ok((DeviceHandle(handle), obtained))
    }

    fn close_device(&self, handle: DeviceHandle) {
        let mut state = self.state.lock().expect("null backend poisoned");
        state.devices.remove(&handle.0);
    }

    fn device_format(&self, handle: DeviceHandle) -> Result<SampleFormat> {
        let state = self.state.lock().expect("null backend poisoned");
        state
            .devices
            .get(&handle.0)
            .map(|d| d.spec.format)
            .ok_or_else(|| Error::Device("unknown device handle".into()))
    }

    fn device_rate(&self, handle: DeviceHandle) -> Result<u32> {
        let state = self.state.lock().expect("null backend poisoned");
        state
            .devices
            .get(&handle.0)
            .map(|d| d.spec.rate)
            .ok_or_else(|| Error::Device("unknown device handle".into()))
    }

    fn device_channels(&self, handle: DeviceHandle) -> Result<u16> {
        let state = self.state.lock().expect("null backend poisoned");
        state
            .devices
            .get(&handle.0)
            .map(|d| d.spec.channels)
            .ok_or_else(|| Error::Device("unknown device handle".into()))
    }

    fn device_gain(&self, handle: DeviceHandle) -> f32 {
        let state = self.state.lock().expect("null backend poisoned");
        state.devices.get(&handle.0).map_or(1.0, |d| d.gain)
    }

    fn set_device_gain(&self, handle: DeviceHandle, gain: f32) {
        let mut state = self.state.lock().expect("null backend poisoned");
        if let Some(device) = state.devices.get_mut(&handle.0) {
            device.gain = gain.max(0.0);
        }
    }

    fn pause_device(&self, handle: DeviceHandle) -> bool {
        let mut state = self.state.lock().expect("null backend poisoned");
        match state.devices.get_mut(&handle.0) {
            Some(device) => {
                device.paused = true;
                true
            }
            None => false,
        }
    }

    fn resume_device(&self, handle: DeviceHandle) -> bool {
        let mut state = self.state.lock().expect("null backend poisoned");
        match state.devices.get_mut(&handle.0) {
            Some(device) => {
                device.paused = false;
                true
            }
            None => false,
        }
    }

    fn is_device_paused(&self, handle: DeviceHandle) -> bool {
        let state = self.state.lock().expect("null backend poisoned");
        state.devices.get(&handle.0).is_some_and(|d| d.paused)
    }

    fn has_hardware_mute(&self) -> bool {
        self.hardware_mute
    }

    fn set_hardware_mute(&self, handle: DeviceHandle, muted: bool) -> bool {
        if !self.hardware_mute {
            return false;
        }
        let mut state = self.state.lock().expect("null backend poisoned");
        match state.devices.get_mut(&handle.0) {
            Some(device) => {
                device.muted = muted;
                true
            }
            None => false,
        }
    }

    fn is_hardware_muted(&self, handle: DeviceHandle) -> bool {
        let state = self.state.lock().expect("null backend poisoned");
        state.devices.get(&handle.0).is_some_and(|d| d.muted)
    }

    fn create_stream(
        &self,
        handle: DeviceHandle,
        _spec: &AudioSpec,
        callback: StreamCallback,
    ) -> Result<Box<dyn BackendStream>> {
        let state = self.state.lock().expect("null backend poisoned");
        let device = state
            .devices
            .get(&handle.0)
            .ok_or_else(|| Error::Device("unknown device handle".into()))?;
        *device.slot.callback.lock().expect("stream slot poisoned") = Some(callback);
        device.slot.paused.store(false, Ordering::Release);
        device.slot.bound.store(true, Ordering::Release);
        Ok(Box::new(NullStream {
            slot: Arc::clone(&device.slot),
        }))
    }
}

struct NullStream {
    slot: Arc<StreamSlot>,
}

impl BackendStream for NullStream {
    fn put_data(&mut self, data: &[u8]) -> usize {
        let mut queue = self.slot.queue.lock().expect("stream slot poisoned");
        queue.extend_from_slice(data);
        data.len()
    }

    fn get_data(&mut self, data: &mut [u8]) -> usize {
        let mut queue = self.slot.queue.lock().expect("stream slot poisoned");
        let n = data.len().min(queue.len());
        data[..n].copy_from_slice(&queue[..n]);
        queue.drain(..n);
        n
    }

    fn clear(&mut self) {
        self.slot.queue.lock().expect("stream slot poisoned").clear();
    }

    fn queued_size(&self) -> usize {
        self.slot.queue.lock().expect("stream slot poisoned").len()
    }

    fn pause(&mut self) -> bool {
        self.slot.paused.store(true, Ordering::Release);
        true
    }

    fn resume(&mut self) -> bool {
        self.slot.paused.store(false, Ordering::Release);
        true
    }

    fn is_paused(&self) -> bool {
        self.slot.paused.load(Ordering::Acquire)
    }

    fn bind_to_device(&mut self) -> bool {
        self.slot.bound.store(true, Ordering::Release);
        true
    }

    fn unbind_from_device(&mut self) -> bool {
        self.slot.bound.store(false, Ordering::Release);
        true
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        self.slot.callback.lock().expect("stream slot poisoned").take();
    }
}
