//! cpal-based audio backend implementation.
//!
//! Wraps [cpal](https://crates.io/crates/cpal) for cross-platform audio
//! output: ALSA on Linux, CoreAudio on macOS, WASAPI on Windows. This is
//! the backend a desktop host normally hands to the audio system.
//!
//! The device callback contract is byte-level (the engine pushes bytes in
//! the negotiated format), while cpal's callbacks are typed sample slices;
//! the stream adapter bridges the two with a scratch byte buffer per
//! stream. Gain and pause are applied in the adapter because cpal exposes
//! no per-device gain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use mezcla_core::{
    AudioSpec, Error, Result, SAMPLE_F32_SYS, SAMPLE_S16_SYS, SAMPLE_S32_SYS, SampleFormat,
};

use crate::backend::{AudioBackend, BackendStream, DeviceHandle, DeviceInfo, StreamCallback};

/// Control block shared between the backend's device table and the stream
/// adapter running on the audio thread.
struct StreamCtl {
    paused: AtomicBool,
    gain_bits: AtomicU32,
}

impl StreamCtl {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Acquire))
    }

    fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Release);
    }
}

struct CpalDevice {
    device: cpal::Device,
    spec: AudioSpec,
    ctl: Arc<StreamCtl>,
}

#[derive(Default)]
struct CpalState {
    initialized: bool,
    next_handle: u64,
    devices: HashMap<u64, CpalDevice>,
}

/// Audio backend backed by cpal's default host.
#[derive(Default)]
pub struct CpalBackend {
    state: Mutex<CpalState>,
}

impl CpalBackend {
    /// Create an uninitialized cpal backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_device<T>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&CpalDevice) -> T,
    ) -> Result<T> {
        let state = self.state.lock().expect("cpal backend poisoned");
        state
            .devices
            .get(&handle.0)
            .map(f)
            .ok_or_else(|| Error::Device("unknown device handle".into()))
    }

    fn describe(device: &cpal::Device, is_default: bool) -> Option<DeviceInfo> {
        let name = device.name().ok()?;
        let config = device.default_output_config().ok()?;
        Some(DeviceInfo {
            id: name.clone(),
            name,
            is_default,
            channels: config.channels(),
            rate: config.sample_rate(),
        })
    }

    fn find_device(host: &cpal::Host, device_id: &str) -> Result<cpal::Device> {
        if device_id.is_empty() {
            return host
                .default_output_device()
                .ok_or_else(|| Error::Device("no default output device".into()));
        }
        let devices = host
            .output_devices()
            .map_err(|e| Error::Device(e.to_string()))?;
        for device in devices {
            if device.name().map(|n| n == device_id).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(Error::Device(format!("no output device named '{device_id}'")))
    }
}

/// Map a cpal sample format onto ours. cpal reports native-endian formats.
fn map_format(format: cpal::SampleFormat) -> SampleFormat {
    match format {
        cpal::SampleFormat::U8 => SampleFormat::U8,
        cpal::SampleFormat::I8 => SampleFormat::S8,
        cpal::SampleFormat::I16 => SAMPLE_S16_SYS,
        cpal::SampleFormat::I32 => SAMPLE_S32_SYS,
        // Everything else is streamed as float and converted by cpal's
        // own negotiation having picked f32.
        _ => SAMPLE_F32_SYS,
    }
}

impl AudioBackend for CpalBackend {
    fn init(&self) -> Result<()> {
        let mut state = self.state.lock().expect("cpal backend poisoned");
        state.initialized = true;
        tracing::info!(host = cpal::default_host().id().name(), "cpal backend initialized");
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().expect("cpal backend poisoned");
        state.devices.clear();
        state.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().expect("cpal backend poisoned").initialized
    }

    fn name(&self) -> &str {
        "cpal"
    }

    fn enumerate_devices(&self, playback: bool) -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = if playback {
            host.default_output_device().and_then(|d| d.name().ok())
        } else {
            host.default_input_device().and_then(|d| d.name().ok())
        };

        let mut out = Vec::new();
        if playback {
            let devices = host
                .output_devices()
                .map_err(|e| Error::Device(e.to_string()))?;
            for device in devices {
                let is_default =
                    device.name().ok().as_deref() == default_name.as_deref();
                if let Some(info) = Self::describe(&device, is_default) {
                    out.push(info);
                }
            }
        } else {
            let devices = host
                .input_devices()
                .map_err(|e| Error::Device(e.to_string()))?;
            for device in devices {
                if let Ok(name) = device.name()
                    && let Ok(config) = device.default_input_config()
                {
                    out.push(DeviceInfo {
                        id: name.clone(),
                        is_default: Some(&name) == default_name.as_ref(),
                        name,
                        channels: config.channels(),
                        rate: config.sample_rate(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn default_device(&self, playback: bool) -> Result<DeviceInfo> {
        let host = cpal::default_host();
        let device = if playback {
            host.default_output_device()
        } else {
            host.default_input_device()
        }
        .ok_or_else(|| Error::Device("no default device".into()))?;
        Self::describe(&device, true)
            .ok_or_else(|| Error::Device("default device has no usable config".into()))
    }

    fn open_device(
        &self,
        device_id: &str,
        desired: &AudioSpec,
    ) -> Result<(DeviceHandle, AudioSpec)> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device_id)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| Error::Device(format!("format negotiation failed: {e}")))?;

        // Start from the hardware's preferred config; honor a requested
        // rate or channel count when the caller supplied one.
        let obtained = AudioSpec {
            format: map_format(default_config.sample_format()),
            channels: if desired.channels > 0 {
                desired.channels
            } else {
                default_config.channels()
            },
            rate: if desired.rate > 0 {
                desired.rate
            } else {
                default_config.sample_rate()
            },
        };

        let mut state = self.state.lock().expect("cpal backend poisoned");
        if !state.initialized {
            return Err(Error::State("cpal backend not initialized".into()));
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.devices.insert(
            handle,
            CpalDevice {
                device,
                spec: obtained,
                ctl: Arc::new(StreamCtl::new()),
            },
        );
        tracing::info!(
            handle,
            format = %obtained.format,
            channels = obtained.channels,
            rate = obtained.rate,
            "opened cpal device"
        );
        Ok((DeviceHandle(handle), obtained))
    }

    fn close_device(&self, handle: DeviceHandle) {
        let mut state = self.state.lock().expect("cpal backend poisoned");
        state.devices.remove(&handle.0);
    }

    fn device_format(&self, handle: DeviceHandle) -> Result<SampleFormat> {
        self.with_device(handle, |d| d.spec.format)
    }

    fn device_rate(&self, handle: DeviceHandle) -> Result<u32> {
        self.with_device(handle, |d| d.spec.rate)
    }

    fn device_channels(&self, handle: DeviceHandle) -> Result<u16> {
        self.with_device(handle, |d| d.spec.channels)
    }

    fn device_gain(&self, handle: DeviceHandle) -> f32 {
        self.with_device(handle, |d| d.ctl.gain()).unwrap_or(1.0)
    }

    fn set_device_gain(&self, handle: DeviceHandle, gain: f32) {
        let _ = self.with_device(handle, |d| d.ctl.set_gain(gain.max(0.0)));
    }

    fn pause_device(&self, handle: DeviceHandle) -> bool {
        self.with_device(handle, |d| d.ctl.paused.store(true, Ordering::Release))
            .is_ok()
    }

    fn resume_device(&self, handle: DeviceHandle) -> bool {
        self.with_device(handle, |d| d.ctl.paused.store(false, Ordering::Release))
            .is_ok()
    }

    fn is_device_paused(&self, handle: DeviceHandle) -> bool {
        self.with_device(handle, |d| d.ctl.paused.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn create_stream(
        &self,
        handle: DeviceHandle,
        spec: &AudioSpec,
        callback: StreamCallback,
    ) -> Result<Box<dyn BackendStream>> {
        let (device, ctl) = self.with_device(handle, |d| {
            (d.device.clone(), Arc::clone(&d.ctl))
        })?;

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: spec.rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match spec.format.byte_size() {
            4 if spec.format.is_float() => {
                build_typed_stream::<f32>(&device, &config, callback, Arc::clone(&ctl), |b, gain| {
                    f32::from_ne_bytes(b.try_into().expect("4-byte chunk")) * gain
                })?
            }
            4 => build_typed_stream::<i32>(&device, &config, callback, Arc::clone(&ctl), |b, gain| {
                let v = f64::from(i32::from_ne_bytes(b.try_into().expect("4-byte chunk")));
                (v * f64::from(gain)).clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
            })?,
            2 => build_typed_stream::<i16>(&device, &config, callback, Arc::clone(&ctl), |b, gain| {
                let v = f32::from(i16::from_ne_bytes(b.try_into().expect("2-byte chunk")));
                (v * gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
            })?,
            1 if spec.format.is_signed() => {
                build_typed_stream::<i8>(&device, &config, callback, Arc::clone(&ctl), |b, gain| {
                    (f32::from(b[0] as i8) * gain).clamp(-128.0, 127.0) as i8
                })?
            }
            _ => build_typed_stream::<u8>(&device, &config, callback, Arc::clone(&ctl), |b, gain| {
                // u8 audio is centered on 128; scale the excursion only.
                ((f32::from(b[0]) - 128.0) * gain + 128.0).clamp(0.0, 255.0) as u8
            })?,
        };

        stream
            .play()
            .map_err(|e| Error::Device(format!("stream start failed: {e}")))?;
        Ok(Box::new(CpalStream { stream, ctl }))
    }
}

/// Build a cpal output stream of sample type `T`, adapting the engine's
/// byte-level callback. `decode` turns one sample's bytes back into `T`,
/// applying the current device gain on the way.
fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: StreamCallback,
    ctl: Arc<StreamCtl>,
    decode: impl Fn(&[u8], f32) -> T + Send + 'static,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let sample_bytes = size_of::<T>();
    let mut byte_buf: Vec<u8> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if ctl.paused.load(Ordering::Acquire) {
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                let needed = data.len() * sample_bytes;
                if byte_buf.len() < needed {
                    byte_buf.resize(needed, 0);
                }
                callback(&mut byte_buf[..needed]);
                let gain = ctl.gain();
                for (sample, bytes) in data.iter_mut().zip(byte_buf.chunks_exact(sample_bytes)) {
                    *sample = decode(bytes, gain);
                }
            },
            |err| tracing::warn!(error = %err, "cpal stream error"),
            None,
        )
        .map_err(|e| Error::Device(format!("stream build failed: {e}")))?;
    Ok(stream)
}

struct CpalStream {
    stream: cpal::Stream,
    ctl: Arc<StreamCtl>,
}

impl BackendStream for CpalStream {
    fn pause(&mut self) -> bool {
        if self.stream.pause().is_ok() {
            self.ctl.paused.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    fn resume(&mut self) -> bool {
        if self.stream.play().is_ok() {
            self.ctl.paused.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    fn is_paused(&self) -> bool {
        self.ctl.paused.load(Ordering::Acquire)
    }
}
