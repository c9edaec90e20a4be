//! Playback lifecycle tests driven through the null backend: looping,
//! fades, finish callbacks, and pause/resume, observed at the byte output.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mezcla::{
    AudioDevice, AudioSource, AudioSpec, ByteStream, Decoder, LoopPolicy, MemoryStream, PlayState,
    Result as CoreResult, SampleFormat,
};
use mezcla_io::{AudioBackend, NullBackend};

/// Mono DC source with a fixed frame count at 44.1 kHz.
struct DcDecoder {
    value: f32,
    total: usize,
    served: usize,
}

impl DcDecoder {
    fn new(value: f32, total: usize) -> Self {
        Self {
            value,
            total,
            served: 0,
        }
    }
}

impl Decoder for DcDecoder {
    fn name(&self) -> &'static str {
        "dc"
    }

    fn open(&mut self, _stream: Box<dyn ByteStream>) -> CoreResult<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn channels(&self) -> u16 {
        1
    }

    fn rate(&self) -> u32 {
        44100
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total as f64 / 44100.0)
    }

    fn rewind(&mut self) -> bool {
        self.served = 0;
        true
    }

    fn seek_to_time(&mut self, _pos: Duration) -> bool {
        false
    }

    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
        let n = buf.len().min(self.total - self.served);
        buf[..n].fill(self.value);
        self.served += n;
        *call_again = self.served < self.total;
        n
    }
}

/// Open a mono f32le device at 44.1 kHz on a fresh null backend.
fn open_mono_device() -> (Arc<NullBackend>, AudioDevice) {
    let backend = Arc::new(NullBackend::new());
    backend.init().unwrap();
    let device = AudioDevice::open_default(
        Arc::<NullBackend>::clone(&backend) as Arc<dyn AudioBackend>,
        Some(AudioSpec {
            format: SampleFormat::F32Le,
            channels: 1,
            rate: 44100,
        }),
    )
    .unwrap();
    (backend, device)
}

fn dc_source(value: f32, frames: usize) -> AudioSource {
    AudioSource::new(
        Box::new(DcDecoder::new(value, frames)),
        Box::new(MemoryStream::new(Vec::new())),
    )
}

/// Pump `frames` mono f32 frames out of the device and decode them.
fn pump_frames(backend: &NullBackend, device: &AudioDevice, frames: usize) -> Vec<f32> {
    let bytes = backend
        .pump(device.handle(), frames * 4)
        .expect("device should be pumpable");
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect()
}

#[test]
fn finite_loop_finishes_after_last_iteration() {
    let (backend, device) = open_mono_device();

    // 0.1 s source, played three times, pulled as 0.35 s of audio.
    let stream = device.create_stream(dc_source(0.5, 4410)).unwrap();
    stream.set_loop_policy(LoopPolicy::Finite(3));

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    stream.on_finish(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });
    stream.play();
    assert_eq!(stream.state(), PlayState::Playing);

    let mut samples = Vec::new();
    for _ in 0..15 {
        samples.extend(pump_frames(&backend, &device, 1029)); // 15 × 1029 = 15_435 ≈ 0.35 s
    }

    // Three full iterations of signal, then silence.
    let signal: Vec<&f32> = samples.iter().filter(|&&s| s != 0.0).collect();
    assert_eq!(signal.len(), 3 * 4410);
    assert_eq!(fired.load(Ordering::SeqCst), 1, "finish fires exactly once");
    assert_eq!(stream.state(), PlayState::Finished);
    assert_eq!(stream.current_iteration(), 2);

    // Further pumping re-fires nothing.
    pump_frames(&backend, &device, 4096);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn infinite_loop_keeps_playing() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(0.25, 441)).unwrap();
    stream.set_loop_policy(LoopPolicy::Infinite);
    stream.play();

    // 100x the source length and it is still going.
    let samples = pump_frames(&backend, &device, 44100);
    assert!(samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    assert_eq!(stream.state(), PlayState::Playing);
    assert!(stream.current_iteration() >= 99);
}

#[test]
fn stop_fires_callback_exactly_once() {
    let (_backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(1.0, 441_000)).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    stream.on_finish(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    stream.play();
    stream.stop();
    assert_eq!(stream.state(), PlayState::Finished);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // A second stop is a no-op.
    stream.stop();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn fade_out_decreases_monotonically_then_removes_stream() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(1.0, 441_000)).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    stream.on_finish(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });
    stream.play();

    // Establish steady output first.
    let steady = pump_frames(&backend, &device, 1024);
    assert!(steady.iter().all(|&s| (s - 1.0).abs() < 1e-6));

    stream.stop_with_fade(Duration::from_millis(200));
    assert_eq!(stream.state(), PlayState::Stopping);

    // 200 ms at 44.1 kHz = 8820 frames. Pump block by block; each block's
    // peak must not exceed the previous one's.
    let mut peaks = Vec::new();
    for _ in 0..10 {
        let block = pump_frames(&backend, &device, 1024);
        let peak = block.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        peaks.push(peak);
    }
    for pair in peaks.windows(2) {
        assert!(
            pair[1] <= pair[0] + 1e-6,
            "peak rose during fade-out: {:?}",
            peaks
        );
    }
    assert!(*peaks.first().unwrap() > 0.5);
    assert_eq!(*peaks.last().unwrap(), 0.0);

    assert_eq!(stream.state(), PlayState::Finished);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(device.mixer().active_streams(), 0);
}

#[test]
fn fade_in_gain_is_linear() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(1.0, 441_000)).unwrap();

    // 0.5 s fade-in = 22_050 frames.
    stream.play_with_fade(Duration::from_millis(500));
    let samples = pump_frames(&backend, &device, 22_050);

    let total = 22_050.0f32;
    for &probe in &[220usize, 2_205, 11_025, 22_049] {
        let expected = (probe + 1) as f32 / total;
        let got = samples[probe];
        assert!(
            (got - expected).abs() < 2.0 / 44_100.0 + 1e-4,
            "fade gain at frame {probe}: expected {expected}, got {got}"
        );
    }

    // After the fade: unity.
    let after = pump_frames(&backend, &device, 1024);
    assert!(after.iter().all(|&s| (s - 1.0).abs() < 1e-5));
}

#[test]
fn pause_skips_mixing_and_resume_continues() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(0.75, 441_000)).unwrap();
    stream.play();

    assert!(pump_frames(&backend, &device, 512).iter().all(|&s| s != 0.0));

    stream.pause();
    assert!(stream.is_paused());
    assert!(pump_frames(&backend, &device, 512).iter().all(|&s| s == 0.0));

    stream.resume();
    assert!(pump_frames(&backend, &device, 512).iter().all(|&s| s != 0.0));
}

#[test]
fn mute_skips_stream_but_keeps_it_playing() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(0.75, 441_000)).unwrap();
    stream.play();
    stream.mute();

    assert!(stream.is_muted());
    assert_eq!(stream.state(), PlayState::Playing);
    assert!(pump_frames(&backend, &device, 512).iter().all(|&s| s == 0.0));

    stream.unmute();
    assert!(pump_frames(&backend, &device, 512).iter().all(|&s| s != 0.0));
}

#[test]
fn finished_stream_replays_after_rewind() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(0.5, 441)).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    stream.on_finish(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    stream.play();
    pump_frames(&backend, &device, 1024);
    assert_eq!(stream.state(), PlayState::Finished);

    // Finished streams stay silent until explicitly rewound and replayed.
    assert!(pump_frames(&backend, &device, 256).iter().all(|&s| s == 0.0));

    assert!(stream.rewind());
    assert_eq!(stream.state(), PlayState::Idle);
    stream.play();
    let replay = pump_frames(&backend, &device, 441);
    assert!(replay.iter().all(|&s| (s - 0.5).abs() < 1e-6));

    // The finish callback fired once for the whole lifetime.
    pump_frames(&backend, &device, 1024);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn volume_scales_output() {
    let (backend, device) = open_mono_device();
    let stream = device.create_stream(dc_source(1.0, 441_000)).unwrap();
    stream.set_volume(0.25);
    stream.play();

    let samples = pump_frames(&backend, &device, 256);
    assert!(samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    assert_eq!(stream.volume(), 0.25);
}

#[test]
fn adaptive_shrink_scenario_via_device_mixer() {
    let (_backend, device) = open_mono_device();
    let mixer = device.mixer();

    let mut big = vec![0.0f32; 300_000];
    mixer.mix(&mut big);
    assert_eq!(mixer.allocated_samples(), 300_000);

    let mut small = vec![0.0f32; 1_024];
    for _ in 0..101 {
        mixer.mix(&mut small);
    }
    assert!(mixer.allocated_samples() < 300_000);
    assert!(mixer.allocated_samples() <= mezcla::MAX_RETAINED_SAMPLES);
}
