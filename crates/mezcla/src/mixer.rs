//! Lock-disciplined summation of all active streams into the device output.
//!
//! One mutex guards everything the audio callback touches: the stream
//! table, both float buffers, the adaptive-sizing counters, and the
//! per-stream playback fields. Control threads take the same mutex, so a
//! `play()` may block briefly while a callback finishes. Finish callbacks
//! are collected under the lock and invoked after it is released.
//!
//! ## Adaptive buffer sizing
//!
//! The mix and scratch buffers grow to fit any request immediately, but
//! shrink only after [`STABILITY_FRAMES`] consecutive callbacks asked for
//! less than a quarter of the retained allocation while it exceeds
//! [`MAX_RETAINED_SAMPLES`]. A long-running process that briefly needed a
//! huge catch-up buffer gives the memory back, while transient small
//! callbacks never thrash the allocator.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use mezcla_core::{AudioSpec, FromFloatFn};

use crate::stream::{Fade, FinishCallback, LoopPolicy, PlayState, StreamEntry};

/// Floor for the mix/scratch allocation, in samples.
pub const MIN_BUFFER_SAMPLES: usize = 4096;
/// Allocations above this are candidates for shrinking.
pub const MAX_RETAINED_SAMPLES: usize = 262_144;
/// Consecutive small requests required before a shrink.
pub const STABILITY_FRAMES: u32 = 100;

struct MixerInner {
    streams: BTreeMap<u64, StreamEntry>,
    next_token: u64,
    mix_buf: Vec<f32>,
    scratch_buf: Vec<f32>,
    allocated_samples: usize,
    small_request_run: u32,
    spec: AudioSpec,
    frame_size: usize,
    /// Frames delivered since the device opened; the mixer's clock.
    frames_mixed: u64,
}

/// The per-device mixer: owns all streams created on its device and fills
/// every callback buffer by summing the active ones.
pub struct Mixer {
    inner: Mutex<MixerInner>,
}

impl Mixer {
    /// Create a mixer for a device with the given output spec and
    /// per-callback frame size.
    pub fn new(spec: AudioSpec, frame_size: usize) -> Self {
        Self {
            inner: Mutex::new(MixerInner {
                streams: BTreeMap::new(),
                next_token: 0,
                mix_buf: vec![0.0; MIN_BUFFER_SAMPLES],
                scratch_buf: vec![0.0; MIN_BUFFER_SAMPLES],
                allocated_samples: MIN_BUFFER_SAMPLES,
                small_request_run: 0,
                spec,
                frame_size,
                frames_mixed: 0,
            }),
        }
    }

    /// Output spec this mixer produces.
    pub fn output_spec(&self) -> AudioSpec {
        self.lock().spec
    }

    /// Per-callback frame size configured at device open.
    pub fn frame_size(&self) -> usize {
        self.lock().frame_size
    }

    /// Current allocation of the mix buffer, in samples. Exposed for the
    /// adaptive-sizing tests.
    pub fn allocated_samples(&self) -> usize {
        self.lock().allocated_samples
    }

    /// Number of streams currently in the active set (playing or
    /// fading out).
    pub fn active_streams(&self) -> usize {
        self.lock()
            .streams
            .values()
            .filter(|e| matches!(e.state, PlayState::Playing | PlayState::Stopping))
            .count()
    }

    /// Unconditionally shrink the buffers back to [`MIN_BUFFER_SAMPLES`]
    /// if the retained allocation exceeds four times that; otherwise a
    /// no-op.
    pub fn compact_buffers(&self) {
        let mut inner = self.lock();
        if inner.allocated_samples > 4 * MIN_BUFFER_SAMPLES {
            shrink_to(&mut inner, MIN_BUFFER_SAMPLES);
            tracing::debug!(allocated = MIN_BUFFER_SAMPLES, "mix buffers compacted");
        }
    }

    /// Fill `out` with mixed float samples. This is the callback entry
    /// point for float-native paths and for tests driving the mixer with
    /// synthetic request sizes.
    pub fn mix(&self, out: &mut [f32]) {
        let mut finished = Vec::new();
        {
            let mut inner = self.lock();
            mix_locked(&mut inner, out.len(), &mut finished);
            out.copy_from_slice(&inner.mix_buf[..out.len()]);
        }
        for callback in finished {
            callback();
        }
    }

    /// Fill `out` with mixed audio converted to the device's byte format.
    /// This is the device-callback entry point.
    pub fn mix_into(&self, out: &mut [u8], converter: FromFloatFn) {
        let mut finished = Vec::new();
        {
            let mut inner = self.lock();
            let n = out.len() / usize::from(inner.spec.format.byte_size().max(1));
            mix_locked(&mut inner, n, &mut finished);
            converter(out, &inner.mix_buf[..n]);
        }
        for callback in finished {
            callback();
        }
    }

    pub(crate) fn register(&self, entry: StreamEntry) -> u64 {
        let mut inner = self.lock();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.streams.insert(token, entry);
        token
    }

    pub(crate) fn remove(&self, token: u64) {
        self.lock().streams.remove(&token);
    }

    /// Run `f` on a registered stream entry under the mixer lock. The
    /// second argument is the mixer clock in frames.
    pub(crate) fn with_entry<R>(
        &self,
        token: u64,
        f: impl FnOnce(&mut StreamEntry, u64) -> R,
    ) -> Option<R> {
        let mut inner = self.lock();
        let now = inner.frames_mixed;
        inner.streams.get_mut(&token).map(|entry| f(entry, now))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MixerInner> {
        self.inner.lock().expect("mixer lock poisoned")
    }
}

/// Move a stream to `Finished`, queueing its callback for post-lock
/// invocation.
fn finish(entry: &mut StreamEntry, finished: &mut Vec<FinishCallback>) {
    entry.state = PlayState::Finished;
    entry.fade = Fade::Inactive;
    if let Some(callback) = entry.finish_cb.take() {
        finished.push(callback);
    }
}

fn shrink_to(inner: &mut MixerInner, target: usize) {
    inner.allocated_samples = target;
    inner.mix_buf.truncate(target);
    inner.mix_buf.shrink_to_fit();
    inner.scratch_buf.truncate(target);
    inner.scratch_buf.shrink_to_fit();
    inner.small_request_run = 0;
}

/// Grow-or-shrink the buffers for a request of `n` samples.
fn resize_for_request(inner: &mut MixerInner, n: usize) {
    if n > inner.allocated_samples {
        // Grow to exactly the request, no hysteresis.
        inner.allocated_samples = n;
        inner.mix_buf.resize(n, 0.0);
        inner.scratch_buf.resize(n, 0.0);
        inner.small_request_run = 0;
        tracing::debug!(allocated = n, "mix buffers grown");
    } else if inner.allocated_samples > MAX_RETAINED_SAMPLES && n < inner.allocated_samples / 4 {
        inner.small_request_run += 1;
        if inner.small_request_run > STABILITY_FRAMES {
            let target = n.max(MIN_BUFFER_SAMPLES);
            shrink_to(inner, target);
            tracing::debug!(allocated = target, "mix buffers shrunk after stable small requests");
        }
    } else {
        inner.small_request_run = 0;
    }
}

/// One callback's worth of mixing: zero the accumulator, sum every active
/// stream into it with volume × fade × pan gains, and advance stream state
/// machines on end-of-stream and fade completion.
fn mix_locked(inner: &mut MixerInner, n: usize, finished: &mut Vec<FinishCallback>) {
    resize_for_request(inner, n);

    let device_channels = inner.spec.channels.max(1);
    let channels = usize::from(device_channels);
    let rate = inner.spec.rate.max(1);
    let MixerInner {
        streams,
        mix_buf,
        scratch_buf,
        frames_mixed,
        ..
    } = inner;

    mix_buf[..n].fill(0.0);

    for entry in streams.values_mut() {
        if entry.muted || !matches!(entry.state, PlayState::Playing | PlayState::Stopping) {
            continue;
        }

        // Pull samples, looping or finishing the stream on EOS. A rewind
        // that yields no samples (zero-length source) finishes the stream
        // instead of spinning inside the callback.
        let mut cursor = 0usize;
        let mut last_rewind_cursor: Option<usize> = None;
        loop {
            entry
                .source
                .read_samples(scratch_buf, &mut cursor, n, device_channels);
            if cursor >= n {
                break;
            }
            if entry.state == PlayState::Stopping {
                // A fade-out that outlives its source just ends early.
                finish(entry, finished);
                break;
            }
            let loops_remain = match entry.loop_policy {
                LoopPolicy::Infinite => true,
                LoopPolicy::Finite(total) => entry.iteration + 1 < total,
            };
            if loops_remain && last_rewind_cursor != Some(cursor) && entry.source.rewind() {
                last_rewind_cursor = Some(cursor);
                entry.iteration += 1;
                continue;
            }
            finish(entry, finished);
            break;
        }

        let pulled = cursor;
        if pulled == 0 {
            continue;
        }
        let frames = pulled / channels;
        let elapsed = Duration::from_secs_f64(frames as f64 / f64::from(rate));

        // The envelope is advanced by the duration just mixed; the gain is
        // ramped linearly across the block between the old and new values.
        let g0 = entry.fade.gain();
        let (new_fade, fade_out_done) = entry.fade.advance(elapsed);
        let g1 = new_fade.gain();
        entry.fade = new_fade;

        let volume = entry.volume;
        let step = if frames > 0 {
            (g1 - g0) / frames as f32
        } else {
            0.0
        };

        if channels == 2 {
            let (pan_l, pan_r) = entry.pan_gains();
            for i in 0..frames {
                let gain = volume * (g0 + step * (i + 1) as f32);
                mix_buf[2 * i] += scratch_buf[2 * i] * gain * pan_l;
                mix_buf[2 * i + 1] += scratch_buf[2 * i + 1] * gain * pan_r;
            }
        } else {
            for i in 0..frames {
                let gain = volume * (g0 + step * (i + 1) as f32);
                mix_buf[i] += scratch_buf[i] * gain;
            }
        }

        entry.frame_cursor += frames as u64;
        if fade_out_done && entry.state == PlayState::Stopping {
            finish(entry, finished);
        }
    }

    *frames_mixed += (n / channels) as u64;
}
