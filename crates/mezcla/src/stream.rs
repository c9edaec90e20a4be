//! Per-stream playback state: play/pause/stop with timed fades, looping,
//! and finish callbacks.
//!
//! [`AudioStream`] is the handle the caller holds. The actual state lives
//! inside the mixer, guarded by the mixer's one mutex; every control call
//! here takes that lock, so a `play()` can block briefly while the audio
//! thread finishes a callback.

use std::time::Duration;

use crate::mixer::Mixer;
use crate::source::AudioSource;
use std::sync::Arc;

/// Playback lifecycle of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// Open but never started (or rewound to the start line).
    Idle,
    /// Actively mixed.
    Playing,
    /// Registered but skipped by the mixer.
    Paused,
    /// Fading out; still mixed with decreasing gain.
    Stopping,
    /// Fully stopped; never emits samples again until rewound and replayed.
    Finished,
}

/// How many times a stream plays before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Play `n` times in total. `Finite(1)` is ordinary one-shot playback.
    Finite(u32),
    /// Loop until stopped.
    Infinite,
}

/// Linear fade envelope applied multiplicatively to the stream volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fade {
    Inactive,
    In { remaining: Duration, total: Duration },
    Sustained,
    Out { remaining: Duration, total: Duration },
}

impl Fade {
    /// Envelope gain at the current instant.
    pub(crate) fn gain(self) -> f32 {
        match self {
            Fade::Inactive | Fade::Sustained => 1.0,
            Fade::In { remaining, total } => {
                1.0 - (remaining.as_secs_f32() / total.as_secs_f32().max(f32::EPSILON))
            }
            Fade::Out { remaining, total } => {
                remaining.as_secs_f32() / total.as_secs_f32().max(f32::EPSILON)
            }
        }
    }

    /// Advance the envelope by `elapsed`. Returns the new envelope and
    /// whether a fade-out just completed.
    pub(crate) fn advance(self, elapsed: Duration) -> (Fade, bool) {
        match self {
            Fade::In { remaining, total } => {
                let remaining = remaining.saturating_sub(elapsed);
                if remaining.is_zero() {
                    (Fade::Sustained, false)
                } else {
                    (Fade::In { remaining, total }, false)
                }
            }
            Fade::Out { remaining, total } => {
                let remaining = remaining.saturating_sub(elapsed);
                if remaining.is_zero() {
                    (Fade::Out { remaining, total }, true)
                } else {
                    (Fade::Out { remaining, total }, false)
                }
            }
            other => (other, false),
        }
    }
}

/// Callback invoked exactly once when a stream reaches `Finished`.
pub type FinishCallback = Box<dyn FnOnce() + Send>;

/// Mixer-side state of one registered stream.
pub(crate) struct StreamEntry {
    pub(crate) source: AudioSource,
    pub(crate) state: PlayState,
    pub(crate) volume: f32,
    pub(crate) stereo_pos: f32,
    pub(crate) muted: bool,
    pub(crate) fade: Fade,
    pub(crate) pending_fade_in: Option<Duration>,
    pub(crate) loop_policy: LoopPolicy,
    pub(crate) iteration: u32,
    pub(crate) start_tick: u64,
    pub(crate) frame_cursor: u64,
    pub(crate) finish_cb: Option<FinishCallback>,
}

impl StreamEntry {
    pub(crate) fn new(source: AudioSource) -> Self {
        Self {
            source,
            state: PlayState::Idle,
            volume: 1.0,
            stereo_pos: 0.0,
            muted: false,
            fade: Fade::Inactive,
            pending_fade_in: None,
            loop_policy: LoopPolicy::Finite(1),
            iteration: 0,
            start_tick: 0,
            frame_cursor: 0,
            finish_cb: None,
        }
    }

    /// Constant-gain pan law: per-channel gains derived from the stereo
    /// position.
    pub(crate) fn pan_gains(&self) -> (f32, f32) {
        let p = self.stereo_pos;
        let left = if p >= 0.0 { (1.0 - p) / 2.0 } else { 1.0 };
        let right = if p <= 0.0 { (1.0 + p) / 2.0 } else { 1.0 };
        (left, right)
    }
}

/// Handle to one playback stream registered with a device's mixer.
///
/// Dropping the handle unregisters the stream; a stream that is still
/// playing stops at that point.
pub struct AudioStream {
    mixer: Arc<Mixer>,
    token: u64,
}

impl AudioStream {
    pub(crate) fn new(mixer: Arc<Mixer>, token: u64) -> Self {
        Self { mixer, token }
    }

    /// Start playback from the beginning.
    ///
    /// Valid from `Idle` and from `Finished` after a rewind; a pre-set
    /// fade-in (see [`AudioStream::set_fade_in`]) is armed here.
    pub fn play(&self) {
        self.mixer.with_entry(self.token, |entry, now| {
            if !matches!(entry.state, PlayState::Idle | PlayState::Finished) {
                return;
            }
            entry.state = PlayState::Playing;
            entry.iteration = 0;
            entry.frame_cursor = 0;
            entry.start_tick = now;
            entry.fade = match entry.pending_fade_in.take() {
                Some(total) if !total.is_zero() => Fade::In {
                    remaining: total,
                    total,
                },
                _ => Fade::Inactive,
            };
        });
    }

    /// Start playback with a fade-in of the given duration.
    pub fn play_with_fade(&self, fade_in: Duration) {
        self.set_fade_in(fade_in);
        self.play();
    }

    /// Arm a fade-in to be applied by the next [`AudioStream::play`].
    pub fn set_fade_in(&self, fade_in: Duration) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.pending_fade_in = Some(fade_in);
        });
    }

    /// Pause a playing stream. The mixer skips it but keeps it registered.
    pub fn pause(&self) {
        self.mixer.with_entry(self.token, |entry, _| {
            if entry.state == PlayState::Playing {
                entry.state = PlayState::Paused;
            }
        });
    }

    /// Resume a paused stream.
    pub fn resume(&self) {
        self.mixer.with_entry(self.token, |entry, _| {
            if entry.state == PlayState::Paused {
                entry.state = PlayState::Playing;
            }
        });
    }

    /// Stop immediately. The finish callback (if any) fires exactly once.
    pub fn stop(&self) {
        let callback = self
            .mixer
            .with_entry(self.token, |entry, _| {
                if matches!(
                    entry.state,
                    PlayState::Playing | PlayState::Paused | PlayState::Stopping
                ) {
                    entry.state = PlayState::Finished;
                    entry.fade = Fade::Inactive;
                    entry.finish_cb.take()
                } else {
                    None
                }
            })
            .flatten();
        // Outside the mixer lock, per the finish-callback guarantee.
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Stop with a fade-out; the stream keeps being mixed with falling
    /// gain and finishes when the fade reaches zero.
    ///
    /// A zero duration, or a stream that is paused, stops immediately.
    pub fn stop_with_fade(&self, fade_out: Duration) {
        if fade_out.is_zero() {
            self.stop();
            return;
        }
        let stop_now = self
            .mixer
            .with_entry(self.token, |entry, _| match entry.state {
                PlayState::Playing => {
                    entry.state = PlayState::Stopping;
                    entry.fade = Fade::Out {
                        remaining: fade_out,
                        total: fade_out,
                    };
                    false
                }
                PlayState::Paused => true,
                _ => false,
            })
            .unwrap_or(false);
        if stop_now {
            self.stop();
        }
    }

    /// Rewind the source to the start without changing the playback state.
    pub fn rewind(&self) -> bool {
        self.mixer
            .with_entry(self.token, |entry, _| {
                if entry.source.rewind() {
                    entry.frame_cursor = 0;
                    if entry.state == PlayState::Finished {
                        entry.state = PlayState::Idle;
                    }
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false)
    }

    /// Seek the source to an absolute time position.
    pub fn seek_to_time(&self, pos: Duration) -> bool {
        self.mixer
            .with_entry(self.token, |entry, _| entry.source.seek_to_time(pos))
            .unwrap_or(false)
    }

    /// Set the stream volume (1.0 = unity; values above 1.0 amplify).
    pub fn set_volume(&self, volume: f32) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.volume = volume.max(0.0);
        });
    }

    /// Current stream volume.
    pub fn volume(&self) -> f32 {
        self.mixer
            .with_entry(self.token, |entry, _| entry.volume)
            .unwrap_or(0.0)
    }

    /// Set the stereo position: −1.0 full left, 0.0 center, +1.0 full
    /// right. Values are clamped.
    pub fn set_stereo_position(&self, position: f32) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.stereo_pos = position.clamp(-1.0, 1.0);
        });
    }

    /// Current stereo position.
    pub fn stereo_position(&self) -> f32 {
        self.mixer
            .with_entry(self.token, |entry, _| entry.stereo_pos)
            .unwrap_or(0.0)
    }

    /// Set how many times the stream plays before finishing.
    pub fn set_loop_policy(&self, policy: LoopPolicy) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.loop_policy = policy;
        });
    }

    /// Current loop policy.
    pub fn loop_policy(&self) -> LoopPolicy {
        self.mixer
            .with_entry(self.token, |entry, _| entry.loop_policy)
            .unwrap_or(LoopPolicy::Finite(1))
    }

    /// Zero-based index of the loop iteration currently playing.
    pub fn current_iteration(&self) -> u32 {
        self.mixer
            .with_entry(self.token, |entry, _| entry.iteration)
            .unwrap_or(0)
    }

    /// Mute this stream. Muted streams stay registered but are skipped.
    pub fn mute(&self) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.muted = true;
        });
    }

    /// Unmute this stream.
    pub fn unmute(&self) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.muted = false;
        });
    }

    /// Whether this stream is muted.
    pub fn is_muted(&self) -> bool {
        self.mixer
            .with_entry(self.token, |entry, _| entry.muted)
            .unwrap_or(false)
    }

    /// Current playback state.
    pub fn state(&self) -> PlayState {
        self.mixer
            .with_entry(self.token, |entry, _| entry.state)
            .unwrap_or(PlayState::Finished)
    }

    /// Whether the stream is in the mixer's active set.
    pub fn is_playing(&self) -> bool {
        matches!(self.state(), PlayState::Playing | PlayState::Stopping)
    }

    /// Whether the stream is paused.
    pub fn is_paused(&self) -> bool {
        self.state() == PlayState::Paused
    }

    /// Duration of the underlying source; zero for streaming sources.
    pub fn duration(&self) -> Duration {
        self.mixer
            .with_entry(self.token, |entry, _| entry.source.duration())
            .unwrap_or(Duration::ZERO)
    }

    /// Register a callback invoked exactly once when the stream reaches
    /// its final `Finished` state — by natural end of stream, `stop()`, or
    /// fade-out completion. Invoked outside the mixer lock.
    pub fn on_finish(&self, callback: impl FnOnce() + Send + 'static) {
        self.mixer.with_entry(self.token, |entry, _| {
            entry.finish_cb = Some(Box::new(callback));
        });
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.mixer.remove(self.token);
    }
}
