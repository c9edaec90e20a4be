//! PC-speaker emulation: a queue of square-wave tones with MML support.
//!
//! Tones play FIFO; the underlying stream is endless (it emits silence
//! while the queue is empty), so the caller starts it once and keeps
//! queueing beeps, tones, or whole MML tunes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mezcla_core::{ByteStream, Decoder, MemoryStream, MmlParser, Result, Tone};

use crate::device::AudioDevice;
use crate::source::AudioSource;
use crate::stream::AudioStream;

/// Square-wave peak amplitude at full volume.
const PEAK: f32 = 0.5;

/// Default beep: 1 kHz for 100 ms.
const BEEP_FREQUENCY_HZ: f32 = 1000.0;
const BEEP_DURATION: Duration = Duration::from_millis(100);

struct ActiveTone {
    tone: Tone,
    frames_left: u64,
    phase: f32,
}

/// Endless mono decoder that renders the shared tone queue.
struct ToneSource {
    queue: Arc<Mutex<VecDeque<Tone>>>,
    rate: u32,
    active: Option<ActiveTone>,
    open: bool,
}

impl ToneSource {
    fn new(queue: Arc<Mutex<VecDeque<Tone>>>, rate: u32) -> Self {
        Self {
            queue,
            rate,
            active: None,
            open: false,
        }
    }
}

impl Decoder for ToneSource {
    fn name(&self) -> &'static str {
        "PC speaker"
    }

    fn open(&mut self, _stream: Box<dyn ByteStream>) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn channels(&self) -> u16 {
        1
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn duration(&self) -> Duration {
        // Endless: the queue refills at any time.
        Duration::ZERO
    }

    fn rewind(&mut self) -> bool {
        self.active = None;
        true
    }

    fn seek_to_time(&mut self, _pos: Duration) -> bool {
        false
    }

    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
        for sample in buf.iter_mut() {
            if self.active.is_none() {
                // Short critical section on the audio thread; the queue is
                // only ever touched briefly from either side.
                let next = self.queue.lock().expect("tone queue poisoned").pop_front();
                self.active = next.map(|tone| ActiveTone {
                    frames_left: (tone.duration.as_secs_f64() * f64::from(self.rate)).round()
                        as u64,
                    phase: 0.0,
                    tone,
                });
            }

            match self.active.as_mut() {
                Some(active) if active.frames_left > 0 => {
                    if active.tone.frequency_hz > 0.0 {
                        let amp = PEAK * active.tone.amplitude;
                        *sample = if active.phase < 0.5 { amp } else { -amp };
                        active.phase += active.tone.frequency_hz / self.rate as f32;
                        if active.phase >= 1.0 {
                            active.phase -= 1.0;
                        }
                    } else {
                        *sample = 0.0;
                    }
                    active.frames_left -= 1;
                    if active.frames_left == 0 {
                        self.active = None;
                    }
                }
                _ => {
                    // Queue empty: stay silent but keep the stream alive.
                    self.active = None;
                    *sample = 0.0;
                }
            }
        }
        *call_again = true;
        buf.len()
    }
}

/// Playback handle emulating a classic PC speaker.
///
/// Created via
/// [`AudioDevice::create_pc_speaker_stream`](crate::AudioDevice::create_pc_speaker_stream).
pub struct PcSpeakerStream {
    stream: AudioStream,
    queue: Arc<Mutex<VecDeque<Tone>>>,
}

impl PcSpeakerStream {
    pub(crate) fn create(device: &AudioDevice) -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let source = AudioSource::new(
            Box::new(ToneSource::new(Arc::clone(&queue), device.rate())),
            // The tone source synthesizes; it reads no bytes.
            Box::new(MemoryStream::new(Vec::new())),
        );
        let stream = device.create_stream(source)?;
        Ok(Self { stream, queue })
    }

    /// The underlying playback stream, for play/pause/volume control.
    pub fn stream(&self) -> &AudioStream {
        &self.stream
    }

    /// Start emitting (silence until tones are queued).
    pub fn play(&self) {
        self.stream.play();
    }

    /// Stop emitting and clear the queue.
    pub fn stop(&self) {
        self.clear_queue();
        self.stream.stop();
    }

    /// Queue the default beep: 1 kHz for 100 ms.
    pub fn beep(&self) {
        self.sound(BEEP_FREQUENCY_HZ, BEEP_DURATION);
    }

    /// Queue a tone at the given frequency and duration.
    pub fn sound(&self, frequency_hz: f32, duration: Duration) {
        self.push(Tone {
            frequency_hz,
            duration,
            amplitude: 1.0,
        });
    }

    /// Queue a stretch of silence.
    pub fn silence(&self, duration: Duration) {
        self.push(Tone::silence(duration));
    }

    /// Parse an MML tune and append its tones to the queue.
    ///
    /// Unrecognised characters are warnings, not errors; parse failures
    /// (strict-mode only) leave the queue untouched.
    pub fn play_mml(&self, mml: &str) -> Result<usize> {
        let mut parser = MmlParser::new();
        let tones = parser.parse(mml)?;
        for warning in parser.warnings() {
            tracing::warn!(warning, "MML parse warning");
        }
        let count = tones.len();
        let mut queue = self.queue.lock().expect("tone queue poisoned");
        queue.extend(tones);
        Ok(count)
    }

    /// Number of tones still queued (not counting the one playing).
    pub fn queue_size(&self) -> usize {
        self.queue.lock().expect("tone queue poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_queue_empty(&self) -> bool {
        self.queue_size() == 0
    }

    /// Drop all queued tones. The currently sounding tone finishes.
    pub fn clear_queue(&self) {
        self.queue.lock().expect("tone queue poisoned").clear();
    }

    fn push(&self, tone: Tone) {
        self.queue.lock().expect("tone queue poisoned").push_back(tone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_source_renders_queue_then_silence() {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        queue.lock().unwrap().push_back(Tone {
            frequency_hz: 1000.0,
            duration: Duration::from_millis(1),
            amplitude: 1.0,
        });

        let mut source = ToneSource::new(Arc::clone(&queue), 48000);
        source
            .open(Box::new(MemoryStream::new(Vec::new())))
            .unwrap();

        // 1 ms at 48 kHz = 48 frames of tone, then silence; always a full
        // buffer, always call_again.
        let mut buf = vec![0.0f32; 96];
        let mut again = false;
        let n = source.decode(&mut buf, &mut again);
        assert_eq!(n, 96);
        assert!(again);
        assert!(buf[..48].iter().all(|&s| s.abs() == PEAK));
        assert!(buf[48..].iter().all(|&s| s == 0.0));
        assert!(queue.lock().unwrap().is_empty());
    }

    #[test]
    fn silent_tones_render_as_zero() {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        queue
            .lock()
            .unwrap()
            .push_back(Tone::silence(Duration::from_millis(2)));

        let mut source = ToneSource::new(queue, 48000);
        source
            .open(Box::new(MemoryStream::new(Vec::new())))
            .unwrap();
        let mut buf = vec![1.0f32; 96];
        let mut again = false;
        source.decode(&mut buf, &mut again);
        assert!(buf.iter().all(|&s| s == 0.0));
    }
}
