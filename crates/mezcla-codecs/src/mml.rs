//! MML decoder: renders Music Macro Language text as a square-wave tune.
//!
//! The grammar lives in `mezcla-core`; this decoder reads the whole stream
//! as text, parses it into tones, and synthesizes them as a band-unlimited
//! square wave — the same voice the PC-speaker stream uses.
//!
//! The accept heuristic (mostly-printable text containing note letters and
//! at least one command letter) is inherently loose, which is why this
//! decoder registers at the lowest priority in the bundled set.

use std::time::Duration;

use mezcla_core::{ByteStream, Decoder, Error, MmlParser, Result, Tone};

/// Synthesis sample rate for rendered MML.
const RENDER_RATE: u32 = 44100;

/// Square-wave peak amplitude at full MML volume. Leaves headroom so an
/// MML stream does not dwarf sampled material in a mix.
const PEAK: f32 = 0.5;

/// Upper bound on an MML source file; anything larger is not a tune.
const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Decoder for MML text tunes.
pub struct MmlDecoder {
    tones: Vec<Tone>,
    /// Cumulative start offset of each tone, in frames; one extra entry
    /// holds the total length.
    tone_starts: Vec<u64>,
    tone_idx: usize,
    frame_in_tone: u64,
    phase: f32,
    open: bool,
}

impl MmlDecoder {
    /// Create a closed decoder; call [`Decoder::open`] before decoding.
    pub fn new() -> Self {
        Self {
            tones: Vec::new(),
            tone_starts: Vec::new(),
            tone_idx: 0,
            frame_in_tone: 0,
            phase: 0.0,
            open: false,
        }
    }

    /// Whether the stream looks like MML: mostly printable text with note
    /// letters and at least one command letter.
    pub fn accept(stream: &mut dyn ByteStream) -> bool {
        let mut buf = [0u8; 512];
        let n = stream.read(&mut buf);
        if n == 0 {
            return false;
        }
        let head = &buf[..n];

        let is_text = head
            .iter()
            .all(|&b| b >= 32 || b == b'\n' || b == b'\r' || b == b'\t');
        if !is_text {
            return false;
        }

        let upper: Vec<u8> = head.iter().map(u8::to_ascii_uppercase).collect();
        let has_notes = upper.iter().any(|b| (b'A'..=b'G').contains(b));
        let has_commands = upper
            .iter()
            .any(|b| matches!(b, b'T' | b'L' | b'O' | b'V' | b'R' | b'P' | b'<' | b'>'));
        has_notes && has_commands
    }

    fn frames_of(tone: &Tone) -> u64 {
        (tone.duration.as_secs_f64() * f64::from(RENDER_RATE)).round() as u64
    }

    fn total_frames(&self) -> u64 {
        self.tone_starts.last().copied().unwrap_or(0)
    }
}

impl Default for MmlDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MmlDecoder {
    fn name(&self) -> &'static str {
        "MML"
    }

    fn open(&mut self, mut stream: Box<dyn ByteStream>) -> Result<()> {
        if self.open {
            return Err(Error::State("MML decoder already open".into()));
        }

        let mut source = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk);
            if n == 0 {
                break;
            }
            source.extend_from_slice(&chunk[..n]);
            if source.len() > MAX_SOURCE_BYTES {
                return Err(Error::Decoder("MML source exceeds 1 MiB".into()));
            }
        }

        let text = String::from_utf8(source)
            .map_err(|_| Error::Decoder("MML source is not valid UTF-8".into()))?;

        let mut parser = MmlParser::new();
        let tones = parser.parse(&text)?;
        for warning in parser.warnings() {
            tracing::warn!(warning, "MML parse warning");
        }

        let mut starts = Vec::with_capacity(tones.len() + 1);
        let mut acc = 0u64;
        for tone in &tones {
            starts.push(acc);
            acc += Self::frames_of(tone);
        }
        starts.push(acc);

        self.tones = tones;
        self.tone_starts = starts;
        self.tone_idx = 0;
        self.frame_in_tone = 0;
        self.phase = 0.0;
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
        RENDER_RATE
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / f64::from(RENDER_RATE))
    }

    fn rewind(&mut self) -> bool {
        self.tone_idx = 0;
        self.frame_in_tone = 0;
        self.phase = 0.0;
        true
    }

    fn seek_to_time(&mut self, pos: Duration) -> bool {
        let target = (pos.as_secs_f64() * f64::from(RENDER_RATE)).round() as u64;
        if target > self.total_frames() {
            return false;
        }
        // tone_starts is sorted; find the tone containing the target frame.
        let idx = match self.tone_starts.binary_search(&target) {
            Ok(i) => i.min(self.tones.len()),
            Err(i) => i - 1,
        };
        self.tone_idx = idx;
        self.frame_in_tone = target - self.tone_starts.get(idx).copied().unwrap_or(target);
        self.phase = 0.0;
        true
    }

    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
        if !self.open {
            *call_again = false;
            return 0;
        }

        let mut n = 0;
        while n < buf.len() && self.tone_idx < self.tones.len() {
            let tone = self.tones[self.tone_idx];
            let tone_frames = Self::frames_of(&tone);
            if self.frame_in_tone >= tone_frames {
                self.tone_idx += 1;
                self.frame_in_tone = 0;
                self.phase = 0.0;
                continue;
            }

            if tone.frequency_hz > 0.0 {
                let step = tone.frequency_hz / RENDER_RATE as f32;
                let amp = PEAK * tone.amplitude;
                buf[n] = if self.phase < 0.5 { amp } else { -amp };
                self.phase += step;
                if self.phase >= 1.0 {
                    self.phase -= 1.0;
                }
            } else {
                buf[n] = 0.0;
            }
            n += 1;
            self.frame_in_tone += 1;
        }

        *call_again = self.tone_idx < self.tones.len();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::MemoryStream;

    fn open_mml(text: &str) -> MmlDecoder {
        let mut dec = MmlDecoder::new();
        dec.open(Box::new(MemoryStream::new(text.as_bytes().to_vec())))
            .unwrap();
        dec
    }

    #[test]
    fn accept_wants_text_with_notes_and_commands() {
        let mut tune = MemoryStream::new(b"T120 L4 C D E F G".to_vec());
        assert!(MmlDecoder::accept(&mut tune));

        // Notes but no commands.
        let mut bare = MemoryStream::new(b"xyz q u z".to_vec());
        assert!(!MmlDecoder::accept(&mut bare));

        // Binary data.
        let mut binary = MemoryStream::new(vec![0x00, 0x01, b'C', b'T']);
        assert!(!MmlDecoder::accept(&mut binary));

        let mut empty = MemoryStream::new(Vec::new());
        assert!(!MmlDecoder::accept(&mut empty));
    }

    #[test]
    fn renders_square_wave_at_parsed_amplitude() {
        let mut dec = open_mml("T120 V15 ML A");
        assert_eq!(dec.channels(), 1);
        assert_eq!(dec.rate(), RENDER_RATE);

        let mut buf = vec![0.0f32; 1024];
        let mut again = false;
        let n = dec.decode(&mut buf, &mut again);
        assert_eq!(n, 1024);
        assert!(buf.iter().all(|&s| s == PEAK || s == -PEAK));
        // A square wave alternates sign.
        assert!(buf.iter().any(|&s| s > 0.0));
        assert!(buf.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn duration_matches_tempo() {
        // One legato quarter note at T120 = 0.5 s.
        let dec = open_mml("T120 ML C4");
        let d = dec.duration();
        assert!((d.as_secs_f64() - 0.5).abs() < 0.001);
    }

    #[test]
    fn decode_reaches_eos_and_rewinds() {
        let mut dec = open_mml("T240 ML C16");
        let total = (dec.duration().as_secs_f64() * f64::from(RENDER_RATE)).round() as usize;

        let mut buf = vec![0.0f32; total + 512];
        let mut again = true;
        let n = dec.decode(&mut buf, &mut again);
        assert_eq!(n, total);
        assert!(!again);

        assert!(dec.rewind());
        let m = dec.decode(&mut buf, &mut again);
        assert_eq!(m, total);
    }

    #[test]
    fn seek_lands_inside_the_tune() {
        let mut dec = open_mml("T120 ML C2 D2");
        assert!(dec.seek_to_time(Duration::from_millis(1200)));
        let mut buf = vec![0.0f32; 256];
        let mut again = false;
        assert!(dec.decode(&mut buf, &mut again) > 0);

        assert!(!dec.seek_to_time(Duration::from_secs(60)));
    }

    #[test]
    fn rests_render_as_silence() {
        let mut dec = open_mml("T120 R4");
        let mut buf = vec![0.0f32; 512];
        let mut again = false;
        let n = dec.decode(&mut buf, &mut again);
        assert!(n > 0);
        assert!(buf[..n].iter().all(|&s| s == 0.0));
    }
}
