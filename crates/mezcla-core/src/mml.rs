//! Music Macro Language parser.
//!
//! MML is the text grammar shared by the PC-speaker stream and the MML
//! decoder: notes `A..G` with sharps/flats and lengths, rests, octave,
//! tempo, default-length, volume, and articulation commands. Tokens are
//! case-insensitive and whitespace is ignored.
//!
//! Middle C is the start of octave 3; tuning is equal temperament with
//! A4 = 440 Hz. In non-strict mode unrecognised characters produce
//! warnings and parsing continues; strict mode turns them into errors.

use std::time::Duration;

use crate::error::{Error, Result};

/// One playable element: a pitch (or silence) held for a duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Frequency in Hz; `0.0` means silence.
    pub frequency_hz: f32,
    /// How long the tone is held.
    pub duration: Duration,
    /// Amplitude in `[0.0, 1.0]`, from the MML volume setting.
    pub amplitude: f32,
}

impl Tone {
    /// A silent tone of the given duration.
    pub fn silence(duration: Duration) -> Self {
        Self {
            frequency_hz: 0.0,
            duration,
            amplitude: 0.0,
        }
    }
}

/// Note articulation, set by the `ML` / `MN` / `MS` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Articulation {
    /// Full note length.
    Legato,
    /// 7/8 of the note length.
    #[default]
    Normal,
    /// 3/4 of the note length.
    Staccato,
}

impl Articulation {
    fn factor(self) -> f64 {
        match self {
            Articulation::Legato => 1.0,
            Articulation::Normal => 7.0 / 8.0,
            Articulation::Staccato => 3.0 / 4.0,
        }
    }
}

/// Semitone offsets of `C D E F G A B` within one octave.
const NOTE_OFFSETS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

const MIN_OCTAVE: i32 = 0;
const MAX_OCTAVE: i32 = 6;
const MIN_TEMPO: i32 = 32;
const MAX_TEMPO: i32 = 255;
const MIN_LENGTH: i32 = 1;
const MAX_LENGTH: i32 = 64;
const MAX_VOLUME: i32 = 15;

/// MML parser with warning collection and an optional strict mode.
#[derive(Debug, Default)]
pub struct MmlParser {
    strict: bool,
    warnings: Vec<String>,
}

struct ParseState<'a> {
    input: &'a [u8],
    pos: usize,
    octave: i32,
    default_length: i32,
    tempo: i32,
    volume: i32,
    articulation: Articulation,
}

impl MmlParser {
    /// Create a parser in non-strict mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// In strict mode unrecognised input is an error instead of a warning.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Whether strict mode is enabled.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Warnings collected by the last [`MmlParser::parse`] call.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Parse an MML string into a tone sequence.
    ///
    /// Articulation is applied here: the sounding part of each note is
    /// followed by a silent remainder so the total time always matches the
    /// notated length.
    pub fn parse(&mut self, input: &str) -> Result<Vec<Tone>> {
        self.warnings.clear();
        let mut state = ParseState {
            input: input.as_bytes(),
            pos: 0,
            octave: 4,
            default_length: 4,
            tempo: 120,
            volume: 10,
            articulation: Articulation::default(),
        };
        let mut tones = Vec::new();

        while state.pos < state.input.len() {
            let c = state.input[state.pos].to_ascii_uppercase();
            match c {
                b'A'..=b'G' => {
                    state.pos += 1;
                    let tone = self.parse_note(&mut state, c)?;
                    push_articulated(&mut tones, tone, state.articulation);
                }
                b'R' | b'P' => {
                    state.pos += 1;
                    let duration = self.parse_duration(&mut state)?;
                    tones.push(Tone::silence(duration));
                }
                b'O' => {
                    state.pos += 1;
                    let current_octave = state.octave;
                    let value = self.parse_number(&mut state, current_octave);
                    state.octave = self.checked_range(value, MIN_OCTAVE, MAX_OCTAVE, "octave")?;
                }
                b'<' => {
                    state.pos += 1;
                    state.octave = (state.octave - 1).max(MIN_OCTAVE);
                }
                b'>' => {
                    state.pos += 1;
                    state.octave = (state.octave + 1).min(MAX_OCTAVE);
                }
                b'T' => {
                    state.pos += 1;
                    let current_tempo = state.tempo;
                    let value = self.parse_number(&mut state, current_tempo);
                    state.tempo = self.checked_range(value, MIN_TEMPO, MAX_TEMPO, "tempo")?;
                }
                b'L' => {
                    state.pos += 1;
                    let current_default_length = state.default_length;
                    let value = self.parse_number(&mut state, current_default_length);
                    state.default_length =
                        self.checked_range(value, MIN_LENGTH, MAX_LENGTH, "length")?;
                }
                b'V' => {
                    state.pos += 1;
                    let current_volume = state.volume;
                    let value = self.parse_number(&mut state, current_volume);
                    state.volume = self.checked_range(value, 0, MAX_VOLUME, "volume")?;
                }
                b'M' => {
                    state.pos += 1;
                    match state.input.get(state.pos).map(u8::to_ascii_uppercase) {
                        Some(b'L') => {
                            state.pos += 1;
                            state.articulation = Articulation::Legato;
                        }
                        Some(b'N') => {
                            state.pos += 1;
                            state.articulation = Articulation::Normal;
                        }
                        Some(b'S') => {
                            state.pos += 1;
                            state.articulation = Articulation::Staccato;
                        }
                        _ => self.report(state.pos - 1, "incomplete articulation command")?,
                    }
                }
                c if c.is_ascii_whitespace() => {
                    state.pos += 1;
                }
                other => {
                    self.report(
                        state.pos,
                        &format!("unrecognised character '{}'", char::from(other)),
                    )?;
                    state.pos += 1;
                }
            }
        }

        Ok(tones)
    }

    /// Parse the remainder of a note after its letter: accidentals, length
    /// digits, and dots.
    fn parse_note(&mut self, state: &mut ParseState<'_>, letter: u8) -> Result<Tone> {
        let mut semitone = NOTE_OFFSETS[usize::from(letter - b'A' + 5) % 7];

        match state.input.get(state.pos).copied() {
            Some(b'#' | b'+') => {
                state.pos += 1;
                semitone += 1;
            }
            Some(b'-') => {
                state.pos += 1;
                semitone -= 1;
            }
            _ => {}
        }

        let duration = self.parse_duration(state)?;

        // Middle C (C4, MIDI 60) opens octave 3, so octave o note i is
        // MIDI 12*o + 24 + i. A4 = MIDI 69 = 440 Hz.
        let midi = 12 * state.octave + 24 + semitone;
        let frequency_hz = 440.0 * 2.0f32.powf((midi - 69) as f32 / 12.0);

        Ok(Tone {
            frequency_hz,
            duration,
            amplitude: state.volume as f32 / MAX_VOLUME as f32,
        })
    }

    /// Parse an optional length number plus dots into a duration at the
    /// current tempo.
    fn parse_duration(&mut self, state: &mut ParseState<'_>) -> Result<Duration> {
        let raw = self.parse_number(state, state.default_length);
        let length = self.checked_range(raw, MIN_LENGTH, MAX_LENGTH, "note length")?;

        let mut dots = 0;
        while state.input.get(state.pos) == Some(&b'.') {
            state.pos += 1;
            dots += 1;
        }

        // Whole note = 4 beats; one beat = 60/tempo seconds.
        let whole = 4.0 * 60.0 / f64::from(state.tempo);
        let mut seconds = whole / f64::from(length);
        match dots {
            0 => {}
            1 => seconds *= 1.5,
            _ => seconds *= 1.75,
        }
        Ok(Duration::from_secs_f64(seconds))
    }

    /// Parse a decimal number, or return `default` when none follows.
    fn parse_number(&mut self, state: &mut ParseState<'_>, default: i32) -> i32 {
        let start = state.pos;
        let mut value: i64 = 0;
        while let Some(&c) = state.input.get(state.pos) {
            if !c.is_ascii_digit() {
                break;
            }
            value = (value * 10 + i64::from(c - b'0')).min(i64::from(i32::MAX));
            state.pos += 1;
        }
        if state.pos == start { default } else { value as i32 }
    }

    /// Clamp a value to a range, warning (or erroring in strict mode) when
    /// it falls outside.
    fn checked_range(&mut self, value: i32, min: i32, max: i32, what: &str) -> Result<i32> {
        if value < min || value > max {
            self.report(0, &format!("{what} {value} out of range {min}..{max}"))?;
            return Ok(value.clamp(min, max));
        }
        Ok(value)
    }

    /// Record a warning, or fail in strict mode.
    fn report(&mut self, position: usize, message: &str) -> Result<()> {
        if self.strict {
            return Err(Error::Decoder(format!(
                "MML: {message} at position {position}"
            )));
        }
        self.warnings.push(format!("{message} at position {position}"));
        Ok(())
    }
}

/// Split a note into its sounding part and the silent remainder implied by
/// the articulation setting.
fn push_articulated(tones: &mut Vec<Tone>, tone: Tone, articulation: Articulation) {
    let on = tone.duration.mul_f64(articulation.factor());
    let off = tone.duration.saturating_sub(on);
    tones.push(Tone {
        duration: on,
        ..tone
    });
    if !off.is_zero() {
        tones.push(Tone::silence(off));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sounding(tones: &[Tone]) -> Vec<&Tone> {
        tones.iter().filter(|t| t.frequency_hz > 0.0).collect()
    }

    #[test]
    fn a4_is_440() {
        let mut parser = MmlParser::new();
        // Default octave is 4: one octave above middle C, so A is A5.
        // O3 A is A4.
        let tones = parser.parse("O3 A").unwrap();
        let notes = sounding(&tones);
        assert_eq!(notes.len(), 1);
        assert!((notes[0].frequency_hz - 440.0).abs() < 0.01);
    }

    #[test]
    fn middle_c_starts_octave_three() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("O3 C").unwrap();
        let notes = sounding(&tones);
        assert!((notes[0].frequency_hz - 261.63).abs() < 0.05);
    }

    #[test]
    fn sharps_and_flats() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("O3 C# C+ D-").unwrap();
        let notes = sounding(&tones);
        // C#4 = Db4 = 277.18 Hz, all three spellings.
        for note in notes {
            assert!((note.frequency_hz - 277.18).abs() < 0.05);
        }
    }

    #[test]
    fn octave_shift_commands() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("O3 A > A < A").unwrap();
        let notes = sounding(&tones);
        assert!((notes[0].frequency_hz - 440.0).abs() < 0.01);
        assert!((notes[1].frequency_hz - 880.0).abs() < 0.01);
        assert!((notes[2].frequency_hz - 440.0).abs() < 0.01);
    }

    #[test]
    fn tempo_and_length_set_duration() {
        let mut parser = MmlParser::new();
        // At T120, a quarter note is 0.5 s; legato keeps the full length.
        let tones = parser.parse("T120 L4 ML C").unwrap();
        assert_eq!(tones.len(), 1);
        assert!((tones[0].duration.as_secs_f64() - 0.5).abs() < 1e-9);

        // Explicit length digit overrides the default.
        let tones = parser.parse("T120 ML C8").unwrap();
        assert!((tones[0].duration.as_secs_f64() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn dotted_notes_extend() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("T120 ML C4. D4..").unwrap();
        let notes = sounding(&tones);
        assert!((notes[0].duration.as_secs_f64() - 0.75).abs() < 1e-9);
        assert!((notes[1].duration.as_secs_f64() - 0.875).abs() < 1e-9);
    }

    #[test]
    fn articulation_splits_note() {
        let mut parser = MmlParser::new();
        // Normal articulation sounds 7/8 and rests 1/8.
        let tones = parser.parse("T120 MN C4").unwrap();
        assert_eq!(tones.len(), 2);
        assert!((tones[0].duration.as_secs_f64() - 0.4375).abs() < 1e-9);
        assert_eq!(tones[1].frequency_hz, 0.0);
        assert!((tones[1].duration.as_secs_f64() - 0.0625).abs() < 1e-9);

        // Staccato sounds 3/4.
        let tones = parser.parse("T120 MS C4").unwrap();
        assert!((tones[0].duration.as_secs_f64() - 0.375).abs() < 1e-9);
    }

    #[test]
    fn rests_are_silent() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("T120 R4 P8").unwrap();
        assert_eq!(tones.len(), 2);
        assert_eq!(tones[0].frequency_hz, 0.0);
        assert!((tones[0].duration.as_secs_f64() - 0.5).abs() < 1e-9);
        assert!((tones[1].duration.as_secs_f64() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn volume_scales_amplitude() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("V15 C V0 D").unwrap();
        let notes = sounding(&tones);
        assert_eq!(notes[0].amplitude, 1.0);
        assert_eq!(notes[1].amplitude, 0.0);
    }

    #[test]
    fn unknown_characters_warn_in_lenient_mode() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("C ! D").unwrap();
        assert_eq!(sounding(&tones).len(), 2);
        assert_eq!(parser.warnings().len(), 1);
        assert!(parser.warnings()[0].contains('!'));
    }

    #[test]
    fn unknown_characters_fail_in_strict_mode() {
        let mut parser = MmlParser::new();
        parser.set_strict(true);
        assert!(parser.parse("C ! D").is_err());
    }

    #[test]
    fn out_of_range_values_clamp_with_warning() {
        let mut parser = MmlParser::new();
        let tones = parser.parse("T999 O9 ML C").unwrap();
        assert_eq!(parser.warnings().len(), 2);
        // Tempo clamped to 255, octave to 6.
        let notes = sounding(&tones);
        assert!((notes[0].duration.as_secs_f64() - 4.0 * 60.0 / 255.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn case_insensitive_and_whitespace_ignored() {
        let mut parser = MmlParser::new();
        let upper = parser.parse("T120L4MLCDE").unwrap();
        let lower = parser.parse("t120 l4 ml c d e").unwrap();
        assert_eq!(upper, lower);
    }
}
