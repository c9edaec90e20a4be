//! WAV decoder built on hound.

use std::time::Duration;

use hound::WavReader;
use mezcla_core::{ByteStream, Decoder, Error, Result};

use crate::reader::{BorrowedReader, StreamReader};

/// Decoder for RIFF/WAVE files with integer or float PCM payloads.
pub struct WavDecoder {
    reader: Option<WavReader<StreamReader>>,
    channels: u16,
    rate: u32,
    total_frames: u64,
    frames_read: u64,
    eof: bool,
}

impl WavDecoder {
    /// Create a closed decoder; call [`Decoder::open`] before decoding.
    pub fn new() -> Self {
        Self {
            reader: None,
            channels: 0,
            rate: 0,
            total_frames: 0,
            frames_read: 0,
            eof: false,
        }
    }

    /// Whether the stream parses as a WAV file. Probe for the registry;
    /// the stream position is left wherever the header parse stopped (the
    /// registry restores it).
    pub fn accept(stream: &mut dyn ByteStream) -> bool {
        WavReader::new(BorrowedReader::new(stream)).is_ok()
    }
}

impl Default for WavDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WavDecoder {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn open(&mut self, stream: Box<dyn ByteStream>) -> Result<()> {
        if self.reader.is_some() {
            return Err(Error::State("WAV decoder already open".into()));
        }
        let reader = WavReader::new(StreamReader::new(stream))
            .map_err(|e| Error::Decoder(format!("WAV parse failed: {e}")))?;

        let spec = reader.spec();
        if spec.channels == 0 || spec.channels > 2 {
            return Err(Error::Format(format!(
                "unsupported WAV channel count: {}",
                spec.channels
            )));
        }
        if spec.sample_rate == 0 {
            return Err(Error::Decoder("WAV reports zero sample rate".into()));
        }

        self.channels = spec.channels;
        self.rate = spec.sample_rate;
        self.total_frames = u64::from(reader.duration());
        self.frames_read = 0;
        self.eof = false;
        self.reader = Some(reader);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn duration(&self) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_frames as f64 / f64::from(self.rate))
    }

    fn rewind(&mut self) -> bool {
        self.seek_to_time(Duration::ZERO)
    }

    fn seek_to_time(&mut self, pos: Duration) -> bool {
        let Some(reader) = self.reader.as_mut() else {
            return false;
        };
        let frame = (pos.as_secs_f64() * f64::from(self.rate)).round() as u64;
        if frame > self.total_frames {
            return false;
        }
        if reader.seek(frame as u32).is_err() {
            return false;
        }
        self.frames_read = frame;
        self.eof = false;
        true
    }

    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
        let Some(reader) = self.reader.as_mut() else {
            *call_again = false;
            return 0;
        };
        if self.eof {
            *call_again = false;
            return 0;
        }

        let spec = reader.spec();
        let mut n = 0;
        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    match sample {
                        Ok(v) => {
                            buf[n] = v;
                            n += 1;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "WAV sample read failed");
                            self.eof = true;
                            break;
                        }
                    }
                    if n == buf.len() {
                        break;
                    }
                }
            }
            hound::SampleFormat::Int => {
                let scale = 1.0 / f32::powi(2.0, i32::from(spec.bits_per_sample) - 1);
                for sample in reader.samples::<i32>() {
                    match sample {
                        Ok(v) => {
                            buf[n] = v as f32 * scale;
                            n += 1;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "WAV sample read failed");
                            self.eof = true;
                            break;
                        }
                    }
                    if n == buf.len() {
                        break;
                    }
                }
            }
        }

        self.frames_read += (n / usize::from(self.channels)) as u64;
        if n < buf.len() {
            self.eof = true;
            *call_again = false;
        } else {
            *call_again = self.frames_read < self.total_frames;
        }
        n
    }
}
