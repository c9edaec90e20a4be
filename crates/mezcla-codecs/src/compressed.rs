//! MP3, FLAC, Vorbis, and AIFF decoders backed by symphonia.
//!
//! One adapter drives all four formats: the per-format constructors differ
//! only in the probe hint and display name. Container and codec parsing is
//! symphonia's job; this module translates its packet-pull model into the
//! engine's sample-pull [`Decoder`] contract, buffering the tail of each
//! decoded packet between calls.

use std::time::Duration;

use mezcla_core::{ByteStream, Decoder, Error, Result, SeekOrigin};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::reader::StreamReader;

struct OpenState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    channels: u16,
    rate: u32,
    total_frames: u64,
    sample_buf: Option<SampleBuffer<f32>>,
}

/// Decoder for symphonia-supported compressed and container formats.
///
/// Construct with [`SymphoniaDecoder::mp3`], [`SymphoniaDecoder::flac`],
/// [`SymphoniaDecoder::vorbis`], or [`SymphoniaDecoder::aiff`].
pub struct SymphoniaDecoder {
    name: &'static str,
    extension: &'static str,
    state: Option<OpenState>,
    leftover: Vec<f32>,
    leftover_pos: usize,
    eof: bool,
}

impl SymphoniaDecoder {
    fn with_format(name: &'static str, extension: &'static str) -> Self {
        Self {
            name,
            extension,
            state: None,
            leftover: Vec::new(),
            leftover_pos: 0,
            eof: false,
        }
    }

    /// MPEG layer III decoder.
    pub fn mp3() -> Self {
        Self::with_format("MP3", "mp3")
    }

    /// FLAC decoder.
    pub fn flac() -> Self {
        Self::with_format("FLAC", "flac")
    }

    /// Ogg Vorbis decoder.
    pub fn vorbis() -> Self {
        Self::with_format("Vorbis", "ogg")
    }

    /// AIFF / AIFF-C decoder.
    pub fn aiff() -> Self {
        Self::with_format("AIFF", "aiff")
    }

    /// Drain buffered samples from the last decoded packet into `buf`.
    fn drain_leftover(&mut self, buf: &mut [f32], filled: usize) -> usize {
        let available = self.leftover.len() - self.leftover_pos;
        let n = available.min(buf.len() - filled);
        buf[filled..filled + n]
            .copy_from_slice(&self.leftover[self.leftover_pos..self.leftover_pos + n]);
        self.leftover_pos += n;
        if self.leftover_pos == self.leftover.len() {
            self.leftover.clear();
            self.leftover_pos = 0;
        }
        n
    }
}

impl Decoder for SymphoniaDecoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&mut self, stream: Box<dyn ByteStream>) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::State(format!("{} decoder already open", self.name)));
        }

        let mss = MediaSourceStream::new(
            Box::new(StreamReader::new(stream)),
            Default::default(),
        );
        let mut hint = Hint::new();
        hint.with_extension(self.extension);

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decoder(format!("{} probe failed: {e}", self.name)))?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decoder(format!("{}: no decodable track", self.name)))?;

        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decoder(format!("{}: unknown channel layout", self.name)))?;
        if channels == 0 || channels > 2 {
            return Err(Error::Format(format!(
                "{}: unsupported channel count {channels}",
                self.name
            )));
        }
        let rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decoder(format!("{}: unknown sample rate", self.name)))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Codec(format!("{}: codec init failed: {e}", self.name)))?;

        self.state = Some(OpenState {
            track_id: track.id,
            channels,
            rate,
            total_frames: track.codec_params.n_frames.unwrap_or(0),
            decoder,
            format,
            sample_buf: None,
        });
        self.leftover.clear();
        self.leftover_pos = 0;
        self.eof = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn channels(&self) -> u16 {
        self.state.as_ref().map_or(0, |s| s.channels)
    }

    fn rate(&self) -> u32 {
        self.state.as_ref().map_or(0, |s| s.rate)
    }

    fn duration(&self) -> Duration {
        match self.state.as_ref() {
            Some(s) if s.total_frames > 0 && s.rate > 0 => {
                Duration::from_secs_f64(s.total_frames as f64 / f64::from(s.rate))
            }
            _ => Duration::ZERO,
        }
    }

    fn rewind(&mut self) -> bool {
        self.seek_to_time(Duration::ZERO)
    }

    fn seek_to_time(&mut self, pos: Duration) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        let target = Time::new(pos.as_secs(), f64::from(pos.subsec_nanos()) / 1e9);
        let seeked = state.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: target,
                track_id: Some(state.track_id),
            },
        );
        if seeked.is_err() {
            return false;
        }
        state.decoder.reset();
        self.leftover.clear();
        self.leftover_pos = 0;
        self.eof = false;
        true
    }

    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
        let mut filled = self.drain_leftover(buf, 0);

        if self.state.is_none() || self.eof {
            *call_again = !self.leftover.is_empty();
            return filled;
        }

        while filled < buf.len() {
            let state = self.state.as_mut().expect("checked above");
            let packet = match state.format.next_packet() {
                Ok(p) => p,
                Err(SymError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    break;
                }
                Err(SymError::ResetRequired) => {
                    self.eof = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(decoder = self.name, error = %e, "packet read failed");
                    self.eof = true;
                    break;
                }
            };
            if packet.track_id() != state.track_id {
                continue;
            }

            let decoded = match state.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymError::DecodeError(e)) => {
                    // A corrupt packet is skippable; keep going.
                    tracing::warn!(decoder = self.name, error = e, "skipping corrupt packet");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(decoder = self.name, error = %e, "decode failed");
                    self.eof = true;
                    break;
                }
            };

            let sample_buf = state.sample_buf.get_or_insert_with(|| {
                SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
            });
            if sample_buf.capacity() < decoded.capacity() * usize::from(state.channels) {
                *sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            }
            sample_buf.copy_interleaved_ref(decoded);

            let samples = sample_buf.samples();
            let n = samples.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&samples[..n]);
            filled += n;
            if n < samples.len() {
                self.leftover.extend_from_slice(&samples[n..]);
            }
        }

        *call_again = !self.eof || !self.leftover.is_empty();
        if filled == 0 && self.eof {
            *call_again = false;
        }
        filled
    }
}

// ---------------------------------------------------------------------------
// accept probes
// ---------------------------------------------------------------------------

fn read_prefix<const N: usize>(stream: &mut dyn ByteStream) -> Option<[u8; N]> {
    let mut buf = [0u8; N];
    (stream.read(&mut buf) == N).then_some(buf)
}

/// MP3: an ID3v2 tag or an MPEG audio frame sync at the stream start.
pub fn accept_mp3(stream: &mut dyn ByteStream) -> bool {
    let Some(head) = read_prefix::<3>(stream) else {
        return false;
    };
    if &head == b"ID3" {
        return true;
    }
    head[0] == 0xFF && head[1] & 0xE0 == 0xE0
}

/// FLAC: the `fLaC` stream marker.
pub fn accept_flac(stream: &mut dyn ByteStream) -> bool {
    matches!(read_prefix::<4>(stream), Some(magic) if &magic == b"fLaC")
}

/// Vorbis: an Ogg capture pattern. (Other Ogg payloads are rejected later
/// by `open`.)
pub fn accept_vorbis(stream: &mut dyn ByteStream) -> bool {
    matches!(read_prefix::<4>(stream), Some(magic) if &magic == b"OggS")
}

/// AIFF / AIFF-C: a `FORM` container holding an `AIFF` or `AIFC` payload.
pub fn accept_aiff(stream: &mut dyn ByteStream) -> bool {
    let Some(form) = read_prefix::<4>(stream) else {
        return false;
    };
    if &form != b"FORM" {
        return false;
    }
    if stream.seek(4, SeekOrigin::Current) < 0 {
        return false;
    }
    matches!(read_prefix::<4>(stream), Some(kind) if &kind == b"AIFF" || &kind == b"AIFC")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::MemoryStream;

    #[test]
    fn mp3_probe_matches_id3_and_frame_sync() {
        let mut id3 = MemoryStream::new(b"ID3\x04\x00rest".to_vec());
        assert!(accept_mp3(&mut id3));

        let mut sync = MemoryStream::new(vec![0xFF, 0xFB, 0x90, 0x00]);
        assert!(accept_mp3(&mut sync));

        let mut noise = MemoryStream::new(b"RIFFxxxx".to_vec());
        assert!(!accept_mp3(&mut noise));
    }

    #[test]
    fn flac_and_ogg_probes_match_magic() {
        let mut flac = MemoryStream::new(b"fLaC\x00\x00\x00\x22".to_vec());
        assert!(accept_flac(&mut flac));
        let mut ogg = MemoryStream::new(b"OggS\x00\x02".to_vec());
        assert!(accept_vorbis(&mut ogg));
        let mut other = MemoryStream::new(b"fLaX????".to_vec());
        assert!(!accept_flac(&mut other));
    }

    #[test]
    fn aiff_probe_requires_form_and_kind() {
        let mut aiff = MemoryStream::new(b"FORM\x00\x00\x00\x08AIFFCOMM".to_vec());
        assert!(accept_aiff(&mut aiff));
        let mut aifc = MemoryStream::new(b"FORM\x00\x00\x00\x08AIFC....".to_vec());
        assert!(accept_aiff(&mut aifc));
        let mut wave = MemoryStream::new(b"RIFF\x00\x00\x00\x08WAVE....".to_vec());
        assert!(!accept_aiff(&mut wave));
    }

    #[test]
    fn short_streams_are_rejected() {
        let mut tiny = MemoryStream::new(vec![0x49]);
        assert!(!accept_mp3(&mut tiny));
        assert!(!accept_flac(&mut tiny));
        assert!(!accept_aiff(&mut tiny));
    }
}
