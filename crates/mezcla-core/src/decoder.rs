//! Format-agnostic decoder contract and channel fan-out.
//!
//! Concrete decoders implement [`Decoder`] in their *native* channel count
//! and rate; [`ChannelDecoder`] wraps one and converts between mono and
//! stereo on the way out, so no decoder has to care what the device wants.

use std::time::Duration;

use crate::error::Result;
use crate::io::ByteStream;

/// Pull-style audio decoder producing interleaved float PCM.
///
/// ## Lifecycle
///
/// A decoder is constructed closed, opened once against a byte stream (which
/// it takes ownership of), and then decoded, rewound, or seeked freely. A
/// read that returns `0` samples with `call_again = false` marks end of
/// stream; the decoder stays open and a successful `rewind` or
/// `seek_to_time` makes it produce samples again.
///
/// ## Implementer obligations
///
/// - After a successful `open`, `rate()` is positive and `channels()` is
///   1 or 2.
/// - `decode` fills the buffer in the decoder's native channel count; the
///   engine handles mono↔stereo conversion.
/// - `seek_to_time` leaves the position unchanged when it fails.
pub trait Decoder: Send {
    /// Short human-readable name of the format, e.g. `"WAV"`.
    fn name(&self) -> &'static str;

    /// Open the decoder against a byte stream positioned at the start of
    /// the data. The stream is owned by the decoder from here on.
    fn open(&mut self, stream: Box<dyn ByteStream>) -> Result<()>;

    /// Whether `open` has succeeded.
    fn is_open(&self) -> bool;

    /// Native channel count (1 or 2). Only valid after `open`.
    fn channels(&self) -> u16;

    /// Native sample rate in Hz. Only valid after `open`.
    fn rate(&self) -> u32;

    /// Total duration. [`Duration::ZERO`] means unknown or streaming.
    fn duration(&self) -> Duration;

    /// Seek back to the beginning. Returns `true` on success.
    fn rewind(&mut self) -> bool;

    /// Seek to an absolute time position. Returns `false` when seeking is
    /// unsupported or the target is out of range.
    fn seek_to_time(&mut self, pos: Duration) -> bool;

    /// Decode up to `buf.len()` samples in the native channel count.
    ///
    /// Sets `call_again` to `true` when more data remains after this call.
    /// Returning `0` with `call_again = false` signals end of stream.
    fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize;
}

/// Duplicate each sample in the first half of `buf` over the whole buffer,
/// back to front so the expansion works in place.
pub fn mono_to_stereo(buf: &mut [f32], len: usize) {
    if len < 2 || buf.len() < len {
        return;
    }
    let mut j = len;
    for i in (0..len / 2).rev() {
        j -= 1;
        buf[j] = buf[i];
        j -= 1;
        buf[j] = buf[i];
    }
}

/// Average interleaved stereo pairs from `src` into mono samples in `dst`.
pub fn stereo_to_mono(dst: &mut [f32], src: &[f32]) {
    for (out, pair) in dst.iter_mut().zip(src.chunks_exact(2)) {
        *out = 0.5 * pair[0] + 0.5 * pair[1];
    }
}

/// A decoder plus the state needed to fan its native channel layout out to
/// (or down to) the device's channel count.
///
/// The stereo scratch buffer is pre-sized by [`ChannelDecoder::preallocate`]
/// so the audio thread never allocates during decode.
pub struct ChannelDecoder {
    inner: Box<dyn Decoder>,
    stereo_buf: Vec<f32>,
}

impl ChannelDecoder {
    /// Wrap a concrete decoder.
    pub fn new(inner: Box<dyn Decoder>) -> Self {
        Self {
            inner,
            stereo_buf: Vec::new(),
        }
    }

    /// Pre-size the down-mix scratch buffer for decode requests of up to
    /// `max_len` samples.
    pub fn preallocate(&mut self, max_len: usize) {
        if self.stereo_buf.len() < max_len * 2 {
            self.stereo_buf.resize(max_len * 2, 0.0);
        }
    }

    /// Open the wrapped decoder. See [`Decoder::open`].
    pub fn open(&mut self, stream: Box<dyn ByteStream>) -> Result<()> {
        self.inner.open(stream)
    }

    /// Decode up to `buf.len()` samples converted to `device_channels`.
    ///
    /// - native mono, device stereo: decode into the first half, then
    ///   expand in place.
    /// - native stereo, device mono: decode into the scratch buffer, then
    ///   average pairs into `buf`.
    /// - matching counts: decode straight into `buf`.
    pub fn decode(&mut self, buf: &mut [f32], call_again: &mut bool, device_channels: u16) -> usize {
        let native = self.inner.channels();
        if native == 1 && device_channels == 2 {
            let half = buf.len() / 2;
            let n = self.inner.decode(&mut buf[..half], call_again);
            mono_to_stereo(buf, n * 2);
            return n * 2;
        }
        if native == 2 && device_channels == 1 {
            let want = buf.len() * 2;
            if self.stereo_buf.len() < want {
                // Fallback for callers that skipped preallocate.
                self.stereo_buf.resize(want, 0.0);
            }
            let n = self.inner.decode(&mut self.stereo_buf[..want], call_again);
            stereo_to_mono(&mut buf[..n / 2], &self.stereo_buf[..n]);
            return n / 2;
        }
        self.inner.decode(buf, call_again)
    }

    /// Native channel count of the wrapped decoder.
    pub fn channels(&self) -> u16 {
        self.inner.channels()
    }

    /// Native sample rate of the wrapped decoder.
    pub fn rate(&self) -> u32 {
        self.inner.rate()
    }

    /// Total duration reported by the wrapped decoder.
    pub fn duration(&self) -> Duration {
        self.inner.duration()
    }

    /// Whether the wrapped decoder is open.
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Format name of the wrapped decoder.
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Rewind the wrapped decoder.
    pub fn rewind(&mut self) -> bool {
        self.inner.rewind()
    }

    /// Seek the wrapped decoder. See [`Decoder::seek_to_time`].
    pub fn seek_to_time(&mut self, pos: Duration) -> bool {
        self.inner.seek_to_time(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits an incrementing ramp in a configurable channel count.
    struct RampDecoder {
        channels: u16,
        next: f32,
        remaining: usize,
        open: bool,
    }

    impl RampDecoder {
        fn new(channels: u16, total: usize) -> Self {
            Self {
                channels,
                next: 0.0,
                remaining: total,
                open: false,
            }
        }
    }

    impl Decoder for RampDecoder {
        fn name(&self) -> &'static str {
            "ramp"
        }

        fn open(&mut self, _stream: Box<dyn ByteStream>) -> Result<()> {
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn rate(&self) -> u32 {
            44100
        }

        fn duration(&self) -> Duration {
            Duration::ZERO
        }

        fn rewind(&mut self) -> bool {
            false
        }

        fn seek_to_time(&mut self, _pos: Duration) -> bool {
            false
        }

        fn decode(&mut self, buf: &mut [f32], call_again: &mut bool) -> usize {
            let n = buf.len().min(self.remaining);
            for s in &mut buf[..n] {
                *s = self.next;
                self.next += 0.001;
            }
            self.remaining -= n;
            *call_again = self.remaining > 0;
            n
        }
    }

    #[test]
    fn mono_to_stereo_duplicates_pairs() {
        let mut dec = ChannelDecoder::new(Box::new(RampDecoder::new(1, 100)));
        let mut buf = vec![0.0f32; 200];
        let mut again = false;
        let n = dec.decode(&mut buf, &mut again, 2);
        assert_eq!(n, 200);
        for pair in buf.chunks_exact(2) {
            assert_eq!(pair[0], pair[1]);
        }
        // The left channel carries the original ramp.
        assert_eq!(buf[0], 0.0);
        assert!((buf[2] - 0.001).abs() < 1e-7);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut dec = ChannelDecoder::new(Box::new(RampDecoder::new(2, 8)));
        dec.preallocate(4);
        let mut buf = vec![0.0f32; 4];
        let mut again = false;
        let n = dec.decode(&mut buf, &mut again, 1);
        assert_eq!(n, 4);
        // Pairs (0.000, 0.001), (0.002, 0.003), ...
        assert!((buf[0] - 0.0005).abs() < 1e-7);
        assert!((buf[1] - 0.0025).abs() < 1e-7);
    }

    #[test]
    fn matching_channels_pass_through() {
        let mut dec = ChannelDecoder::new(Box::new(RampDecoder::new(2, 6)));
        let mut buf = vec![0.0f32; 6];
        let mut again = false;
        let n = dec.decode(&mut buf, &mut again, 2);
        assert_eq!(n, 6);
        assert_eq!(buf[0], 0.0);
        assert!(!again);
    }

    /// Fanning mono out to stereo and averaging the pairs back gives the
    /// same samples as decoding at mono directly.
    #[test]
    fn fan_out_round_trip_matches_direct_mono() {
        let mut stereo_path = ChannelDecoder::new(Box::new(RampDecoder::new(1, 64)));
        let mut direct_path = ChannelDecoder::new(Box::new(RampDecoder::new(1, 64)));

        let mut wide = vec![0.0f32; 128];
        let mut again = false;
        stereo_path.decode(&mut wide, &mut again, 2);
        let mut averaged = vec![0.0f32; 64];
        stereo_to_mono(&mut averaged, &wide);

        let mut direct = vec![0.0f32; 64];
        direct_path.decode(&mut direct, &mut again, 1);

        assert_eq!(averaged, direct);
    }

    #[test]
    fn short_decode_reports_partial_fanout() {
        // 10 mono samples into a request for 40 stereo samples.
        let mut dec = ChannelDecoder::new(Box::new(RampDecoder::new(1, 10)));
        let mut buf = vec![0.0f32; 40];
        let mut again = true;
        let n = dec.decode(&mut buf, &mut again, 2);
        assert_eq!(n, 20);
        assert!(!again);
    }
}
