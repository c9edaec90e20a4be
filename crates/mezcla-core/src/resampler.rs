//! Stateful sample-rate conversion stacked atop a decoder.
//!
//! [`Resampler`] is the pull driver: it stages decoded samples in a pending
//! buffer and feeds them through a [`ResampleKernel`] until the destination
//! buffer is full or the decoder runs dry. Residual input that the kernel
//! did not consume is preserved across calls.
//!
//! The bundled [`PolyphaseKernel`] implements rational P/Q conversion with a
//! windowed-sinc (Blackman) prototype lowpass decomposed into P polyphase
//! branches, computing only the output samples actually needed. Unlike a
//! batch resampler it retains the last few input frames as filter history so
//! that successive calls splice seamlessly.

use std::f32::consts::PI;

use crate::decoder::ChannelDecoder;
use crate::error::{Error, Result};

/// Stateless-contract kernel interface for concrete resampling algorithms.
///
/// The kernel may consume fewer input samples than offered and may produce
/// fewer output samples than there is room for; the [`Resampler`] driver
/// loops. After [`ResampleKernel::discard`], the kernel must hold no state
/// derived from samples seen before the discard point.
pub trait ResampleKernel: Send {
    /// Reconfigure for a new rate pair and channel count.
    fn set_output_spec(&mut self, dst_rate: u32, src_rate: u32, channels: u16) -> Result<()>;

    /// Resample interleaved samples from `src` into `dst`.
    ///
    /// Returns `(samples_written, samples_consumed)`.
    fn process(&mut self, dst: &mut [f32], src: &[f32]) -> (usize, usize);

    /// Drop all internal history.
    fn discard(&mut self);
}

/// Pull-style resampler binding a kernel to a decoder.
///
/// The decoder is not stored; the audio source passes it in on every
/// [`Resampler::resample`] call, which keeps ownership linear: the source
/// owns both ends of the pipe.
pub struct Resampler {
    kernel: Box<dyn ResampleKernel>,
    dst_rate: u32,
    src_rate: u32,
    channels: u16,
    chunk_size: usize,
    pending: Vec<f32>,
    pending_len: usize,
}

impl Resampler {
    /// Create a resampler around a concrete kernel.
    pub fn new(kernel: Box<dyn ResampleKernel>) -> Self {
        Self {
            kernel,
            dst_rate: 0,
            src_rate: 0,
            channels: 0,
            chunk_size: 0,
            pending: Vec::new(),
            pending_len: 0,
        }
    }

    /// Create a resampler with the default polyphase kernel.
    pub fn polyphase() -> Self {
        Self::new(Box::new(PolyphaseKernel::new()))
    }

    /// Configure the conversion: destination rate, source rate, channel
    /// count, and how many samples per channel to stage per decoder pull.
    ///
    /// `chunk_size` is typically the device frame size.
    pub fn set_spec(
        &mut self,
        dst_rate: u32,
        src_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<()> {
        if dst_rate == 0 || src_rate == 0 || channels == 0 {
            return Err(Error::Format(format!(
                "invalid resampler spec: {src_rate} Hz -> {dst_rate} Hz, {channels} ch"
            )));
        }
        self.kernel.set_output_spec(dst_rate, src_rate, channels)?;
        self.dst_rate = dst_rate;
        self.src_rate = src_rate;
        self.channels = channels;
        self.chunk_size = chunk_size.max(1);
        self.pending
            .resize(self.chunk_size * channels as usize, 0.0);
        self.pending_len = 0;
        Ok(())
    }

    /// Configured destination sample rate.
    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Configured source sample rate.
    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    /// Configured channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Configured staging chunk size, in samples per channel.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fill `dst` with resampled audio pulled from `decoder`.
    ///
    /// Returns the number of samples written, which is less than
    /// `dst.len()` only when the decoder reached end of stream.
    pub fn resample(&mut self, decoder: &mut ChannelDecoder, dst: &mut [f32]) -> usize {
        let mut written = 0;
        let mut at_eos = false;

        // Stop once the remaining space cannot hold a whole frame.
        while written + usize::from(self.channels) <= dst.len() {
            // Top up the staging buffer from the decoder.
            while !at_eos && self.pending_len < self.pending.len() {
                let mut call_again = false;
                let n = decoder.decode(
                    &mut self.pending[self.pending_len..],
                    &mut call_again,
                    self.channels,
                );
                self.pending_len += n;
                if n == 0 {
                    at_eos = !call_again;
                    break;
                }
                if !call_again {
                    break;
                }
            }

            let (out_n, in_n) = self
                .kernel
                .process(&mut dst[written..], &self.pending[..self.pending_len]);
            written += out_n;
            if in_n > 0 {
                self.pending.copy_within(in_n..self.pending_len, 0);
                self.pending_len -= in_n;
            }

            if out_n == 0 && in_n == 0 {
                // No forward progress: either the decoder is dry or the
                // kernel refuses a full staging buffer.
                if at_eos || self.pending_len >= self.pending.len() {
                    break;
                }
            }
            if at_eos && self.pending_len == 0 && out_n == 0 {
                break;
            }
        }

        written
    }

    /// Discard staged and kernel-held samples, e.g. after seeking the
    /// underlying decoder, so the next [`Resampler::resample`] reflects the
    /// new position immediately.
    pub fn discard_pending(&mut self) {
        self.pending_len = 0;
        self.kernel.discard();
    }
}

// ---------------------------------------------------------------------------
// Polyphase kernel
// ---------------------------------------------------------------------------

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Streaming rational resampler using polyphase decomposition of a
/// windowed-sinc prototype.
///
/// Output sample `m` (per channel) is computed from input frames around
/// `n = floor(m·Q/P)` using polyphase branch `k = (m·Q) mod P`, so only the
/// needed output samples are ever evaluated. The last `taps - 1` input
/// frames are retained between calls as filter history.
pub struct PolyphaseKernel {
    quality: u8,
    p: u64,
    q: u64,
    channels: usize,
    taps: usize,
    poly: Vec<f32>,
    hist: Vec<f32>,
    hist_base: u64,
    next_out: u64,
    passthrough: bool,
}

impl PolyphaseKernel {
    /// Create a kernel at the default quality (5).
    pub fn new() -> Self {
        Self::with_quality(5)
    }

    /// Create a kernel with an explicit quality level in `0..=10`. The
    /// value is clamped; higher quality means more taps per polyphase
    /// branch and a sharper anti-aliasing cutoff.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.min(10),
            p: 1,
            q: 1,
            channels: 1,
            taps: 0,
            poly: Vec::new(),
            hist: Vec::new(),
            hist_base: 0,
            next_out: 0,
            passthrough: true,
        }
    }

    /// Configured quality level.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn hist_frames(&self) -> u64 {
        (self.hist.len() / self.channels) as u64
    }
}

impl Default for PolyphaseKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResampleKernel for PolyphaseKernel {
    fn set_output_spec(&mut self, dst_rate: u32, src_rate: u32, channels: u16) -> Result<()> {
        if dst_rate == 0 || src_rate == 0 || channels == 0 {
            return Err(Error::Format(format!(
                "invalid resample spec: {src_rate} Hz -> {dst_rate} Hz"
            )));
        }

        let g = gcd(u64::from(dst_rate), u64::from(src_rate));
        self.p = u64::from(dst_rate) / g;
        self.q = u64::from(src_rate) / g;
        self.channels = usize::from(channels);
        self.hist.clear();
        self.hist_base = 0;
        self.next_out = 0;
        self.passthrough = self.p == self.q;

        if self.passthrough {
            self.taps = 0;
            self.poly.clear();
            return Ok(());
        }

        self.taps = 4 * (usize::from(self.quality) + 1);
        let p = self.p as usize;
        let num_taps = self.taps * p;
        let mid = (num_taps - 1) as f32 / 2.0;
        // Anti-aliasing cutoff just below the narrower Nyquist, with a 10%
        // guard band.
        let cutoff = 0.9 / self.p.max(self.q) as f32;

        // Build the Blackman-windowed sinc prototype tap by tap, writing
        // straight into branch-major order: branch k holds prototype taps
        // k, k+P, k+2P, … The whole prototype is then normalized to unity
        // DC gain so passband level survives the conversion.
        self.poly = vec![0.0; num_taps];
        let mut dc_gain = 0.0f32;
        for tap in 0..num_taps {
            let x = tap as f32 - mid;
            let sinc = if x.abs() < 1e-7 {
                cutoff
            } else {
                (PI * cutoff * x).sin() / (PI * x)
            };
            let phase = PI * tap as f32 / mid;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            let coeff = sinc * window;
            dc_gain += coeff;
            self.poly[(tap % p) * self.taps + tap / p] = coeff;
        }
        if dc_gain.abs() > 1e-10 {
            for c in &mut self.poly {
                *c /= dc_gain;
            }
        }

        tracing::debug!(
            src_rate,
            dst_rate,
            p = self.p,
            q = self.q,
            taps = self.taps,
            "polyphase resampler configured"
        );
        Ok(())
    }

    fn process(&mut self, dst: &mut [f32], src: &[f32]) -> (usize, usize) {
        if self.passthrough {
            let n = dst.len().min(src.len());
            let n = n - n % self.channels;
            dst[..n].copy_from_slice(&src[..n]);
            return (n, n);
        }

        let in_frames = src.len() / self.channels;
        let in_samples = in_frames * self.channels;
        self.hist.extend_from_slice(&src[..in_samples]);

        let total_frames = self.hist_base + self.hist_frames();
        let dst_cap = dst.len() / self.channels;
        let mut produced = 0;

        while produced < dst_cap {
            let pos = self.next_out * self.q;
            let n = pos / self.p;
            if n >= total_frames {
                break;
            }
            let k = (pos % self.p) as usize;
            let branch = &self.poly[k * self.taps..(k + 1) * self.taps];

            for c in 0..self.channels {
                let mut acc = 0.0f32;
                for (i, &coeff) in branch.iter().enumerate() {
                    let idx = n as i64 - i as i64;
                    // Frames before the stream start contribute zero.
                    if idx < self.hist_base as i64 {
                        break;
                    }
                    let off = (idx as u64 - self.hist_base) as usize * self.channels + c;
                    acc += coeff * self.hist[off];
                }
                dst[produced * self.channels + c] = acc * self.p as f32;
            }
            produced += 1;
            self.next_out += 1;
        }

        // Keep only the frames the next output can still reach back to.
        let next_needed = self.next_out * self.q / self.p;
        let keep_from = next_needed.saturating_sub(self.taps as u64 - 1);
        if keep_from > self.hist_base {
            let drop_frames = (keep_from - self.hist_base).min(self.hist_frames());
            self.hist.drain(..drop_frames as usize * self.channels);
            self.hist_base += drop_frames;
        }

        (produced * self.channels, in_samples)
    }

    fn discard(&mut self) {
        self.hist.clear();
        self.hist_base = 0;
        self.next_out = 0;
    }
}
