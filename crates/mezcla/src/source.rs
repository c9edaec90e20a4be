//! Audio source: the owned decode pipeline behind one playback stream.
//!
//! An [`AudioSource`] binds exactly one byte stream, one decoder, and zero
//! or one resampler, and exposes the single pull the mixer needs. The byte
//! stream is handed to the decoder at `open`, so ownership stays linear:
//! source → decoder → stream.

use std::time::Duration;

use mezcla_core::{
    ByteStream, ChannelDecoder, Decoder, DecoderRegistry, Error, Resampler, Result,
};

/// Decoder, optional resampler, and input byte stream as one owned unit.
///
/// Non-copyable, movable. Construct, hand to
/// [`AudioDevice::create_stream`](crate::AudioDevice::create_stream), and
/// the device opens it against its own spec.
pub struct AudioSource {
    decoder: ChannelDecoder,
    resampler: Option<Resampler>,
    stream: Option<Box<dyn ByteStream>>,
    opened: bool,
}

impl AudioSource {
    /// Source without resampling: the decoder's native rate is presumed
    /// acceptable to the device.
    pub fn new(decoder: Box<dyn Decoder>, stream: Box<dyn ByteStream>) -> Self {
        Self {
            decoder: ChannelDecoder::new(decoder),
            resampler: None,
            stream: Some(stream),
            opened: false,
        }
    }

    /// Source with an explicit resampler stacked on the decoder.
    pub fn with_resampler(
        decoder: Box<dyn Decoder>,
        resampler: Resampler,
        stream: Box<dyn ByteStream>,
    ) -> Self {
        Self {
            decoder: ChannelDecoder::new(decoder),
            resampler: Some(resampler),
            stream: Some(stream),
            opened: false,
        }
    }

    /// Automatic source: pick a decoder via the registry and wrap it in the
    /// default polyphase resampler.
    pub fn detect(
        mut stream: Box<dyn ByteStream>,
        registry: &DecoderRegistry,
    ) -> Result<Self> {
        let decoder = registry
            .find_decoder(stream.as_mut())
            .ok_or_else(|| Error::Decoder("no registered decoder accepts this stream".into()))?;
        Ok(Self::with_resampler(
            decoder,
            Resampler::polyphase(),
            stream,
        ))
    }

    /// Open the decoder against the byte stream and, when a resampler is
    /// present, configure it for the device spec.
    pub fn open(&mut self, rate: u32, channels: u16, frame_size: usize) -> Result<()> {
        if self.opened {
            return Err(Error::State("audio source already open".into()));
        }
        let stream = self
            .stream
            .take()
            .ok_or_else(|| Error::State("audio source has no byte stream".into()))?;

        self.decoder
            .open(stream)
            .map_err(|e| Error::Decoder(format!("failed to open audio decoder: {e}")))?;

        // Contract check on the decoder implementation, not the input.
        if self.decoder.rate() == 0 || !(1..=2).contains(&self.decoder.channels()) {
            return Err(Error::Decoder(format!(
                "decoder '{}' reported invalid spec after open: {} Hz, {} ch",
                self.decoder.name(),
                self.decoder.rate(),
                self.decoder.channels()
            )));
        }

        // Pre-size the down-mix scratch so the audio thread never allocates.
        self.decoder
            .preallocate(frame_size * usize::from(channels.max(1)));

        if let Some(resampler) = self.resampler.as_mut() {
            resampler.set_spec(rate, self.decoder.rate(), channels, frame_size)?;
        }
        self.opened = true;
        Ok(())
    }

    /// Whether `open` has succeeded.
    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Short name of the decoder behind this source.
    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Pull decoded (and possibly resampled) samples into
    /// `buf[*cursor..len]`, advancing `cursor` by the amount written.
    ///
    /// `cursor` ends short of `len` only at end of stream.
    pub fn read_samples(
        &mut self,
        buf: &mut [f32],
        cursor: &mut usize,
        len: usize,
        device_channels: u16,
    ) {
        let len = len.min(buf.len());
        if *cursor >= len {
            return;
        }
        if let Some(resampler) = self.resampler.as_mut() {
            *cursor += resampler.resample(&mut self.decoder, &mut buf[*cursor..len]);
        } else {
            loop {
                let mut call_again = false;
                *cursor += self.decoder.decode(
                    &mut buf[*cursor..len],
                    &mut call_again,
                    device_channels,
                );
                if *cursor >= len || !call_again {
                    break;
                }
            }
        }
    }

    /// Total duration reported by the decoder; zero for streaming sources.
    pub fn duration(&self) -> Duration {
        self.decoder.duration()
    }

    /// Seek to an absolute position. Pending resampled audio from the old
    /// position is discarded on success.
    pub fn seek_to_time(&mut self, pos: Duration) -> bool {
        if !self.decoder.seek_to_time(pos) {
            return false;
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.discard_pending();
        }
        true
    }

    /// Rewind to the start. Pending resampled audio is discarded on
    /// success.
    pub fn rewind(&mut self) -> bool {
        if !self.decoder.rewind() {
            return false;
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.discard_pending();
        }
        true
    }
}
