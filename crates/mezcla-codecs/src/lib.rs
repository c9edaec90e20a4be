//! Bundled format decoders for the mezcla audio engine.
//!
//! Each decoder implements the [`Decoder`] contract from `mezcla-core` and
//! ships with an `accept` probe for the registry's automatic format
//! detection:
//!
//! - [`WavDecoder`] — RIFF/WAVE, parsed with hound
//! - [`SymphoniaDecoder`] — MP3, FLAC, Ogg Vorbis, and AIFF via symphonia
//! - [`MmlDecoder`] — Music Macro Language text rendered as a square wave
//!
//! # Example
//!
//! ```rust,ignore
//! use mezcla_codecs::registry_with_all_codecs;
//! use mezcla_core::FileStream;
//!
//! let registry = registry_with_all_codecs();
//! let mut stream = FileStream::open("tune.flac").expect("open file");
//! let decoder = registry.find_decoder(&mut stream).expect("known format");
//! ```

mod compressed;
mod mml;
mod reader;
mod wav;

pub use compressed::{SymphoniaDecoder, accept_aiff, accept_flac, accept_mp3, accept_vorbis};
pub use mml::MmlDecoder;
pub use wav::WavDecoder;

use mezcla_core::{Decoder, DecoderRegistry};

fn make_wav() -> Box<dyn Decoder> {
    Box::new(WavDecoder::new())
}

fn make_mp3() -> Box<dyn Decoder> {
    Box::new(SymphoniaDecoder::mp3())
}

fn make_flac() -> Box<dyn Decoder> {
    Box::new(SymphoniaDecoder::flac())
}

fn make_vorbis() -> Box<dyn Decoder> {
    Box::new(SymphoniaDecoder::vorbis())
}

fn make_aiff() -> Box<dyn Decoder> {
    Box::new(SymphoniaDecoder::aiff())
}

fn make_mml() -> Box<dyn Decoder> {
    Box::new(MmlDecoder::new())
}

/// Register every bundled decoder with the registry.
///
/// Priorities follow how likely each format is to appear and how exact its
/// probe is: common formats with strong magic first, MML last because its
/// text heuristic would happily claim other people's files.
pub fn register_all(registry: &mut DecoderRegistry) {
    registry.register(WavDecoder::accept, make_wav, 100);
    registry.register(accept_mp3, make_mp3, 90);
    registry.register(accept_flac, make_flac, 80);
    registry.register(accept_vorbis, make_vorbis, 70);
    registry.register(accept_aiff, make_aiff, 60);
    registry.register(MmlDecoder::accept, make_mml, 10);
}

/// Build a registry pre-populated with every bundled decoder.
pub fn registry_with_all_codecs() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();
    register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::MemoryStream;

    #[test]
    fn registry_holds_all_bundled_decoders() {
        let registry = registry_with_all_codecs();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn wav_outranks_mml_on_ambiguous_input() {
        // A WAV file whose header bytes are also printable-ish text would
        // still resolve to the WAV decoder by priority.
        let registry = registry_with_all_codecs();
        let mut stream = MemoryStream::new(b"T120 C D E".to_vec());
        let dec = registry.find_decoder(&mut stream).unwrap();
        assert_eq!(dec.name(), "MML");
    }
}
