//! Core primitives for the mezcla audio playback engine.
//!
//! This crate holds the format-agnostic half of the engine: everything a
//! decoder or backend implementation needs, and nothing that touches an OS
//! audio API.
//!
//! # Contents
//!
//! - [`ByteStream`] — seekable binary input over files, memory, or
//!   caller-supplied sources, with total (non-failing) methods
//! - [`SampleFormat`] / [`AudioSpec`] — sample formats with encoded
//!   properties and the `(format, channels, rate)` triple
//! - [`to_float_fn`] / [`from_float_fn`] — stateless PCM ↔ float converters
//! - [`Decoder`] / [`ChannelDecoder`] — the pull-decoder contract and the
//!   mono↔stereo fan-out wrapper
//! - [`DecoderRegistry`] — priority-ordered automatic format detection
//! - [`Resampler`] / [`PolyphaseKernel`] — stateful sample-rate conversion
//! - [`MmlParser`] — the Music Macro Language grammar
//! - [`Error`] — the library-wide error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use mezcla_core::{DecoderRegistry, FileStream};
//!
//! let registry = build_registry(); // e.g. mezcla_codecs::register_all
//! let mut stream = FileStream::open("music.flac").expect("open file");
//! if let Some(mut decoder) = registry.find_decoder(&mut stream) {
//!     decoder.open(Box::new(stream))?;
//!     println!("{} Hz, {} ch", decoder.rate(), decoder.channels());
//! }
//! ```

mod convert;
mod decoder;
mod error;
mod format;
mod io;
mod mml;
mod registry;
mod resampler;

pub use convert::{FromFloatFn, ToFloatFn, from_float_fn, to_float_fn};
pub use decoder::{ChannelDecoder, Decoder, mono_to_stereo, stereo_to_mono};
pub use error::{Error, Result};
pub use format::{
    AudioSpec, SAMPLE_F32_SYS, SAMPLE_S16_SYS, SAMPLE_S32_SYS, SampleFormat,
};
pub use io::{
    ByteStream, FileStream, MemoryStream, SeekOrigin, read_s16be, read_s16le, read_s32be,
    read_s32le, read_u8, read_u16be, read_u16le, read_u32be, read_u32le,
};
pub use mml::{MmlParser, Tone};
pub use registry::{AcceptFn, DecoderRegistry, FactoryFn};
pub use resampler::{PolyphaseKernel, ResampleKernel, Resampler};
