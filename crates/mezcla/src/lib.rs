//! mezcla — a cross-platform audio playback engine.
//!
//! Decodes compressed audio sources, resamples them to the device's native
//! rate, mixes any number of concurrent streams, and delivers interleaved
//! PCM to a pluggable audio backend in real time.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   bytes    ┌─────────┐  native-rate   ┌───────────┐
//! │ ByteStream├───────────►│ Decoder ├───────────────►│ Resampler │
//! └───────────┘            └─────────┘   float PCM    └─────┬─────┘
//!       (one AudioSource owns all three)                    │ device-rate
//!                                                           ▼
//! ┌────────────┐  play/pause/stop/fade  ┌────────┐    ┌───────────┐
//! │ AudioStream├───────────────────────►│ Mixer  │◄───┤ …streams… │
//! └────────────┘                        └───┬────┘    └───────────┘
//!                                           │ summed floats
//!                                           ▼
//!                          ┌──────────────────────────────┐
//!                          │ AudioDevice (format convert) │
//!                          └──────────────┬───────────────┘
//!                                         ▼ backend callback
//!                                 OS audio subsystem
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mezcla::{AudioDevice, AudioSource, AudioSystem};
//! use mezcla_codecs::registry_with_all_codecs;
//! use mezcla_core::FileStream;
//! use mezcla_io::CpalBackend;
//!
//! AudioSystem::init(Arc::new(CpalBackend::new()))?;
//! let device = AudioDevice::open_default(AudioSystem::backend()?, None)?;
//!
//! let registry = registry_with_all_codecs();
//! let file = FileStream::open("music.flac").expect("open file");
//! let source = AudioSource::detect(Box::new(file), &registry)?;
//!
//! let stream = device.create_stream(source)?;
//! stream.set_volume(0.8);
//! stream.play();
//! ```

mod device;
mod mixer;
mod pc_speaker;
mod source;
mod stream;
mod system;

pub use device::{AudioDevice, DEFAULT_FRAME_SIZE};
pub use mixer::{MAX_RETAINED_SAMPLES, MIN_BUFFER_SAMPLES, Mixer, STABILITY_FRAMES};
pub use pc_speaker::PcSpeakerStream;
pub use source::AudioSource;
pub use stream::{AudioStream, FinishCallback, LoopPolicy, PlayState};
pub use system::AudioSystem;

// The engine's own vocabulary, re-exported for one-import consumers.
pub use mezcla_core::{
    AudioSpec, ByteStream, ChannelDecoder, Decoder, DecoderRegistry, Error, FileStream,
    MemoryStream, MmlParser, PolyphaseKernel, Resampler, Result, SampleFormat, SeekOrigin, Tone,
};
pub use mezcla_io::{AudioBackend, BackendStream, DeviceHandle, DeviceInfo, StreamCallback};
