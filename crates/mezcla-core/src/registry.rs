//! Decoder registry with priority-ordered automatic format detection.
//!
//! The registry keeps `(accept, factory, priority)` entries stably sorted by
//! descending priority. Detection probes each entry's `accept` function
//! against the stream, restoring the stream position around every probe so a
//! misbehaving probe can never corrupt the next one.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::decoder::Decoder;
use crate::io::{ByteStream, SeekOrigin};

/// Format-detection probe. Returns `true` when the decoder recognises the
/// stream. Probes may leave the stream position anywhere; the registry
/// restores it.
pub type AcceptFn = fn(&mut dyn ByteStream) -> bool;

/// Factory producing a fresh, unopened decoder instance.
pub type FactoryFn = fn() -> Box<dyn Decoder>;

struct RegistryEntry {
    accept: AcceptFn,
    factory: FactoryFn,
    priority: i32,
}

/// Priority-ordered registry of decoder factories.
///
/// Registration is intended to happen once at startup; detection is
/// read-only afterwards and safe to share behind an `Arc`.
///
/// ## Priorities
///
/// Higher priorities are probed first; equal priorities keep insertion
/// order. The bundled set uses 80–100 for common formats, 50–70 for less
/// common lossless ones, and 10 for MML, whose all-text heuristic would
/// otherwise hijack other formats.
#[derive(Default)]
pub struct DecoderRegistry {
    entries: Vec<RegistryEntry>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder probe and factory at the given priority.
    pub fn register(&mut self, accept: AcceptFn, factory: FactoryFn, priority: i32) {
        self.entries.push(RegistryEntry {
            accept,
            factory,
            priority,
        });
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Probe the stream against every entry in priority order and return a
    /// decoder instance for the first match.
    ///
    /// The stream position is restored before each probe, before the
    /// returned decoder is created, and on exit regardless of outcome. A
    /// probe that panics counts as "not accepted".
    pub fn find_decoder(&self, stream: &mut dyn ByteStream) -> Option<Box<dyn Decoder>> {
        let original_pos = stream.tell();
        if original_pos < 0 {
            return None;
        }

        for entry in &self.entries {
            stream.seek(original_pos, SeekOrigin::Start);
            if probe(entry.accept, stream) {
                stream.seek(original_pos, SeekOrigin::Start);
                return Some((entry.factory)());
            }
        }

        stream.seek(original_pos, SeekOrigin::Start);
        None
    }

    /// Whether any registered decoder recognises the stream. Same probing
    /// and position rules as [`DecoderRegistry::find_decoder`], without
    /// creating a decoder.
    pub fn can_decode(&self, stream: &mut dyn ByteStream) -> bool {
        let original_pos = stream.tell();
        if original_pos < 0 {
            return false;
        }

        let mut found = false;
        for entry in &self.entries {
            stream.seek(original_pos, SeekOrigin::Start);
            if probe(entry.accept, stream) {
                found = true;
                break;
            }
        }

        stream.seek(original_pos, SeekOrigin::Start);
        found
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all registered decoders.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Run a probe, treating a panic as "not accepted".
fn probe(accept: AcceptFn, stream: &mut dyn ByteStream) -> bool {
    catch_unwind(AssertUnwindSafe(|| accept(stream))).unwrap_or_else(|_| {
        tracing::warn!("decoder probe panicked; treating as not accepted");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::io::MemoryStream;
    use std::time::Duration;

    struct DummyDecoder(&'static str);

    impl Decoder for DummyDecoder {
        fn name(&self) -> &'static str {
            self.0
        }

        fn open(&mut self, _stream: Box<dyn ByteStream>) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            false
        }

        fn channels(&self) -> u16 {
            1
        }

        fn rate(&self) -> u32 {
            44100
        }

        fn duration(&self) -> Duration {
            Duration::ZERO
        }

        fn rewind(&mut self) -> bool {
            true
        }

        fn seek_to_time(&mut self, _pos: Duration) -> bool {
            false
        }

        fn decode(&mut self, _buf: &mut [f32], call_again: &mut bool) -> usize {
            *call_again = false;
            0
        }
    }

    fn accept_all(_stream: &mut dyn ByteStream) -> bool {
        true
    }

    fn accept_none(_stream: &mut dyn ByteStream) -> bool {
        false
    }

    fn accept_magic_ab(stream: &mut dyn ByteStream) -> bool {
        let mut magic = [0u8; 2];
        stream.read(&mut magic) == 2 && &magic == b"AB"
    }

    fn accept_panics(stream: &mut dyn ByteStream) -> bool {
        // Disturb the position, then blow up.
        stream.seek(0, SeekOrigin::End);
        panic!("bad probe");
    }

    fn make_all() -> Box<dyn Decoder> {
        Box::new(DummyDecoder("all"))
    }

    fn make_magic() -> Box<dyn Decoder> {
        Box::new(DummyDecoder("magic"))
    }

    #[test]
    fn higher_priority_wins() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_magic_ab, make_magic, 80);
        registry.register(accept_all, make_all, 100);

        let mut stream = MemoryStream::new(b"ABCD".to_vec());
        let dec = registry.find_decoder(&mut stream).unwrap();
        assert_eq!(dec.name(), "all");
    }

    #[test]
    fn equal_priority_keeps_insertion_order() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_all, make_all, 50);
        registry.register(accept_magic_ab, make_magic, 50);

        let mut stream = MemoryStream::new(b"ABCD".to_vec());
        let dec = registry.find_decoder(&mut stream).unwrap();
        assert_eq!(dec.name(), "all");
    }

    #[test]
    fn position_restored_on_match_and_miss() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_magic_ab, make_magic, 10);

        let mut stream = MemoryStream::new(b"ABCD".to_vec());
        stream.seek(1, SeekOrigin::Start);
        assert!(registry.find_decoder(&mut stream).is_none());
        assert_eq!(stream.tell(), 1);

        stream.seek(0, SeekOrigin::Start);
        assert!(registry.find_decoder(&mut stream).is_some());
        assert_eq!(stream.tell(), 0);
    }

    #[test]
    fn panicking_probe_is_not_accepted() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_panics, make_all, 100);
        registry.register(accept_magic_ab, make_magic, 10);

        let mut stream = MemoryStream::new(b"ABCD".to_vec());
        let dec = registry.find_decoder(&mut stream).unwrap();
        assert_eq!(dec.name(), "magic");
        assert_eq!(stream.tell(), 0);
    }

    #[test]
    fn can_decode_does_not_move_position() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_none, make_all, 5);
        registry.register(accept_magic_ab, make_magic, 1);

        let mut stream = MemoryStream::new(b"ABxx".to_vec());
        assert!(registry.can_decode(&mut stream));
        assert_eq!(stream.tell(), 0);

        let mut other = MemoryStream::new(b"ZZzz".to_vec());
        assert!(!registry.can_decode(&mut other));
        assert_eq!(other.tell(), 0);
    }

    #[test]
    fn clear_empties_registry() {
        let mut registry = DecoderRegistry::new();
        registry.register(accept_all, make_all, 1);
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }
}
