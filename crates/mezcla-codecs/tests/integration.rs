//! End-to-end decoding tests: registry detection through sample output.

use std::time::Duration;

use mezcla_codecs::{WavDecoder, registry_with_all_codecs};
use mezcla_core::{
    ByteStream, ChannelDecoder, Decoder, DecoderRegistry, MemoryStream, Result as CoreResult,
};

/// Render a 16-bit PCM WAV into memory.
fn wav_bytes(channels: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

#[test]
fn silent_stereo_wav_round_trip() {
    // One second of stereo silence at 44.1 kHz, found via the registry.
    let bytes = wav_bytes(2, 44100, &vec![0i16; 44100 * 2]);
    let registry = registry_with_all_codecs();

    let mut stream = MemoryStream::new(bytes);
    let mut decoder = registry.find_decoder(&mut stream).expect("WAV detected");
    assert_eq!(decoder.name(), "WAV");

    decoder.open(Box::new(stream)).unwrap();
    assert_eq!(decoder.channels(), 2);
    assert_eq!(decoder.rate(), 44100);
    assert_eq!(decoder.duration(), Duration::from_secs(1));

    let mut total = 0usize;
    let mut buf = vec![0.0f32; 4096];
    loop {
        let mut again = false;
        let n = decoder.decode(&mut buf, &mut again);
        for &s in &buf[..n] {
            assert!(s.abs() <= 0.001, "expected silence, got {s}");
        }
        total += n;
        if n == 0 && !again {
            break;
        }
    }
    assert_eq!(total, 44100 * 2);
}

#[test]
fn mono_wav_fans_out_to_stereo() {
    let samples: Vec<i16> = (0..100).map(|i| (i * 300) as i16).collect();
    let bytes = wav_bytes(1, 44100, &samples);

    let mut decoder = WavDecoder::new();
    decoder.open(Box::new(MemoryStream::new(bytes))).unwrap();
    let mut channel_dec = ChannelDecoder::new(Box::new(decoder));

    let mut buf = vec![0.0f32; 200];
    let mut again = false;
    let n = channel_dec.decode(&mut buf, &mut again, 2);
    assert_eq!(n, 200);
    for (i, pair) in buf.chunks_exact(2).enumerate() {
        assert_eq!(pair[0], pair[1], "channels diverge at frame {i}");
    }
}

/// Dummy decoder whose probe matches anything.
struct GreedyDecoder;

impl Decoder for GreedyDecoder {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn open(&mut self, _stream: Box<dyn ByteStream>) -> CoreResult<()> {
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
        false
    }

    fn seek_to_time(&mut self, _pos: Duration) -> bool {
        false
    }

    fn decode(&mut self, _buf: &mut [f32], call_again: &mut bool) -> usize {
        *call_again = false;
        0
    }
}

fn accept_anything(_stream: &mut dyn ByteStream) -> bool {
    true
}

fn make_greedy() -> Box<dyn Decoder> {
    Box::new(GreedyDecoder)
}

fn make_wav() -> Box<dyn Decoder> {
    Box::new(WavDecoder::new())
}

#[test]
fn higher_priority_dummy_shadows_real_wav() {
    let mut registry = DecoderRegistry::new();
    registry.register(accept_anything, make_greedy, 100);
    registry.register(WavDecoder::accept, make_wav, 80);

    let bytes = wav_bytes(1, 44100, &[0i16; 32]);
    let mut stream = MemoryStream::new(bytes);
    let dec = registry.find_decoder(&mut stream).unwrap();
    assert_eq!(dec.name(), "greedy");
}

#[test]
fn registry_rejects_unknown_bytes_without_moving() {
    let registry = registry_with_all_codecs();
    // Binary garbage that matches no probe (first byte breaks the MML text
    // heuristic and no magic matches).
    let mut stream = MemoryStream::new(vec![0x01, 0x02, 0x03, 0x04, 0x05]);
    assert!(registry.find_decoder(&mut stream).is_none());
    assert_eq!(stream.tell(), 0);
}

#[test]
fn wav_seek_then_decode_matches_straight_decode() {
    let samples: Vec<i16> = (0..4410).map(|i| ((i % 200) * 100) as i16).collect();
    let bytes = wav_bytes(1, 44100, &samples);

    let mut straight = WavDecoder::new();
    straight
        .open(Box::new(MemoryStream::new(bytes.clone())))
        .unwrap();
    let mut all = vec![0.0f32; 4410];
    let mut again = false;
    assert_eq!(straight.decode(&mut all, &mut again), 4410);

    let mut seeker = WavDecoder::new();
    seeker.open(Box::new(MemoryStream::new(bytes))).unwrap();
    // 0.05 s at 44.1 kHz = frame 2205.
    assert!(seeker.seek_to_time(Duration::from_millis(50)));
    let mut tail = vec![0.0f32; 4410 - 2205];
    assert_eq!(seeker.decode(&mut tail, &mut again), 4410 - 2205);
    assert_eq!(tail[..], all[2205..]);
}
