//! Detection of hi-res (MQA) encoding folded into a FLAC stream.
//!
//! The encoder hides a side channel in the exclusive-or of the left and
//! right sample at bit `bits_per_sample - 16`. A 36-bit sync word marks the
//! start of a metadata block whose next bits carry the original sample rate
//! and a provenance value.
//!
//! Only a short leading chunk of the stream ([`PROBE_PREFIX_BYTES`]) is
//! needed. [`probe`] never fails: anything it cannot decode is reported as
//! "not recognised".

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Bytes fetched from the start of a stream before probing.
pub const PROBE_PREFIX_BYTES: usize = 32_768;

const SYNC_WORD: u64 = 0x0b_e049_8c88;
const WINDOW_MASK: u64 = (1 << 36) - 1;

/// Outcome of a probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub is_recognized_encoding: bool,
    /// Bit depth of the carrier stream.
    pub bit_depth: Option<u32>,
    /// Sample rate the content was mastered at.
    pub original_sample_rate_hz: Option<u32>,
    /// Provenance flag for studio masters.
    pub is_studio: bool,
}

/// Probes the leading bytes of a FLAC stream.
#[must_use]
pub fn probe(first_bytes: &[u8]) -> ProbeResult {
    match decode_prefix(first_bytes) {
        Ok(prefix) => scan_frames(prefix.bits_per_sample, &prefix.frames),
        Err(error) => {
            debug!(error = %error, bytes = first_bytes.len(), "probe prefix not decodable");
            ProbeResult::default()
        }
    }
}

/// Scans decoded stereo frames for the sync word.
#[must_use]
pub fn scan_frames(bits_per_sample: u32, frames: &[[i32; 2]]) -> ProbeResult {
    if !(16..=32).contains(&bits_per_sample) {
        return ProbeResult::default();
    }
    let position = bits_per_sample - 16;
    let bit_at = |index: usize| -> Option<u8> {
        frames
            .get(index)
            .map(|[left, right]| u8::from(((left ^ right) >> position) & 1 == 1))
    };

    let mut window: u64 = 0;
    for (index, [left, right]) in frames.iter().enumerate() {
        let bit = u64::from(((left ^ right) >> position) & 1 == 1);
        window = ((window << 1) | bit) & WINDOW_MASK;
        if window != SYNC_WORD {
            continue;
        }

        let rate_code = read_bits(&bit_at, index + 3, 4);
        let provenance = read_bits(&bit_at, index + 29, 5);
        debug!(frame = index, ?rate_code, ?provenance, "hi-res sync word found");
        return ProbeResult {
            is_recognized_encoding: true,
            bit_depth: Some(bits_per_sample),
            original_sample_rate_hz: rate_code.map(decode_original_sample_rate),
            is_studio: provenance.is_some_and(|value| value > 8),
        };
    }
    ProbeResult::default()
}

/// Reads `count` side-channel bits MSB first, or `None` if the prefix ends early.
fn read_bits(bit_at: &impl Fn(usize) -> Option<u8>, start: usize, count: usize) -> Option<u8> {
    (start..start + count).try_fold(0u8, |acc, index| Some((acc << 1) | bit_at(index)?))
}

/// Decodes the 4-bit original-sample-rate code.
///
/// Bit 0 selects the 48 kHz family; bits 3..1, reversed, are a power-of-two
/// multiplier.
#[must_use]
pub fn decode_original_sample_rate(code: u8) -> u32 {
    let base: u32 = if code & 1 == 1 { 48_000 } else { 44_100 };
    let exponent = ((code >> 3) & 1) | (((code >> 2) & 1) << 1) | (((code >> 1) & 1) << 2);
    base << exponent
}

struct DecodedPrefix {
    bits_per_sample: u32,
    frames: Vec<[i32; 2]>,
}

fn decode_prefix(bytes: &[u8]) -> Result<DecodedPrefix, SymphoniaError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("flac");

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SymphoniaError::Unsupported("no audio track"))?;
    let track_id = track.id;
    let bits_per_sample = track
        .codec_params
        .bits_per_sample
        .ok_or(SymphoniaError::Unsupported("unknown bit depth"))?;
    let channels = track
        .codec_params
        .channels
        .map_or(0, |channels| channels.count());
    if channels < 2 {
        return Err(SymphoniaError::Unsupported("probe needs a stereo stream"));
    }

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<i32> = Vec::new();
    loop {
        // The prefix is cut mid-stream, so the last packet is usually truncated.
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) if !samples.is_empty() => break,
            Err(error) => return Err(error),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) if !samples.is_empty() => break,
            Err(error) => return Err(error),
        };
        let mut buffer = SampleBuffer::<i32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let shift = 32u32.saturating_sub(bits_per_sample);
    let left_aligned = shift > 0 && samples.iter().all(|sample| sample.trailing_zeros() >= shift);
    let frames = samples
        .chunks_exact(channels)
        .map(|frame| {
            let (left, right) = (frame[0], frame[1]);
            if left_aligned {
                [left >> shift, right >> shift]
            } else {
                [left, right]
            }
        })
        .collect();

    Ok(DecodedPrefix {
        bits_per_sample,
        frames,
    })
}
