//! 16-bit mono PCM WAV encoding.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::scale_raw_sample;
use crate::error::{MicsliceError, Result};

/// RIFF + fmt + data chunk headers for plain 16-bit PCM.
pub const WAV_HEADER_LEN: usize = 44;

pub fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode raw peripheral words as a complete WAV file in memory.
///
/// Every word goes through [`scale_raw_sample`], so out-of-range values clip
/// to the 16-bit bounds instead of wrapping.
///
/// # Errors
/// `InvalidArgument` for an empty buffer or zero rate; `Wav` when encoding fails.
pub fn encode_wav(raw: &[i32], sample_rate: u32) -> Result<Vec<u8>> {
    if raw.is_empty() {
        return Err(MicsliceError::InvalidArgument(
            "refusing to encode an empty buffer".into(),
        ));
    }
    if sample_rate == 0 {
        return Err(MicsliceError::InvalidArgument("sample rate is zero".into()));
    }

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + raw.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec(sample_rate))?;
        for &word in raw {
            writer.write_sample(scale_raw_sample(word))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RAW_SCALE_DIVISOR;

    fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn le_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    #[test]
    fn header_layout_matches_plain_pcm() {
        let raw = vec![0i32; 100];
        let bytes = encode_wav(&raw, 20_000).unwrap();

        assert_eq!(bytes.len(), WAV_HEADER_LEN + 200);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(le_u32(&bytes, 4), (bytes.len() - 8) as u32);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(le_u32(&bytes, 16), 16);
        assert_eq!(le_u16(&bytes, 20), 1); // PCM
        assert_eq!(le_u16(&bytes, 22), 1); // mono
        assert_eq!(le_u32(&bytes, 24), 20_000);
        assert_eq!(le_u32(&bytes, 28), 40_000); // byte rate
        assert_eq!(le_u16(&bytes, 32), 2); // block align
        assert_eq!(le_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(le_u32(&bytes, 40), 200);
    }

    #[test]
    fn samples_are_scaled_and_clipped() {
        let raw = [100 * RAW_SCALE_DIVISOR, -3 * RAW_SCALE_DIVISOR, i32::MAX, i32::MIN];
        let bytes = encode_wav(&raw, 16_000).unwrap();
        let body: Vec<i16> = bytes[WAV_HEADER_LEN..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(body, vec![100, -3, i16::MAX, i16::MIN]);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(
            encode_wav(&[], 20_000),
            Err(MicsliceError::InvalidArgument(_))
        ));
    }
}
