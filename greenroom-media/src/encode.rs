use crate::resample::resample_mono;
use greenroom_core::types::{RawArtifact, SampleFormat};
use thiserror::Error;

/// Transcription backends expect 16 kHz mono.
pub const TARGET_SAMPLE_RATE_HZ: u32 = 16_000;

pub const OUTPUT_MIME_TYPE: &str = "audio/wav";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("empty recording")]
    EmptyRecording,

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("resample failed: {0}")]
    Resample(#[source] anyhow::Error),
}

/// Transcode a raw recorded container into the upload asset: decode per the
/// container's sample format, fold interleaved channels down to mono,
/// resample to 16 kHz and wrap as 16-bit PCM WAV.
///
/// Pure: encoding the same artifact twice yields identical bytes.
pub fn encode_wav_mono_16k(artifact: &RawArtifact) -> Result<Vec<u8>, EncodeError> {
    let container = &artifact.container;

    if container.channels == 0 {
        return Err(EncodeError::MalformedContainer("zero channels".into()));
    }
    if artifact.bytes.is_empty() {
        return Err(EncodeError::EmptyRecording);
    }

    let frame_len = container.bytes_per_frame();
    if artifact.bytes.len() % frame_len != 0 {
        return Err(EncodeError::MalformedContainer(format!(
            "byte length {} is not a multiple of the {frame_len}-byte frame",
            artifact.bytes.len()
        )));
    }

    let samples = decode_samples(&artifact.bytes, container.sample_format);
    let mono = downmix(&samples, container.channels as usize);

    let mono = resample_mono(&mono, container.sample_rate_hz, TARGET_SAMPLE_RATE_HZ)
        .map_err(EncodeError::Resample)?;
    if mono.is_empty() {
        return Err(EncodeError::EmptyRecording);
    }

    Ok(write_wav_mono_s16le(&mono, TARGET_SAMPLE_RATE_HZ))
}

fn decode_samples(bytes: &[u8], format: SampleFormat) -> Vec<f32> {
    match format {
        SampleFormat::F32Le => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        SampleFormat::I16Le => bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect(),
    }
}

fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn write_wav_mono_s16le(samples: &[f32], sample_rate_hz: u32) -> Vec<u8> {
    // Simple WAV (RIFF) writer: 16-bit PCM, mono.
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let audio_format: u16 = 1; // PCM

    let byte_rate = sample_rate_hz * num_channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = num_channels * (bits_per_sample / 8);

    let data_bytes_len = samples.len() as u32 * 2;

    let mut out = Vec::with_capacity((44 + data_bytes_len) as usize);

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_bytes_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&audio_format.to_le_bytes());
    out.extend_from_slice(&num_channels.to_le_bytes());
    out.extend_from_slice(&sample_rate_hz.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_bytes_len.to_le_bytes());

    for &s in samples {
        let v = s.clamp(-1.0, 1.0);
        let i = (v * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&i.to_le_bytes());
    }

    out
}
