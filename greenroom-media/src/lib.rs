pub mod capture;
pub mod encode;
pub mod resample;

pub use capture::{CaptureError, CaptureErrorKind, MicSource};
pub use encode::{EncodeError, OUTPUT_MIME_TYPE, TARGET_SAMPLE_RATE_HZ, encode_wav_mono_16k};
