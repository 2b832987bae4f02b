use anyhow::Context;
use rubato::Resampler;

/// Resample mono f32 PCM in [-1, 1] to a target sample rate.
pub fn resample_mono(
    input: &[f32],
    input_rate_hz: u32,
    target_rate_hz: u32,
) -> anyhow::Result<Vec<f32>> {
    if input.is_empty() || input_rate_hz == target_rate_hz {
        return Ok(input.to_vec());
    }

    let input_rate_hz: usize = input_rate_hz.try_into().context("invalid input sample rate")?;
    let target_rate_hz: usize = target_rate_hz
        .try_into()
        .context("invalid target sample rate")?;

    let params = rubato::SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: rubato::WindowFunction::BlackmanHarris2,
    };

    let mut resampler = rubato::SincFixedIn::<f32>::new(
        target_rate_hz as f64 / input_rate_hz as f64,
        2.0,
        params,
        input.len(),
        1,
    )
    .context("create resampler")?;

    let frames = vec![input.to_vec()];
    let out = resampler.process(&frames, None).context("resample")?;
    Ok(out.into_iter().next().unwrap_or_default())
}
