// ============================================================
// Layer 7 — Audio Loading
// ============================================================
// WAV file → mono f32 signal at the analysis sample rate.
//
//   hound   reads integer or float PCM, any channel count
//   mixdown averages channels frame by frame
//   rubato  resamples the whole signal in one sinc pass

use std::path::Path;

use hound::{SampleFormat, WavReader};
use ndarray::Array1;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::domain::error::EvalError;

fn audio_err(path: &Path, reason: impl ToString) -> EvalError {
    EvalError::Audio { path: path.to_path_buf(), reason: reason.to_string() }
}

/// Read `path` as mono and resample to `target_rate` Hz.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<Array1<f32>, EvalError> {
    let reader   = WavReader::open(path).map_err(|e| audio_err(path, e))?;
    let spec     = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| audio_err(path, e))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| audio_err(path, e))?
        }
    };

    let mono: Vec<f64> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
        .collect();
    if mono.is_empty() {
        return Err(EvalError::EmptySignal(path.to_path_buf()));
    }

    if spec.sample_rate == target_rate {
        return Ok(mono.into_iter().map(|s| s as f32).collect());
    }

    let params = SincInterpolationParameters {
        sinc_len:            256,
        f_cutoff:            0.95,
        interpolation:       SincInterpolationType::Linear,
        oversampling_factor: 256,
        window:              WindowFunction::BlackmanHarris2,
    };
    let ratio    = target_rate as f64 / spec.sample_rate as f64;
    let expected = (mono.len() as f64 * ratio).ceil() as usize;
    let mut resampler =
        SincFixedIn::<f64>::new(ratio, 2.0, params, mono.len(), 1).map_err(|e| audio_err(path, e))?;

    // The sinc filter delays its output; flush one more chunk so the
    // tail comes out, then drop the leading delay.
    let delay    = resampler.output_delay();
    let mut body = resampler
        .process(&[mono], None)
        .map_err(|e| audio_err(path, e))?;
    let tail = resampler
        .process_partial(None::<&[Vec<f64>]>, None)
        .map_err(|e| audio_err(path, e))?;
    let mut channel = std::mem::take(&mut body[0]);
    channel.extend_from_slice(&tail[0]);
    let resampled: Vec<f32> = channel.into_iter().skip(delay).take(expected).map(|s| s as f32).collect();
    if resampled.len() < expected {
        return Err(audio_err(path, format!("resampler produced {} of {expected} frames", resampled.len())));
    }

    tracing::debug!(
        "Loaded '{}': {} Hz x{} → {} Hz",
        path.display(),
        spec.sample_rate,
        channels,
        target_rate
    );
    Ok(Array1::from(resampled))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::f32::consts::PI;
    use std::path::Path;

    /// Write a 16-bit WAV with one channel per entry of `channels`,
    /// each a sum of the given sine frequencies.
    pub fn write_tones(path: &Path, rate: u32, seconds: f32, channels: &[&[f32]]) {
        let spec = WavSpec {
            channels:        channels.len() as u16,
            sample_rate:     rate,
            bits_per_sample: 16,
            sample_format:   SampleFormat::Int,
        };
        let mut w = WavWriter::create(path, spec).unwrap();
        let n = (rate as f32 * seconds) as usize;
        for i in 0..n {
            let t = i as f32 / rate as f32;
            for freqs in channels {
                let v: f32 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>()
                    / freqs.len().max(1) as f32;
                w.write_sample((v * 0.5 * i16::MAX as f32) as i16).unwrap();
            }
        }
        w.finalize().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_tones;
    use super::*;

    #[test]
    fn stereo_is_mixed_down() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("st.wav");
        write_tones(&path, 8000, 0.5, &[&[440.0], &[440.0]]);

        let signal = load_mono(&path, 8000).unwrap();
        assert_eq!(signal.len(), 4000);
        let peak = signal.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak > 0.4 && peak <= 0.5, "peak {peak}");
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.wav");
        write_tones(&path, 22050, 1.0, &[&[220.0]]);

        let signal = load_mono(&path, 11025).unwrap();
        assert_eq!(signal.len(), 11025);
    }

    #[test]
    fn resampled_signal_is_time_aligned() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("aligned.wav");
        write_tones(&path, 22050, 1.0, &[&[220.0]]);

        // Away from the edges the output must match the same tone
        // sampled directly at the target rate.
        let signal = load_mono(&path, 11025).unwrap();
        for i in 1000..10000 {
            let t    = i as f32 / 11025.0;
            let want = 0.5 * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
            assert!((signal[i] - want).abs() < 0.08, "sample {i}: {} vs {want}", signal[i]);
        }
        let tail_peak = signal.slice(ndarray::s![10525..]).fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(tail_peak > 0.3, "tail peak {tail_peak}");
    }

    #[test]
    fn unreadable_file_is_an_audio_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        assert!(matches!(load_mono(&path, 11025), Err(EvalError::Audio { .. })));
    }

    #[test]
    fn empty_file_is_empty_signal() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_tones(&path, 8000, 0.0, &[&[440.0]]);
        assert!(matches!(load_mono(&path, 8000), Err(EvalError::EmptySignal(_))));
    }
}
