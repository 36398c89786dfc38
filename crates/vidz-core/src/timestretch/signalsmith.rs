//! In-process offline renders via signalsmith-stretch
//!
//! Decodes the base WAV, pushes it through the stretcher in fixed output
//! chunks and writes a 32-bit float stereo WAV.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use signalsmith_stretch::Stretch;

use super::{StretchBackend, StretchError};

/// Number of channels rendered (stereo)
const CHANNELS: u32 = 2;

/// Output frames produced per stretcher call (also the cancellation checkpoint)
const OUTPUT_CHUNK_FRAMES: usize = 1024;

/// Offline signalsmith-stretch renderer
#[derive(Debug, Clone, Default)]
pub struct SignalsmithRenderer {
    /// Use `preset_cheaper` (faster, slightly lower quality)
    pub cheaper: bool,
}

impl SignalsmithRenderer {
    fn stretcher(&self, sample_rate: u32) -> Stretch {
        if self.cheaper {
            Stretch::preset_cheaper(CHANNELS, sample_rate)
        } else {
            Stretch::preset_default(CHANNELS, sample_rate)
        }
    }
}

impl StretchBackend for SignalsmithRenderer {
    fn name(&self) -> &'static str {
        "signalsmith"
    }

    fn render(
        &self,
        input: &Path,
        ratio: f64,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<(), StretchError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(StretchError::InvalidRatio(ratio));
        }

        let (source, sample_rate) = read_stereo(input)?;
        let result = stretch_into(self.stretcher(sample_rate), &source, ratio, cancel)
            .and_then(|rendered| write_stereo(output, &rendered, sample_rate));
        if result.is_err() {
            let _ = std::fs::remove_file(output);
        }
        result
    }
}

/// Stretch interleaved stereo so its length becomes `frames / ratio`
fn stretch_into(
    mut stretcher: Stretch,
    source: &[f32],
    ratio: f64,
    cancel: &AtomicBool,
) -> Result<Vec<f32>, StretchError> {
    let source_frames = source.len() / 2;
    let total_output_frames = ((source_frames as f64) / ratio).ceil() as usize;
    let mut output = vec![0.0f32; total_output_frames * 2];

    let mut input_pos = 0usize;
    let mut output_pos = 0usize;
    let mut fractional_input = 0.0f64;

    while output_pos < total_output_frames && input_pos < source_frames {
        if cancel.load(Ordering::Relaxed) {
            return Err(StretchError::Cancelled);
        }

        let output_chunk = OUTPUT_CHUNK_FRAMES.min(total_output_frames - output_pos);

        // The stretcher infers the ratio from input/output chunk sizes
        fractional_input += output_chunk as f64 * ratio;
        let input_chunk = fractional_input.floor() as usize;
        fractional_input -= input_chunk as f64;

        let input_end = (input_pos + input_chunk).min(source_frames);
        if input_end == input_pos {
            break;
        }

        stretcher.process(
            &source[input_pos * 2..input_end * 2],
            &mut output[output_pos * 2..(output_pos + output_chunk) * 2],
        );

        input_pos = input_end;
        output_pos += output_chunk;
    }

    if output_pos < total_output_frames {
        stretcher.flush(&mut output[output_pos * 2..]);
    }

    Ok(output)
}

/// Decode a WAV as interleaved stereo f32 (mono is duplicated, extra channels dropped)
fn read_stereo(path: &Path) -> Result<(Vec<f32>, u32), StretchError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let stereo = samples
        .chunks_exact(channels)
        .flat_map(|frame| {
            let left = frame[0];
            let right = if channels > 1 { frame[1] } else { frame[0] };
            [left, right]
        })
        .collect();

    Ok((stereo, spec.sample_rate))
}

fn write_stereo(path: &Path, interleaved: &[f32], sample_rate: u32) -> Result<(), StretchError> {
    let spec = hound::WavSpec {
        channels: CHANNELS as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in interleaved {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::write_click_wav;

    #[test]
    fn test_render_changes_length() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_click_wav(&input, 100.0, 2.0, 22050);

        SignalsmithRenderer { cheaper: true }
            .render(&input, 1.25, &output, &AtomicBool::new(false))
            .unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        // 2s at 1.25x -> 1.6s
        let expected = (2.0 * 22050.0 / 1.25_f64).ceil() as u32;
        assert_eq!(reader.duration(), expected);
    }

    #[test]
    fn test_cancelled_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_click_wav(&input, 100.0, 1.0, 8000);

        let result = SignalsmithRenderer::default().render(&input, 0.8, &output, &AtomicBool::new(true));
        assert!(matches!(result, Err(StretchError::Cancelled)));
        assert!(!output.exists());
    }
}
