//! Audio decoding
//!
//! WAV files are read directly with hound. Everything else (video containers,
//! mp3, flac, aac) goes through symphonia and is exported as a WAV so the
//! stretch backends have a file they can read.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AnalysisError;

/// Samples decoded between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1 << 16;

/// Packets decoded between cancellation checks
const CANCEL_CHECK_PACKETS: usize = 64;

/// Interleaved audio as decoded
pub(crate) struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn to_mono(&self) -> Vec<f32> {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        let mut mixer = MonoMixer::new(self.channels, frames);
        for &sample in &self.samples {
            mixer.push(sample);
        }
        mixer.finish()
    }
}

/// Decode a WAV file and average its channels down to mono
pub(crate) fn read_mono(path: &Path, cancel: &AtomicBool) -> Result<(Vec<f32>, u32), AnalysisError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let mut mixer = MonoMixer::new(spec.channels, reader.duration() as usize);

    match spec.sample_format {
        hound::SampleFormat::Float => {
            for (i, sample) in reader.samples::<f32>().enumerate() {
                if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                    return Err(AnalysisError::Cancelled);
                }
                mixer.push(sample?);
            }
        }
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            for (i, sample) in reader.samples::<i32>().enumerate() {
                if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                    return Err(AnalysisError::Cancelled);
                }
                mixer.push(sample? as f32 * scale);
            }
        }
    }

    Ok((mixer.finish(), spec.sample_rate))
}

/// Decode the first audio track of any container symphonia understands
pub(crate) fn decode_media(path: &Path, cancel: &AtomicBool) -> Result<DecodedAudio, AnalysisError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::NoAudio(path.to_path_buf()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::Unsupported(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<(SampleBuffer<f32>, usize)> = None;

    for packet_index in 0.. {
        if packet_index % CANCEL_CHECK_PACKETS == 0 && cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                log::warn!("[ANALYSIS] {:?}: error reading packet: {}", path, e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("[ANALYSIS] {:?}: skipping bad packet: {}", path, e);
                continue;
            }
            Err(e) => return Err(AnalysisError::Unsupported(e.to_string())),
        };

        let spec = *decoded.spec();
        let frames = decoded.capacity();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        if sample_buf.as_ref().map_or(true, |(_, capacity)| *capacity < frames) {
            sample_buf = Some((SampleBuffer::new(frames as u64, spec), frames));
        }
        if let Some((buf, _)) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(AnalysisError::Empty);
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Write decoded audio as a 32-bit float WAV, creating parent directories
pub(crate) fn write_wav(path: &Path, audio: &DecodedAudio) -> Result<(), hound::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &audio.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Accumulates interleaved samples into channel-averaged frames
struct MonoMixer {
    channels: usize,
    acc: f32,
    filled: usize,
    out: Vec<f32>,
}

impl MonoMixer {
    fn new(channels: u16, frames: usize) -> Self {
        Self {
            channels: channels.max(1) as usize,
            acc: 0.0,
            filled: 0,
            out: Vec::with_capacity(frames),
        }
    }

    fn push(&mut self, sample: f32) {
        self.acc += sample;
        self.filled += 1;
        if self.filled == self.channels {
            self.out.push(self.acc / self.channels as f32);
            self.acc = 0.0;
            self.filled = 0;
        }
    }

    /// Trailing partial frames are dropped
    fn finish(self) -> Vec<f32> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_mix_averages_channels() {
        let audio = DecodedAudio {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.25],
            sample_rate: 8000,
            channels: 2,
        };
        assert_eq!(audio.to_mono(), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_write_wav_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.wav");
        let audio = DecodedAudio {
            samples: vec![0.0, 0.25, 0.5, 0.75],
            sample_rate: 11025,
            channels: 2,
        };
        write_wav(&path, &audio).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 11025);
        let back: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(back, audio.samples);
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, [0x13u8; 512]).unwrap();
        let result = decode_media(&path, &AtomicBool::new(false));
        assert!(matches!(result, Err(AnalysisError::Unsupported(_))));
    }
}
