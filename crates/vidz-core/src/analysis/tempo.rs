//! Tempo estimation
//!
//! [`EnergyTempoEstimator`] is a small onset-autocorrelation estimator meant
//! for short, loop-like clips. Hosts with a better beat tracker plug it in
//! through [`TempoEstimator`].

/// Estimates a clip's tempo from mono samples
pub trait TempoEstimator: Send + Sync {
    /// Returns `None` when no periodicity is found
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Option<f64>;
}

/// Energy-flux autocorrelation tempo estimator
#[derive(Debug, Clone)]
pub struct EnergyTempoEstimator {
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Default for EnergyTempoEstimator {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 180.0,
            frame_size: 1024,
            hop_size: 512,
        }
    }
}

impl EnergyTempoEstimator {
    /// Positive energy differences between consecutive frames
    fn onset_envelope(&self, samples: &[f32]) -> Vec<f32> {
        let energies: Vec<f32> = (0..=samples.len() - self.frame_size)
            .step_by(self.hop_size)
            .map(|start| {
                samples[start..start + self.frame_size]
                    .iter()
                    .map(|s| s * s)
                    .sum()
            })
            .collect();

        energies
            .windows(2)
            .map(|w| (w[1] - w[0]).max(0.0))
            .collect()
    }
}

impl TempoEstimator for EnergyTempoEstimator {
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Option<f64> {
        if sample_rate == 0 || self.hop_size == 0 || samples.len() < self.frame_size * 4 {
            return None;
        }

        let onsets = self.onset_envelope(samples);
        if onsets.iter().all(|&o| o <= f32::EPSILON) {
            return None;
        }

        let hop_secs = self.hop_size as f64 / sample_rate as f64;
        let min_lag = ((60.0 / (self.max_bpm * hop_secs)).floor() as usize).max(1);
        let max_lag = ((60.0 / (self.min_bpm * hop_secs)).ceil() as usize).min(onsets.len() - 1);
        if min_lag >= max_lag {
            return None;
        }

        let correlation = |lag: usize| -> f64 {
            let n = onsets.len() - lag;
            let sum: f64 = (0..n)
                .map(|i| onsets[i] as f64 * onsets[i + lag] as f64)
                .sum();
            sum / n as f64
        };

        let scores: Vec<f64> = (min_lag..=max_lag).map(correlation).collect();
        let (best_idx, &best) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        if best <= 0.0 {
            return None;
        }

        // Parabolic refinement around the peak
        let mut lag = (min_lag + best_idx) as f64;
        if best_idx > 0 && best_idx + 1 < scores.len() {
            let (l, c, r) = (scores[best_idx - 1], best, scores[best_idx + 1]);
            let denom = l - 2.0 * c + r;
            if denom.abs() > f64::EPSILON {
                lag += (0.5 * (l - r) / denom).clamp(-0.5, 0.5);
            }
        }

        let bpm = 60.0 / (lag * hop_secs);
        Some((bpm * 10.0).round() / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks(bpm: f64, seconds: f64, sample_rate: u32) -> Vec<f32> {
        let total = (seconds * sample_rate as f64) as usize;
        let period = (60.0 / bpm * sample_rate as f64) as usize;
        (0..total)
            .map(|i| if i % period < 100 { 0.9 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_detects_click_tempo() {
        let estimator = EnergyTempoEstimator::default();
        let bpm = estimator.estimate(&clicks(128.0, 10.0, 22050), 22050).unwrap();
        assert!((bpm - 128.0).abs() < 2.5, "estimated {}", bpm);

        let bpm = estimator.estimate(&clicks(90.0, 10.0, 22050), 22050).unwrap();
        assert!((bpm - 90.0).abs() < 2.5, "estimated {}", bpm);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let estimator = EnergyTempoEstimator::default();
        assert_eq!(estimator.estimate(&vec![0.0; 44100], 22050), None);
        assert_eq!(estimator.estimate(&[0.5; 100], 22050), None);
        assert_eq!(estimator.estimate(&clicks(120.0, 2.0, 22050), 0), None);
    }
}
