use super::features::{FeatureSet, SPECTRUM_BINS};

/// Slack added before flooring so `k as f64 / fps` maps back to frame `k`.
const FRAME_EPSILON: f64 = 1e-9;

/// Point-in-time queries over one stem's per-frame features.
///
/// Times outside the analyzed range (negative, past the end, NaN) read as
/// silence: 0.0 for scalars and a zeroed spectrum. Videos routinely run
/// longer than individual stems.
#[derive(Clone, Debug)]
pub struct TimeSeriesSampler {
    features: FeatureSet,
    silence: Vec<f32>,
}

impl TimeSeriesSampler {
    pub fn new(features: FeatureSet) -> Self {
        let bins = features
            .spectrum()
            .first()
            .map_or(SPECTRUM_BINS, |frame| frame.len());
        Self {
            features,
            silence: vec![0.0; bins],
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.features.frame_rate()
    }

    pub fn frame_count(&self) -> usize {
        self.features.len()
    }

    pub fn duration_s(&self) -> f64 {
        if self.frame_rate() == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.frame_rate() as f64
    }

    pub fn spectrum_bins(&self) -> usize {
        self.silence.len()
    }

    pub fn loudness_at(&self, time_s: f64) -> f32 {
        self.index(time_s)
            .and_then(|i| self.features.loudness().get(i).copied())
            .unwrap_or(0.0)
    }

    pub fn avg_loudness_at(&self, time_s: f64) -> f32 {
        self.index(time_s)
            .and_then(|i| self.features.avg_loudness().get(i).copied())
            .unwrap_or(0.0)
    }

    pub fn spectrum_at(&self, time_s: f64) -> &[f32] {
        self.index(time_s)
            .and_then(|i| self.features.spectrum().get(i))
            .map_or(self.silence.as_slice(), |bins| bins.as_slice())
    }

    fn index(&self, time_s: f64) -> Option<usize> {
        let frame = (time_s * self.frame_rate() as f64 + FRAME_EPSILON).floor();
        // NaN fails both comparisons.
        if frame >= 0.0 && frame < self.frame_count() as f64 {
            Some(frame as usize)
        } else {
            None
        }
    }
}
