/// Interleaved samples per loudness window (2048 per channel).
pub const RMS_WINDOW: usize = 4096;
/// Samples per channel in one spectrum window.
pub const SPECTRUM_WINDOW: usize = 1024;
/// Magnitude bins kept per spectrum frame.
pub const SPECTRUM_BINS: usize = SPECTRUM_WINDOW / 2;
/// Frames in the causal moving average of loudness.
pub const AVG_WINDOW: usize = 6;

/// Per-video-frame features of one stem at one frame rate.
///
/// All three series have one entry per video frame and share a length.
/// Values are normalized to [0, 1] with the loudest entry at exactly 1.0,
/// or all zero for a silent stem.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
    frame_rate: u32,
    loudness: Vec<f32>,
    avg_loudness: Vec<f32>,
    spectrum: Vec<Vec<f32>>,
}

impl FeatureSet {
    pub fn new(
        frame_rate: u32,
        loudness: Vec<f32>,
        avg_loudness: Vec<f32>,
        spectrum: Vec<Vec<f32>>,
    ) -> Result<Self, String> {
        if loudness.len() != avg_loudness.len() || loudness.len() != spectrum.len() {
            return Err(format!(
                "series lengths differ: loudness={}, avg_loudness={}, spectrum={}",
                loudness.len(),
                avg_loudness.len(),
                spectrum.len()
            ));
        }
        Ok(Self {
            frame_rate,
            loudness,
            avg_loudness,
            spectrum,
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn len(&self) -> usize {
        self.loudness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loudness.is_empty()
    }

    pub fn loudness(&self) -> &[f32] {
        &self.loudness
    }

    pub fn avg_loudness(&self) -> &[f32] {
        &self.avg_loudness
    }

    pub fn spectrum(&self) -> &[Vec<f32>] {
        &self.spectrum
    }
}
