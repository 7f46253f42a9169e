use crate::error::{Result, StemvizError};

/// Indexed access to interleaved 16-bit PCM.
///
/// This is the whole surface the feature extractor needs from a decoder:
/// sample indices are flat interleaved positions, and reading past the end
/// yields `None` instead of failing.
pub trait PcmSource {
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    /// Number of interleaved samples (all channels).
    fn len(&self) -> usize;
    fn sample(&self, index: usize) -> Option<i16>;

    /// Duration in seconds, counting one sample per channel per tick.
    fn duration_s(&self) -> f64 {
        let channels = self.channels().max(1) as f64;
        if self.sample_rate() == 0 {
            return 0.0;
        }
        self.len() as f64 / channels / self.sample_rate() as f64
    }
}

/// One decoded stem held in memory.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    name: String,
    samples: Vec<i16>,
    channels: u16,
    sample_rate: u32,
}

impl AudioTrack {
    /// Wraps decoded samples. Only the sample rate is checked here; the
    /// stereo requirement belongs to the extractor so that it can report
    /// the channel count it actually saw.
    pub fn new(name: impl Into<String>, samples: Vec<i16>, channels: u16, sample_rate: u32) -> Result<Self> {
        let name = name.into();
        if sample_rate == 0 {
            return Err(StemvizError::InvalidFormat {
                track: name,
                reason: "sample rate is zero".into(),
            });
        }
        Ok(Self {
            name,
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PcmSource for AudioTrack {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn sample(&self, index: usize) -> Option<i16> {
        self.samples.get(index).copied()
    }
}
