use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::features::{FeatureSet, AVG_WINDOW, RMS_WINDOW, SPECTRUM_BINS, SPECTRUM_WINDOW};
use super::track::{AudioTrack, PcmSource};
use crate::error::{Result, StemvizError};

/// 16-bit samples are scaled into [-1, 1] by this divisor.
const SAMPLE_SCALE: f32 = 32768.0;

/// Turns a decoded stem into a [`FeatureSet`].
///
/// The cache calls extraction through this trait so the analysis can be
/// swapped or counted without touching cache logic.
pub trait FeatureExtractor: Sync {
    fn extract(&self, track: &AudioTrack, frame_rate: u32) -> Result<FeatureSet>;
}

/// Fixed-window RMS, moving average and FFT magnitude extraction.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowedExtractor;

impl FeatureExtractor for WindowedExtractor {
    fn extract(&self, track: &AudioTrack, frame_rate: u32) -> Result<FeatureSet> {
        extract(track, track.name(), frame_rate)
    }
}

/// Outcome of normalizing a series against its own peak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Normalization {
    Scaled,
    /// Peak was zero; every value was left at 0.0.
    Silent,
}

pub fn extract<S: PcmSource + Sync>(source: &S, track: &str, frame_rate: u32) -> Result<FeatureSet> {
    if source.channels() != 2 {
        return Err(StemvizError::InvalidFormat {
            track: track.to_string(),
            reason: format!("expected 2 channels, found {}", source.channels()),
        });
    }
    if frame_rate == 0 {
        return Err(StemvizError::InvalidFormat {
            track: track.to_string(),
            reason: "frame rate must be positive".into(),
        });
    }
    if source.sample_rate() == 0 {
        return Err(StemvizError::InvalidFormat {
            track: track.to_string(),
            reason: "sample rate is zero".into(),
        });
    }

    let total_frames = total_frames(source.len(), source.sample_rate(), frame_rate);
    log::debug!(
        "{}: {:.2}s @ {}Hz, {} frames @ {}fps",
        track,
        source.duration_s(),
        source.sample_rate(),
        total_frames,
        frame_rate
    );

    let mut loudness = rms_series(source, frame_rate, total_frames);
    if normalize(&mut loudness) == Normalization::Silent {
        log::warn!("{}: track is silent, loudness left at zero", track);
    }

    let mut avg_loudness = moving_average(&loudness, AVG_WINDOW);
    normalize(&mut avg_loudness);

    let mut spectrum = spectrum_series(source, frame_rate, total_frames);
    if normalize_spectrum(&mut spectrum) == Normalization::Silent {
        log::warn!("{}: spectrum is silent, bins left at zero", track);
    }

    FeatureSet::new(frame_rate, loudness, avg_loudness, spectrum).map_err(|reason| {
        StemvizError::InvalidFormat {
            track: track.to_string(),
            reason,
        }
    })
}

/// `ceil(duration_s * frame_rate)` for a stereo buffer, in integer math so
/// whole-second tracks never pick up a spurious extra frame.
fn total_frames(interleaved_len: usize, sample_rate: u32, frame_rate: u32) -> usize {
    let numerator = interleaved_len as u64 * frame_rate as u64;
    let denominator = 2 * sample_rate as u64;
    numerator.div_ceil(denominator) as usize
}

/// First interleaved sample of a window centered on `frame`'s timestamp.
fn window_start(frame: usize, frame_rate: u32, sample_rate: u32, half_window: usize) -> usize {
    let time = frame as f64 / frame_rate as f64;
    let start = (2.0 * time * sample_rate as f64 - half_window as f64).floor();
    if start <= 0.0 {
        0
    } else {
        start as usize
    }
}

fn rms_series<S: PcmSource + Sync>(source: &S, frame_rate: u32, total_frames: usize) -> Vec<f32> {
    let sample_rate = source.sample_rate();
    (0..total_frames)
        .into_par_iter()
        .map(|frame| {
            let start = window_start(frame, frame_rate, sample_rate, RMS_WINDOW / 2);
            rms_window(source, start)
        })
        .collect()
}

/// RMS of `RMS_WINDOW` interleaved samples. A window that runs off the end
/// of the track is 0.0 as a whole; partial windows are never averaged.
fn rms_window<S: PcmSource>(source: &S, start: usize) -> f32 {
    let mut sum_squares = 0.0f64;
    for index in start..start + RMS_WINDOW {
        let Some(raw) = source.sample(index) else {
            return 0.0;
        };
        let sample = raw as f64 / SAMPLE_SCALE as f64;
        sum_squares += sample * sample;
    }
    (sum_squares / RMS_WINDOW as f64).sqrt() as f32
}

/// Causal mean over the last `window` values; shorter at the start.
fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

fn spectrum_series<S: PcmSource + Sync>(source: &S, frame_rate: u32, total_frames: usize) -> Vec<Vec<f32>> {
    let sample_rate = source.sample_rate();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(SPECTRUM_WINDOW);

    (0..total_frames)
        .into_par_iter()
        .map(|frame| {
            // Align to a left-channel sample so pairs downmix as (L, R).
            let start = window_start(frame, frame_rate, sample_rate, SPECTRUM_WINDOW) & !1;
            spectrum_window(source, start, fft.as_ref())
        })
        .collect()
}

/// Magnitudes of the first half of the DFT of one downmixed window. A
/// window that runs off the end of the track yields all-zero bins.
fn spectrum_window<S: PcmSource>(source: &S, start: usize, fft: &dyn Fft<f32>) -> Vec<f32> {
    let mut buffer: Vec<Complex<f32>> = Vec::with_capacity(SPECTRUM_WINDOW);
    for i in 0..SPECTRUM_WINDOW {
        let (Some(left), Some(right)) = (source.sample(start + 2 * i), source.sample(start + 2 * i + 1)) else {
            return vec![0.0; SPECTRUM_BINS];
        };
        let mono = (left as f32 / SAMPLE_SCALE + right as f32 / SAMPLE_SCALE) / 2.0;
        buffer.push(Complex::new(mono, 0.0));
    }
    fft.process(&mut buffer);
    buffer[..SPECTRUM_BINS].iter().map(|c| c.norm()).collect()
}

/// Scales `values` so the peak is exactly 1.0.
pub fn normalize(values: &mut [f32]) -> Normalization {
    let peak = values.iter().copied().fold(0.0f32, f32::max);
    if !(peak > 0.0 && peak.is_finite()) {
        values.iter_mut().for_each(|v| *v = 0.0);
        return Normalization::Silent;
    }
    values.iter_mut().for_each(|v| *v /= peak);
    Normalization::Scaled
}

/// Scales every bin of every frame by the single loudest bin in the track.
fn normalize_spectrum(frames: &mut [Vec<f32>]) -> Normalization {
    let peak = frames
        .iter()
        .flat_map(|bins| bins.iter().copied())
        .fold(0.0f32, f32::max);
    if !(peak > 0.0 && peak.is_finite()) {
        frames.iter_mut().flatten().for_each(|v| *v = 0.0);
        return Normalization::Silent;
    }
    frames.iter_mut().flatten().for_each(|v| *v /= peak);
    Normalization::Scaled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_sine(seconds: f64, sample_rate: u32, freq: f64, amplitude: f64) -> AudioTrack {
        let frames = (seconds * sample_rate as f64).round() as usize;
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f64 / sample_rate as f64;
            let v = (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin() * 32767.0) as i16;
            samples.push(v);
            samples.push(v);
        }
        AudioTrack::new("sine", samples, 2, sample_rate).unwrap()
    }

    fn peak(values: &[f32]) -> f32 {
        values.iter().copied().fold(0.0, f32::max)
    }

    #[test]
    fn full_scale_sine_has_flat_envelope() {
        let track = stereo_sine(10.0, 44_100, 440.0, 1.0);
        let raw = rms_window(&track, 44_100);
        assert!((raw - 0.707).abs() < 0.01, "raw rms {}", raw);

        let features = WindowedExtractor.extract(&track, 30).unwrap();
        assert_eq!(features.len(), 300);
        assert_eq!(features.avg_loudness().len(), 300);
        assert_eq!(features.spectrum().len(), 300);
        assert_eq!(peak(features.loudness()), 1.0);
        assert_eq!(peak(features.avg_loudness()), 1.0);
        for &v in features.loudness() {
            assert!(v > 0.99, "loudness {}", v);
        }
    }

    #[test]
    fn frame_count_rounds_up() {
        assert_eq!(total_frames(882_000, 44_100, 30), 300);
        assert_eq!(total_frames(882_002, 44_100, 30), 301);
        assert_eq!(total_frames(0, 44_100, 30), 0);
    }

    #[test]
    fn silent_track_stays_zero() {
        let track = AudioTrack::new("silence", vec![0; 44_100 * 2], 2, 44_100).unwrap();
        let features = extract(&track, "silence", 30).unwrap();
        assert_eq!(features.len(), 30);
        assert!(features.loudness().iter().all(|&v| v == 0.0));
        assert!(features.avg_loudness().iter().all(|&v| v == 0.0));
        assert!(features.spectrum().iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn window_past_end_zeroes_final_frame() {
        // 1.01s -> 31 frames; frame 30 is centered at 1.0s and its window
        // runs past the last sample.
        let track = stereo_sine(1.01, 44_100, 440.0, 0.5);
        let features = extract(&track, "tail", 30).unwrap();
        assert_eq!(features.len(), 31);
        assert_eq!(features.loudness()[30], 0.0);
        assert!(features.spectrum()[30].iter().all(|&v| v == 0.0));
        assert_eq!(features.spectrum()[30].len(), SPECTRUM_BINS);
        assert!(features.loudness()[29] > 0.9);
    }

    #[test]
    fn mono_track_is_invalid_format() {
        let track = AudioTrack::new("vox", vec![0; 1000], 1, 44_100).unwrap();
        let err = extract(&track, "vox", 30).unwrap_err();
        match err {
            StemvizError::InvalidFormat { track, reason } => {
                assert_eq!(track, "vox");
                assert!(reason.contains("found 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let track = stereo_sine(0.1, 44_100, 440.0, 0.5);
        assert!(extract(&track, "t", 0).is_err());
    }

    #[test]
    fn moving_average_shrinks_at_start() {
        let avg = moving_average(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 6);
        assert_eq!(avg[0], 1.0);
        assert_eq!(avg[1], 0.5);
        assert!((avg[5] - 1.0 / 6.0).abs() < 1e-6);
        assert_eq!(avg[6], 0.0);
    }

    #[test]
    fn average_is_renormalized_independently() {
        // A single loud frame among quiet ones: the averaged peak is well
        // below 1.0 before its own normalization pass.
        let mut samples = vec![0i16; 44_100 * 2];
        for s in samples.iter_mut().skip(44_100).take(4096) {
            *s = 16_000;
        }
        let track = AudioTrack::new("hit", samples, 2, 44_100).unwrap();
        let features = extract(&track, "hit", 30).unwrap();
        assert_eq!(peak(features.loudness()), 1.0);
        assert_eq!(peak(features.avg_loudness()), 1.0);
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        // 32 cycles per 1024-sample window.
        let freq = 32.0 * 44_100.0 / SPECTRUM_WINDOW as f64;
        let track = stereo_sine(1.0, 44_100, freq, 0.8);
        let features = extract(&track, "tone", 30).unwrap();
        let bins = &features.spectrum()[15];
        let loudest = bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 32);
        assert_eq!(peak(&features.spectrum().concat()), 1.0);
    }

    #[test]
    fn spectrum_is_scaled_by_track_peak() {
        // Bin-centered tone, loud for the first half second then at a quarter
        // of that amplitude.
        let freq = 32.0 * 44_100.0 / SPECTRUM_WINDOW as f64;
        let mut samples = Vec::with_capacity(44_100 * 2);
        for i in 0..44_100 {
            let amplitude = if i < 22_050 { 0.8 } else { 0.2 };
            let t = i as f64 / 44_100.0;
            let v = (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin() * 32767.0) as i16;
            samples.push(v);
            samples.push(v);
        }
        let track = AudioTrack::new("fade", samples, 2, 44_100).unwrap();
        let features = extract(&track, "fade", 30).unwrap();

        assert_eq!(peak(&features.spectrum().concat()), 1.0);
        let loud = peak(&features.spectrum()[7]);
        let quiet = peak(&features.spectrum()[22]);
        assert!((loud - 1.0).abs() < 0.01, "loud frame peak {}", loud);
        assert!((quiet - 0.25).abs() < 0.01, "quiet frame peak {}", quiet);
    }

    #[test]
    fn window_start_clamps_at_zero() {
        assert_eq!(window_start(0, 30, 44_100, 2048), 0);
        assert_eq!(window_start(30, 30, 44_100, 2048), 88_200 - 2048);
    }

    #[test]
    fn normalize_reports_silence() {
        let mut values = vec![0.0, 0.0];
        assert_eq!(normalize(&mut values), Normalization::Silent);
        let mut values = vec![0.5, 0.25];
        assert_eq!(normalize(&mut values), Normalization::Scaled);
        assert_eq!(values, vec![1.0, 0.5]);
    }
}
