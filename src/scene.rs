use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::audio::sampler::TimeSeriesSampler;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    /// Parses `#rrggbb`.
    pub fn parse(hex: &str) -> Result<Self> {
        let digits = hex
            .strip_prefix('#')
            .filter(|d| d.len() == 6 && d.chars().all(|c| c.is_ascii_hexdigit()))
            .with_context(|| format!("Invalid color '{}', expected #rrggbb", hex))?;
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid color '{}', expected #rrggbb", hex))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// Which per-frame series a source reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    #[default]
    Loudness,
    AvgLoudness,
}

/// A stem reference as written in the project file: either a bare stem
/// name or a table with gain and series.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceConfig {
    Stem(String),
    Detailed {
        stem: String,
        #[serde(default = "default_gain")]
        gain: f32,
        #[serde(default)]
        series: Series,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Background,
    RiserBars,
    FallerBars,
    OuterCircle,
    InnerCircle,
    BarChart,
    SpectrumBars,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TriggerConfig {
    pub color: String,
    pub sources: Vec<SourceConfig>,
}

/// One `[[layers]]` table. Fields that a kind does not use are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct LayerConfig {
    pub kind: LayerKind,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default = "default_bar_width")]
    pub bar_width: u32,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default = "default_spectrum_bars")]
    pub bins: usize,
}

fn default_gain() -> f32 { 1.0 }
fn default_color() -> String { "#00aacc".into() }
fn default_bar_width() -> u32 { 80 }
fn default_spectrum_bars() -> usize { 64 }

/// A validated stem reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Source {
    pub stem: usize,
    pub gain: f32,
    pub series: Series,
}

impl Source {
    pub fn value(&self, samplers: &[TimeSeriesSampler], time_s: f64) -> f32 {
        let Some(sampler) = samplers.get(self.stem) else {
            return 0.0;
        };
        let raw = match self.series {
            Series::Loudness => sampler.loudness_at(time_s),
            Series::AvgLoudness => sampler.avg_loudness_at(time_s),
        };
        (raw * self.gain).clamp(0.0, 1.0)
    }
}

/// Loudest of `sources` at `time_s`; 0.0 with no sources.
pub fn combined(sources: &[Source], samplers: &[TimeSeriesSampler], time_s: f64) -> f32 {
    sources
        .iter()
        .map(|s| s.value(samplers, time_s))
        .fold(0.0, f32::max)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trigger {
    pub color: Rgb,
    pub sources: Vec<Source>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    Background { color: Rgb, sources: Vec<Source> },
    RiserBars { color: Rgb, bar_width: u32, sources: Vec<Source> },
    FallerBars { color: Rgb, bar_width: u32, sources: Vec<Source> },
    OuterCircle { color: Rgb, bpm: Option<f64>, triggers: Vec<Trigger>, sources: Vec<Source> },
    InnerCircle { color: Rgb, sources: Vec<Source> },
    /// One bar per source, not max-combined.
    BarChart { color: Rgb, sources: Vec<Source> },
    SpectrumBars { color: Rgb, bins: usize, source: Source },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub layers: Vec<Layer>,
}

impl Scene {
    /// Resolves layer tables against the declared stem names. With no
    /// layers configured, every stem gets a bar in a bar chart.
    pub fn from_config(layers: &[LayerConfig], stems: &[String]) -> Result<Self> {
        if layers.is_empty() {
            log::info!("No layers configured, using a bar chart of all {} stems", stems.len());
            return Ok(Self::bar_chart(stems.len()));
        }

        let layers = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                resolve_layer(layer, stems).with_context(|| format!("Layer {} ({:?})", i, layer.kind))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn bar_chart(stem_count: usize) -> Self {
        let sources = (0..stem_count)
            .map(|stem| Source {
                stem,
                gain: 1.0,
                series: Series::Loudness,
            })
            .collect();
        Self {
            layers: vec![Layer::BarChart {
                color: Rgb { r: 0x00, g: 0xaa, b: 0xcc },
                sources,
            }],
        }
    }
}

fn resolve_sources(sources: &[SourceConfig], stems: &[String]) -> Result<Vec<Source>> {
    sources
        .iter()
        .map(|source| {
            let (name, gain, series) = match source {
                SourceConfig::Stem(name) => (name, 1.0, Series::Loudness),
                SourceConfig::Detailed { stem, gain, series } => (stem, *gain, *series),
            };
            let stem = stems
                .iter()
                .position(|s| s == name)
                .with_context(|| format!("Unknown stem '{}'", name))?;
            if !gain.is_finite() || gain < 0.0 {
                bail!("Gain for '{}' must be a non-negative number, got {}", name, gain);
            }
            Ok(Source { stem, gain, series })
        })
        .collect()
}

fn resolve_layer(layer: &LayerConfig, stems: &[String]) -> Result<Layer> {
    let color = Rgb::parse(&layer.color)?;
    let sources = resolve_sources(&layer.sources, stems)?;
    if sources.is_empty() {
        bail!("Layer needs at least one source");
    }

    Ok(match layer.kind {
        LayerKind::Background => Layer::Background { color, sources },
        LayerKind::RiserBars | LayerKind::FallerBars => {
            if layer.bar_width == 0 {
                bail!("bar_width must be positive");
            }
            if layer.kind == LayerKind::RiserBars {
                Layer::RiserBars { color, bar_width: layer.bar_width, sources }
            } else {
                Layer::FallerBars { color, bar_width: layer.bar_width, sources }
            }
        }
        LayerKind::OuterCircle => {
            let triggers = layer
                .triggers
                .iter()
                .map(|t| {
                    Ok(Trigger {
                        color: Rgb::parse(&t.color)?,
                        sources: resolve_sources(&t.sources, stems)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(bpm) = layer.bpm {
                if !(bpm.is_finite() && bpm > 0.0) {
                    bail!("bpm must be positive, got {}", bpm);
                }
            }
            Layer::OuterCircle { color, bpm: layer.bpm, triggers, sources }
        }
        LayerKind::InnerCircle => Layer::InnerCircle { color, sources },
        LayerKind::BarChart => Layer::BarChart { color, sources },
        LayerKind::SpectrumBars => {
            if layer.bins == 0 {
                bail!("bins must be positive");
            }
            if sources.len() > 1 {
                log::warn!("spectrum_bars uses only its first source");
            }
            Layer::SpectrumBars { color, bins: layer.bins, source: sources[0] }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureSet;

    fn stems() -> Vec<String> {
        vec!["verse_kick".into(), "drop_kick".into(), "rev_snap".into()]
    }

    fn layers(toml_src: &str) -> Vec<LayerConfig> {
        #[derive(Deserialize)]
        struct Wrapper {
            layers: Vec<LayerConfig>,
        }
        toml::from_str::<Wrapper>(toml_src).unwrap().layers
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Rgb::parse("#ef4f91").unwrap(), Rgb { r: 0xef, g: 0x4f, b: 0x91 });
        assert!(Rgb::parse("ef4f91").is_err());
        assert!(Rgb::parse("#ef4f9").is_err());
        assert!(Rgb::parse("#gg0000").is_err());
        assert!(Rgb::parse("#+f+f+f").is_err());
    }

    #[test]
    fn resolves_sources_and_triggers() {
        let configs = layers(
            r##"
            [[layers]]
            kind = "outer_circle"
            color = "#4d1b7b"
            bpm = 140
            sources = ["verse_kick", "drop_kick"]
            triggers = [
                { color = "#e80000", sources = ["drop_kick"] },
                { color = "#4d1b7b", sources = ["verse_kick"] },
            ]

            [[layers]]
            kind = "inner_circle"
            color = "#ef4f91"
            sources = [{ stem = "rev_snap", gain = 0.5 }, "verse_kick"]
            "##,
        );
        let scene = Scene::from_config(&configs, &stems()).unwrap();
        assert_eq!(scene.layers.len(), 2);
        match &scene.layers[0] {
            Layer::OuterCircle { bpm, triggers, sources, .. } => {
                assert_eq!(*bpm, Some(140.0));
                assert_eq!(triggers.len(), 2);
                assert_eq!(triggers[0].sources[0].stem, 1);
                assert_eq!(sources.len(), 2);
            }
            other => panic!("unexpected layer {:?}", other),
        }
        match &scene.layers[1] {
            Layer::InnerCircle { sources, .. } => {
                assert_eq!(sources[0], Source { stem: 2, gain: 0.5, series: Series::Loudness });
            }
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn unknown_stem_is_rejected() {
        let configs = layers(
            r##"
            [[layers]]
            kind = "background"
            color = "#363b74"
            sources = ["airy_chords"]
            "##,
        );
        let err = Scene::from_config(&configs, &stems()).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown stem 'airy_chords'"));
    }

    #[test]
    fn empty_layers_default_to_bar_chart() {
        let scene = Scene::from_config(&[], &stems()).unwrap();
        match &scene.layers[..] {
            [Layer::BarChart { sources, .. }] => assert_eq!(sources.len(), 3),
            other => panic!("unexpected layers {:?}", other),
        }
    }

    #[test]
    fn combined_takes_loudest_scaled_source() {
        let sampler = |v: f32| {
            TimeSeriesSampler::new(FeatureSet::new(10, vec![v], vec![v / 2.0], vec![vec![0.0]]).unwrap())
        };
        let samplers = vec![sampler(0.4), sampler(1.0)];
        let sources = [
            Source { stem: 0, gain: 1.0, series: Series::Loudness },
            Source { stem: 1, gain: 0.3, series: Series::Loudness },
        ];
        assert_eq!(combined(&sources, &samplers, 0.0), 0.4);
        let avg = Source { stem: 1, gain: 1.0, series: Series::AvgLoudness };
        assert_eq!(avg.value(&samplers, 0.0), 0.5);
        assert_eq!(combined(&sources, &samplers, 5.0), 0.0);
        assert_eq!(combined(&[], &samplers, 0.0), 0.0);
    }
}
