use std::f32::consts::PI;

use super::canvas::Canvas;
use crate::audio::sampler::TimeSeriesSampler;
use crate::scene::{combined, Layer, Rgb, Scene, Source, Trigger};

const OUTER_OUTLINE: f32 = 10.0;
const INNER_OUTLINE: f32 = 4.0;
const MARKER_WIDTH: f32 = 20.0;

/// Draws a [`Scene`] frame by frame.
///
/// Holds the only state that carries across frames: the fill color each
/// outer circle last switched to.
pub struct SceneRenderer {
    scene: Scene,
    circle_colors: Vec<Option<Rgb>>,
}

impl SceneRenderer {
    pub fn new(scene: Scene) -> Self {
        let circle_colors = scene
            .layers
            .iter()
            .map(|layer| match layer {
                Layer::OuterCircle { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        Self {
            scene,
            circle_colors,
        }
    }

    /// Renders the frame at `time_s` over a black background. Frames must
    /// be drawn in order for color triggers to carry over.
    pub fn draw(&mut self, canvas: &mut Canvas, samplers: &[TimeSeriesSampler], time_s: f64) {
        canvas.clear(Rgb::BLACK);
        let (w, h) = (canvas.width() as f32, canvas.height() as f32);

        for (layer, circle_color) in self.scene.layers.iter().zip(self.circle_colors.iter_mut()) {
            match layer {
                Layer::Background { color, sources } => {
                    canvas.fill(*color, combined(sources, samplers, time_s));
                }
                Layer::RiserBars { color, bar_width, sources } => {
                    let value = combined(sources, samplers, time_s);
                    let bw = *bar_width as f32;
                    for i in (0..bar_count(w, bw)).step_by(2) {
                        canvas.fill_rect(i as f32 * bw, h - value * h, bw, value * h, *color, 1.0);
                    }
                }
                Layer::FallerBars { color, bar_width, sources } => {
                    let value = combined(sources, samplers, time_s);
                    let bw = *bar_width as f32;
                    for i in (1..bar_count(w, bw)).step_by(2) {
                        canvas.fill_rect(i as f32 * bw, 0.0, bw, value * h, *color, 1.0);
                    }
                }
                Layer::OuterCircle { color, bpm, triggers, sources } => {
                    let fill = circle_color.get_or_insert(*color);
                    if let Some(next) = fired_trigger(triggers, samplers, time_s) {
                        *fill = next;
                    }
                    let value = combined(sources, samplers, time_s);
                    draw_outer_circle(canvas, *fill, value, bpm.map(|bpm| marker_angle(time_s, bpm)));
                }
                Layer::InnerCircle { color, sources } => {
                    let radius = w / 6.0 * combined(sources, samplers, time_s);
                    let (cx, cy) = (w / 2.0, h / 2.0);
                    canvas.fill_circle(cx, cy, radius, *color);
                    canvas.stroke_circle(cx, cy, radius, INNER_OUTLINE, Rgb::WHITE);
                }
                Layer::BarChart { color, sources } => {
                    if sources.is_empty() {
                        continue;
                    }
                    let bw = (w / sources.len() as f32).floor();
                    for (i, source) in sources.iter().enumerate() {
                        let value = source.value(samplers, time_s);
                        canvas.fill_rect(bw * i as f32, h - value * h, bw, value * h, *color, 1.0);
                    }
                }
                Layer::SpectrumBars { color, bins, source } => {
                    draw_spectrum(canvas, *color, *bins, source, samplers, time_s);
                }
            }
        }
    }
}

fn bar_count(width: f32, bar_width: f32) -> usize {
    (width / bar_width).ceil() as usize
}

/// First trigger with any audible source, in declaration order.
fn fired_trigger(triggers: &[Trigger], samplers: &[TimeSeriesSampler], time_s: f64) -> Option<Rgb> {
    triggers
        .iter()
        .find(|t| combined(&t.sources, samplers, time_s) > 0.0)
        .map(|t| t.color)
}

/// Rotation of the outer circle markers: one turn every 8 beats.
fn marker_angle(time_s: f64, bpm: f64) -> f32 {
    ((time_s / 60.0 * bpm / 8.0).rem_euclid(1.0) * 2.0 * std::f64::consts::PI) as f32
}

fn draw_outer_circle(canvas: &mut Canvas, color: Rgb, value: f32, angle: Option<f32>) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let min_radius = w / 6.0;
    let max_radius = h / 2.0;
    let radius = (max_radius - min_radius) * value + min_radius;
    let (cx, cy) = (w / 2.0, h / 2.0);

    canvas.fill_circle(cx, cy, radius, color);
    canvas.stroke_circle(cx, cy, radius, OUTER_OUTLINE, Rgb::WHITE);

    if let Some(angle) = angle {
        let start = angle - PI / 2.0 - PI / 16.0;
        let span = PI / 8.0;
        canvas.stroke_arc(cx, cy, radius, start, start + span, MARKER_WIDTH, Rgb::BLACK);
        canvas.stroke_arc(cx, cy, radius, PI + start, PI + start + span, MARKER_WIDTH, Rgb::BLACK);
    }
}

/// Groups the spectrum into `bars` columns rising from the bottom.
fn draw_spectrum(
    canvas: &mut Canvas,
    color: Rgb,
    bars: usize,
    source: &Source,
    samplers: &[TimeSeriesSampler],
    time_s: f64,
) {
    let Some(sampler) = samplers.get(source.stem) else {
        return;
    };
    let spectrum = sampler.spectrum_at(time_s);
    if spectrum.is_empty() {
        return;
    }
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let bars = bars.min(spectrum.len());
    let group = spectrum.len() / bars;
    let bw = w / bars as f32;

    for (i, chunk) in spectrum.chunks(group).take(bars).enumerate() {
        let mean = chunk.iter().sum::<f32>() / chunk.len() as f32;
        let value = (mean * source.gain).clamp(0.0, 1.0);
        canvas.fill_rect(bw * i as f32, h - value * h, bw, value * h, color, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureSet;
    use crate::scene::Series;

    const PINK: Rgb = Rgb { r: 0xef, g: 0x4f, b: 0x91 };
    const RED: Rgb = Rgb { r: 0xe8, g: 0, b: 0 };
    const PURPLE: Rgb = Rgb { r: 0x4d, g: 0x1b, b: 0x7b };

    fn sampler(values: &[f32]) -> TimeSeriesSampler {
        let spectrum = values.iter().map(|&v| vec![v; 8]).collect();
        TimeSeriesSampler::new(FeatureSet::new(10, values.to_vec(), values.to_vec(), spectrum).unwrap())
    }

    fn source(stem: usize) -> Source {
        Source { stem, gain: 1.0, series: Series::Loudness }
    }

    fn rgb(px: [u8; 4]) -> Rgb {
        Rgb { r: px[0], g: px[1], b: px[2] }
    }

    #[test]
    fn silent_background_stays_black() {
        let scene = Scene {
            layers: vec![Layer::Background { color: Rgb::WHITE, sources: vec![source(0)] }],
        };
        let mut canvas = Canvas::new(16, 9);
        SceneRenderer::new(scene).draw(&mut canvas, &[sampler(&[0.0])], 0.0);
        assert!(canvas.pixels().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn riser_and_faller_bars_alternate_columns() {
        let scene = Scene {
            layers: vec![
                Layer::RiserBars { color: PINK, bar_width: 4, sources: vec![source(0)] },
                Layer::FallerBars { color: PURPLE, bar_width: 4, sources: vec![source(0)] },
            ],
        };
        let mut canvas = Canvas::new(16, 10);
        SceneRenderer::new(scene).draw(&mut canvas, &[sampler(&[0.5])], 0.0);
        // Risers fill the bottom half of even columns.
        assert_eq!(rgb(canvas.pixel(1, 9)), PINK);
        assert_eq!(rgb(canvas.pixel(1, 2)), Rgb::BLACK);
        // Fallers fill the top half of odd columns.
        assert_eq!(rgb(canvas.pixel(5, 2)), PURPLE);
        assert_eq!(rgb(canvas.pixel(5, 9)), Rgb::BLACK);
    }

    #[test]
    fn outer_circle_color_persists_after_trigger() {
        let scene = Scene {
            layers: vec![Layer::OuterCircle {
                color: PURPLE,
                bpm: None,
                triggers: vec![Trigger { color: RED, sources: vec![source(1)] }],
                sources: vec![source(0)],
            }],
        };
        // Stem 1 only sounds during frame 1.
        let samplers = [sampler(&[1.0, 1.0, 1.0]), sampler(&[0.0, 1.0, 0.0])];
        let mut renderer = SceneRenderer::new(scene);
        let mut canvas = Canvas::new(60, 40);

        renderer.draw(&mut canvas, &samplers, 0.0);
        assert_eq!(rgb(canvas.pixel(30, 20)), PURPLE);
        renderer.draw(&mut canvas, &samplers, 0.1);
        assert_eq!(rgb(canvas.pixel(30, 20)), RED);
        renderer.draw(&mut canvas, &samplers, 0.2);
        assert_eq!(rgb(canvas.pixel(30, 20)), RED);
    }

    #[test]
    fn inner_circle_radius_tracks_loudness() {
        let scene = Scene {
            layers: vec![Layer::InnerCircle { color: PINK, sources: vec![source(0)] }],
        };
        let mut renderer = SceneRenderer::new(scene);
        let mut canvas = Canvas::new(120, 60);
        let samplers = [sampler(&[1.0, 0.0])];

        renderer.draw(&mut canvas, &samplers, 0.0);
        assert_eq!(rgb(canvas.pixel(60, 30)), PINK);
        renderer.draw(&mut canvas, &samplers, 0.1);
        assert!(canvas.pixels().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn bar_chart_draws_one_bar_per_source() {
        let scene = Scene::bar_chart(2);
        let mut canvas = Canvas::new(20, 10);
        SceneRenderer::new(scene).draw(&mut canvas, &[sampler(&[1.0]), sampler(&[0.0])], 0.0);
        assert_ne!(rgb(canvas.pixel(5, 0)), Rgb::BLACK);
        assert_eq!(rgb(canvas.pixel(15, 9)), Rgb::BLACK);
    }

    #[test]
    fn spectrum_bars_follow_bins() {
        let scene = Scene {
            layers: vec![Layer::SpectrumBars { color: PINK, bins: 4, source: source(0) }],
        };
        let mut canvas = Canvas::new(16, 10);
        SceneRenderer::new(scene).draw(&mut canvas, &[sampler(&[1.0])], 0.0);
        assert_eq!(rgb(canvas.pixel(0, 0)), PINK);
        assert_eq!(rgb(canvas.pixel(15, 0)), PINK);
    }

    #[test]
    fn markers_complete_a_turn_every_eight_beats() {
        // 120 bpm: 8 beats take 4 seconds.
        assert!(marker_angle(0.0, 120.0).abs() < 1e-6);
        assert!((marker_angle(1.0, 120.0) - PI / 2.0).abs() < 1e-5);
        assert!(marker_angle(4.0, 120.0).abs() < 1e-5);
    }
}
