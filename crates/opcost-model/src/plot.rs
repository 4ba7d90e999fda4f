//! SVG scatter plot of the training examples in projected space.
//!
//! Points are colored by cluster and centroids are drawn as crosses in the
//! matching color. Only the first two projected dimensions are drawn; a
//! one-component projection is plotted on a flat line.

use askama::Template;

use crate::error::{ModelError, ModelErrorKind};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 24.0;
const CROSS: f64 = 5.0;

/// Ten-color qualitative palette, reused cyclically for cluster ids.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
    "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

#[derive(Template)]
#[template(path = "clusters.svg", escape = "none")]
struct ClustersSvg {
    width: f64,
    height: f64,
    title: String,
    points: Vec<PlotPoint>,
    centroids: Vec<PlotCentroid>,
}

struct PlotPoint {
    x: f64,
    y: f64,
    color: &'static str,
}

struct PlotCentroid {
    path: String,
    color: &'static str,
}

/// Maps data coordinates onto the drawable area, y growing upward.
struct Viewport {
    min: (f64, f64),
    scale: (f64, f64),
}

impl Viewport {
    fn fit(coords: impl Iterator<Item = (f64, f64)> + Clone) -> Self {
        let bounds = |pick: fn(&(f64, f64)) -> f64| {
            coords
                .clone()
                .map(|c| pick(&c))
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                })
        };
        let (x_lo, x_hi) = bounds(|c| c.0);
        let (y_lo, y_hi) = bounds(|c| c.1);
        let span = |lo: f64, hi: f64| {
            let span = hi - lo;
            if span.is_finite() && span > 0.0 { span } else { 1.0 }
        };
        let origin = |lo: f64| if lo.is_finite() { lo } else { 0.0 };
        Self {
            min: (origin(x_lo), origin(y_lo)),
            scale: (
                (WIDTH - 2.0 * MARGIN) / span(x_lo, x_hi),
                (HEIGHT - 2.0 * MARGIN) / span(y_lo, y_hi),
            ),
        }
    }

    fn place(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let px = MARGIN + (x - self.min.0) * self.scale.0;
        let py = HEIGHT - MARGIN - (y - self.min.1) * self.scale.1;
        (round_tenth(px), round_tenth(py))
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn plane(coords: &[f64]) -> (f64, f64) {
    (
        coords.first().copied().unwrap_or(0.0),
        coords.get(1).copied().unwrap_or(0.0),
    )
}

fn color(cluster: usize) -> &'static str {
    PALETTE[cluster % PALETTE.len()]
}

/// Renders the scatter plot as an SVG document.
///
/// `labels[i]` is the cluster of `projected[i]`.
pub(crate) fn render(
    projected: &[Vec<f64>],
    labels: &[usize],
    centroids: &[Vec<f64>],
) -> Result<String, ModelError> {
    let coords = projected
        .iter()
        .chain(centroids)
        .map(|c| plane(c));
    let viewport = Viewport::fit(coords);

    let points = projected
        .iter()
        .zip(labels)
        .map(|(p, &label)| {
            let (x, y) = viewport.place(plane(p));
            PlotPoint {
                x,
                y,
                color: color(label),
            }
        })
        .collect();
    let centroids: Vec<PlotCentroid> = centroids
        .iter()
        .enumerate()
        .map(|(id, c)| {
            let (x, y) = viewport.place(plane(c));
            PlotCentroid {
                path: format!(
                    "M{} {}L{} {}M{} {}L{} {}",
                    x - CROSS,
                    y - CROSS,
                    x + CROSS,
                    y + CROSS,
                    x - CROSS,
                    y + CROSS,
                    x + CROSS,
                    y - CROSS
                ),
                color: color(id),
            }
        })
        .collect();

    let template = ClustersSvg {
        width: WIDTH,
        height: HEIGHT,
        title: format!(
            "{} training blocks in {} clusters",
            projected.len(),
            centroids.len()
        ),
        points,
        centroids,
    };
    template
        .render()
        .map_err(|e| ModelError::new(ModelErrorKind::Render(e)))
}
