//! PNG charts.
//!
//! Categorical axes are drawn on a float axis with one tick per category, labelled by index.
use crate::{Context, Result};
use plotters::{element::Pie, prelude::*};
use qu::ick_use::*;
use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

pub const PALETTE: [RGBColor; 7] = [
    RGBColor(0x34, 0x98, 0xdb),
    RGBColor(0xe7, 0x4c, 0x3c),
    RGBColor(0x2e, 0xcc, 0x71),
    RGBColor(0xf3, 0x9c, 0x12),
    RGBColor(0x9b, 0x59, 0xb6),
    RGBColor(0x1a, 0xbc, 0x9c),
    RGBColor(0x95, 0xa5, 0xa6),
];

pub const GREEN: RGBColor = PALETTE[2];
pub const ORANGE: RGBColor = PALETTE[3];
pub const RED: RGBColor = PALETTE[1];
pub const GREY: RGBColor = PALETTE[6];

const SIZE: (u32, u32) = (1400, 800);
const PIE_SIZE: (u32, u32) = (1000, 800);
const FONT: &str = "sans-serif";

/// Cycle through the palette.
pub fn color(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

/// The directory a report writes its charts to.
#[derive(Debug, Clone)]
pub struct ChartDir(PathBuf);

impl ChartDir {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create chart directory \"{}\"", dir.display()))?;
        Ok(ChartDir(dir))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Categories on the y axis, top to bottom.
    Horizontal,
    /// Categories on the x axis, left to right.
    Vertical,
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub color: RGBColor,
}

impl Bar {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Bar {
            label: label.into(),
            value,
            color: PALETTE[0],
        }
    }

    pub fn with_color(mut self, color: RGBColor) -> Self {
        self.color = color;
        self
    }
}

/// A reference line across the value axis.
#[derive(Debug, Clone)]
pub struct Marker {
    pub label: String,
    pub value: f64,
    pub color: RGBColor,
}

impl Marker {
    pub fn new(label: impl Into<String>, value: f64, color: RGBColor) -> Self {
        Marker {
            label: label.into(),
            value,
            color,
        }
    }
}

/// A named list of values, one per category.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Series {
            name: name.into(),
            values,
        }
    }
}

fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((0f64, 0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let hi = if hi <= lo { lo + 1. } else { hi };
    let pad = (hi - lo) * 0.1;
    let lo = if lo < 0. { lo - pad } else { 0. };
    lo..hi + pad
}

fn category_range(n: usize) -> Range<f64> {
    -0.5..(n as f64 - 0.5)
}

/// The label for a tick on a categorical axis, blank between categories.
fn category_label(labels: &[String], x: f64) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0. {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn skip_empty(path: &Path, empty: bool) -> bool {
    if empty {
        event!(
            Level::WARN,
            "nothing to draw, skipping chart \"{}\"",
            path.display()
        );
    }
    empty
}

/// A bar per category. Horizontal charts list the first bar at the top.
pub fn bar_chart(
    path: &Path,
    title: &str,
    bars: &[Bar],
    orientation: Orientation,
    value_desc: &str,
    markers: &[Marker],
) -> Result {
    if skip_empty(path, bars.is_empty()) {
        return Ok(());
    }
    let n = bars.len();
    let values = value_range(
        bars.iter()
            .map(|b| b.value)
            .chain(markers.iter().map(|m| m.value)),
    );
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    match orientation {
        Orientation::Vertical => {
            let labels: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT, 28))
                .margin(20)
                .x_label_area_size(140)
                .y_label_area_size(100)
                .build_cartesian_2d(category_range(n), values)?;
            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(n)
                .x_label_formatter(&|x| category_label(&labels, *x))
                .y_desc(value_desc)
                .draw()?;
            chart.draw_series(bars.iter().enumerate().map(|(idx, bar)| {
                let x = idx as f64;
                Rectangle::new([(x - 0.4, 0.), (x + 0.4, bar.value)], bar.color.filled())
            }))?;
            for marker in markers {
                let color = marker.color;
                chart
                    .draw_series(LineSeries::new(
                        vec![(-0.5, marker.value), (n as f64 - 0.5, marker.value)],
                        color.stroke_width(2),
                    ))?
                    .label(marker.label.clone())
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }
            if !markers.is_empty() {
                chart
                    .configure_series_labels()
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()?;
            }
        }
        Orientation::Horizontal => {
            // first bar on top, so reverse the category order
            let labels: Vec<String> = bars.iter().rev().map(|b| b.label.clone()).collect();
            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT, 28))
                .margin(20)
                .x_label_area_size(60)
                .y_label_area_size(380)
                .build_cartesian_2d(values, category_range(n))?;
            chart
                .configure_mesh()
                .disable_y_mesh()
                .y_labels(n)
                .y_label_formatter(&|y| category_label(&labels, *y))
                .x_desc(value_desc)
                .draw()?;
            chart.draw_series(bars.iter().enumerate().map(|(idx, bar)| {
                let y = (n - 1 - idx) as f64;
                Rectangle::new([(0., y - 0.4), (bar.value, y + 0.4)], bar.color.filled())
            }))?;
            for marker in markers {
                let color = marker.color;
                chart
                    .draw_series(LineSeries::new(
                        vec![(marker.value, -0.5), (marker.value, n as f64 - 0.5)],
                        color.stroke_width(2),
                    ))?
                    .label(marker.label.clone())
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }
            if !markers.is_empty() {
                chart
                    .configure_series_labels()
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()?;
            }
        }
    }
    root.present()?;
    event!(Level::INFO, "saved chart \"{}\"", path.display());
    Ok(())
}

/// Side by side bars, one per series, for each category.
pub fn grouped_bar_chart(
    path: &Path,
    title: &str,
    categories: &[String],
    series: &[Series],
    orientation: Orientation,
    value_desc: &str,
) -> Result {
    if skip_empty(path, categories.is_empty() || series.is_empty()) {
        return Ok(());
    }
    let n = categories.len();
    let width = 0.8 / series.len() as f64;
    let values = value_range(series.iter().flat_map(|s| s.values.iter().copied()));
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    match orientation {
        Orientation::Vertical => {
            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT, 28))
                .margin(20)
                .x_label_area_size(140)
                .y_label_area_size(100)
                .build_cartesian_2d(category_range(n), values)?;
            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(n)
                .x_label_formatter(&|x| category_label(categories, *x))
                .y_desc(value_desc)
                .draw()?;
            for (s_idx, s) in series.iter().enumerate() {
                let fill = color(s_idx);
                chart
                    .draw_series(s.values.iter().enumerate().map(|(idx, value)| {
                        let x0 = idx as f64 - 0.4 + s_idx as f64 * width;
                        Rectangle::new([(x0, 0.), (x0 + width, *value)], fill.filled())
                    }))?
                    .label(s.name.clone())
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill.filled())
                    });
            }
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
        Orientation::Horizontal => {
            let labels: Vec<String> = categories.iter().rev().cloned().collect();
            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT, 28))
                .margin(20)
                .x_label_area_size(60)
                .y_label_area_size(380)
                .build_cartesian_2d(values, category_range(n))?;
            chart
                .configure_mesh()
                .disable_y_mesh()
                .y_labels(n)
                .y_label_formatter(&|y| category_label(&labels, *y))
                .x_desc(value_desc)
                .draw()?;
            for (s_idx, s) in series.iter().enumerate() {
                let fill = color(s_idx);
                chart
                    .draw_series(s.values.iter().enumerate().map(|(idx, value)| {
                        let y0 = (n - 1 - idx) as f64 - 0.4 + s_idx as f64 * width;
                        Rectangle::new([(0., y0), (*value, y0 + width)], fill.filled())
                    }))?
                    .label(s.name.clone())
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill.filled())
                    });
            }
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }
    root.present()?;
    event!(Level::INFO, "saved chart \"{}\"", path.display());
    Ok(())
}

/// One line per series over ordered categories (usually months), plus reference lines.
pub fn line_chart(
    path: &Path,
    title: &str,
    x_labels: &[String],
    series: &[Series],
    markers: &[Marker],
    value_desc: &str,
) -> Result {
    if skip_empty(path, x_labels.is_empty() || series.is_empty()) {
        return Ok(());
    }
    let n = x_labels.len();
    let values = value_range(
        series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .chain(markers.iter().map(|m| m.value)),
    );
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 28))
        .margin(20)
        .x_label_area_size(100)
        .y_label_area_size(100)
        .build_cartesian_2d(category_range(n), values)?;
    chart
        .configure_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| category_label(x_labels, *x))
        .y_desc(value_desc)
        .draw()?;

    for (s_idx, s) in series.iter().enumerate() {
        let stroke = color(s_idx);
        let points: Vec<(f64, f64)> = s
            .values
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx as f64, *v))
            .collect();
        chart
            .draw_series(LineSeries::new(points.clone(), stroke.stroke_width(3)))?
            .label(s.name.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], stroke.stroke_width(3))
            });
        chart.draw_series(
            points
                .into_iter()
                .map(|point| Circle::new(point, 4, stroke.filled())),
        )?;
    }
    for marker in markers {
        let stroke = marker.color;
        chart
            .draw_series(LineSeries::new(
                vec![(-0.5, marker.value), (n as f64 - 0.5, marker.value)],
                stroke.mix(0.7).stroke_width(2),
            ))?
            .label(marker.label.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], stroke.stroke_width(2))
            });
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    event!(Level::INFO, "saved chart \"{}\"", path.display());
    Ok(())
}

/// Slices with their percentage of the total.
pub fn pie_chart(path: &Path, title: &str, slices: &[(String, f64)]) -> Result {
    let total: f64 = slices.iter().map(|(_, v)| v.max(0.)).sum();
    if skip_empty(path, total <= 0.) {
        return Ok(());
    }
    let root = BitMapBackend::new(path, PIE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let area = root.titled(title, (FONT, 28))?;
    let (width, height) = area.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = width.min(height) as f64 * 0.32;
    let sizes: Vec<f64> = slices.iter().map(|(_, v)| v.max(0.)).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(color).collect();
    let labels: Vec<String> = slices.iter().map(|(l, _)| l.clone()).collect();
    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(-90.);
    pie.label_style((FONT, 18).into_font().color(&BLACK));
    pie.percentages((FONT, 16).into_font().color(&WHITE));
    area.draw(&pie)?;
    root.present()?;
    event!(Level::INFO, "saved chart \"{}\"", path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories_label_whole_ticks_only() {
        let labels = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(category_label(&labels, 0.), "a");
        assert_eq!(category_label(&labels, 1.0000001), "b");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, -0.4), "");
        assert_eq!(category_label(&labels, 2.), "");
    }

    #[test]
    fn value_range_pads_and_keeps_zero() {
        let r = value_range([10., 50.].into_iter());
        assert_eq!(r.start, 0.);
        assert!((r.end - 55.).abs() < 1e-9);
        let r = value_range([-10., 10.].into_iter());
        assert!(r.start < -10.);
        let r = value_range(std::iter::empty());
        assert_eq!(r.start, 0.);
        assert!(r.end > 1.);
    }
}
