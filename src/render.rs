use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{ArrayView2, Axis};
use plotters::prelude::*;
use plotters::style::colors::colormaps::ViridisRGB;
use tracing::debug;

use crate::error::{Result, TimingError};
use crate::search::Periodogram;
use crate::timing::{Mode, TimingSnapshot};

/// Everything a surface needs to redraw the phaseogram.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    /// Windowed image, `[segment, phase bin]`
    pub image: ArrayView2<'a, f64>,
    pub segments: Range<usize>,
    pub phase: Range<usize>,
    /// Full image size `(nt, nph)`
    pub shape: (usize, usize),
    pub segment_edges: &'a [f64],
    pub model: TimingSnapshot,
    /// Z^2_n of the full summed profile
    pub z2n: f64,
}

impl Frame<'_> {
    pub fn mode(&self) -> Mode {
        self.model.mode
    }

    /// Phase interval covered by the window, in cycles.
    pub fn phase_range(&self) -> (f64, f64) {
        let nph = self.shape.1.max(1) as f64;
        (self.phase.start as f64 / nph, self.phase.end as f64 / nph)
    }

    /// Time interval covered by the window [s].
    pub fn time_range(&self) -> (f64, f64) {
        let first = self.segment_edges.get(self.segments.start).copied().unwrap_or(0.0);
        let last = self
            .segment_edges
            .get(self.segments.end)
            .or_else(|| self.segment_edges.last())
            .copied()
            .unwrap_or(first);
        (first, last)
    }
}

/// Drawing target the phaseogram pushes frames into.
pub trait RenderSurface {
    fn open(&mut self) -> Result<()>;
    fn draw(&mut self, frame: &Frame<'_>) -> Result<()>;
    fn close(&mut self);
}

/// Headless surface. Draws nothing and keeps counts for inspection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NullSurface {
    pub opened: usize,
    pub closed: usize,
    pub draws: usize,
    pub is_open: bool,
}

impl RenderSurface for NullSurface {
    fn open(&mut self) -> Result<()> {
        self.opened += 1;
        self.is_open = true;
        Ok(())
    }

    fn draw(&mut self, _frame: &Frame<'_>) -> Result<()> {
        if !self.is_open {
            return Err(TimingError::Render("surface is not open".to_string()));
        }
        self.draws += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed += 1;
        self.is_open = false;
    }
}

fn render_err<E: std::fmt::Display>(err: E) -> TimingError {
    TimingError::Render(err.to_string())
}

/// Writes every frame to a PNG file, overwriting the previous one.
#[derive(Debug, Clone)]
pub struct PlotSurface {
    path: PathBuf,
    size: (u32, u32),
    is_open: bool,
}

impl PlotSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: (1280, 960),
            is_open: false,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSurface for PlotSurface {
    fn open(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.is_open = true;
        Ok(())
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<()> {
        if !self.is_open {
            return Err(TimingError::Render("surface is not open".to_string()));
        }
        plot_phaseogram(&self.path, self.size, frame)?;
        debug!("phaseogram written to {:?}", self.path);
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
    }
}

fn caption(model: &TimingSnapshot, z2n: f64) -> String {
    match model.mode {
        Mode::Isolated => format!(
            "f = {:.9} Hz  fdot = {:.3e}  fddot = {:.3e}  Z2 = {:.1}",
            model.f, model.fdot, model.fddot, z2n
        ),
        Mode::Binary => format!(
            "Pb = {:.4} s  asini = {:.4} lt-s  f = {:.9} Hz  fdot = {:.3e}  Z2 = {:.1}",
            model.orbit.period, model.orbit.asini, model.f, model.fdot, z2n
        ),
    }
}

/// Folded profile on top, phase-time heatmap below. Two cycles are shown.
pub fn plot_phaseogram(output_path: &Path, size: (u32, u32), frame: &Frame<'_>) -> Result<()> {
    let (rows, cols) = frame.image.dim();
    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    if rows == 0 || cols == 0 {
        root.present().map_err(render_err)?;
        return Ok(());
    }

    let mut min_val = f64::INFINITY;
    let mut max_val = f64::NEG_INFINITY;
    for &v in frame.image.iter() {
        min_val = min_val.min(v);
        max_val = max_val.max(v);
    }
    if (max_val - min_val).abs() < f64::EPSILON {
        max_val = min_val + 1.0;
    }

    let (phase_lo, phase_hi) = frame.phase_range();
    let (time_lo, time_hi) = frame.time_range();
    let span = phase_hi - phase_lo;
    let bin_width = span / cols as f64;
    let row_height = (time_hi - time_lo) / rows as f64;

    let (top, bottom) = root.split_vertically(size.1 / 3);

    let profile: Vec<f64> = frame.image.sum_axis(Axis(0)).to_vec();
    let mut pmin = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let mut pmax = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (pmax - pmin).abs() < 1e-15 {
        pmin -= 1.0;
        pmax += 1.0;
    } else {
        let margin = (pmax - pmin) * 0.1;
        pmin -= margin;
        pmax += margin;
    }

    let mut profile_chart = ChartBuilder::on(&top)
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(70)
        .caption(caption(&frame.model, frame.z2n), ("sans-serif", 22).into_font())
        .build_cartesian_2d(phase_lo..phase_lo + 2.0 * span, pmin..pmax)
        .map_err(render_err)?;
    profile_chart
        .configure_mesh()
        .y_desc("Counts")
        .draw()
        .map_err(render_err)?;
    let steps = (0..2 * cols).flat_map(|i| {
        let left = phase_lo + i as f64 * bin_width;
        let value = profile[i % cols];
        [(left, value), (left + bin_width, value)]
    });
    profile_chart
        .draw_series(LineSeries::new(steps, &BLUE))
        .map_err(render_err)?;

    let mut chart = ChartBuilder::on(&bottom)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(phase_lo..phase_lo + 2.0 * span, time_lo..time_hi)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc("Pulse phase")
        .y_desc("Time [s]")
        .disable_mesh()
        .draw()
        .map_err(render_err)?;

    for (row_idx, row) in frame.image.rows().into_iter().enumerate() {
        let t_low = time_lo + row_idx as f64 * row_height;
        for cycle in 0..2 {
            for (col_idx, &value) in row.iter().enumerate() {
                let x_low = phase_lo + (cycle * cols + col_idx) as f64 * bin_width;
                let norm = ((value - min_val) / (max_val - min_val)).clamp(0.0, 1.0);
                let color = ViridisRGB.get_color(norm);
                chart
                    .draw_series(std::iter::once(Rectangle::new(
                        [(x_low, t_low), (x_low + bin_width, t_low + row_height)],
                        color.filled(),
                    )))
                    .map_err(render_err)?;
            }
        }
    }

    root.present().map_err(render_err)?;
    Ok(())
}

/// Z^2_n against trial frequency, with the candidates marked.
pub fn plot_periodogram(output_path: &Path, periodogram: &Periodogram) -> Result<()> {
    if periodogram.freq.is_empty() {
        return Ok(());
    }
    let xmin = periodogram.freq[0];
    let mut xmax = periodogram.freq[periodogram.freq.len() - 1];
    if xmax <= xmin {
        xmax = xmin + 1.0;
    }
    let ymax = periodogram
        .stat
        .iter()
        .chain(periodogram.peak_stat.iter())
        .copied()
        .fold(0.0f64, f64::max)
        .max(1.0)
        * 1.1;

    let root = BitMapBackend::new(output_path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .caption(
            format!("Z^2_{} search (T = {:.2} s)", periodogram.n, periodogram.tseg),
            ("sans-serif", 30).into_font(),
        )
        .build_cartesian_2d(xmin..xmax, 0.0..ymax)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Frequency [Hz]")
        .y_desc(format!("Z^2_{}", periodogram.n))
        .x_label_formatter(&|v| format!("{:.4}", v))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            periodogram
                .freq
                .iter()
                .copied()
                .zip(periodogram.stat.iter().copied()),
            &BLUE,
        ))
        .map_err(render_err)?
        .label("Z^2_n")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 24, y)], BLUE));

    chart
        .draw_series(
            periodogram
                .peaks
                .iter()
                .zip(periodogram.peak_stat.iter())
                .map(|(&f, &s)| Circle::new((f, s), 5, RED.filled())),
        )
        .map_err(render_err)?
        .label("Candidates")
        .legend(|(x, y)| Circle::new((x + 12, y), 4, RED.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::Orbit;
    use ndarray::Array2;

    fn snapshot() -> TimingSnapshot {
        TimingSnapshot {
            f: 1.0,
            fdot: 0.0,
            fddot: 0.0,
            orbit: Orbit::circular(10.0, 0.0, 0.0),
            mode: Mode::Isolated,
        }
    }

    #[test]
    fn frame_ranges_follow_the_window() {
        let image = Array2::<f64>::zeros((4, 8));
        let edges = [0.0, 1.0, 2.0, 3.0, 4.0];
        let frame = Frame {
            image: image.view(),
            segments: 1..3,
            phase: 2..6,
            shape: (4, 8),
            segment_edges: &edges,
            model: snapshot(),
            z2n: 0.0,
        };
        assert_eq!(frame.phase_range(), (0.25, 0.75));
        assert_eq!(frame.time_range(), (1.0, 3.0));
    }

    #[test]
    fn null_surface_refuses_draws_while_closed() {
        let image = Array2::<f64>::zeros((1, 1));
        let edges = [0.0, 1.0];
        let frame = Frame {
            image: image.view(),
            segments: 0..1,
            phase: 0..1,
            shape: (1, 1),
            segment_edges: &edges,
            model: snapshot(),
            z2n: 0.0,
        };
        let mut surface = NullSurface::default();
        assert!(surface.draw(&frame).is_err());
        surface.open().unwrap();
        surface.draw(&frame).unwrap();
        surface.close();
        assert_eq!((surface.opened, surface.draws, surface.closed), (1, 1, 1));
    }
}
