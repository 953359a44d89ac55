use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{require_positive, Result, TimingError};
use crate::events::Gti;
use crate::fitting::fit_quadratic_least_squares;
use crate::folding::{fold_profile, z2n_from_profile};
use crate::timing::Ephemeris;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub fmin: f64,
    pub fmax: f64,
    /// Phase bins of each trial profile
    pub nbin: usize,
    /// Harmonics summed in Z^2_n
    pub n: usize,
    /// Trial frequencies per Fourier resolution element 1/T
    pub oversample: f64,
    pub fit_candidates: bool,
    pub fit_frequency: Option<f64>,
    pub max_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fmin: 0.0,
            fmax: 0.0,
            nbin: 64,
            n: 2,
            oversample: 2.0,
            fit_candidates: false,
            fit_frequency: None,
            max_candidates: 5,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("fmin", self.fmin)?;
        require_positive("fmax", self.fmax)?;
        if self.fmax <= self.fmin {
            return Err(TimingError::invalid("fmax", self.fmax, "must exceed fmin"));
        }
        if self.nbin == 0 {
            return Err(TimingError::invalid("nbin", 0.0, "must be > 0"));
        }
        if self.n == 0 {
            return Err(TimingError::invalid("n", 0.0, "must be > 0"));
        }
        require_positive("oversample", self.oversample)?;
        if let Some(f) = self.fit_frequency {
            require_positive("fit_frequency", f)?;
        }
        Ok(())
    }
}

/// Result of an epoch-folding search.
#[derive(Debug, Clone, PartialEq)]
pub struct Periodogram {
    pub freq: Vec<f64>,
    pub stat: Vec<f64>,
    /// Candidate frequencies, best first
    pub peaks: Vec<f64>,
    pub peak_stat: Vec<f64>,
    /// Harmonics used for Z^2_n
    pub n: usize,
    pub nbin: usize,
    pub tseg: f64,
}

impl Periodogram {
    /// Best candidate: the first peak, or the grid maximum when no peaks were recorded.
    pub fn best_frequency(&self) -> Option<f64> {
        if let Some(&f) = self.peaks.first() {
            return Some(f);
        }
        self.stat
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .and_then(|(idx, _)| self.freq.get(idx).copied())
    }
}

/// Upper bound on trial frequencies in one search.
pub const MAX_TRIALS: usize = 5_000_000;

fn frequency_grid(fmin: f64, fmax: f64, step: f64) -> Result<Vec<f64>> {
    let count = ((fmax - fmin) / step).floor() + 1.0;
    if !(count <= MAX_TRIALS as f64) {
        return Err(TimingError::invalid(
            "fmax",
            fmax,
            "frequency range needs too many trials, narrow it or lower the oversampling",
        ));
    }
    Ok((0..count as usize).map(|i| fmin + step * i as f64).collect())
}

/// Local maxima of `stat`, best first.
fn find_peaks(stat: &[f64], max_candidates: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..stat.len())
        .filter(|&i| {
            let left = i == 0 || stat[i] >= stat[i - 1];
            let right = i + 1 == stat.len() || stat[i] > stat[i + 1];
            left && right && stat[i] > 0.0
        })
        .collect();
    idx.sort_by(|a, b| stat[*b].total_cmp(&stat[*a]));
    idx.truncate(max_candidates.max(1));
    idx
}

fn nearest_index(freq: &[f64], target: f64) -> usize {
    freq.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Refines a grid peak with a quadratic through it and its two neighbours.
fn refine_peak(freq: &[f64], stat: &[f64], idx: usize) -> Option<(f64, f64)> {
    if freq.len() < 3 {
        return None;
    }
    let center = idx.clamp(1, freq.len() - 2);
    let window = center - 1..center + 2;
    match fit_quadratic_least_squares(&freq[window.clone()], &stat[window]) {
        Ok(fit) if fit.peak_x >= freq[center - 1] && fit.peak_x <= freq[center + 1] => {
            Some((fit.peak_x, fit.peak_y))
        }
        Ok(fit) => {
            warn!(
                "peak fit at {:.9} Hz left the fit window ({:.9} Hz), keeping the grid value",
                freq[idx], fit.peak_x
            );
            None
        }
        Err(err) => {
            warn!("peak fit at {:.9} Hz failed: {err}", freq[idx]);
            None
        }
    }
}

/// Z^2_n epoch-folding search over `[fmin, fmax]`.
pub fn z2n_search(times: &[f64], gtis: &[Gti], config: &SearchConfig) -> Result<Periodogram> {
    config.validate()?;
    let (tstart, tstop) = match (gtis.first(), gtis.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => return Err(TimingError::invalid("gti", 0.0, "at least one GTI is required")),
    };
    if times.is_empty() {
        return Err(TimingError::invalid("times", 0.0, "event list is empty"));
    }
    let tseg = tstop - tstart;
    let step = 1.0 / (config.oversample * tseg);
    let freq = frequency_grid(config.fmin, config.fmax, step)?;

    let started = Instant::now();
    let mut stat = Vec::with_capacity(freq.len());
    for &f in &freq {
        let ephemeris = Ephemeris::isolated(f, 0.0, 0.0);
        let profile = fold_profile(times, gtis, &ephemeris, tstart, config.nbin)?;
        stat.push(z2n_from_profile(&profile, config.n));
    }
    debug!(
        "Z^2_{} over {} trial frequencies ({} events) in {:.3} s",
        config.n,
        freq.len(),
        times.len(),
        started.elapsed().as_secs_f64()
    );

    let mut candidates: Vec<(f64, f64)> = find_peaks(&stat, config.max_candidates)
        .into_iter()
        .map(|idx| {
            let refined = if config.fit_candidates {
                refine_peak(&freq, &stat, idx)
            } else {
                None
            };
            refined.unwrap_or((freq[idx], stat[idx]))
        })
        .collect();

    if let Some(target) = config.fit_frequency {
        let idx = nearest_index(&freq, target);
        let best = refine_peak(&freq, &stat, idx).unwrap_or((freq[idx], stat[idx]));
        candidates.retain(|(f, _)| (f - best.0).abs() > step / 2.0);
        candidates.insert(0, best);
    }

    if let Some((f, s)) = candidates.first() {
        info!("best candidate {f:.9} Hz (Z^2_{} = {s:.2})", config.n);
    }

    Ok(Periodogram {
        freq,
        stat,
        peaks: candidates.iter().map(|c| c.0).collect(),
        peak_stat: candidates.iter().map(|c| c.1).collect(),
        n: config.n,
        nbin: config.nbin,
        tseg,
    })
}
