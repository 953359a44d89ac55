use std::f64::consts::PI;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView2, Axis};
use num_complex::Complex;

use crate::error::{require_finite, require_positive, Result, TimingError};
use crate::events::{in_gtis, Gti};
use crate::timing::Ephemeris;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldSettings {
    /// Phase bins per cycle
    pub nph: usize,
    /// Time segments across the observation
    pub nt: usize,
    /// Epoch at which phase is zero [s]
    pub reference_epoch: f64,
    /// Scale each segment to unit mean so profiles compare by shape
    pub normalize: bool,
}

impl FoldSettings {
    pub fn validate(&self) -> Result<()> {
        if self.nph == 0 {
            return Err(TimingError::invalid("nph", 0.0, "must be > 0"));
        }
        if self.nt == 0 {
            return Err(TimingError::invalid("nt", 0.0, "must be > 0"));
        }
        require_finite("reference_epoch", self.reference_epoch)?;
        Ok(())
    }
}

/// Photon counts per (time segment, phase bin).
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedImage {
    counts: Array2<f64>,
    profile: Vec<f64>,
    segment_edges: Vec<f64>,
    normalized: bool,
    photons: usize,
}

impl FoldedImage {
    pub fn counts(&self) -> &Array2<f64> {
        &self.counts
    }

    pub fn nt(&self) -> usize {
        self.counts.nrows()
    }

    pub fn nph(&self) -> usize {
        self.counts.ncols()
    }

    /// `nt + 1` segment boundaries [s].
    pub fn segment_edges(&self) -> &[f64] {
        &self.segment_edges
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Photons that fell inside the GTIs and were folded.
    pub fn photons(&self) -> usize {
        self.photons
    }

    /// Photon counts per phase bin summed over all segments, before normalization.
    pub fn profile(&self) -> &[f64] {
        &self.profile
    }

    /// Sub-image restricted to the given segment and phase-bin windows.
    pub fn view(&self, segments: Range<usize>, phase: Range<usize>) -> ArrayView2<'_, f64> {
        let rows = segments.start.min(self.nt())..segments.end.min(self.nt());
        let cols = phase.start.min(self.nph())..phase.end.min(self.nph());
        self.counts.slice(s![rows, cols])
    }
}

fn phase_bin(phase: f64, nph: usize) -> usize {
    ((phase.rem_euclid(1.0) * nph as f64).floor() as usize).min(nph - 1)
}

fn validate_ephemeris(ephemeris: &Ephemeris) -> Result<()> {
    require_positive("f", ephemeris.f)?;
    require_finite("fdot", ephemeris.fdot)?;
    require_finite("fddot", ephemeris.fddot)?;
    if let Some(orbit) = &ephemeris.orbit {
        orbit.validate()?;
    }
    Ok(())
}

/// Folds `times` into an `nt x nph` image. Events outside every GTI are dropped.
pub fn fold(
    times: &[f64],
    gtis: &[Gti],
    ephemeris: &Ephemeris,
    settings: &FoldSettings,
) -> Result<FoldedImage> {
    validate_ephemeris(ephemeris)?;
    settings.validate()?;

    let (start, stop) = match (gtis.first(), gtis.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => {
            return Err(TimingError::invalid("gti", 0.0, "at least one GTI is required"));
        }
    };
    let span = stop - start;
    let nt = settings.nt;
    let nph = settings.nph;

    let segment_edges: Vec<f64> = (0..=nt)
        .map(|i| start + span * i as f64 / nt as f64)
        .collect();

    let mut counts = Array2::<f64>::zeros((nt, nph));
    let mut photons = 0usize;
    for &t in times {
        if !in_gtis(gtis, t) {
            continue;
        }
        let segment = (((t - start) / span * nt as f64).floor() as usize).min(nt - 1);
        let phase = ephemeris.phase(t, settings.reference_epoch);
        counts[[segment, phase_bin(phase, nph)]] += 1.0;
        photons += 1;
    }

    let profile = counts.sum_axis(Axis(0)).to_vec();
    if settings.normalize {
        for mut row in counts.rows_mut() {
            let mean = row.sum() / nph as f64;
            if mean > 0.0 {
                row.mapv_inplace(|v| v / mean);
            }
        }
    }

    Ok(FoldedImage {
        counts,
        profile,
        segment_edges,
        normalized: settings.normalize,
        photons,
    })
}

/// One-dimensional folded profile of all events inside the GTIs.
pub fn fold_profile(
    times: &[f64],
    gtis: &[Gti],
    ephemeris: &Ephemeris,
    reference_epoch: f64,
    nph: usize,
) -> Result<Vec<f64>> {
    validate_ephemeris(ephemeris)?;
    if nph == 0 {
        return Err(TimingError::invalid("nph", 0.0, "must be > 0"));
    }
    let mut profile = vec![0.0f64; nph];
    for &t in times {
        if !in_gtis(gtis, t) {
            continue;
        }
        let phase = ephemeris.phase(t, reference_epoch);
        profile[phase_bin(phase, nph)] += 1.0;
    }
    Ok(profile)
}

/// Z^2_n of a binned profile, using the bin centres as phases.
pub fn z2n_from_profile(profile: &[f64], n: usize) -> f64 {
    let total: f64 = profile.iter().sum();
    if total <= 0.0 || profile.is_empty() {
        return 0.0;
    }
    let nph = profile.len() as f64;
    let mut stat = 0.0;
    for k in 1..=n {
        let mut acc = Complex::new(0.0f64, 0.0f64);
        for (j, &p) in profile.iter().enumerate() {
            let phase = (j as f64 + 0.5) / nph;
            acc += Complex::from_polar(p, 2.0 * PI * k as f64 * phase);
        }
        stat += acc.norm_sqr();
    }
    2.0 / total * stat
}
