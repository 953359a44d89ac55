use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::error::{require_finite, Result, TimingError};

/// Good time interval, `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gti {
    pub start: f64,
    pub end: f64,
}

impl Gti {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Photon arrival times and the intervals in which they are valid.
#[derive(Debug, Clone, PartialEq)]
pub struct EventList {
    time: Vec<f64>,
    gti: Vec<Gti>,
}

impl EventList {
    /// Builds an event list, checking that times are finite and sorted and that
    /// the GTIs are ordered and disjoint. An empty `gti` is replaced by a single
    /// interval spanning all events.
    pub fn new(time: Vec<f64>, gti: Vec<Gti>) -> Result<Self> {
        for (idx, &t) in time.iter().enumerate() {
            require_finite("time", t)?;
            if idx > 0 && t < time[idx - 1] {
                return Err(TimingError::invalid(
                    "time",
                    t,
                    "arrival times must be non-decreasing",
                ));
            }
        }

        let gti = if gti.is_empty() {
            default_gti(&time)
        } else {
            gti
        };

        for (idx, g) in gti.iter().enumerate() {
            require_finite("gti.start", g.start)?;
            require_finite("gti.end", g.end)?;
            if g.end <= g.start {
                return Err(TimingError::invalid("gti.end", g.end, "must exceed gti.start"));
            }
            if idx > 0 && g.start < gti[idx - 1].end {
                return Err(TimingError::invalid(
                    "gti.start",
                    g.start,
                    "GTIs must be sorted and disjoint",
                ));
            }
        }

        Ok(Self { time, gti })
    }

    /// Simulates photon arrivals from a binned light curve. `times` are bin
    /// centres of constant width, `counts` the expected counts per bin.
    pub fn simulate<R: Rng>(
        times: &[f64],
        counts: &[f64],
        gti: Vec<Gti>,
        rng: &mut R,
    ) -> Result<Self> {
        if times.len() != counts.len() {
            return Err(TimingError::invalid(
                "counts",
                counts.len() as f64,
                "light curve times and counts differ in length",
            ));
        }
        if times.len() < 2 {
            return Err(TimingError::invalid(
                "times",
                times.len() as f64,
                "at least two light curve bins are needed",
            ));
        }
        let dt = times[1] - times[0];
        if !(dt > 0.0) {
            return Err(TimingError::invalid("dt", dt, "must be > 0"));
        }

        let expected_total: f64 = counts.iter().map(|c| c.max(0.0)).sum();
        let mut events = Vec::with_capacity(expected_total as usize);
        for (&center, &expected) in times.iter().zip(counts.iter()) {
            if !(expected > 0.0) {
                continue;
            }
            let poisson = Poisson::<f64>::new(expected)
                .map_err(|_| TimingError::invalid("counts", expected, "not a valid Poisson mean"))?;
            let n = poisson.sample(rng) as usize;
            let left = center - dt / 2.0;
            for _ in 0..n {
                events.push(left + rng.random::<f64>() * dt);
            }
        }
        events.sort_by(|a, b| a.total_cmp(b));

        Self::new(events, gti)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn gti(&self) -> &[Gti] {
        &self.gti
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn tstart(&self) -> f64 {
        self.gti.first().map(|g| g.start).unwrap_or(0.0)
    }

    pub fn tstop(&self) -> f64 {
        self.gti.last().map(|g| g.end).unwrap_or(0.0)
    }

    /// Span from the first GTI start to the last GTI end.
    pub fn tseg(&self) -> f64 {
        self.tstop() - self.tstart()
    }

    /// Total exposure, the summed GTI durations.
    pub fn exposure(&self) -> f64 {
        self.gti.iter().map(Gti::duration).sum()
    }

    pub fn in_gti(&self, t: f64) -> bool {
        in_gtis(&self.gti, t)
    }
}

/// GTIs are sorted, so a binary search finds the only candidate interval.
pub(crate) fn in_gtis(gtis: &[Gti], t: f64) -> bool {
    let idx = gtis.partition_point(|g| g.start <= t);
    idx > 0 && gtis[idx - 1].contains(t)
}

fn default_gti(time: &[f64]) -> Vec<Gti> {
    match (time.first(), time.last()) {
        (Some(&first), Some(&last)) => {
            // half-open interval, nudge the end past the last photon by at
            // least a few ulps so large epochs still keep it
            let span = if last > first { (last - first) * 1e-9 } else { 1e-9 };
            let nudge = span.max(last.abs() * f64::EPSILON * 4.0);
            vec![Gti::new(first, last + nudge)]
        }
        _ => Vec::new(),
    }
}
