use std::f64::consts::PI;

use crate::error::{require_finite, require_positive, Result, TimingError};

/// Binary orbit of the pulsar, used to remove the light-travel (Rømer) delay
/// across the orbit before folding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    /// Orbital period [s]
    pub period: f64,
    /// Projected semi-major axis [light-s]
    pub asini: f64,
    /// Epoch of the ascending node (circular) or periastron (eccentric) [s]
    pub t0: f64,
    pub ecc: f64,
    /// Longitude of periastron [rad]
    pub omega: f64,
}

impl Orbit {
    pub fn circular(period: f64, asini: f64, t0: f64) -> Self {
        Self {
            period,
            asini,
            t0,
            ecc: 0.0,
            omega: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("orbital_period", self.period)?;
        require_finite("asini", self.asini)?;
        if self.asini < 0.0 {
            return Err(TimingError::invalid("asini", self.asini, "must be >= 0"));
        }
        require_finite("orbit_t0", self.t0)?;
        require_finite("omega", self.omega)?;
        if !(0.0..1.0).contains(&self.ecc) {
            return Err(TimingError::invalid("ecc", self.ecc, "must be in [0, 1)"));
        }
        Ok(())
    }

    /// Light-travel delay [s] at time `t`.
    pub fn delay(&self, t: f64) -> f64 {
        if self.ecc < 1e-12 {
            let l = 2.0 * PI * ((t - self.t0) / self.period);
            return self.asini * l.sin();
        }

        let m = 2.0 * PI * ((t - self.t0) / self.period).rem_euclid(1.0);
        let e = solve_kepler_e(m, self.ecc);
        let sin_w = self.omega.sin();
        let cos_w = self.omega.cos();
        let fac = (1.0 - self.ecc * self.ecc).sqrt();
        self.asini * (sin_w * (e.cos() - self.ecc) + fac * cos_w * e.sin())
    }

    /// Emission time of a photon detected at `t`.
    pub fn correct(&self, t: f64) -> f64 {
        t - self.delay(t)
    }
}

fn solve_kepler_e(mean_anomaly: f64, ecc: f64) -> f64 {
    let mut e_anom = if ecc < 0.8 { mean_anomaly } else { PI };
    for _ in 0..16 {
        let f = e_anom - ecc * e_anom.sin() - mean_anomaly;
        let fp = 1.0 - ecc * e_anom.cos();
        let delta = f / fp;
        e_anom -= delta;
        if delta.abs() < 1e-13 {
            break;
        }
    }
    e_anom
}
