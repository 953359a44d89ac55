use crate::error::{require_finite, require_positive, Result, TimingError};
use crate::orbit::Orbit;

/// Whether the session refines an isolated pulsar or a binary orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Isolated,
    Binary,
}

impl Mode {
    pub fn is_binary(self) -> bool {
        matches!(self, Mode::Binary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingField {
    F,
    Fdot,
    Fddot,
    OrbitalPeriod,
    Asini,
    OrbitT0,
}

impl TimingField {
    pub fn name(self) -> &'static str {
        match self {
            TimingField::F => "f",
            TimingField::Fdot => "fdot",
            TimingField::Fddot => "fddot",
            TimingField::OrbitalPeriod => "orbital_period",
            TimingField::Asini => "asini",
            TimingField::OrbitT0 => "orbit_t0",
        }
    }
}

impl std::str::FromStr for TimingField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "f" | "freq" | "frequency" => Ok(TimingField::F),
            "fdot" => Ok(TimingField::Fdot),
            "fddot" => Ok(TimingField::Fddot),
            "pb" | "porb" | "orbital_period" => Ok(TimingField::OrbitalPeriod),
            "asini" | "a1" => Ok(TimingField::Asini),
            "t0" | "orbit_t0" | "tasc" => Ok(TimingField::OrbitT0),
            other => Err(format!("unknown timing field '{other}'")),
        }
    }
}

/// Spin and orbit parameters handed to the folder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ephemeris {
    pub f: f64,
    pub fdot: f64,
    pub fddot: f64,
    pub orbit: Option<Orbit>,
}

impl Ephemeris {
    pub fn isolated(f: f64, fdot: f64, fddot: f64) -> Self {
        Self {
            f,
            fdot,
            fddot,
            orbit: None,
        }
    }

    /// Pulse phase in cycles at `t`, relative to `epoch`.
    pub fn phase(&self, t: f64, epoch: f64) -> f64 {
        let t = match &self.orbit {
            Some(orbit) => orbit.correct(t),
            None => t,
        };
        let dt = t - epoch;
        dt * (self.f + dt * (0.5 * self.fdot + dt * self.fddot / 6.0))
    }
}

/// Step applied by one control event, per field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSteps {
    pub f: f64,
    pub fdot: f64,
    pub fddot: f64,
    pub orbital_period: f64,
}

impl TimingSteps {
    /// Steps that each move the phase at the end of a span of `tseg` seconds
    /// by a quarter cycle.
    pub fn for_span(tseg: f64, orbital_period: f64) -> Self {
        let tseg = if tseg > 0.0 { tseg } else { 1.0 };
        Self {
            f: 0.25 / tseg,
            fdot: 0.5 / (tseg * tseg),
            fddot: 1.5 / (tseg * tseg * tseg),
            orbital_period: orbital_period / 100.0,
        }
    }

    fn for_field(&self, field: TimingField) -> f64 {
        match field {
            TimingField::F => self.f,
            TimingField::Fdot => self.fdot,
            TimingField::Fddot => self.fddot,
            TimingField::OrbitalPeriod => self.orbital_period,
            TimingField::Asini | TimingField::OrbitT0 => 0.0,
        }
    }
}

/// Immutable copy of the model, for display and read-back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSnapshot {
    pub f: f64,
    pub fdot: f64,
    pub fddot: f64,
    pub orbit: Orbit,
    pub mode: Mode,
}

impl TimingSnapshot {
    /// `(f, fdot, fddot)`, or `(orbital_period, fdot, fddot)` in binary mode.
    pub fn values(&self) -> (f64, f64, f64) {
        match self.mode {
            Mode::Isolated => (self.f, self.fdot, self.fddot),
            Mode::Binary => (self.orbit.period, self.fdot, self.fddot),
        }
    }

    pub fn ephemeris(&self) -> Ephemeris {
        Ephemeris {
            f: self.f,
            fdot: self.fdot,
            fddot: self.fddot,
            orbit: self.mode.is_binary().then_some(self.orbit),
        }
    }

    pub fn get(&self, field: TimingField) -> f64 {
        match field {
            TimingField::F => self.f,
            TimingField::Fdot => self.fdot,
            TimingField::Fddot => self.fddot,
            TimingField::OrbitalPeriod => self.orbit.period,
            TimingField::Asini => self.orbit.asini,
            TimingField::OrbitT0 => self.orbit.t0,
        }
    }
}

/// The parameter set edited during a phaseogram session.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingModel {
    current: TimingSnapshot,
    initial: TimingSnapshot,
    steps: TimingSteps,
}

impl TimingModel {
    /// The orbit is only checked in binary mode, where it enters the phase.
    pub fn new(
        f: f64,
        fdot: f64,
        fddot: f64,
        orbit: Orbit,
        mode: Mode,
        steps: TimingSteps,
    ) -> Result<Self> {
        require_positive("f", f)?;
        require_finite("fdot", fdot)?;
        require_finite("fddot", fddot)?;
        if mode.is_binary() {
            orbit.validate()?;
        }
        let current = TimingSnapshot {
            f,
            fdot,
            fddot,
            orbit,
            mode,
        };
        Ok(Self {
            current,
            initial: current,
            steps,
        })
    }

    pub fn mode(&self) -> Mode {
        self.current.mode
    }

    pub fn steps(&self) -> &TimingSteps {
        &self.steps
    }

    /// Field moved by `update`: f for isolated pulsars, the orbital period for binaries.
    pub fn active_field(&self) -> TimingField {
        match self.current.mode {
            Mode::Isolated => TimingField::F,
            Mode::Binary => TimingField::OrbitalPeriod,
        }
    }

    pub fn get(&self, field: TimingField) -> f64 {
        self.current.get(field)
    }

    pub fn set(&mut self, field: TimingField, value: f64) -> Result<()> {
        let name = field.name();
        match field {
            TimingField::F => self.current.f = require_positive(name, value)?,
            TimingField::Fdot => self.current.fdot = require_finite(name, value)?,
            TimingField::Fddot => self.current.fddot = require_finite(name, value)?,
            TimingField::OrbitalPeriod => {
                self.current.orbit.period = require_positive(name, value)?
            }
            TimingField::Asini => {
                require_finite(name, value)?;
                if value < 0.0 {
                    return Err(TimingError::invalid(name, value, "must be >= 0"));
                }
                self.current.orbit.asini = value;
            }
            TimingField::OrbitT0 => self.current.orbit.t0 = require_finite(name, value)?,
        }
        Ok(())
    }

    /// Moves `field` by `direction` steps. The value is validated and never clamped.
    pub fn step(&mut self, field: TimingField, direction: i32) -> Result<()> {
        let delta = self.steps.for_field(field) * f64::from(direction);
        self.set(field, self.get(field) + delta)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        self.current
    }

    pub fn initial(&self) -> TimingSnapshot {
        self.initial
    }

    pub fn values(&self) -> (f64, f64, f64) {
        self.current.values()
    }

    pub fn ephemeris(&self) -> Ephemeris {
        self.current.ephemeris()
    }
}
