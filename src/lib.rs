//! Pulsar timing for X-ray event lists: Z^2_n epoch-folding searches and an
//! interactive phaseogram for refining f, fdot, fddot and the orbital period.

pub mod engine;
pub mod error;
pub mod events;
pub mod fitting;
pub mod folding;
pub mod io;
pub mod orbit;
pub mod render;
pub mod search;
pub mod timing;

pub use engine::{FrequencySeed, Phaseogram, PhaseogramConfig, PhaseogramState, ZoomState};
pub use error::{Result, TimingError};
pub use events::{EventList, Gti};
pub use folding::{fold, FoldSettings, FoldedImage};
pub use orbit::Orbit;
pub use render::{Frame, NullSurface, PlotSurface, RenderSurface};
pub use search::{z2n_search, Periodogram, SearchConfig};
pub use timing::{Ephemeris, Mode, TimingField, TimingModel, TimingSnapshot, TimingSteps};
