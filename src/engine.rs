//! Interactive phaseogram refinement.
//!
//! A [`Phaseogram`] folds a borrowed event list with a [`TimingModel`] and pushes
//! the result to a [`RenderSurface`]. Each control event (step the active
//! parameter, refold, reset, zoom) is one synchronous method call.
//!
//! ```text
//! Idle --initialize--> Displaying --close--> Closed
//! ```

use std::ops::Range;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{require_positive, Result, TimingError};
use crate::events::EventList;
use crate::folding::{fold, z2n_from_profile, FoldSettings, FoldedImage};
use crate::orbit::Orbit;
use crate::render::{Frame, RenderSurface};
use crate::search::Periodogram;
use crate::timing::{Mode, TimingField, TimingModel, TimingSnapshot, TimingSteps};

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseogramConfig {
    pub mode: Mode,
    /// Phase bins per cycle
    pub nph: usize,
    /// Time segments (image rows)
    pub nt: usize,
    pub normalize: bool,
    /// Harmonics for the displayed Z^2_n
    pub harmonics: usize,
    pub fdot: f64,
    pub fddot: f64,
    /// Defaults to the observation span
    pub orbital_period: Option<f64>,
    /// Defaults to half a pulse period
    pub asini: Option<f64>,
    /// Defaults to the start of the observation
    pub orbit_t0: Option<f64>,
    /// Defaults to [`TimingSteps::for_span`]
    pub steps: Option<TimingSteps>,
}

impl Default for PhaseogramConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Isolated,
            nph: 64,
            nt: 32,
            normalize: true,
            harmonics: 2,
            fdot: 0.0,
            fddot: 0.0,
            orbital_period: None,
            asini: None,
            orbit_t0: None,
            steps: None,
        }
    }
}

/// Where the initial pulse frequency comes from.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencySeed<'p> {
    pub frequency: Option<f64>,
    pub periodogram: Option<&'p Periodogram>,
}

impl<'p> FrequencySeed<'p> {
    pub fn frequency(f: f64) -> Self {
        Self {
            frequency: Some(f),
            periodogram: None,
        }
    }

    pub fn periodogram(periodogram: &'p Periodogram) -> Self {
        Self {
            frequency: None,
            periodogram: Some(periodogram),
        }
    }

    /// An explicit frequency wins over the periodogram peak.
    pub fn resolve(&self) -> Result<f64> {
        let f = self
            .frequency
            .or_else(|| self.periodogram.and_then(Periodogram::best_frequency))
            .ok_or(TimingError::MissingFrequencySource)?;
        require_positive("f", f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseogramState {
    Idle,
    Displaying,
    Closed,
}

impl PhaseogramState {
    pub fn name(self) -> &'static str {
        match self {
            PhaseogramState::Idle => "idle",
            PhaseogramState::Displaying => "displaying",
            PhaseogramState::Closed => "closed",
        }
    }
}

/// Displayed window of the folded image. A pure view transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomState {
    pub phase: Range<usize>,
    pub segments: Range<usize>,
    nph: usize,
    nt: usize,
}

impl ZoomState {
    pub fn full(nt: usize, nph: usize) -> Self {
        Self {
            phase: 0..nph,
            segments: 0..nt,
            nph,
            nt,
        }
    }

    pub fn is_full(&self) -> bool {
        self.phase == (0..self.nph) && self.segments == (0..self.nt)
    }

    pub fn zoom_in(&mut self) {
        let phase_width = (self.phase.len() / 2).max(2.min(self.nph));
        let segment_width = (self.segments.len() / 2).max(1.min(self.nt));
        self.phase = recentre(&self.phase, phase_width, self.nph);
        self.segments = recentre(&self.segments, segment_width, self.nt);
    }

    pub fn zoom_out(&mut self) {
        let phase_width = (self.phase.len() * 2).min(self.nph);
        let segment_width = (self.segments.len() * 2).min(self.nt);
        self.phase = recentre(&self.phase, phase_width, self.nph);
        self.segments = recentre(&self.segments, segment_width, self.nt);
    }
}

/// Window of `width` around the centre of `window`, kept inside `0..limit`.
fn recentre(window: &Range<usize>, width: usize, limit: usize) -> Range<usize> {
    let centre = (window.start + window.end) / 2;
    let start = centre.saturating_sub(width / 2).min(limit - width);
    start..start + width
}

#[derive(Debug, Clone)]
struct Session {
    model: TimingModel,
    image: FoldedImage,
    zoom: ZoomState,
}

#[derive(Debug)]
enum Stage {
    Idle,
    Displaying(Session),
    Closed,
}

impl Stage {
    fn state(&self) -> PhaseogramState {
        match self {
            Stage::Idle => PhaseogramState::Idle,
            Stage::Displaying(_) => PhaseogramState::Displaying,
            Stage::Closed => PhaseogramState::Closed,
        }
    }
}

fn invalid_state(operation: &'static str, state: PhaseogramState) -> TimingError {
    TimingError::InvalidState {
        operation,
        state: state.name(),
    }
}

fn displaying<'s>(stage: &'s mut Stage, operation: &'static str) -> Result<&'s mut Session> {
    match stage {
        Stage::Displaying(session) => Ok(session),
        other => Err(invalid_state(operation, other.state())),
    }
}

fn displaying_ref<'s>(stage: &'s Stage, operation: &'static str) -> Result<&'s Session> {
    match stage {
        Stage::Displaying(session) => Ok(session),
        other => Err(invalid_state(operation, other.state())),
    }
}

/// Interactive phaseogram over a borrowed event list.
pub struct Phaseogram<'a, S: RenderSurface> {
    events: &'a EventList,
    config: PhaseogramConfig,
    settings: FoldSettings,
    surface: S,
    stage: Stage,
    folds: usize,
}

impl<'a, S: RenderSurface> Phaseogram<'a, S> {
    pub fn new(events: &'a EventList, config: PhaseogramConfig, surface: S) -> Result<Self> {
        let settings = FoldSettings {
            nph: config.nph,
            nt: config.nt,
            reference_epoch: events.tstart(),
            normalize: config.normalize,
        };
        settings.validate()?;
        if config.harmonics == 0 {
            return Err(TimingError::invalid("harmonics", 0.0, "must be > 0"));
        }
        Ok(Self {
            events,
            config,
            settings,
            surface,
            stage: Stage::Idle,
            folds: 0,
        })
    }

    /// Builds the timing model from `seed`, opens the surface and shows the
    /// first fold. On failure the surface is released and the engine stays idle.
    pub fn initialize(&mut self, seed: FrequencySeed<'_>) -> Result<()> {
        if !matches!(self.stage, Stage::Idle) {
            return Err(invalid_state("initialize", self.state()));
        }
        let f = seed.resolve()?;
        let model = self.build_model(f)?;

        self.surface.open()?;
        let session = match self.first_session(model) {
            Ok(session) => session,
            Err(err) => {
                self.surface.close();
                return Err(err);
            }
        };
        self.stage = Stage::Displaying(session);
        info!(
            "phaseogram displaying ({:?} mode, f = {:.9} Hz, {} events)",
            self.config.mode,
            f,
            self.events.len()
        );
        Ok(())
    }

    fn build_model(&self, f: f64) -> Result<TimingModel> {
        let orbit = Orbit::circular(
            self.config.orbital_period.unwrap_or_else(|| self.events.tseg()),
            self.config.asini.unwrap_or(0.5 / f),
            self.config.orbit_t0.unwrap_or_else(|| self.events.tstart()),
        );
        let steps = self
            .config
            .steps
            .unwrap_or_else(|| TimingSteps::for_span(self.events.tseg(), orbit.period));
        TimingModel::new(
            f,
            self.config.fdot,
            self.config.fddot,
            orbit,
            self.config.mode,
            steps,
        )
    }

    fn first_session(&mut self, model: TimingModel) -> Result<Session> {
        let image = self.fold_model(&model)?;
        let zoom = ZoomState::full(self.settings.nt, self.settings.nph);
        present(&mut self.surface, &model, &image, &zoom, self.config.harmonics)?;
        Ok(Session { model, image, zoom })
    }

    fn fold_model(&mut self, model: &TimingModel) -> Result<FoldedImage> {
        let started = Instant::now();
        let image = fold(
            self.events.time(),
            self.events.gti(),
            &model.ephemeris(),
            &self.settings,
        )?;
        self.folds += 1;
        debug!(
            "fold #{} of {} photons into {}x{} in {:.1} ms",
            self.folds,
            image.photons(),
            image.nt(),
            image.nph(),
            started.elapsed().as_secs_f64() * 1e3
        );
        Ok(image)
    }

    /// Folds and draws `model`, committing both only when everything succeeded.
    fn refold(&mut self, operation: &'static str, model: TimingModel) -> Result<()> {
        displaying_ref(&self.stage, operation)?;
        let image = self.fold_model(&model)?;
        let session = displaying(&mut self.stage, operation)?;
        present(
            &mut self.surface,
            &model,
            &image,
            &session.zoom,
            self.config.harmonics,
        )?;
        session.model = model;
        session.image = image;
        Ok(())
    }

    /// Moves the active parameter (f, or the orbital period in binary mode) by
    /// one step in the direction of `direction`'s sign, then refolds.
    pub fn update(&mut self, direction: i32) -> Result<()> {
        let mut model = displaying_ref(&self.stage, "update")?.model.clone();
        let field = model.active_field();
        model.step(field, direction.signum())?;
        debug!("update {} -> {}", field.name(), model.get(field));
        self.refold("update", model)
    }

    /// Refolds with the current parameters.
    pub fn recalculate(&mut self) -> Result<()> {
        let model = displaying_ref(&self.stage, "recalculate")?.model.clone();
        self.refold("recalculate", model)
    }

    /// Restores the parameters present right after `initialize` and refolds.
    pub fn reset(&mut self) -> Result<()> {
        let mut model = displaying_ref(&self.stage, "reset")?.model.clone();
        model.reset();
        self.refold("reset", model)
    }

    pub fn zoom_in(&mut self, levels: u32) -> Result<()> {
        self.rezoom("zoom_in", |zoom| {
            for _ in 0..levels {
                zoom.zoom_in();
            }
        })
    }

    pub fn zoom_out(&mut self, levels: u32) -> Result<()> {
        self.rezoom("zoom_out", |zoom| {
            for _ in 0..levels {
                zoom.zoom_out();
            }
        })
    }

    /// Changes the window and redraws the existing image without folding.
    fn rezoom(
        &mut self,
        operation: &'static str,
        change: impl FnOnce(&mut ZoomState),
    ) -> Result<()> {
        let session = displaying(&mut self.stage, operation)?;
        let mut zoom = session.zoom.clone();
        change(&mut zoom);
        present(
            &mut self.surface,
            &session.model,
            &session.image,
            &zoom,
            self.config.harmonics,
        )?;
        debug!("{operation}: phase {:?}, segments {:?}", zoom.phase, zoom.segments);
        session.zoom = zoom;
        Ok(())
    }

    /// Assigns a model field directly. Nothing is refolded; the value is
    /// visible to the next [`get_values`](Self::get_values).
    pub fn set(&mut self, field: TimingField, value: f64) -> Result<()> {
        displaying(&mut self.stage, "set")?.model.set(field, value)
    }

    /// `(f, fdot, fddot)`, or `(orbital_period, fdot, fddot)` in binary mode.
    pub fn get_values(&self) -> Result<(f64, f64, f64)> {
        Ok(displaying_ref(&self.stage, "get_values")?.model.values())
    }

    pub fn model(&self) -> Result<TimingSnapshot> {
        Ok(displaying_ref(&self.stage, "read the model")?.model.snapshot())
    }

    pub fn image(&self) -> Result<&FoldedImage> {
        Ok(&displaying_ref(&self.stage, "read the image")?.image)
    }

    pub fn zoom(&self) -> Result<&ZoomState> {
        Ok(&displaying_ref(&self.stage, "read the zoom window")?.zoom)
    }

    /// Z^2_n of the displayed profile.
    pub fn z2n(&self) -> Result<f64> {
        let session = displaying_ref(&self.stage, "compute Z^2_n")?;
        Ok(z2n_from_profile(session.image.profile(), self.config.harmonics))
    }

    /// Releases the surface. Every later call fails.
    pub fn close(&mut self) -> Result<()> {
        match self.stage {
            Stage::Closed => return Err(invalid_state("close", PhaseogramState::Closed)),
            Stage::Displaying(_) => self.surface.close(),
            Stage::Idle => {}
        }
        self.stage = Stage::Closed;
        info!("phaseogram closed after {} folds", self.folds);
        Ok(())
    }

    pub fn state(&self) -> PhaseogramState {
        self.stage.state()
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &PhaseogramConfig {
        &self.config
    }

    pub fn events(&self) -> &'a EventList {
        self.events
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Folds performed so far.
    pub fn fold_count(&self) -> usize {
        self.folds
    }
}

impl<S: RenderSurface> Drop for Phaseogram<'_, S> {
    fn drop(&mut self) {
        if matches!(self.stage, Stage::Displaying(_)) {
            self.surface.close();
        }
    }
}

fn present<S: RenderSurface>(
    surface: &mut S,
    model: &TimingModel,
    image: &FoldedImage,
    zoom: &ZoomState,
    harmonics: usize,
) -> Result<()> {
    let z2n = z2n_from_profile(image.profile(), harmonics);
    let frame = Frame {
        image: image.view(zoom.segments.clone(), zoom.phase.clone()),
        segments: zoom.segments.clone(),
        phase: zoom.phase.clone(),
        shape: (image.nt(), image.nph()),
        segment_edges: image.segment_edges(),
        model: model.snapshot(),
        z2n,
    };
    surface.draw(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Gti;
    use crate::render::NullSurface;

    fn events() -> EventList {
        // 4 Hz pulse at phase 0.25 over 20 s with a light background
        let mut times: Vec<f64> = (0..80).map(|c| (c as f64 + 0.25) / 4.0).collect();
        times.extend((0..400).map(|i| (i as f64 * 0.6180339887).fract() * 20.0));
        times.sort_by(|a, b| a.total_cmp(b));
        EventList::new(times, vec![Gti::new(0.0, 20.0)]).unwrap()
    }

    fn config(mode: Mode) -> PhaseogramConfig {
        PhaseogramConfig {
            mode,
            nph: 16,
            nt: 8,
            ..Default::default()
        }
    }

    struct FailingSurface {
        open: bool,
        closed: usize,
    }

    impl RenderSurface for FailingSurface {
        fn open(&mut self) -> Result<()> {
            self.open = true;
            Ok(())
        }

        fn draw(&mut self, _frame: &Frame<'_>) -> Result<()> {
            Err(TimingError::Render("no display".to_string()))
        }

        fn close(&mut self) {
            self.open = false;
            self.closed += 1;
        }
    }

    #[test]
    fn operations_fail_fast_while_idle() {
        let ev = events();
        let mut pg = Phaseogram::new(&ev, config(Mode::Isolated), NullSurface::default()).unwrap();
        assert_eq!(pg.state(), PhaseogramState::Idle);
        assert!(matches!(
            pg.update(1),
            Err(TimingError::InvalidState { state: "idle", .. })
        ));
        assert!(pg.recalculate().is_err());
        assert!(pg.zoom_in(1).is_err());
        assert!(pg.get_values().is_err());
        assert_eq!(pg.fold_count(), 0);
    }

    #[test]
    fn missing_seed_keeps_the_surface_closed() {
        let ev = events();
        for mode in [Mode::Isolated, Mode::Binary] {
            let mut pg = Phaseogram::new(&ev, config(mode), NullSurface::default()).unwrap();
            let err = pg.initialize(FrequencySeed::default()).unwrap_err();
            assert!(matches!(err, TimingError::MissingFrequencySource));
            assert_eq!(err.to_string(), "missing frequency source");
            assert_eq!(pg.state(), PhaseogramState::Idle);
            assert_eq!(pg.surface().opened, 0);
        }
    }

    #[test]
    fn draw_failure_during_initialize_releases_the_surface() {
        let ev = events();
        let surface = FailingSurface {
            open: false,
            closed: 0,
        };
        let mut pg = Phaseogram::new(&ev, config(Mode::Isolated), surface).unwrap();
        assert!(matches!(
            pg.initialize(FrequencySeed::frequency(4.0)),
            Err(TimingError::Render(_))
        ));
        assert_eq!(pg.state(), PhaseogramState::Idle);
        assert!(!pg.surface().open);
        assert_eq!(pg.surface().closed, 1);
    }

    #[test]
    fn explicit_frequency_wins_over_periodogram() {
        let pg = Periodogram {
            freq: vec![3.0, 4.0],
            stat: vec![1.0, 2.0],
            peaks: vec![4.0],
            peak_stat: vec![2.0],
            n: 2,
            nbin: 16,
            tseg: 20.0,
        };
        let seed = FrequencySeed {
            frequency: Some(3.5),
            periodogram: Some(&pg),
        };
        assert_eq!(seed.resolve().unwrap(), 3.5);
        assert_eq!(FrequencySeed::periodogram(&pg).resolve().unwrap(), 4.0);
        assert!(FrequencySeed::frequency(-1.0).resolve().is_err());
    }

    #[test]
    fn update_moves_the_active_field() {
        let ev = events();
        let mut iso = Phaseogram::new(&ev, config(Mode::Isolated), NullSurface::default()).unwrap();
        iso.initialize(FrequencySeed::frequency(4.0)).unwrap();
        iso.update(1).unwrap();
        let (f, _, _) = iso.get_values().unwrap();
        assert!((f - (4.0 + 0.25 / 20.0)).abs() < 1e-12);
        iso.update(-3).unwrap();
        let (f, _, _) = iso.get_values().unwrap();
        assert!((f - 4.0).abs() < 1e-12);

        let mut bin = Phaseogram::new(&ev, config(Mode::Binary), NullSurface::default()).unwrap();
        bin.initialize(FrequencySeed::frequency(4.0)).unwrap();
        bin.update(1).unwrap();
        let (pb, _, _) = bin.get_values().unwrap();
        assert!((pb - 20.0 * 1.01).abs() < 1e-9);
        assert_eq!(bin.model().unwrap().f, 4.0);
    }

    #[test]
    fn invalid_update_leaves_model_and_image_untouched() {
        let ev = events();
        let steps = TimingSteps {
            f: 10.0,
            fdot: 0.0,
            fddot: 0.0,
            orbital_period: 1.0,
        };
        let mut pg = Phaseogram::new(
            &ev,
            PhaseogramConfig {
                steps: Some(steps),
                ..config(Mode::Isolated)
            },
            NullSurface::default(),
        )
        .unwrap();
        pg.initialize(FrequencySeed::frequency(4.0)).unwrap();
        let before = pg.image().unwrap().clone();
        let folds = pg.fold_count();
        assert!(matches!(
            pg.update(-1),
            Err(TimingError::InvalidParameter { name: "f", .. })
        ));
        assert_eq!(pg.get_values().unwrap().0, 4.0);
        assert_eq!(pg.image().unwrap(), &before);
        assert_eq!(pg.fold_count(), folds);
    }

    #[test]
    fn zoom_redraws_without_folding() {
        let ev = events();
        let mut pg = Phaseogram::new(&ev, config(Mode::Binary), NullSurface::default()).unwrap();
        pg.initialize(FrequencySeed::frequency(4.0)).unwrap();
        let values = pg.get_values().unwrap();
        let folds = pg.fold_count();
        let draws = pg.surface().draws;

        pg.zoom_in(1).unwrap();
        assert_eq!(pg.zoom().unwrap().phase, 4..12);
        assert_eq!(pg.zoom().unwrap().segments, 2..6);
        pg.zoom_in(5).unwrap();
        assert_eq!(pg.zoom().unwrap().phase.len(), 2);
        assert_eq!(pg.zoom().unwrap().segments.len(), 1);
        pg.zoom_out(10).unwrap();
        assert!(pg.zoom().unwrap().is_full());

        assert_eq!(pg.fold_count(), folds);
        assert_eq!(pg.surface().draws, draws + 3);
        assert_eq!(pg.get_values().unwrap(), values);
    }

    #[test]
    fn close_is_terminal() {
        let ev = events();
        let mut pg = Phaseogram::new(&ev, config(Mode::Isolated), NullSurface::default()).unwrap();
        pg.initialize(FrequencySeed::frequency(4.0)).unwrap();
        pg.close().unwrap();
        assert_eq!(pg.state(), PhaseogramState::Closed);
        assert!(!pg.surface().is_open);
        assert_eq!(pg.surface().closed, 1);
        for result in [
            pg.update(1),
            pg.recalculate(),
            pg.reset(),
            pg.zoom_in(1),
            pg.zoom_out(1),
            pg.close(),
            pg.initialize(FrequencySeed::frequency(4.0)),
        ] {
            assert!(matches!(
                result,
                Err(TimingError::InvalidState { state: "closed", .. })
            ));
        }
        assert!(pg.get_values().is_err());
    }

    #[test]
    fn displayed_statistic_tracks_the_alignment() {
        let ev = events();
        let mut pg = Phaseogram::new(&ev, config(Mode::Isolated), NullSurface::default()).unwrap();
        pg.initialize(FrequencySeed::frequency(4.0)).unwrap();
        let aligned = pg.z2n().unwrap();
        pg.update(1).unwrap();
        pg.update(1).unwrap();
        assert!(pg.z2n().unwrap() < aligned);
        pg.reset().unwrap();
        assert!((pg.z2n().unwrap() - aligned).abs() < 1e-9);
    }

    #[test]
    fn recentred_windows_stay_in_bounds() {
        assert_eq!(recentre(&(0..16), 8, 16), 4..12);
        assert_eq!(recentre(&(12..16), 8, 16), 8..16);
        assert_eq!(recentre(&(0..2), 8, 16), 0..8);
    }
}
