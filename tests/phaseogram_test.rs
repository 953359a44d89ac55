use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;

use xtiming::io::{read_periodogram, write_periodogram};
use xtiming::{
    z2n_search, EventList, FrequencySeed, Gti, Mode, NullSurface, Periodogram, Phaseogram,
    PhaseogramConfig, PhaseogramState, SearchConfig, TimingError, TimingField,
};

const PERIOD: f64 = 0.101;
const TSEG: f64 = 25.25;

/// Sinusoidally modulated light curve at 1/0.101 Hz, 0.00606 s bins.
fn pulsed_events(seed: u64) -> EventList {
    let f = 1.0 / PERIOD;
    let dt = 0.00606;
    let nbins = (TSEG / dt).ceil() as usize;
    let times: Vec<f64> = (0..nbins).map(|i| i as f64 * dt + dt / 2.0).collect();
    let counts: Vec<f64> = times
        .iter()
        .map(|t| 100.0 + 20.0 * (2.0 * PI * t * f).cos())
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    EventList::simulate(&times, &counts, vec![Gti::new(0.0, TSEG)], &mut rng).unwrap()
}

fn search(events: &EventList) -> Periodogram {
    let config = SearchConfig {
        fmin: 9.85,
        fmax: 9.95,
        nbin: 64,
        fit_candidates: true,
        fit_frequency: Some(1.0 / PERIOD),
        ..Default::default()
    };
    z2n_search(events.time(), events.gti(), &config).unwrap()
}

fn config(mode: Mode) -> PhaseogramConfig {
    PhaseogramConfig {
        mode,
        ..Default::default()
    }
}

#[test]
fn search_finds_the_pulse_and_round_trips_through_disk() {
    let events = pulsed_events(42);
    let periodogram = search(&events);
    assert_eq!(periodogram.n, 2);
    assert!((periodogram.peaks[0] - 1.0 / PERIOD).abs() < 1.0 / TSEG);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events_Z2n.txt");
    write_periodogram(&path, &periodogram).unwrap();
    let back = read_periodogram(&path).unwrap();
    assert_eq!(back.freq.len(), periodogram.freq.len());
    assert!((back.best_frequency().unwrap() - periodogram.peaks[0]).abs() < 1e-9);
}

#[test]
fn phaseogram_starts_from_a_periodogram_or_a_frequency() {
    let events = pulsed_events(42);
    let periodogram = search(&events);

    for mode in [Mode::Isolated, Mode::Binary] {
        let mut from_search =
            Phaseogram::new(&events, config(mode), NullSurface::default()).unwrap();
        from_search
            .initialize(FrequencySeed::periodogram(&periodogram))
            .unwrap();
        assert_eq!(from_search.state(), PhaseogramState::Displaying);
        assert_eq!(from_search.model().unwrap().f, periodogram.peaks[0]);

        let mut from_freq = Phaseogram::new(&events, config(mode), NullSurface::default()).unwrap();
        from_freq.initialize(FrequencySeed::frequency(9.9)).unwrap();
        assert_eq!(from_freq.model().unwrap().f, 9.9);
        from_freq.close().unwrap();

        let mut unseeded = Phaseogram::new(&events, config(mode), NullSurface::default()).unwrap();
        let err = unseeded.initialize(FrequencySeed::default()).unwrap_err();
        assert!(matches!(err, TimingError::MissingFrequencySource));
        assert_eq!(unseeded.state(), PhaseogramState::Idle);
    }
}

#[test]
fn isolated_session_refines_and_reports_values() {
    let events = pulsed_events(42);
    let mut pg = Phaseogram::new(&events, config(Mode::Isolated), NullSurface::default()).unwrap();
    pg.initialize(FrequencySeed::frequency(9.9)).unwrap();

    pg.update(1).unwrap();
    pg.recalculate().unwrap();
    pg.reset().unwrap();
    assert_eq!(pg.get_values().unwrap(), (9.9, 0.0, 0.0));

    pg.set(TimingField::Fdot, 2.0).unwrap();
    let (f, fdot, fddot) = pg.get_values().unwrap();
    assert_eq!(f, 9.9);
    assert_eq!(fdot, 2.0);
    assert_eq!(fddot, 0.0);
    pg.close().unwrap();
}

#[test]
fn binary_session_steps_the_orbital_period() {
    let events = pulsed_events(42);
    let mut pg = Phaseogram::new(&events, config(Mode::Binary), NullSurface::default()).unwrap();
    pg.initialize(FrequencySeed::frequency(9.9)).unwrap();
    let initial = pg.get_values().unwrap();
    assert!((initial.0 - events.tseg()).abs() < 1e-9);

    pg.update(1).unwrap();
    assert!(pg.get_values().unwrap().0 > initial.0);
    pg.recalculate().unwrap();
    pg.reset().unwrap();
    assert_eq!(pg.get_values().unwrap(), initial);
    pg.zoom_in(1).unwrap();
    pg.zoom_out(1).unwrap();
    assert!(pg.zoom().unwrap().is_full());

    pg.set(TimingField::OrbitalPeriod, 2.0).unwrap();
    assert_eq!(pg.get_values().unwrap().0, 2.0);
    assert_eq!(pg.model().unwrap().f, 9.9);
    pg.close().unwrap();
}

#[test]
fn reset_is_idempotent_and_zoom_leaves_the_model_alone() {
    let events = pulsed_events(42);
    let mut pg = Phaseogram::new(&events, config(Mode::Isolated), NullSurface::default()).unwrap();
    pg.initialize(FrequencySeed::frequency(9.9)).unwrap();
    let initial_image = pg.image().unwrap().clone();

    pg.update(1).unwrap();
    pg.update(1).unwrap();
    pg.reset().unwrap();
    let once = pg.get_values().unwrap();
    pg.reset().unwrap();
    assert_eq!(pg.get_values().unwrap(), once);
    assert_eq!(pg.image().unwrap(), &initial_image);

    let folds = pg.fold_count();
    pg.zoom_in(2).unwrap();
    pg.zoom_out(1).unwrap();
    assert_eq!(pg.get_values().unwrap(), once);
    assert_eq!(pg.image().unwrap(), &initial_image);
    assert_eq!(pg.fold_count(), folds);
}

#[test]
fn folding_is_deterministic_for_a_fixed_seed() {
    let first = pulsed_events(7);
    let second = pulsed_events(7);
    assert_eq!(first, second);

    let mut a = Phaseogram::new(&first, config(Mode::Isolated), NullSurface::default()).unwrap();
    let mut b = Phaseogram::new(&second, config(Mode::Isolated), NullSurface::default()).unwrap();
    a.initialize(FrequencySeed::frequency(9.9)).unwrap();
    b.initialize(FrequencySeed::frequency(9.9)).unwrap();
    assert_eq!(a.image().unwrap(), b.image().unwrap());
    assert_eq!(a.z2n().unwrap(), b.z2n().unwrap());
}

#[test]
fn aligned_fold_beats_a_misaligned_one() {
    let events = pulsed_events(42);
    let mut pg = Phaseogram::new(&events, config(Mode::Isolated), NullSurface::default()).unwrap();
    pg.initialize(FrequencySeed::frequency(1.0 / PERIOD)).unwrap();
    let aligned = pg.z2n().unwrap();
    for _ in 0..4 {
        pg.update(1).unwrap();
    }
    assert!(pg.z2n().unwrap() < aligned);
}
