use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xtiming::io::{read_events, read_periodogram, sibling_path};
use xtiming::{
    EventList, FrequencySeed, Mode, NullSurface, Periodogram, Phaseogram, PhaseogramConfig,
    PlotSurface, RenderSurface,
};

mod controller;

#[derive(Parser, Debug)]
#[command(
    name = "phaseogram",
    about = "Interactive phaseogram for refining pulse frequency, derivatives and orbital period",
    long_about = "Folds the event list into time segments x phase bins and lets you nudge\n\
    the timing parameters until the pulse lines up vertically. The initial frequency\n\
    comes from -f or from the best candidate of a periodogram written by zsearch.\n\
    With --binary the orbital period is the stepped parameter."
)]
struct Cli {
    /// Event file (one arrival time per line, '# gti start end' headers)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Initial pulse frequency [Hz]
    #[arg(short = 'f', long = "freq", value_name = "HZ")]
    freq: Option<f64>,

    /// Periodogram from zsearch; its best candidate seeds the frequency
    #[arg(long, value_name = "FILE")]
    periodogram: Option<PathBuf>,

    /// Refine a binary orbit (the orbital period becomes the stepped parameter)
    #[arg(long, default_value_t = false)]
    binary: bool,

    /// Phase bins
    #[arg(long, default_value_t = 64)]
    nph: usize,

    /// Time segments
    #[arg(long, default_value_t = 32)]
    nt: usize,

    /// Initial frequency derivative [Hz/s]
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    fdot: f64,

    /// Initial second frequency derivative [Hz/s^2]
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    fddot: f64,

    /// Initial orbital period [s] (default: observation span)
    #[arg(long, value_name = "SECONDS")]
    orbital_period: Option<f64>,

    /// Projected semi-major axis [light-s] (default: half a pulse period)
    #[arg(long, value_name = "LT_S")]
    asini: Option<f64>,

    /// Epoch of the ascending node [s] (default: observation start)
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true)]
    t0: Option<f64>,

    /// Keep raw counts instead of scaling each segment to unit mean
    #[arg(long, default_value_t = false)]
    no_normalize: bool,

    /// Headless run: fold once without a display or command loop and print the values
    #[arg(long, default_value_t = false)]
    test: bool,

    /// Phaseogram image (default: <stem>_phaseogram.png next to the input)
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    if std::env::args_os().len() == 1 {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xtiming=info,phaseogram=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(&Cli::parse())
}

fn run(cli: &Cli) -> Result<()> {
    let events = read_events(&cli.input)
        .with_context(|| format!("failed to read events from {:?}", cli.input))?;
    let periodogram: Option<Periodogram> = cli
        .periodogram
        .as_ref()
        .map(|path| {
            read_periodogram(path).with_context(|| format!("failed to read periodogram {:?}", path))
        })
        .transpose()?;

    let config = PhaseogramConfig {
        mode: if cli.binary { Mode::Binary } else { Mode::Isolated },
        nph: cli.nph,
        nt: cli.nt,
        normalize: !cli.no_normalize,
        fdot: cli.fdot,
        fddot: cli.fddot,
        orbital_period: cli.orbital_period,
        asini: cli.asini,
        orbit_t0: cli.t0,
        ..Default::default()
    };
    let seed = FrequencySeed {
        frequency: cli.freq,
        periodogram: periodogram.as_ref(),
    };

    if cli.test {
        run_session(&events, config, seed, NullSurface::default(), false)
    } else {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| sibling_path(&cli.input, "phaseogram.png"));
        println!("phaseogram image     : {}", output.display());
        run_session(&events, config, seed, PlotSurface::new(output), true)
    }
}

fn run_session<S: RenderSurface>(
    events: &EventList,
    config: PhaseogramConfig,
    seed: FrequencySeed<'_>,
    surface: S,
    interactive: bool,
) -> Result<()> {
    let mut pg = Phaseogram::new(events, config, surface)?;
    pg.initialize(seed)?;

    if interactive {
        let stdin = io::stdin();
        controller::run(&mut pg, stdin.lock(), io::stdout())?;
    }

    let model = pg.model()?;
    println!("#################### final values ####################");
    println!("{}", controller::describe_values(&pg)?);
    println!("f                    : {:.12} Hz", model.f);
    println!("fdot                 : {:.6e} Hz/s", model.fdot);
    println!("fddot                : {:.6e} Hz/s^2", model.fddot);
    if model.mode.is_binary() {
        println!("orbital period       : {:.6} s", model.orbit.period);
        println!("asini                : {:.6} lt-s", model.orbit.asini);
        println!("t0                   : {:.6} s", model.orbit.t0);
    }
    pg.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtiming::io::write_events;
    use xtiming::{Gti, TimingError};

    fn events_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("events.txt");
        let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05 + 0.01).collect();
        let events = EventList::new(times, vec![Gti::new(0.0, 10.0)]).unwrap();
        write_events(&path, &events).unwrap();
        path
    }

    #[test]
    fn headless_run_needs_a_frequency_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = events_file(&dir);
        for extra in [None, Some("--binary")] {
            let mut argv = vec!["phaseogram", input.to_str().unwrap(), "--test"];
            argv.extend(extra);
            let cli = Cli::try_parse_from(argv).unwrap();
            let err = run(&cli).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TimingError>(),
                Some(TimingError::MissingFrequencySource)
            ));
        }
    }

    #[test]
    fn headless_run_with_a_frequency_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = events_file(&dir);
        for extra in [None, Some("--binary")] {
            let mut argv = vec!["phaseogram", input.to_str().unwrap(), "--test", "-f", "2.0"];
            argv.extend(extra);
            let cli = Cli::try_parse_from(argv).unwrap();
            run(&cli).unwrap();
        }
    }

    #[test]
    fn session_with_a_null_surface_closes_cleanly() {
        let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05 + 0.01).collect();
        let events = EventList::new(times, vec![Gti::new(0.0, 10.0)]).unwrap();
        for mode in [Mode::Isolated, Mode::Binary] {
            let config = PhaseogramConfig {
                mode,
                nph: 8,
                nt: 4,
                ..Default::default()
            };
            let missing = run_session(
                &events,
                config.clone(),
                FrequencySeed::default(),
                NullSurface::default(),
                false,
            );
            assert!(missing.is_err());
            run_session(
                &events,
                config,
                FrequencySeed::frequency(2.0),
                NullSurface::default(),
                false,
            )
            .unwrap();
        }
    }
}
