use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xtiming::io::{read_events, sibling_path, write_periodogram};
use xtiming::render::plot_periodogram;
use xtiming::{z2n_search, SearchConfig};

#[derive(Parser, Debug)]
#[command(
    name = "zsearch",
    about = "Z^2_n epoch-folding search over an X-ray event list",
    long_about = "Folds the event list at every trial frequency between --fmin and --fmax\n\
    and computes the Z^2_n statistic of each folded profile. The trial step is\n\
    1 / (oversample * T), with T the span of the GTIs. The periodogram is written\n\
    next to the input as <stem>_Z2n.txt."
)]
struct Cli {
    /// Event file (one arrival time per line, '# gti start end' headers)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Lowest trial frequency [Hz]
    #[arg(short = 'f', long = "fmin", value_name = "HZ")]
    fmin: f64,

    /// Highest trial frequency [Hz]
    #[arg(short = 'F', long = "fmax", value_name = "HZ")]
    fmax: f64,

    /// Phase bins of each folded profile
    #[arg(short = 'n', long = "nbin", default_value_t = 64)]
    nbin: usize,

    /// Harmonics summed in Z^2_n
    #[arg(short = 'N', long = "harmonics", default_value_t = 2)]
    harmonics: usize,

    /// Trial frequencies per Fourier resolution element
    #[arg(long, default_value_t = 2.0)]
    oversample: f64,

    /// Refine each candidate with a quadratic fit of the peak
    #[arg(long, default_value_t = false)]
    fit_candidates: bool,

    /// Fit the peak nearest this frequency and report it first [Hz]
    #[arg(long, value_name = "HZ")]
    fit_frequency: Option<f64>,

    /// Number of candidates to report
    #[arg(long, default_value_t = 5)]
    max_candidates: usize,

    /// Also write <stem>_Z2n.png
    #[arg(long, default_value_t = false)]
    plot: bool,

    /// Output periodogram path (default: <stem>_Z2n.txt next to the input)
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
                .unwrap_or_else(|_| "xtiming=info,zsearch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let events = read_events(&cli.input)
        .with_context(|| format!("failed to read events from {:?}", cli.input))?;

    let config = SearchConfig {
        fmin: cli.fmin,
        fmax: cli.fmax,
        nbin: cli.nbin,
        n: cli.harmonics,
        oversample: cli.oversample,
        fit_candidates: cli.fit_candidates,
        fit_frequency: cli.fit_frequency,
        max_candidates: cli.max_candidates,
    };
    let periodogram = z2n_search(events.time(), events.gti(), &config)?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| sibling_path(&cli.input, "Z2n.txt"));
    write_periodogram(&output, &periodogram)
        .with_context(|| format!("failed to write {:?}", output))?;

    println!("#################### Z^2_{} search ####################", periodogram.n);
    println!("events              : {}", events.len());
    println!("span T              : {:.3} s", periodogram.tseg);
    println!("trial frequencies   : {}", periodogram.freq.len());
    for (rank, (f, s)) in periodogram
        .peaks
        .iter()
        .zip(periodogram.peak_stat.iter())
        .enumerate()
    {
        println!(
            "candidate {:>2}        : {:.9} Hz  Z^2_{} = {:.2}",
            rank + 1,
            f,
            periodogram.n,
            s
        );
    }
    println!("periodogram         : {}", output.display());

    if cli.plot {
        let png = output.with_extension("png");
        plot_periodogram(&png, &periodogram)
            .with_context(|| format!("failed to plot {:?}", png))?;
        println!("plot                : {}", png.display());
    }
    Ok(())
}
