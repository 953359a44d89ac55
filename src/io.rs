//! Plain-text event lists and periodogram tables.
//!
//! Event file:
//! ```text
//! # gti 0.0 25.25
//! 0.0123
//! 0.0457
//! ```
//!
//! Periodogram file:
//! ```text
//! # n 2
//! # nbin 64
//! # tseg 25.25
//! # peak 9.901 512.3
//! 9.85 3.2
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TimingError};
use crate::events::{EventList, Gti};
use crate::search::Periodogram;

fn parse_f64(value: &str, line: usize, what: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| TimingError::Parse {
        line,
        reason: format!("invalid {what} '{value}'"),
    })
}

fn parse_usize(value: &str, line: usize, what: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| TimingError::Parse {
        line,
        reason: format!("invalid {what} '{value}'"),
    })
}

/// Splits a `# key v1 v2 ...` header line. Plain comments return `None`.
fn header_fields(line: &str) -> Option<(String, Vec<&str>)> {
    let rest = line.strip_prefix('#')?;
    let mut parts = rest.split_whitespace();
    let key = parts.next()?.to_ascii_lowercase();
    Some((key, parts.collect()))
}

fn expect_fields<'l>(
    values: &[&'l str],
    count: usize,
    line: usize,
    key: &str,
) -> Result<Vec<&'l str>> {
    if values.len() < count {
        return Err(TimingError::Parse {
            line,
            reason: format!("'# {key}' needs {count} values"),
        });
    }
    Ok(values[..count].to_vec())
}

pub fn read_events(path: &Path) -> Result<EventList> {
    let reader = BufReader::new(File::open(path)?);
    let mut times = Vec::new();
    let mut gtis = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((key, values)) = header_fields(trimmed) {
            if key == "gti" {
                let v = expect_fields(&values, 2, line_no, "gti")?;
                gtis.push(Gti::new(
                    parse_f64(v[0], line_no, "GTI start")?,
                    parse_f64(v[1], line_no, "GTI end")?,
                ));
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let first = trimmed.split_whitespace().next().unwrap_or(trimmed);
        times.push(parse_f64(first, line_no, "arrival time")?);
    }

    EventList::new(times, gtis)
}

pub fn write_events(path: &Path, events: &EventList) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for gti in events.gti() {
        writeln!(writer, "# gti {:.12} {:.12}", gti.start, gti.end)?;
    }
    for t in events.time() {
        writeln!(writer, "{t:.12}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_periodogram(path: &Path) -> Result<Periodogram> {
    let reader = BufReader::new(File::open(path)?);
    let mut periodogram = Periodogram {
        freq: Vec::new(),
        stat: Vec::new(),
        peaks: Vec::new(),
        peak_stat: Vec::new(),
        n: 2,
        nbin: 0,
        tseg: 0.0,
    };

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((key, values)) = header_fields(trimmed) {
            match key.as_str() {
                "n" => {
                    let v = expect_fields(&values, 1, line_no, "n")?;
                    periodogram.n = parse_usize(v[0], line_no, "harmonic count")?;
                }
                "nbin" => {
                    let v = expect_fields(&values, 1, line_no, "nbin")?;
                    periodogram.nbin = parse_usize(v[0], line_no, "bin count")?;
                }
                "tseg" => {
                    let v = expect_fields(&values, 1, line_no, "tseg")?;
                    periodogram.tseg = parse_f64(v[0], line_no, "tseg")?;
                }
                "peak" => {
                    let v = expect_fields(&values, 2, line_no, "peak")?;
                    periodogram.peaks.push(parse_f64(v[0], line_no, "peak frequency")?);
                    periodogram.peak_stat.push(parse_f64(v[1], line_no, "peak statistic")?);
                }
                _ => {}
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let (Some(f), Some(s)) = (parts.next(), parts.next()) else {
            return Err(TimingError::Parse {
                line: line_no,
                reason: "expected 'freq stat'".to_string(),
            });
        };
        periodogram.freq.push(parse_f64(f, line_no, "frequency")?);
        periodogram.stat.push(parse_f64(s, line_no, "statistic")?);
    }

    Ok(periodogram)
}

pub fn write_periodogram(path: &Path, periodogram: &Periodogram) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "# n {}", periodogram.n)?;
    writeln!(writer, "# nbin {}", periodogram.nbin)?;
    writeln!(writer, "# tseg {:.9}", periodogram.tseg)?;
    for (f, s) in periodogram.peaks.iter().zip(periodogram.peak_stat.iter()) {
        writeln!(writer, "# peak {f:.12} {s:.6}")?;
    }
    for (f, s) in periodogram.freq.iter().zip(periodogram.stat.iter()) {
        writeln!(writer, "{f:.12} {s:.6}")?;
    }
    writer.flush()?;
    Ok(())
}

/// `<dir>/<stem>_<suffix>` next to `input`, with any extension dropped.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("events");
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}_{suffix}"))
}
