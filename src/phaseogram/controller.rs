use std::io::{BufRead, Write};

use anyhow::{anyhow, Result};
use tracing::warn;

use xtiming::{Mode, Phaseogram, RenderSurface, TimingField};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Update(i32),
    Recalculate,
    Reset,
    ZoomIn(u32),
    ZoomOut(u32),
    Set(TimingField, f64),
    Values,
    Help,
    Quit,
}

pub(crate) fn parse_command(line: &str) -> Result<Command> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(Command::Values);
    };
    let count = |arg: Option<&str>| -> Result<u32> {
        match arg {
            Some(v) => v.parse::<u32>().map_err(|_| anyhow!("invalid count '{v}'")),
            None => Ok(1),
        }
    };

    let steps = |n: u32| i32::try_from(n).map_err(|_| anyhow!("step count {n} is out of range"));

    let command = match word.to_ascii_lowercase().as_str() {
        "+" | "up" => Command::Update(steps(count(parts.next())?)?),
        "-" | "down" => Command::Update(-steps(count(parts.next())?)?),
        "r" | "recalc" | "recalculate" => Command::Recalculate,
        "reset" => Command::Reset,
        "zi" | "zoom-in" => Command::ZoomIn(count(parts.next())?),
        "zo" | "zoom-out" => Command::ZoomOut(count(parts.next())?),
        "set" => {
            let field = parts
                .next()
                .ok_or_else(|| anyhow!("usage: set <field> <value>"))?
                .parse::<TimingField>()
                .map_err(|e| anyhow!(e))?;
            let value = parts
                .next()
                .ok_or_else(|| anyhow!("usage: set <field> <value>"))?
                .parse::<f64>()
                .map_err(|_| anyhow!("invalid value"))?;
            Command::Set(field, value)
        }
        "v" | "values" => Command::Values,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => return Err(anyhow!("unknown command '{other}' (h for help)")),
    };
    Ok(command)
}

const HELP: &str = "\
  + [n] / - [n]        step the active parameter up/down n times
  r                    refold with the current values
  reset                restore the initial values
  zi [n] / zo [n]      zoom the displayed window in/out
  set <field> <value>  assign f, fdot, fddot, pb, asini or t0 (no refold)
  v                    print the current values
  q                    finish";

pub(crate) fn describe_values<S: RenderSurface>(pg: &Phaseogram<'_, S>) -> Result<String> {
    let (first, fdot, fddot) = pg.get_values()?;
    let label = match pg.mode() {
        Mode::Isolated => "f",
        Mode::Binary => "orbital_period",
    };
    Ok(format!(
        "{label} = {first:.12}  fdot = {fdot:.6e}  fddot = {fddot:.6e}  Z^2 = {:.2}",
        pg.z2n()?
    ))
}

/// Applies one command. Returns `false` once the user asked to stop.
pub(crate) fn dispatch<S: RenderSurface>(
    pg: &mut Phaseogram<'_, S>,
    command: Command,
) -> Result<bool> {
    // one step per call, so a multi-step update stops at the first invalid value
    match command {
        Command::Update(n) => {
            for _ in 0..n.unsigned_abs() {
                pg.update(n.signum())?;
            }
        }
        Command::Recalculate => pg.recalculate()?,
        Command::Reset => pg.reset()?,
        Command::ZoomIn(n) => pg.zoom_in(n)?,
        Command::ZoomOut(n) => pg.zoom_out(n)?,
        Command::Set(field, value) => pg.set(field, value)?,
        Command::Values | Command::Help => {}
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Reads commands until `q` or end of input. Failed commands are reported
/// and the session continues with the previous state.
pub(crate) fn run<S, R, W>(pg: &mut Phaseogram<'_, S>, input: R, mut out: W) -> Result<()>
where
    S: RenderSurface,
    R: BufRead,
    W: Write,
{
    writeln!(out, "{}", describe_values(pg)?)?;
    writeln!(out, "{HELP}")?;
    for line in input.lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err}")?;
                continue;
            }
        };
        if command == Command::Help {
            writeln!(out, "{HELP}")?;
            continue;
        }
        match dispatch(pg, command) {
            Ok(true) => writeln!(out, "{}", describe_values(pg)?)?,
            Ok(false) => break,
            Err(err) => {
                warn!("command '{}' failed: {err}", line.trim());
                writeln!(out, "error: {err}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtiming::{EventList, FrequencySeed, Gti, NullSurface, PhaseogramConfig};

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("+").unwrap(), Command::Update(1));
        assert_eq!(parse_command("- 3").unwrap(), Command::Update(-3));
        assert_eq!(parse_command("zi 2").unwrap(), Command::ZoomIn(2));
        assert_eq!(
            parse_command("set fdot -1e-10").unwrap(),
            Command::Set(TimingField::Fdot, -1e-10)
        );
        assert_eq!(parse_command("").unwrap(), Command::Values);
        assert!(parse_command("set fdot").is_err());
        assert!(parse_command("jump").is_err());
    }

    #[test]
    fn oversized_step_counts_are_rejected() {
        assert!(parse_command("- 2147483648").is_err());
        assert!(parse_command("+ 3000000000").is_err());
        assert!(parse_command("+ -1").is_err());
        assert_eq!(
            parse_command("- 2147483647").unwrap(),
            Command::Update(-2147483647)
        );
    }

    #[test]
    fn scripted_session_reports_values_and_survives_errors() {
        let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05 + 0.01).collect();
        let events = EventList::new(times, vec![Gti::new(0.0, 10.0)]).unwrap();
        let config = PhaseogramConfig {
            nph: 8,
            nt: 4,
            ..Default::default()
        };
        let mut pg = Phaseogram::new(&events, config, NullSurface::default()).unwrap();
        pg.initialize(FrequencySeed::frequency(2.0)).unwrap();

        let script = "+\nset f -1\nset fdot 2\nzi\nbogus\nq\n+\n";
        let mut out = Vec::new();
        run(&mut pg, script.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("error: invalid parameter f"));
        assert!(text.contains("unknown command 'bogus'"));
        let (f, fdot, _) = pg.get_values().unwrap();
        assert!((f - 2.025).abs() < 1e-12);
        assert_eq!(fdot, 2.0);
    }
}
