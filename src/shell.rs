use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::alarm::model::{AlarmCreateInfo, DelayUnit};
use crate::alarm::scheduler::{AlarmScheduler, now_unix_ms};
use crate::alert::AlertSound;
use crate::display::{AlarmRow, CANCEL_BUTTON_TAG, ClickTarget};
use crate::manager::{AlarmManager, RefreshOutcome};

pub const USAGE: &str = "\
commands:
  create <name> <delay> <ms|min> [period-min]
  cancel <name>
  clear-all
  clear
  stop
  refresh
  show
  log [n]
  wait <ms>
  help
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        name: String,
        delay: f64,
        unit: DelayUnit,
        period: Option<f64>,
    },
    Cancel {
        name: String,
    },
    ClearAll,
    Clear,
    Stop,
    Refresh,
    Show,
    Log {
        limit: Option<usize>,
    },
    Wait {
        ms: u64,
    },
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args = words.collect::<Vec<_>>();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("create", [name, delay, unit, rest @ ..]) if rest.len() <= 1 => Command::Create {
            name: (*name).to_string(),
            delay: parse_number(delay, "delay")?,
            unit: unit.parse::<DelayUnit>()?,
            period: rest
                .first()
                .map(|period| parse_number(period, "period"))
                .transpose()?,
        },
        ("cancel", [name]) => Command::Cancel {
            name: (*name).to_string(),
        },
        ("clear-all", []) => Command::ClearAll,
        ("clear", []) => Command::Clear,
        ("stop", []) => Command::Stop,
        ("refresh", []) => Command::Refresh,
        ("show", []) => Command::Show,
        ("log", []) => Command::Log { limit: None },
        ("log", [limit]) => Command::Log {
            limit: Some(
                limit
                    .parse()
                    .with_context(|| format!("invalid log limit '{limit}'"))?,
            ),
        },
        ("wait", [ms]) => Command::Wait {
            ms: ms
                .parse()
                .with_context(|| format!("invalid wait duration '{ms}'"))?,
        },
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (
            "create" | "cancel" | "clear-all" | "clear" | "stop" | "refresh" | "show" | "log"
            | "wait" | "help" | "quit" | "exit",
            _,
        ) => bail!("wrong arguments for '{verb}'"),
        _ => bail!("unknown command '{verb}'"),
    };
    Ok(Some(command))
}

fn parse_number(text: &str, field: &str) -> Result<f64> {
    let value = text
        .parse::<f64>()
        .map_err(|_| anyhow!("invalid {field} '{text}', expected a number"))?;
    if !value.is_finite() {
        bail!("invalid {field} '{text}', expected a finite number");
    }
    Ok(value)
}

/// Reads commands line by line until EOF or `quit`, then prints the log.
pub async fn run_shell<S, A, R, W>(
    manager: &AlarmManager<S, A>,
    input: R,
    out: &mut W,
) -> Result<()>
where
    S: AlarmScheduler,
    A: AlertSound,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read command")? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("error: {err:#}");
                eprintln!("{USAGE}");
                continue;
            }
        };
        if execute(manager, command, out).await? == Flow::Quit {
            break;
        }
    }

    writeln!(out, "--- log ---")?;
    print_log(manager, None, out)?;
    out.flush()?;
    Ok(())
}

async fn execute<S, A, W>(
    manager: &AlarmManager<S, A>,
    command: Command,
    out: &mut W,
) -> Result<Flow>
where
    S: AlarmScheduler,
    A: AlertSound,
    W: Write,
{
    match command {
        Command::Create {
            name,
            delay,
            unit,
            period,
        } => {
            let info = AlarmCreateInfo::from_form(delay, unit, period, now_unix_ms());
            let entry = manager.create_alarm(&name, &info).await;
            writeln!(out, "{entry}")?;
        }
        Command::Cancel { name } => {
            // Click the rendered row's cancel button; a name not on screen
            // still reaches the scheduler so the miss gets logged.
            let target = manager
                .rows()
                .iter()
                .find(|row| row.name == name)
                .map(AlarmRow::cancel_target)
                .unwrap_or_else(|| ClickTarget::new(CANCEL_BUTTON_TAG, Some(name)));
            if let Some(entry) = manager.handle_click(&target).await {
                writeln!(out, "{entry}")?;
            }
        }
        Command::ClearAll => {
            let reported = manager.cancel_all_alarms().await;
            writeln!(out, "{}", reported.entry)?;
            manager.refresh_display().await;
        }
        Command::Clear => manager.clear_display(),
        Command::Stop => manager.stop_alert(),
        Command::Refresh => match manager.refresh_display().await {
            RefreshOutcome::Rendered(count) => writeln!(out, "{count} alarm(s)")?,
            RefreshOutcome::Skipped => writeln!(out, "refresh already running")?,
            RefreshOutcome::Failed => writeln!(out, "refresh failed, see 'log'")?,
        },
        Command::Show => {
            let rows = manager.rows();
            if rows.is_empty() {
                writeln!(out, "(no alarms)")?;
            }
            for row in rows {
                writeln!(out, "{row}")?;
            }
            if manager.alert().is_playing() {
                writeln!(out, "(alert ringing, 'stop' to silence)")?;
            }
        }
        Command::Log { limit } => print_log(manager, limit, out)?,
        Command::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        Command::Help => writeln!(out, "{USAGE}")?,
        Command::Quit => return Ok(Flow::Quit),
    }
    out.flush()?;
    Ok(Flow::Continue)
}

fn print_log<S, A, W>(
    manager: &AlarmManager<S, A>,
    limit: Option<usize>,
    out: &mut W,
) -> Result<()>
where
    S: AlarmScheduler,
    A: AlertSound,
    W: Write,
{
    let entries = manager.log_entries();
    let limit = limit.unwrap_or(entries.len());
    for entry in entries.iter().take(limit) {
        writeln!(out, "{entry}")?;
    }
    Ok(())
}
