//! Interactive shell
//!
//! Runs the replica inside its task and reads commands from stdin. Deleting
//! takes two `rm` requests for the same QSO within the confirmation window.
//! With an exchange configured the shell also polls it in the background.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use qsync_core::{Config, DeleteRequest, Qso, Replica, ReplicaActor, ReplicaHandle};

use super::report_dispatch;
use crate::output::{short_id, summary_line, Output};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

const HELP: &str = "\
Commands:
  add CALL [DT] [BAND] [MODE]   log a QSO (DT defaults to now)
  ls [N]                        list the newest N QSOs (default 20)
  rm ID                         delete; repeat within the window to confirm
  import PATH                   import a CSV file
  poll                          pull updates from the exchange
  help                          show this help
  quit                          leave the shell";

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Add {
        callsign: String,
        dt: Option<String>,
        band: Option<String>,
        mode: Option<String>,
    },
    List(usize),
    Remove(String),
    Import(String),
    Poll,
    Help,
    Quit,
    Empty,
}

fn parse_line(line: &str) -> std::result::Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ShellCommand::Empty);
    };
    let rest: Vec<&str> = words.collect();
    let arg = |i: usize| rest.get(i).map(|s| s.to_string());

    match verb.to_ascii_lowercase().as_str() {
        "add" | "a" => match arg(0) {
            Some(callsign) => Ok(ShellCommand::Add {
                callsign,
                dt: arg(1),
                band: arg(2),
                mode: arg(3),
            }),
            None => Err("usage: add CALL [DT] [BAND] [MODE]".to_string()),
        },
        "ls" | "list" => match rest.first() {
            Some(n) => n
                .parse()
                .map(ShellCommand::List)
                .map_err(|_| format!("not a number: {}", n)),
            None => Ok(ShellCommand::List(20)),
        },
        "rm" | "delete" => arg(0)
            .map(ShellCommand::Remove)
            .ok_or_else(|| "usage: rm ID".to_string()),
        "import" => {
            if rest.is_empty() {
                Err("usage: import PATH".to_string())
            } else {
                Ok(ShellCommand::Import(rest.join(" ")))
            }
        }
        "poll" | "sync" => Ok(ShellCommand::Poll),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{}', try help", other)),
    }
}

/// Run the shell until `quit` or end of input
pub async fn run(replica: Replica, config: &Config, output: &Output) -> Result<()> {
    let polls = replica.has_transport();
    let window = Duration::from_millis(config.delete_confirm_ms);
    let handle = ReplicaActor::spawn(replica, window);

    output.message("QSYNC shell. Type help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(ShellCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(&handle, config, command, window, output).await {
                            output.warn(&e.to_string());
                        }
                    }
                    Err(usage) => output.warn(&usage),
                }
            }
            _ = ticker.tick(), if polls => {
                let outcome = handle.poll().await?;
                if outcome.changed() {
                    output.print_outcome("Remote updates", &outcome);
                }
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

async fn execute(
    handle: &ReplicaHandle,
    config: &Config,
    command: ShellCommand,
    window: Duration,
    output: &Output,
) -> Result<()> {
    match command {
        ShellCommand::Add {
            callsign,
            dt,
            band,
            mode,
        } => {
            let dt = dt.unwrap_or_else(|| {
                chrono::Local::now()
                    .format("%Y-%m-%dT%H:%M")
                    .to_string()
            });
            let mut qso = Qso::new(&callsign, dt);
            qso.band = band.unwrap_or_default();
            qso.mode = mode.unwrap_or_default();
            qso.my_grid = config.station_grid.clone().unwrap_or_default();
            let id = qso.id.clone();

            let dispatch = handle.add(qso).await?;
            report_dispatch(
                output,
                dispatch,
                &format!("Logged QSO with {} ({})", callsign.to_uppercase(), short_id(&id)),
            )?;
            handle.poll().await?;
        }
        ShellCommand::List(limit) => {
            let qsos = handle.list().await?;
            if qsos.is_empty() {
                output.message("No QSOs logged.");
            }
            for qso in qsos.iter().take(limit) {
                output.message(&summary_line(qso));
            }
        }
        ShellCommand::Remove(prefix) => {
            let records = qsync_core::RecordSet::from_records(handle.list().await?);
            let id = super::resolve_id(&records, &prefix)?;
            match handle.request_delete(id.as_str()).await? {
                DeleteRequest::Armed { .. } => output.message(&format!(
                    "Press rm {} again within {:.1}s to delete",
                    short_id(&id),
                    window.as_secs_f64()
                )),
                DeleteRequest::Confirmed(dispatch) => {
                    report_dispatch(output, dispatch, &format!("Deleted QSO {}", short_id(&id)))?;
                    handle.poll().await?;
                }
                DeleteRequest::NotFound => output.warn(&format!("No QSO {}", id)),
            }
        }
        ShellCommand::Import(path) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read CSV file: {}", path))?;
            let summary = handle.import(text).await?;
            output.print_import(&summary);
            handle.poll().await?;
        }
        ShellCommand::Poll => {
            let outcome = handle.poll().await?;
            output.print_outcome("Poll", &outcome);
        }
        ShellCommand::Help => output.message(HELP),
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
    Ok(())
}
