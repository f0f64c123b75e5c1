// src/lib.rs

#[cfg(not(unix))]
compile_error!("ralph relies on process groups and POSIX signals and only builds on unix");

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod types;

use std::io::Write;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cli::{Action, CliArgs};
use crate::errors::RalphError;
use crate::exec::LaunchRequest;
use crate::process::SystemProbe;
use crate::store::TaskRecord;
use crate::supervisor::Supervisor;
use crate::types::TaskId;

/// High-level entry point used by `main.rs`.
///
/// Resolves configuration, opens the store and performs the one action
/// selected on the command line. Results go to stdout; warnings about
/// individual records go to stderr.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = config::resolve(args.config.as_deref(), args.state_dir.as_deref())?;
    debug!(state_dir = ?cfg.state_dir, "resolved configuration");

    let supervisor = Supervisor::from_config(cfg, SystemProbe)?;

    match args.action() {
        Action::Run {
            command,
            name,
            timeout,
            cwd,
        } => {
            let mut req = LaunchRequest::new(command).name(name).timeout(timeout);
            if let Some(dir) = cwd {
                req = req.cwd(dir);
            }
            let record = supervisor.launch(req)?;
            println!("{}", record.id);
            println!("output: {}", record.output_path.display());
        }

        Action::Status { json } => {
            let status = supervisor.status().await?;
            report_warnings(&status.report.warnings);
            print_records(&status.records, json)?;
        }

        Action::Check { id, json } => {
            let (record, report) = supervisor.check(&TaskId::from(id)).await?;
            report_warnings(&report.warnings);
            print_records(std::slice::from_ref(&record), json)?;
        }

        Action::Output { id, tail, follow } => {
            let id = TaskId::from(id);
            if follow {
                let mut stdout = tokio::io::stdout();
                tokio::select! {
                    res = supervisor.follow(&id, tail, &mut stdout) => res?,
                    _ = tokio::signal::ctrl_c() => {
                        debug!(task = %id, "interrupted; stopped following output");
                    }
                }
                stdout.flush().await?;
            } else {
                let bytes = supervisor.output(&id, tail)?;
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
        }

        Action::Kill { id } => {
            let (record, report) = supervisor.kill(&TaskId::from(id)).await?;
            report_warnings(&report.warnings);
            match record.exit_code {
                Some(code) => println!("{} {} (exit code {code})", record.id, record.status),
                None => println!("{} {}", record.id, record.status),
            }
        }

        Action::Clean { older_than } => {
            let cleaned = supervisor.clean(older_than)?;
            report_warnings(&cleaned.warnings);
            println!("Removed {} task(s)", cleaned.removed.len());
        }
    }

    Ok(())
}

fn report_warnings(warnings: &[RalphError]) {
    for w in warnings {
        eprintln!("ralph warning: {w}");
    }
}

fn print_records(records: &[TaskRecord], json: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, records)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", render_table(records))?;
    }
    stdout.flush()?;
    Ok(())
}

/// Plain-text table of `records`, one row per task.
pub fn render_table(records: &[TaskRecord]) -> String {
    if records.is_empty() {
        return "No tasks.\n".to_string();
    }

    let header = ["ID", "NAME", "STATUS", "EXIT", "STARTED", "ENDED", "OUTPUT"];
    let rows: Vec<[String; 7]> = records
        .iter()
        .map(|r| {
            let mut status = r.status.to_string();
            if r.probe_error.is_some() {
                status.push('?');
            }
            [
                r.id.to_string(),
                r.name.clone(),
                status,
                r.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
                r.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.end_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into()),
                r.output_path.display().to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };

    push_row(&header);
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        push_row(&cells);
    }
    out
}
