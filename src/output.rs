use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;
use tracing::info;

use crate::app::{FetchAction, FetchResult, ProgressEvent, ProgressSink};
use crate::install::InstallOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Reports progress through the log and prints a short summary at the end.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_fetch(result: &FetchResult) {
        println!(
            "{} {} {} ({}/{}, {})",
            "📦".cyan(),
            result.package.as_str().bold(),
            result.version,
            result.distribution,
            result.component,
            result.architecture
        );
        let action = match result.action {
            FetchAction::Cache => "♻️  already downloaded".green(),
            FetchAction::Download => "⬇️  downloaded".cyan(),
            FetchAction::DryRun => "• dry run, would save to".yellow(),
        };
        println!("{action}: {}", result.path);
        if result.action == FetchAction::DryRun {
            println!("   from {}", result.source_url);
        }
        if let Some(install) = &result.install {
            let line = match install {
                InstallOutcome::AlreadyInstalled { version } => {
                    format!("✅ {} {version} is already installed", result.package).green()
                }
                InstallOutcome::Installed { .. } => {
                    format!("✅ installed {} {}", result.package, result.version).green()
                }
                InstallOutcome::InstalledAfterRepair { .. } => format!(
                    "✅ installed {} {} after repairing dependencies",
                    result.package, result.version
                )
                .yellow(),
            };
            println!("{line}");
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
