mod cli;
mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::cli::{parse_args, Command, USAGE};
use crate::settings::{default_settings_path, load_settings, save_settings};

fn main() {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("micslice=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("micslice failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: cli::Args) -> Result<()> {
    let settings_path: PathBuf = args.settings.unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        // First run: leave an editable file behind.
        if let Err(e) = save_settings(&settings_path, &settings) {
            tracing::warn!(path = ?settings_path, "could not write default settings: {e}");
        }
    }
    if let Some(output) = args.output {
        settings.output_dir = Some(output);
    }
    info!(
        settings_path = ?settings_path,
        sample_rate = settings.sample_rate,
        crop_count = settings.crop_count,
        output_dir = ?settings.output_dir(),
        "settings loaded"
    );

    match args.command {
        Command::Record { seconds, replay } => commands::record(&settings, seconds, replay.as_deref()),
        Command::Listen { ticks, replay } => commands::listen(&settings, ticks, replay.as_deref()),
        Command::Export { file } => commands::export(&settings, &file),
        Command::Devices => commands::devices(),
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
    }
}
