// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docreader: command line front end for a passport/ID document reader.
//
// Entry point. Initialises logging, resolves the configuration and runs one
// subcommand against the configured engine.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};

use docreader_client::bac::BacCorrector;
use docreader_client::kiosk::{KioskDeduper, KioskForwarder};
use docreader_client::retry::{RetryConfig, RetryDecision, should_retry};
use docreader_client::{Conformance, DocumentRead, ReaderEvent, Session};
use docreader_core::human_errors::humanize_error;
use docreader_core::{DataType, DeliveryMode, EventCode, ReaderError, Result, Tag};

use services::reader_service::{BackendOverride, PromptCorrector, ReaderService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Simulated,
    Native,
}

/// Passport and ID document reader client
#[derive(Parser, Debug)]
#[command(name = "docreader", version, about)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/docreader/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine implementation
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Vendor engine library (implies --backend native)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Document fixture for the simulated engine
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read one document and print it as JSON
    Read {
        /// Data items to enable and print, e.g. CD_CODELINE,CD_IMAGEPHOTO
        #[arg(long, value_delimiter = ',')]
        tags: Vec<Tag>,
    },

    /// Stream engine events as JSON lines until interrupted
    Watch {
        /// Ask on the terminal to correct the MRZ before chip access
        #[arg(long)]
        bac_prompt: bool,
    },

    /// Forward every read codeline to a kiosk listener
    Kiosk {
        /// Listener address (default from config, port 1010)
        #[arg(long)]
        forward: Option<String>,
    },

    /// List decoder plugins, or change which are enabled
    Plugins {
        #[arg(long, conflicts_with = "disable_all")]
        enable: Vec<String>,

        #[arg(long, conflicts_with = "disable_all")]
        disable: Vec<String>,

        #[arg(long)]
        disable_all: bool,
    },

    /// Inspect or persist engine settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// List connected readers, or select one
    Scanners {
        #[arg(long)]
        select: Option<String>,
    },

    /// Check the engine against the reader call contract
    Conformance {
        /// Data items to exercise (default: a representative set)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<Tag>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the current settings as JSON
    Show,
    /// Persist the current settings in the engine
    Save,
    /// Write the settings in the engine's text format
    Export { path: PathBuf },
}

const CONFORMANCE_TAGS: &[DataType] = &[
    DataType::Codeline,
    DataType::Checksum,
    DataType::ImageVis,
    DataType::ImageIr,
    DataType::ImagePhoto,
    DataType::ReadProgress,
    DataType::ScDg1Codeline,
    DataType::ScChipId,
];

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let human = humanize_error(&e);
            error!(error = %e, "command failed");
            eprintln!("{}", human.message);
            eprintln!("{}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let backend = BackendOverride {
        native: cli.backend.map(|b| b == Backend::Native),
        library: cli.library,
        fixture: cli.fixture,
    };
    let service = ReaderService::load(cli.config.as_deref(), &backend)?;

    match cli.command {
        Commands::Read { tags } => run_read(&service, &tags).await,
        Commands::Watch { bac_prompt } => run_watch(&service, bac_prompt).await,
        Commands::Kiosk { forward } => run_kiosk(&service, forward).await,
        Commands::Plugins {
            enable,
            disable,
            disable_all,
        } => run_plugins(&service, &enable, &disable, disable_all).await,
        Commands::Settings { action } => run_settings(&service, action).await,
        Commands::Scanners { select } => run_scanners(&service, select).await,
        Commands::Conformance { tags } => run_conformance(&service, &tags).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_read(service: &ReaderService, tags: &[Tag]) -> Result<ExitCode> {
    let session = service.open(DeliveryMode::Blocking, None)?;

    let wanted: Vec<DataType> = tags
        .iter()
        .filter_map(|tag| match tag {
            Tag::Data(data_type) => Some(*data_type),
            Tag::Plugin(_) => None,
        })
        .collect();
    if !wanted.is_empty() {
        let mut tx = session.settings()?;
        for data_type in &wanted {
            tx.settings_mut().enable(*data_type);
        }
        tx.commit()?;
    }

    let read = session.next_document().await;
    session.shutdown().await?;
    let mut read = read?;
    if !tags.is_empty() {
        read.items.retain(|item| tags.contains(&item.tag));
    }
    print_json(&read)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct WatchLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a ReaderEvent,
}

async fn run_watch(service: &ReaderService, bac_prompt: bool) -> Result<ExitCode> {
    let corrector = bac_prompt.then(|| Arc::new(PromptCorrector) as Arc<dyn BacCorrector>);
    let session = service.open(DeliveryMode::NonBlocking, corrector)?;
    let mut events = session.events().ok_or(ReaderError::EventStreamTaken)?;
    info!("watching for documents, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let line = WatchLine { at: Utc::now(), event: &event };
                println!("{}", serde_json::to_string(&line)?);
                if let ReaderEvent::Event { event: EventCode::ReaderStateChanged } = event {
                    session.recover_if_errored().await?;
                }
            }
        }
    }

    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

/// Forward with the retry policy; a read is never lost to one refused connect.
async fn forward_with_retry(
    forwarder: &KioskForwarder,
    read: &DocumentRead,
    retry: &RetryConfig,
) -> Result<Option<String>> {
    let Some(data) = read.codeline_data() else {
        warn!(read_id = %read.id, "document without codeline, not forwarded");
        return Ok(None);
    };
    let data = data?;
    let mut attempt = 0;
    loop {
        match forwarder.forward(&data).await {
            Ok(reply) => return Ok(Some(reply)),
            Err(e) => match should_retry(&e, attempt, retry) {
                RetryDecision::RetryAfter(delay) => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(e),
            },
        }
    }
}

async fn run_kiosk(service: &ReaderService, forward: Option<String>) -> Result<ExitCode> {
    let config = service.config();
    let forwarder = match forward {
        Some(addr) => KioskForwarder::new(addr, Duration::from_millis(config.kiosk.timeout_ms)),
        None => KioskForwarder::from_config(&config.kiosk),
    };
    let mut deduper = KioskDeduper::new(Duration::from_millis(config.kiosk.dedupe_window_ms));
    let retry = RetryConfig::from(&config.retry);
    let session = service.open(DeliveryMode::NonBlocking, None)?;
    info!(addr = forwarder.addr(), "kiosk mode, Ctrl-C to stop");

    loop {
        let read = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            read = session.next_document() => read,
        };
        let read = match read {
            Ok(read) => read,
            Err(ReaderError::Timeout(_)) => continue,
            Err(e) => {
                warn!(error = %e, "read failed");
                if session.recover_if_errored().await? {
                    continue;
                }
                return Err(e);
            }
        };

        let Some(codeline) = read.codeline() else {
            warn!(read_id = %read.id, "no codeline on document");
            continue;
        };
        if !deduper.should_forward(codeline.as_str()) {
            continue;
        }
        match forward_with_retry(&forwarder, &read, &retry).await {
            Ok(Some(reply)) => info!(read_id = %read.id, reply = %reply, "forwarded"),
            Ok(None) => {}
            Err(e) => {
                let human = humanize_error(&e);
                warn!(read_id = %read.id, error = %e, suggestion = %human.suggestion, "forward failed");
            }
        }
    }

    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct PluginLine {
    name: String,
    enabled: Option<bool>,
}

async fn run_plugins(
    service: &ReaderService,
    enable: &[String],
    disable: &[String],
    disable_all: bool,
) -> Result<ExitCode> {
    let session = service.open(DeliveryMode::Blocking, None)?;
    let plugins = session.plugins();

    if disable_all {
        let count = plugins.disable_all()?;
        info!(count, "plugins disabled");
    }
    for name in disable {
        plugins.disable(name)?;
    }
    for name in enable {
        plugins.enable(name)?;
    }

    let mut lines = Vec::new();
    for name in plugins.names()? {
        // A plugin that failed to load has no enabled state.
        let enabled = plugins.is_enabled(&name).ok();
        lines.push(PluginLine { name, enabled });
    }
    print_json(&lines)?;
    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_settings(service: &ReaderService, action: SettingsAction) -> Result<ExitCode> {
    let session = service.open(DeliveryMode::Blocking, None)?;
    let tx = session.settings()?;
    match action {
        SettingsAction::Show => print_json(tx.settings())?,
        SettingsAction::Save => tx.save()?,
        SettingsAction::Export { path } => tx.export_text(&path)?,
    }
    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_scanners(service: &ReaderService, select: Option<String>) -> Result<ExitCode> {
    let session: Session = service.open(DeliveryMode::Blocking, None)?;
    if let Some(serial) = select {
        session.select_scanner(&serial)?;
    }
    print_json(&session.scanners()?)?;
    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_conformance(service: &ReaderService, tags: &[Tag]) -> Result<ExitCode> {
    let mut data_types: Vec<DataType> = tags
        .iter()
        .filter_map(|tag| match tag {
            Tag::Data(data_type) => Some(*data_type),
            Tag::Plugin(_) => None,
        })
        .collect();
    if data_types.is_empty() {
        data_types = CONFORMANCE_TAGS.to_vec();
    }

    let engine = service.engine()?;
    let report = tokio::task::spawn_blocking(move || Conformance::new(engine).run_all(&data_types))
        .await
        .map_err(|e| ReaderError::Io(std::io::Error::other(e)))?;
    print_json(&report)?;
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn read_tags_parse_vendor_names() {
        let cli = Cli::try_parse_from([
            "docreader",
            "--backend",
            "simulated",
            "read",
            "--tags",
            "CD_CODELINE,CD_IMAGEPHOTO",
        ])
        .unwrap();
        let Commands::Read { tags } = cli.command else {
            panic!("expected read");
        };
        assert_eq!(
            tags,
            vec![Tag::Data(DataType::Codeline), Tag::Data(DataType::ImagePhoto)]
        );
        assert_eq!(cli.backend, Some(Backend::Simulated));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(Cli::try_parse_from(["docreader", "read", "--tags", "CD_NOPE"]).is_err());
    }

    #[test]
    fn settings_export_takes_a_path() {
        let cli = Cli::try_parse_from(["docreader", "settings", "export", "out.ini"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Settings {
                action: SettingsAction::Export { .. }
            }
        ));
    }

    #[tokio::test]
    async fn read_prints_requested_tags_only() {
        let (_dir, path) = write_config();
        let service = ReaderService::load(Some(&path), &BackendOverride::default()).unwrap();
        let code = run_read(&service, &[Tag::Data(DataType::Codeline)]).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn conformance_passes_on_the_sample() {
        let (_dir, path) = write_config();
        let service = ReaderService::load(Some(&path), &BackendOverride::default()).unwrap();
        let code = run_conformance(&service, &[]).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    fn write_config() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        docreader_core::ReaderConfig::default().save(&path).unwrap();
        (dir, path)
    }
}
