use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use festdesk::models::FestSnapshot;
use festdesk::portals::{Role, Session, judge, stage, team_leader};
use festdesk::services::config_loader::{self, FestConfig};
use festdesk::services::store::JsonDirStore;
use festdesk::services::{export, id_card, results, snapshot_loader};

#[derive(Debug, Parser)]
#[command(name = "festdesk", version, about = "Fest judging status, results and ID-card tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder holding one <collection>.json per collection and an optional festdesk.toml
    #[arg(short, long, global = true, default_value = ".")]
    data: PathBuf,

    /// Acting user id
    #[arg(short, long, global = true, default_value = "admin")]
    user: String,

    #[arg(short, long, global = true, value_enum, default_value = "admin")]
    role: CliRole,

    /// Team of the acting team leader
    #[arg(short, long, global = true)]
    team: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliRole {
    Admin,
    Judge,
    TeamLeader,
    StageController,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Admin => Role::Admin,
            CliRole::Judge => Role::Judge,
            CliRole::TeamLeader => Role::TeamLeader,
            CliRole::StageController => Role::StageController,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Judging progress for the acting judge
    Status,
    /// Record a mark for a reported assignment
    Score {
        assignment: String,
        value: f64,
        #[arg(long)]
        grade: Option<String>,
    },
    /// Close judging for a program
    CloseProgram { program: String },
    /// Positions, grades and points of a closed program
    Results { program: String },
    /// Team points table over all closed programs
    Standings,
    /// Overview for the acting team leader
    Team,
    /// Call order for a program on stage
    Stage { program: String },
    /// Render ID cards for every participant into a PDF
    IdCards {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Zip one <chestNumber>.png QR image per participant
    QrZip {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Export the participant list as a spreadsheet
    ExportXlsx {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "festdesk.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn default_output(data: &Path, stem: &str, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    data.join(format!("{stem}-{stamp}.{extension}"))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    println!("{}", path.display());
    Ok(())
}

fn report_notices(snapshot: &FestSnapshot) {
    for notice in snapshot.notice_lines() {
        warn!("{notice}");
    }
}

fn run(cli: Cli) -> Result<()> {
    let config: FestConfig = config_loader::load_fest_config(&cli.data)
        .with_context(|| format!("failed to load configuration from {}", cli.data.display()))?;
    let store = Arc::new(
        JsonDirStore::open(&cli.data)
            .with_context(|| format!("failed to open data folder {}", cli.data.display()))?,
    );
    let snapshot = snapshot_loader::load_snapshot(store.clone())?;
    report_notices(&snapshot);

    let mut session = Session::new(cli.user.clone(), cli.role.into());
    if let Some(team) = cli.team.clone() {
        session = session.with_team(team);
    }
    let points = config.effective_points(snapshot.points.as_ref());

    match cli.command {
        Command::Status => print_json(&judge::judge_dashboard(&session, &snapshot)?),
        Command::Score {
            assignment,
            value,
            grade,
        } => {
            let score = judge::record_score(
                &session,
                &snapshot,
                &*store,
                &assignment,
                value,
                grade,
            )?;
            print_json(&score)
        }
        Command::CloseProgram { program } => {
            let changed = judge::close_program(&session, &snapshot, &*store, &program)?;
            if !changed {
                info!("Program {} was already closed", program);
            }
            Ok(())
        }
        Command::Results { program } => {
            let Some(found) = snapshot.program(&program) else {
                bail!("program {program} not found");
            };
            if !found.is_closed() {
                warn!(
                    "Program {} is still open, results are published after closing",
                    program
                );
            }
            print_json(&results::program_results(
                found,
                &snapshot.assignments,
                &snapshot.scores,
                points,
            ))
        }
        Command::Standings => print_json(&results::team_standings(&snapshot, points)),
        Command::Team => print_json(&team_leader::team_dashboard(&session, &snapshot)?),
        Command::Stage { program } => {
            print_json(&stage::stage_queue(&session, &snapshot, &program)?)
        }
        Command::IdCards { out } => {
            let cards = id_card::card_contents(&snapshot);
            let batch = id_card::render(&cards, &config.id_card)?;
            if !batch.skipped_qr.is_empty() {
                warn!("Cards printed without QR: {:?}", batch.skipped_qr);
            }
            let path = out.unwrap_or_else(|| default_output(&cli.data, "id-cards", "pdf"));
            write_output(&path, &batch.pdf)
        }
        Command::QrZip { out } => {
            let report = export::write_qr_zip(&snapshot.participants, &config.export)?;
            if !report.skipped.is_empty() {
                warn!("QR images skipped: {:?}", report.skipped);
            }
            let path = out.unwrap_or_else(|| default_output(&cli.data, "qr-codes", "zip"));
            write_output(&path, &report.archive)
        }
        Command::ExportXlsx { out } => {
            let rows = export::participant_rows(&snapshot);
            let bytes = export::write_xlsx(&rows, &config.export.sheet_name)?;
            let path = out.unwrap_or_else(|| default_output(&cli.data, "participants", "xlsx"));
            write_output(&path, &bytes)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("Starting festdesk");

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
