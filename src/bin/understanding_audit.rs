//! `understanding-audit` — offline inspection of exported event logs.
//!
//! # Usage
//!
//! ```text
//! understanding-audit subjects --events events.jsonl
//! understanding-audit replay   --events events.jsonl --subject child-1
//! understanding-audit chain    --events events.jsonl --event 6f1c...
//! ```
//!
//! The file is re-recorded into an in-memory log first, so every integrity
//! rule is checked before anything is printed.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use understanding::storage::{jsonl, referenced_evidence};
use understanding::{
    EngineError, EventId, EventLog, InMemoryEventLog, StorageError, SubjectId, Understanding,
};

#[derive(Parser, Debug)]
#[command(name = "understanding-audit", version, about = "Inspect exported understanding event logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List subjects and their event counts.
    Subjects {
        /// JSON-lines event export.
        #[arg(short, long, value_name = "FILE")]
        events: PathBuf,
    },
    /// Rebuild a subject's understanding and print it as JSON.
    Replay {
        /// JSON-lines event export.
        #[arg(short, long, value_name = "FILE")]
        events: PathBuf,
        /// Subject to rebuild.
        #[arg(short, long)]
        subject: String,
    },
    /// Print the cascade that led to an event, root first.
    Chain {
        /// JSON-lines event export.
        #[arg(short, long, value_name = "FILE")]
        events: PathBuf,
        /// Event to explain.
        #[arg(long = "event")]
        event_id: Uuid,
    },
}

#[derive(Debug, Error)]
enum AuditError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),

    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event {0} is not in the export")]
    UnknownEvent(EventId),
}

fn load(path: &Path) -> Result<InMemoryEventLog, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let events = jsonl::read_events(BufReader::new(file))?;
    let total = events.len();
    let log = InMemoryEventLog::from_events(events)?;
    info!(path = %path.display(), events = total, "event export loaded");
    Ok(log)
}

fn subjects(path: &Path, out: &mut impl Write) -> Result<(), AuditError> {
    let log = load(path)?;
    for subject in log.subjects()? {
        writeln!(out, "{subject}\t{}", log.count(&subject)?)?;
    }
    Ok(())
}

fn replay(path: &Path, subject: &SubjectId, out: &mut impl Write) -> Result<(), AuditError> {
    let log = load(path)?;
    let events = log.replay(subject)?;
    if events.is_empty() {
        warn!(subject = %subject, "no events for subject");
    }
    let understanding = Understanding::replay(subject.clone(), &events)
        .map_err(EngineError::from)?;
    info!(
        subject = %subject,
        events = events.len(),
        hypotheses = understanding.hypotheses().len(),
        evidence = referenced_evidence(&events).len(),
        "understanding rebuilt"
    );
    serde_json::to_writer_pretty(&mut *out, &understanding)?;
    writeln!(out)?;
    Ok(())
}

fn chain(path: &Path, event_id: EventId, out: &mut impl Write) -> Result<(), AuditError> {
    let log = load(path)?;
    let mut ancestry = log.ancestry(event_id)?;
    if ancestry.is_empty() {
        return Err(AuditError::UnknownEvent(event_id));
    }
    ancestry.reverse();
    for (depth, event) in ancestry.iter().enumerate() {
        let fields: Vec<&str> = event.changes.keys().map(String::as_str).collect();
        writeln!(
            out,
            "{:indent$}{} {} {:?} {} {} [{}] {}",
            "",
            event.timestamp.to_rfc3339(),
            event.id,
            event.event_type,
            event.entity_type,
            event.entity_id,
            fields.join(","),
            event.reasoning,
            indent = depth * 2,
        )?;
    }
    let children = log.children(event_id)?;
    if !children.is_empty() {
        writeln!(out, "{} event(s) were triggered by {event_id}", children.len())?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), AuditError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Subjects { events } => subjects(&events, &mut out),
        Command::Replay { events, subject } => replay(&events, &SubjectId::from(subject), &mut out),
        Command::Chain { events, event_id } => chain(&events, EventId::from_uuid(event_id), &mut out),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
