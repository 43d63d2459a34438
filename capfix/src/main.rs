//! capfix — caption correction with reviewed machine suggestions.
//!
//! Entry point for the `capfix` binary. Parses a SubRip/WebVTT file into a
//! project, asks the generative service for rewrites (`capfix-core`'s
//! suggestion pipeline), stores everything in the WAL-mode SQLite database,
//! and exposes review and export commands.
//!
//! # Startup sequence
//!
//! 1. Parse arguments, install the tracing subscriber on stderr.
//! 2. Load `config.toml` plus env overrides (soft failures only).
//! 3. `create_dir_all` for the database directory + `open_db()`.
//! 4. Dispatch the subcommand. SIGINT/SIGTERM handlers are only installed
//!    around the suggestion run in `import`.

mod config;
mod render;
mod signals;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use capfix_core::store::ProjectStore;
use capfix_core::suggest::{OpenAiClient, Orchestrator, RunStatus, SuggestionRequest};
use capfix_core::{
    apply_candidates, diff_words, evaluate, export_file_name, export_transcript, parse, MemoryStore, Project,
    ProjectStatus, SegmentUpdate, SqliteStore, StoreError, TranscriptError,
};
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const DEFAULT_DB: &str = ".capfix/projects.db";

#[derive(Debug, Parser)]
#[command(name = "capfix", version, about = "Caption correction with reviewed machine suggestions")]
struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, default_value = DEFAULT_DB)]
    db: PathBuf,

    /// Owner id that projects are scoped to.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    /// Keep projects in memory for this invocation only.
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a transcript, generate suggestions and store it as a project.
    Import {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Skip the suggestion pipeline.
        #[arg(long)]
        no_suggest: bool,
        /// Print the exported transcript after importing.
        #[arg(long)]
        print: bool,
    },
    /// List projects, newest first.
    List,
    /// Show a project's segments with their changes.
    Show {
        project: String,
        /// Include unchanged segments.
        #[arg(long)]
        all: bool,
    },
    /// Accept suggestions for the given segments.
    Accept(Selection),
    /// Reject suggestions for the given segments.
    Reject(Selection),
    /// Replace a segment's text by hand.
    Edit { project: String, index: u32, text: String },
    /// Write the corrected transcript as SubRip.
    Export {
        project: String,
        /// File or directory to write to; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a project and its segments.
    Delete { project: String },
    /// Word-diff two strings and report whether the rewrite would be accepted.
    Diff { original: String, edited: String },
}

#[derive(Debug, Args)]
struct Selection {
    project: String,
    indices: Vec<u32>,
    #[arg(long, conflicts_with = "indices")]
    all: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no project matches {0:?}")]
    UnknownProject(String),

    #[error("{0:?} matches more than one project")]
    AmbiguousProject(String),

    #[error("project has no segment {0}")]
    UnknownSegment(u32),

    #[error("give segment indices or --all")]
    EmptySelection,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("capfix=info,capfix_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("capfix: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn ProjectStore>, CliError> {
    if cli.in_memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(dir) = cli.db.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let store = SqliteStore::open(&cli.db.to_string_lossy()).await?;
    Ok(Arc::new(store))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Diff { original, edited } = &cli.command {
        print_diff(original, edited);
        return Ok(());
    }

    let store = open_store(&cli).await?;
    let owner = cli.owner.as_str();
    let palette = render::Palette::detect();

    match &cli.command {
        Command::Import { file, title, language, no_suggest, print } => {
            let project = import(
                store.as_ref(),
                owner,
                file,
                title.as_deref(),
                language.as_deref(),
                !no_suggest,
            )
            .await?;
            if *print {
                print!("{}", export_transcript(&project.segments)?);
            }
        }
        Command::List => {
            print!("{}", render::project_list(&store.list(owner).await?, &palette));
        }
        Command::Show { project, all } => {
            let project = load(store.as_ref(), owner, project).await?;
            print!("{}", render::project(&project, *all, &palette));
        }
        Command::Accept(selection) => review(store.as_ref(), owner, selection, true).await?,
        Command::Reject(selection) => review(store.as_ref(), owner, selection, false).await?,
        Command::Edit { project, index, text } => {
            let project = load(store.as_ref(), owner, project).await?;
            if !project.segments.iter().any(|s| s.index == *index) {
                return Err(CliError::UnknownSegment(*index));
            }
            let updated = store
                .update_segments(owner, &project.id, &[SegmentUpdate::edit(*index, text.clone())])
                .await?;
            if let Some(segment) = updated.segments.iter().find(|s| s.index == *index) {
                print!("{}", render::segment(segment, &palette));
            }
        }
        Command::Export { project, output } => {
            let project = load(store.as_ref(), owner, project).await?;
            let text = export_transcript(&project.segments)?;
            match output {
                None => print!("{text}"),
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(export_file_name(project.source_file_name.as_deref(), &project.title))
                    } else {
                        path.clone()
                    };
                    std::fs::write(&path, text)?;
                    tracing::info!(path = %path.display(), "transcript exported");
                }
            }
        }
        Command::Delete { project } => {
            let project = load(store.as_ref(), owner, project).await?;
            if !store.delete(owner, &project.id).await? {
                return Err(CliError::UnknownProject(project.id));
            }
            println!("deleted {} ({})", project.id, project.title);
        }
        Command::Diff { .. } => {}
    }
    Ok(())
}

/// Resolves a full project id or a unique id prefix.
async fn load(store: &dyn ProjectStore, owner: &str, key: &str) -> Result<Project, CliError> {
    if let Some(project) = store.get(owner, key).await? {
        return Ok(project);
    }
    let matches: Vec<String> = store
        .list(owner)
        .await?
        .into_iter()
        .map(|p| p.id)
        .filter(|id| !key.is_empty() && id.starts_with(key))
        .collect();
    let id = match matches.as_slice() {
        [id] => id,
        [] => return Err(CliError::UnknownProject(key.to_owned())),
        _ => return Err(CliError::AmbiguousProject(key.to_owned())),
    };
    store
        .get(owner, id)
        .await?
        .ok_or_else(|| CliError::UnknownProject(key.to_owned()))
}

async fn import(
    store: &dyn ProjectStore,
    owner: &str,
    file: &Path,
    title: Option<&str>,
    language: Option<&str>,
    suggest: bool,
) -> Result<Project, CliError> {
    let raw = std::fs::read_to_string(file).map_err(|source| CliError::Read {
        path: file.to_owned(),
        source,
    })?;
    let segments = parse(&raw)?;

    let file_name = file.file_name().map(|n| n.to_string_lossy().into_owned());
    let title = title
        .map(str::to_owned)
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();

    let mut project = Project::new(owner, title, segments);
    project.source_file_name = file_name;
    project.language = language.map(str::to_owned);

    let mut suggested = 0;
    if suggest {
        let config = config::load();
        match OpenAiClient::from_config(&config.service) {
            Ok(client) => {
                project.status = ProjectStatus::Processing;
                store.put(&project).await?;
                tracing::info!(endpoint = client.endpoint(), model = %config.suggest.model, "requesting suggestions");

                let orchestrator = Orchestrator::new(Arc::new(client), config.suggest);
                let cancel = CancellationToken::new();
                let shutdown = signals::register_shutdown()?;
                let watcher = signals::spawn_cancel_watcher(shutdown.flag(), cancel.clone());

                let request = SuggestionRequest {
                    segments: &project.segments,
                    project_title: &project.title,
                    language: project.language.as_deref().unwrap_or(""),
                };
                let outcome = orchestrator.run(request, &cancel).await;
                cancel.cancel();
                if let Err(e) = watcher.await {
                    tracing::warn!(error = %e, "signal watcher task failed");
                }
                // Default Ctrl-C behaviour again for the rest of the command.
                drop(shutdown);

                if outcome.status == RunStatus::FailedSoft {
                    tracing::warn!(degraded = ?outcome.degraded, "no suggestions available");
                }
                suggested = apply_candidates(&mut project.segments, &outcome.candidates);
            }
            Err(e) => tracing::warn!(error = %e, "skipping suggestions"),
        }
    }

    project.status = ProjectStatus::Review;
    store.put(&project).await?;
    println!(
        "imported {} \"{}\": {} segments, {} suggestions",
        project.id,
        project.title,
        project.segments.len(),
        suggested
    );
    Ok(project)
}

async fn review(store: &dyn ProjectStore, owner: &str, selection: &Selection, accepted: bool) -> Result<(), CliError> {
    let project = load(store, owner, &selection.project).await?;
    let updates = if selection.all {
        SegmentUpdate::accept_all(&project.segments, accepted)
    } else {
        if selection.indices.is_empty() {
            return Err(CliError::EmptySelection);
        }
        if let Some(missing) = selection
            .indices
            .iter()
            .find(|i| !project.segments.iter().any(|s| s.index == **i))
        {
            return Err(CliError::UnknownSegment(*missing));
        }
        selection.indices.iter().map(|i| SegmentUpdate::accept(*i, accepted)).collect()
    };

    let updated = store.update_segments(owner, &project.id, &updates).await?;
    println!(
        "{} {} segment(s); {} of {} accepted",
        if accepted { "accepted" } else { "rejected" },
        updates.len(),
        updated.accepted_count(),
        updated.segments.len()
    );
    Ok(())
}

fn print_diff(original: &str, edited: &str) {
    let palette = render::Palette::detect();
    println!("{}", render::diff(&diff_words(original, edited), &palette));
    let limits = config::load().suggest.acceptance_limits();
    match evaluate(original, edited, &limits) {
        Ok(changed) => println!("acceptable ({changed} changed characters)"),
        Err(rejection) => println!("rejected: {}", render::rejection(&rejection)),
    }
}
