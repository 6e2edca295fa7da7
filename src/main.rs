use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand};
use livedoc::app::{ControllerOptions, DocumentController};
use livedoc::config::Config;
use livedoc::config_io::{self, DirectoryContext};
use livedoc::model::markdown::MarkdownConverter;
use livedoc::model::outline::Outline;
use livedoc::model::source_map::SourceMapBuilder;
use livedoc::services::fs::StdDocumentFs;
use livedoc::services::time_source::RealTimeSource;
use livedoc::services::tracing_setup;
use livedoc::store::guard::GuardState;
use livedoc::store::{Database, SharedDatabase};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Source-mapped rendering and crash-resilient document persistence
#[derive(Parser, Debug)]
#[command(name = "livedoc")]
#[command(about = "Source-mapped preview and unsaved-change recovery for documents", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Path to log file (default: system temp dir)
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Directory holding the store (default: the system data directory)
    #[arg(long, value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the store integrity check and print its outcome
    Check,
    /// Replace a corrupt store with its backup
    Restore,
    /// Keep the fresh store and forget the corrupt one
    Dismiss,
    /// Print the source-mapped HTML of a document
    Render {
        file: PathBuf,
        /// Print the heading outline instead
        #[arg(long)]
        outline: bool,
    },
    /// Open a document, applying unsaved changes kept from an earlier
    /// session, and print the result
    Open { file: PathBuf },
    /// List documents with unsaved changes in the store
    Recover,
    /// Manage project folders
    Projects {
        #[command(subcommand)]
        action: Option<ProjectAction>,
    },
    /// Print the effective configuration as JSON
    DumpConfig,
    /// Print the directories in use
    ShowPaths,
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
    List,
    /// Track a folder; defaults to the standard project folder
    Add { path: Option<PathBuf> },
    Remove { path: PathBuf },
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(tracing_setup::default_log_file);
    tracing_setup::init_global(&log_file).context("Failed to set up logging")?;

    let mut dir_context =
        DirectoryContext::from_system().context("Failed to determine system directories")?;
    if let Some(data_dir) = &args.data_dir {
        dir_context = dir_context.with_data_dir(data_dir.clone());
    }
    let config = config_io::load_config(&dir_context, args.config.as_deref())
        .context("Failed to load configuration")?;

    let result = run(args.command, &dir_context, &config);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn run(command: Command, dir_context: &DirectoryContext, config: &Config) -> AnyhowResult<()> {
    match command {
        Command::ShowPaths => {
            let paths = dir_context.store_paths(config);
            println!("config:  {}", dir_context.config_path().display());
            println!("data:    {}", dir_context.data_dir.display());
            println!("store:   {}", paths.live.display());
            println!("backup:  {}", paths.backup.display());
            println!("marker:  {}", paths.marker.display());
            println!("projects: {}", dir_context.default_project_root().display());
            println!("log:     {}", tracing_setup::default_log_file().display());
            Ok(())
        }
        Command::DumpConfig => {
            let json =
                serde_json::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", json);
            Ok(())
        }
        Command::Render { file, outline } => render(&file, outline),
        Command::Check => {
            let db = open_store(dir_context, config)?;
            print_check(&db);
            Ok(())
        }
        Command::Restore => {
            let mut db = open_store(dir_context, config)?;
            db.restore_backup()
                .with_context(|| format!("Failed to restore {:?}", db.paths().backup))?;
            println!("Restored store from {}", db.paths().backup.display());
            Ok(())
        }
        Command::Dismiss => {
            let mut db = open_store(dir_context, config)?;
            db.dismiss_corruption()
                .context("Failed to dismiss corrupt store")?;
            println!("Corrupt store dismissed");
            Ok(())
        }
        Command::Open { file } => open(&file, dir_context, config),
        Command::Recover => {
            let db = open_store(dir_context, config)?;
            let records = db.dirty_shadows().context("Failed to list unsaved changes")?;
            if records.is_empty() {
                println!("No unsaved changes");
            }
            for record in records {
                println!(
                    "{}\t{}\t{} bytes",
                    record.updated_at.to_rfc3339(),
                    record.path.display(),
                    record.content.len()
                );
            }
            Ok(())
        }
        Command::Projects { action } => {
            let mut db = open_store(dir_context, config)?;
            match action.unwrap_or(ProjectAction::List) {
                ProjectAction::List => {
                    for project in db.projects().context("Failed to list projects")? {
                        println!(
                            "{}\t{}\t{}",
                            project.name,
                            project.path.display(),
                            project.last_opened.to_rfc3339()
                        );
                    }
                }
                ProjectAction::Add { path } => {
                    let path = path.unwrap_or_else(|| dir_context.default_project_root());
                    let project = db
                        .add_project(&path)
                        .with_context(|| format!("Failed to add project {:?}", path))?;
                    println!("Added {}", project.name);
                }
                ProjectAction::Remove { path } => {
                    let removed = db
                        .remove_project(&path)
                        .with_context(|| format!("Failed to remove project {:?}", path))?;
                    if !removed {
                        anyhow::bail!("No project at {}", path.display());
                    }
                    println!("Removed {}", path.display());
                }
            }
            Ok(())
        }
    }
}

fn open_store(dir_context: &DirectoryContext, config: &Config) -> AnyhowResult<Database> {
    let paths = dir_context.store_paths(config);
    Database::init(paths.clone()).with_context(|| format!("Failed to open store {:?}", paths.live))
}

fn print_check(db: &Database) {
    let report = db.report();
    let state = match report.state {
        GuardState::Unchecked => "unchecked",
        GuardState::Healthy => "healthy",
        GuardState::Corrupt => "corrupt (running in memory)",
        GuardState::CorruptFlagged => "corrupt (moved aside, fresh store in use)",
    };
    println!("store:          {}", db.paths().live.display());
    println!("state:          {}", state);
    println!("backup rotated: {}", report.backup_rotated);
    if let Some(error) = &report.error {
        println!("error:          {}", error);
    }
    if db.has_corruption() {
        println!();
        println!("Run `livedoc restore` to recover from the backup, or `livedoc dismiss` to keep the fresh store.");
    }
}

fn render(file: &Path, outline: bool) -> AnyhowResult<()> {
    let source =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    if outline {
        for entry in Outline::parse(&source).entries {
            let indent = "  ".repeat(usize::from(entry.nesting_level.saturating_sub(1)));
            println!("{:>5}  {}{}", entry.source_line_start, indent, entry.title);
        }
        return Ok(());
    }
    let render = SourceMapBuilder::new(Arc::new(MarkdownConverter::new())).build(&source);
    print!("{}", render.html);
    Ok(())
}

fn open(file: &Path, dir_context: &DirectoryContext, config: &Config) -> AnyhowResult<()> {
    let db: SharedDatabase = Arc::new(Mutex::new(open_store(dir_context, config)?));
    if db.lock().unwrap_or_else(|e| e.into_inner()).has_corruption() {
        eprintln!("Warning: the store was corrupt; run `livedoc check` for details");
    }
    let stylesheet = config_io::load_stylesheet(config).context("Failed to read stylesheet")?;
    let mut controller = DocumentController::new(
        Arc::clone(&db),
        Arc::new(StdDocumentFs),
        Arc::new(MarkdownConverter::new()),
        RealTimeSource::shared(),
        ControllerOptions::from_config(config, stylesheet),
    )
    .context("Failed to create document controller")?;

    // shadow records are keyed by absolute path
    let file = std::fs::canonicalize(file).with_context(|| format!("Failed to open {:?}", file))?;
    controller.open(&file)?;
    if let Some(folder) = file.parent() {
        if let Err(e) = db.lock().unwrap_or_else(|e| e.into_inner()).add_project(folder) {
            tracing::warn!("Failed to record project {:?}: {}", folder, e);
        }
    }
    eprintln!(
        "{} ({})",
        controller.status_message().unwrap_or_default(),
        if controller.dirty() { "unsaved changes" } else { "clean" }
    );
    print!("{}", controller.content());
    controller.close()
}
