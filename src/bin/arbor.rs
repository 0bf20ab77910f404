//! # arbor CLI
//!
//! Command-line interface for the arbor snapshot store.
//!
//! ## Usage
//! ```bash
//! # Create .arbor in the current directory
//! arbor init
//!
//! # Stage files and record a snapshot
//! arbor add src README.md
//! arbor commit -m "Initial state"
//!
//! # Inspect history and check for tampering
//! arbor log
//! arbor verify
//! arbor verify --all
//!
//! # Block a commit and restore an earlier one
//! arbor revoke <commit>
//! arbor checkout <commit>
//! ```

use arbor::{
    ArborError, LogEnd, ObjectView, Repository, Result, RevokeOutcome, VerificationReport,
};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// arbor - content-addressed snapshots with tamper detection
#[derive(Parser)]
#[command(name = "arbor")]
#[command(version)]
#[command(about = "Content-addressed snapshots with Merkle verification and revocation")]
#[command(long_about = None)]
struct Cli {
    /// Work tree directory (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository
    Init,

    /// Stage files or directories
    Add {
        /// Paths to stage
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Record a snapshot of the staged files
    Commit {
        /// Commit message
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Show commit history from HEAD
    Log,

    /// Show HEAD, staged files and whether they match HEAD
    Status,

    /// Restore a commit into the work tree
    Checkout {
        /// Commit digest, prefix, or HEAD
        target: Option<String>,
    },

    /// Check stored objects for tampering
    Verify {
        /// Commit to verify (defaults to HEAD)
        commit: Option<String>,

        /// Rehash every stored object
        #[arg(long)]
        all: bool,
    },

    /// Mark a commit as revoked
    Revoke {
        /// Commit digest or prefix
        commit: String,
    },

    /// Print an object
    CatFile {
        /// Object digest or prefix
        hash: String,
    },

    /// Unstage all files
    Reset,
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "arbor=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

/// Run a command, returning `false` when it completed but found problems
fn run(cli: Cli) -> Result<bool> {
    let work_root = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init => cmd_init(work_root),
        Commands::Add { paths } => cmd_add(work_root, paths),
        Commands::Commit { message } => cmd_commit(work_root, &message),
        Commands::Log => cmd_log(work_root),
        Commands::Status => cmd_status(work_root),
        Commands::Checkout { target } => cmd_checkout(work_root, target),
        Commands::Verify { commit, all } => cmd_verify(work_root, commit, all),
        Commands::Revoke { commit } => cmd_revoke(work_root, &commit),
        Commands::CatFile { hash } => cmd_cat_file(work_root, &hash),
        Commands::Reset => cmd_reset(work_root),
    }
}

fn cmd_init(work_root: PathBuf) -> Result<bool> {
    let repo = Repository::init(&work_root)?;

    println!(
        "{} Initialized empty arbor repository in {}",
        "✓".green().bold(),
        repo.repo_dir().display().to_string().cyan()
    );
    println!("\nNext steps:");
    println!("  - Stage files: {}", "arbor add <paths>".yellow());
    println!("  - Record a snapshot: {}", "arbor commit -m \"Initial state\"".yellow());
    Ok(true)
}

fn cmd_add(work_root: PathBuf, paths: Vec<PathBuf>) -> Result<bool> {
    let repo = Repository::open(&work_root)?;

    // Arguments are relative to where the command runs, not to --path
    let cwd = std::env::current_dir()?;
    let paths: Vec<PathBuf> = paths.into_iter().map(|p| cwd.join(p)).collect();

    let report = repo.stage(&paths)?;
    for skipped in &report.skipped {
        println!(
            "{} {}: {}, skipping",
            "warning:".yellow().bold(),
            skipped.path.display(),
            skipped.reason
        );
    }
    println!("Added {} file(s) to index.", report.added.len().to_string().cyan());
    Ok(true)
}

fn cmd_commit(work_root: PathBuf, message: &str) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let digest = repo.commit(message)?;

    println!("{} Committed: {}", "✓".green().bold(), digest.yellow().bold());
    println!("  Message: {}", message.cyan());
    Ok(true)
}

fn cmd_log(work_root: PathBuf) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let history = match repo.log() {
        Ok(history) => history,
        Err(ArborError::NoCommitsYet) => {
            println!("{}", "No commits yet.".yellow());
            return Ok(true);
        }
        Err(e) => return Err(e),
    };

    for entry in &history.entries {
        let marker = if entry.revoked {
            format!(" {}", "[REVOKED]".red().bold())
        } else {
            String::new()
        };
        println!("{} {}{}", "commit".yellow(), entry.digest.yellow(), marker);
        println!("Date: {}", entry.commit.time.format("%Y-%m-%dT%H:%M:%SZ"));
        println!();
        println!("    {}", entry.commit.message);
        println!();
    }

    match &history.end {
        LogEnd::Root => {}
        LogEnd::MissingCommit(digest) => {
            println!("{}", format!("(missing commit object {})", digest).red());
        }
        LogEnd::Undecodable { digest, reason } => {
            println!(
                "{}",
                format!("(commit object {} could not be decoded: {})", digest, reason).red()
            );
        }
        LogEnd::Cycle(digest) => {
            println!("{}", format!("(history loops back to {})", digest).red());
        }
    }
    Ok(true)
}

fn cmd_status(work_root: PathBuf) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let status = repo.status()?;

    match &status.head {
        Some(head) => println!("HEAD: {}", head.yellow()),
        None => println!("HEAD: {}", "none".dimmed()),
    }
    println!("Staged files:");
    for path in &status.staged {
        println!("   {}", path.cyan());
    }

    if status.head.is_some() {
        match status.head_tree_matches {
            Some(true) => println!("{}", "Working tree matches HEAD (for staged files).".green()),
            Some(false) => println!(
                "{}",
                "Working tree differs from HEAD (changes staged vs head).".yellow()
            ),
            None if status.staged.is_empty() => println!("{}", "Nothing staged.".dimmed()),
            None => println!(
                "{}",
                "Could not compare working tree to HEAD (missing objects?)".red()
            ),
        }
    }
    Ok(true)
}

fn cmd_checkout(work_root: PathBuf, target: Option<String>) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let result = repo.checkout(target.as_deref())?;

    println!("{} Checked out commit {}.", "✓".green().bold(), result.commit.yellow());
    println!("  Files written: {}", result.files_written.to_string().cyan());
    println!("  Bytes written: {}", arbor::utils::format_bytes(result.bytes_written).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(result.duration_ms)).to_string().cyan()
    );
    Ok(true)
}

fn cmd_verify(work_root: PathBuf, commit: Option<String>, all: bool) -> Result<bool> {
    let repo = Repository::open(&work_root)?;

    if all {
        println!("{}", "Verifying every stored object...".blue().bold());
        let report = repo.verify_store()?;

        println!("  Objects checked: {}", report.objects_checked);
        println!("  Corrupt objects: {}", report.corrupt.len().to_string().red());
        println!(
            "  Unreachable from HEAD: {}",
            report.orphans.len().to_string().yellow()
        );
        for finding in &report.corrupt {
            println!(" - {}", finding.message.red());
        }
        for orphan in &report.orphans {
            println!("   {} {}", "unreachable".dimmed(), orphan.dimmed());
        }
        println!(
            "  Verification time: {}",
            format_duration(Duration::from_millis(report.verification_time_ms))
        );
        return Ok(report.is_clean());
    }

    let report = match repo.verify(commit.as_deref()) {
        Ok(report) => report,
        Err(ArborError::NoCommitsYet) => {
            println!("{}", "No commits to verify.".yellow());
            return Ok(true);
        }
        Err(e) => return Err(e),
    };
    print_report(&report);
    Ok(report.is_clean())
}

fn print_report(report: &VerificationReport) {
    if report.is_clean() {
        println!(
            "{} OK: repository integrity verified ({} objects reachable from {}).",
            "✓".green().bold(),
            report.objects_checked,
            arbor::utils::short_id(&report.commit).yellow()
        );
    } else {
        println!("{}", "Verification FAILED. Issues found:".red().bold());
        for message in report.messages() {
            println!(" - {}", message);
        }
    }
}

fn cmd_revoke(work_root: PathBuf, commit: &str) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let (digest, outcome) = repo.revoke(commit)?;

    match outcome {
        RevokeOutcome::Revoked => {
            println!("{} Revoked commit {}.", "✓".green().bold(), digest.yellow())
        }
        RevokeOutcome::AlreadyRevoked => {
            println!("Commit {} is already revoked.", digest.yellow())
        }
    }
    Ok(true)
}

fn cmd_cat_file(work_root: PathBuf, hash: &str) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let (_, view) = repo.cat_file(hash)?;

    match view {
        ObjectView::Commit(commit) => println!("{}", pretty(&commit)?),
        ObjectView::Tree(tree) => println!("{}", pretty(&tree)?),
        ObjectView::Blob(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(true)
}

/// Indented JSON with sorted keys
fn pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(&serde_json::to_value(value)?)?)
}

fn cmd_reset(work_root: PathBuf) -> Result<bool> {
    let repo = Repository::open(&work_root)?;
    let count = repo.clear_staging()?;
    println!("Unstaged {} file(s).", count.to_string().cyan());
    Ok(true)
}
