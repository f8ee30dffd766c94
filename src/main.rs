// src/main.rs

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use quarry::db;
use quarry::db::models::{InstalledPackage, Repository, TxRecord, TxStatus};
use quarry::fetch::Fetcher;
use quarry::repository;
use quarry::transaction::{
    Action, Executor, Outcome, Planner, TransactionPlan, TransactionResult, TxMode,
};
use tracing::info;

/// Default location of the installed-package database
const DEFAULT_DB_PATH: &str = "/var/lib/quarry/quarry.db";

/// Default download cache for repository packages
const DEFAULT_CACHE_DIR: &str = "/var/cache/quarry/packages";

#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about = "Package manager with transactional installs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by install and reinstall
#[derive(Args)]
struct InstallOpts {
    /// Install targets: package names, file paths, file:// or http(s):// URLs
    #[arg(required = true)]
    specs: Vec<String>,
    /// Answer yes to all prompts
    #[arg(short = 'y', long = "assumeyes")]
    assume_yes: bool,
    /// Accept repository packages without a published checksum
    #[arg(long)]
    nogpgcheck: bool,
    /// Roll back the entire transaction if any entry fails
    #[arg(long)]
    all_or_nothing: bool,
    /// Database path
    #[arg(short, long, default_value = DEFAULT_DB_PATH)]
    db_path: String,
    /// Package download cache directory
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Quarry database
    Init {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Install packages from files, URLs, or repositories
    Install {
        #[command(flatten)]
        opts: InstallOpts,
    },
    /// Reinstall packages, even when the same version is already installed
    Reinstall {
        #[command(flatten)]
        opts: InstallOpts,
    },
    /// Remove installed packages
    Erase {
        /// Package names to remove
        #[arg(required = true)]
        names: Vec<String>,
        /// Answer yes to all prompts
        #[arg(short = 'y', long = "assumeyes")]
        assume_yes: bool,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// List installed packages
    List {
        /// Package name pattern (optional, shows all if omitted)
        pattern: Option<String>,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show transaction history
    History {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Refresh metadata for all enabled repositories
    Makecache {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Manage package repositories
    Repo {
        #[command(subcommand)]
        action: RepoCommands,
    },
    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,
        /// Base URL serving metadata.json and packages
        url: String,
        /// Lower numbers win when several repositories carry a package
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Add the repository disabled
        #[arg(long)]
        disabled: bool,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Remove a repository
    Remove {
        /// Repository name
        name: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// List configured repositories
    List {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Enable a repository
    Enable {
        /// Repository name
        name: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Disable a repository
    Disable {
        /// Repository name
        name: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
}

fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            // Typed errors carry their own documented exit code
            err.downcast_ref::<quarry::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1)
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing Quarry database at: {}", db_path);
            db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(0)
        }
        Some(Commands::Install { opts }) => run_transaction(TxMode::Install, opts),
        Some(Commands::Reinstall { opts }) => run_transaction(TxMode::Reinstall, opts),
        Some(Commands::Erase {
            names,
            assume_yes,
            db_path,
        }) => cmd_erase(&names, assume_yes, &db_path),
        Some(Commands::List { pattern, db_path }) => cmd_list(pattern.as_deref(), &db_path),
        Some(Commands::History { db_path }) => cmd_history(&db_path),
        Some(Commands::Makecache { db_path }) => {
            let conn = db::open(&db_path)?;
            let count = repository::sync_all(&conn)?;
            println!("Metadata cache created: {} package(s) indexed.", count);
            Ok(0)
        }
        Some(Commands::Repo { action }) => cmd_repo(action),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "quarry", &mut io::stdout());
            Ok(0)
        }
        None => {
            println!("Quarry Package Manager v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'quarry --help' for usage information");
            Ok(0)
        }
    }
}

/// Plan and execute an install or reinstall invocation
fn run_transaction(mode: TxMode, opts: InstallOpts) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let mut conn = db::open(&opts.db_path)?;
    let fetcher = Fetcher::new()?;

    let planner = Planner::new(mode);
    let plan = planner.plan(&conn, &opts.specs, &cwd, &fetcher)?;

    print!("{}", render_plan(&plan));

    if plan.is_noop() {
        println!("Nothing to do.");
        return Ok(0);
    }

    if !opts.assume_yes && !confirm()? {
        println!("Operation aborted.");
        return Ok(0);
    }

    let executor = Executor {
        all_or_nothing: opts.all_or_nothing,
        download_dir: PathBuf::from(&opts.cache_dir),
        gpgcheck: !opts.nogpgcheck,
    };
    let result = executor.execute(&mut conn, &opts.db_path, plan)?;

    print!("{}", render_result(&result));
    Ok(result.exit_code)
}

/// Render the pre-execution summary, grouping entries by planned action
fn render_plan(plan: &TransactionPlan) -> String {
    let mut out = String::new();

    let installing: Vec<_> = plan.with_action(Action::Install).collect();
    if !installing.is_empty() {
        out.push_str("Installing:\n");
        for entry in installing {
            out.push_str(&format!("  {}\n", entry.identity));
        }
    }

    let reinstalling: Vec<_> = plan.with_action(Action::Reinstall).collect();
    if !reinstalling.is_empty() {
        out.push_str("Reinstalling:\n");
        for entry in reinstalling {
            out.push_str(&format!("  {}\n", entry.identity));
        }
    }

    for entry in plan.with_action(Action::Skip) {
        out.push_str(&format!(
            "Package {} is already installed, skipping.\n",
            entry.identity
        ));
    }

    out
}

/// Render the post-execution report
fn render_result(result: &TransactionResult) -> String {
    let mut out = String::new();

    for report in &result.entries {
        if let Outcome::Failed(err) = &report.outcome {
            out.push_str(&format!("Failed {}: {}\n", report.identity, err));
        }
    }

    if result.rolled_back {
        out.push_str("Transaction failed; all changes rolled back.\n");
    } else if result.success() {
        out.push_str("Complete!\n");
    }

    out
}

/// Prompt for confirmation on stdin
fn confirm() -> Result<bool> {
    print!("Is this ok [y/N]: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn cmd_erase(names: &[String], assume_yes: bool, db_path: &str) -> Result<i32> {
    let mut conn = db::open(db_path)?;

    // Resolve every name before touching anything
    let mut doomed = Vec::new();
    for name in names {
        let found = InstalledPackage::find_by_name(&conn, name)?;
        if found.is_empty() {
            return Err(quarry::Error::NotFoundError(format!(
                "Package '{}' is not installed",
                name
            ))
            .into());
        }
        doomed.extend(found);
    }

    println!("Removing:");
    for pkg in &doomed {
        println!("  {}-{}", pkg.name, pkg.version);
    }

    if !assume_yes && !confirm()? {
        println!("Operation aborted.");
        return Ok(0);
    }

    for pkg in &doomed {
        let pkg_id = pkg
            .id
            .ok_or_else(|| quarry::Error::InitError("Package row has no ID".to_string()))?;
        db::transaction(&mut conn, |tx| {
            let mut record =
                TxRecord::new(format!("Erase {}-{}", pkg.name, pkg.version));
            record.insert(tx)?;
            InstalledPackage::delete(tx, pkg_id)?;
            record.update_status(tx, TxStatus::Applied)?;
            Ok(())
        })?;
        println!("Removed {}-{}", pkg.name, pkg.version);
    }

    println!("Complete!");
    Ok(0)
}

fn cmd_list(pattern: Option<&str>, db_path: &str) -> Result<i32> {
    let conn = db::open(db_path)?;

    let packages = match pattern {
        Some(pattern) => InstalledPackage::find_by_name(&conn, pattern)?,
        None => InstalledPackage::list_all(&conn)?,
    };

    if packages.is_empty() {
        println!("No packages found.");
    } else {
        println!("Installed packages:");
        for pkg in &packages {
            print!("  {} {}", pkg.name, pkg.version);
            if let Some(arch) = &pkg.architecture {
                print!(" [{}]", arch);
            }
            println!();
        }
        println!("\nTotal: {} package(s)", packages.len());
    }

    Ok(0)
}

fn cmd_history(db_path: &str) -> Result<i32> {
    let conn = db::open(db_path)?;

    let records = TxRecord::list_all(&conn)?;

    if records.is_empty() {
        println!("No transaction history.");
    } else {
        println!("Transaction history:");
        for record in &records {
            let timestamp = record
                .applied_at
                .as_deref()
                .or(record.created_at.as_deref())
                .unwrap_or("pending");

            println!(
                "  [{}] {} - {} ({})",
                record.id.unwrap_or_default(),
                timestamp,
                record.description,
                record.status.as_str()
            );
        }
        println!("\nTotal: {} transaction(s)", records.len());
    }

    Ok(0)
}

fn cmd_repo(action: RepoCommands) -> Result<i32> {
    match action {
        RepoCommands::Add {
            name,
            url,
            priority,
            disabled,
            db_path,
        } => {
            let conn = db::open(&db_path)?;
            let repo = repository::add_repository(&conn, name, url, !disabled, priority)?;
            println!("Added repository '{}' ({})", repo.name, repo.url);
            Ok(0)
        }
        RepoCommands::Remove { name, db_path } => {
            let conn = db::open(&db_path)?;
            repository::remove_repository(&conn, &name)?;
            println!("Removed repository '{}'", name);
            Ok(0)
        }
        RepoCommands::List { db_path } => {
            let conn = db::open(&db_path)?;
            let repos = Repository::list_all(&conn)?;
            if repos.is_empty() {
                println!("No repositories configured.");
            } else {
                println!("Repositories:");
                for repo in &repos {
                    println!(
                        "  {} {} (priority {}, {})",
                        repo.name,
                        repo.url,
                        repo.priority,
                        if repo.enabled { "enabled" } else { "disabled" }
                    );
                }
            }
            Ok(0)
        }
        RepoCommands::Enable { name, db_path } => {
            let conn = db::open(&db_path)?;
            repository::set_repository_enabled(&conn, &name, true)?;
            println!("Repository '{}' enabled", name);
            Ok(0)
        }
        RepoCommands::Disable { name, db_path } => {
            let conn = db::open(&db_path)?;
            repository::set_repository_enabled(&conn, &name, false)?;
            println!("Repository '{}' disabled", name);
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::db::models::RepositoryPackage;
    use quarry::packages::PackageIdentity;
    use quarry::transaction::{EntryReport, EntrySource, PlanEntry};

    fn repo_entry(action: Action, name: &str, version: &str) -> PlanEntry {
        let mut candidate = RepositoryPackage::new(
            1,
            name.to_string(),
            version.to_string(),
            10,
            format!("http://repo/{}-{}.rpm", name, version),
        );
        candidate.architecture = Some("x86_64".to_string());
        PlanEntry {
            identity: PackageIdentity {
                name: name.to_string(),
                version: version.to_string(),
                architecture: Some("x86_64".to_string()),
            },
            action,
            source: EntrySource::Repo(candidate),
        }
    }

    #[test]
    fn test_render_plan_groups_by_action() {
        let plan = TransactionPlan {
            mode: TxMode::Install,
            entries: vec![
                repo_entry(Action::Install, "pkg-a", "1.0-1"),
                repo_entry(Action::Reinstall, "pkg-b", "2.0-1"),
            ],
        };

        let out = render_plan(&plan);
        assert!(out.contains("Installing:\n  pkg-a-1.0-1.x86_64"));
        assert!(out.contains("Reinstalling:\n  pkg-b-2.0-1.x86_64"));
        assert!(!out.contains("Nothing to do"));
    }

    #[test]
    fn test_render_plan_reinstall_never_reads_as_noop() {
        let plan = TransactionPlan {
            mode: TxMode::Reinstall,
            entries: vec![repo_entry(Action::Reinstall, "pkg-a", "1.0-1")],
        };

        assert!(!plan.is_noop());
        let out = render_plan(&plan);
        assert!(out.contains("Reinstalling"));
        assert!(!out.contains("Nothing to do"));
    }

    #[test]
    fn test_render_plan_skip_lines() {
        let plan = TransactionPlan {
            mode: TxMode::Install,
            entries: vec![repo_entry(Action::Skip, "pkg-a", "1.0-1")],
        };

        assert!(plan.is_noop());
        let out = render_plan(&plan);
        assert!(out.contains("already installed"));
        assert!(!out.contains("Reinstalling"));
    }

    #[test]
    fn test_render_result_reports_failures() {
        let result = TransactionResult {
            entries: vec![EntryReport {
                identity: PackageIdentity {
                    name: "pkg-a".to_string(),
                    version: "1.0-1".to_string(),
                    architecture: Some("x86_64".to_string()),
                },
                action: Action::Install,
                outcome: Outcome::Failed(quarry::Error::RemoteNotFound(
                    "http://repo/pkg-a-1.0-1.rpm".to_string(),
                )),
            }],
            exit_code: 1622,
            rolled_back: false,
        };

        let out = render_result(&result);
        assert!(out.contains("Failed pkg-a-1.0-1.x86_64"));
        assert!(!out.contains("Complete!"));
    }

    #[test]
    fn test_render_result_success() {
        let result = TransactionResult {
            entries: vec![],
            exit_code: 0,
            rolled_back: false,
        };
        assert!(render_result(&result).contains("Complete!"));
    }
}
