//! labelsync CLI
//!
//! Command line tool for synchronizing GitHub labels across repositories

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labelsync::{
    config::{find_convention_config, load_labels_from_file, load_labels_from_stdin, LabelRegistry},
    observer::{BatchEvent, SyncEvent},
    report::LabelTotals,
    summarize, BatchConfig, BatchOptions, BatchStatus, BatchSyncResult, BatchSyncer, Error,
    GhCli, GitHubApi, LabelProvider, LabelSpec, LabelSyncer, ProviderFactory, RepositoryFilter,
    SyncObserver, SyncOptions, SyncResult, TracingObserver,
};

/// labelsync CLI
///
/// Declarative GitHub label synchronization
#[derive(Parser)]
#[command(
    name = "labelsync",
    version,
    about = "Declarative GitHub label synchronization",
    long_about = "Reconcile GitHub repository labels with a JSON or YAML label file. \
    Works on a single repository or in batch across explicit lists, organizations and users."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GitHub access token (api provider)
    #[arg(short = 't', long, global = true)]
    access_token: Option<String>,

    /// Backend used to reach GitHub
    #[arg(long, global = true, value_enum, default_value_t = ProviderKind::Api)]
    provider: ProviderKind,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// GitHub REST API
    Api,
    /// `gh` command line tool
    Gh,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize labels of one repository
    Sync {
        /// Target repository (owner/repo format)
        #[arg(short = 'r', long)]
        repository: String,

        /// Label file (JSON/YAML, `-` for stdin)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Reconciliation mode
        #[arg(long, default_value = "append", value_parser = ["append", "replace"])]
        mode: String,

        /// Dry run mode (don't make actual changes)
        #[arg(long)]
        dry_run: bool,
    },

    /// Synchronize labels across many repositories
    Batch(BatchArgs),

    /// Display current labels
    List {
        /// Target repository (owner/repo format)
        #[arg(short = 'r', long)]
        repository: String,

        /// Output format
        #[arg(long, default_value = "table", value_parser = ["table", "json", "yaml"])]
        format: String,
    },

    /// Export current labels as a label file
    Export {
        /// Source repository (owner/repo format)
        #[arg(short = 'r', long)]
        repository: String,

        /// Output format
        #[arg(long, default_value = "yaml", value_parser = ["json", "yaml"])]
        format: String,

        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Validate a label file
    Validate {
        /// Label file (JSON/YAML)
        file: PathBuf,
    },
}

#[derive(Args)]
struct BatchArgs {
    /// Label file (JSON/YAML, `-` for stdin)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Batch configuration file describing several targets
    #[arg(long, conflicts_with_all = ["config", "repos", "org", "user"])]
    batch_config: Option<PathBuf>,

    /// Comma separated repositories (owner/repo)
    #[arg(long, value_delimiter = ',')]
    repos: Vec<String>,

    /// Every repository of an organization
    #[arg(long)]
    org: Option<String>,

    /// Every repository of a user
    #[arg(long)]
    user: Option<String>,

    /// Reconciliation mode
    #[arg(long, default_value = "append", value_parser = ["append", "replace"])]
    mode: String,

    /// Repositories synchronized concurrently
    #[arg(long, default_value_t = labelsync::target::DEFAULT_PARALLEL)]
    parallel: usize,

    /// Dry run mode (don't make actual changes)
    #[arg(long)]
    dry_run: bool,

    /// Only repositories with this visibility
    #[arg(long, value_parser = ["public", "private", "internal", "all"])]
    visibility: Option<String>,

    /// Only repositories with this primary language
    #[arg(long)]
    language: Option<String>,

    /// Only archived (true) or non-archived (false) repositories
    #[arg(long)]
    archived: Option<bool>,

    /// Print per-repository results as JSON
    #[arg(long)]
    json: bool,
}

impl BatchArgs {
    /// Orchestrator options for a command-line driven batch
    fn options(&self) -> labelsync::Result<BatchOptions> {
        let filter = RepositoryFilter {
            visibility: self.visibility.as_deref().map(str::parse).transpose()?,
            language: self.language.clone(),
            archived: self.archived,
        };

        Ok(BatchOptions {
            repositories: (!self.repos.is_empty()).then(|| self.repos.clone()),
            organization: self.org.clone(),
            user: self.user.clone(),
            mode: self.mode.parse()?,
            dry_run: self.dry_run,
            parallel: self.parallel,
            filter,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Validate { file } = &cli.command {
        return run_validate(file);
    }

    let success = match cli.provider {
        ProviderKind::Api => {
            let token = get_access_token(cli.access_token)?;
            let api = GitHubApi::new(&token).await?;
            execute(cli.command, api, cli.verbose).await?
        }
        ProviderKind::Gh => execute(cli.command, GhCli::new(), cli.verbose).await?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "labelsync=info" } else { "warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run a provider-backed command, returning whether it finished cleanly
async fn execute<F: ProviderFactory>(
    command: Commands,
    factory: F,
    verbose: bool,
) -> anyhow::Result<bool> {
    match command {
        Commands::Sync {
            repository,
            config,
            mode,
            dry_run,
        } => {
            let labels = load_labels(config.as_deref())?;
            let options = SyncOptions {
                mode: mode.parse()?,
                dry_run,
            };
            run_sync(&factory, &repository, &labels, options, verbose).await
        }

        Commands::Batch(args) => run_batch(factory, &args, verbose).await,

        Commands::List { repository, format } => {
            run_list(&factory, &repository, &format).await?;
            Ok(true)
        }

        Commands::Export {
            repository,
            format,
            output,
        } => {
            run_export(&factory, &repository, &format, output.as_deref()).await?;
            Ok(true)
        }

        Commands::Validate { file } => {
            run_validate(&file)?;
            Ok(true)
        }
    }
}

/// Execute synchronization of one repository
async fn run_sync<F: ProviderFactory>(
    factory: &F,
    repository: &str,
    labels: &[LabelSpec],
    options: SyncOptions,
    verbose: bool,
) -> anyhow::Result<bool> {
    if verbose {
        println!(
            "{} Initializing sync for repository: {} ({} mode)",
            "•".blue(),
            repository.cyan(),
            options.mode
        );

        if options.dry_run {
            println!(
                "{} Running in dry-run mode (no changes will be made)",
                "!".yellow()
            );
        }
    }

    let (owner, repo) = labelsync::parse_repository(repository)?;
    let provider = factory.connect(&owner, &repo).await?;
    let result = LabelSyncer::new(provider, options)
        .with_repository(repository)
        .with_observer(Arc::new(TracingObserver))
        .sync_labels(labels)
        .await?;

    display_sync_result(&result, verbose);

    if result.has_errors() {
        eprintln!("\n{} Errors occurred:", "✗".red());
        for failure in &result.errors {
            eprintln!("  {}: {}", failure.name, failure.error.red());
        }
        return Ok(false);
    }

    Ok(true)
}

/// Prints one line per finished repository
struct CliProgress;

impl SyncObserver for CliProgress {
    fn on_sync_event(&self, repository: &str, event: &SyncEvent) {
        TracingObserver.on_sync_event(repository, event);
    }

    fn on_batch_event(&self, event: &BatchEvent) {
        TracingObserver.on_batch_event(event);

        if let BatchEvent::RepositoryCompleted {
            index,
            total,
            repository,
            status,
            error,
        } = event
        {
            let counter = format!("[{index}/{total}]");
            match status {
                BatchStatus::Success => {
                    println!("{} {} {}", counter.dimmed(), "✓".green(), repository.cyan())
                }
                BatchStatus::Skipped => {
                    println!("{} {} {}", counter.dimmed(), "-".yellow(), repository)
                }
                BatchStatus::Failed => eprintln!(
                    "{} {} {}: {}",
                    counter.dimmed(),
                    "✗".red(),
                    repository.cyan(),
                    error.as_deref().unwrap_or("Unknown error").red()
                ),
            }
        }
    }
}

/// Execute a batch run
async fn run_batch<F: ProviderFactory>(
    factory: F,
    args: &BatchArgs,
    verbose: bool,
) -> anyhow::Result<bool> {
    let syncer = BatchSyncer::new(factory).with_observer(Arc::new(CliProgress));
    let mut results = Vec::new();

    if let Some(path) = &args.batch_config {
        let config = BatchConfig::load(path)
            .with_context(|| format!("Failed to load batch config {}", path.display()))?;

        for job in config.jobs()? {
            let labels = load_labels_from_file(&job.label_file)?;
            let options = BatchOptions {
                dry_run: args.dry_run,
                ..job.options
            };
            if verbose {
                println!(
                    "{} Running target with {} ({} mode)",
                    "•".blue(),
                    job.label_file.display().to_string().cyan(),
                    options.mode
                );
            }
            results.extend(syncer.sync_multiple(&labels, &options).await?);
        }
    } else {
        let labels = load_labels(args.config.as_deref())?;
        let options = args.options()?;
        if options.dry_run {
            println!(
                "{} Running in dry-run mode (no changes will be made)",
                "!".yellow()
            );
        }
        results = syncer.sync_multiple(&labels, &options).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    display_batch_results(&results, verbose);

    Ok(summarize(&results).failed == 0)
}

/// Execute list command
async fn run_list<F: ProviderFactory>(
    factory: &F,
    repository: &str,
    format: &str,
) -> anyhow::Result<()> {
    let (owner, repo) = labelsync::parse_repository(repository)?;
    let labels = factory.connect(&owner, &repo).await?.fetch_labels().await?;

    match format {
        "table" => {
            println!(
                "{:<30} {:<8} {:<50}",
                "Name".cyan(),
                "Color".cyan(),
                "Description".cyan()
            );
            println!("{}", "─".repeat(90));

            for label in labels {
                let description = if label.description.is_empty() {
                    "(none)"
                } else {
                    label.description.as_str()
                };
                println!(
                    "{:<30} {:<8} {:<50}",
                    label.name,
                    format!("#{}", label.color),
                    description
                );
            }
        }
        "json" => println!("{}", serde_json::to_string_pretty(&labels)?),
        "yaml" => println!("{}", serde_yaml::to_string(&labels)?),
        _ => return Err(Error::config_validation("Unsupported format").into()),
    }

    Ok(())
}

/// Execute export command
async fn run_export<F: ProviderFactory>(
    factory: &F,
    repository: &str,
    format: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let (owner, repo) = labelsync::parse_repository(repository)?;
    let remote = factory.connect(&owner, &repo).await?.fetch_labels().await?;
    let labels: Vec<LabelSpec> = remote.into_iter().map(LabelSpec::from).collect();
    let count = labels.len();
    let registry = LabelRegistry::export(labels, "1.0", Some(repository));

    let content = match format {
        "json" => serde_json::to_string_pretty(&registry)?,
        "yaml" => serde_yaml::to_string(&registry)?,
        _ => return Err(Error::config_validation("Unsupported format").into()),
    };

    if let Some(output_path) = output {
        std::fs::write(output_path, content)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        println!(
            "{} {} labels exported to: {}",
            "✓".green(),
            count,
            output_path.display().to_string().cyan()
        );
    } else {
        println!("{}", content);
    }

    Ok(())
}

/// Execute validate command
fn run_validate(path: &Path) -> anyhow::Result<()> {
    let labels = load_labels_from_file(path)?;
    println!(
        "{} {} is valid ({} labels)",
        "✓".green(),
        path.display().to_string().cyan(),
        labels.len()
    );
    Ok(())
}

/// Display synchronization results
fn display_sync_result(result: &SyncResult, verbose: bool) {
    if result.dry_run && result.has_changes() {
        println!("\n{} Sync preview (dry-run mode):", "•".blue());
    } else if result.has_changes() {
        println!("\n{} Sync completed:", "✓".green());
    } else {
        println!("\n{} No changes required", "✓".green());
    }

    println!("  Created: {}", result.created.len().to_string().green());
    println!("  Updated: {}", result.updated.len().to_string().yellow());
    println!("  Deleted: {}", result.deleted.len().to_string().red());
    println!("  Unchanged: {}", result.unchanged.len().to_string().white());
    if result.has_errors() {
        println!("  Errors: {}", result.errors.len().to_string().red());
    }

    if verbose {
        println!("\n{} Detailed operations:", "•".blue());
        for label in &result.created {
            println!("  {} Create label: {} (#{})", "+".green(), label.name.cyan(), label.color);
        }
        for label in &result.updated {
            println!("  {} Update label: {} (#{})", "~".yellow(), label.name.cyan(), label.color);
        }
        for name in &result.deleted {
            println!("  {} Delete label: {}", "-".red(), name.red());
        }
        for label in &result.unchanged {
            println!("  {} No change: {}", "=".white(), label.name.white());
        }
    }
}

/// Display batch totals and failures
fn display_batch_results(results: &[BatchSyncResult], verbose: bool) {
    let summary = summarize(results);
    let totals = LabelTotals::from_results(results);

    println!();
    print!("{summary}");

    if verbose {
        println!(
            "\nLabels: {} created, {} updated, {} deleted, {} unchanged, {} errors",
            totals.created.to_string().green(),
            totals.updated.to_string().yellow(),
            totals.deleted.to_string().red(),
            totals.unchanged,
            totals.errors.to_string().red()
        );
    }
}

/// Get access token
fn get_access_token(arg_token: Option<String>) -> labelsync::Result<String> {
    arg_token
        .or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .ok_or_else(|| Error::config_validation(
            "GitHub access token is required. Set via --access-token, GITHUB_TOKEN env var, or -t flag"
        ))
}

/// Load the label file given on the command line, or the convention file
fn load_labels(config_path: Option<&Path>) -> labelsync::Result<Vec<LabelSpec>> {
    match config_path {
        Some(path) if path == Path::new("-") => load_labels_from_stdin(),
        Some(path) => load_labels_from_file(path),
        None => {
            let path = find_convention_config().ok_or_else(|| {
                Error::config_validation(
                    "No label file given. Use -c, or add .labelsync.yaml to the current directory",
                )
            })?;
            tracing::info!(path = %path.display(), "using convention label file");
            load_labels_from_file(path)
        }
    }
}
