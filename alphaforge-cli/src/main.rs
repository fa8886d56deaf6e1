//! AlphaForge CLI — catalog inspection, expression generation, batch runs.
//!
//! Commands:
//! - `fields` — fetch the data-field catalog for the configured scope
//! - `generate` — render candidate expressions without submitting anything
//! - `run` — full pipeline: fetch, generate, simulate, report

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alphaforge_core::catalog::fetch_fields;
use alphaforge_core::generator::generate;
use alphaforge_core::session::{SessionConfig, SessionManager};
use alphaforge_core::transport::HttpTransport;
use alphaforge_runner::batch::{run_batch, BatchOptions, StdoutProgress};
use alphaforge_runner::config::BatchConfig;
use alphaforge_runner::credentials::load_credentials;
use alphaforge_runner::report::{render_summary, write_results_csv};

#[derive(Parser)]
#[command(
    name = "alphaforge",
    about = "AlphaForge CLI — combinatorial alpha search over a remote research platform"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the data-field catalog for the configured scope.
    Fields {
        /// Path to the batch config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the credentials JSON file.
        #[arg(long, default_value = "credentials.json")]
        credentials: PathBuf,

        /// Print at most this many fields.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Render candidate expressions without submitting anything.
    Generate {
        /// Path to the batch config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the credentials JSON file.
        #[arg(long, default_value = "credentials.json")]
        credentials: PathBuf,

        /// Print at most this many expressions.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Full pipeline: fetch fields, generate expressions, simulate, report.
    Run {
        /// Path to the batch config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the credentials JSON file.
        #[arg(long, default_value = "credentials.json")]
        credentials: PathBuf,

        /// Where to write the results CSV.
        #[arg(long, default_value = "results.csv")]
        output: PathBuf,

        /// Submit at most this many expressions.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fields {
            config,
            credentials,
            limit,
        } => cmd_fields(config.as_deref(), &credentials, limit),
        Commands::Generate {
            config,
            credentials,
            limit,
        } => cmd_generate(config.as_deref(), &credentials, limit),
        Commands::Run {
            config,
            credentials,
            output,
            limit,
        } => cmd_run(config.as_deref(), &credentials, &output, limit),
    }
}

fn load_config(path: Option<&Path>) -> Result<BatchConfig> {
    match path {
        Some(path) => BatchConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(BatchConfig::default()),
    }
}

fn open_session(credentials_path: &Path) -> Result<SessionManager> {
    let credentials = load_credentials(credentials_path).with_context(|| {
        format!(
            "failed to load credentials from {}",
            credentials_path.display()
        )
    })?;
    let session = SessionManager::login(
        Arc::new(HttpTransport::new()),
        credentials,
        SessionConfig::default(),
    )
    .context("authentication failed")?;
    Ok(session)
}

fn cmd_fields(
    config_path: Option<&Path>,
    credentials_path: &Path,
    limit: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let session = open_session(credentials_path)?;

    let fields = fetch_fields(&session, &config.scope).context("catalog fetch failed")?;
    let shown = limit.unwrap_or(fields.len()).min(fields.len());
    for field in &fields[..shown] {
        println!(
            "{}\t{:?}\t{}",
            field.id,
            field.field_type,
            field.dataset_id.as_deref().unwrap_or("-")
        );
    }
    println!("{} fields ({} shown)", fields.len(), shown);
    Ok(())
}

fn cmd_generate(
    config_path: Option<&Path>,
    credentials_path: &Path,
    limit: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let session = open_session(credentials_path)?;

    let fields = fetch_fields(&session, &config.scope).context("catalog fetch failed")?;
    let expressions = generate(&fields, &config.grammar);
    let shown = limit.unwrap_or(expressions.len()).min(expressions.len());
    for expr in &expressions[..shown] {
        println!("{}", expr.expression);
    }
    println!("{} expressions ({} shown)", expressions.len(), shown);
    Ok(())
}

fn cmd_run(
    config_path: Option<&Path>,
    credentials_path: &Path,
    output: &Path,
    limit: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let session = open_session(credentials_path)?;

    let fields = fetch_fields(&session, &config.scope).context("catalog fetch failed")?;
    println!("{} catalog fields in scope", fields.len());

    let mut expressions = generate(&fields, &config.grammar);
    if let Some(limit) = limit {
        expressions.truncate(limit);
    }
    println!(
        "{} expressions to simulate, {} at a time",
        expressions.len(),
        config.batch.concurrency_limit
    );

    let options = BatchOptions {
        concurrency_limit: config.batch.concurrency_limit,
        settings: config.simulation.clone(),
        poll: config.batch.poll_config(),
    };
    let report = run_batch(&session, &expressions, &options, Some(&StdoutProgress), None)
        .context("batch run failed")?;

    write_results_csv(output, &report.results)?;
    println!("{}", render_summary(&report.summary));
    println!("Results written to {}", output.display());

    if report.summary.errored > 0 {
        std::process::exit(1);
    }
    Ok(())
}
