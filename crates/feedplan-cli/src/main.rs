mod cache_cmd;
mod catalog_cmd;
mod config;
mod creators_cmd;
mod plan_cmds;
mod stats_cmd;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use uuid::Uuid;

use feedplan_core::config::ProviderKind;
use feedplan_db::pool;

use config::{CliOverrides, FeedplanConfig};

#[derive(Parser)]
#[command(name = "feedplan", about = "Daily action plan generator", version)]
struct Cli {
    /// Database URL (overrides FEEDPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Generative backend: anthropic, ollama or static (overrides FEEDPLAN_PROVIDER env var)
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a feedplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/feedplan")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the feedplan database (requires config file or env vars)
    DbInit,
    /// Generate (or fetch) today's plan
    Plan {
        /// User ID; omit for an anonymous plan
        #[arg(long)]
        user: Option<Uuid>,
        /// Category (defaults to the configured default)
        #[arg(long)]
        category: Option<String>,
        /// Language code: en, ru or es
        #[arg(long)]
        language: Option<String>,
        /// Number of actions (3 to 8)
        #[arg(long)]
        count: Option<usize>,
        /// Run against an in-memory store; nothing is persisted
        #[arg(long)]
        memory: bool,
        /// Catalog JSON file loaded into the in-memory store (with --memory)
        #[arg(long, requires = "memory")]
        catalog: Option<PathBuf>,
        /// Print the plan envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a plan action as done
    Complete {
        /// User ID owning the plan
        user: Uuid,
        /// Action ID from the plan
        action_id: Uuid,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's streak, XP and level
    Stats {
        /// User ID
        user: Uuid,
        /// Print the stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Shared plan cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Content catalog management
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Creators a user never wants planned
    Creators {
        #[command(subcommand)]
        command: CreatorCommands,
    },
    /// Motivation message templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove expired cache entries
    Purge {
        /// Remove every entry, expired or not
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Import catalog items from a JSON file (array of items)
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Delete expired catalog items
    Prune,
}

#[derive(Subcommand)]
pub enum CreatorCommands {
    /// Block a creator for a user
    Block {
        /// User ID
        user: Uuid,
        /// Creator handle, e.g. @name
        creator: String,
        /// Why the creator was blocked
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove a block
    Unblock {
        /// User ID
        user: Uuid,
        /// Creator handle
        creator: String,
    },
    /// List a user's blocked creators
    List {
        /// User ID
        user: Uuid,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Import message templates from a JSON file (array of templates)
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

/// Execute the `feedplan init` command: write config file.
fn cmd_init(db_url: &str, provider: Option<ProviderKind>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    cfg.database.url = db_url.to_owned();
    if let Some(kind) = provider {
        cfg.provider.kind = kind;
    }

    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  provider.kind = {}", cfg.provider.kind);
    println!();
    println!("Next: run `feedplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `feedplan db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &FeedplanConfig) -> anyhow::Result<()> {
    println!("Initializing feedplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("feedplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so `--json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        database_url: cli.database_url,
        provider: cli.provider,
    };

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, overrides.provider, force)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "feedplan", &mut std::io::stdout());
        }
        Commands::DbInit => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Plan {
            user,
            category,
            language,
            count,
            memory,
            catalog,
            json,
        } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let request = plan_cmds::request(user, category, language, count);
            if memory {
                plan_cmds::run_plan_in_memory(&resolved, &request, catalog.as_deref(), json).await?;
            } else {
                let db_pool = pool::create_pool(&resolved.db_config).await?;
                let result = plan_cmds::run_plan(&db_pool, &resolved, &request, json).await;
                db_pool.close().await;
                result?;
            }
        }
        Commands::Complete {
            user,
            action_id,
            json,
        } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_complete(&db_pool, &resolved, user, action_id, json).await;
            db_pool.close().await;
            result?;
        }
        Commands::Stats { user, json } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = stats_cmd::run_stats(&db_pool, user, json).await;
            db_pool.close().await;
            result?;
        }
        Commands::Cache { command } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = cache_cmd::run_cache_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Catalog { command } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = catalog_cmd::run_catalog_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Creators { command } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = creators_cmd::run_creator_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Templates { command } => {
            let resolved = FeedplanConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = catalog_cmd::run_template_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
