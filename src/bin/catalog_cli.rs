use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_api::{
    auth::{api_key, ApiKeyService},
    config::{self, AppConfig},
    db::{self, DbPool},
};
use chrono::{Duration, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context, cli.json).await?,
        Commands::IssueKey(args) => handle_issue_key(&context, args, cli.json).await?,
        Commands::RevokeKey(args) => handle_revoke_key(&context, args, cli.json).await?,
        Commands::ListKeys => handle_list_keys(&context, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "catalog-cli",
    about = "Catalog API administration: migrations and API keys",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Issue a new API key; the key is printed once and never stored
    IssueKey(IssueKeyArgs),
    /// Revoke an API key by its prefix
    RevokeKey(RevokeKeyArgs),
    /// List issued API keys (without secrets)
    ListKeys,
}

#[derive(Args)]
struct IssueKeyArgs {
    #[arg(long, help = "Human-readable label for the key")]
    name: String,
    #[arg(long, help = "Expire the key after this many days")]
    expires_in_days: Option<u32>,
}

#[derive(Args)]
struct RevokeKeyArgs {
    #[arg(help = "Key prefix (the part before the dot)")]
    prefix: String,
}

struct CliContext {
    _config: AppConfig,
    db: Arc<DbPool>,
    api_keys: ApiKeyService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        let api_keys = ApiKeyService::new(db.clone()).with_header(&config.api_key_header);

        Ok(Self {
            _config: config,
            db,
            api_keys,
        })
    }
}

#[derive(Serialize)]
struct MigrateOutcome {
    migrated: bool,
}

async fn handle_migrate(context: &CliContext, json: bool) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;

    if json {
        print_json(&MigrateOutcome { migrated: true })?;
    } else {
        println!("Migrations applied");
    }
    Ok(())
}

async fn handle_issue_key(context: &CliContext, args: IssueKeyArgs, json: bool) -> Result<()> {
    let expires_at = args
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(i64::from(days)));

    let issued = context
        .api_keys
        .issue(&args.name, expires_at)
        .await
        .context("failed to issue API key")?;

    if json {
        print_json(&issued)?;
    } else {
        println!("Issued API key {} ({})", issued.prefix, issued.name);
        if let Some(expires_at) = issued.expires_at {
            println!("Expires: {}", expires_at.to_rfc3339());
        }
        println!();
        println!("  {}", issued.key);
        println!();
        println!("Store it now; it cannot be shown again.");
    }
    Ok(())
}

async fn handle_revoke_key(context: &CliContext, args: RevokeKeyArgs, json: bool) -> Result<()> {
    let record = context
        .api_keys
        .revoke(args.prefix.trim())
        .await
        .with_context(|| format!("failed to revoke API key {}", args.prefix))?;

    if json {
        print_json(&record)?;
    } else {
        println!("Revoked API key {} ({})", record.prefix, record.name);
    }
    Ok(())
}

async fn handle_list_keys(context: &CliContext, json: bool) -> Result<()> {
    let keys = context
        .api_keys
        .list()
        .await
        .context("failed to list API keys")?;

    if json {
        print_json(&keys)?;
        return Ok(());
    }

    if keys.is_empty() {
        println!("No API keys issued");
        return Ok(());
    }
    for key in &keys {
        render_key(key);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_key(key: &api_key::Model) {
    let state = if key.revoked {
        "revoked"
    } else if key.is_expired() {
        "expired"
    } else {
        "active"
    };
    let last_used = key
        .last_used_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "- {} • {} • {} • created {} • last used {}",
        key.prefix,
        key.name,
        state,
        key.created_at.to_rfc3339(),
        last_used
    );
}
