//! feedz-sync command-line tool.
//!
//! Syncs a device's feed subscriptions and read markers with the snapshots
//! stored on Nostr relays.
//!
//! # Usage
//!
//! ```bash
//! # Show the newest remote subscription snapshot
//! feedz-sync fetch --owner npub1...
//!
//! # Diff local state against it, apply the diff, and republish
//! FEEDZ_SECRET_KEY=nsec1... feedz-sync sync --owner npub1... --state feeds.json --apply --publish
//!
//! # Read markers
//! feedz-sync read-status fetch --owner npub1...
//! feedz-sync read-status sync --owner npub1... --state feeds.json --apply
//! FEEDZ_SECRET_KEY=nsec1... feedz-sync read-status publish --state feeds.json
//! ```
//!
//! Relays and timeouts come from `FEEDZ_RELAYS`, `FEEDZ_RELAY_TIMEOUT_SECS`
//! and `FEEDZ_SYNC_TIMEOUT_SECS` (see [`SyncConfig::from_env`]); `--relays`
//! overrides the list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedz_sync::{LocalState, SyncClient, SyncConfig};
use nostr::{Keys, Timestamp};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Sync feed subscriptions and read status over Nostr relays.
#[derive(Parser, Debug)]
#[command(name = "feedz-sync")]
#[command(about = "Sync feed subscriptions and read status over Nostr relays")]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env", global = true)]
    dotenv: String,

    /// Relay URLs (comma-separated, overrides FEEDZ_RELAYS)
    #[arg(long, value_delimiter = ',', global = true)]
    relays: Option<Vec<String>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the newest remote subscription snapshot
    Fetch {
        /// Owner public key (npub or hex)
        #[arg(long)]
        owner: String,
    },

    /// Merge the remote subscription snapshot into local state
    Sync {
        /// Owner public key (npub or hex)
        #[arg(long)]
        owner: String,

        /// Local state file
        #[arg(long)]
        state: PathBuf,

        /// Write the merged state back to the state file
        #[arg(long)]
        apply: bool,

        /// Publish the merged feeds (needs FEEDZ_SECRET_KEY for --owner)
        #[arg(long)]
        publish: bool,
    },

    /// Read-status snapshot commands
    #[command(subcommand)]
    ReadStatus(ReadStatusCommand),
}

#[derive(Subcommand, Debug)]
enum ReadStatusCommand {
    /// Print the newest remote read-status snapshot
    Fetch {
        /// Owner public key (npub or hex)
        #[arg(long)]
        owner: String,
    },

    /// Merge remote read markers into local state
    Sync {
        /// Owner public key (npub or hex)
        #[arg(long)]
        owner: String,

        /// Local state file
        #[arg(long)]
        state: PathBuf,

        /// Write the merged markers back to the state file
        #[arg(long)]
        apply: bool,
    },

    /// Publish the local read markers (needs FEEDZ_SECRET_KEY)
    Publish {
        /// Local state file
        #[arg(long)]
        state: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedz_sync=debug,feedz_core=debug")),
        )
        .init();

    let mut config = SyncConfig::from_env().context("Failed to load sync configuration")?;
    if let Some(relays) = args.relays {
        config = config
            .with_relays(relays)
            .context("Invalid --relays")?;
    }
    tracing::info!(relays = ?config.relay_names(), "Using relays");

    let client = SyncClient::new(config);

    match args.command {
        Command::Fetch { owner } => fetch(&client, &owner).await,
        Command::Sync {
            owner,
            state,
            apply,
            publish,
        } => sync(&client, &owner, &state, apply, publish).await,
        Command::ReadStatus(ReadStatusCommand::Fetch { owner }) => {
            fetch_read_status(&client, &owner).await
        }
        Command::ReadStatus(ReadStatusCommand::Sync {
            owner,
            state,
            apply,
        }) => sync_read_status(&client, &owner, &state, apply).await,
        Command::ReadStatus(ReadStatusCommand::Publish { state }) => {
            publish_read_status(&client, &state).await
        }
    }
}

async fn fetch(client: &SyncClient, owner: &str) -> Result<()> {
    let outcome = client
        .fetch_subscriptions(owner)
        .await
        .context("Failed to fetch subscriptions")?;

    let output = match outcome.record {
        Some(decoded) => json!({
            "eventId": decoded.event_id.to_hex(),
            "createdAt": decoded.created_at,
            "contentValid": decoded.content_valid,
            "rss": decoded.snapshot.url_feeds,
            "nostr": decoded.snapshot.key_feeds,
            "tags": decoded.snapshot.tags_by_address,
            "deleted": decoded.snapshot.deleted(),
            "stats": outcome.stats,
        }),
        None => json!({ "found": false, "stats": outcome.stats }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn sync(
    client: &SyncClient,
    owner: &str,
    state_path: &Path,
    apply: bool,
    publish: bool,
) -> Result<()> {
    let mut state = LocalState::load(state_path)
        .with_context(|| format!("Failed to load state from {}", state_path.display()))?;

    let (result, receipt) = if publish {
        let keys = signing_keys()?;
        let published = client
            .reconcile_and_publish(owner, &state.feeds, &keys)
            .await
            .context("Failed to sync subscriptions")?;
        (published.reconciliation, Some(published.receipt))
    } else {
        let result = client
            .reconcile(owner, &state.feeds)
            .await
            .context("Failed to reconcile subscriptions")?;
        (result, None)
    };

    println!("{}", serde_json::to_string_pretty(&result.merge)?);

    if apply {
        state.apply_merge(&result.merge, Timestamp::now().as_u64());
        state
            .save(state_path)
            .with_context(|| format!("Failed to save state to {}", state_path.display()))?;
        tracing::info!(path = %state_path.display(), "Local state updated");
    } else if publish && !result.merge.is_converged() {
        tracing::warn!("Published the merged feeds; rerun with --apply to update local state");
    }

    if let Some(receipt) = receipt {
        println!("published {} via {}", receipt.event_id.to_hex(), receipt.acknowledged_by);
    } else if result.merge.needs_publish() {
        tracing::info!(
            local_only = result.merge.stats.local_only_count,
            "Remote snapshot is missing local feeds; rerun with --publish"
        );
    }

    Ok(())
}

async fn fetch_read_status(client: &SyncClient, owner: &str) -> Result<()> {
    let outcome = client
        .fetch_read_status(owner)
        .await
        .context("Failed to fetch read status")?;

    let output = match outcome.record {
        Some(decoded) => json!({
            "eventId": decoded.event_id.to_hex(),
            "createdAt": decoded.created_at,
            "contentValid": decoded.content_valid,
            "itemGuids": decoded.snapshot.read_guids,
            "stats": outcome.stats,
        }),
        None => json!({ "found": false, "stats": outcome.stats }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn sync_read_status(
    client: &SyncClient,
    owner: &str,
    state_path: &Path,
    apply: bool,
) -> Result<()> {
    let mut state = LocalState::load(state_path)
        .with_context(|| format!("Failed to load state from {}", state_path.display()))?;

    let result = client
        .reconcile_read_status(owner, &state.read_guids)
        .await
        .context("Failed to reconcile read status")?;

    println!("{}", serde_json::to_string_pretty(&result.merge)?);

    if apply {
        state.apply_read_status(&result.merge, Timestamp::now().as_u64());
        state
            .save(state_path)
            .with_context(|| format!("Failed to save state to {}", state_path.display()))?;
        tracing::info!(path = %state_path.display(), "Local read markers updated");
    }
    Ok(())
}

async fn publish_read_status(client: &SyncClient, state_path: &Path) -> Result<()> {
    let state = LocalState::load(state_path)
        .with_context(|| format!("Failed to load state from {}", state_path.display()))?;
    let keys = signing_keys()?;

    let receipt = client
        .publish_read_status(&state.read_guids, &keys)
        .await
        .context("Failed to publish read status")?;
    println!("published {} via {}", receipt.event_id.to_hex(), receipt.acknowledged_by);
    Ok(())
}

/// Signing keys from `FEEDZ_SECRET_KEY` (nsec or hex).
fn signing_keys() -> Result<Keys> {
    let secret = std::env::var("FEEDZ_SECRET_KEY").context("FEEDZ_SECRET_KEY is not set")?;
    Keys::parse(secret.trim()).context("FEEDZ_SECRET_KEY is not a valid nsec or hex secret key")
}
