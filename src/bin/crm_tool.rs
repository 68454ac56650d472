use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use crmstore::core::StoreError;
use crmstore::prelude::*;
use crmstore::storage::{Fault, StorageOp};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Barrier;

#[derive(Parser)]
#[command(name = "crm-tool")]
#[command(about = "Developer tooling for the crmstore concurrency layer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Race concurrent writers against one contact
    Race {
        #[arg(long, default_value_t = 3)]
        writers: usize,
        #[arg(long, value_enum, default_value_t = StrategyArg::Fail)]
        strategy: StrategyArg,
    },
    /// Delete a contact with relations, optionally failing one step
    Cascade {
        #[arg(long, default_value_t = 2)]
        deals: usize,
        #[arg(long, default_value_t = 3)]
        activities: usize,
        /// Inject a storage timeout at this step (1-3)
        #[arg(long)]
        fail_at: Option<usize>,
    },
    /// Write a small seeded record set to a snapshot file
    Seed {
        #[arg(long)]
        out: PathBuf,
    },
    /// Print per-entity record counts of a snapshot file
    Inspect { snapshot: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Fail,
    Retry,
    Overwrite,
}

impl From<StrategyArg> for ConflictResolutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Fail => ConflictResolutionStrategy::Fail,
            StrategyArg::Retry => ConflictResolutionStrategy::Retry,
            StrategyArg::Overwrite => ConflictResolutionStrategy::Overwrite,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = StoreConfig::from_env().context("Invalid CRMSTORE_* environment")?;

    match cli.command {
        Command::Race { writers, strategy } => race(config, writers, strategy.into()).await,
        Command::Cascade {
            deals,
            activities,
            fail_at,
        } => cascade(config, deals, activities, fail_at).await,
        Command::Seed { out } => seed(config, &out).await,
        Command::Inspect { snapshot } => inspect(&snapshot).await,
    }
}

async fn race(config: StoreConfig, writers: usize, strategy: ConflictResolutionStrategy) -> Result<()> {
    if writers < 2 {
        return Err(anyhow!("A race needs at least 2 writers"));
    }

    let store = RecordStore::in_memory(config);
    let contact = store
        .create(EntityType::Contact, Patch::new().set("email", "race@example.com"))
        .await?;
    let barrier = Arc::new(Barrier::new(writers));

    let mut handles = Vec::with_capacity(writers);
    for writer in 0..writers {
        let store = store.clone();
        let barrier = barrier.clone();
        let (id, version) = (contact.id, contact.version);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store
                .safe_update(
                    EntityType::Contact,
                    id,
                    version,
                    Patch::new().set("jobTitle", format!("writer-{}", writer)),
                    strategy,
                )
                .await
        }));
    }

    let (mut won, mut conflicts, mut other) = (0, 0, 0);
    for (writer, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined.context("Writer task panicked")? {
            Ok(record) => {
                won += 1;
                println!("writer-{}: ok, version {}", writer, record.version);
            }
            Err(err) if err.is_conflict() => {
                conflicts += 1;
                println!("writer-{}: {}", writer, err);
            }
            Err(err) => {
                other += 1;
                println!("writer-{}: {}", writer, err);
            }
        }
    }

    let stored = store.get_with_version(EntityType::Contact, contact.id).await?;
    println!(
        "{} writers, strategy {}: {} succeeded, {} conflicted, {} failed; version {} -> {}",
        writers, strategy, won, conflicts, other, contact.version, stored.version
    );
    Ok(())
}

async fn cascade(
    config: StoreConfig,
    deals: usize,
    activities: usize,
    fail_at: Option<usize>,
) -> Result<()> {
    let store = RecordStore::in_memory(config);
    let contact = store
        .create(EntityType::Contact, Patch::new().set("email", "cascade@example.com"))
        .await?;
    for i in 0..deals {
        store
            .create(
                EntityType::Deal,
                Patch::new()
                    .set("title", format!("Deal {}", i))
                    .set("contactId", contact.id),
            )
            .await?;
    }
    for i in 0..activities {
        store
            .create(
                EntityType::Activity,
                Patch::new()
                    .set("subject", format!("Call {}", i))
                    .set("contactId", contact.id),
            )
            .await?;
    }

    if let Some(step) = fail_at {
        let (op, entity) = match step {
            1 => (StorageOp::UpdateMany, EntityType::Deal),
            2 => (StorageOp::DeleteMany, EntityType::Activity),
            3 => (StorageOp::DeleteOne, EntityType::Contact),
            other => return Err(anyhow!("--fail-at must be 1, 2 or 3, got {}", other)),
        };
        let timeout = std::time::Duration::from_millis(250);
        store
            .storage()
            .faults()
            .arm(Fault::new(op, StoreError::Timeout(timeout)).on(entity))?;
    }

    let before = counts(store.storage()).await;
    let result = store.delete_contact(contact.id).await;
    let after = counts(store.storage()).await;

    match result {
        Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Err(failure) => {
            println!("{}", failure);
            println!(
                "{}",
                serde_json::to_string_pretty(&ErrorResponse::from(&failure.error))?
            );
        }
    }
    println!("records before: {}", format_counts(&before));
    println!("records after:  {}", format_counts(&after));
    Ok(())
}

async fn seed(config: StoreConfig, out: &Path) -> Result<()> {
    let store = RecordStore::in_memory(config);
    let company = store
        .create(EntityType::Company, Patch::new().set("name", "Acme"))
        .await?;
    let owner = store
        .create(EntityType::User, Patch::new().set("email", "owner@acme.test"))
        .await?;
    let contact = store
        .create(
            EntityType::Contact,
            Patch::new()
                .set("email", "buyer@acme.test")
                .set("companyId", company.id)
                .set("ownerId", owner.id),
        )
        .await?;
    store
        .create(
            EntityType::Deal,
            Patch::new()
                .set("title", "Anvils")
                .set("contactId", contact.id)
                .set("companyId", company.id),
        )
        .await?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory '{}'", parent.display()))?;
    }
    let rows = store
        .storage()
        .save_snapshot(out)
        .await
        .with_context(|| format!("Failed to write snapshot '{}'", out.display()))?;
    println!("Wrote {} records to {}", rows, out.display());
    Ok(())
}

async fn inspect(path: &Path) -> Result<()> {
    let storage = InMemoryStorage::new();
    let rows = storage
        .restore_snapshot(path)
        .await
        .with_context(|| format!("Failed to read snapshot '{}'", path.display()))?;

    println!("{}: {} records", path.display(), rows);
    for (entity, count) in counts(&storage).await {
        println!("  {:<10} {}", entity.as_str(), count);
    }
    Ok(())
}

async fn counts(storage: &InMemoryStorage) -> Vec<(EntityType, usize)> {
    let mut counts = Vec::with_capacity(EntityType::ALL.len());
    for entity in EntityType::ALL {
        counts.push((entity, storage.row_count(entity).await));
    }
    counts
}

fn format_counts(counts: &[(EntityType, usize)]) -> String {
    counts
        .iter()
        .map(|(entity, count)| format!("{}={}", entity, count))
        .collect::<Vec<_>>()
        .join(" ")
}
