//! Simple-writes demo: fans concurrent commits into one log, then reports
//! how they were ordered.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use revlog::cli::CliArgs;
use revlog::{Batch, CommitLogDb, Log, LogName, LogRead, Page, PageRequest, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let config = args.to_config()?;
    tracing::info!("Opening commit log with config: {:?}", config);

    let db = CommitLogDb::open(config).await?;
    let name = args
        .log_name
        .clone()
        .map(LogName::from)
        .unwrap_or_else(LogName::generate);
    let log = db.create_log(name).await?;

    let mut batch = Batch::new();
    for _ in 0..args.tasks {
        let log = log.clone();
        batch.add(move |ctx| async move {
            let commit = log.new_commit(ctx.index.to_string()).await?;
            tracing::debug!(index = ctx.index, revision = commit.revision(), "committed");
            Ok(())
        });
        tracing::info!("Added job {} to batch {}", batch.len() - 1, batch.id());
    }
    batch.on_complete(|report| {
        tracing::info!(
            "Batch {} is DONE: {} completed, {} failed in {:?}",
            report.batch_id,
            report.completed,
            report.failed.len(),
            report.elapsed
        );
    });
    let report = batch.finish().await;
    for (index, error) in &report.failed {
        tracing::warn!("Job {} failed: {}", index, error);
    }

    summarize(&log).await?;
    db.close().await
}

/// Logs the state of the log after the batch completed.
async fn summarize(log: &Log) -> Result<()> {
    let state = log.state().await?;
    tracing::info!("Log {} revision {}", state.name, state.latest_revision);

    if state.latest_revision > 0 {
        let elapsed_ms = (state.updated_ms - state.created_ms).max(0) as f64;
        let per_revision_ms = elapsed_ms / state.latest_revision as f64;
        tracing::info!("rate {:.3} ms per revision", per_revision_ms);
        if per_revision_ms > 0.0 {
            tracing::info!("{:.1} revisions per second", 1000.0 / per_revision_ms);
        }
    }

    let commits = collect(move |page| log.commits(page)).await?;
    tracing::info!("{} commits in the log", commits.len());
    for commit in &commits {
        tracing::info!("commit revision {}:{}", commit.revision(), commit.created_ms());
    }

    let revisions = collect(move |page| log.revisions(page)).await?;
    tracing::info!("revisions {}", revisions.len());

    let shards = collect(move |page| log.revision_shards(page)).await?;
    tracing::info!("Had {} revision shards", shards.len());
    for shard in &shards {
        tracing::info!("Shard {} for rev {}", shard.tag, shard.revision());
        let mut members = shard.commits(log);
        while let Some(commit) = members.next().await? {
            tracing::info!("Sharded commit {}:{}", commit.revision(), commit.created_ms());
        }
    }

    if state.latest_revision >= 1 {
        let top = state.latest_revision.min(3);
        let range = collect(move |page| log.commit_range(1, top, false, page)).await?;
        for commit in &range {
            tracing::info!("commit revision {}:{}", commit.revision(), commit.created_ms());
        }
    }
    Ok(())
}

/// Follows cursors until a view is exhausted.
async fn collect<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut request = Some(PageRequest::first());
    while let Some(page) = request {
        let page = fetch(page).await?;
        request = page.next_request(None);
        items.extend(page.items);
    }
    Ok(items)
}
