use anyhow::Context;
use clap::Parser;
use courtside::cli::{print_snapshot, Cli, Commands, GameArgs, OutputMode};
use courtside::config::AppConfig;
use courtside::domain::{Resource, RowFilter};
use courtside::session::{GameSnapshot, SessionNotice, StatAggregator};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

mod main_runtime;

use main_runtime::{build_feed, build_store, init_logging, init_logging_simple};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = OutputMode::from_json_flag(cli.json);

    let cfg = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir))?;

    match &cli.command {
        Commands::Watch(args) => {
            init_logging(&cfg.logging);
            run_watch(&cfg, args, mode).await
        }
        Commands::BoxScore(args) => {
            init_logging_simple();
            run_box_score(&cfg, args, mode).await
        }
        Commands::Check => {
            init_logging_simple();
            run_check(&cfg).await
        }
    }
}

fn ensure_valid(cfg: &AppConfig) -> anyhow::Result<()> {
    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("config: {e}");
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }
    Ok(())
}

async fn run_watch(cfg: &AppConfig, args: &GameArgs, mode: OutputMode) -> anyhow::Result<()> {
    ensure_valid(cfg)?;

    let store = build_store(cfg)?;
    let ctx = args.context(store.as_ref(), cfg.game.format()).await?;
    info!(
        "Watching game {} ({} vs {})",
        ctx.game_id, ctx.home.team_id, ctx.away.team_id
    );

    let session = StatAggregator::new(ctx, Arc::clone(&store), cfg.session.reload_quiet_period());
    let mut snapshots = session.watch();
    let mut notices = session.notices();

    if let Err(e) = session.reload().await {
        warn!("Initial load failed, waiting for changes: {}", e);
    }

    let feed = build_feed(cfg, store);
    session.attach_feed(&feed).await?;
    let health = feed.health();

    let mut health_tick = interval(HEALTH_LOG_INTERVAL);
    health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    health_tick.tick().await;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    print_snapshot(&session.snapshot(), mode)?;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                print_snapshot(&snapshot, mode)?;
            }
            notice = notices.recv() => match notice {
                Ok(SessionNotice::ReloadFailed { error }) => warn!("Reload failed: {}", error),
                Ok(SessionNotice::MutationFailed { operation, error }) => {
                    warn!("{} failed: {}", operation, error)
                }
                Ok(SessionNotice::Closed) | Err(RecvError::Closed) => break,
                Ok(other) => debug!("Session notice: {:?}", other),
                Err(RecvError::Lagged(n)) => debug!("Skipped {} session notices", n),
            },
            _ = health_tick.tick() => health.log_status().await,
        }
    }

    session.close().await;
    feed.close_all();
    info!("{}", health.summary().await);
    Ok(())
}

async fn run_box_score(cfg: &AppConfig, args: &GameArgs, mode: OutputMode) -> anyhow::Result<()> {
    ensure_valid(cfg)?;

    let store = build_store(cfg)?;
    let ctx = args.context(store.as_ref(), cfg.game.format()).await?;
    let log = store
        .fetch_log(&ctx.game_id)
        .await
        .with_context(|| format!("loading game {}", ctx.game_id))?;

    let snapshot = GameSnapshot::compute(&ctx, Arc::new(log), 1, None);
    print_snapshot(&snapshot, mode)?;
    Ok(())
}

async fn run_check(cfg: &AppConfig) -> anyhow::Result<()> {
    ensure_valid(cfg)?;
    println!("configuration ok");

    let store = build_store(cfg)?;
    let probe = RowFilter::by_game("__courtside_probe__");
    let mut failures = 0;

    for resource in [Resource::GameEvents, Resource::Substitutions, Resource::GameRosters] {
        match store.fetch_rows(resource, &probe).await {
            Ok(_) => println!("{resource}: reachable"),
            Err(e) if e.is_resource_absent() && resource == Resource::GameRosters => {
                println!("{resource}: absent (rosters must be passed on the command line)")
            }
            Err(e) => {
                error!("{} probe failed: {}", resource, e);
                println!("{resource}: FAILED ({e})");
                failures += 1;
            }
        }
    }

    match &cfg.store.realtime_url {
        Some(url) => println!("push channel: {url}"),
        None => println!("push channel: not configured, polling only"),
    }

    if failures > 0 {
        anyhow::bail!("{failures} store probe(s) failed");
    }
    Ok(())
}
