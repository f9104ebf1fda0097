use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::adapters::EventStore;
use crate::domain::{GameFormat, TeamRoster};
use crate::error::{CourtsideError, Result};
use crate::session::GameContext;

pub mod output;

pub use output::{print_snapshot, render_snapshot, OutputMode};

#[derive(Parser)]
#[command(name = "courtside")]
#[command(author = "Courtside Team")]
#[command(version)]
#[command(about = "Live basketball stats: box score, floor time and plus-minus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "COURTSIDE_CONFIG_DIR")]
    pub config_dir: String,

    /// Print JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a game live and re-render stats on every change
    Watch(GameArgs),
    /// Load a game once and print its stats
    BoxScore(GameArgs),
    /// Validate configuration and probe the event store
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct GameArgs {
    /// Game id
    #[arg(short, long)]
    pub game: String,

    /// Home roster as TEAM:P1,P2,... (or just TEAM to load it from the store)
    #[arg(long)]
    pub home: String,

    /// Away roster as TEAM:P1,P2,... (or just TEAM to load it from the store)
    #[arg(long)]
    pub away: String,

    /// Treat the game as finished (stints close at the end of the last period)
    #[arg(long)]
    pub complete: bool,

    /// Current game clock in elapsed seconds, for a live game between events
    #[arg(long)]
    pub elapsed: Option<u32>,
}

impl GameArgs {
    /// Build the game context, fetching any roster not given in full.
    pub async fn context(&self, store: &dyn EventStore, format: GameFormat) -> Result<GameContext> {
        let home = resolve_roster(store, &self.game, &self.home).await?;
        let away = resolve_roster(store, &self.game, &self.away).await?;

        let ctx = GameContext::new(self.game.clone(), home, away)
            .with_format(format)
            .completed(self.complete);
        Ok(match self.elapsed {
            Some(secs) => ctx.at_elapsed(secs),
            None => ctx,
        })
    }
}

async fn resolve_roster(store: &dyn EventStore, game_id: &str, arg: &str) -> Result<TeamRoster> {
    if let Some(roster) = TeamRoster::parse(arg).filter(|r| !r.player_ids.is_empty()) {
        return Ok(roster);
    }

    let team_id = arg.split(':').next().unwrap_or_default().trim();
    if team_id.is_empty() {
        return Err(CourtsideError::Validation(format!("invalid roster argument: {arg:?}")));
    }

    match store.fetch_roster(game_id, team_id).await {
        Ok(roster) => {
            info!("Loaded roster for {} ({} players)", team_id, roster.player_ids.len());
            Ok(roster)
        }
        Err(e) if e.is_resource_absent() => Err(CourtsideError::Validation(format!(
            "no roster stored for team {team_id}; pass it as {team_id}:P1,P2,..."
        ))),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryEventStore;

    #[test]
    fn test_parse_watch_command() {
        let cli = Cli::try_parse_from([
            "courtside",
            "watch",
            "--game",
            "g1",
            "--home",
            "h:a,b,c,d,e",
            "--away",
            "v",
            "--complete",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.game, "g1");
                assert_eq!(args.away, "v");
                assert!(args.complete);
                assert_eq!(args.elapsed, None);
            }
            _ => panic!("expected watch"),
        }
        assert_eq!(cli.config_dir, "config");
    }

    #[tokio::test]
    async fn test_inline_roster_skips_store() {
        let store = MemoryEventStore::default();
        let roster = resolve_roster(&store, "g1", "h:a,b,c,d,e").await.unwrap();

        assert_eq!(roster.team_id, "h");
        assert_eq!(roster.player_ids.len(), 5);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_bare_team_loads_stored_roster() {
        let store = MemoryEventStore::default();
        store
            .seed_roster("g1", &TeamRoster::new("v", vec!["x".into(), "y".into()]))
            .unwrap();

        let roster = resolve_roster(&store, "g1", "v").await.unwrap();
        assert_eq!(roster.player_ids, vec!["x".to_string(), "y".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_roster_table_is_a_usage_error() {
        let store = MemoryEventStore::default();
        store.mark_absent(crate::domain::Resource::GameRosters);

        let err = resolve_roster(&store, "g1", "v").await.unwrap_err();
        assert!(matches!(err, CourtsideError::Validation(_)));
    }

    #[tokio::test]
    async fn test_elapsed_flag_sets_live_clock() {
        let cli = Cli::try_parse_from([
            "courtside", "box-score", "--game", "g1", "--home", "h:a,b,c,d,e", "--away", "v:p,q,r,s,t",
            "--elapsed", "300",
        ])
        .unwrap();
        let Commands::BoxScore(args) = cli.command else {
            panic!("expected box-score");
        };

        let store = MemoryEventStore::default();
        let ctx = args.context(&store, GameFormat::default()).await.unwrap();
        assert_eq!(ctx.current_elapsed, Some(300));
        assert!(!ctx.complete);
    }
}
