use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{ChangeEvent, EventLog, GameFormat, GameProgress, TeamRoster};
use crate::stats::{
    BoxScore, PlayerFloorTime, PlusMinusCalculator, PlusMinusLine, ScoringEvent, Timeline,
    TimelineReconstructor,
};

/// Static facts about the game a session follows
#[derive(Debug, Clone)]
pub struct GameContext {
    pub game_id: String,
    pub home: TeamRoster,
    pub away: TeamRoster,
    pub format: GameFormat,
    /// Completed games close open stints at game end rather than at the
    /// latest recorded instant
    pub complete: bool,
    /// Game clock supplied by the caller for a live game; open stints run
    /// to the later of this and the latest recorded event
    pub current_elapsed: Option<u32>,
}

impl GameContext {
    pub fn new(game_id: impl Into<String>, home: TeamRoster, away: TeamRoster) -> Self {
        Self {
            game_id: game_id.into(),
            home,
            away,
            format: GameFormat::default(),
            complete: false,
            current_elapsed: None,
        }
    }

    pub fn with_format(mut self, format: GameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn completed(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn at_elapsed(mut self, elapsed_secs: u32) -> Self {
        self.current_elapsed = Some(elapsed_secs);
        self
    }

    pub fn progress(&self, log: &EventLog) -> GameProgress {
        if self.complete {
            GameProgress::Complete {
                periods_played: log.periods_played(&self.format),
            }
        } else {
            GameProgress::Live {
                elapsed_secs: log
                    .latest_elapsed(&self.format)
                    .max(self.current_elapsed.unwrap_or(0)),
            }
        }
    }

    pub fn rosters(&self) -> [&TeamRoster; 2] {
        [&self.home, &self.away]
    }
}

/// Everything a consumer renders, derived from one log snapshot
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    pub game_id: String,
    /// Bumped on every local or reloaded change
    pub version: u64,
    pub log: Arc<EventLog>,
    pub box_score: BoxScore,
    pub timelines: Vec<Timeline>,
    pub floor_time: Vec<PlayerFloorTime>,
    pub plus_minus: Vec<PlusMinusLine>,
    /// Transient error from the last failed mutation or reload
    pub last_error: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl GameSnapshot {
    pub fn compute(ctx: &GameContext, log: Arc<EventLog>, version: u64, last_error: Option<String>) -> Self {
        let progress = ctx.progress(&log);
        let reconstructor = TimelineReconstructor::new(ctx.format);

        let timelines: Vec<Timeline> = ctx
            .rosters()
            .into_iter()
            .map(|roster| reconstructor.from_log(&log, roster, progress))
            .collect();
        let floor_time = timelines.iter().flat_map(Timeline::floor_time).collect();
        let scoring = ScoringEvent::from_log(&log, &ctx.format);
        let plus_minus = PlusMinusCalculator::compute(&timelines, &scoring);

        Self {
            game_id: ctx.game_id.clone(),
            version,
            box_score: BoxScore::compute(&log),
            log,
            timelines,
            floor_time,
            plus_minus,
            last_error,
            computed_at: Utc::now(),
        }
    }

    pub fn empty(ctx: &GameContext) -> Self {
        Self::compute(ctx, Arc::new(EventLog::empty(ctx.game_id.clone())), 0, None)
    }

    pub fn timeline(&self, team_id: &str) -> Option<&Timeline> {
        self.timelines.iter().find(|t| t.team_id == team_id)
    }

    pub fn floor_time_of(&self, player_id: &str) -> Option<u32> {
        self.floor_time
            .iter()
            .find(|f| f.player_id == player_id)
            .map(|f| f.seconds)
    }

    pub fn plus_minus_of(&self, player_id: &str) -> Option<i64> {
        PlusMinusCalculator::for_player(&self.plus_minus, player_id).map(|l| l.plus_minus)
    }
}

/// Out-of-band session events for consumers
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// Raw change notification from the feed
    Change(ChangeEvent),
    Reloaded { version: u64, events: usize, substitutions: usize },
    /// A reload finished while local mutations were pending; it will re-run
    ReloadDeferred,
    ReloadFailed { error: String },
    MutationFailed { operation: String, error: String },
    Closed,
}

/// Result of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    pub requested: usize,
    pub deleted: usize,
    /// `(id, error)` for every delete that did not go through
    pub failed: Vec<(String, String)>,
    /// A full reload was forced because of failures
    pub reloaded: bool,
}

impl BatchDeleteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.deleted == self.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, GameEvent, Modifier};
    use chrono::TimeZone;

    fn context() -> GameContext {
        let home = TeamRoster::new("home", ["a", "b", "c", "d", "e"].map(String::from).to_vec());
        let away = TeamRoster::new("away", ["v", "w", "x", "y", "z"].map(String::from).to_vec());
        GameContext::new("g1", home, away)
    }

    fn log_with_shot_at_two_minutes() -> EventLog {
        let shot = GameEvent {
            id: "e1".to_string(),
            game_id: "g1".to_string(),
            subject_id: "a".to_string(),
            team_id: "home".to_string(),
            event_type: EventType::Shot2,
            modifier: Some(Modifier::Made),
            quarter: 1,
            clock_minutes: 10,
            clock_seconds: 0,
            created_at: Utc.timestamp_opt(1_770_000_000, 0).unwrap(),
            external_media_timestamp: None,
        };
        EventLog::new("g1", vec![shot], vec![])
    }

    #[test]
    fn test_live_progress_follows_latest_event() {
        let log = log_with_shot_at_two_minutes();
        assert_eq!(context().progress(&log), GameProgress::Live { elapsed_secs: 120 });
    }

    #[test]
    fn test_supplied_clock_extends_open_stints() {
        let ctx = context().at_elapsed(300);
        let snapshot = GameSnapshot::compute(&ctx, Arc::new(log_with_shot_at_two_minutes()), 1, None);
        assert_eq!(snapshot.floor_time_of("a"), Some(300));

        // A clock behind the log never shrinks floor time
        let behind = context().at_elapsed(60);
        let snapshot = GameSnapshot::compute(&behind, Arc::new(log_with_shot_at_two_minutes()), 1, None);
        assert_eq!(snapshot.floor_time_of("a"), Some(120));
    }
}
