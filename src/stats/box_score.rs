//! Box score fold over an event log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{EventLog, EventType, GameEvent, Modifier, Subject};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShootingSplit {
    pub made: u32,
    pub attempted: u32,
}

impl ShootingSplit {
    fn record(&mut self, made: bool) {
        self.attempted += 1;
        if made {
            self.made += 1;
        }
    }

    /// Percentage made, `None` without attempts
    pub fn pct(&self) -> Option<f64> {
        (self.attempted > 0).then(|| self.made as f64 * 100.0 / self.attempted as f64)
    }
}

impl std::fmt::Display for ShootingSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.made, self.attempted)
    }
}

/// Counting stats shared by player and team lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub points: u32,
    pub field_goals: ShootingSplit,
    pub three_pointers: ShootingSplit,
    pub free_throws: ShootingSplit,
    pub rebounds: u32,
    pub offensive_rebounds: u32,
    pub defensive_rebounds: u32,
    pub assists: u32,
    pub steals: u32,
    pub blocks: u32,
    pub turnovers: u32,
    pub fouls: u32,
    pub technical_fouls: u32,
}

impl StatLine {
    fn apply(&mut self, event: &GameEvent) {
        let made = event.is_made();
        match event.event_type {
            EventType::Shot2 => self.field_goals.record(made),
            EventType::Shot3 => {
                self.field_goals.record(made);
                self.three_pointers.record(made);
            }
            EventType::FreeThrow => self.free_throws.record(made),
            EventType::Rebound => {
                self.rebounds += 1;
                match event.modifier {
                    Some(Modifier::Offensive) => self.offensive_rebounds += 1,
                    Some(Modifier::Defensive) => self.defensive_rebounds += 1,
                    _ => {}
                }
            }
            EventType::Assist => self.assists += 1,
            EventType::Steal => self.steals += 1,
            EventType::Block => self.blocks += 1,
            EventType::Turnover => self.turnovers += 1,
            EventType::Foul => match event.modifier {
                Some(Modifier::Technical) => self.technical_fouls += 1,
                _ => self.fouls += 1,
            },
            EventType::Substitution | EventType::Unknown => {}
        }
        self.points += event.points();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLine {
    /// Subject id as recorded, including the custom prefix
    pub player_id: String,
    pub team_id: String,
    pub custom: bool,
    #[serde(flatten)]
    pub stats: StatLine,
}

impl PlayerLine {
    /// Name without the custom-player prefix
    pub fn display_id(&self) -> &str {
        self.player_id
            .strip_prefix(crate::domain::CUSTOM_PLAYER_PREFIX)
            .unwrap_or(&self.player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamLine {
    pub team_id: String,
    #[serde(flatten)]
    pub stats: StatLine,
    pub points_by_period: BTreeMap<u8, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxScore {
    pub game_id: String,
    /// Ordered by team, then player id
    pub players: Vec<PlayerLine>,
    pub teams: BTreeMap<String, TeamLine>,
    /// Events with an unknown type
    pub ignored: usize,
}

impl BoxScore {
    pub fn compute(log: &EventLog) -> Self {
        let mut players: BTreeMap<(String, String), PlayerLine> = BTreeMap::new();
        let mut teams: BTreeMap<String, TeamLine> = BTreeMap::new();
        let mut ignored = 0;

        for event in &log.events {
            match event.event_type {
                EventType::Unknown => {
                    debug!("Ignoring event {} with unknown type", event.id);
                    ignored += 1;
                    continue;
                }
                EventType::Substitution => continue,
                _ => {}
            }

            let team = teams.entry(event.team_id.clone()).or_insert_with(|| TeamLine {
                team_id: event.team_id.clone(),
                stats: StatLine::default(),
                points_by_period: BTreeMap::new(),
            });
            team.stats.apply(event);
            let points = event.points();
            if points > 0 {
                *team.points_by_period.entry(event.quarter).or_default() += points;
            }

            let Some(subject) = event.subject() else {
                continue;
            };
            let custom = matches!(subject, Subject::Custom(_));
            let key = (event.team_id.clone(), event.subject_id.trim().to_string());
            players
                .entry(key)
                .or_insert_with(|| PlayerLine {
                    player_id: event.subject_id.trim().to_string(),
                    team_id: event.team_id.clone(),
                    custom,
                    stats: StatLine::default(),
                })
                .stats
                .apply(event);
        }

        Self {
            game_id: log.game_id.clone(),
            players: players.into_values().collect(),
            teams,
            ignored,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerLine> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamLine> {
        self.teams.get(team_id)
    }

    pub fn players_for<'a>(&'a self, team_id: &'a str) -> impl Iterator<Item = &'a PlayerLine> + 'a {
        self.players.iter().filter(move |p| p.team_id == team_id)
    }

    pub fn team_points(&self, team_id: &str) -> u32 {
        self.team(team_id).map(|t| t.stats.points).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(id: &str, subject: &str, team: &str, event_type: EventType, modifier: Option<Modifier>, quarter: u8) -> GameEvent {
        GameEvent {
            id: id.to_string(),
            game_id: "g1".into(),
            subject_id: subject.to_string(),
            team_id: team.to_string(),
            event_type,
            modifier,
            quarter,
            clock_minutes: 5,
            clock_seconds: 0,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            external_media_timestamp: None,
        }
    }

    #[test]
    fn test_points_only_on_made_shots() {
        let log = EventLog::new(
            "g1",
            vec![
                event("1", "p1", "home", EventType::Shot2, Some(Modifier::Made), 1),
                event("2", "p1", "home", EventType::Shot3, Some(Modifier::Made), 1),
                event("3", "p1", "home", EventType::FreeThrow, Some(Modifier::Made), 2),
                event("4", "p1", "home", EventType::Shot3, Some(Modifier::Missed), 2),
                event("5", "p1", "home", EventType::FreeThrow, None, 2),
            ],
            vec![],
        );
        let score = BoxScore::compute(&log);
        let line = &score.player("p1").unwrap().stats;

        assert_eq!(line.points, 6);
        assert_eq!(line.field_goals, ShootingSplit { made: 2, attempted: 3 });
        assert_eq!(line.three_pointers, ShootingSplit { made: 1, attempted: 2 });
        assert_eq!(line.free_throws, ShootingSplit { made: 1, attempted: 2 });
        assert_eq!(line.three_pointers.pct(), Some(50.0));

        let team = score.team("home").unwrap();
        assert_eq!(team.points_by_period.get(&1), Some(&5));
        assert_eq!(team.points_by_period.get(&2), Some(&1));
    }

    #[test]
    fn test_counters_and_splits() {
        let log = EventLog::new(
            "g1",
            vec![
                event("1", "p1", "home", EventType::Rebound, Some(Modifier::Offensive), 1),
                event("2", "p1", "home", EventType::Rebound, Some(Modifier::Defensive), 1),
                event("3", "p1", "home", EventType::Assist, None, 1),
                event("4", "p1", "home", EventType::Steal, None, 1),
                event("5", "p1", "home", EventType::Block, None, 1),
                event("6", "p1", "home", EventType::Turnover, None, 1),
                event("7", "p1", "home", EventType::Foul, Some(Modifier::Personal), 1),
                event("8", "p1", "home", EventType::Foul, Some(Modifier::Technical), 1),
                event("9", "p1", "home", EventType::Substitution, None, 1),
            ],
            vec![],
        );
        let line = BoxScore::compute(&log).player("p1").unwrap().stats.clone();

        assert_eq!(line.rebounds, 2);
        assert_eq!((line.offensive_rebounds, line.defensive_rebounds), (1, 1));
        assert_eq!((line.assists, line.steals, line.blocks, line.turnovers), (1, 1, 1, 1));
        assert_eq!((line.fouls, line.technical_fouls), (1, 1));
        assert_eq!(line.points, 0);
    }

    #[test]
    fn test_unknown_types_ignored_and_custom_players_aggregate() {
        let log = EventLog::new(
            "g1",
            vec![
                event("1", "custom:walkon", "away", EventType::Shot2, Some(Modifier::Made), 1),
                event("2", "custom:walkon", "away", EventType::Shot2, Some(Modifier::Made), 3),
                event("3", "p9", "away", EventType::Unknown, Some(Modifier::Made), 1),
                event("4", "", "away", EventType::Rebound, Some(Modifier::Defensive), 1),
            ],
            vec![],
        );
        let score = BoxScore::compute(&log);

        let walkon = score.player("custom:walkon").unwrap();
        assert!(walkon.custom);
        assert_eq!(walkon.display_id(), "walkon");
        assert_eq!(walkon.stats.points, 4);
        assert_eq!(score.ignored, 1);
        assert_eq!(score.players.len(), 1);
        assert_eq!(score.team("away").unwrap().stats.rebounds, 1);
        assert_eq!(score.team_points("away"), 4);
    }

    #[test]
    fn test_empty_log() {
        let score = BoxScore::compute(&EventLog::empty("g1"));
        assert!(score.players.is_empty());
        assert_eq!(score.team_points("home"), 0);
        assert_eq!(ShootingSplit::default().pct(), None);
    }
}
