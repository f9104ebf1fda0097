//! Plus-minus from scoring events and reconstructed stints.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::timeline::Timeline;
use crate::domain::{EventLog, GameFormat};

/// A made shot or free throw, placed on the elapsed-time axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub event_id: String,
    pub team_id: String,
    pub points: u32,
    pub elapsed: u32,
}

impl ScoringEvent {
    pub fn from_log(log: &EventLog, format: &GameFormat) -> Vec<ScoringEvent> {
        log.events
            .iter()
            .filter(|e| e.points() > 0)
            .map(|e| ScoringEvent {
                event_id: e.id.clone(),
                team_id: e.team_id.clone(),
                points: e.points(),
                elapsed: e.elapsed(format),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlusMinusLine {
    pub player_id: String,
    pub team_id: String,
    pub points_for: u32,
    pub points_against: u32,
    pub plus_minus: i64,
}

pub struct PlusMinusCalculator;

impl PlusMinusCalculator {
    /// One line per player of every timeline, in timeline order.
    ///
    /// Scoring credited to a team outside `timelines` is logged and left out,
    /// so every counted event moves both sides by the same amount.
    pub fn compute(timelines: &[Timeline], scoring: &[ScoringEvent]) -> Vec<PlusMinusLine> {
        let scoring: Vec<&ScoringEvent> = scoring
            .iter()
            .filter(|score| {
                let known = timelines.iter().any(|t| t.team_id == score.team_id);
                if !known {
                    warn!(
                        "Scoring event {} names unknown team {}, excluded from plus-minus",
                        score.event_id, score.team_id
                    );
                }
                known
            })
            .collect();
        let mut lines = Vec::new();

        for timeline in timelines {
            for player_id in &timeline.players {
                let mut points_for = 0;
                let mut points_against = 0;

                for score in &scoring {
                    if !timeline.was_on_court(player_id, score.elapsed) {
                        continue;
                    }
                    if score.team_id == timeline.team_id {
                        points_for += score.points;
                    } else {
                        points_against += score.points;
                    }
                }

                lines.push(PlusMinusLine {
                    player_id: player_id.clone(),
                    team_id: timeline.team_id.clone(),
                    points_for,
                    points_against,
                    plus_minus: points_for as i64 - points_against as i64,
                });
            }
        }

        lines
    }

    pub fn for_player<'a>(lines: &'a [PlusMinusLine], player_id: &str) -> Option<&'a PlusMinusLine> {
        lines.iter().find(|l| l.player_id == player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameProgress, PlayerStint};

    fn timeline(team: &str, stints: Vec<PlayerStint>, players: &[&str]) -> Timeline {
        Timeline {
            team_id: team.to_string(),
            players: players.iter().map(|p| p.to_string()).collect(),
            stints,
            anomalies: vec![],
            approximate: false,
            end: GameProgress::Live { elapsed_secs: 720 }.end_elapsed(&GameFormat::default()),
        }
    }

    fn stint(player: &str, team: &str, start: u32, end: u32) -> PlayerStint {
        PlayerStint {
            player_id: player.to_string(),
            team_id: team.to_string(),
            start,
            end: Some(end),
        }
    }

    fn score(team: &str, points: u32, elapsed: u32) -> ScoringEvent {
        ScoringEvent {
            event_id: format!("{team}-{elapsed}"),
            team_id: team.to_string(),
            points,
            elapsed,
        }
    }

    #[test]
    fn test_points_split_by_team() {
        let home = timeline("home", vec![stint("a", "home", 0, 720)], &["a"]);
        let away = timeline("away", vec![stint("x", "away", 0, 720)], &["x"]);
        let scoring = vec![score("home", 3, 100), score("away", 2, 200)];

        let lines = PlusMinusCalculator::compute(&[home, away], &scoring);
        let a = PlusMinusCalculator::for_player(&lines, "a").unwrap();
        assert_eq!((a.points_for, a.points_against, a.plus_minus), (3, 2, 1));
        let x = PlusMinusCalculator::for_player(&lines, "x").unwrap();
        assert_eq!(x.plus_minus, -1);
    }

    #[test]
    fn test_only_stint_time_counts() {
        let home = timeline(
            "home",
            vec![stint("a", "home", 0, 210), stint("f", "home", 210, 720)],
            &["a", "f"],
        );
        let away = timeline("away", vec![stint("x", "away", 0, 720)], &["x"]);
        let scoring = vec![score("away", 3, 210), score("home", 2, 400)];

        let lines = PlusMinusCalculator::compute(&[home, away], &scoring);
        assert_eq!(PlusMinusCalculator::for_player(&lines, "a").unwrap().plus_minus, -3);
        assert_eq!(PlusMinusCalculator::for_player(&lines, "f").unwrap().plus_minus, 2);
    }

    #[test]
    fn test_unknown_team_scoring_is_skipped() {
        let home = timeline("home", vec![stint("a", "home", 0, 720)], &["a"]);
        let away = timeline("away", vec![stint("x", "away", 0, 720)], &["x"]);
        let scoring = vec![score("typo-team", 3, 100), score("home", 2, 200)];

        let lines = PlusMinusCalculator::compute(&[home, away], &scoring);
        let a = PlusMinusCalculator::for_player(&lines, "a").unwrap();
        assert_eq!((a.points_for, a.points_against), (2, 0));
        let x = PlusMinusCalculator::for_player(&lines, "x").unwrap();
        assert_eq!((x.points_for, x.points_against), (0, 2));
        assert_eq!(lines.iter().map(|l| l.plus_minus).sum::<i64>(), 0);
    }
}
