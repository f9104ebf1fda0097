//! On-court stint reconstruction from substitution events.
//!
//! Reconstruction never fails: malformed input is logged, recorded as an
//! anomaly on the resulting timeline, and replaced by a best-effort default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::domain::{EventLog, GameFormat, GameProgress, PlayerStint, SubstitutionEvent, TeamRoster, ON_COURT};

/// Floor time for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFloorTime {
    pub player_id: String,
    pub team_id: String,
    pub seconds: u32,
    pub stints: usize,
}

/// Reconstructed stints for one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub team_id: String,
    /// Roster order, then players that only appeared through substitutions
    pub players: Vec<String>,
    pub stints: Vec<PlayerStint>,
    pub anomalies: Vec<String>,
    /// No substitutions were recorded; starters were credited the whole game
    pub approximate: bool,
    /// Elapsed time every open stint was closed at
    pub end: u32,
}

impl Timeline {
    pub fn stints_for<'a>(&'a self, player_id: &'a str) -> impl Iterator<Item = &'a PlayerStint> + 'a {
        self.stints.iter().filter(move |s| s.player_id == player_id)
    }

    pub fn floor_time_of(&self, player_id: &str) -> u32 {
        self.stints_for(player_id).map(|s| s.duration(self.end)).sum()
    }

    pub fn floor_time(&self) -> Vec<PlayerFloorTime> {
        self.players
            .iter()
            .map(|player_id| PlayerFloorTime {
                player_id: player_id.clone(),
                team_id: self.team_id.clone(),
                seconds: self.floor_time_of(player_id),
                stints: self.stints_for(player_id).count(),
            })
            .collect()
    }

    pub fn total_floor_time(&self) -> u32 {
        self.stints.iter().map(|s| s.duration(self.end)).sum()
    }

    /// Players on court at instant `t`. Stints are half-open `(start, end]`,
    /// so an instant shared by a substitution belongs to the outgoing player.
    pub fn on_court_at(&self, t: u32) -> Vec<&str> {
        self.stints
            .iter()
            .filter(|s| s.contains(t))
            .map(|s| s.player_id.as_str())
            .collect()
    }

    pub fn was_on_court(&self, player_id: &str, t: u32) -> bool {
        self.stints_for(player_id).any(|s| s.contains(t))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineReconstructor {
    format: GameFormat,
}

impl TimelineReconstructor {
    pub fn new(format: GameFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &GameFormat {
        &self.format
    }

    pub fn from_log(&self, log: &EventLog, roster: &TeamRoster, progress: GameProgress) -> Timeline {
        let subs: Vec<&SubstitutionEvent> = log.substitutions_for(&roster.team_id).collect();
        self.reconstruct(roster, subs, progress)
    }

    pub fn reconstruct<'a, I>(&self, roster: &TeamRoster, substitutions: I, progress: GameProgress) -> Timeline
    where
        I: IntoIterator<Item = &'a SubstitutionEvent>,
    {
        let team_id = roster.team_id.as_str();
        let end = progress.end_elapsed(&self.format);
        let mut anomalies = Vec::new();

        let mut ordered: Vec<&SubstitutionEvent> = Vec::new();
        for sub in substitutions {
            if sub.team_id == team_id {
                ordered.push(sub);
            } else {
                note(&mut anomalies, format!("substitution {} belongs to team {}, skipped", sub.id, sub.team_id));
            }
        }
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        if roster.player_ids.len() < ON_COURT {
            note(
                &mut anomalies,
                format!("roster for {} has only {} players", team_id, roster.player_ids.len()),
            );
        }

        let mut players: Vec<String> = roster.player_ids.clone();
        let mut stints: Vec<PlayerStint> = roster
            .starters()
            .iter()
            .map(|p| PlayerStint::open(p, team_id, 0))
            .collect();
        let mut open: HashMap<String, usize> = stints
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.player_id.clone(), idx))
            .collect();

        let approximate = ordered.is_empty();

        for sub in ordered {
            let t = sub.elapsed(&self.format);

            if sub.player_out_id == sub.player_in_id {
                note(&mut anomalies, format!("substitution {} swaps {} for itself", sub.id, sub.player_in_id));
                continue;
            }

            match open.remove(&sub.player_out_id) {
                Some(idx) => {
                    let stint = &mut stints[idx];
                    if t < stint.start {
                        note(
                            &mut anomalies,
                            format!(
                                "substitution {} at {}s precedes {}'s stint start {}s, clamped",
                                sub.id, t, stint.player_id, stint.start
                            ),
                        );
                    }
                    stint.end = Some(t.max(stint.start));
                }
                None => note(
                    &mut anomalies,
                    format!("substitution {}: {} is not on court, out ignored", sub.id, sub.player_out_id),
                ),
            }

            if open.contains_key(&sub.player_in_id) {
                note(
                    &mut anomalies,
                    format!("substitution {}: {} is already on court, in ignored", sub.id, sub.player_in_id),
                );
                continue;
            }

            let last_end = stints
                .iter()
                .filter(|s| s.player_id == sub.player_in_id)
                .filter_map(|s| s.end)
                .max()
                .unwrap_or(0);
            let start = if t < last_end {
                note(
                    &mut anomalies,
                    format!(
                        "substitution {} at {}s overlaps {}'s previous stint, clamped to {}s",
                        sub.id, t, sub.player_in_id, last_end
                    ),
                );
                last_end
            } else {
                t
            };

            if !players.contains(&sub.player_in_id) {
                players.push(sub.player_in_id.clone());
            }
            open.insert(sub.player_in_id.clone(), stints.len());
            stints.push(PlayerStint::open(&sub.player_in_id, team_id, start));
        }

        let mut still_open: Vec<usize> = open.into_values().collect();
        still_open.sort_unstable();
        for idx in still_open {
            let stint = &mut stints[idx];
            if end < stint.start {
                note(
                    &mut anomalies,
                    format!("{}'s open stint starts at {}s, after the end {}s", stint.player_id, stint.start, end),
                );
            }
            stint.end = Some(end.max(stint.start));
        }

        Timeline {
            team_id: team_id.to_string(),
            players,
            stints,
            anomalies,
            approximate,
            end,
        }
    }
}

fn note(anomalies: &mut Vec<String>, message: String) {
    warn!("Timeline anomaly: {}", message);
    anomalies.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameClock;
    use chrono::{TimeZone, Utc};

    fn roster() -> TeamRoster {
        TeamRoster::new("home", ["a", "b", "c", "d", "e", "f", "g"].iter().map(|s| s.to_string()).collect())
    }

    fn sub(id: &str, seq: i64, out: &str, into: &str, clock: GameClock) -> SubstitutionEvent {
        SubstitutionEvent {
            id: id.to_string(),
            game_id: "g1".into(),
            team_id: "home".into(),
            player_out_id: out.to_string(),
            player_in_id: into.to_string(),
            quarter: clock.quarter,
            clock_minutes: clock.minutes,
            clock_seconds: clock.seconds,
            created_at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        }
    }

    fn live(elapsed_secs: u32) -> GameProgress {
        GameProgress::Live { elapsed_secs }
    }

    #[test]
    fn test_single_substitution_splits_floor_time() {
        let subs = vec![sub("s1", 1, "a", "f", GameClock::new(1, 8, 30))];
        let timeline = TimelineReconstructor::default().reconstruct(&roster(), &subs, live(720));

        assert_eq!(timeline.floor_time_of("a"), 210);
        assert_eq!(timeline.floor_time_of("f"), 510);
        assert_eq!(timeline.floor_time_of("b"), 720);
        assert_eq!(timeline.floor_time_of("g"), 0);
        assert!(!timeline.approximate);
        assert!(timeline.anomalies.is_empty());
    }

    #[test]
    fn test_five_on_court_at_every_instant() {
        let subs = vec![
            sub("s1", 1, "a", "f", GameClock::new(1, 8, 30)),
            sub("s2", 2, "b", "g", GameClock::new(1, 2, 0)),
            sub("s3", 3, "f", "a", GameClock::new(2, 10, 0)),
            sub("s4", 4, "g", "b", GameClock::new(3, 6, 0)),
        ];
        let timeline = TimelineReconstructor::default().reconstruct(
            &roster(),
            &subs,
            GameProgress::Complete { periods_played: 4 },
        );

        for t in 1..=timeline.end {
            assert_eq!(timeline.on_court_at(t).len(), 5, "at t={t}");
        }
    }

    #[test]
    fn test_completed_game_conserves_floor_time() {
        let subs = vec![
            sub("s1", 1, "a", "f", GameClock::new(1, 8, 30)),
            sub("s2", 2, "c", "g", GameClock::new(4, 1, 0)),
        ];
        let timeline = TimelineReconstructor::default().reconstruct(
            &roster(),
            &subs,
            GameProgress::Complete { periods_played: 5 },
        );
        assert_eq!(timeline.end, 2880 + 300);
        assert_eq!(timeline.total_floor_time(), 5 * (2880 + 300));
    }

    #[test]
    fn test_replay_order_uses_creation_time_not_input_order() {
        let mut subs = vec![
            sub("s2", 2, "f", "a", GameClock::new(2, 12, 0)),
            sub("s1", 1, "a", "f", GameClock::new(1, 8, 30)),
        ];
        let reconstructor = TimelineReconstructor::default();
        let first = reconstructor.reconstruct(&roster(), &subs, live(1000));
        subs.reverse();
        let second = reconstructor.reconstruct(&roster(), &subs, live(1000));

        assert_eq!(first, second);
        assert_eq!(first.floor_time_of("a"), 210 + 280);
        assert_eq!(first.floor_time_of("f"), 510);
    }

    #[test]
    fn test_no_substitutions_is_approximate() {
        let timeline = TimelineReconstructor::default().reconstruct(&roster(), &[], live(600));
        assert!(timeline.approximate);
        assert_eq!(timeline.floor_time_of("a"), 600);
        assert_eq!(timeline.floor_time_of("f"), 0);
        assert_eq!(timeline.floor_time().len(), 7);
    }

    #[test]
    fn test_malformed_substitutions_are_tolerated() {
        let mut other_team = sub("s0", 0, "x", "y", GameClock::new(1, 11, 0));
        other_team.team_id = "away".into();
        let subs = vec![
            other_team,
            sub("s1", 1, "zz", "f", GameClock::new(1, 10, 0)), // out not on court
            sub("s2", 2, "a", "b", GameClock::new(1, 9, 0)),   // in already on court
            sub("s3", 3, "c", "g", GameClock::new(1, 9, 0)),
            sub("s4", 4, "g", "c", GameClock::new(1, 11, 0)), // before g's start and c's last stint
        ];
        let timeline = TimelineReconstructor::default().reconstruct(&roster(), &subs, live(720));

        assert_eq!(timeline.anomalies.len(), 5);
        assert!(timeline.on_court_at(1).contains(&"a"));
        assert_eq!(timeline.floor_time_of("f"), 720 - 120);
        assert_eq!(timeline.floor_time_of("g"), 0);
        assert_eq!(timeline.floor_time_of("c"), 180 + (720 - 180));
    }

    #[test]
    fn test_short_roster_seeds_everyone() {
        let short = TeamRoster::new("home", vec!["a".into(), "b".into(), "c".into()]);
        let timeline = TimelineReconstructor::default().reconstruct(&short, &[], live(100));
        assert_eq!(timeline.stints.len(), 3);
        assert_eq!(timeline.anomalies.len(), 1);
    }

    #[test]
    fn test_substitution_instant_credits_outgoing_player() {
        let subs = vec![sub("s1", 1, "a", "f", GameClock::new(1, 8, 30))];
        let timeline = TimelineReconstructor::default().reconstruct(&roster(), &subs, live(720));
        assert!(timeline.was_on_court("a", 210));
        assert!(!timeline.was_on_court("f", 210));
        assert!(timeline.was_on_court("f", 211));
    }
}
