//! Terminal rendering of game snapshots.
//!
//! Two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::Result;
use crate::session::GameSnapshot;
use crate::stats::{BoxScore, PlayerFloorTime, PlusMinusLine, StatLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PlayerRow {
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "MIN")]
    minutes: String,
    #[tabled(rename = "PTS")]
    points: u32,
    #[tabled(rename = "FG")]
    field_goals: String,
    #[tabled(rename = "3P")]
    three_pointers: String,
    #[tabled(rename = "FT")]
    free_throws: String,
    #[tabled(rename = "REB")]
    rebounds: u32,
    #[tabled(rename = "AST")]
    assists: u32,
    #[tabled(rename = "STL")]
    steals: u32,
    #[tabled(rename = "BLK")]
    blocks: u32,
    #[tabled(rename = "TOV")]
    turnovers: u32,
    #[tabled(rename = "PF")]
    fouls: u32,
    #[tabled(rename = "+/-")]
    plus_minus: String,
}

#[derive(Debug, Serialize, Tabled)]
struct TeamRow {
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "PTS")]
    points: u32,
    #[tabled(rename = "By period")]
    by_period: String,
    #[tabled(rename = "FG")]
    field_goals: String,
    #[tabled(rename = "REB")]
    rebounds: u32,
    #[tabled(rename = "TOV")]
    turnovers: u32,
}

/// JSON view of a snapshot
#[derive(Debug, Serialize)]
struct SnapshotView<'a> {
    game_id: &'a str,
    version: u64,
    box_score: &'a BoxScore,
    floor_time: &'a [PlayerFloorTime],
    plus_minus: &'a [PlusMinusLine],
    approximate: bool,
    anomalies: Vec<&'a str>,
    last_error: Option<&'a str>,
}

fn minutes(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn player_row(snapshot: &GameSnapshot, team_id: &str, player_id: &str) -> PlayerRow {
    let line = snapshot.box_score.player(player_id);
    let stats = line.map(|l| l.stats.clone()).unwrap_or_else(StatLine::default);
    let display = line.map_or(player_id, |l| l.display_id());

    PlayerRow {
        team: team_id.to_string(),
        player: display.to_string(),
        minutes: snapshot
            .floor_time_of(player_id)
            .map(minutes)
            .unwrap_or_else(|| "-".to_string()),
        points: stats.points,
        field_goals: stats.field_goals.to_string(),
        three_pointers: stats.three_pointers.to_string(),
        free_throws: stats.free_throws.to_string(),
        rebounds: stats.rebounds,
        assists: stats.assists,
        steals: stats.steals,
        blocks: stats.blocks,
        turnovers: stats.turnovers,
        fouls: stats.fouls,
        plus_minus: snapshot
            .plus_minus_of(player_id)
            .map(signed)
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn player_rows(snapshot: &GameSnapshot) -> Vec<PlayerRow> {
    let mut rows = Vec::new();
    for timeline in &snapshot.timelines {
        for player_id in &timeline.players {
            rows.push(player_row(snapshot, &timeline.team_id, player_id));
        }
        // Players with stats but no roster spot (custom entries, late additions)
        for line in snapshot.box_score.players_for(&timeline.team_id) {
            if !timeline.players.contains(&line.player_id) {
                rows.push(player_row(snapshot, &timeline.team_id, &line.player_id));
            }
        }
    }
    rows
}

fn team_rows(snapshot: &GameSnapshot) -> Vec<TeamRow> {
    snapshot
        .timelines
        .iter()
        .map(|timeline| {
            let team = snapshot.box_score.team(&timeline.team_id);
            let stats = team.map(|t| t.stats.clone()).unwrap_or_default();
            let by_period = team
                .map(|t| {
                    t.points_by_period
                        .iter()
                        .map(|(period, pts)| format!("P{period} {pts}"))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .unwrap_or_default();

            TeamRow {
                team: timeline.team_id.clone(),
                points: stats.points,
                by_period,
                field_goals: stats.field_goals.to_string(),
                rebounds: stats.rebounds,
                turnovers: stats.turnovers,
            }
        })
        .collect()
}

/// Render a snapshot as tables
pub fn render_snapshot(snapshot: &GameSnapshot) -> String {
    let mut out = format!(
        "Game {} (v{}, {})\n",
        snapshot.game_id,
        snapshot.version,
        snapshot.computed_at.format("%H:%M:%S")
    );

    out.push_str(&Table::new(team_rows(snapshot)).to_string());
    out.push('\n');

    let players = player_rows(snapshot);
    if players.is_empty() {
        out.push_str("(no players)\n");
    } else {
        out.push_str(&Table::new(players).to_string());
        out.push('\n');
    }

    for timeline in &snapshot.timelines {
        if timeline.approximate {
            out.push_str(&format!(
                "note: {} has no substitutions, floor time assumes starters played throughout\n",
                timeline.team_id
            ));
        }
        if !timeline.anomalies.is_empty() {
            out.push_str(&format!(
                "note: {} substitution anomalies in {}\n",
                timeline.anomalies.len(),
                timeline.team_id
            ));
        }
    }

    if snapshot.box_score.ignored > 0 {
        out.push_str(&format!("note: {} events ignored\n", snapshot.box_score.ignored));
    }

    if let Some(err) = &snapshot.last_error {
        out.push_str(&format!("error: {err}\n"));
    }

    out
}

pub fn render_json(snapshot: &GameSnapshot) -> Result<String> {
    let view = SnapshotView {
        game_id: &snapshot.game_id,
        version: snapshot.version,
        box_score: &snapshot.box_score,
        floor_time: &snapshot.floor_time,
        plus_minus: &snapshot.plus_minus,
        approximate: snapshot.timelines.iter().any(|t| t.approximate),
        anomalies: snapshot
            .timelines
            .iter()
            .flat_map(|t| t.anomalies.iter().map(String::as_str))
            .collect(),
        last_error: snapshot.last_error.as_deref(),
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

/// Print a snapshot in the chosen mode.
pub fn print_snapshot(snapshot: &GameSnapshot, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Table => println!("{}", render_snapshot(snapshot)),
        OutputMode::Json => println!("{}", render_json(snapshot)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventLog, EventType, GameEvent, Modifier, TeamRoster};
    use crate::session::GameContext;
    use chrono::Utc;
    use std::sync::Arc;

    fn context() -> GameContext {
        let home = TeamRoster::new("h", ["a", "b", "c", "d", "e"].map(String::from).to_vec());
        let away = TeamRoster::new("v", ["p", "q", "r", "s", "t"].map(String::from).to_vec());
        GameContext::new("g1", home, away)
    }

    fn three(id: &str, subject: &str, team: &str) -> GameEvent {
        GameEvent {
            id: id.to_string(),
            game_id: "g1".to_string(),
            subject_id: subject.to_string(),
            team_id: team.to_string(),
            event_type: EventType::Shot3,
            modifier: Some(Modifier::Made),
            quarter: 1,
            clock_minutes: 10,
            clock_seconds: 0,
            created_at: Utc::now(),
            external_media_timestamp: None,
        }
    }

    #[test]
    fn test_minutes_format() {
        assert_eq!(minutes(0), "0:00");
        assert_eq!(minutes(510), "8:30");
        assert_eq!(signed(3), "+3");
        assert_eq!(signed(-2), "-2");
        assert_eq!(signed(0), "0");
    }

    #[test]
    fn test_render_lists_every_roster_player() {
        let log = EventLog::new("g1", vec![three("e1", "a", "h")], vec![]);
        let snapshot = GameSnapshot::compute(&context(), Arc::new(log), 1, None);

        let rows = player_rows(&snapshot);
        assert_eq!(rows.len(), 10);
        let a = rows.iter().find(|r| r.player == "a").unwrap();
        assert_eq!(a.points, 3);
        assert_eq!(a.plus_minus, "+3");

        let text = render_snapshot(&snapshot);
        assert!(text.contains("Game g1 (v1"));
        assert!(text.contains("has no substitutions"));
    }

    #[test]
    fn test_json_view_carries_stats() {
        let log = EventLog::new("g1", vec![three("e1", "a", "h")], vec![]);
        let snapshot = GameSnapshot::compute(&context(), Arc::new(log), 2, Some("boom".into()));

        let json: serde_json::Value = serde_json::from_str(&render_json(&snapshot).unwrap()).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["last_error"], "boom");
        assert_eq!(json["approximate"], true);
    }
}
