use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::clock::{GameClock, GameFormat};

/// Prefix marking a locally-scoped custom player id
pub const CUSTOM_PLAYER_PREFIX: &str = "custom:";

/// Kind of stat event recorded courtside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "shot_2")]
    Shot2,
    #[serde(rename = "shot_3")]
    Shot3,
    FreeThrow,
    Rebound,
    Assist,
    Steal,
    Block,
    Turnover,
    Foul,
    Substitution,
    #[serde(other)]
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Shot2 => "shot_2",
            EventType::Shot3 => "shot_3",
            EventType::FreeThrow => "free_throw",
            EventType::Rebound => "rebound",
            EventType::Assist => "assist",
            EventType::Steal => "steal",
            EventType::Block => "block",
            EventType::Turnover => "turnover",
            EventType::Foul => "foul",
            EventType::Substitution => "substitution",
            EventType::Unknown => "unknown",
        }
    }

    /// Point value of a made attempt of this type
    pub fn point_value(&self) -> u32 {
        match self {
            EventType::Shot2 => 2,
            EventType::Shot3 => 3,
            EventType::FreeThrow => 1,
            _ => 0,
        }
    }

    pub fn is_field_goal(&self) -> bool {
        matches!(self, EventType::Shot2 | EventType::Shot3)
    }

    pub fn is_attempt(&self) -> bool {
        matches!(
            self,
            EventType::Shot2 | EventType::Shot3 | EventType::FreeThrow
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Qualifier on an event (outcome of a shot, kind of rebound or foul)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Made,
    Missed,
    Offensive,
    Defensive,
    Personal,
    Technical,
    Flagrant,
    #[serde(other)]
    Unknown,
}

/// A recorded stat event, as stored in the `game_events` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: String,
    pub game_id: String,
    /// Player id, or `custom:<id>` for a player recorded on the fly.
    /// Empty for team-only events.
    #[serde(default)]
    pub subject_id: String,
    pub team_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub modifier: Option<Modifier>,
    pub quarter: u8,
    pub clock_minutes: u8,
    pub clock_seconds: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_media_timestamp: Option<f64>,
}

/// Who an event is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Player(&'a str),
    Custom(&'a str),
}

impl GameEvent {
    pub fn clock(&self) -> GameClock {
        GameClock::new(self.quarter, self.clock_minutes, self.clock_seconds)
    }

    pub fn elapsed(&self, format: &GameFormat) -> u32 {
        format.elapsed(self.clock())
    }

    pub fn is_made(&self) -> bool {
        self.event_type.is_attempt() && self.modifier == Some(Modifier::Made)
    }

    /// Points this event puts on the board (0 for anything but a make)
    pub fn points(&self) -> u32 {
        if self.is_made() {
            self.event_type.point_value()
        } else {
            0
        }
    }

    pub fn subject(&self) -> Option<Subject<'_>> {
        let id = self.subject_id.trim();
        if id.is_empty() {
            None
        } else if let Some(custom) = id.strip_prefix(CUSTOM_PLAYER_PREFIX) {
            Some(Subject::Custom(custom))
        } else {
            Some(Subject::Player(id))
        }
    }
}

/// An operator edit to an existing event; unset fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Modifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_minutes: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_seconds: Option<u8>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self == &EventPatch::default()
    }

    pub fn apply(&self, event: &mut GameEvent) {
        if let Some(subject_id) = &self.subject_id {
            event.subject_id = subject_id.clone();
        }
        if let Some(team_id) = &self.team_id {
            event.team_id = team_id.clone();
        }
        if let Some(event_type) = self.event_type {
            event.event_type = event_type;
        }
        if let Some(modifier) = self.modifier {
            event.modifier = Some(modifier);
        }
        if let Some(quarter) = self.quarter {
            event.quarter = quarter;
        }
        if let Some(minutes) = self.clock_minutes {
            event.clock_minutes = minutes;
        }
        if let Some(seconds) = self.clock_seconds {
            event.clock_seconds = seconds;
        }
    }
}

/// A stat event as entered by an operator, before it has an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewGameEvent {
    pub subject_id: String,
    pub team_id: String,
    pub event_type: EventType,
    pub modifier: Option<Modifier>,
    pub clock: GameClock,
    pub external_media_timestamp: Option<f64>,
}

impl NewGameEvent {
    pub fn into_event(self, game_id: &str) -> GameEvent {
        GameEvent {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            subject_id: self.subject_id,
            team_id: self.team_id,
            event_type: self.event_type,
            modifier: self.modifier,
            quarter: self.clock.quarter,
            clock_minutes: self.clock.minutes,
            clock_seconds: self.clock.seconds,
            created_at: Utc::now(),
            external_media_timestamp: self.external_media_timestamp,
        }
    }
}

/// A substitution, as stored in the `substitutions` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionEvent {
    pub id: String,
    pub game_id: String,
    pub team_id: String,
    pub player_out_id: String,
    pub player_in_id: String,
    pub quarter: u8,
    pub clock_minutes: u8,
    pub clock_seconds: u8,
    pub created_at: DateTime<Utc>,
}

impl SubstitutionEvent {
    pub fn clock(&self) -> GameClock {
        GameClock::new(self.quarter, self.clock_minutes, self.clock_seconds)
    }

    pub fn elapsed(&self, format: &GameFormat) -> u32 {
        format.elapsed(self.clock())
    }
}

/// A substitution as entered by an operator, before it has an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubstitution {
    pub team_id: String,
    pub player_out_id: String,
    pub player_in_id: String,
    pub clock: GameClock,
}

impl NewSubstitution {
    pub fn into_event(self, game_id: &str) -> SubstitutionEvent {
        SubstitutionEvent {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            team_id: self.team_id,
            player_out_id: self.player_out_id,
            player_in_id: self.player_in_id,
            quarter: self.clock.quarter,
            clock_minutes: self.clock.minutes,
            clock_seconds: self.clock.seconds,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_event() {
        let raw = json!({
            "id": "e1",
            "gameId": "g1",
            "subjectId": "p7",
            "teamId": "home",
            "eventType": "shot_3",
            "modifier": "made",
            "quarter": 2,
            "clockMinutes": 4,
            "clockSeconds": 12,
            "createdAt": "2026-03-01T19:30:00Z"
        });

        let event: GameEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, EventType::Shot3);
        assert_eq!(event.points(), 3);
        assert_eq!(event.subject(), Some(Subject::Player("p7")));
        assert_eq!(event.external_media_timestamp, None);
    }

    #[test]
    fn test_unknown_type_and_modifier_decode() {
        let raw = json!({
            "id": "e2",
            "gameId": "g1",
            "subjectId": "custom:walkon",
            "teamId": "away",
            "eventType": "jump_ball",
            "modifier": "tipped",
            "quarter": 1,
            "clockMinutes": 12,
            "clockSeconds": 0,
            "createdAt": "2026-03-01T19:00:00Z"
        });

        let event: GameEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, EventType::Unknown);
        assert_eq!(event.modifier, Some(Modifier::Unknown));
        assert_eq!(event.points(), 0);
        assert_eq!(event.subject(), Some(Subject::Custom("walkon")));
    }

    #[test]
    fn test_missed_shot_scores_nothing() {
        let mut event = NewGameEvent {
            subject_id: "p1".into(),
            team_id: "home".into(),
            event_type: EventType::Shot2,
            modifier: Some(Modifier::Missed),
            clock: GameClock::new(1, 10, 0),
            external_media_timestamp: None,
        }
        .into_event("g1");
        assert_eq!(event.points(), 0);

        EventPatch {
            modifier: Some(Modifier::Made),
            ..Default::default()
        }
        .apply(&mut event);
        assert_eq!(event.points(), 2);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = EventPatch {
            quarter: Some(3),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "quarter": 3 }));
        assert!(!patch.is_empty());
        assert!(EventPatch::default().is_empty());
    }
}
