use serde::{Deserialize, Serialize};

/// A contiguous interval during which one player is on the court.
///
/// Times are elapsed game seconds. `end == None` means the stint is still
/// open. Membership is half-open: the player is on court for instants
/// `start < t <= end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStint {
    pub player_id: String,
    pub team_id: String,
    pub start: u32,
    pub end: Option<u32>,
}

impl PlayerStint {
    pub fn open(player_id: &str, team_id: &str, start: u32) -> Self {
        Self {
            player_id: player_id.to_string(),
            team_id: team_id.to_string(),
            start,
            end: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration in seconds; an open stint is measured up to `now`.
    pub fn duration(&self, now: u32) -> u32 {
        self.end.unwrap_or(now).saturating_sub(self.start)
    }

    pub fn contains(&self, elapsed: u32) -> bool {
        elapsed > self.start && self.end.map_or(true, |end| elapsed <= end)
    }
}

/// Team id plus the ordered player list; the first five are the starters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRoster {
    pub team_id: String,
    pub player_ids: Vec<String>,
}

/// Number of players a team has on the floor
pub const ON_COURT: usize = 5;

impl TeamRoster {
    pub fn new(team_id: impl Into<String>, player_ids: Vec<String>) -> Self {
        Self {
            team_id: team_id.into(),
            player_ids,
        }
    }

    pub fn starters(&self) -> &[String] {
        &self.player_ids[..self.player_ids.len().min(ON_COURT)]
    }

    pub fn bench(&self) -> &[String] {
        &self.player_ids[self.player_ids.len().min(ON_COURT)..]
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.player_ids.iter().any(|p| p == player_id)
    }

    /// Parse `TEAM:P1,P2,...` as given on the command line.
    pub fn parse(raw: &str) -> Option<Self> {
        let (team, players) = raw.split_once(':')?;
        let team = team.trim();
        if team.is_empty() {
            return None;
        }
        let player_ids: Vec<String> = players
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self::new(team, player_ids))
    }
}
