use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::clock::GameFormat;
use super::event::{EventPatch, GameEvent, SubstitutionEvent};

/// Immutable snapshot of one game's event log.
///
/// Derived stats are always computed from a whole snapshot; local edits
/// produce a new snapshot rather than patching derived state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub game_id: String,
    pub events: Vec<GameEvent>,
    pub substitutions: Vec<SubstitutionEvent>,
}

impl EventLog {
    pub fn new(
        game_id: impl Into<String>,
        mut events: Vec<GameEvent>,
        mut substitutions: Vec<SubstitutionEvent>,
    ) -> Self {
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        substitutions
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            game_id: game_id.into(),
            events,
            substitutions,
        }
    }

    pub fn empty(game_id: impl Into<String>) -> Self {
        Self::new(game_id, Vec::new(), Vec::new())
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.substitutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.substitutions.is_empty()
    }

    pub fn event(&self, id: &str) -> Option<&GameEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id) || self.substitutions.iter().any(|s| s.id == id)
    }

    /// Substitutions for one team, in replay order
    pub fn substitutions_for<'a>(
        &'a self,
        team_id: &'a str,
    ) -> impl Iterator<Item = &'a SubstitutionEvent> + 'a {
        self.substitutions.iter().filter(move |s| s.team_id == team_id)
    }

    /// Latest elapsed time seen in the log (0 when empty)
    pub fn latest_elapsed(&self, format: &GameFormat) -> u32 {
        let events = self.events.iter().map(|e| e.elapsed(format));
        let subs = self.substitutions.iter().map(|s| s.elapsed(format));
        events.chain(subs).max().unwrap_or(0)
    }

    /// Highest period number recorded (at least regulation)
    pub fn periods_played(&self, format: &GameFormat) -> u8 {
        let events = self.events.iter().map(|e| e.quarter);
        let subs = self.substitutions.iter().map(|s| s.quarter);
        events
            .chain(subs)
            .max()
            .unwrap_or(0)
            .max(format.regulation_quarters)
    }

    pub(crate) fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
        self.events
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }

    pub(crate) fn push_substitution(&mut self, sub: SubstitutionEvent) {
        self.substitutions.push(sub);
        self.substitutions
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }

    /// Apply an edit in place; returns false when the id is unknown.
    pub(crate) fn patch_event(&mut self, id: &str, patch: &EventPatch) -> bool {
        match self.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                patch.apply(event);
                true
            }
            None => false,
        }
    }

    /// Remove events and substitutions with the given ids; returns how many went.
    pub(crate) fn remove(&mut self, ids: &HashSet<&str>) -> usize {
        let before = self.len();
        self.events.retain(|e| !ids.contains(e.id.as_str()));
        self.substitutions.retain(|s| !ids.contains(s.id.as_str()));
        before - self.len()
    }
}
