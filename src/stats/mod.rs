//! Pure derived statistics. Everything here is recomputed wholesale from an
//! `EventLog` snapshot; nothing holds state between refreshes.

pub mod box_score;
pub mod plus_minus;
pub mod timeline;

pub use box_score::{BoxScore, PlayerLine, ShootingSplit, StatLine, TeamLine};
pub use plus_minus::{PlusMinusCalculator, PlusMinusLine, ScoringEvent};
pub use timeline::{PlayerFloorTime, Timeline, TimelineReconstructor};
