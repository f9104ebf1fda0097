use serde::{Deserialize, Serialize};
use std::fmt;

/// Period structure of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFormat {
    /// Length of one regulation quarter in seconds
    pub quarter_length_secs: u32,
    /// Number of regulation quarters
    pub regulation_quarters: u8,
    /// Length of each overtime period in seconds
    pub overtime_length_secs: u32,
}

impl Default for GameFormat {
    fn default() -> Self {
        Self {
            quarter_length_secs: 720,
            regulation_quarters: 4,
            overtime_length_secs: 300,
        }
    }
}

impl GameFormat {
    /// Length of a given period (1-based); periods past regulation are overtime.
    pub fn period_length(&self, period: u8) -> u32 {
        if period <= self.regulation_quarters {
            self.quarter_length_secs
        } else {
            self.overtime_length_secs
        }
    }

    /// Elapsed seconds at the start of `period`.
    pub fn period_start(&self, period: u8) -> u32 {
        let period = period.max(1);
        let regulation_done = (period - 1).min(self.regulation_quarters) as u32;
        let overtime_done = (period - 1).saturating_sub(self.regulation_quarters) as u32;
        regulation_done * self.quarter_length_secs + overtime_done * self.overtime_length_secs
    }

    /// Monotonic seconds since tip-off for a countdown clock reading.
    ///
    /// A remaining time larger than the period length (bad entry) clamps to
    /// the period start.
    pub fn elapsed(&self, clock: GameClock) -> u32 {
        let length = self.period_length(clock.quarter.max(1));
        let remaining = clock.remaining_secs().min(length);
        self.period_start(clock.quarter) + (length - remaining)
    }

    /// Elapsed seconds at the final buzzer after `periods_played` periods.
    pub fn game_end(&self, periods_played: u8) -> u32 {
        self.period_start(periods_played.saturating_add(1))
    }

    /// Length of regulation play
    pub fn regulation_length(&self) -> u32 {
        self.period_start(self.regulation_quarters + 1)
    }

    /// Period in progress at a given elapsed time (1-based)
    pub fn period_at(&self, elapsed: u32) -> u8 {
        let mut period: u8 = 1;
        while self.period_start(period.saturating_add(1)) <= elapsed && period < u8::MAX {
            period += 1;
        }
        period
    }
}

/// Countdown clock reading as recorded courtside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameClock {
    pub quarter: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl GameClock {
    pub fn new(quarter: u8, minutes: u8, seconds: u8) -> Self {
        Self {
            quarter,
            minutes,
            seconds,
        }
    }

    pub fn remaining_secs(&self) -> u32 {
        self.minutes as u32 * 60 + self.seconds as u32
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{} {}:{:02}", self.quarter, self.minutes, self.seconds)
    }
}

/// Where the game stands when a timeline is reconstructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameProgress {
    /// Game still being played; open stints close at this elapsed time
    Live { elapsed_secs: u32 },
    /// Final buzzer sounded after this many periods
    Complete { periods_played: u8 },
}

impl GameProgress {
    pub fn end_elapsed(&self, format: &GameFormat) -> u32 {
        match self {
            GameProgress::Live { elapsed_secs } => *elapsed_secs,
            GameProgress::Complete { periods_played } => format.game_end(*periods_played),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, GameProgress::Complete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic_across_quarters() {
        let format = GameFormat::default();
        assert_eq!(format.elapsed(GameClock::new(1, 12, 0)), 0);
        assert_eq!(format.elapsed(GameClock::new(1, 8, 30)), 210);
        assert_eq!(format.elapsed(GameClock::new(1, 0, 0)), 720);
        assert_eq!(format.elapsed(GameClock::new(2, 12, 0)), 720);
        assert_eq!(format.elapsed(GameClock::new(4, 0, 0)), 2880);
    }

    #[test]
    fn test_overtime_uses_overtime_length() {
        let format = GameFormat::default();
        assert_eq!(format.period_start(5), 2880);
        assert_eq!(format.elapsed(GameClock::new(5, 5, 0)), 2880);
        assert_eq!(format.elapsed(GameClock::new(5, 0, 0)), 3180);
        assert_eq!(format.game_end(5), 3180);
        assert_eq!(format.game_end(4), 2880);
    }

    #[test]
    fn test_bad_clock_clamps_to_period_start() {
        let format = GameFormat::default();
        assert_eq!(format.elapsed(GameClock::new(2, 15, 0)), 720);
    }

    #[test]
    fn test_period_at() {
        let format = GameFormat::default();
        assert_eq!(format.period_at(0), 1);
        assert_eq!(format.period_at(719), 1);
        assert_eq!(format.period_at(720), 2);
        assert_eq!(format.period_at(2900), 5);
    }
}
