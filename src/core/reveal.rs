//! Progressive reveal of an already-known reply
//!
//! A reveal walks the reply one character at a time. The pause after each
//! character depends on what was just shown, so sentences read with a
//! natural rhythm. The walk itself lives in the conversation buffer; this
//! module only holds the cursor and the delay schedule.

use std::time::Duration;

use crate::config::RevealConfig;

/// Per-character delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealSchedule {
    /// Pause after an ordinary character
    pub base: Duration,
    /// Pause after a space or newline
    pub short: Duration,
    /// Pause after `,` `;` `:`
    pub medium: Duration,
    /// Pause after `.` `!` `?`
    pub long: Duration,
}

impl RevealSchedule {
    /// Schedule with every pause set to zero
    pub fn instant() -> Self {
        Self {
            base: Duration::ZERO,
            short: Duration::ZERO,
            medium: Duration::ZERO,
            long: Duration::ZERO,
        }
    }

    /// Pause to take after `ch` has been revealed
    pub fn delay_after(&self, ch: char) -> Duration {
        match ch {
            '.' | '!' | '?' => self.long,
            ',' | ';' | ':' => self.medium,
            ' ' | '\n' => self.short,
            _ => self.base,
        }
    }
}

impl Default for RevealSchedule {
    fn default() -> Self {
        Self::from(&RevealConfig::default())
    }
}

impl From<&RevealConfig> for RevealSchedule {
    fn from(config: &RevealConfig) -> Self {
        if !config.enabled {
            return Self::instant();
        }
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            short: Duration::from_millis(config.whitespace_delay_ms),
            medium: Duration::from_millis(config.clause_delay_ms),
            long: Duration::from_millis(config.sentence_delay_ms),
        }
    }
}

/// Cursor over the text being revealed for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealProgress {
    message_id: u64,
    full_text: String,
    /// Byte offset of the revealed prefix, always on a char boundary
    cursor: usize,
}

impl RevealProgress {
    pub fn new(message_id: u64, full_text: impl Into<String>) -> Self {
        Self {
            message_id,
            full_text: full_text.into(),
            cursor: 0,
        }
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Text revealed so far
    pub fn visible(&self) -> &str {
        &self.full_text[..self.cursor]
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.full_text.len()
    }

    /// Reveal one more character and return it
    pub fn step(&mut self) -> Option<char> {
        let ch = self.full_text[self.cursor..].chars().next()?;
        self.cursor += ch.len_utf8();
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> RevealSchedule {
        RevealSchedule {
            base: Duration::from_millis(1),
            short: Duration::from_millis(2),
            medium: Duration::from_millis(3),
            long: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_classes() {
        let s = schedule();
        assert_eq!(s.delay_after('a'), Duration::from_millis(1));
        assert_eq!(s.delay_after(' '), Duration::from_millis(2));
        assert_eq!(s.delay_after('\n'), Duration::from_millis(2));
        assert_eq!(s.delay_after(','), Duration::from_millis(3));
        assert_eq!(s.delay_after(':'), Duration::from_millis(3));
        assert_eq!(s.delay_after('?'), Duration::from_millis(4));
    }

    #[test]
    fn test_delays_over_a_sentence() {
        let schedule = schedule();
        // H=1 i=1 ,=3 ' '=2 y=1 o=1 u=1 .=4
        let total: Duration = "Hi, you.".chars().map(|c| schedule.delay_after(c)).sum();
        assert_eq!(total, Duration::from_millis(14));
    }

    #[test]
    fn test_disabled_config_is_instant() {
        let config = RevealConfig {
            enabled: false,
            ..RevealConfig::default()
        };
        assert_eq!(RevealSchedule::from(&config), RevealSchedule::instant());
    }

    #[test]
    fn test_progress_steps_through_multibyte_text() {
        let mut progress = RevealProgress::new(7, "né!");
        assert_eq!(progress.visible(), "");
        assert_eq!(progress.step(), Some('n'));
        assert_eq!(progress.step(), Some('é'));
        assert_eq!(progress.visible(), "né");
        assert!(!progress.is_complete());
        assert_eq!(progress.step(), Some('!'));
        assert!(progress.is_complete());
        assert_eq!(progress.step(), None);
        assert_eq!(progress.visible(), progress.full_text());
    }
}
