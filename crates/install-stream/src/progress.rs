//! Monotonic percentage gate behind the progress bar.

use serde::{Deserialize, Serialize};

/// Colour of the progress bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressColor {
    #[default]
    Normal,
    Error,
}

impl ProgressColor {
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Normal => "#007bff",
            Self::Error => "#dc3545",
        }
    }
}

/// What the progress bar currently shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedProgress {
    /// Percentage in `0..=100`.
    pub percent: u8,
    pub color: ProgressColor,
}

/// Holds the displayed percentage and refuses to move it backwards.
///
/// A lower candidate is ignored unless the bar already sits at 100. The error
/// colour is sticky: once set it stays until [`ProgressGate::reset`].
#[derive(Clone, Debug, Default)]
pub struct ProgressGate {
    current: DisplayedProgress,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> DisplayedProgress {
        self.current
    }

    /// Offers a new percentage. Returns `true` when the displayed state changed.
    pub fn update(&mut self, candidate: u8, is_error: bool) -> bool {
        let before = self.current;
        let candidate = candidate.min(100);
        if !(candidate < self.current.percent && self.current.percent < 100) {
            self.current.percent = candidate;
        }
        if is_error {
            self.current.color = ProgressColor::Error;
        }
        self.current != before
    }

    /// Flags the error colour without moving the percentage.
    pub fn flag_error(&mut self) -> bool {
        self.update(self.current.percent, true)
    }

    /// Returns to 0% with the normal colour. Returns `true` when anything changed.
    pub fn reset(&mut self) -> bool {
        let before = self.current;
        self.current = DisplayedProgress::default();
        self.current != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_low_progress_is_ignored() {
        let mut gate = ProgressGate::new();
        assert!(gate.update(50, false));
        assert!(!gate.update(20, false));
        assert_eq!(gate.current().percent, 50);
    }

    #[test]
    fn displayed_percentage_never_decreases_below_full() {
        let mut gate = ProgressGate::new();
        let mut last = 0;
        for candidate in [20, 10, 30, 30, 5, 70, 50, 90] {
            gate.update(candidate, false);
            assert!(gate.current().percent >= last);
            last = gate.current().percent;
        }
        assert_eq!(last, 90);
    }

    #[test]
    fn full_bar_accepts_any_candidate() {
        let mut gate = ProgressGate::new();
        gate.update(100, false);
        assert!(gate.update(20, false));
        assert_eq!(gate.current().percent, 20);
    }

    #[test]
    fn candidates_are_clamped_to_full() {
        let mut gate = ProgressGate::new();
        gate.update(250, false);
        assert_eq!(gate.current().percent, 100);
    }

    #[test]
    fn error_colour_is_sticky_until_reset() {
        let mut gate = ProgressGate::new();
        gate.update(30, true);
        assert!(!gate.update(30, false));
        gate.update(70, false);
        assert_eq!(gate.current().color, ProgressColor::Error);
        assert_eq!(gate.current().percent, 70);

        assert!(gate.reset());
        assert_eq!(gate.current(), DisplayedProgress::default());
    }

    #[test]
    fn error_flag_does_not_block_forward_progress() {
        let mut gate = ProgressGate::new();
        gate.update(20, false);
        assert!(gate.flag_error());
        assert_eq!(gate.current().percent, 20);
        assert!(gate.update(50, false));
        assert_eq!(gate.current().percent, 50);
    }

    #[test]
    fn colour_constants() {
        assert_eq!(ProgressColor::Normal.hex(), "#007bff");
        assert_eq!(ProgressColor::Error.hex(), "#dc3545");
    }
}
