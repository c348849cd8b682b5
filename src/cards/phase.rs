//! Roll phase state machine.
//!
//! Every roll on a card progresses through
//! `mode-select → bonus-input → result`. `result` is terminal: the roll is
//! evaluated the moment it is entered and the expression can no longer be
//! edited (mode changes after that re-derive the evaluated roll instead of
//! re-rolling it).

use serde::{Deserialize, Serialize};

/// A roll's position in its interaction flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollPhase {
    ModeSelect,
    BonusInput,
    Result,
}

impl RollPhase {
    /// Whether the roll reached its terminal phase.
    #[must_use]
    pub fn is_result(self) -> bool {
        self == RollPhase::Result
    }
}

impl Default for RollPhase {
    fn default() -> Self {
        RollPhase::ModeSelect
    }
}

/// A key press routed into a bonus input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPress {
    Enter,
    Escape,
}

/// What a phase transition asks the caller to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Nothing happened (already terminal, or the event does not apply).
    Unchanged,
    /// The phase moved; no evaluation yet.
    Moved,
    /// The phase reached `result`: evaluate the roll now. Evaluation is the
    /// caller's job because it needs the dice context.
    Evaluate,
}

/// Advance one step, or jump straight to `result` when shift is held.
pub fn advance(phase: &mut RollPhase, shift: bool) -> PhaseOutcome {
    if phase.is_result() {
        return PhaseOutcome::Unchanged;
    }
    if shift {
        *phase = RollPhase::Result;
        return PhaseOutcome::Evaluate;
    }
    *phase = match phase {
        RollPhase::ModeSelect => RollPhase::BonusInput,
        RollPhase::BonusInput => RollPhase::Result,
        RollPhase::Result => RollPhase::Result,
    };
    if phase.is_result() {
        PhaseOutcome::Evaluate
    } else {
        PhaseOutcome::Moved
    }
}

/// Handle a key press while a bonus input has focus.
///
/// Enter commits (the caller validates the bonus, then evaluates); Escape
/// reverts to mode selection without evaluating.
pub fn bonus_key(phase: &mut RollPhase, key: KeyPress) -> PhaseOutcome {
    if phase.is_result() {
        return PhaseOutcome::Unchanged;
    }
    match key {
        KeyPress::Enter => {
            *phase = RollPhase::Result;
            PhaseOutcome::Evaluate
        }
        KeyPress::Escape => {
            *phase = RollPhase::ModeSelect;
            PhaseOutcome::Moved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepwise_advance() {
        let mut phase = RollPhase::ModeSelect;
        assert_eq!(advance(&mut phase, false), PhaseOutcome::Moved);
        assert_eq!(phase, RollPhase::BonusInput);
        assert_eq!(advance(&mut phase, false), PhaseOutcome::Evaluate);
        assert_eq!(phase, RollPhase::Result);
        assert_eq!(advance(&mut phase, false), PhaseOutcome::Unchanged);
    }

    #[test]
    fn test_shift_jumps_to_result() {
        let mut phase = RollPhase::ModeSelect;
        assert_eq!(advance(&mut phase, true), PhaseOutcome::Evaluate);
        assert_eq!(phase, RollPhase::Result);
    }

    #[test]
    fn test_enter_commits() {
        let mut phase = RollPhase::BonusInput;
        assert_eq!(bonus_key(&mut phase, KeyPress::Enter), PhaseOutcome::Evaluate);
        assert_eq!(phase, RollPhase::Result);
    }

    #[test]
    fn test_escape_reverts() {
        let mut phase = RollPhase::BonusInput;
        assert_eq!(bonus_key(&mut phase, KeyPress::Escape), PhaseOutcome::Moved);
        assert_eq!(phase, RollPhase::ModeSelect);
    }

    #[test]
    fn test_result_is_terminal() {
        let mut phase = RollPhase::Result;
        assert_eq!(bonus_key(&mut phase, KeyPress::Enter), PhaseOutcome::Unchanged);
        assert_eq!(advance(&mut phase, true), PhaseOutcome::Unchanged);
    }
}
