//! Dice expressions and roll evaluation.
//!
//! - `expr`: the typed formula model and its parser
//! - `roll`: evaluation, advantage/critical re-derivation, per-type totals

mod expr;
mod roll;

pub use expr::{DiceExpression, DiceTerm, Keep, Term};
pub use roll::{
    critical_bonus, set_roll_mode, DamageMode, DieResult, EvaluatedRoll, EvaluatedTerm, RollMode,
};
