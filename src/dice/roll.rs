//! Roll evaluation and re-derivation.
//!
//! An `EvaluatedRoll` keeps every physical die that was rolled. Totals and
//! kept/dropped flags are *derived* from the term modifiers, so a roll can
//! be re-derived after the fact — switching to advantage adds one die and
//! keeps the highest, switching back drops it — without ever re-rolling
//! dice the player has already seen.

use serde::{Deserialize, Serialize};

use crate::core::{DamageType, DiceRng};

use super::expr::{DiceExpression, DiceTerm, Keep, Term};

/// Advantage state of a d20-style roll.
///
/// Ordered `disadvantage < normal < advantage` for mode stepping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollMode {
    Disadvantage,
    Normal,
    Advantage,
}

impl RollMode {
    const ORDER: [RollMode; 3] = [RollMode::Disadvantage, RollMode::Normal, RollMode::Advantage];

    /// Step the mode by `delta`, clamped at the ends.
    #[must_use]
    pub fn stepped(self, delta: i32) -> Self {
        let index = Self::ORDER.iter().position(|m| *m == self).unwrap_or(1) as i32;
        let new_index = (index + delta).clamp(0, Self::ORDER.len() as i32 - 1);
        Self::ORDER[new_index as usize]
    }
}

impl Default for RollMode {
    fn default() -> Self {
        RollMode::Normal
    }
}

/// Critical state of a damage roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageMode {
    Normal,
    Critical,
}

impl DamageMode {
    /// Step the mode by `delta`, clamped at the ends.
    #[must_use]
    pub fn stepped(self, delta: i32) -> Self {
        match (self, delta.signum()) {
            (DamageMode::Normal, 1) => DamageMode::Critical,
            (DamageMode::Critical, -1) => DamageMode::Normal,
            _ => self,
        }
    }
}

impl Default for DamageMode {
    fn default() -> Self {
        DamageMode::Normal
    }
}

/// One physical die result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    /// The face that came up.
    pub result: u32,

    /// Whether this die counts toward the total (derived from keep
    /// modifiers; recomputed on re-derivation).
    pub active: bool,

    /// Whether this die was discarded by a reroll modifier.
    pub rerolled: bool,
}

impl DieResult {
    fn new(result: u32) -> Self {
        Self {
            result,
            active: true,
            rerolled: false,
        }
    }
}

/// One evaluated term: the term definition plus its physical dice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedTerm {
    pub term: Term,
    /// Physical dice, in roll order. Empty for constants.
    #[serde(default)]
    pub dice: Vec<DieResult>,
}

impl EvaluatedTerm {
    /// The value this term contributes to the total.
    #[must_use]
    pub fn subtotal(&self) -> i32 {
        match &self.term {
            Term::Constant { value, .. } => *value,
            Term::Dice(dice_term) => self
                .dice
                .iter()
                .filter(|d| d.active && !d.rerolled)
                .map(|d| effective_face(dice_term, d.result) as i32)
                .sum(),
        }
    }
}

/// A fully evaluated roll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedRoll {
    pub terms: Vec<EvaluatedTerm>,
    /// Cached sum of all term subtotals.
    pub total: i32,
}

impl EvaluatedRoll {
    /// The display formula of the underlying expression.
    #[must_use]
    pub fn formula(&self) -> String {
        self.expression().to_string()
    }

    /// Rebuild the expression from the evaluated terms.
    #[must_use]
    pub fn expression(&self) -> DiceExpression {
        DiceExpression {
            terms: self.terms.iter().map(|t| t.term.clone()).collect(),
        }
    }

    /// Recompute kept flags and the cached total from the term modifiers.
    pub fn rederive(&mut self) {
        for term in &mut self.terms {
            if let Term::Dice(dice_term) = &term.term {
                mark_kept(dice_term, &mut term.dice);
            }
        }
        self.total = self.terms.iter().map(EvaluatedTerm::subtotal).sum();
    }

    /// Totals grouped by damage type, in first-seen term order.
    ///
    /// Unannotated terms inherit the expression's first explicit type,
    /// mirroring how upcast/bonus parts extend a typed damage formula.
    #[must_use]
    pub fn damage_results(&self) -> Vec<(Option<DamageType>, i32)> {
        let first_type = self.terms.iter().find_map(|t| t.term.damage_type());
        let mut results: Vec<(Option<DamageType>, i32)> = Vec::new();
        for term in &self.terms {
            let damage_type = term.term.damage_type().or(first_type);
            let subtotal = term.subtotal();
            match results.iter_mut().find(|(t, _)| *t == damage_type) {
                Some((_, sum)) => *sum += subtotal,
                None => results.push((damage_type, subtotal)),
            }
        }
        results
    }

    /// Append another evaluated roll's terms (used to merge a critical
    /// bonus into an already-rolled normal roll).
    #[must_use]
    pub fn merged(&self, bonus: &EvaluatedRoll) -> EvaluatedRoll {
        let mut merged = self.clone();
        merged.terms.extend(bonus.terms.iter().cloned());
        merged.rederive();
        merged
    }
}

impl DiceExpression {
    /// Roll every term of this expression.
    #[must_use]
    pub fn evaluate(&self, rng: &mut DiceRng) -> EvaluatedRoll {
        let terms = self
            .terms
            .iter()
            .map(|term| match term {
                Term::Constant { .. } => EvaluatedTerm {
                    term: term.clone(),
                    dice: Vec::new(),
                },
                Term::Dice(dice_term) => {
                    let mut dice: Vec<DieResult> = (0..dice_term.count)
                        .map(|_| DieResult::new(rng.roll_die(dice_term.faces)))
                        .collect();
                    apply_reroll(dice_term, &mut dice, rng);
                    mark_kept(dice_term, &mut dice);
                    EvaluatedTerm {
                        term: term.clone(),
                        dice,
                    }
                }
            })
            .collect();

        let mut roll = EvaluatedRoll { terms, total: 0 };
        roll.rederive();
        roll
    }
}

/// Change the advantage state of an already-evaluated d20 roll.
///
/// The first d20 term is resized to the die count the new mode needs:
/// missing dice are rolled, surplus dice are dropped from the end, and the
/// keep modifier is rewritten. Dice that stay were rolled before and keep
/// their face.
pub fn set_roll_mode(roll: &mut EvaluatedRoll, mode: RollMode, rng: &mut DiceRng) {
    let Some(evaluated) = roll
        .terms
        .iter_mut()
        .find(|t| matches!(&t.term, Term::Dice(d) if d.faces == 20))
    else {
        return;
    };
    let EvaluatedTerm { term, dice } = evaluated;
    let Term::Dice(dice_term) = term else {
        return;
    };

    let (count, keep) = match mode {
        RollMode::Normal => (1, None),
        RollMode::Advantage => (2, Some(Keep::Highest(1))),
        RollMode::Disadvantage => (2, Some(Keep::Lowest(1))),
    };

    let rolled = dice.iter().filter(|d| !d.rerolled).count() as u32;
    if rolled < count {
        for _ in rolled..count {
            dice.push(DieResult::new(rng.roll_die(dice_term.faces)));
        }
    } else if rolled > count {
        let mut to_drop = rolled - count;
        while to_drop > 0 {
            let Some(last) = dice.iter().rposition(|d| !d.rerolled) else {
                break;
            };
            dice.remove(last);
            to_drop -= 1;
        }
    }

    dice_term.count = count;
    dice_term.keep = keep;
    roll.rederive();
}

/// Build the critical bonus expression for a damage formula: the damage
/// dice rolled one more time, flat bonuses excluded.
#[must_use]
pub fn critical_bonus(expression: &DiceExpression) -> DiceExpression {
    expression.dice_only()
}

fn effective_face(term: &DiceTerm, face: u32) -> u32 {
    match term.minimum {
        Some(min) => face.max(min),
        None => face,
    }
}

/// Reroll at most one die showing 1, once. The discarded die is kept in
/// the result list, flagged `rerolled`, so the history stays visible.
fn apply_reroll(term: &DiceTerm, dice: &mut Vec<DieResult>, rng: &mut DiceRng) {
    if !term.reroll_ones {
        return;
    }
    if let Some(index) = dice.iter().position(|d| d.result == 1 && !d.rerolled) {
        dice[index].rerolled = true;
        dice[index].active = false;
        let replacement = DieResult::new(rng.roll_die(term.faces));
        dice.insert(index + 1, replacement);
    }
}

fn mark_kept(term: &DiceTerm, dice: &mut [DieResult]) {
    // Candidates: everything that wasn't discarded by a reroll.
    let mut candidates: Vec<usize> = dice
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.rerolled)
        .map(|(i, _)| i)
        .collect();

    for die in dice.iter_mut() {
        die.active = false;
    }

    match term.keep {
        None => {
            for &i in &candidates {
                dice[i].active = true;
            }
        }
        Some(Keep::Highest(n)) => {
            candidates.sort_by_key(|&i| std::cmp::Reverse(effective_face(term, dice[i].result)));
            for &i in candidates.iter().take(n as usize) {
                dice[i].active = true;
            }
        }
        Some(Keep::Lowest(n)) => {
            candidates.sort_by_key(|&i| effective_face(term, dice[i].result));
            for &i in candidates.iter().take(n as usize) {
                dice[i].active = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiceRng;

    #[test]
    fn test_roll_mode_stepping() {
        assert_eq!(RollMode::Normal.stepped(1), RollMode::Advantage);
        assert_eq!(RollMode::Normal.stepped(-1), RollMode::Disadvantage);
        assert_eq!(RollMode::Advantage.stepped(1), RollMode::Advantage);
        assert_eq!(RollMode::Disadvantage.stepped(2), RollMode::Advantage);
    }

    #[test]
    fn test_evaluate_totals_constants_and_dice() {
        let mut rng = DiceRng::new(1);
        let expr = DiceExpression::parse("2d6 + 3").unwrap();
        let roll = expr.evaluate(&mut rng);

        let dice_sum: i32 = roll.terms[0]
            .dice
            .iter()
            .map(|d| d.result as i32)
            .sum();
        assert_eq!(roll.total, dice_sum + 3);
        assert!((2..=12).contains(&dice_sum));
    }

    #[test]
    fn test_advantage_keeps_highest() {
        let mut rng = DiceRng::new(3);
        let expr = DiceExpression::parse("2d20kh1").unwrap();
        let roll = expr.evaluate(&mut rng);

        let max = roll.terms[0].dice.iter().map(|d| d.result).max().unwrap();
        assert_eq!(roll.total, max as i32);
        assert_eq!(roll.terms[0].dice.iter().filter(|d| d.active).count(), 1);
    }

    #[test]
    fn test_set_roll_mode_preserves_existing_die() {
        let mut rng = DiceRng::new(5);
        let expr = DiceExpression::parse("1d20 + 4").unwrap();
        let mut roll = expr.evaluate(&mut rng);
        let first_face = roll.terms[0].dice[0].result;

        set_roll_mode(&mut roll, RollMode::Advantage, &mut rng);
        assert_eq!(roll.terms[0].dice.len(), 2);
        assert_eq!(roll.terms[0].dice[0].result, first_face);

        set_roll_mode(&mut roll, RollMode::Normal, &mut rng);
        assert_eq!(roll.terms[0].dice.len(), 1);
        assert_eq!(roll.terms[0].dice[0].result, first_face);
        assert_eq!(roll.total, first_face as i32 + 4);
    }

    #[test]
    fn test_minimum_face() {
        let mut rng = DiceRng::new(2);
        let expr = DiceExpression::parse("4d6min6").unwrap();
        let roll = expr.evaluate(&mut rng);
        assert_eq!(roll.total, 24);
    }

    #[test]
    fn test_reroll_ones_discards_at_most_one() {
        // Seed chosen freely; property must hold for any outcome.
        for seed in 0..50 {
            let mut rng = DiceRng::new(seed);
            let expr = DiceExpression::parse("4d4r1").unwrap();
            let roll = expr.evaluate(&mut rng);
            let discarded = roll.terms[0].dice.iter().filter(|d| d.rerolled).count();
            assert!(discarded <= 1);
            let active = roll.terms[0].dice.iter().filter(|d| d.active).count();
            assert_eq!(active, 4);
        }
    }

    #[test]
    fn test_critical_merge_keeps_normal_dice() {
        let mut rng = DiceRng::new(11);
        let expr = DiceExpression::parse("2d6[fire] + 3").unwrap();
        let normal = expr.evaluate(&mut rng);

        let bonus = critical_bonus(&expr).evaluate(&mut rng);
        let critical = normal.merged(&bonus);

        assert_eq!(critical.terms.len(), 3);
        assert_eq!(critical.terms[0].dice, normal.terms[0].dice);
        assert_eq!(critical.total, normal.total + bonus.total);
    }

    #[test]
    fn test_damage_results_inherit_first_type() {
        let mut rng = DiceRng::new(13);
        let expr = DiceExpression::parse("2d6[fire] + 3").unwrap();
        let roll = expr.evaluate(&mut rng);

        let results = roll.damage_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, Some(DamageType::Fire));
        assert_eq!(results[0].1, roll.total);
    }

    #[test]
    fn test_damage_results_split_types() {
        let mut rng = DiceRng::new(17);
        let expr = DiceExpression::parse("1d4[fire] + 1d4[cold]").unwrap();
        let roll = expr.evaluate(&mut rng);

        let results = roll.damage_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, Some(DamageType::Fire));
        assert_eq!(results[1].0, Some(DamageType::Cold));
        assert_eq!(results[0].1 + results[1].1, roll.total);
    }
}
