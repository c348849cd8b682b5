//! Dice expression model and parser.
//!
//! Formulas are sums of terms: dice terms (`2d6`, `1d20kh`, `4d8r1min2`)
//! and integer constants, each optionally annotated with a damage type
//! (`2d6[fire] + 3`). Supported dice modifiers:
//!
//! - `kh`/`kl` (+optional count): keep the highest/lowest dice
//! - `r1`: reroll a single die showing 1, once
//! - `min<N>`: treat faces below N as N
//!
//! Parsing is the only place the textual formula is interpreted; the rest
//! of the engine works on the typed terms.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{DamageType, DiceError};

/// Keep-highest / keep-lowest modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// One dice term, e.g. `2d20kh1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    /// Number of dice rolled.
    pub count: u32,

    /// Faces per die.
    pub faces: u32,

    /// Keep modifier, `None` keeps all dice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<Keep>,

    /// Reroll at most one die showing 1, once.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reroll_ones: bool,

    /// Minimum face value; lower results are raised to this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<u32>,

    /// Damage type annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
}

impl DiceTerm {
    /// A plain `NdF` term.
    #[must_use]
    pub fn new(count: u32, faces: u32) -> Self {
        Self {
            count,
            faces,
            keep: None,
            reroll_ones: false,
            minimum: None,
            damage_type: None,
        }
    }

    /// Set the damage type (builder pattern).
    #[must_use]
    pub fn with_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = Some(damage_type);
        self
    }

    /// Set the keep modifier (builder pattern).
    #[must_use]
    pub fn with_keep(mut self, keep: Keep) -> Self {
        self.keep = Some(keep);
        self
    }
}

/// One additive term of a formula.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Dice(DiceTerm),
    Constant {
        value: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        damage_type: Option<DamageType>,
    },
}

impl Term {
    /// The damage type annotation carried by this term, if any.
    #[must_use]
    pub fn damage_type(&self) -> Option<DamageType> {
        match self {
            Term::Dice(dice) => dice.damage_type,
            Term::Constant { damage_type, .. } => *damage_type,
        }
    }

    fn set_damage_type(&mut self, new_type: DamageType) {
        match self {
            Term::Dice(dice) => dice.damage_type = Some(new_type),
            Term::Constant { damage_type, .. } => *damage_type = Some(new_type),
        }
    }
}

/// A parsed dice formula: an ordered sum of terms.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: SmallVec<[Term; 4]>,
}

impl DiceExpression {
    /// An expression with no terms (always totals 0).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single unmodified `1d20`.
    #[must_use]
    pub fn d20() -> Self {
        let mut terms = SmallVec::new();
        terms.push(Term::Dice(DiceTerm::new(1, 20)));
        Self { terms }
    }

    /// A single constant term.
    #[must_use]
    pub fn constant(value: i32) -> Self {
        let mut terms = SmallVec::new();
        terms.push(Term::Constant {
            value,
            damage_type: None,
        });
        Self { terms }
    }

    /// Parse a formula string.
    pub fn parse(formula: &str) -> Result<Self, DiceError> {
        Parser::new(formula).parse()
    }

    /// Whether a formula string parses. Used to validate user-entered
    /// bonuses at commit time.
    #[must_use]
    pub fn validate(formula: &str) -> bool {
        let trimmed = formula.trim();
        !trimmed.is_empty() && Self::parse(trimmed).is_ok()
    }

    /// Whether this expression contains any terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Concatenate two expressions (`self + other`).
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        Self { terms }
    }

    /// The expression's dice terms only, constants dropped.
    ///
    /// This is the source for a critical bonus roll: the damage dice are
    /// rolled a second time, flat bonuses are not doubled.
    #[must_use]
    pub fn dice_only(&self) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .filter(|t| matches!(t, Term::Dice(_)))
                .cloned()
                .collect(),
        }
    }

    /// The first explicit damage type annotation, if any.
    #[must_use]
    pub fn first_damage_type(&self) -> Option<DamageType> {
        self.terms.iter().find_map(Term::damage_type)
    }

    /// Fill unannotated terms with the expression's first explicit type.
    ///
    /// Upcast and bonus parts are usually written without annotations and
    /// inherit the type of the damage they extend.
    pub fn inherit_damage_types(&mut self) {
        let Some(first) = self.first_damage_type() else {
            return;
        };
        for term in &mut self.terms {
            if term.damage_type().is_none() {
                term.set_damage_type(first);
            }
        }
    }
}

impl std::fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            match term {
                Term::Dice(dice) => {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}d{}", dice.count, dice.faces)?;
                    match dice.keep {
                        Some(Keep::Highest(n)) => write!(f, "kh{}", n)?,
                        Some(Keep::Lowest(n)) => write!(f, "kl{}", n)?,
                        None => {}
                    }
                    if dice.reroll_ones {
                        write!(f, "r1")?;
                    }
                    if let Some(min) = dice.minimum {
                        write!(f, "min{}", min)?;
                    }
                    if let Some(t) = dice.damage_type {
                        write!(f, "[{}]", t)?;
                    }
                }
                Term::Constant { value, damage_type } => {
                    if i > 0 {
                        if *value < 0 {
                            write!(f, " - {}", -value)?;
                        } else {
                            write!(f, " + {}", value)?;
                        }
                    } else {
                        write!(f, "{}", value)?;
                    }
                    if let Some(t) = damage_type {
                        write!(f, "[{}]", t)?;
                    }
                }
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn parse(mut self) -> Result<DiceExpression, DiceError> {
        let mut terms: SmallVec<[Term; 4]> = SmallVec::new();
        let mut negate = false;
        let mut expect_term = true;

        self.skip_ws();
        if self.eat('-') {
            negate = true;
            self.skip_ws();
        }
        while self.chars.peek().is_some() {
            if expect_term {
                let term = self.parse_term(negate)?;
                terms.push(term);
                negate = false;
                expect_term = false;
            } else {
                match self.next_char() {
                    Some('+') => expect_term = true,
                    Some('-') => {
                        expect_term = true;
                        negate = true;
                    }
                    _ => return Err(self.invalid()),
                }
            }
            self.skip_ws();
        }

        if expect_term || terms.is_empty() {
            return Err(self.invalid());
        }
        Ok(DiceExpression { terms })
    }

    fn parse_term(&mut self, negate: bool) -> Result<Term, DiceError> {
        let number = self.parse_number();

        if self.eat('d') {
            if negate {
                // Subtracted dice are not supported.
                return Err(self.invalid());
            }
            let count = number.unwrap_or(1);
            let faces = self.parse_number().ok_or_else(|| self.invalid())?;
            if count == 0 || faces == 0 {
                return Err(DiceError::EmptyTerm(self.input.trim().to_string()));
            }
            let mut dice = DiceTerm::new(count, faces);
            self.parse_modifiers(&mut dice)?;
            dice.damage_type = self.parse_annotation()?;
            Ok(Term::Dice(dice))
        } else {
            let value = number.ok_or_else(|| self.invalid())? as i32;
            let damage_type = self.parse_annotation()?;
            Ok(Term::Constant {
                value: if negate { -value } else { value },
                damage_type,
            })
        }
    }

    fn parse_modifiers(&mut self, dice: &mut DiceTerm) -> Result<(), DiceError> {
        loop {
            if self.eat_str("kh") {
                dice.keep = Some(Keep::Highest(self.parse_number().unwrap_or(1)));
            } else if self.eat_str("kl") {
                dice.keep = Some(Keep::Lowest(self.parse_number().unwrap_or(1)));
            } else if self.eat_str("min") {
                dice.minimum = Some(self.parse_number().ok_or_else(|| self.invalid())?);
            } else if self.eat_str("r1") {
                dice.reroll_ones = true;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_annotation(&mut self) -> Result<Option<DamageType>, DiceError> {
        self.skip_ws();
        if !self.eat('[') {
            return Ok(None);
        }
        let start = self.pos();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == ']' {
                break;
            }
            self.chars.next();
        }
        let end = self.pos();
        if !self.eat(']') {
            return Err(self.invalid());
        }
        let name = &self.input[start..end];
        DamageType::from_annotation(name)
            .map(Some)
            .ok_or_else(|| DiceError::UnknownAnnotation(name.to_string()))
    }

    fn parse_number(&mut self) -> Option<u32> {
        let start = self.pos();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.chars.next();
            } else {
                break;
            }
        }
        let end = self.pos();
        if start == end {
            None
        } else {
            self.input[start..end].parse().ok()
        }
    }

    fn pos(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.input.len(), |&(i, _)| i)
    }

    fn next_char(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if let Some(&(_, c)) = self.chars.peek() {
            if c == expected {
                self.chars.next();
                return true;
            }
        }
        false
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        let rest = &self.input[self.pos()..];
        if rest.starts_with(expected) {
            for _ in 0..expected.len() {
                self.chars.next();
            }
            return true;
        }
        false
    }

    fn skip_ws(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn invalid(&self) -> DiceError {
        DiceError::InvalidExpression(self.input.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_dice() {
        let expr = DiceExpression::parse("2d6").unwrap();
        assert_eq!(expr.terms.len(), 1);
        assert_eq!(
            expr.terms[0],
            Term::Dice(DiceTerm::new(2, 6))
        );
    }

    #[test]
    fn test_parse_implicit_count() {
        let expr = DiceExpression::parse("d8").unwrap();
        assert_eq!(expr.terms[0], Term::Dice(DiceTerm::new(1, 8)));
    }

    #[test]
    fn test_parse_sum_with_annotation() {
        let expr = DiceExpression::parse("2d6 + 3[fire]").unwrap();
        assert_eq!(expr.terms.len(), 2);
        assert_eq!(
            expr.terms[1],
            Term::Constant {
                value: 3,
                damage_type: Some(DamageType::Fire)
            }
        );
    }

    #[test]
    fn test_parse_modifiers() {
        let expr = DiceExpression::parse("2d20kh1r1min2").unwrap();
        let Term::Dice(dice) = &expr.terms[0] else {
            panic!("expected dice term");
        };
        assert_eq!(dice.keep, Some(Keep::Highest(1)));
        assert!(dice.reroll_ones);
        assert_eq!(dice.minimum, Some(2));
    }

    #[test]
    fn test_parse_negative_constant() {
        let expr = DiceExpression::parse("1d20 - 2").unwrap();
        assert_eq!(
            expr.terms[1],
            Term::Constant {
                value: -2,
                damage_type: None
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DiceExpression::parse("").is_err());
        assert!(DiceExpression::parse("2d").is_err());
        assert!(DiceExpression::parse("fire").is_err());
        assert!(DiceExpression::parse("1d6 +").is_err());
        assert!(DiceExpression::parse("0d6").is_err());
        assert!(DiceExpression::parse("2d6[frostbite]").is_err());
        assert!(DiceExpression::parse("-1d4").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(DiceExpression::validate("1d4 + 1"));
        assert!(!DiceExpression::validate("bogus"));
        assert!(!DiceExpression::validate(""));
    }

    #[test]
    fn test_display_roundtrip() {
        for formula in ["2d6 + 3[fire]", "2d20kh1", "1d8r1min2[cold] - 1"] {
            let expr = DiceExpression::parse(formula).unwrap();
            let rendered = expr.to_string();
            assert_eq!(DiceExpression::parse(&rendered).unwrap(), expr);
        }
    }

    #[test]
    fn test_inherit_damage_types() {
        let mut expr = DiceExpression::parse("2d6[fire] + 1d4 + 3").unwrap();
        expr.inherit_damage_types();
        for term in &expr.terms {
            assert_eq!(term.damage_type(), Some(DamageType::Fire));
        }
    }

    #[test]
    fn test_dice_only() {
        let expr = DiceExpression::parse("2d6[fire] + 3[fire]").unwrap();
        let dice = expr.dice_only();
        assert_eq!(dice.terms.len(), 1);
    }
}
