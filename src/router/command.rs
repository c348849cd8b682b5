//! The typed command set and its wire form.
//!
//! Interactions travel as opaque strings (`item-0-attack`,
//! `apply-damage-*`); [`Command::parse`] turns a wire string into one of a
//! closed set of typed variants exactly once, and [`Command::to_wire`]
//! renders it back. Nothing outside this module looks at the text.

use crate::core::Uuid;
use crate::resolution::TargetSelector;

/// Index selector allowing the `*` wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    All,
}

impl Selector {
    fn parse(segment: &str) -> Option<Self> {
        if segment == "*" {
            return Some(Selector::All);
        }
        segment.parse().ok().map(Selector::Index)
    }

    /// As an optional index (`None` = all).
    #[must_use]
    pub fn index(self) -> Option<usize> {
        match self {
            Selector::Index(index) => Some(index),
            Selector::All => None,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Index(index) => write!(f, "{}", index),
            Selector::All => f.write_str("*"),
        }
    }
}

/// Direction of a mode toggle button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeShift {
    Minus,
    Plus,
}

impl ModeShift {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "minus" => Some(ModeShift::Minus),
            "plus" => Some(ModeShift::Plus),
            _ => None,
        }
    }

    /// The base step this shift applies.
    #[must_use]
    pub fn delta(self) -> i32 {
        match self {
            ModeShift::Minus => -1,
            ModeShift::Plus => 1,
        }
    }

    fn wire(self) -> &'static str {
        match self {
            ModeShift::Minus => "minus",
            ModeShift::Plus => "plus",
        }
    }
}

/// Every interaction the router understands.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ItemAttack { item: usize },
    ItemAttackBonus { item: usize },
    ItemAttackMode { item: usize, shift: ModeShift },
    ItemDamage { item: usize, damage: usize },
    ItemDamageBonus { item: usize, damage: usize },
    ItemDamageMode { item: usize, damage: usize, shift: ModeShift },
    ItemCheck { item: usize, target: Uuid },
    ItemCheckBonus { item: usize, target: Uuid },
    ItemCheckMode { item: usize, target: Uuid, shift: ModeShift },
    ItemTemplate { item: usize },
    ItemLevel { item: usize },
    ApplyConsumeResource { item: Selector, resource: Selector },
    UndoConsumeResource { item: Selector, resource: Selector },
    ApplyDamage { target: TargetSelector },
    UndoDamage { target: TargetSelector },
}

impl Command {
    /// Parse a wire action string. Unknown strings yield `None`.
    #[must_use]
    pub fn parse(wire: &str) -> Option<Command> {
        let segments: Vec<&str> = wire.split('-').collect();
        match segments.as_slice() {
            ["item", item, rest @ ..] => {
                let item = item.parse().ok()?;
                Self::parse_item(item, rest)
            }
            ["apply", "consume", "resource", item, resource] => {
                Some(Command::ApplyConsumeResource {
                    item: Selector::parse(item)?,
                    resource: Selector::parse(resource)?,
                })
            }
            ["undo", "consume", "resource", item, resource] => {
                Some(Command::UndoConsumeResource {
                    item: Selector::parse(item)?,
                    resource: Selector::parse(resource)?,
                })
            }
            ["apply", "damage", target] => Some(Command::ApplyDamage {
                target: parse_target(target)?,
            }),
            ["undo", "damage", target] => Some(Command::UndoDamage {
                target: parse_target(target)?,
            }),
            _ => None,
        }
    }

    fn parse_item(item: usize, rest: &[&str]) -> Option<Command> {
        match rest {
            ["attack"] => Some(Command::ItemAttack { item }),
            ["attack", "bonus"] => Some(Command::ItemAttackBonus { item }),
            ["attack", "mode", shift] => Some(Command::ItemAttackMode {
                item,
                shift: ModeShift::parse(shift)?,
            }),
            ["damage", damage] => Some(Command::ItemDamage {
                item,
                damage: damage.parse().ok()?,
            }),
            ["damage", damage, "bonus"] => Some(Command::ItemDamageBonus {
                item,
                damage: damage.parse().ok()?,
            }),
            ["damage", damage, "mode", shift] => Some(Command::ItemDamageMode {
                item,
                damage: damage.parse().ok()?,
                shift: ModeShift::parse(shift)?,
            }),
            ["check", target] => Some(Command::ItemCheck {
                item,
                target: parse_uuid(target)?,
            }),
            ["check", target, "bonus"] => Some(Command::ItemCheckBonus {
                item,
                target: parse_uuid(target)?,
            }),
            ["check", target, "mode", shift] => Some(Command::ItemCheckMode {
                item,
                target: parse_uuid(target)?,
                shift: ModeShift::parse(shift)?,
            }),
            ["template"] => Some(Command::ItemTemplate { item }),
            ["level"] => Some(Command::ItemLevel { item }),
            _ => None,
        }
    }

    /// Render the command back to its wire string.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Command::ItemAttack { item } => format!("item-{}-attack", item),
            Command::ItemAttackBonus { item } => format!("item-{}-attack-bonus", item),
            Command::ItemAttackMode { item, shift } => {
                format!("item-{}-attack-mode-{}", item, shift.wire())
            }
            Command::ItemDamage { item, damage } => format!("item-{}-damage-{}", item, damage),
            Command::ItemDamageBonus { item, damage } => {
                format!("item-{}-damage-{}-bonus", item, damage)
            }
            Command::ItemDamageMode {
                item,
                damage,
                shift,
            } => format!("item-{}-damage-{}-mode-{}", item, damage, shift.wire()),
            Command::ItemCheck { item, target } => format!("item-{}-check-{}", item, target),
            Command::ItemCheckBonus { item, target } => {
                format!("item-{}-check-{}-bonus", item, target)
            }
            Command::ItemCheckMode {
                item,
                target,
                shift,
            } => format!("item-{}-check-{}-mode-{}", item, target, shift.wire()),
            Command::ItemTemplate { item } => format!("item-{}-template", item),
            Command::ItemLevel { item } => format!("item-{}-level", item),
            Command::ApplyConsumeResource { item, resource } => {
                format!("apply-consume-resource-{}-{}", item, resource)
            }
            Command::UndoConsumeResource { item, resource } => {
                format!("undo-consume-resource-{}-{}", item, resource)
            }
            Command::ApplyDamage { target } => {
                format!("apply-damage-{}", target_wire(target))
            }
            Command::UndoDamage { target } => {
                format!("undo-damage-{}", target_wire(target))
            }
        }
    }
}

/// Target references on the wire use `[a-zA-Z0-9.]` only; a dash would be
/// ambiguous with the segment separator.
fn parse_uuid(segment: &str) -> Option<Uuid> {
    if segment.is_empty()
        || !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
    {
        return None;
    }
    Some(Uuid::new(segment))
}

fn parse_target(segment: &str) -> Option<TargetSelector> {
    if segment == "*" {
        return Some(TargetSelector::All);
    }
    parse_uuid(segment).map(TargetSelector::One)
}

fn target_wire(target: &TargetSelector) -> String {
    match target {
        TargetSelector::All => "*".to_string(),
        TargetSelector::One(uuid) => uuid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_commands() {
        assert_eq!(
            Command::parse("item-0-attack"),
            Some(Command::ItemAttack { item: 0 })
        );
        assert_eq!(
            Command::parse("item-2-damage-1-mode-plus"),
            Some(Command::ItemDamageMode {
                item: 2,
                damage: 1,
                shift: ModeShift::Plus
            })
        );
        assert_eq!(
            Command::parse("item-0-check-Token.abc"),
            Some(Command::ItemCheck {
                item: 0,
                target: Uuid::new("Token.abc")
            })
        );
    }

    #[test]
    fn test_parse_wildcards() {
        assert_eq!(
            Command::parse("apply-consume-resource-*-1"),
            Some(Command::ApplyConsumeResource {
                item: Selector::All,
                resource: Selector::Index(1)
            })
        );
        assert_eq!(
            Command::parse("undo-damage-*"),
            Some(Command::UndoDamage {
                target: TargetSelector::All
            })
        );
        assert_eq!(
            Command::parse("apply-damage-Token.a1"),
            Some(Command::ApplyDamage {
                target: TargetSelector::One(Uuid::new("Token.a1"))
            })
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("item-x-attack"), None);
        assert_eq!(Command::parse("item-0-dance"), None);
        assert_eq!(Command::parse("apply-damage-"), None);
        assert_eq!(Command::parse("item-0-attack-mode-sideways"), None);
    }

    #[test]
    fn test_wire_roundtrip() {
        let commands = [
            Command::ItemAttack { item: 0 },
            Command::ItemAttackMode {
                item: 1,
                shift: ModeShift::Minus,
            },
            Command::ItemDamageBonus { item: 0, damage: 2 },
            Command::ItemCheckMode {
                item: 0,
                target: Uuid::new("Token.xy"),
                shift: ModeShift::Plus,
            },
            Command::ItemTemplate { item: 3 },
            Command::ItemLevel { item: 1 },
            Command::ApplyConsumeResource {
                item: Selector::All,
                resource: Selector::All,
            },
            Command::ApplyDamage {
                target: TargetSelector::All,
            },
        ];
        for command in commands {
            assert_eq!(Command::parse(&command.to_wire()), Some(command));
        }
    }
}
