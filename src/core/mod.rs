//! Core types: stable references, damage taxonomy, errors, dice RNG.

mod damage_type;
mod error;
mod rng;
mod uuid;

pub use damage_type::DamageType;
pub use error::{DiceError, ErrorKind, InteractionError, StoreError};
pub use rng::{DiceRng, DiceRngState};
pub use uuid::{ClientId, Uuid};
