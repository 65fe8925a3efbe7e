//! Identifier newtypes shared across the engine.
//!
//! Entity and skill identifiers originate outside the engine (packet
//! handlers, authored data); they are wrapped here so the compiler keeps
//! the many integer domains apart.

use serde::{Deserialize, Serialize};

/// Live entity handle within a zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EntityId(pub i32);

/// Authored skill definition identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SkillId(pub u32);

/// Authored status effect identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusId(pub u32);

/// Authored item definition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

/// Key for scripted or built-in per-skill behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u16);

/// Cooldown bucket shared by skills that cool down together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CooldownGroup(pub u32);

/// Per-use activation handle.
///
/// Instant activations never round-trip through the client and carry the
/// reserved value −1. Charged activations rotate through small non-negative
/// values allocated by the source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationId(pub i32);

impl ActivationId {
    /// Reserved handle for instant activations.
    pub const INSTANT: Self = Self(-1);

    pub fn is_instant(self) -> bool {
        self == Self::INSTANT
    }
}

/// Absolute server time in microseconds.
///
/// All lifecycle deadlines (charge completion, hit delivery, status windows,
/// cooldowns) are absolute times on this clock. Zero means "unset".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ServerTime(pub u64);

impl ServerTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1000)
    }

    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    pub fn add_micros(self, us: u64) -> Self {
        Self(self.0.saturating_add(us))
    }

    /// Advance by a millisecond duration expressed in authored data.
    pub fn add_millis(self, ms: u64) -> Self {
        self.add_micros(ms * 1000)
    }

    pub fn micros_until(self, later: ServerTime) -> u64 {
        later.0.saturating_sub(self.0)
    }
}
