//! Calculated stat vector ("correct table") and damage affinities.
//!
//! Every entity carries a correct table: its effective stats after base
//! values, equipment, status effects, and passive (tokusei) contributions
//! have been folded in by the stat pipeline. The engine only reads the
//! folded values; recalculation happens outside and is requested through
//! side effects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Elemental / physical affinity of a skill or a resistance slot.
///
/// The discriminant doubles as the authored affinity index; ailment
/// combination keeps the lower index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Affinity {
    Weapon = 1,
    Slash = 2,
    Thrust = 3,
    Strike = 4,
    Gun = 5,
    Fire = 6,
    Ice = 7,
    Elec = 8,
    Force = 9,
    Expel = 10,
    Curse = 11,
    Heal = 12,
    Support = 13,
    Mystic = 14,
    Almighty = 15,
    /// Class-level slot covering all physical affinities.
    Physical = 16,
    /// Class-level slot covering all magical affinities.
    Magic = 17,
}

impl Affinity {
    /// Authored affinity index.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Class-level affinities only appear in resistance slots, never on
    /// skill definitions.
    pub fn is_class(self) -> bool {
        matches!(self, Affinity::Physical | Affinity::Magic)
    }

    /// Almighty damage skips class-level avoidance entirely.
    pub fn is_almighty(self) -> bool {
        self == Affinity::Almighty
    }
}

/// Damage class used for dealt/taken rate adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillClass {
    CloseRange,
    LongRange,
    Spell,
    Support,
    Heal,
}

/// Slot in the correct table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectValue {
    Str,
    Magic,
    Vit,
    Intel,
    Speed,
    Luck,
    MaxHp,
    MaxMp,
    /// Close-range offense.
    CloseRange,
    /// Long-range offense.
    LongRange,
    /// Spell offense.
    Spell,
    /// Support offense.
    Support,
    PhysDefense,
    MagicDefense,
    Critical,
    CritDefense,
    /// Charge time multiplier, percent (100 = unmodified).
    ChantTime,
    /// Cooldown time multiplier, percent (100 = unmodified).
    CooldownTime,
    /// Limit break damage scale, percent (100 = 1.5x crit scale).
    LimitBreakDamage,
    /// Limit break chance on a successful critical, percent.
    LimitBreakChance,
    /// Percent resistance per affinity; negative values are weaknesses.
    Resist(Affinity),
    /// Percent damage boost per affinity.
    Boost(Affinity),
    /// Natural null chance per affinity, percent.
    NullChance(Affinity),
    /// Natural reflect chance per affinity, percent.
    ReflectChance(Affinity),
    /// Natural absorb chance per affinity, percent.
    AbsorbChance(Affinity),
    /// Dealt-rate multiplier per skill class, percent (100 = unmodified).
    RateDealt(SkillClass),
    /// Taken-rate multiplier per skill class, percent (100 = unmodified).
    RateTaken(SkillClass),
    /// Status infliction resistance, percent (100 = unmodified).
    ResistStatus,
    KnockbackResist,
}

impl CorrectValue {
    /// Neutral value for an absent slot.
    ///
    /// Multiplier-style slots sit at 100 percent; additive slots at zero.
    pub fn neutral(self) -> i32 {
        match self {
            CorrectValue::ChantTime
            | CorrectValue::CooldownTime
            | CorrectValue::LimitBreakDamage
            | CorrectValue::RateDealt(_)
            | CorrectValue::RateTaken(_)
            | CorrectValue::ResistStatus => 100,
            _ => 0,
        }
    }
}

/// An entity's folded stat vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectTable {
    values: HashMap<CorrectValue, i32>,
}

impl CorrectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a slot, falling back to its neutral value.
    pub fn value(&self, slot: CorrectValue) -> i32 {
        self.values
            .get(&slot)
            .copied()
            .unwrap_or_else(|| slot.neutral())
    }

    /// Read a percent slot as a multiplier (100 -> 1.0).
    pub fn rate(&self, slot: CorrectValue) -> f32 {
        self.value(slot) as f32 / 100.0
    }

    pub fn set(&mut self, slot: CorrectValue, value: i32) -> &mut Self {
        self.values.insert(slot, value);
        self
    }

    /// Add onto a slot, starting from its neutral value if absent.
    pub fn adjust(&mut self, slot: CorrectValue, delta: i32) -> &mut Self {
        let base = self.value(slot);
        self.values.insert(slot, base + delta);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
