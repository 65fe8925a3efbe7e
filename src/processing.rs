//! Per-hit scratch state.
//!
//! A [`ProcessingSkill`] is derived from an activated ability at execution
//! time and destroyed when the skill finalizes. It owns the per-target
//! results, the memoized calc states, and the script-adjustable copies of
//! modifiers and costs.

use crate::correct::Affinity;
use crate::cost::SkillCosts;
use crate::definition::{DependencyType, KnockbackType};
use crate::ids::{ActivationId, EntityId, ItemId, ServerTime, SkillId, StatusId};
use crate::tokusei::{CalcStateCache, RecalcTrigger};

// ============================================================================
// Report flags
// ============================================================================

/// Primary outcome flag set reported per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HitFlags1(pub u32);

impl HitFlags1 {
    pub const NONE: Self = Self(0);
    pub const LETHAL: Self = Self(1 << 0);
    pub const CRITICAL: Self = Self(1 << 1);
    pub const LIMIT_BREAK: Self = Self(1 << 2);
    pub const INTENSIVE_BREAK: Self = Self(1 << 3);
    pub const KNOCKBACK: Self = Self(1 << 4);
    pub const WEAKPOINT: Self = Self(1 << 5);
    pub const GUARDED: Self = Self(1 << 6);
    pub const DODGED: Self = Self(1 << 7);
    pub const REFLECT_PHYS: Self = Self(1 << 8);
    pub const BLOCK_PHYS: Self = Self(1 << 9);
    pub const REFLECT_MAGIC: Self = Self(1 << 10);
    pub const BLOCK_MAGIC: Self = Self(1 << 11);
    pub const ABSORB: Self = Self(1 << 12);
    pub const REVIVAL: Self = Self(1 << 13);
    pub const CLENCH: Self = Self(1 << 14);
    pub const BARRIER: Self = Self(1 << 15);
    pub const IMPOSSIBLE: Self = Self(1 << 16);
    pub const RUSH_MOVEMENT: Self = Self(1 << 17);
    pub const PROTECT: Self = Self(1 << 18);
    pub const INSTANT_DEATH: Self = Self(1 << 19);
    /// Reserved on the wire; never set.
    pub const REFLECT_UNUSED: Self = Self(1 << 20);

    pub const fn contains(self, other: HitFlags1) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: HitFlags1) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: HitFlags1) {
        self.0 &= !other.0;
    }
}

/// Secondary flag set reported per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HitFlags2(pub u32);

impl HitFlags2 {
    pub const NONE: Self = Self(0);
    pub const HARD_STRIKE: Self = Self(1 << 0);
    pub const CLENCH_OVERFLOW: Self = Self(1 << 1);
    pub const TALK_SUCCESS: Self = Self(1 << 2);
    pub const TALK_FAIL: Self = Self(1 << 3);

    pub const fn contains(self, other: HitFlags2) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: HitFlags2) {
        self.0 |= other.0;
    }
}

/// Lifecycle causes that cancel status effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct EffectCancelFlags(pub u8);

impl EffectCancelFlags {
    pub const NONE: Self = Self(0);
    pub const HIT: Self = Self(1 << 0);
    pub const DAMAGE: Self = Self(1 << 1);
    pub const KNOCKBACK: Self = Self(1 << 2);
    pub const DEATH: Self = Self(1 << 3);
    pub const SKILL: Self = Self(1 << 4);

    pub const fn contains(self, other: EffectCancelFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: EffectCancelFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn with(self, other: EffectCancelFlags) -> Self {
        Self(self.0 | other.0)
    }
}

// ============================================================================
// Per-target result
// ============================================================================

/// Damage channel interpretation on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DamageType {
    #[default]
    None = 0,
    Generic = 1,
    Healing = 2,
    Miss = 3,
}

/// Which class of avoidance blocked or redirected a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AvoidClass {
    Physical = 1,
    Magical = 2,
}

/// Hit-stop window computed for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitTiming {
    pub start_stop: ServerTime,
    pub end_stop: ServerTime,
    pub end_ailment: ServerTime,
}

/// Knockback displacement applied to a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnockbackOutcome {
    pub kind: KnockbackType,
    pub x: f32,
    pub y: f32,
}

/// Everything resolved for one target of one hit.
#[derive(Debug, Clone, Default)]
pub struct SkillTargetResult {
    pub entity: EntityId,
    pub primary: bool,
    /// Gathered by area, not directly targeted.
    pub indirect: bool,
    pub damage1: i32,
    pub damage1_type: DamageType,
    pub damage2: i32,
    pub damage2_type: DamageType,
    pub flags1: HitFlags1,
    pub flags2: HitFlags2,
    pub ailment_affinity: Option<Affinity>,
    pub ailment_damage: i32,
    pub ailment_duration_ms: u32,
    pub technical_damage: i32,
    pub pursuit_damage: i32,
    pub pursuit_affinity: Option<Affinity>,
    pub added_statuses: Vec<(StatusId, i8)>,
    pub cancelled_statuses: Vec<StatusId>,
    pub hit_avoided: bool,
    pub hit_null: Option<AvoidClass>,
    pub hit_reflect: Option<AvoidClass>,
    pub hit_absorb: bool,
    /// Affinity the avoidance matched on.
    pub avoid_affinity: Option<Affinity>,
    /// Whether the avoidance consumed a shield charge.
    pub shield_consumed: bool,
    pub can_hit_stun: bool,
    /// Defense multiplier from an active guard, 1.0 when unguarded.
    pub guard_modifier: f32,
    pub effect_cancel: EffectCancelFlags,
    pub recalc: Vec<RecalcTrigger>,
    pub knockback: Option<KnockbackOutcome>,
    pub timing: HitTiming,
}

impl SkillTargetResult {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            guard_modifier: 1.0,
            ..Default::default()
        }
    }

    pub fn primary(entity: EntityId) -> Self {
        let mut result = Self::new(entity);
        result.primary = true;
        result
    }

    pub fn indirect(entity: EntityId) -> Self {
        let mut result = Self::new(entity);
        result.indirect = true;
        result
    }

    /// Target was touched by the skill but took and avoided nothing.
    pub fn is_untouched(&self) -> bool {
        self.damage1 == 0
            && self.damage2 == 0
            && !self.hit_avoided
            && self.added_statuses.is_empty()
    }

    pub fn add_recalc(&mut self, trigger: RecalcTrigger) {
        if !self.recalc.contains(&trigger) {
            self.recalc.push(trigger);
        }
    }
}

// ============================================================================
// Processing skill
// ============================================================================

/// Offense snapshot of a countered skill, used by counter damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterReference {
    pub entity: EntityId,
    pub skill: SkillId,
    /// Countered skill's offense computed with reversed roles.
    pub offense: i32,
}

/// A defensive reaction queued while resolving a hit; completed after the
/// parent hit's results are in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefensiveReaction {
    pub defender: EntityId,
    pub skill: SkillId,
    pub activation_id: ActivationId,
}

/// Per-execution scratch state derived from an activated ability.
#[derive(Debug)]
pub struct ProcessingSkill {
    pub skill: SkillId,
    pub activation_id: ActivationId,
    pub source: EntityId,
    /// Differs from `source` once the primary target reflected.
    pub effective_source: EntityId,
    pub primary_target: Option<EntityId>,
    pub effective_affinity: Affinity,
    pub base_affinity: Affinity,
    pub effective_dependency: DependencyType,
    pub expertise_rank: u8,
    /// Damage channels already fixed by a script.
    pub absolute_damage: Option<(i32, i32)>,
    /// Item that triggered the skill, if any.
    pub item: Option<ItemId>,
    pub is_projectile: bool,
    /// Whether the hit participates in avoidance at all.
    pub can_avoid: bool,
    pub nulled: bool,
    pub reflected: bool,
    pub absorbed: bool,
    pub primary_shield_consumed: bool,
    /// Knockback was predicted at hit scheduling time.
    pub hard_strike: bool,
    pub pvp: bool,
    pub rush_start: Option<(f32, f32)>,
    pub rush_time: ServerTime,
    /// Script-adjustable copies of the authored modifiers.
    pub modifier1: u16,
    pub modifier2: u16,
    pub costs: SkillCosts,
    pub fusion_demons: Vec<EntityId>,
    pub targets: Vec<SkillTargetResult>,
    pub calc_cache: CalcStateCache,
    pub countered: Option<CounterReference>,
    /// Defensive reactions carried across the scheduled hit boundary.
    pub pending_defenses: Vec<DefensiveReaction>,
}

impl ProcessingSkill {
    pub fn target_mut(&mut self, entity: EntityId) -> Option<&mut SkillTargetResult> {
        self.targets.iter_mut().find(|t| t.entity == entity)
    }

    pub fn primary_result(&self) -> Option<&SkillTargetResult> {
        self.targets.iter().find(|t| t.primary)
    }
}

// ============================================================================
// Execution context
// ============================================================================

/// Cross-phase bookkeeping for one execute call, including the defensive
/// reactions it spawned.
#[derive(Debug, Default)]
pub struct SkillExecutionContext {
    /// Skips the execution stagger; used by instants and defensive
    /// reactions.
    pub fast_track: bool,
    /// Abort with no state changes.
    pub fizzle: bool,
    pub apply_aggro: bool,
    pub apply_status: bool,
    pub executed: bool,
    pub finalized: bool,
    /// Set when this execution is itself a counter response.
    pub countered_skill: Option<CounterReference>,
    /// Defensive reactions to complete after this hit resolves.
    pub pending_defenses: Vec<DefensiveReaction>,
}

impl SkillExecutionContext {
    pub fn new() -> Self {
        Self {
            apply_aggro: true,
            apply_status: true,
            ..Default::default()
        }
    }

    pub fn fast_tracked() -> Self {
        let mut ctx = Self::new();
        ctx.fast_track = true;
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags1_operations() {
        let mut flags = HitFlags1::NONE;
        flags.insert(HitFlags1::CRITICAL);
        flags.insert(HitFlags1::KNOCKBACK);
        assert!(flags.contains(HitFlags1::CRITICAL));
        assert!(flags.contains(HitFlags1::KNOCKBACK));
        assert!(!flags.contains(HitFlags1::LETHAL));
        flags.remove(HitFlags1::CRITICAL);
        assert!(!flags.contains(HitFlags1::CRITICAL));
    }

    #[test]
    fn test_effect_cancel_intersects() {
        let mask = EffectCancelFlags::DAMAGE.with(EffectCancelFlags::KNOCKBACK);
        assert!(mask.intersects(EffectCancelFlags::DAMAGE));
        assert!(!mask.intersects(EffectCancelFlags::DEATH));
        assert!(mask.contains(EffectCancelFlags::DAMAGE));
        assert!(!mask.contains(EffectCancelFlags::DAMAGE.with(EffectCancelFlags::DEATH)));
    }

    #[test]
    fn test_target_result_untouched() {
        let result = SkillTargetResult::new(EntityId(5));
        assert!(result.is_untouched());

        let mut hit = SkillTargetResult::new(EntityId(5));
        hit.damage1 = 10;
        assert!(!hit.is_untouched());

        let mut avoided = SkillTargetResult::new(EntityId(5));
        avoided.hit_avoided = true;
        assert!(!avoided.is_untouched());
    }

    #[test]
    fn test_recalc_dedup() {
        let mut result = SkillTargetResult::new(EntityId(1));
        result.add_recalc(RecalcTrigger::Damaged);
        result.add_recalc(RecalcTrigger::Damaged);
        result.add_recalc(RecalcTrigger::Death);
        assert_eq!(result.recalc.len(), 2);
    }
}
