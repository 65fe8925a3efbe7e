//! Passive effect (tokusei) aspect tables and calculated-state views.
//!
//! The passive pipeline itself lives outside the engine; what combat needs
//! is the folded result: per-entity aspect sums, maps, and value lists, plus
//! skill-contextual stat adjustments that only apply while a specific kind
//! of skill is being processed. Recalculation is requested through side
//! effects, never performed inline.

use std::collections::HashMap;

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::ids::EntityId;

/// Aspect kinds the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectType {
    /// Value list: skill ids the entity cannot activate.
    SkillLock,
    /// Value list: percent HP cost contributions, each applied
    /// multiplicatively as `(1 + x/100)`.
    HpCostAdjust,
    /// Value list: percent MP cost contributions.
    MpCostAdjust,
    /// Sum: additional uses per activation.
    SkillStackAdjust,
    /// Sum: percent shaved off charge time.
    ChargeReduce,
    /// Map: affinity index → boost cap percent (absent = 100).
    BoostCap,
    /// Map: status id → add rate on any hit.
    StatusAdd,
    /// Map: status id → add rate on knockback hits.
    KnockbackStatusAdd,
    /// Map: status id → inflict rate delta.
    StatusInflictAdjust,
    /// Map: status category → inflict rate delta.
    StatusCategoryInflictAdjust,
    /// Value list: status ids the entity is immune to.
    StatusImmunity,
    /// Value list: status categories the entity is immune to.
    StatusCategoryImmunity,
    /// Sum: percent chance the source strips knockback from its own hits.
    KnockbackRemove,
    /// Sum: percent chance the target nulls knockback.
    KnockbackNull,
    /// Sum: percent chance the target ignores hit-stun.
    HitstunNull,
    /// Sum: percent on all dealt damage.
    DamageDealt,
    /// Sum: percent on all taken damage.
    DamageTaken,
    /// Sum: percent on adjustable-power effects.
    EffectPower,
    /// Sum: crit level at or above which taken damage floors to 1.
    MinimumDamage,
    /// Sum: flat basis-point bonus on the final crit rate.
    CritBonusFinal,
    /// Sum: knowledge-derived addition to the crit stat.
    CritKnowledgeBoost,
    /// Sum: extension of the intensive limit-break damage cap.
    LimitBreakMax,
    /// Sum: percent chance of a pursuit follow-up.
    PursuitRate,
    /// Sum: percent power of the pursuit follow-up.
    PursuitPower,
    /// Value list: override affinity for pursuit damage (first entry wins).
    PursuitAffinity,
    /// Sum: percent chance of technical bonus damage.
    TechRate,
    /// Sum: percent power of technical bonus damage.
    TechPower,
    /// Sum: percent off summon magnetite costs.
    MagnetiteReduce,
    /// Sum: percent chance to survive a lethal blow at 1 HP.
    ClenchRate,
    /// Sum: non-zero marks null avoidance as a barrier on reports.
    Barrier,
}

/// Folded aspect values for one entity.
#[derive(Debug, Clone, Default)]
pub struct AspectTable {
    sums: HashMap<AspectType, i32>,
    maps: HashMap<AspectType, HashMap<i32, i32>>,
    lists: HashMap<AspectType, Vec<i32>>,
}

impl AspectTable {
    pub fn sum(&self, aspect: AspectType) -> i32 {
        self.sums.get(&aspect).copied().unwrap_or(0)
    }

    pub fn map(&self, aspect: AspectType) -> Option<&HashMap<i32, i32>> {
        self.maps.get(&aspect)
    }

    pub fn list(&self, aspect: AspectType) -> &[i32] {
        self.lists.get(&aspect).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_sum(&mut self, aspect: AspectType, value: i32) {
        *self.sums.entry(aspect).or_insert(0) += value;
    }

    pub fn add_map_value(&mut self, aspect: AspectType, key: i32, value: i32) {
        *self
            .maps
            .entry(aspect)
            .or_default()
            .entry(key)
            .or_insert(0) += value;
    }

    pub fn add_list_value(&mut self, aspect: AspectType, value: i32) {
        self.lists.entry(aspect).or_default().push(value);
    }
}

/// Stat adjustment that only exists in the context of a matching skill.
#[derive(Debug, Clone)]
pub struct SkillContextAdjust {
    pub entity: EntityId,
    /// Restrict to skills of this affinity; `None` matches every skill.
    pub affinity: Option<Affinity>,
    pub slot: CorrectValue,
    pub delta: i32,
}

/// World-recalculation causes a hit can trigger on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecalcTrigger {
    SkillHit,
    Damaged,
    Knockback,
    StatusChanged,
    Death,
    Revival,
}

/// Folded passive state for every entity in a zone.
#[derive(Debug, Default)]
pub struct TokuseiManager {
    tables: HashMap<EntityId, AspectTable>,
    skill_adjusts: Vec<SkillContextAdjust>,
    /// When set, dead entities contribute no aspects.
    dead_disabled: bool,
}

impl TokuseiManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_mut(&mut self, entity: EntityId) -> &mut AspectTable {
        self.tables.entry(entity).or_default()
    }

    pub fn add_skill_adjust(&mut self, adjust: SkillContextAdjust) {
        self.skill_adjusts.push(adjust);
    }

    pub fn set_dead_disabled(&mut self, disabled: bool) {
        self.dead_disabled = disabled;
    }

    pub fn dead_disabled(&self) -> bool {
        self.dead_disabled
    }

    pub fn aspect_sum(&self, entity: EntityId, aspect: AspectType) -> i32 {
        self.tables.get(&entity).map_or(0, |t| t.sum(aspect))
    }

    pub fn aspect_map_value(&self, entity: EntityId, aspect: AspectType, key: i32) -> i32 {
        self.tables
            .get(&entity)
            .and_then(|t| t.map(aspect))
            .and_then(|m| m.get(&key))
            .copied()
            .unwrap_or(0)
    }

    pub fn aspect_map(&self, entity: EntityId, aspect: AspectType) -> Option<&HashMap<i32, i32>> {
        self.tables.get(&entity).and_then(|t| t.map(aspect))
    }

    pub fn aspect_value_exists(&self, entity: EntityId, aspect: AspectType, value: i32) -> bool {
        self.tables
            .get(&entity)
            .is_some_and(|t| t.list(aspect).contains(&value))
    }

    pub fn aspect_list_first(&self, entity: EntityId, aspect: AspectType) -> Option<i32> {
        self.tables
            .get(&entity)
            .and_then(|t| t.list(aspect).first().copied())
    }

    pub fn aspect_list(&self, entity: EntityId, aspect: AspectType) -> &[i32] {
        self.tables
            .get(&entity)
            .map(|t| t.list(aspect))
            .unwrap_or(&[])
    }

    /// Boost cap for an affinity, defaulting to 100 percent.
    pub fn boost_cap(&self, entity: EntityId, affinity: Affinity) -> i32 {
        let cap = self.aspect_map_value(entity, AspectType::BoostCap, affinity.index() as i32);
        if cap == 0 { 100 } else { cap }
    }

    /// Build the skill-contextual stat view for an entity.
    pub fn calc_state(
        &self,
        entity: EntityId,
        base: &CorrectTable,
        skill_affinity: Affinity,
    ) -> CorrectTable {
        let mut table = base.clone();
        for adjust in &self.skill_adjusts {
            if adjust.entity != entity {
                continue;
            }
            if let Some(required) = adjust.affinity
                && required != skill_affinity
            {
                continue;
            }
            table.adjust(adjust.slot, adjust.delta);
        }
        table
    }
}

// ============================================================================
// Per-skill calc-state cache
// ============================================================================

/// Which side of the hit a calculated view belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcSide {
    /// Source stats as seen when attacking the keyed entity.
    Offense,
    /// The keyed entity's own defensive view.
    Defense,
}

/// Memoized calculated views for one skill use.
///
/// Calc states are stable for the duration of a hit; caching keeps repeated
/// per-target damage math from re-folding contextual passives.
#[derive(Debug, Default)]
pub struct CalcStateCache {
    states: HashMap<(EntityId, CalcSide), CorrectTable>,
}

impl CalcStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &mut self,
        entity: EntityId,
        side: CalcSide,
        build: impl FnOnce() -> CorrectTable,
    ) -> &CorrectTable {
        self.states.entry((entity, side)).or_insert_with(build)
    }

    pub fn get(&self, entity: EntityId, side: CalcSide) -> Option<&CorrectTable> {
        self.states.get(&(entity, side))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
