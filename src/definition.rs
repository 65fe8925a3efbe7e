//! Authored definition data for skills, status effects, and items.
//!
//! Definitions are immutable after load and freely shared. The engine never
//! mutates them; per-use state lives on [`crate::entity::ActivatedAbility`]
//! and [`crate::processing::ProcessingSkill`].

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::correct::{Affinity, CorrectValue, SkillClass};
use crate::ids::{CooldownGroup, FunctionId, ItemId, SkillId, StatusId};

/// Combat action family of a skill.
///
/// Drives defensive interaction: melee actions can be countered and guarded,
/// shots can be dodged, and the defensive actions themselves mark the entity
/// as a charged defender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionType {
    Attack = 0,
    Rush = 1,
    Shot = 2,
    Guard = 3,
    Dodge = 4,
    Counter = 5,
    Spin = 6,
    Rapid = 7,
    Taunt = 8,
    Intimidate = 9,
    Talk = 10,
    Support = 11,
}

impl ActionType {
    /// Melee-style actions a charged counter responds to.
    pub fn is_counterable(self) -> bool {
        matches!(self, ActionType::Attack | ActionType::Rush | ActionType::Spin)
    }

    /// Actions a charged dodge avoids.
    pub fn is_dodgeable(self) -> bool {
        matches!(self, ActionType::Shot | ActionType::Rapid)
    }

    /// Actions reduced by an active guard.
    pub fn is_guardable(self) -> bool {
        matches!(
            self,
            ActionType::Attack | ActionType::Rush | ActionType::Spin | ActionType::Rapid
        )
    }

    /// Defensive reactions consume their own activation when they fire and
    /// break visibly when cancelled mid-charge.
    pub fn is_defensive(self) -> bool {
        matches!(self, ActionType::Guard | ActionType::Dodge | ActionType::Counter)
    }
}

/// How a skill moves from activation to execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActivationType {
    /// Client charges, then requests execution.
    Charged = 0,
    /// Executes during activation, no round trip.
    Instant = 1,
    /// Charges, then self-executes when the charge completes.
    Special = 2,
    /// Switch-style; self-executes at charge completion and toggles.
    OnToggle = 3,
}

impl ActivationType {
    /// Self-executing activations are driven by the scheduler rather than a
    /// client execute request.
    pub fn auto_executes(self) -> bool {
        matches!(self, ActivationType::Special | ActivationType::OnToggle)
    }
}

/// Top-level dispatch category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum SkillCategory {
    Active = 0,
    Switch = 1,
    Passive = 2,
}

/// Which offense stat a skill draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum DependencyType {
    CloseRange = 0,
    LongRange = 1,
    Spell = 2,
    Support = 3,
    /// Close-range plus half spell.
    CloseRangeSpell = 4,
    /// Spell plus half close-range.
    SpellCloseRange = 5,
    /// Long-range plus half spell.
    LongRangeSpell = 6,
    /// Spell plus half long-range.
    SpellLongRange = 7,
    /// Resolved from the equipped weapon at execution time.
    Weapon = 8,
}

impl DependencyType {
    /// Primary and (optional) secondary offense slots; the secondary slot
    /// contributes at half weight.
    pub fn offense_slots(self) -> (CorrectValue, Option<CorrectValue>) {
        match self {
            DependencyType::CloseRange | DependencyType::Weapon => {
                (CorrectValue::CloseRange, None)
            }
            DependencyType::LongRange => (CorrectValue::LongRange, None),
            DependencyType::Spell => (CorrectValue::Spell, None),
            DependencyType::Support => (CorrectValue::Support, None),
            DependencyType::CloseRangeSpell => {
                (CorrectValue::CloseRange, Some(CorrectValue::Spell))
            }
            DependencyType::SpellCloseRange => {
                (CorrectValue::Spell, Some(CorrectValue::CloseRange))
            }
            DependencyType::LongRangeSpell => (CorrectValue::LongRange, Some(CorrectValue::Spell)),
            DependencyType::SpellLongRange => (CorrectValue::Spell, Some(CorrectValue::LongRange)),
        }
    }

    /// Class-level affinity used for avoidance checks. Support skills have
    /// none.
    pub fn class_affinity(self) -> Option<Affinity> {
        match self {
            DependencyType::Support => None,
            DependencyType::Spell => Some(Affinity::Magic),
            DependencyType::SpellCloseRange | DependencyType::SpellLongRange => {
                Some(Affinity::Magic)
            }
            _ => Some(Affinity::Physical),
        }
    }

    /// Defense stat the target opposes with.
    pub fn defense_slot(self) -> CorrectValue {
        match self.class_affinity() {
            Some(Affinity::Magic) => CorrectValue::MagicDefense,
            _ => CorrectValue::PhysDefense,
        }
    }

    /// Skill class for dealt/taken rate adjustments.
    pub fn skill_class(self) -> SkillClass {
        match self {
            DependencyType::CloseRange | DependencyType::CloseRangeSpell | DependencyType::Weapon => {
                SkillClass::CloseRange
            }
            DependencyType::LongRange | DependencyType::LongRangeSpell => SkillClass::LongRange,
            DependencyType::Spell
            | DependencyType::SpellCloseRange
            | DependencyType::SpellLongRange => SkillClass::Spell,
            DependencyType::Support => SkillClass::Support,
        }
    }
}

/// Damage formula selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum DamageFormula {
    None = 0,
    Normal = 1,
    /// Normal pipeline without crit or variance.
    NormalSimple = 2,
    Static = 3,
    /// Percent of the target's current HP/MP.
    Percent = 4,
    /// Percent of the target's max HP/MP.
    MaxPercent = 5,
    /// Percent of the source's current HP/MP.
    SourcePercent = 6,
    /// Normal damage plus doubled reversed offense of the countered skill.
    Counter = 7,
    HealNormal = 8,
    HealStatic = 9,
    HealPercent = 10,
    HealMaxPercent = 11,
    /// Damage values already fixed by a script before application.
    ExplicitSet = 12,
}

impl DamageFormula {
    pub fn is_heal(self) -> bool {
        matches!(
            self,
            DamageFormula::HealNormal
                | DamageFormula::HealStatic
                | DamageFormula::HealPercent
                | DamageFormula::HealMaxPercent
        )
    }

    /// Formulas that run the full normal-damage pipeline.
    pub fn is_normal(self) -> bool {
        matches!(
            self,
            DamageFormula::Normal
                | DamageFormula::NormalSimple
                | DamageFormula::Counter
                | DamageFormula::HealNormal
        )
    }

    pub fn deals_damage(self) -> bool {
        self != DamageFormula::None
    }
}

/// Shape of the area-of-effect gather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum AreaType {
    None = 0,
    /// Every active entity in the zone.
    ZoneAll = 1,
    /// Radius around the effective source.
    Source = 2,
    /// Radius around the effective source, extended by source hitbox.
    SourceRadius = 3,
    /// Second hitbox-extended source radius variant.
    SourceRadius2 = 4,
    /// Radius around the primary target; skipped when the hit was absorbed.
    TargetRadius = 5,
    /// Arc in front of the source.
    FrontArc1 = 6,
    FrontArc2 = 7,
    /// Arc variant skipped when the primary hit was absorbed.
    FrontArc3 = 8,
    /// Rectangle along source→target.
    StraightLine = 9,
}

impl AreaType {
    /// Source-centric areas keep their geometry when the primary target
    /// reflects, so reflect does not rewire the hit.
    pub fn is_source_centric(self) -> bool {
        matches!(
            self,
            AreaType::Source
                | AreaType::SourceRadius
                | AreaType::SourceRadius2
                | AreaType::FrontArc1
                | AreaType::FrontArc2
                | AreaType::FrontArc3
        )
    }

    /// Areas that never gather when the primary hit was absorbed.
    pub fn skipped_on_absorb(self) -> bool {
        matches!(self, AreaType::TargetRadius | AreaType::FrontArc3)
    }
}

/// Which entities a skill may affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValidType {
    None = 0,
    Enemy = 1,
    Ally = 2,
    DeadAlly = 3,
    Party = 4,
    DeadParty = 5,
    /// Self plus summoned partner.
    Source = 6,
}

/// Knockback displacement rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum KnockbackType {
    /// Push away from the effective source.
    AwayFromSource = 0,
    /// Push away from the effective target (primary target downgrades to
    /// away-from-source).
    AwayFromTarget = 1,
    /// No displacement; statuses flagged on-knockback still apply.
    StatusOnly = 2,
    /// Alternate away-from-source used by sweeping attacks.
    AwayFromSourceAlt = 3,
    /// Teleport to the effective target's position.
    MatchTarget = 4,
    /// Teleport to the source's position.
    AtSource = 5,
}

// ============================================================================
// Adjust restrictions
// ============================================================================

/// Bits that pin a skill's numbers against passive adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AdjustRestrict(u8);

impl AdjustRestrict {
    pub const NONE: Self = Self(0);
    /// Charge time cannot be shortened.
    pub const FIXED_CHARGE: Self = Self(1 << 0);
    /// HP/MP costs cannot be multiplied.
    pub const FIXED_COST: Self = Self(1 << 1);
    /// Cooldown cannot be multiplied.
    pub const FIXED_COOLDOWN: Self = Self(1 << 2);
    /// Use count cannot gain passive additions.
    pub const FIXED_STACK: Self = Self(1 << 3);

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: AdjustRestrict) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: AdjustRestrict) -> Self {
        Self(self.0 | other.0)
    }
}

// ============================================================================
// Use restrictions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Law/Neutral/Chaos alignment mask; empty means unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LncMask(u8);

impl LncMask {
    pub const ANY: Self = Self(0);
    pub const LAW: Self = Self(1 << 0);
    pub const NEUTRAL: Self = Self(1 << 1);
    pub const CHAOS: Self = Self(1 << 2);

    pub const fn with(self, other: LncMask) -> Self {
        Self(self.0 | other.0)
    }

    pub fn allows(self, alignment: LncMask) -> bool {
        self.0 == 0 || self.0 & alignment.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponType {
    None,
    Sword,
    Gun,
    Spear,
    Blunt,
}

/// Static conditions a source must satisfy to use a skill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillRestriction {
    /// Required equipped weapon type, if any.
    pub weapon: Option<WeaponType>,
    pub lnc: LncMask,
    pub gender: Option<Gender>,
    pub min_level: u8,
}

// ============================================================================
// Added statuses
// ============================================================================

/// A status candidate carried by a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddStatusEntry {
    pub status: StatusId,
    pub min_stack: i8,
    pub max_stack: i8,
    /// Base success rate, percent.
    pub rate: i16,
    /// Only applies when the hit knocked the target back.
    pub on_knockback: bool,
    /// Replaces an active instance instead of being skipped by it.
    pub replace: bool,
}

impl AddStatusEntry {
    pub fn new(status: StatusId, min_stack: i8, max_stack: i8, rate: i16) -> Self {
        Self {
            status,
            min_stack,
            max_stack,
            rate,
            on_knockback: false,
            replace: false,
        }
    }

    pub fn on_knockback(mut self) -> Self {
        self.on_knockback = true;
        self
    }

    pub fn replaces(mut self) -> Self {
        self.replace = true;
        self
    }
}

// ============================================================================
// Skill definition
// ============================================================================

/// Authored skill data.
///
/// Time fields are authored in milliseconds; the engine converts to
/// microsecond deadlines on the server clock at activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: SkillId,
    /// Scripted/built-in behavior key, if any.
    pub function_id: Option<FunctionId>,
    pub action: ActionType,
    pub activation: ActivationType,
    pub category: SkillCategory,
    /// Skill family, shared by ranks of the same skill.
    pub family: u16,
    pub charge_time_ms: u32,
    pub cooldown_time_ms: u32,
    pub cooldown_group: CooldownGroup,
    /// Post-execution lockout window.
    pub stiffness_ms: u32,
    /// Unexecuted charge expires this long after charge completion; zero
    /// disables auto-cancel.
    pub auto_cancel_ms: u32,
    pub affinity: Affinity,
    pub dependency: DependencyType,
    pub target: ValidType,
    pub target_range: u32,
    pub area: AreaType,
    pub area_range: u32,
    /// Arc width parameter: half-width is `area_percent/100 × π` radians.
    /// Doubles as the rectangle width for straight-line areas.
    pub area_percent: u16,
    /// Percent damage reduction on indirect targets.
    pub aoe_reduction: u16,
    pub formula: DamageFormula,
    /// HP-channel modifier, percent.
    pub modifier1: u16,
    /// MP-channel modifier, percent.
    pub modifier2: u16,
    pub hp_cost: u32,
    pub hp_cost_percent: u16,
    pub mp_cost: u32,
    pub mp_cost_percent: u16,
    pub item_costs: Vec<(ItemId, u32)>,
    pub bullet_cost: u16,
    /// Percent of dealt HP damage returned to the source.
    pub hp_drain_percent: i16,
    pub mp_drain_percent: i16,
    pub knockback_modifier: f32,
    pub knockback_type: KnockbackType,
    pub knockback_distance: u16,
    pub hit_delay_ms: u32,
    pub complete_delay_ms: u32,
    /// Non-zero makes the skill a projectile; units per 10 ms of flight.
    pub projectile_speed: u16,
    pub add_statuses: Vec<AddStatusEntry>,
    pub adjust_restrict: AdjustRestrict,
    pub restriction: SkillRestriction,
    /// Base use count per activation before passive additions.
    pub base_use_count: u8,
    /// Expertise line that boosts this skill, if any.
    pub expertise_id: Option<u16>,
}

impl SkillDefinition {
    /// A minimal instant self-skill; tests and authored loaders layer the
    /// rest on with the `with_*` methods.
    pub fn new(id: SkillId) -> Self {
        Self {
            id,
            function_id: None,
            action: ActionType::Attack,
            activation: ActivationType::Instant,
            category: SkillCategory::Active,
            family: 0,
            charge_time_ms: 0,
            cooldown_time_ms: 0,
            cooldown_group: CooldownGroup(id.0),
            stiffness_ms: 0,
            auto_cancel_ms: 0,
            affinity: Affinity::Strike,
            dependency: DependencyType::CloseRange,
            target: ValidType::None,
            target_range: 0,
            area: AreaType::None,
            area_range: 0,
            area_percent: 0,
            aoe_reduction: 0,
            formula: DamageFormula::None,
            modifier1: 0,
            modifier2: 0,
            hp_cost: 0,
            hp_cost_percent: 0,
            mp_cost: 0,
            mp_cost_percent: 0,
            item_costs: Vec::new(),
            bullet_cost: 0,
            hp_drain_percent: 0,
            mp_drain_percent: 0,
            knockback_modifier: 0.0,
            knockback_type: KnockbackType::StatusOnly,
            knockback_distance: 0,
            hit_delay_ms: 0,
            complete_delay_ms: 0,
            projectile_speed: 0,
            add_statuses: Vec::new(),
            adjust_restrict: AdjustRestrict::NONE,
            restriction: SkillRestriction::default(),
            base_use_count: 1,
            expertise_id: None,
        }
    }

    pub fn with_action(mut self, action: ActionType) -> Self {
        self.action = action;
        self
    }

    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_category(mut self, category: SkillCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_function(mut self, function_id: FunctionId) -> Self {
        self.function_id = Some(function_id);
        self
    }

    pub fn with_charge(mut self, charge_ms: u32) -> Self {
        self.charge_time_ms = charge_ms;
        if self.activation == ActivationType::Instant {
            self.activation = ActivationType::Charged;
        }
        self
    }

    pub fn with_cooldown(mut self, cooldown_ms: u32) -> Self {
        self.cooldown_time_ms = cooldown_ms;
        self
    }

    pub fn with_cooldown_group(mut self, group: CooldownGroup) -> Self {
        self.cooldown_group = group;
        self
    }

    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyType) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn with_formula(mut self, formula: DamageFormula, modifier1: u16, modifier2: u16) -> Self {
        self.formula = formula;
        self.modifier1 = modifier1;
        self.modifier2 = modifier2;
        self
    }

    pub fn with_target(mut self, target: ValidType, range: u32) -> Self {
        self.target = target;
        self.target_range = range;
        self
    }

    pub fn with_area(mut self, area: AreaType, range: u32, percent: u16) -> Self {
        self.area = area;
        self.area_range = range;
        self.area_percent = percent;
        self
    }

    pub fn with_costs(mut self, hp: u32, mp: u32) -> Self {
        self.hp_cost = hp;
        self.mp_cost = mp;
        self
    }

    pub fn with_knockback(mut self, modifier: f32, kind: KnockbackType, distance: u16) -> Self {
        self.knockback_modifier = modifier;
        self.knockback_type = kind;
        self.knockback_distance = distance;
        self
    }

    pub fn with_projectile(mut self, speed: u16) -> Self {
        self.projectile_speed = speed;
        self
    }

    pub fn with_status(mut self, entry: AddStatusEntry) -> Self {
        self.add_statuses.push(entry);
        self
    }

    pub fn with_uses(mut self, uses: u8) -> Self {
        self.base_use_count = uses.max(1);
        self
    }

    /// Whether the skill requires a resolved entity target at execution.
    pub fn requires_target(&self) -> bool {
        !matches!(self.target, ValidType::None | ValidType::Source)
    }

    pub fn is_projectile(&self) -> bool {
        self.projectile_speed > 0
    }
}

// ============================================================================
// Status definition
// ============================================================================

/// How a new application interacts with an active instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum ApplicationLogic {
    /// Stacks accumulate up to the definition cap.
    Accumulate = 0,
    /// Skipped while active unless the add entry replaces.
    SkipIfActive = 1,
    /// Ailment: feeds the target's ailment damage pool instead of the
    /// status map.
    Ailment = 2,
}

/// Authored status effect data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub id: StatusId,
    pub logic: ApplicationLogic,
    /// Grouping used by category-level immunity and inflict adjustments.
    pub category: u8,
    /// Harmful effects pre-roll avoidance on their affinity.
    pub bad: bool,
    /// Affinity used for the avoidance pre-roll and resistance scaling;
    /// `None` skips both.
    pub affinity: Option<Affinity>,
    /// Per-stack duration in milliseconds.
    pub duration_ms: u32,
    pub max_stack: u8,
    /// Lifecycle causes that remove this effect while active.
    pub cancel_on: crate::processing::EffectCancelFlags,
    /// Dropped instead of applied when the hit leaves the target dead.
    pub cancel_addition_on_death: bool,
    /// Stat slot that scales drawn stacks, if any.
    pub scale_source: Option<CorrectValue>,
    /// Sleep-style effects are protected from hit cancellation by
    /// sleep-restricted skills.
    pub is_sleep: bool,
    /// Kills outright on application; inflict rate is capped at 50%.
    pub instant_death: bool,
}

impl StatusDefinition {
    pub fn new(id: StatusId) -> Self {
        Self {
            id,
            logic: ApplicationLogic::Accumulate,
            category: 0,
            bad: false,
            affinity: None,
            duration_ms: 0,
            max_stack: i8::MAX as u8,
            cancel_on: crate::processing::EffectCancelFlags::NONE,
            cancel_addition_on_death: false,
            scale_source: None,
            is_sleep: false,
            instant_death: false,
        }
    }

    pub fn bad(mut self, affinity: Option<Affinity>) -> Self {
        self.bad = true;
        self.affinity = affinity;
        self
    }

    pub fn with_logic(mut self, logic: ApplicationLogic) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_category(mut self, category: u8) -> Self {
        self.category = category;
        self
    }

    pub fn with_duration(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_cancel_on(mut self, cancel_on: crate::processing::EffectCancelFlags) -> Self {
        self.cancel_on = cancel_on;
        self
    }

    pub fn sleep(mut self) -> Self {
        self.is_sleep = true;
        self.logic = ApplicationLogic::SkipIfActive;
        self
    }
}

// ============================================================================
// Item definition
// ============================================================================

/// The slice of item data the cost engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: ItemId,
    /// Consumed implicitly when the item triggers a skill.
    pub single_use: bool,
    /// Compressed form and the unit count one compressed item decomposes
    /// into (macca notes, magnetite presses).
    pub decompresses_from: Option<(ItemId, u32)>,
}

impl ItemDefinition {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            single_use: false,
            decompresses_from: None,
        }
    }

    pub fn single_use(mut self) -> Self {
        self.single_use = true;
        self
    }

    pub fn decompressed_from(mut self, compressed: ItemId, units: u32) -> Self {
        self.decompresses_from = Some((compressed, units));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_offense_slots() {
        let (main, half) = DependencyType::CloseRange.offense_slots();
        assert_eq!(main, CorrectValue::CloseRange);
        assert!(half.is_none());

        let (main, half) = DependencyType::SpellCloseRange.offense_slots();
        assert_eq!(main, CorrectValue::Spell);
        assert_eq!(half, Some(CorrectValue::CloseRange));
    }

    #[test]
    fn test_dependency_class_affinity() {
        assert_eq!(
            DependencyType::CloseRange.class_affinity(),
            Some(Affinity::Physical)
        );
        assert_eq!(DependencyType::Spell.class_affinity(), Some(Affinity::Magic));
        assert_eq!(DependencyType::Support.class_affinity(), None);
        assert_eq!(
            DependencyType::Spell.defense_slot(),
            CorrectValue::MagicDefense
        );
    }

    #[test]
    fn test_area_type_reflect_rules() {
        assert!(AreaType::SourceRadius.is_source_centric());
        assert!(!AreaType::TargetRadius.is_source_centric());
        assert!(AreaType::TargetRadius.skipped_on_absorb());
        assert!(AreaType::FrontArc3.skipped_on_absorb());
        assert!(!AreaType::FrontArc1.skipped_on_absorb());
    }

    #[test]
    fn test_adjust_restrict_bits() {
        let r = AdjustRestrict::FIXED_COST.with(AdjustRestrict::FIXED_STACK);
        assert!(r.contains(AdjustRestrict::FIXED_COST));
        assert!(r.contains(AdjustRestrict::FIXED_STACK));
        assert!(!r.contains(AdjustRestrict::FIXED_CHARGE));
    }

    #[test]
    fn test_lnc_mask() {
        assert!(LncMask::ANY.allows(LncMask::CHAOS));
        let law_only = LncMask::LAW;
        assert!(law_only.allows(LncMask::LAW));
        assert!(!law_only.allows(LncMask::CHAOS));
    }

    #[test]
    fn test_action_defensive_matrix() {
        assert!(ActionType::Attack.is_counterable());
        assert!(!ActionType::Shot.is_counterable());
        assert!(ActionType::Shot.is_dodgeable());
        assert!(ActionType::Counter.is_defensive());
        assert!(!ActionType::Attack.is_defensive());
    }

    #[test]
    fn test_builder_defaults() {
        let skill = SkillDefinition::new(SkillId(100))
            .with_charge(1500)
            .with_formula(DamageFormula::Normal, 150, 0);
        assert_eq!(skill.activation, ActivationType::Charged);
        assert_eq!(skill.cooldown_group, CooldownGroup(100));
        assert!(!skill.is_projectile());
        assert!(!skill.requires_target());
    }
}
