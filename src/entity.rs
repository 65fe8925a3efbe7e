//! Live per-entity combat state.
//!
//! One [`EntityState`] exists per active entity in a zone. The skill engine
//! is its only combat-time mutator; stat recalculation and persistence react
//! to side effects emitted after the fact.

use std::collections::{HashMap, HashSet};

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::definition::{Gender, LncMask, WeaponType};
use crate::events::SkillError;
use crate::ids::{ActivationId, CooldownGroup, EntityId, ItemId, ServerTime, SkillId, StatusId};
use crate::nra::NraKind;
use crate::processing::EffectCancelFlags;
use crate::rng::CombatRng;

/// Broad entity classification used by target validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    /// Summoned partner demon.
    Partner,
    Enemy,
    Ally,
    Object,
}

/// Absolute-deadline status windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTimeKind {
    Charging,
    Lockout,
    HitStun,
    Knockback,
    Waiting,
    Immobile,
    Hit,
    Rest,
    Ignore,
}

/// An applied status effect.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEffectInstance {
    pub stack: u8,
    pub expiration: ServerTime,
    /// Cancel causes copied from the definition at apply time.
    pub cancel_on: EffectCancelFlags,
    pub is_sleep: bool,
}

/// Equipped bullet stack; rental bullets cost nothing while active.
#[derive(Debug, Clone, PartialEq)]
pub struct EquippedBullet {
    pub item: ItemId,
    pub count: u32,
    pub rental_until: Option<ServerTime>,
}

impl EquippedBullet {
    pub fn rental_active(&self, now: ServerTime) -> bool {
        self.rental_until.is_some_and(|until| until > now)
    }
}

/// Planar position with facing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    /// Facing angle in radians.
    pub rot: f32,
    /// Time of the last authoritative update.
    pub t: ServerTime,
}

impl Position {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            rot: 0.0,
            t: ServerTime::ZERO,
        }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Angle from this position toward another.
    pub fn heading_to(&self, other: &Position) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

// ============================================================================
// Activated ability
// ============================================================================

/// Per-use lifecycle state of one skill activation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivatedAbility {
    pub activation_id: ActivationId,
    pub skill: SkillId,
    /// Item that triggered the activation, if any.
    pub activation_item: Option<ItemId>,
    pub target: Option<EntityId>,
    pub activation_time: ServerTime,
    pub charged_time: ServerTime,
    pub execution_request_time: ServerTime,
    pub execution_time: ServerTime,
    pub hit_time: ServerTime,
    pub cooldown_time: ServerTime,
    pub lock_out_time: ServerTime,
    pub hp_cost: u32,
    pub mp_cost: u32,
    pub bullet_cost: u32,
    pub item_costs: HashMap<ItemId, u32>,
    /// Items paid by decomposing compressed stacks.
    pub compressible_item_costs: HashMap<ItemId, u32>,
    pub fusion_gauge_cost: u32,
    pub max_use_count: u8,
    pub execute_count: u8,
    pub cancelled: bool,
    /// Between execute dispatch and finalize.
    pub executing: bool,
    /// A scheduled hit has not yet been delivered.
    pub hit_pending: bool,
    pub error: Option<SkillError>,
    pub fusion_demons: Vec<EntityId>,
}

impl ActivatedAbility {
    pub fn new(activation_id: ActivationId, skill: SkillId, now: ServerTime) -> Self {
        Self {
            activation_id,
            skill,
            activation_item: None,
            target: None,
            activation_time: now,
            charged_time: ServerTime::ZERO,
            execution_request_time: ServerTime::ZERO,
            execution_time: ServerTime::ZERO,
            hit_time: ServerTime::ZERO,
            cooldown_time: ServerTime::ZERO,
            lock_out_time: ServerTime::ZERO,
            hp_cost: 0,
            mp_cost: 0,
            bullet_cost: 0,
            item_costs: HashMap::new(),
            compressible_item_costs: HashMap::new(),
            fusion_gauge_cost: 0,
            max_use_count: 1,
            execute_count: 0,
            cancelled: false,
            executing: false,
            hit_pending: false,
            error: None,
            fusion_demons: Vec::new(),
        }
    }

    /// Executed its full use count or was cancelled.
    pub fn retired(&self) -> bool {
        self.cancelled || self.execute_count >= self.max_use_count
    }

    /// Mid-execution or waiting on a scheduled hit; activations in this
    /// state refuse replacement silently.
    pub fn pending_execution(&self) -> bool {
        self.executing || self.hit_pending
    }

    /// Roll the ability over for its next use, clearing per-use state while
    /// keeping identity, target, and use accounting.
    pub fn reset_for_next_use(&mut self, now: ServerTime) {
        self.activation_time = now;
        self.charged_time = ServerTime::ZERO;
        self.execution_request_time = ServerTime::ZERO;
        self.execution_time = ServerTime::ZERO;
        self.hit_time = ServerTime::ZERO;
        self.executing = false;
        self.hit_pending = false;
        self.hp_cost = 0;
        self.mp_cost = 0;
        self.bullet_cost = 0;
        self.item_costs.clear();
        self.compressible_item_costs.clear();
        self.fusion_gauge_cost = 0;
        self.error = None;
    }
}

// ============================================================================
// HP/MP application
// ============================================================================

/// Result of one HP/MP application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HpMpOutcome {
    pub hp_changed: i32,
    pub mp_changed: i32,
    pub killed: bool,
    pub revived: bool,
    pub clenched: bool,
    /// Clench broken by follow-up damage; displayed as overflow.
    pub clench_overflow: bool,
}

// ============================================================================
// Entity state
// ============================================================================

/// Live combat state for one entity.
#[derive(Debug)]
pub struct EntityState {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Entities sharing a faction group never count as enemies.
    pub faction: i32,
    pub level: u8,
    pub gender: Gender,
    pub lnc: LncMask,
    pub pos: Position,
    /// Collision radius added onto hitbox-extended area checks.
    pub hitbox: f32,
    pub hp: i32,
    pub mp: i32,
    pub correct: CorrectTable,
    pub weapon: WeaponType,
    /// Affinity carried by the equipped weapon.
    pub weapon_affinity: Affinity,
    pub statuses: HashMap<StatusId, StatusEffectInstance>,
    status_times: HashMap<StatusTimeKind, ServerTime>,
    nra_shields: HashMap<(NraKind, Affinity), u32>,
    cooldowns: HashMap<CooldownGroup, ServerTime>,
    pub switch_active: HashSet<SkillId>,
    pub activated: Option<ActivatedAbility>,
    pub special_activations: HashMap<ActivationId, ActivatedAbility>,
    next_activation: i32,
    pub opponents: HashSet<EntityId>,
    pub inventory: HashMap<ItemId, u32>,
    pub equipped_bullet: Option<EquippedBullet>,
    pub fusion_gauge: u32,
    pub expertise: HashMap<u16, u8>,
    /// Cleared while despawned or warping; not targetable then.
    pub display_active: bool,
    pub is_player: bool,
    /// Dead players must opt in before a revival skill may land.
    pub accepts_revival: bool,
    pub mounted: bool,
    /// Ailment damage pool and its clock.
    pub ailment_damage: i32,
    pub ailment_affinity: Option<Affinity>,
    pub ailment_until: ServerTime,
    /// Partner/summoner link for self-type targeting.
    pub partner: Option<EntityId>,
    /// Party membership for party-scoped targeting.
    pub party: Option<u32>,
    /// Negotiation resistance, percent; 100 refuses all talk skills.
    pub talk_resist: i32,
    /// Negotiation disabled outright for this spawn.
    pub negotiation_locked: bool,
}

impl EntityState {
    pub fn new(id: EntityId, kind: EntityKind, faction: i32) -> Self {
        Self {
            id,
            kind,
            faction,
            level: 1,
            gender: Gender::Male,
            lnc: LncMask::NEUTRAL,
            pos: Position::default(),
            hitbox: 0.0,
            hp: 1,
            mp: 0,
            correct: CorrectTable::new(),
            weapon: WeaponType::None,
            weapon_affinity: Affinity::Strike,
            statuses: HashMap::new(),
            status_times: HashMap::new(),
            nra_shields: HashMap::new(),
            cooldowns: HashMap::new(),
            switch_active: HashSet::new(),
            activated: None,
            special_activations: HashMap::new(),
            next_activation: 0,
            opponents: HashSet::new(),
            inventory: HashMap::new(),
            equipped_bullet: None,
            fusion_gauge: 0,
            expertise: HashMap::new(),
            display_active: true,
            is_player: false,
            accepts_revival: false,
            mounted: false,
            ailment_damage: 0,
            ailment_affinity: None,
            ailment_until: ServerTime::ZERO,
            partner: None,
            party: None,
            talk_resist: 0,
            negotiation_locked: false,
        }
    }

    pub fn max_hp(&self) -> i32 {
        self.correct.value(CorrectValue::MaxHp)
    }

    pub fn max_mp(&self) -> i32 {
        self.correct.value(CorrectValue::MaxMp)
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Alive and visible; the baseline for being targeted at all.
    pub fn is_ready(&self) -> bool {
        self.is_alive() && self.display_active
    }

    pub fn is_enemy_of(&self, other: &EntityState) -> bool {
        self.faction != other.faction
    }

    // ------------------------------------------------------------------
    // Status windows
    // ------------------------------------------------------------------

    pub fn status_time(&self, kind: StatusTimeKind) -> ServerTime {
        self.status_times
            .get(&kind)
            .copied()
            .unwrap_or(ServerTime::ZERO)
    }

    pub fn in_status_window(&self, kind: StatusTimeKind, now: ServerTime) -> bool {
        self.status_time(kind) > now
    }

    /// Extend a window; an active window is never shortened.
    pub fn extend_status_time(&mut self, kind: StatusTimeKind, until: ServerTime) {
        let entry = self.status_times.entry(kind).or_insert(ServerTime::ZERO);
        if until > *entry {
            *entry = until;
        }
    }

    pub fn clear_status_time(&mut self, kind: StatusTimeKind) {
        self.status_times.remove(&kind);
    }

    // ------------------------------------------------------------------
    // Cooldowns
    // ------------------------------------------------------------------

    pub fn cooldown_active(&self, group: CooldownGroup, now: ServerTime) -> bool {
        self.cooldowns.get(&group).is_some_and(|until| *until > now)
    }

    pub fn set_cooldown(&mut self, group: CooldownGroup, until: ServerTime) {
        self.cooldowns.insert(group, until);
    }

    pub fn cooldown_until(&self, group: CooldownGroup) -> ServerTime {
        self.cooldowns
            .get(&group)
            .copied()
            .unwrap_or(ServerTime::ZERO)
    }

    // ------------------------------------------------------------------
    // Avoidance shields
    // ------------------------------------------------------------------

    pub fn add_nra_shields(&mut self, kind: NraKind, affinity: Affinity, count: u32) {
        *self.nra_shields.entry((kind, affinity)).or_insert(0) += count;
    }

    pub fn nra_shield_count(&self, kind: NraKind, affinity: Affinity) -> u32 {
        self.nra_shields
            .get(&(kind, affinity))
            .copied()
            .unwrap_or(0)
    }

    /// Consume one shield charge if present. Charges only decrement here,
    /// never during speculative checks.
    pub fn consume_nra_shield(&mut self, kind: NraKind, affinity: Affinity) -> bool {
        match self.nra_shields.get_mut(&(kind, affinity)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.nra_shields.remove(&(kind, affinity));
                }
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Activations
    // ------------------------------------------------------------------

    /// Allocate the next client-visible activation handle.
    pub fn next_activation_id(&mut self) -> ActivationId {
        let id = ActivationId(self.next_activation);
        self.next_activation = (self.next_activation + 1) % 128;
        id
    }

    /// The activated ability, if it matches the given handle. Instant
    /// activations match only the reserved handle.
    pub fn activated_with_id(&self, activation_id: ActivationId) -> Option<&ActivatedAbility> {
        match &self.activated {
            Some(ability) if ability.activation_id == activation_id => Some(ability),
            _ => self.special_activations.get(&activation_id),
        }
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    pub fn item_count(&self, item: ItemId) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }

    pub fn add_items(&mut self, item: ItemId, count: u32) {
        *self.inventory.entry(item).or_insert(0) += count;
    }

    /// Remove items; fails without mutation when short.
    pub fn remove_items(&mut self, item: ItemId, count: u32) -> bool {
        match self.inventory.get_mut(&item) {
            Some(have) if *have >= count => {
                *have -= count;
                if *have == 0 {
                    self.inventory.remove(&item);
                }
                true
            }
            _ => false,
        }
    }

    pub fn expertise_rank(&self, expertise_id: Option<u16>) -> u8 {
        expertise_id
            .and_then(|id| self.expertise.get(&id).copied())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // HP/MP application
    // ------------------------------------------------------------------

    /// Apply an HP/MP change.
    ///
    /// Negative deltas damage, positive heal. `relative` applies deltas to
    /// current values, otherwise they are absolute sets. `clamp` bounds the
    /// result to `[0, max]`. A non-zero `clench_chance` gives a lethal blow
    /// a chance to leave the entity at 1 HP; `overflow_break` (technical or
    /// pursuit damage landed) breaks the clench and lets the kill through
    /// with the overflow displayed.
    pub fn set_hp_mp(
        &mut self,
        hp_delta: i32,
        mp_delta: i32,
        relative: bool,
        clamp: bool,
        clench_chance: i32,
        overflow_break: bool,
        rng: &mut CombatRng,
    ) -> HpMpOutcome {
        let was_alive = self.is_alive();
        let max_hp = self.max_hp();
        let max_mp = self.max_mp();

        let mut new_hp = if relative { self.hp + hp_delta } else { hp_delta };
        let mut new_mp = if relative { self.mp + mp_delta } else { mp_delta };

        let mut outcome = HpMpOutcome::default();

        if was_alive && new_hp <= 0 && clench_chance > 0 && rng.chance(clench_chance) {
            if overflow_break {
                outcome.clench_overflow = true;
            } else {
                outcome.clenched = true;
                new_hp = 1;
            }
        }

        if clamp {
            new_hp = new_hp.clamp(0, max_hp);
            new_mp = new_mp.clamp(0, max_mp);
        }

        outcome.hp_changed = new_hp - self.hp;
        outcome.mp_changed = new_mp - self.mp;
        self.hp = new_hp;
        self.mp = new_mp;

        let now_alive = self.is_alive();
        outcome.killed = was_alive && !now_alive;
        outcome.revived = !was_alive && now_alive;
        outcome
    }

    // ------------------------------------------------------------------
    // Status effects
    // ------------------------------------------------------------------

    pub fn has_status(&self, status: StatusId) -> bool {
        self.statuses.contains_key(&status)
    }

    /// Cancel active effects whose cancel mask intersects `causes`.
    /// Sleep-style effects survive when `protect_sleep` is set.
    pub fn cancel_statuses(
        &mut self,
        causes: EffectCancelFlags,
        protect_sleep: bool,
    ) -> Vec<StatusId> {
        let mut cancelled = Vec::new();
        self.statuses.retain(|id, instance| {
            let hit = instance.cancel_on.intersects(causes)
                && !(protect_sleep && instance.is_sleep);
            if hit {
                cancelled.push(*id);
            }
            !hit
        });
        cancelled.sort_unstable();
        cancelled
    }
}
