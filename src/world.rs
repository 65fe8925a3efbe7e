//! Zone state: the entity arena and everything a skill use touches.
//!
//! A zone is owned by one channel thread. All mutation happens inline on
//! that thread; anything leaving the zone (client packets, persistence, AI,
//! reward bookkeeping) is buffered as events or side effects and drained by
//! the embedding server after each pump.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::entity::{EntityState, Position};
use crate::events::OutboundEvent;
use crate::ids::{EntityId, ServerTime, SkillId};
use crate::processing::ProcessingSkill;
use crate::registry::DefinitionStore;
use crate::rng::CombatRng;
use crate::scheduler::Scheduler;
use crate::scripts::ScriptRegistry;
use crate::tokusei::{RecalcTrigger, TokuseiManager};

/// World configuration the engine honors.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Persist switch skill state for re-activation on login.
    pub save_switch_skills: bool,
    /// Allow paying item costs by decomposing compressed stacks.
    pub auto_decompress_for_skill_uses: bool,
    /// Let null avoidance block status applications.
    pub nra_status_null: bool,
    /// Fraction of defense ignored on critical hits.
    pub crit_defense_reduction: f32,
    /// Stagger colliding executions instead of resolving them same-instant.
    pub iframes_enabled: bool,
    /// Percent bonus on fusion gauge awards.
    pub fusion_gauge_bonus: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            save_switch_skills: true,
            auto_decompress_for_skill_uses: false,
            nra_status_null: true,
            crit_defense_reduction: 0.0,
            iframes_enabled: true,
            fusion_gauge_bonus: 0,
        }
    }
}

/// Work handed off to collaborators outside the zone thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// AI aggro bookkeeping after a hostile skill.
    AggroUpdate { source: EntityId, target: EntityId },
    /// AI notification that a combat skill connected.
    CombatSkillHit {
        source: EntityId,
        skill: SkillId,
        targets: Vec<EntityId>,
    },
    /// AI notification that a skill finished.
    CombatSkillComplete { source: EntityId, skill: SkillId },
    /// Kill bookkeeping: XP, loot, quest counters.
    EntityKilled { source: EntityId, killed: EntityId },
    /// Re-fold passives for an entity.
    RequestRecalc {
        entity: EntityId,
        triggers: Vec<RecalcTrigger>,
    },
    /// Persist a switch skill toggle.
    SaveSwitchSkill {
        entity: EntityId,
        skill: SkillId,
        on: bool,
    },
    /// Zone-change request from a warp skill.
    WarpRequest { entity: EntityId, x: f32, y: f32 },
}

/// One zone's live state.
#[derive(Debug)]
pub struct Zone {
    pub id: u32,
    now: ServerTime,
    pub pvp: bool,
    /// Warp skills are rejected here unless whitelisted.
    pub warp_disabled: bool,
    pub warp_whitelist: HashSet<SkillId>,
    /// Skills this zone refuses outright.
    pub skill_blacklist: HashSet<SkillId>,
    pub config: WorldConfig,
    pub entities: BTreeMap<EntityId, EntityState>,
    pub tokusei: TokuseiManager,
    pub rng: CombatRng,
    pub scheduler: Scheduler,
    pub definitions: Arc<DefinitionStore>,
    pub scripts: Arc<ScriptRegistry>,
    /// In-flight hit state, one per executing source.
    processing: HashMap<EntityId, ProcessingSkill>,
    events: Vec<OutboundEvent>,
    side_effects: Vec<SideEffect>,
}

impl Zone {
    pub fn new(
        id: u32,
        definitions: Arc<DefinitionStore>,
        scripts: Arc<ScriptRegistry>,
        seed: u64,
    ) -> Self {
        Self {
            id,
            now: ServerTime::ZERO,
            pvp: false,
            warp_disabled: false,
            warp_whitelist: HashSet::new(),
            skill_blacklist: HashSet::new(),
            config: WorldConfig::default(),
            entities: BTreeMap::new(),
            tokusei: TokuseiManager::new(),
            rng: CombatRng::seeded(seed),
            scheduler: Scheduler::new(),
            definitions,
            scripts,
            processing: HashMap::new(),
            events: Vec::new(),
            side_effects: Vec::new(),
        }
    }

    pub fn now(&self) -> ServerTime {
        self.now
    }

    /// Move the clock forward. Scheduled work is pumped by the engine, not
    /// here.
    pub fn set_time(&mut self, now: ServerTime) {
        if now > self.now {
            self.now = now;
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn insert_entity(&mut self, entity: EntityState) {
        self.entities.insert(entity.id, entity);
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<EntityState> {
        self.entities.remove(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// All entity ids in insertion-stable order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Ready entities within `range` of a point, in id order.
    pub fn entities_in_radius(&self, x: f32, y: f32, range: f32) -> Vec<EntityId> {
        let center = Position::at(x, y);
        self.entities
            .values()
            .filter(|e| e.is_ready())
            .filter(|e| e.pos.distance_to(&center) <= range + e.hitbox)
            .map(|e| e.id)
            .collect()
    }

    // ------------------------------------------------------------------
    // In-flight processing state
    // ------------------------------------------------------------------

    pub fn put_processing(&mut self, skill: ProcessingSkill) {
        self.processing.insert(skill.source, skill);
    }

    pub fn take_processing(&mut self, source: EntityId) -> Option<ProcessingSkill> {
        self.processing.remove(&source)
    }

    pub fn processing_for(&self, source: EntityId) -> Option<&ProcessingSkill> {
        self.processing.get(&source)
    }

    // ------------------------------------------------------------------
    // Outbound queues
    // ------------------------------------------------------------------

    pub fn broadcast(&mut self, event: OutboundEvent) {
        self.events.push(event);
    }

    pub fn broadcast_all(&mut self, events: Vec<OutboundEvent>) {
        self.events.extend(events);
    }

    pub fn push_side_effect(&mut self, effect: SideEffect) {
        self.side_effects.push(effect);
    }

    pub fn drain_events(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_side_effects(&mut self) -> Vec<SideEffect> {
        std::mem::take(&mut self.side_effects)
    }

    /// Peek at buffered events without draining.
    pub fn events(&self) -> &[OutboundEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn zone() -> Zone {
        Zone::new(
            1,
            Arc::new(DefinitionStore::new()),
            Arc::new(ScriptRegistry::new()),
            7,
        )
    }

    fn entity_at(id: i32, x: f32, y: f32) -> EntityState {
        let mut e = EntityState::new(EntityId(id), EntityKind::Enemy, 2);
        e.pos = Position::at(x, y);
        e.hp = 100;
        e.correct.set(crate::correct::CorrectValue::MaxHp, 100);
        e
    }

    #[test]
    fn test_radius_query_filters_and_orders() {
        let mut z = zone();
        z.insert_entity(entity_at(3, 50.0, 0.0));
        z.insert_entity(entity_at(1, 0.0, 0.0));
        z.insert_entity(entity_at(2, 500.0, 0.0));
        let mut dead = entity_at(4, 10.0, 0.0);
        dead.hp = 0;
        z.insert_entity(dead);

        let found = z.entities_in_radius(0.0, 0.0, 100.0);
        assert_eq!(found, vec![EntityId(1), EntityId(3)]);
    }

    #[test]
    fn test_hitbox_extends_radius() {
        let mut z = zone();
        let mut fat = entity_at(1, 104.0, 0.0);
        fat.hitbox = 5.0;
        z.insert_entity(fat);
        z.insert_entity(entity_at(2, 104.0, 0.0));

        let found = z.entities_in_radius(0.0, 0.0, 100.0);
        assert_eq!(found, vec![EntityId(1)]);
    }

    #[test]
    fn test_clock_never_rewinds() {
        let mut z = zone();
        z.set_time(ServerTime(1000));
        z.set_time(ServerTime(500));
        assert_eq!(z.now(), ServerTime(1000));
    }

    #[test]
    fn test_event_drain() {
        let mut z = zone();
        z.broadcast(OutboundEvent::SkillSwitch {
            source: EntityId(1),
            skill: SkillId(2),
            on: true,
        });
        assert_eq!(z.events().len(), 1);
        let drained = z.drain_events();
        assert_eq!(drained.len(), 1);
        assert!(z.events().is_empty());
    }
}
