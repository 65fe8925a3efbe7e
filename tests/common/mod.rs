//! Shared builders for the integration suite.

use std::sync::Arc;

use waza::correct::CorrectValue;
use waza::definition::{DamageFormula, SkillDefinition, StatusDefinition, ValidType};
use waza::entity::{EntityKind, EntityState, Position};
use waza::events::OutboundEvent;
use waza::ids::{EntityId, ServerTime, SkillId};
use waza::registry::DefinitionStore;
use waza::scripts::ScriptRegistry;
use waza::world::Zone;

pub fn zone_with(skills: Vec<SkillDefinition>, statuses: Vec<StatusDefinition>) -> Zone {
    zone_with_scripts(skills, statuses, ScriptRegistry::new())
}

pub fn zone_with_scripts(
    skills: Vec<SkillDefinition>,
    statuses: Vec<StatusDefinition>,
    scripts: ScriptRegistry,
) -> Zone {
    let mut defs = DefinitionStore::new();
    for skill in skills {
        defs.add_skill(skill);
    }
    for status in statuses {
        defs.add_status(status);
    }
    let mut zone = Zone::new(1, Arc::new(defs), Arc::new(scripts), 42);
    zone.set_time(ServerTime::from_millis(1000));
    zone
}

/// A melee combatant: CLSR 500, PDEF 100, 5000 HP, 1000 MP.
pub fn fighter(id: i32, faction: i32) -> EntityState {
    let mut e = EntityState::new(EntityId(id), EntityKind::Character, faction);
    e.correct.set(CorrectValue::MaxHp, 5000);
    e.correct.set(CorrectValue::MaxMp, 1000);
    e.correct.set(CorrectValue::CloseRange, 500);
    e.correct.set(CorrectValue::LongRange, 400);
    e.correct.set(CorrectValue::Spell, 450);
    e.correct.set(CorrectValue::PhysDefense, 100);
    e.correct.set(CorrectValue::MagicDefense, 80);
    e.hp = 5000;
    e.mp = 1000;
    e
}

pub fn fighter_at(id: i32, faction: i32, x: f32, y: f32) -> EntityState {
    let mut e = fighter(id, faction);
    e.pos = Position::at(x, y);
    e
}

/// A plain melee strike: normal formula, modifier 150, strike affinity.
pub fn strike_skill(id: u32) -> SkillDefinition {
    SkillDefinition::new(SkillId(id))
        .with_formula(DamageFormula::Normal, 150, 0)
        .with_target(ValidType::Enemy, 10_000)
}

/// First activation id broadcast since the last drain.
pub fn last_activation_id(zone: &Zone) -> Option<waza::ids::ActivationId> {
    zone.events().iter().find_map(|e| match e {
        OutboundEvent::SkillActivated { activation_id, .. } => Some(*activation_id),
        _ => None,
    })
}

/// All non-empty report events since the last drain.
pub fn report_events(zone: &Zone) -> Vec<&OutboundEvent> {
    zone.events()
        .iter()
        .filter(|e| matches!(e, OutboundEvent::SkillReports { .. }))
        .collect()
}
