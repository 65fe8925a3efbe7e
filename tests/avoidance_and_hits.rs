//! Avoidance, reflect rewiring, defensive reactions, knockback, and
//! status application observed through the full pipeline.

mod common;

use common::{fighter_at, strike_skill, zone_with};
use waza::correct::{Affinity, CorrectValue};
use waza::definition::{
    ActionType, AddStatusEntry, AreaType, DamageFormula, DependencyType, KnockbackType,
    SkillDefinition, StatusDefinition, ValidType,
};
use waza::engine::{ActivateRequest, activate, advance_to};
use waza::events::OutboundEvent;
use waza::ids::{EntityId, ServerTime, SkillId, StatusId};
use waza::nra::NraKind;
use waza::processing::{AvoidClass, DamageType, HitFlags1};

fn fire_spell(id: u32) -> SkillDefinition {
    SkillDefinition::new(SkillId(id))
        .with_formula(DamageFormula::Normal, 100, 0)
        .with_target(ValidType::Enemy, 10_000)
        .with_affinity(Affinity::Fire)
        .with_dependency(DependencyType::Spell)
}

#[test]
fn reflected_spell_rewires_onto_the_caster() {
    let mut zone = zone_with(vec![fire_spell(10)], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    let mut mirror = fighter_at(2, 2, 100.0, 0.0);
    mirror.add_nra_shields(NraKind::Reflect, Affinity::Fire, 1);
    zone.insert_entity(mirror);

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));

    // The mirror took nothing; the caster ate its own spell.
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.hp), Some(5000));
    let caster_hp = zone.entity(EntityId(1)).map(|e| e.hp).unwrap();
    assert!(caster_hp < 5000, "caster hp {caster_hp}");

    // The shield charge was spent exactly once.
    assert_eq!(
        zone.entity(EntityId(2))
            .unwrap()
            .nra_shield_count(NraKind::Reflect, Affinity::Fire),
        0
    );

    let mut checked = false;
    for event in zone.events() {
        if let OutboundEvent::SkillReports { targets, .. } = event {
            let mirror_report = targets.iter().find(|t| t.entity == EntityId(2)).unwrap();
            assert_eq!(mirror_report.hit_reflect, Some(AvoidClass::Magical));
            assert!(mirror_report.hit_avoided);
            assert!(mirror_report.flags1.contains(HitFlags1::REFLECT_MAGIC));
            assert_eq!(mirror_report.damage1, 0);
            assert_eq!(mirror_report.damage1_type, DamageType::None);

            let caster_report = targets.iter().find(|t| t.entity == EntityId(1)).unwrap();
            assert!(caster_report.damage1 > 0);
            checked = true;
        }
    }
    assert!(checked);
}

#[test]
fn shields_are_consumed_before_natural_chances() {
    let mut zone = zone_with(vec![fire_spell(10), fire_spell(11)], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    let mut warded = fighter_at(2, 2, 100.0, 0.0);
    warded.add_nra_shields(NraKind::Null, Affinity::Fire, 1);
    warded.correct.set(CorrectValue::NullChance(Affinity::Fire), 100);
    zone.insert_entity(warded);

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));
    // First hit nulls by shield.
    assert_eq!(
        zone.entity(EntityId(2))
            .unwrap()
            .nra_shield_count(NraKind::Null, Affinity::Fire),
        0
    );
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.hp), Some(5000));

    // Second hit nulls by natural chance; no shield to consume.
    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(11)).targeting(EntityId(2)),
    ));
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.hp), Some(5000));
}

#[test]
fn aoe_reflect_sends_one_extra_hit_back() {
    let aoe = strike_skill(10).with_area(AreaType::SourceRadius, 300, 0);
    let mut zone = zone_with(vec![aoe], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 50.0, 0.0));
    let mut mirror = fighter_at(3, 2, 100.0, 0.0);
    mirror.add_nra_shields(NraKind::Reflect, Affinity::Strike, 1);
    zone.insert_entity(mirror);

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));

    // Primary target was hit; the mirror avoided; the source took the
    // reflected roll.
    assert!(zone.entity(EntityId(2)).map(|e| e.hp).unwrap() < 5000);
    assert_eq!(zone.entity(EntityId(3)).map(|e| e.hp), Some(5000));
    assert!(zone.entity(EntityId(1)).map(|e| e.hp).unwrap() < 5000);

    for event in zone.events() {
        if let OutboundEvent::SkillReports { targets, .. } = event {
            let mirror_report = targets.iter().find(|t| t.entity == EntityId(3)).unwrap();
            assert!(mirror_report.flags1.contains(HitFlags1::REFLECT_PHYS));
            assert!(targets.iter().any(|t| t.entity == EntityId(1) && t.damage1 > 0));
        }
    }
}

#[test]
fn projectile_is_dodged_at_flight_end() {
    let mut shot = SkillDefinition::new(SkillId(10))
        .with_formula(DamageFormula::Normal, 100, 0)
        .with_target(ValidType::Enemy, 10_000)
        .with_dependency(DependencyType::LongRange)
        .with_projectile(40);
    shot.action = ActionType::Shot;

    let mut dodge = SkillDefinition::new(SkillId(20)).with_charge(100);
    dodge.action = ActionType::Dodge;

    let mut zone = zone_with(vec![shot, dodge], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 2500.0, 0.0));

    // Fire at t=1s; flight is 2500 / (40*100) = 0.625 s.
    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));
    zone.drain_events();

    // The target charges a dodge during the flight window.
    advance_to(&mut zone, ServerTime::from_millis(1100));
    assert!(activate(&mut zone, EntityId(2), ActivateRequest::new(SkillId(20))));
    zone.drain_events();

    // Just before impact nothing has landed.
    advance_to(&mut zone, ServerTime::from_millis(1600));
    assert!(common::report_events(&zone).is_empty());

    advance_to(&mut zone, ServerTime::from_millis(1700));
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.hp), Some(5000));

    let mut dodged = false;
    for event in zone.events() {
        if let OutboundEvent::SkillReports { skill: SkillId(10), targets, .. } = event {
            let report = targets.iter().find(|t| t.entity == EntityId(2)).unwrap();
            assert!(report.flags1.contains(HitFlags1::DODGED));
            assert_eq!(report.damage1_type, DamageType::Miss);
            assert!(report.hit_avoided);
            dodged = true;
        }
    }
    assert!(dodged);

    // The dodge consumed its own activation.
    assert!(zone.entity(EntityId(2)).unwrap().activated.is_none());
}

#[test]
fn charged_counter_answers_a_melee_blow() {
    let mut counter = SkillDefinition::new(SkillId(20))
        .with_formula(DamageFormula::Counter, 100, 0)
        .with_charge(100);
    counter.action = ActionType::Counter;

    let mut zone = zone_with(vec![strike_skill(10), counter], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 100.0, 0.0));

    // The defender charges the counter first.
    assert!(activate(&mut zone, EntityId(2), ActivateRequest::new(SkillId(20))));
    advance_to(&mut zone, ServerTime::from_millis(1300));
    zone.drain_events();

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));

    // The blow was countered: the defender is untouched and the attacker
    // took the counter-strike.
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.hp), Some(5000));
    let attacker_hp = zone.entity(EntityId(1)).map(|e| e.hp).unwrap();
    assert!(attacker_hp < 5000, "attacker hp {attacker_hp}");

    // The counter consumed its activation.
    assert!(zone.entity(EntityId(2)).unwrap().activated.is_none());

    let countered = zone.events().iter().any(|e| {
        matches!(
            e,
            OutboundEvent::SkillReports { skill: SkillId(10), targets, .. }
                if targets.iter().any(|t| {
                    t.entity == EntityId(2)
                        && t.hit_avoided
                        && t.flags1.contains(HitFlags1::GUARDED)
                })
        )
    });
    assert!(countered);
}

#[test]
fn knockback_window_blocks_repeat_displacement() {
    let shove = strike_skill(10).with_knockback(1.0, KnockbackType::AwayFromSource, 200);
    let shove2 = strike_skill(11).with_knockback(1.0, KnockbackType::AwayFromSource, 200);
    let mut zone = zone_with(vec![shove, shove2], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 100.0, 0.0));

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));
    let pos_after_first = zone.entity(EntityId(2)).map(|e| e.pos.x).unwrap();
    assert!(pos_after_first > 100.0);
    let first_knocked = zone.events().iter().any(|e| {
        matches!(
            e,
            OutboundEvent::SkillReports { targets, .. }
                if targets.iter().any(|t| t.flags1.contains(HitFlags1::KNOCKBACK))
        )
    });
    assert!(first_knocked);
    zone.drain_events();

    // Half a second later the window still holds.
    advance_to(&mut zone, ServerTime::from_millis(1500));
    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(11)).targeting(EntityId(2)),
    ));
    assert_eq!(zone.entity(EntityId(2)).map(|e| e.pos.x), Some(pos_after_first));
    let second_knocked = zone.events().iter().any(|e| {
        matches!(
            e,
            OutboundEvent::SkillReports { targets, .. }
                if targets.iter().any(|t| t.flags1.contains(HitFlags1::KNOCKBACK))
        )
    });
    assert!(!second_knocked);
}

#[test]
fn hit_stun_deadline_never_shrinks_across_a_burst() {
    let mut heavy = strike_skill(10);
    heavy.stiffness_ms = 800;
    let mut light = strike_skill(11);
    light.stiffness_ms = 50;
    let mut zone = zone_with(vec![heavy, light], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 100.0, 0.0));

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));
    let deadline_after_heavy = zone
        .entity(EntityId(2))
        .unwrap()
        .status_time(waza::entity::StatusTimeKind::HitStun);

    advance_to(&mut zone, ServerTime::from_millis(1100));
    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(11)).targeting(EntityId(2)),
    ));
    let deadline_after_light = zone
        .entity(EntityId(2))
        .unwrap()
        .status_time(waza::entity::StatusTimeKind::HitStun);
    assert!(deadline_after_light >= deadline_after_heavy);
}

#[test]
fn skill_statuses_land_and_report() {
    let poison = StatusDefinition::new(StatusId(30)).with_duration(8000);
    let venom_strike = strike_skill(10)
        .with_status(AddStatusEntry::new(StatusId(30), 1, 2, 100));
    let mut zone = zone_with(vec![venom_strike], vec![poison]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    zone.insert_entity(fighter_at(2, 2, 100.0, 0.0));

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));

    assert!(zone.entity(EntityId(2)).unwrap().has_status(StatusId(30)));
    let reported = zone.events().iter().any(|e| {
        matches!(
            e,
            OutboundEvent::SkillReports { targets, .. }
                if targets.iter().any(|t| !t.added_statuses.is_empty())
        )
    });
    assert!(reported);
}

#[test]
fn weakness_is_flagged_on_the_report() {
    let mut zone = zone_with(vec![fire_spell(10)], vec![]);
    zone.insert_entity(fighter_at(1, 1, 0.0, 0.0));
    let mut weak = fighter_at(2, 2, 100.0, 0.0);
    weak.correct.set(CorrectValue::Resist(Affinity::Fire), -50);
    zone.insert_entity(weak);

    assert!(activate(
        &mut zone,
        EntityId(1),
        ActivateRequest::new(SkillId(10)).targeting(EntityId(2)),
    ));

    let flagged = zone.events().iter().any(|e| {
        matches!(
            e,
            OutboundEvent::SkillReports { targets, .. }
                if targets.iter().any(|t| t.flags1.contains(HitFlags1::WEAKPOINT))
        )
    });
    assert!(flagged);
}
