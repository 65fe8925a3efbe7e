//! The skill state machine.
//!
//! Entry points mirror the inbound protocol: activate, retarget, execute,
//! cancel, and the saved-switch reactivation. Everything in between
//! (charge timers, cost payment, avoidance, counters, damage fan-out,
//! status application, completion) runs through the internal pipeline:
//!
//! activate → (charge) → execute → costs → begin (primary avoidance,
//! reflect rewire, defender checks) → complete (projectile/hit delay) →
//! deliver (area gather, damage, statuses, knockback) → finalize
//! (defensive reactions, use rotation or retirement).
//!
//! Every scheduled task re-validates the ability identity and execute
//! count before acting, so cancelled or rolled-over abilities never see
//! stale callbacks.

use std::sync::Arc;

use tracing::debug;

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::cost::{self, SkillCosts};
use crate::damage::{self, CritLevel, NormalDamageInput};
use crate::definition::{
    ActionType, ActivationType, AdjustRestrict, DamageFormula, DependencyType, SkillCategory,
    SkillDefinition, WeaponType,
};
use crate::entity::{ActivatedAbility, EntityState, StatusTimeKind};
use crate::events::{
    OutboundEvent, SkillCompleteMode, SkillError, TargetReport, batch_skill_reports,
};
use crate::hit;
use crate::ids::{ActivationId, EntityId, ItemId, ServerTime, SkillId};
use crate::nra::{NraKind, resolve_nra};
use crate::processing::{
    AvoidClass, CounterReference, DamageType, DefensiveReaction, EffectCancelFlags, HitFlags1,
    HitFlags2, ProcessingSkill, SkillExecutionContext, SkillTargetResult,
};
use crate::scheduler::Task;
use crate::scripts::{HookContext, check_hook_result, functions};
use crate::status::{self, StatusContext};
use crate::target as targeting;
use crate::tokusei::{AspectType, CalcSide, RecalcTrigger};
use crate::world::{SideEffect, Zone};

/// Stagger added ahead of delayed hit processing for non-fast-tracked
/// executions.
const EXECUTION_STAGGER_US: u64 = 500_000;

/// Inbound activation request.
#[derive(Debug, Clone, Default)]
pub struct ActivateRequest {
    pub skill: SkillId,
    /// Item that triggered the activation, if any.
    pub activation_item: Option<ItemId>,
    pub target: Option<EntityId>,
    pub fusion_demons: Vec<EntityId>,
    /// Instant activations may bypass lockout/knockback gating.
    pub ignore_availability: bool,
}

impl ActivateRequest {
    pub fn new(skill: SkillId) -> Self {
        Self {
            skill,
            ..Default::default()
        }
    }

    pub fn targeting(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }
}

// ============================================================================
// Activation
// ============================================================================

/// Activate a skill for `source`. Returns whether an activation was
/// registered (instant skills also execute before returning).
pub fn activate(zone: &mut Zone, source: EntityId, request: ActivateRequest) -> bool {
    let now = zone.now();
    let defs = Arc::clone(&zone.definitions);
    let Ok(skill) = defs.skill(request.skill) else {
        debug!(skill = request.skill.0, "activation for unknown skill");
        return false;
    };

    let Some(entity) = zone.entity(source) else {
        return false;
    };
    if !entity.is_alive() {
        return false;
    }

    // Precondition gates, checked in order.
    if entity.cooldown_active(skill.cooldown_group, now) {
        send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::CoolingDown);
        return false;
    }

    let bypass_windows = skill.activation == ActivationType::Instant && request.ignore_availability;
    if !bypass_windows {
        let entity = match zone.entity(source) {
            Some(e) => e,
            None => return false,
        };
        if entity.in_status_window(StatusTimeKind::Lockout, now)
            || entity.in_status_window(StatusTimeKind::Knockback, now)
        {
            send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::GenericUse);
            return false;
        }
    }

    if let Some(entity) = zone.entity(source)
        && skill_restricted(skill, entity)
    {
        send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::RestrictedUse);
        return false;
    }

    if zone.skill_blacklist.contains(&skill.id) {
        send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::ZoneInvalid);
        return false;
    }

    if zone
        .tokusei
        .aspect_value_exists(source, AspectType::SkillLock, skill.id.0 as i32)
    {
        send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::ConditionRestrict);
        return false;
    }

    if skill.function_id == Some(functions::WARP)
        && zone.warp_disabled
        && !zone.warp_whitelist.contains(&skill.id)
    {
        send_failure(zone, source, skill, ActivationId::INSTANT, SkillError::LocationRestrict);
        return false;
    }

    // An existing activation blocks or yields.
    if let Some(existing) = zone.entity(source).and_then(|e| e.activated.as_ref()) {
        if existing.pending_execution() {
            // Mid-execution activations are refused without any event.
            return false;
        }
        let existing_id = existing.activation_id;
        cancel(zone, source, existing_id, 0);
    }

    // Instants with no explicit target default to self.
    let mut target = request.target;
    if target.is_none() && skill.activation == ActivationType::Instant && !skill.requires_target()
    {
        target = Some(source);
    }

    let activation_id = if skill.activation == ActivationType::Instant {
        ActivationId::INSTANT
    } else {
        match zone.entity_mut(source) {
            Some(e) => e.next_activation_id(),
            None => return false,
        }
    };

    let mut ability = ActivatedAbility::new(activation_id, skill.id, now);
    ability.activation_item = request.activation_item;
    ability.target = target;
    ability.fusion_demons = request.fusion_demons.clone();

    // Scripted activation gate.
    if let Some(function) = skill.function_id {
        let scripts = Arc::clone(&zone.scripts);
        if let Some(logic) = scripts.get(function)
            && logic.settings().validate_activation
        {
            let result = {
                let Some(entity) = zone.entity(source) else {
                    return false;
                };
                let ctx = HookContext {
                    source: entity,
                    skill,
                    config: &zone.config,
                    tokusei: &zone.tokusei,
                    now,
                    target,
                };
                logic.validate_activation(&ctx)
            };
            if let Err(silent) = check_hook_result(function, "validateActivation", result) {
                if !silent {
                    send_failure(zone, source, skill, activation_id, SkillError::ActivationFailure);
                }
                return false;
            }
        }
    }

    // Use count: base plus passive additions unless pinned.
    let mut max_uses = skill.base_use_count as i32;
    if !skill.adjust_restrict.contains(AdjustRestrict::FIXED_STACK) {
        max_uses += zone.tokusei.aspect_sum(source, AspectType::SkillStackAdjust);
    }
    ability.max_use_count = max_uses.clamp(1, u8::MAX as i32) as u8;

    ability.charged_time = charged_time(zone, source, skill, &request, now);
    let charged_time = ability.charged_time;

    let (charge_speed, charge_complete_speed) = {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        charge_move_speeds(entity)
    };

    let Some(entity) = zone.entity_mut(source) else {
        return false;
    };
    entity.extend_status_time(StatusTimeKind::Charging, charged_time);
    entity.activated = Some(ability);

    zone.broadcast(OutboundEvent::SkillActivated {
        source,
        skill: skill.id,
        activation_id,
        charged_time,
        max_use_count: max_uses.clamp(1, u8::MAX as i32) as u8,
        category: skill.category,
        charge_move_speed: charge_speed,
        charge_complete_move_speed: charge_complete_speed,
    });

    // Immediate execution or scheduled follow-ups.
    let immediate = skill.activation == ActivationType::Instant
        || (skill.activation.auto_executes() && charged_time <= now);
    if immediate {
        let mut ctx = SkillExecutionContext::fast_tracked();
        return execute_with_context(zone, source, activation_id, target, &mut ctx);
    }

    if skill.activation.auto_executes() {
        zone.scheduler.schedule(
            charged_time,
            Task::ChargeComplete {
                entity: source,
                activation_id,
                execute_count: 0,
            },
        );
    }
    if skill.auto_cancel_ms > 0 {
        let deadline = charged_time.max(now).add_millis(skill.auto_cancel_ms as u64);
        zone.scheduler.schedule(
            deadline,
            Task::AutoCancel {
                entity: source,
                activation_id,
                execute_count: 0,
            },
        );
    }
    true
}

/// Charge completion deadline for a new activation.
fn charged_time(
    zone: &Zone,
    source: EntityId,
    skill: &SkillDefinition,
    request: &ActivateRequest,
    now: ServerTime,
) -> ServerTime {
    if skill.charge_time_ms == 0 {
        return now;
    }
    let fixed = skill.adjust_restrict.contains(AdjustRestrict::FIXED_CHARGE)
        || skill.function_id == Some(functions::SUMMON_DEMON)
        || !request.fusion_demons.is_empty();
    if fixed {
        return now.add_millis(skill.charge_time_ms as u64);
    }

    let chant = zone
        .entity(source)
        .map(|e| e.correct.rate(CorrectValue::ChantTime))
        .unwrap_or(1.0);
    let reduce = zone
        .tokusei
        .aspect_sum(source, AspectType::ChargeReduce)
        .clamp(0, 100);
    let effective_ms =
        skill.charge_time_ms as f64 * chant as f64 * (100 - reduce) as f64 / 100.0;
    now.add_micros((effective_ms * 1000.0).max(0.0) as u64)
}

/// Static use restrictions: weapon, alignment, gender, level.
fn skill_restricted(skill: &SkillDefinition, entity: &EntityState) -> bool {
    let restriction = &skill.restriction;
    if let Some(weapon) = restriction.weapon
        && weapon != WeaponType::None
        && entity.weapon != weapon
    {
        return true;
    }
    if !restriction.lnc.allows(entity.lnc) {
        return true;
    }
    if let Some(gender) = restriction.gender
        && entity.gender != gender
    {
        return true;
    }
    if entity.level < restriction.min_level {
        return true;
    }
    false
}

/// Movement speeds reported with the activation.
fn charge_move_speeds(entity: &EntityState) -> (f32, f32) {
    let speed = entity.correct.value(CorrectValue::Speed) as f32;
    (speed / 2.0, speed)
}

// ============================================================================
// Retarget
// ============================================================================

/// Update the pending target of a charged activation.
pub fn retarget(zone: &mut Zone, source: EntityId, new_target: EntityId) -> bool {
    let Some(entity) = zone.entity_mut(source) else {
        return false;
    };
    let Some(ability) = entity.activated.as_mut() else {
        return false;
    };
    if ability.pending_execution() || ability.error.is_some() {
        return false;
    }
    ability.target = Some(new_target);
    true
}

// ============================================================================
// Execution
// ============================================================================

/// Client- or scheduler-driven execution of an activated ability.
pub fn execute(
    zone: &mut Zone,
    source: EntityId,
    activation_id: ActivationId,
    target: Option<EntityId>,
) -> bool {
    let mut ctx = SkillExecutionContext::new();
    execute_with_context(zone, source, activation_id, target, &mut ctx)
}

pub(crate) fn execute_with_context(
    zone: &mut Zone,
    source: EntityId,
    activation_id: ActivationId,
    target: Option<EntityId>,
    ctx: &mut SkillExecutionContext,
) -> bool {
    let now = zone.now();
    let defs = Arc::clone(&zone.definitions);

    let (skill_id, charged_time, executing) = {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        let Some(ability) = entity.activated_with_id(activation_id) else {
            debug!(source = source.0, activation = activation_id.0, "execute for unknown activation");
            return false;
        };
        (ability.skill, ability.charged_time, ability.executing)
    };
    if executing {
        return false;
    }

    let Ok(skill) = defs.skill(skill_id) else {
        return false;
    };

    // Charged skills cannot fire before the charge completes.
    if charged_time > now {
        send_failure(zone, source, skill, activation_id, SkillError::ActionRetry);
        return false;
    }

    {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        if !entity.is_alive() {
            fail_execution(zone, source, skill, activation_id, SkillError::Generic);
            return false;
        }
        if entity.mounted {
            fail_execution(zone, source, skill, activation_id, SkillError::RestrictedUse);
            return false;
        }
    }

    // Adopt the freshest target.
    if let Some(target) = target
        && let Some(entity) = zone.entity_mut(source)
        && let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
    {
        ability.target = Some(target);
    }
    let target = zone
        .entity(source)
        .and_then(|e| e.activated_with_id(activation_id))
        .and_then(|a| a.target);

    // Scripted execution gate.
    if let Some(function) = skill.function_id {
        let scripts = Arc::clone(&zone.scripts);
        if let Some(logic) = scripts.get(function)
            && logic.settings().validate_execution
        {
            let result = {
                let Some(entity) = zone.entity(source) else {
                    return false;
                };
                let hook_ctx = HookContext {
                    source: entity,
                    skill,
                    config: &zone.config,
                    tokusei: &zone.tokusei,
                    now,
                    target,
                };
                logic.validate_execution(&hook_ctx)
            };
            if let Err(silent) = check_hook_result(function, "validateExecution", result) {
                let error = if silent { SkillError::SilentFail } else { SkillError::GenericUse };
                fail_execution(zone, source, skill, activation_id, error);
                return false;
            }
        }
    }

    // Target validation.
    let primary = if skill.requires_target() {
        let Some(target) = target else {
            fail_execution(zone, source, skill, activation_id, SkillError::TargetInvalid);
            return false;
        };
        if let Err(error) = targeting::validate_primary_target(zone, source, target, skill) {
            fail_execution(zone, source, skill, activation_id, error);
            return false;
        }
        Some(target)
    } else {
        target.or(Some(source))
    };

    // Costs: determine, script-adjust, record.
    let item_trigger = zone
        .entity(source)
        .and_then(|e| e.activated_with_id(activation_id))
        .and_then(|a| a.activation_item);
    let mut costs = {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        match cost::determine_costs(skill, entity, &zone.tokusei, &defs, &zone.config, item_trigger)
        {
            Ok(costs) => costs,
            Err(error) => {
                fail_execution(zone, source, skill, activation_id, error);
                return false;
            }
        }
    };

    if let Some(function) = skill.function_id {
        let scripts = Arc::clone(&zone.scripts);
        if let Some(logic) = scripts.get(function)
            && logic.settings().adjust_cost
        {
            let result = {
                let Some(entity) = zone.entity(source) else {
                    return false;
                };
                let hook_ctx = HookContext {
                    source: entity,
                    skill,
                    config: &zone.config,
                    tokusei: &zone.tokusei,
                    now,
                    target: primary,
                };
                logic.adjust_cost(&hook_ctx, &mut costs)
            };
            if check_hook_result(function, "adjustCost", result).is_err() {
                // A script rejection clears costs and fails the use.
                costs.clear();
                fail_execution(zone, source, skill, activation_id, SkillError::GenericCost);
                return false;
            }
        }
        // Re-plan decomposition for costs the script added.
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        if let Err(error) = cost::plan_decompression(&mut costs, entity, &defs, &zone.config) {
            fail_execution(zone, source, skill, activation_id, error);
            return false;
        }
    }

    {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        if let Err(error) = cost::can_pay(&costs, entity, &defs, now) {
            fail_execution(zone, source, skill, activation_id, error);
            return false;
        }
    }

    // Commit the execution request.
    {
        let Some(entity) = zone.entity_mut(source) else {
            return false;
        };
        let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
        else {
            return false;
        };
        ability.execution_request_time = now;
        ability.executing = true;
        ability.target = primary;
        cost::record_costs(ability, &costs);
    }

    match skill.category {
        SkillCategory::Passive => {
            fail_execution(zone, source, skill, activation_id, SkillError::GenericUse);
            false
        }
        SkillCategory::Switch => execute_switch(zone, source, skill, activation_id, &costs),
        SkillCategory::Active => {
            // Pay before the pipeline runs; failures no longer roll back.
            {
                let Some(entity) = zone.entity_mut(source) else {
                    return false;
                };
                if let Err(error) = cost::pay_costs(&costs, entity, &defs, now) {
                    fail_execution(zone, source, skill, activation_id, error);
                    return false;
                }
            }

            // A bound operation replaces the normal path.
            if let Some(function) = skill.function_id {
                let scripts = Arc::clone(&zone.scripts);
                if let Some(logic) = scripts.get(function)
                    && logic.settings().replaces_execution
                {
                    return match logic.execute_operation(zone, source, activation_id) {
                        Ok(()) => {
                            finalize_simple_execution(zone, source, skill, activation_id);
                            true
                        }
                        Err(error) => {
                            fail_execution(zone, source, skill, activation_id, error);
                            false
                        }
                    };
                }
            }

            execute_normal_skill(zone, source, skill, activation_id, primary, costs, ctx)
        }
    }
}

/// Toggle a switch skill on or off.
fn execute_switch(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    costs: &SkillCosts,
) -> bool {
    let defs = Arc::clone(&zone.definitions);
    let now = zone.now();
    let save = zone.config.save_switch_skills;

    let turning_on = {
        let Some(entity) = zone.entity(source) else {
            return false;
        };
        !entity.switch_active.contains(&skill.id)
    };

    if turning_on {
        let Some(entity) = zone.entity_mut(source) else {
            return false;
        };
        if cost::pay_costs(costs, entity, &defs, now).is_err() {
            fail_execution(zone, source, skill, activation_id, SkillError::GenericCost);
            return false;
        }
        entity.switch_active.insert(skill.id);
    } else if let Some(entity) = zone.entity_mut(source) {
        entity.switch_active.remove(&skill.id);
    }

    zone.broadcast(OutboundEvent::SkillSwitch {
        source,
        skill: skill.id,
        on: turning_on,
    });
    if save {
        zone.push_side_effect(SideEffect::SaveSwitchSkill {
            entity: source,
            skill: skill.id,
            on: turning_on,
        });
    }
    zone.push_side_effect(SideEffect::RequestRecalc {
        entity: source,
        triggers: vec![RecalcTrigger::SkillHit],
    });

    finalize_simple_execution(zone, source, skill, activation_id);
    true
}

// ============================================================================
// Normal skill pipeline
// ============================================================================

fn execute_normal_skill(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    primary: Option<EntityId>,
    costs: SkillCosts,
    ctx: &mut SkillExecutionContext,
) -> bool {
    let now = zone.now();

    let mut pskill = build_processing_skill(zone, source, skill, activation_id, primary, costs);
    begin_skill_execution(zone, skill, &mut pskill, ctx);
    if ctx.fizzle {
        hit_cancel(zone, source, skill, activation_id);
        return false;
    }

    {
        let Some(entity) = zone.entity_mut(source) else {
            return false;
        };
        if let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
        {
            ability.execution_time = now;
        }
        if skill.stiffness_ms > 0 {
            let lockout = now.add_millis(skill.stiffness_ms as u64);
            entity.extend_status_time(StatusTimeKind::Lockout, lockout);
            if let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
            {
                ability.lock_out_time = lockout;
            }
        }
    }

    // Colliding with a target still inside its hit window staggers the
    // remainder of the pipeline.
    let colliding = zone.config.iframes_enabled
        && pskill
            .primary_target
            .and_then(|id| zone.entity(id))
            .is_some_and(|t| t.in_status_window(StatusTimeKind::Hit, now));

    let mut complete_time = now;
    if !ctx.fast_track && (skill.complete_delay_ms > 0 || skill.is_projectile() || colliding) {
        complete_time = complete_time.add_micros(EXECUTION_STAGGER_US);
    }
    complete_time = complete_time.add_millis(skill.complete_delay_ms as u64);

    let execute_count = zone
        .entity(source)
        .and_then(|e| e.activated_with_id(activation_id))
        .map(|a| a.execute_count)
        .unwrap_or(0);

    if complete_time > now {
        if let Some(entity) = zone.entity_mut(source)
            && let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
        {
            ability.hit_pending = true;
        }
        pskill.pending_defenses = std::mem::take(&mut ctx.pending_defenses);
        zone.put_processing(pskill);
        zone.scheduler.schedule(
            complete_time,
            Task::CompleteExecution {
                entity: source,
                activation_id,
                execute_count,
            },
        );
        true
    } else {
        pskill.pending_defenses = std::mem::take(&mut ctx.pending_defenses);
        zone.put_processing(pskill);
        complete_skill_execution(zone, source, activation_id)
    }
}

/// Derive the per-hit scratch state from the activated ability.
fn build_processing_skill(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    primary: Option<EntityId>,
    costs: SkillCosts,
) -> ProcessingSkill {
    let (weapon_affinity, weapon, expertise_rank, item, fusion_demons, is_player) = zone
        .entity(source)
        .map(|e| {
            let ability = e.activated_with_id(activation_id);
            (
                e.weapon_affinity,
                e.weapon,
                e.expertise_rank(skill.expertise_id),
                ability.and_then(|a| a.activation_item),
                ability.map(|a| a.fusion_demons.clone()).unwrap_or_default(),
                e.is_player,
            )
        })
        .unwrap_or((Affinity::Strike, WeaponType::None, 0, None, Vec::new(), false));

    let base_affinity = skill.affinity;
    let effective_affinity = if base_affinity == Affinity::Weapon {
        weapon_affinity
    } else {
        base_affinity
    };
    let effective_dependency = if skill.dependency == DependencyType::Weapon {
        match weapon {
            WeaponType::Gun => DependencyType::LongRange,
            _ => DependencyType::CloseRange,
        }
    } else {
        skill.dependency
    };

    let pvp = zone.pvp
        && is_player
        && primary
            .and_then(|id| zone.entity(id))
            .is_some_and(|t| t.is_player);

    let can_avoid = !skill.formula.is_heal()
        && skill.formula.deals_damage()
        && skill.target != crate::definition::ValidType::Ally;

    ProcessingSkill {
        skill: skill.id,
        activation_id,
        source,
        effective_source: source,
        primary_target: primary,
        effective_affinity,
        base_affinity,
        effective_dependency,
        expertise_rank,
        absolute_damage: None,
        item,
        is_projectile: skill.is_projectile(),
        can_avoid,
        nulled: false,
        reflected: false,
        absorbed: false,
        primary_shield_consumed: false,
        hard_strike: skill.knockback_modifier >= 1.0 && skill.knockback_distance > 0,
        pvp,
        rush_start: None,
        rush_time: ServerTime::ZERO,
        modifier1: skill.modifier1,
        modifier2: skill.modifier2,
        costs,
        fusion_demons,
        targets: Vec::new(),
        calc_cache: crate::tokusei::CalcStateCache::new(),
        countered: None,
        pending_defenses: Vec::new(),
    }
}

/// Primary avoidance, reflect rewiring, defender checks, rush movement,
/// and the executed event.
fn begin_skill_execution(
    zone: &mut Zone,
    skill: &SkillDefinition,
    pskill: &mut ProcessingSkill,
    ctx: &mut SkillExecutionContext,
) {
    let now = zone.now();
    let source = pskill.source;

    // Primary avoidance happens before anything else.
    if pskill.can_avoid
        && let Some(primary) = pskill.primary_target
        && primary != source
    {
        let target_calc = defense_calc(zone, pskill, primary);
        let outcome = {
            let rng = &mut zone.rng;
            match zone.entities.get_mut(&primary) {
                Some(target) => resolve_nra(
                    target,
                    &target_calc,
                    rng,
                    pskill.effective_affinity,
                    pskill.base_affinity,
                    pskill.effective_dependency,
                    pskill.pvp,
                ),
                None => Default::default(),
            }
        };
        pskill.primary_shield_consumed = outcome.shield_consumed;
        match outcome.kind {
            Some(NraKind::Null) => pskill.nulled = true,
            Some(NraKind::Reflect) => pskill.reflected = true,
            Some(NraKind::Absorb) => pskill.absorbed = true,
            None => {}
        }
        if outcome.auto_protected {
            // Report entry carries the protection; damage floors later.
            let mut result = SkillTargetResult::primary(primary);
            result.flags1.insert(HitFlags1::PROTECT);
            pskill.targets.push(result);
        } else if let Some(kind) = outcome.kind {
            let barrier = zone.tokusei.aspect_sum(primary, AspectType::Barrier) > 0;
            let mut result = SkillTargetResult::primary(primary);
            mark_avoidance(&mut result, kind, pskill.effective_dependency, outcome.affinity, barrier);
            result.shield_consumed = outcome.shield_consumed;
            pskill.targets.push(result);

            // Reflect rewires the hit unless the area stays on the source.
            if kind == NraKind::Reflect && !skill.area.is_source_centric() {
                pskill.effective_source = primary;
                pskill.primary_target = Some(source);
            }
        }

        // Defender reactions only trigger on clean hits.
        if outcome.kind.is_none() && !outcome.auto_protected {
            check_defender(zone, skill, pskill, ctx, now);
        }
    }

    // Rush actions close the distance at execution time.
    if skill.action == ActionType::Rush
        && let Some(primary) = pskill.primary_target
    {
        let target_pos = zone.entity(primary).map(|t| (t.pos, t.hitbox));
        if let Some((tpos, thitbox)) = target_pos
            && let Some(entity) = zone.entity_mut(source)
        {
            pskill.rush_start = Some((entity.pos.x, entity.pos.y));
            pskill.rush_time = now;
            let heading = entity.pos.heading_to(&tpos);
            let stop = entity.hitbox + thitbox;
            entity.pos.x = tpos.x - heading.cos() * stop;
            entity.pos.y = tpos.y - heading.sin() * stop;
            entity.pos.rot = heading;
            entity.pos.t = now;
        }
    }

    let (cooldown_time, lock_out_time) = prospective_times(zone, source, skill, now);
    zone.broadcast(OutboundEvent::SkillExecuted {
        source,
        skill: skill.id,
        activation_id: pskill.activation_id,
        target: pskill.primary_target,
        cooldown_time,
        lock_out_time,
        hp_cost: pskill.costs.hp,
        mp_cost: pskill.costs.mp,
        rush_start: pskill.rush_start,
        hard_strike: pskill.hard_strike,
    });
}

/// Check the primary target for a charged defensive reaction.
fn check_defender(
    zone: &mut Zone,
    skill: &SkillDefinition,
    pskill: &mut ProcessingSkill,
    ctx: &mut SkillExecutionContext,
    at: ServerTime,
) {
    let Some(primary) = pskill.primary_target else {
        return;
    };
    // Begin-time and hit-time checks must not stack the same reaction.
    if ctx.pending_defenses.iter().any(|r| r.defender == primary) {
        return;
    }
    let defs = Arc::clone(&zone.definitions);

    let defense = zone.entity(primary).and_then(|defender| {
        let ability = defender.activated.as_ref()?;
        if ability.pending_execution() || ability.charged_time > at {
            return None;
        }
        let defense_skill = defs.skill(ability.skill).ok()?;
        let applies = match defense_skill.action {
            ActionType::Counter => skill.action.is_counterable(),
            ActionType::Dodge => skill.action.is_dodgeable(),
            ActionType::Guard => skill.action.is_guardable(),
            _ => false,
        };
        applies.then_some(DefensiveReaction {
            defender: primary,
            skill: ability.skill,
            activation_id: ability.activation_id,
        })
    });

    let Some(reaction) = defense else {
        return;
    };
    let Ok(defense_skill) = defs.skill(reaction.skill) else {
        return;
    };

    if pskill.target_mut(primary).is_none() {
        pskill.targets.push(SkillTargetResult::primary(primary));
    }

    match defense_skill.action {
        ActionType::Dodge => {
            let Some(result) = pskill.target_mut(primary) else {
                return;
            };
            result.flags1.insert(HitFlags1::DODGED);
            result.hit_avoided = true;
            result.damage1_type = DamageType::Miss;
            ctx.pending_defenses.push(reaction);
        }
        ActionType::Guard => {
            let modifier = 1.0 + defense_skill.modifier1 as f32 / 100.0;
            let Some(result) = pskill.target_mut(primary) else {
                return;
            };
            result.flags1.insert(HitFlags1::GUARDED);
            result.guard_modifier = modifier;
            ctx.pending_defenses.push(reaction);
        }
        ActionType::Counter => {
            // The countered blow is avoided and answered after the hit.
            let offense = {
                let calc = offense_calc(zone, pskill, primary);
                damage::offense_value(&calc, pskill.effective_dependency)
            };
            let source = pskill.source;
            let skill_id = pskill.skill;
            let Some(result) = pskill.target_mut(primary) else {
                return;
            };
            result.flags1.insert(HitFlags1::GUARDED);
            result.hit_avoided = true;
            result.damage1_type = DamageType::Miss;
            pskill.countered = Some(CounterReference {
                entity: source,
                skill: skill_id,
                offense,
            });
            ctx.pending_defenses.push(reaction);
        }
        _ => {}
    }
}

/// Flag an avoided hit on a target result.
fn mark_avoidance(
    result: &mut SkillTargetResult,
    kind: NraKind,
    dependency: DependencyType,
    affinity: Option<Affinity>,
    barrier: bool,
) {
    let class = match dependency.class_affinity() {
        Some(Affinity::Magic) => AvoidClass::Magical,
        _ => AvoidClass::Physical,
    };
    result.avoid_affinity = affinity;
    match kind {
        NraKind::Null => {
            result.hit_avoided = true;
            result.hit_null = Some(class);
            result.damage1_type = DamageType::None;
            if barrier {
                result.flags1.insert(HitFlags1::BARRIER);
            } else {
                result.flags1.insert(match class {
                    AvoidClass::Physical => HitFlags1::BLOCK_PHYS,
                    AvoidClass::Magical => HitFlags1::BLOCK_MAGIC,
                });
            }
        }
        NraKind::Reflect => {
            result.hit_avoided = true;
            result.hit_reflect = Some(class);
            result.damage1_type = DamageType::None;
            result.flags1.insert(match class {
                AvoidClass::Physical => HitFlags1::REFLECT_PHYS,
                AvoidClass::Magical => HitFlags1::REFLECT_MAGIC,
            });
        }
        NraKind::Absorb => {
            result.hit_absorb = true;
            result.flags1.insert(HitFlags1::ABSORB);
        }
    }
}

/// Prospective cooldown/lockout deadlines reported with execution.
fn prospective_times(
    zone: &Zone,
    source: EntityId,
    skill: &SkillDefinition,
    now: ServerTime,
) -> (ServerTime, ServerTime) {
    let cooldown = cooldown_deadline(zone, source, skill, now);
    let lockout = if skill.stiffness_ms > 0 {
        now.add_millis(skill.stiffness_ms as u64)
    } else {
        ServerTime::ZERO
    };
    (cooldown, lockout)
}

fn cooldown_deadline(
    zone: &Zone,
    source: EntityId,
    skill: &SkillDefinition,
    now: ServerTime,
) -> ServerTime {
    if skill.cooldown_time_ms == 0 {
        return ServerTime::ZERO;
    }
    let rate = if skill.adjust_restrict.contains(AdjustRestrict::FIXED_COOLDOWN) {
        1.0
    } else {
        zone.entity(source)
            .map(|e| e.correct.rate(CorrectValue::CooldownTime))
            .unwrap_or(1.0)
    };
    let micros = (skill.cooldown_time_ms as f64 * 1000.0 * rate as f64).max(0.0) as u64;
    now.add_micros(micros)
}

/// Hit-phase entry: projectile flight and authored hit delays.
pub(crate) fn complete_skill_execution(
    zone: &mut Zone,
    source: EntityId,
    activation_id: ActivationId,
) -> bool {
    let now = zone.now();
    let defs = Arc::clone(&zone.definitions);
    let Some(pskill) = zone.processing_for(source) else {
        return false;
    };
    let skill_id = pskill.skill;
    let Ok(skill) = defs.skill(skill_id) else {
        return false;
    };

    let execute_count = zone
        .entity(source)
        .and_then(|e| e.activated_with_id(activation_id))
        .map(|a| a.execute_count)
        .unwrap_or(0);

    let hit_time = if skill.is_projectile() {
        let distance = match (
            zone.entity(source),
            zone.processing_for(source).and_then(|p| p.primary_target).and_then(|id| zone.entity(id)),
        ) {
            (Some(s), Some(t)) => {
                (s.pos.distance_to(&t.pos) - s.hitbox - t.hitbox).max(0.0)
            }
            _ => 0.0,
        };
        let travel_us =
            ((distance / (skill.projectile_speed.max(1) as f32 * 100.0)) * 1_000_000.0) as u64;
        now.add_micros(travel_us.max(1))
    } else if skill.hit_delay_ms > 0 {
        now.add_millis(skill.hit_delay_ms as u64)
    } else {
        now
    };

    if hit_time > now {
        if let Some(entity) = zone.entity_mut(source)
            && let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
        {
            ability.hit_pending = true;
            ability.hit_time = hit_time;
        }
        zone.scheduler.schedule(
            hit_time,
            Task::DeliverHit {
                entity: source,
                activation_id,
                execute_count,
            },
        );
        true
    } else {
        deliver_hit(zone, source, activation_id)
    }
}

/// The hit lands: re-checks, fan-out, damage, statuses, completion.
pub(crate) fn deliver_hit(zone: &mut Zone, source: EntityId, activation_id: ActivationId) -> bool {
    let defs = Arc::clone(&zone.definitions);
    let Some(mut pskill) = zone.take_processing(source) else {
        return false;
    };
    let Ok(skill) = defs.skill(pskill.skill).cloned() else {
        return false;
    };
    let mut ctx = SkillExecutionContext::new();
    ctx.pending_defenses = std::mem::take(&mut pskill.pending_defenses);

    let delivered = process_skill_result(zone, &skill, &mut pskill, &mut ctx);
    if !delivered {
        hit_cancel(zone, source, &skill, activation_id);
        return false;
    }

    finalize_skill_execution(zone, &mut pskill, &mut ctx);
    finalize_skill(zone, source, &skill, activation_id);
    true
}

/// Gather, resolve, and apply one hit. Returns false on a fizzle.
fn process_skill_result(
    zone: &mut Zone,
    skill: &SkillDefinition,
    pskill: &mut ProcessingSkill,
    ctx: &mut SkillExecutionContext,
) -> bool {
    let now = zone.now();
    let source = pskill.source;

    // Runtime race: the source or primary target left the zone.
    if zone.entity(source).is_none() {
        return false;
    }
    if let Some(primary) = pskill.primary_target
        && zone.entity(primary).is_none()
    {
        return false;
    }

    // Projectiles re-check dodge at actual hit time.
    if pskill.is_projectile && !pskill.nulled && !pskill.reflected && !pskill.absorbed {
        check_defender(zone, skill, pskill, ctx, now);
    }

    // A lapsed avoidance shield lets the defender answer late: the hit was
    // prevented, but the counter still fires after the result.
    if pskill.primary_shield_consumed
        && let Some(primary) = pskill.primary_target.filter(|p| *p != source)
        && zone.entity(primary).is_some_and(|t| {
            t.nra_shield_count(NraKind::Null, pskill.effective_affinity) == 0
                && t.nra_shield_count(NraKind::Reflect, pskill.effective_affinity) == 0
                && t.nra_shield_count(NraKind::Absorb, pskill.effective_affinity) == 0
        })
        && skill.action.is_counterable()
    {
        check_defender(zone, skill, pskill, ctx, now);
    }

    // Primary entry if nothing recorded one yet.
    if let Some(primary) = pskill.primary_target
        && pskill.target_mut(primary).is_none()
    {
        pskill.targets.push(SkillTargetResult::primary(primary));
    }

    // Area fan-out around the effective source.
    if skill.area != crate::definition::AreaType::None
        && !(pskill.absorbed && skill.area.skipped_on_absorb())
    {
        let gathered = targeting::gather_area_targets(
            zone,
            pskill.effective_source,
            pskill.primary_target,
            skill,
        );
        let filtered = targeting::filter_valid_targets(zone, pskill.effective_source, gathered, skill);
        for id in filtered {
            if pskill.target_mut(id).is_none() {
                pskill.targets.push(SkillTargetResult::indirect(id));
            }
        }
    }

    // Indirect avoidance; each reflect sends one extra hit at the source.
    let mut reflect_backs = 0u32;
    let indirect_ids: Vec<EntityId> = pskill
        .targets
        .iter()
        .filter(|t| t.indirect)
        .map(|t| t.entity)
        .collect();
    for id in indirect_ids {
        if !pskill.can_avoid {
            break;
        }
        let target_calc = defense_calc(zone, pskill, id);
        let outcome = {
            let rng = &mut zone.rng;
            match zone.entities.get_mut(&id) {
                Some(target) => resolve_nra(
                    target,
                    &target_calc,
                    rng,
                    pskill.effective_affinity,
                    pskill.base_affinity,
                    pskill.effective_dependency,
                    pskill.pvp,
                ),
                None => Default::default(),
            }
        };
        let barrier = zone.tokusei.aspect_sum(id, AspectType::Barrier) > 0;
        if let Some(kind) = outcome.kind
            && let effective_dependency = pskill.effective_dependency
            && let Some(result) = pskill.target_mut(id)
        {
            mark_avoidance(result, kind, effective_dependency, outcome.affinity, barrier);
            result.shield_consumed = outcome.shield_consumed;
            if kind == NraKind::Reflect && id != source {
                reflect_backs += 1;
            }
        } else if outcome.auto_protected
            && let Some(result) = pskill.target_mut(id)
        {
            result.flags1.insert(HitFlags1::PROTECT);
        }
    }
    for _ in 0..reflect_backs {
        pskill.targets.push(SkillTargetResult::indirect(source));
    }

    // Scripted pre-action may adjust the processing skill or fizzle it.
    if let Some(function) = skill.function_id {
        let scripts = Arc::clone(&zone.scripts);
        if let Some(logic) = scripts.get(function)
            && logic.settings().pre_action
        {
            let result = {
                let Some(entity) = zone.entity(source) else {
                    return false;
                };
                let hook_ctx = HookContext {
                    source: entity,
                    skill,
                    config: &zone.config,
                    tokusei: &zone.tokusei,
                    now,
                    target: pskill.primary_target,
                };
                logic.pre_action(&hook_ctx, pskill)
            };
            if check_hook_result(function, "preAction", result).is_err() {
                ctx.fizzle = true;
                return false;
            }
        }
    }

    process_skill_result_final(zone, skill, pskill, ctx);
    true
}

/// Damage, knockback, statuses, and application for every target.
fn process_skill_result_final(
    zone: &mut Zone,
    skill: &SkillDefinition,
    pskill: &mut ProcessingSkill,
    ctx: &mut SkillExecutionContext,
) {
    let now = zone.now();
    let defs = Arc::clone(&zone.definitions);
    let source = pskill.source;
    let effective_source = pskill.effective_source;

    let source_pos = zone
        .entity(effective_source)
        .map(|e| e.pos)
        .unwrap_or_default();
    let effective_target_pos = pskill
        .primary_target
        .and_then(|id| zone.entity(id))
        .map(|e| e.pos)
        .unwrap_or(source_pos);

    let kb_remove_chance = zone
        .tokusei
        .aspect_sum(effective_source, AspectType::KnockbackRemove);

    let mut total_generic_damage = 0i32;
    let mut hit_targets: Vec<EntityId> = Vec::new();

    let mut results = std::mem::take(&mut pskill.targets);
    for result in &mut results {
        let target_id = result.entity;
        if result.hit_avoided || result.hit_null.is_some() || result.hit_reflect.is_some() {
            continue;
        }

        // Damage channels.
        if skill.formula.deals_damage() {
            compute_target_damage(zone, skill, pskill, result);
        }

        if result.flags1.contains(HitFlags1::PROTECT) {
            // Auto-protection floors the hit.
            if result.damage1 > 1 {
                result.damage1 = 1;
            }
            if result.damage2 > 1 {
                result.damage2 = 1;
            }
        }

        let damage1 = result.damage1;
        let damaging = damage1 > 0 || result.damage2 > 0;

        // Knockback.
        let mut knocked_back = false;
        if hit::knockback_eligible(skill, damage1) {
            let kb_null_chance = zone
                .tokusei
                .aspect_sum(target_id, AspectType::KnockbackNull);
            let guarding = result.flags1.contains(HitFlags1::GUARDED);
            let resolution = {
                let rng = &mut zone.rng;
                match zone.entities.get_mut(&target_id) {
                    Some(target) => hit::resolve_knockback(
                        skill,
                        target,
                        source_pos,
                        effective_target_pos,
                        result.primary,
                        pskill.hard_strike,
                        guarding,
                        kb_remove_chance,
                        kb_null_chance,
                        now,
                        rng,
                    ),
                    None => Default::default(),
                }
            };
            knocked_back = resolution.knocked_back;
            if knocked_back {
                result.flags1.insert(HitFlags1::KNOCKBACK);
                result.knockback = resolution.outcome;
                result.add_recalc(RecalcTrigger::Knockback);
                if pskill.hard_strike {
                    result.flags2.insert(HitFlags2::HARD_STRIKE);
                }
            }
        }

        // Pursuit and technical follow-ups on normal damage.
        if damage1 > 0 && skill.formula.is_normal() && !skill.formula.is_heal() {
            roll_followups(zone, pskill, result);
        }

        // Apply HP/MP.
        let hitstun_null = zone.tokusei.aspect_sum(target_id, AspectType::HitstunNull);
        let clench_chance = zone.tokusei.aspect_sum(target_id, AspectType::ClenchRate);
        let overflow_break = result.technical_damage > 0 || result.pursuit_damage > 0;
        let apply_status = ctx.apply_status;

        let (outcome, target_died) = {
            let rng = &mut zone.rng;
            match zone.entities.get_mut(&target_id) {
                Some(target) => {
                    let total1 = result.damage1
                        + result.pursuit_damage.max(0)
                        + result.technical_damage.max(0);
                    let outcome = if pskill.absolute_damage.is_some()
                        || skill.formula == DamageFormula::ExplicitSet
                    {
                        let (hp, mp) = pskill.absolute_damage.unwrap_or((0, 0));
                        target.set_hp_mp(-hp, -mp, true, true, 0, false, rng)
                    } else if total1 != 0 || result.damage2 != 0 {
                        target.set_hp_mp(
                            -total1,
                            -result.damage2,
                            true,
                            true,
                            clench_chance,
                            overflow_break,
                            rng,
                        )
                    } else {
                        Default::default()
                    };
                    let died = !target.is_alive();
                    (outcome, died)
                }
                None => (Default::default(), false),
            }
        };

        if outcome.killed {
            result.flags1.insert(HitFlags1::LETHAL);
            result.add_recalc(RecalcTrigger::Death);
        }
        if outcome.revived {
            result.flags1.insert(HitFlags1::REVIVAL);
            result.add_recalc(RecalcTrigger::Revival);
        }
        if outcome.clenched {
            result.flags1.insert(HitFlags1::CLENCH);
        }
        if outcome.clench_overflow {
            result.flags2.insert(HitFlags2::CLENCH_OVERFLOW);
        }
        if damaging {
            result.add_recalc(RecalcTrigger::Damaged);
            total_generic_damage += result.damage1.max(0);
            hit_targets.push(target_id);
        }

        // Hit-stun.
        result.can_hit_stun = {
            let rng = &mut zone.rng;
            hit::can_hit_stun(
                hitstun_null,
                result.flags1.contains(HitFlags1::GUARDED),
                result.hit_absorb,
                rng,
            )
        };
        if result.can_hit_stun
            && let Some(target) = zone.entities.get_mut(&target_id)
        {
            let timing = hit::apply_hit_stop(skill, target, damaging, knocked_back, now);
            result.timing.start_stop = timing.start_stop;
            result.timing.end_stop = timing.end_stop;
            result.timing.end_ailment = timing.end_ailment;
            target.extend_status_time(StatusTimeKind::Hit, timing.end_stop);
        }

        // Status effects.
        if apply_status {
            let source_calc = offense_calc(zone, pskill, target_id);
            let target_calc = defense_calc(zone, pskill, target_id);
            let status_ctx = StatusContext {
                definitions: &defs,
                tokusei: &zone.tokusei,
                now,
                source: effective_source,
                expertise_rank: pskill.expertise_rank,
                nra_status_null: zone.config.nra_status_null,
            };
            let rng = &mut zone.rng;
            if let Some(target) = zone.entities.get_mut(&target_id) {
                status::apply_statuses(
                    &status_ctx,
                    target,
                    &source_calc,
                    &target_calc,
                    rng,
                    skill,
                    knocked_back,
                    result.damage1.max(0),
                    target_died,
                    result,
                );
            }
        }

        // Lifecycle-driven status cancellation.
        let mut causes = EffectCancelFlags::HIT;
        if damaging {
            causes = causes.with(EffectCancelFlags::DAMAGE);
        }
        if knocked_back {
            causes = causes.with(EffectCancelFlags::KNOCKBACK);
        }
        if outcome.killed {
            causes = causes.with(EffectCancelFlags::DEATH);
        }
        let protect_sleep = skill
            .add_statuses
            .iter()
            .any(|entry| defs.status(entry.status).is_ok_and(|d| d.is_sleep));
        if let Some(target) = zone.entities.get_mut(&target_id) {
            let cancelled = target.cancel_statuses(causes, protect_sleep);
            if !cancelled.is_empty() {
                result.add_recalc(RecalcTrigger::StatusChanged);
                result.cancelled_statuses.extend(cancelled);
            }
        }
        result.effect_cancel = causes;

        if outcome.killed {
            zone.push_side_effect(SideEffect::EntityKilled {
                source: effective_source,
                killed: target_id,
            });
        }
    }
    pskill.targets = results;

    // Fusion gauge accrues from damage a player deals.
    if total_generic_damage > 0
        && zone.entity(source).is_some_and(|e| e.is_player)
    {
        let gain = (total_generic_damage as i64
            * (100 + zone.config.fusion_gauge_bonus as i64)
            / 100
            / 100) as u32;
        if gain > 0
            && let Some(entity) = zone.entities.get_mut(&source)
        {
            entity.fusion_gauge = entity.fusion_gauge.saturating_add(gain);
        }
    }

    // HP drain back to the effective source.
    if skill.hp_drain_percent > 0 && total_generic_damage > 0 {
        let drain = zone
            .entity(effective_source)
            .map(|e| hit::drain_amount(total_generic_damage, skill.hp_drain_percent, e))
            .unwrap_or(0);
        if drain != 0 {
            let rng = &mut zone.rng;
            if let Some(entity) = zone.entities.get_mut(&effective_source) {
                entity.set_hp_mp(drain, 0, true, true, 0, false, rng);
            }
        }
    }

    // Aggro and combat bookkeeping.
    if ctx.apply_aggro && !hit_targets.is_empty() {
        for &target in &hit_targets {
            let hostile = match (zone.entity(source), zone.entity(target)) {
                (Some(s), Some(t)) => s.is_enemy_of(t),
                _ => false,
            };
            if hostile {
                if let Some(s) = zone.entities.get_mut(&source) {
                    s.opponents.insert(target);
                }
                if let Some(t) = zone.entities.get_mut(&target) {
                    t.opponents.insert(source);
                }
                zone.push_side_effect(SideEffect::AggroUpdate { source, target });
            }
        }
        zone.push_side_effect(SideEffect::CombatSkillHit {
            source,
            skill: skill.id,
            targets: hit_targets,
        });
    }

    // Recalc requests.
    let recalc: Vec<(EntityId, Vec<RecalcTrigger>)> = pskill
        .targets
        .iter()
        .filter(|r| !r.recalc.is_empty())
        .map(|r| (r.entity, r.recalc.clone()))
        .collect();
    for (entity, triggers) in recalc {
        zone.push_side_effect(SideEffect::RequestRecalc { entity, triggers });
    }

    // Reports, batched under the transport cap.
    let reports: Vec<TargetReport> = pskill.targets.iter().map(TargetReport::from_result).collect();
    let (cooldown_time, lock_out_time) = prospective_times(zone, source, skill, now);
    let executed = OutboundEvent::SkillExecuted {
        source,
        skill: skill.id,
        activation_id: pskill.activation_id,
        target: pskill.primary_target,
        cooldown_time,
        lock_out_time,
        hp_cost: pskill.costs.hp,
        mp_cost: pskill.costs.mp,
        rush_start: pskill.rush_start,
        hard_strike: pskill.hard_strike,
    };
    let events = batch_skill_reports(
        &executed,
        source,
        skill.id,
        pskill.activation_id,
        reports,
    );
    zone.broadcast_all(events);

    // Scripted post-action observes, never changes, the outcome.
    if let Some(function) = skill.function_id {
        let scripts = Arc::clone(&zone.scripts);
        if let Some(logic) = scripts.get(function)
            && logic.settings().post_action
            && let Some(entity) = zone.entity(source)
        {
            let hook_ctx = HookContext {
                source: entity,
                skill,
                config: &zone.config,
                tokusei: &zone.tokusei,
                now,
                target: pskill.primary_target,
            };
            let result = logic.post_action(&hook_ctx, pskill);
            let _ = check_hook_result(function, "postAction", result);
        }
    }
}

/// Compute the damage channels for one target result.
fn compute_target_damage(
    zone: &mut Zone,
    skill: &SkillDefinition,
    pskill: &mut ProcessingSkill,
    result: &mut SkillTargetResult,
) {
    let target_id = result.entity;
    let source_calc = offense_calc(zone, pskill, target_id);
    let target_calc = defense_calc(zone, pskill, target_id);
    let effective_source = pskill.effective_source;

    let (hp, mp, crit) = match skill.formula {
        DamageFormula::None | DamageFormula::ExplicitSet => (0, 0, CritLevel::None),
        DamageFormula::Normal
        | DamageFormula::NormalSimple
        | DamageFormula::Counter
        | DamageFormula::HealNormal => {
            let simple = skill.formula == DamageFormula::NormalSimple;
            let heal = skill.formula == DamageFormula::HealNormal;

            let mut offense = damage::offense_value(&source_calc, pskill.effective_dependency);
            if skill.formula == DamageFormula::Counter
                && let Some(countered) = pskill.countered
            {
                offense += 2 * countered.offense;
            }

            let crit = if simple || heal {
                CritLevel::None
            } else {
                let knowledge = zone
                    .tokusei
                    .aspect_sum(effective_source, AspectType::CritKnowledgeBoost);
                let bonus = zone
                    .tokusei
                    .aspect_sum(effective_source, AspectType::CritBonusFinal);
                damage::crit_level(&source_calc, &target_calc, knowledge, bonus, &mut zone.rng)
            };

            let defense = if heal {
                0
            } else {
                let base = target_calc.value(pskill.effective_dependency.defense_slot());
                (base as f32 * result.guard_modifier) as i32
            };

            let resist = if heal {
                0.0
            } else {
                target_calc.value(CorrectValue::Resist(pskill.effective_affinity)) as f32 / 100.0
            };

            let boost_cap = zone
                .tokusei
                .boost_cap(effective_source, pskill.effective_affinity);
            let boost = damage::boost_fraction(
                &source_calc,
                pskill.effective_affinity,
                pskill.base_affinity == Affinity::Weapon,
                boost_cap,
            );

            let class = pskill.effective_dependency.skill_class();
            let mut rates = source_calc.rate(CorrectValue::RateDealt(class))
                * target_calc.rate(CorrectValue::RateTaken(class));
            rates *= 1.0
                + zone
                    .tokusei
                    .aspect_sum(effective_source, AspectType::DamageDealt) as f32
                    / 100.0;
            rates *= 1.0
                + zone.tokusei.aspect_sum(target_id, AspectType::DamageTaken) as f32 / 100.0;
            let effect_power = zone
                .tokusei
                .aspect_sum(effective_source, AspectType::EffectPower);
            if effect_power != 0 {
                rates *= 1.0 + effect_power as f32 / 100.0;
            }

            let min_floor = {
                let min_level = zone.tokusei.aspect_sum(target_id, AspectType::MinimumDamage);
                min_level > 0 && min_level >= crit_tier(crit)
            };

            let input1 = NormalDamageInput {
                offense,
                defense,
                modifier: pskill.modifier1,
                exp_rank_boost: pskill.expertise_rank as i32,
                resist,
                boost,
                rate_multiplier: rates,
                crit,
                limit_break_damage: source_calc.value(CorrectValue::LimitBreakDamage),
                crit_defense_reduction: zone.config.crit_defense_reduction,
                simple,
                min_damage_floor: min_floor,
            };
            let hp = damage::calculate_normal_damage(&input1, &mut zone.rng);
            let mp = if pskill.modifier2 > 0 {
                let input2 = NormalDamageInput {
                    modifier: pskill.modifier2,
                    ..input1.clone()
                };
                damage::calculate_normal_damage(&input2, &mut zone.rng)
            } else {
                0
            };
            (hp, mp, crit)
        }
        formula => {
            let (current, max) = zone
                .entity(target_id)
                .map(|t| (t.hp, t.max_hp()))
                .unwrap_or((0, 0));
            let source_hp = zone.entity(effective_source).map(|s| s.hp).unwrap_or(0);
            let hp = damage::formula_amount(formula, pskill.modifier1, current, max, source_hp);
            let mp = if pskill.modifier2 > 0 {
                let (mp_current, mp_max) = zone
                    .entity(target_id)
                    .map(|t| (t.mp, t.max_mp()))
                    .unwrap_or((0, 0));
                damage::formula_amount(formula, pskill.modifier2, mp_current, mp_max, source_hp)
            } else {
                0
            };
            (hp, mp, CritLevel::None)
        }
    };

    let intensive_bonus = zone
        .tokusei
        .aspect_sum(effective_source, AspectType::LimitBreakMax);

    let mut hp = damage::cap_damage(hp, crit, intensive_bonus);
    let mut mp = damage::cap_damage(mp, crit, intensive_bonus);
    if result.indirect {
        hp = damage::apply_aoe_reduction(hp, skill.aoe_reduction);
        mp = damage::apply_aoe_reduction(mp, skill.aoe_reduction);
    }

    match crit {
        CritLevel::Critical => result.flags1.insert(HitFlags1::CRITICAL),
        CritLevel::LimitBreak => {
            result.flags1.insert(HitFlags1::LIMIT_BREAK);
            if intensive_bonus > 0 {
                result.flags1.insert(HitFlags1::INTENSIVE_BREAK);
            }
        }
        CritLevel::None => {}
    }

    let heal = skill.formula.is_heal() || result.hit_absorb;
    if hp != 0 {
        result.damage1 = if heal { -hp } else { hp };
        result.damage1_type = if heal { DamageType::Healing } else { DamageType::Generic };
    }
    if mp != 0 {
        result.damage2 = if heal { -mp } else { mp };
        result.damage2_type = if heal { DamageType::Healing } else { DamageType::Generic };
    }

    // Weakness reporting.
    if !heal
        && target_calc.value(CorrectValue::Resist(pskill.effective_affinity)) < 0
    {
        result.flags1.insert(HitFlags1::WEAKPOINT);
    }
}

fn crit_tier(crit: CritLevel) -> i32 {
    match crit {
        CritLevel::None => 1,
        CritLevel::Critical => 2,
        CritLevel::LimitBreak => 3,
    }
}

/// Pursuit and technical follow-up rolls for one damaged target.
fn roll_followups(zone: &mut Zone, pskill: &mut ProcessingSkill, result: &mut SkillTargetResult) {
    let source = pskill.effective_source;
    let target_id = result.entity;
    let base = result.damage1;

    let pursuit_rate = zone.tokusei.aspect_sum(source, AspectType::PursuitRate);
    if pursuit_rate > 0 && zone.rng.chance(pursuit_rate) {
        let power = zone.tokusei.aspect_sum(source, AspectType::PursuitPower);
        let override_affinity = zone
            .tokusei
            .aspect_list_first(source, AspectType::PursuitAffinity)
            .and_then(affinity_from_index);

        let pursuit = match override_affinity {
            Some(affinity) => {
                // Re-resisted on the override affinity; avoidance on that
                // affinity zeroes it.
                let target_calc = defense_calc(zone, pskill, target_id);
                let prevented = {
                    let rng = &mut zone.rng;
                    match zone.entities.get_mut(&target_id) {
                        Some(target) => resolve_nra(
                            target,
                            &target_calc,
                            rng,
                            affinity,
                            affinity,
                            pskill.effective_dependency,
                            pskill.pvp,
                        )
                        .avoided(),
                        None => false,
                    }
                };
                if prevented {
                    0
                } else {
                    let resist =
                        target_calc.value(CorrectValue::Resist(affinity)) as f32 / 100.0;
                    let adjusted = (base as f32 * (1.0 - resist)).floor() as i32;
                    damage::pursuit_damage(adjusted.max(0), power)
                }
            }
            None => damage::pursuit_damage(base, power),
        };
        if pursuit > 0 {
            result.pursuit_damage = pursuit;
            result.pursuit_affinity = override_affinity.or(Some(pskill.effective_affinity));
        }
    }

    let tech_rate = zone.tokusei.aspect_sum(source, AspectType::TechRate);
    if tech_rate > 0 && zone.rng.chance(tech_rate) {
        let power = zone.tokusei.aspect_sum(source, AspectType::TechPower);
        let intensive = zone.tokusei.aspect_sum(source, AspectType::LimitBreakMax);
        let crit = if result.flags1.contains(HitFlags1::LIMIT_BREAK) {
            CritLevel::LimitBreak
        } else if result.flags1.contains(HitFlags1::CRITICAL) {
            CritLevel::Critical
        } else {
            CritLevel::None
        };
        result.technical_damage = damage::technical_damage(base, power, crit, intensive);
    }
}

fn affinity_from_index(index: i32) -> Option<Affinity> {
    match index {
        1 => Some(Affinity::Weapon),
        2 => Some(Affinity::Slash),
        3 => Some(Affinity::Thrust),
        4 => Some(Affinity::Strike),
        5 => Some(Affinity::Gun),
        6 => Some(Affinity::Fire),
        7 => Some(Affinity::Ice),
        8 => Some(Affinity::Elec),
        9 => Some(Affinity::Force),
        10 => Some(Affinity::Expel),
        11 => Some(Affinity::Curse),
        12 => Some(Affinity::Heal),
        13 => Some(Affinity::Support),
        14 => Some(Affinity::Mystic),
        15 => Some(Affinity::Almighty),
        _ => None,
    }
}

/// Offense-side calc state for the effective source against one target.
fn offense_calc(zone: &Zone, pskill: &mut ProcessingSkill, _target: EntityId) -> CorrectTable {
    let source = pskill.effective_source;
    let affinity = pskill.effective_affinity;
    match pskill.calc_cache.get(source, CalcSide::Offense) {
        Some(calc) => calc.clone(),
        None => {
            let base = zone
                .entity(source)
                .map(|e| e.correct.clone())
                .unwrap_or_default();
            let calc = zone.tokusei.calc_state(source, &base, affinity);
            pskill
                .calc_cache
                .get_or_insert_with(source, CalcSide::Offense, || calc.clone());
            calc
        }
    }
}

/// Defense-side calc state for one target.
fn defense_calc(zone: &Zone, pskill: &mut ProcessingSkill, target: EntityId) -> CorrectTable {
    let affinity = pskill.effective_affinity;
    match pskill.calc_cache.get(target, CalcSide::Defense) {
        Some(calc) => calc.clone(),
        None => {
            let base = zone
                .entity(target)
                .map(|e| e.correct.clone())
                .unwrap_or_default();
            let calc = zone.tokusei.calc_state(target, &base, affinity);
            pskill
                .calc_cache
                .get_or_insert_with(target, CalcSide::Defense, || calc.clone());
            calc
        }
    }
}

// ============================================================================
// Defensive reactions and finalization
// ============================================================================

/// Complete the defensive reactions spawned by this hit, then it is safe
/// to rotate or retire the ability.
fn finalize_skill_execution(
    zone: &mut Zone,
    pskill: &mut ProcessingSkill,
    ctx: &mut SkillExecutionContext,
) {
    let reactions = std::mem::take(&mut ctx.pending_defenses);
    for reaction in reactions {
        complete_defensive_reaction(zone, pskill, reaction);
    }
    ctx.executed = true;
}

/// Consume a defender's charged skill; counters strike back at the
/// attacker.
fn complete_defensive_reaction(
    zone: &mut Zone,
    pskill: &mut ProcessingSkill,
    reaction: DefensiveReaction,
) {
    let defs = Arc::clone(&zone.definitions);
    let Ok(defense_skill) = defs.skill(reaction.skill).cloned() else {
        return;
    };
    let now = zone.now();

    if defense_skill.action == ActionType::Counter {
        let attacker = pskill.source;
        let countered = pskill.countered;
        counter_strike(zone, reaction.defender, &defense_skill, attacker, countered);
    }

    // The defender's activation is consumed either way.
    let Some(defender) = zone.entity_mut(reaction.defender) else {
        return;
    };
    let Some(ability) = defender
        .activated
        .as_mut()
        .filter(|a| a.activation_id == reaction.activation_id)
    else {
        return;
    };
    ability.execute_count = ability.execute_count.saturating_add(1);
    ability.executing = false;
    defender.activated = None;

    let cooldown = cooldown_deadline(zone, reaction.defender, &defense_skill, now);
    if cooldown.is_set()
        && let Some(defender) = zone.entity_mut(reaction.defender)
    {
        defender.set_cooldown(defense_skill.cooldown_group, cooldown);
    }
    let movement_speed = zone
        .entity(reaction.defender)
        .map(|e| e.correct.value(CorrectValue::Speed) as f32)
        .unwrap_or(0.0);
    zone.broadcast(OutboundEvent::SkillCompleted {
        source: reaction.defender,
        skill: defense_skill.id,
        activation_id: reaction.activation_id,
        cooldown_time: cooldown,
        movement_speed,
        mode: SkillCompleteMode::Done,
    });
}

/// A fast-tracked counter blow against the attacker.
fn counter_strike(
    zone: &mut Zone,
    defender: EntityId,
    counter_skill: &SkillDefinition,
    attacker: EntityId,
    countered: Option<CounterReference>,
) {
    let now = zone.now();
    let mut counter_pskill = build_processing_skill(
        zone,
        defender,
        counter_skill,
        ActivationId::INSTANT,
        Some(attacker),
        SkillCosts::free(),
    );
    counter_pskill.countered = countered;

    let mut result = SkillTargetResult::primary(attacker);
    {
        let source_calc = offense_calc(zone, &mut counter_pskill, attacker);
        let target_calc = defense_calc(zone, &mut counter_pskill, attacker);
        let mut offense =
            damage::offense_value(&source_calc, counter_pskill.effective_dependency);
        if let Some(countered) = countered {
            offense += 2 * countered.offense;
        }
        let defense = target_calc.value(counter_pskill.effective_dependency.defense_slot());
        let resist = target_calc
            .value(CorrectValue::Resist(counter_pskill.effective_affinity))
            as f32
            / 100.0;

        let input = NormalDamageInput {
            offense,
            defense,
            modifier: counter_skill.modifier1.max(100),
            resist,
            ..Default::default()
        };
        let amount = damage::calculate_normal_damage(&input, &mut zone.rng);
        result.damage1 = damage::cap_damage(amount, CritLevel::None, 0);
        result.damage1_type = DamageType::Generic;
    }

    {
        let rng = &mut zone.rng;
        if let Some(target) = zone.entities.get_mut(&attacker) {
            target.set_hp_mp(-result.damage1, 0, true, true, 0, false, rng);
            if !target.is_alive() {
                result.flags1.insert(HitFlags1::LETHAL);
            }
        }
    }

    let (cooldown_time, lock_out_time) = prospective_times(zone, defender, counter_skill, now);
    let executed = OutboundEvent::SkillExecuted {
        source: defender,
        skill: counter_skill.id,
        activation_id: ActivationId::INSTANT,
        target: Some(attacker),
        cooldown_time,
        lock_out_time,
        hp_cost: 0,
        mp_cost: 0,
        rush_start: None,
        hard_strike: false,
    };
    zone.broadcast(executed.clone());
    let events = batch_skill_reports(
        &executed,
        defender,
        counter_skill.id,
        ActivationId::INSTANT,
        vec![TargetReport::from_result(&result)],
    );
    zone.broadcast_all(events);
}

/// Rotate a multi-use ability or retire it with cooldown and completion.
fn finalize_skill(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
) {
    let now = zone.now();

    let retired = {
        let Some(entity) = zone.entity_mut(source) else {
            return;
        };
        let Some(ability) = entity
            .activated
            .as_mut()
            .filter(|a| a.activation_id == activation_id)
        else {
            return;
        };
        ability.execute_count = ability.execute_count.saturating_add(1);
        ability.executing = false;
        ability.hit_pending = false;
        if ability.retired() {
            true
        } else {
            // Roll over for the next use with fresh timing and costs.
            ability.reset_for_next_use(now);
            false
        }
    };

    zone.push_side_effect(SideEffect::CombatSkillComplete {
        source,
        skill: skill.id,
    });

    if retired {
        set_skill_complete_state(zone, source, skill, activation_id, SkillCompleteMode::Done);
    }
}

/// Completion used by switches and replaced-execution operations.
fn finalize_simple_execution(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
) {
    if let Some(entity) = zone.entity_mut(source)
        && let Some(ability) = entity
            .activated
            .as_mut()
            .filter(|a| a.activation_id == activation_id)
    {
        ability.execute_count = ability.execute_count.saturating_add(1);
        ability.executing = false;
    }
    set_skill_complete_state(zone, source, skill, activation_id, SkillCompleteMode::Done);
}

/// Commit the cooldown, clear the slot, and notify completion.
fn set_skill_complete_state(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    mode: SkillCompleteMode,
) {
    let now = zone.now();
    let executed = zone
        .entity(source)
        .and_then(|e| e.activated_with_id(activation_id))
        .map(|a| a.execute_count > 0)
        .unwrap_or(false);

    let cooldown = if executed {
        cooldown_deadline(zone, source, skill, now)
    } else {
        ServerTime::ZERO
    };

    let movement_speed = {
        let Some(entity) = zone.entity_mut(source) else {
            return;
        };
        if cooldown.is_set() {
            entity.set_cooldown(skill.cooldown_group, cooldown);
        }
        entity.activated = None;
        entity.special_activations.remove(&activation_id);
        entity.clear_status_time(StatusTimeKind::Charging);
        entity.correct.value(CorrectValue::Speed) as f32
    };

    zone.broadcast(OutboundEvent::SkillCompleted {
        source,
        skill: skill.id,
        activation_id,
        cooldown_time: cooldown,
        movement_speed,
        mode,
    });
}

// ============================================================================
// Failure, cancellation, and cancellation-adjacent paths
// ============================================================================

/// Record and report a failure on an activated ability.
fn send_failure(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    error: SkillError,
) {
    if error == SkillError::SilentFail {
        return;
    }
    if let Some(entity) = zone.entity_mut(source)
        && let Some(ability) = entity
            .activated
            .as_mut()
            .filter(|a| a.activation_id == activation_id)
    {
        ability.error = Some(error);
    }
    if skill.activation == ActivationType::Instant {
        zone.broadcast(OutboundEvent::SkillExecutedInstant {
            error: Some(error),
            source,
            skill: skill.id,
            target: None,
            cooldown_time: ServerTime::ZERO,
            hp_cost: 0,
            mp_cost: 0,
        });
    } else {
        zone.broadcast(OutboundEvent::SkillFailed {
            source,
            skill: skill.id,
            activation_id,
            error,
        });
    }
}

/// Execution failure after activation: instants unlink silently, charged
/// skills release the client's charge UI.
fn fail_execution(
    zone: &mut Zone,
    source: EntityId,
    skill: &SkillDefinition,
    activation_id: ActivationId,
    error: SkillError,
) {
    send_failure(zone, source, skill, activation_id, error);

    if let Some(entity) = zone.entity_mut(source)
        && let Some(ability) = entity.activated.as_mut().filter(|a| a.activation_id == activation_id)
    {
        ability.executing = false;
    }

    if skill.activation == ActivationType::Instant {
        if let Some(entity) = zone.entity_mut(source) {
            if entity
                .activated
                .as_ref()
                .is_some_and(|a| a.activation_id == activation_id)
            {
                entity.activated = None;
            }
            entity.special_activations.remove(&activation_id);
        }
    } else {
        set_skill_complete_state(
            zone,
            source,
            skill,
            activation_id,
            SkillCompleteMode::CancelledWithCooldown,
        );
    }
}

/// A scheduled hit died mid-flight: free the client with an empty report
/// and retire or rotate the ability.
fn hit_cancel(zone: &mut Zone, source: EntityId, skill: &SkillDefinition, activation_id: ActivationId) {
    zone.broadcast(OutboundEvent::SkillReports {
        source,
        skill: skill.id,
        activation_id,
        targets: Vec::new(),
    });
    finalize_skill(zone, source, skill, activation_id);
}

/// External cancellation of an activation.
pub fn cancel(zone: &mut Zone, source: EntityId, activation_id: ActivationId, cancel_type: u8) -> bool {
    let defs = Arc::clone(&zone.definitions);
    let Some((skill_id, execute_count, hit_pending)) = zone.entity(source).and_then(|e| {
        e.activated_with_id(activation_id)
            .map(|a| (a.skill, a.execute_count, a.hit_pending))
    }) else {
        return false;
    };
    let Ok(skill) = defs.skill(skill_id).cloned() else {
        return false;
    };

    if let Some(entity) = zone.entity_mut(source)
        && let Some(ability) = entity
            .activated
            .as_mut()
            .filter(|a| a.activation_id == activation_id)
    {
        ability.cancelled = true;
    }

    // Toggles deactivate through their switch path.
    if skill.activation == ActivationType::OnToggle
        && zone
            .entity(source)
            .is_some_and(|e| e.switch_active.contains(&skill.id))
    {
        if let Some(entity) = zone.entity_mut(source) {
            entity.switch_active.remove(&skill.id);
        }
        zone.broadcast(OutboundEvent::SkillSwitch {
            source,
            skill: skill.id,
            on: false,
        });
    }

    // A cancelled pending hit unsticks the client and drops its state.
    if hit_pending {
        zone.take_processing(source);
        zone.broadcast(OutboundEvent::SkillReports {
            source,
            skill: skill.id,
            activation_id,
            targets: Vec::new(),
        });
    }

    let mode = if execute_count > 0 {
        SkillCompleteMode::CancelledWithCooldown
    } else {
        SkillCompleteMode::Done
    };
    // Visible break animation for interrupted defensive stances.
    if cancel_type == 3 && skill.action.is_defensive() {
        debug!(source = source.0, skill = skill.id.0, "defensive stance broken");
    }
    set_skill_complete_state(zone, source, &skill, activation_id, mode);
    true
}

// ============================================================================
// Saved switch skills
// ============================================================================

/// Re-toggle saved switch skills on login.
pub fn reactivate_saved_switch_skills(zone: &mut Zone, source: EntityId, saved: &[SkillId]) {
    if !zone.config.save_switch_skills {
        return;
    }
    for &skill_id in saved {
        let already = zone
            .entity(source)
            .is_some_and(|e| e.switch_active.contains(&skill_id));
        if already {
            continue;
        }
        activate(zone, source, ActivateRequest::new(skill_id));
    }
}

// ============================================================================
// Scheduler pump
// ============================================================================

/// Advance the zone clock, firing due tasks in deadline order.
pub fn advance_to(zone: &mut Zone, to: ServerTime) {
    while let Some((deadline, task)) = zone.scheduler.pop_due(to) {
        zone.set_time(deadline);
        run_task(zone, task);
    }
    zone.set_time(to);
}

/// Dispatch one scheduled task, dropping it if its ability is stale.
fn run_task(zone: &mut Zone, task: Task) {
    let (entity, activation_id, expected_count) = task.identity();

    let valid = zone.entity(entity).is_some_and(|e| {
        e.activated_with_id(activation_id)
            .is_some_and(|a| !a.cancelled && a.execute_count == expected_count)
    });
    if !valid {
        debug!(entity = entity.0, activation = activation_id.0, "dropping stale task");
        return;
    }

    match task {
        Task::ChargeComplete { .. } => {
            execute(zone, entity, activation_id, None);
        }
        Task::AutoCancel { .. } => {
            let pending = zone
                .entity(entity)
                .and_then(|e| e.activated_with_id(activation_id))
                .is_some_and(|a| a.pending_execution());
            if !pending {
                cancel(zone, entity, activation_id, 0);
            }
        }
        Task::CompleteExecution { .. } => {
            complete_skill_execution(zone, entity, activation_id);
        }
        Task::DeliverHit { .. } => {
            deliver_hit(zone, entity, activation_id);
        }
    }
}
