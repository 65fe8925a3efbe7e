//! Status effect application on hit.
//!
//! Candidates come from the skill itself and from the source's passive add
//! maps (plus the knockback map when the hit displaced the target). When
//! the same effect arrives from several sources its rates accumulate first
//! and a single roll decides it.

use std::collections::HashMap;

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::definition::{ApplicationLogic, SkillDefinition, StatusDefinition};
use crate::entity::{EntityState, StatusEffectInstance};
use crate::ids::{EntityId, ServerTime, StatusId};
use crate::nra::nra_blocks_status;
use crate::processing::SkillTargetResult;
use crate::registry::DefinitionStore;
use crate::rng::CombatRng;
use crate::tokusei::{AspectType, RecalcTrigger, TokuseiManager};

/// Read-only context for one application pass.
pub struct StatusContext<'a> {
    pub definitions: &'a DefinitionStore,
    pub tokusei: &'a TokuseiManager,
    pub now: ServerTime,
    pub source: EntityId,
    /// Source expertise rank for the skill's line.
    pub expertise_rank: u8,
    /// Whether null avoidance may block applications.
    pub nra_status_null: bool,
}

/// One merged candidate after rate accumulation.
#[derive(Debug, Clone)]
struct Candidate {
    status: StatusId,
    min_stack: i8,
    max_stack: i8,
    rate: i32,
    replace: bool,
}

/// Collect and merge candidates for this hit.
fn collect_candidates(
    ctx: &StatusContext<'_>,
    skill: &SkillDefinition,
    knocked_back: bool,
) -> Vec<Candidate> {
    let mut merged: HashMap<StatusId, Candidate> = HashMap::new();
    let mut order: Vec<StatusId> = Vec::new();

    let mut push = |status: StatusId, min: i8, max: i8, rate: i32, replace: bool| {
        match merged.get_mut(&status) {
            Some(existing) => {
                existing.rate += rate;
                existing.replace |= replace;
                existing.min_stack = existing.min_stack.max(min);
                existing.max_stack = existing.max_stack.max(max);
            }
            None => {
                order.push(status);
                merged.insert(
                    status,
                    Candidate {
                        status,
                        min_stack: min,
                        max_stack: max,
                        rate,
                        replace,
                    },
                );
            }
        }
    };

    for entry in &skill.add_statuses {
        if entry.on_knockback && !knocked_back {
            continue;
        }
        push(
            entry.status,
            entry.min_stack,
            entry.max_stack,
            entry.rate as i32,
            entry.replace,
        );
    }

    if let Some(map) = ctx.tokusei.aspect_map(ctx.source, AspectType::StatusAdd) {
        let mut entries: Vec<(&i32, &i32)> = map.iter().collect();
        entries.sort_unstable();
        for (&status, &rate) in entries {
            push(StatusId(status as u32), 1, 1, rate, false);
        }
    }
    if knocked_back
        && let Some(map) = ctx
            .tokusei
            .aspect_map(ctx.source, AspectType::KnockbackStatusAdd)
    {
        let mut entries: Vec<(&i32, &i32)> = map.iter().collect();
        entries.sort_unstable();
        for (&status, &rate) in entries {
            push(StatusId(status as u32), 1, 1, rate, false);
        }
    }

    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}

/// Effective inflict rate for one candidate.
fn effective_rate(
    ctx: &StatusContext<'_>,
    candidate: &Candidate,
    def: &StatusDefinition,
    source_calc: &CorrectTable,
    target_calc: &CorrectTable,
) -> i32 {
    let mut rate = candidate.rate as f32;
    rate += ctx.expertise_rank as f32;

    if let Some(affinity) = def.affinity {
        rate += source_calc.value(CorrectValue::Boost(affinity)) as f32 / 2.0;
        let resist = target_calc.value(CorrectValue::Resist(affinity)) as f32 / 100.0;
        rate *= 1.0 - resist;
    }

    rate += ctx
        .tokusei
        .aspect_map_value(ctx.source, AspectType::StatusInflictAdjust, def.id.0 as i32)
        as f32;
    rate += ctx.tokusei.aspect_map_value(
        ctx.source,
        AspectType::StatusCategoryInflictAdjust,
        def.category as i32,
    ) as f32;

    rate += (target_calc.value(CorrectValue::ResistStatus) - 100) as f32 / 10.0;

    let mut rate = rate.floor() as i32;
    if def.instant_death {
        rate = rate.min(50);
    }
    rate
}

/// Stack count for a successful application.
fn draw_stack(
    candidate: &Candidate,
    def: &StatusDefinition,
    source_calc: &CorrectTable,
    rng: &mut CombatRng,
) -> i8 {
    let drawn = rng.range_i32(candidate.min_stack as i32, candidate.max_stack as i32);
    let scaled = match def.scale_source {
        Some(slot) => {
            let multiplier = (source_calc.value(slot) / 10).clamp(1, 100);
            drawn * multiplier
        }
        None => drawn,
    };
    // Overflow flattens to the wire maximum.
    scaled.clamp(0, i8::MAX as i32) as i8
}

/// Apply the status candidates of one hit to one target.
///
/// `hp_damage` is the HP-channel damage of the hit (ailment pools build on
/// it); `target_died` drops effects flagged cancel-on-death.
#[allow(clippy::too_many_arguments)]
pub fn apply_statuses(
    ctx: &StatusContext<'_>,
    target: &mut EntityState,
    source_calc: &CorrectTable,
    target_calc: &CorrectTable,
    rng: &mut CombatRng,
    skill: &SkillDefinition,
    knocked_back: bool,
    hp_damage: i32,
    target_died: bool,
    result: &mut SkillTargetResult,
) {
    for candidate in collect_candidates(ctx, skill, knocked_back) {
        let Ok(def) = ctx.definitions.status(candidate.status) else {
            tracing::warn!(status = candidate.status.0, "unknown status candidate");
            continue;
        };

        if ctx.tokusei.aspect_value_exists(
            target.id,
            AspectType::StatusImmunity,
            def.id.0 as i32,
        ) || ctx.tokusei.aspect_value_exists(
            target.id,
            AspectType::StatusCategoryImmunity,
            def.category as i32,
        ) {
            continue;
        }

        // Harmful effects pre-roll avoidance on their own affinity; any
        // success blocks the application.
        if def.bad
            && let Some(affinity) = def.affinity
            && affinity != Affinity::Almighty
            && nra_blocks_status(target, target_calc, rng, affinity, ctx.nra_status_null)
        {
            continue;
        }

        let rate = effective_rate(ctx, &candidate, def, source_calc, target_calc);
        if !rng.chance(rate) {
            continue;
        }

        if def.cancel_addition_on_death && target_died {
            continue;
        }

        let stack = draw_stack(&candidate, def, source_calc, rng);
        if stack <= 0 {
            continue;
        }

        match def.logic {
            ApplicationLogic::Ailment => {
                apply_ailment(def, target, hp_damage, stack, ctx.now, result);
            }
            ApplicationLogic::SkipIfActive => {
                if target.has_status(def.id) && !candidate.replace {
                    continue;
                }
                insert_status(def, target, stack, true, ctx.now);
                result.added_statuses.push((def.id, stack));
                result.add_recalc(RecalcTrigger::StatusChanged);
            }
            ApplicationLogic::Accumulate => {
                insert_status(def, target, stack, candidate.replace, ctx.now);
                result.added_statuses.push((def.id, stack));
                result.add_recalc(RecalcTrigger::StatusChanged);
            }
        }
    }
}

/// Ailments never enter the status map: they extend the target's ailment
/// damage pool and timer, keeping the lower affinity index when combining.
fn apply_ailment(
    def: &StatusDefinition,
    target: &mut EntityState,
    hp_damage: i32,
    stack: i8,
    now: ServerTime,
    result: &mut SkillTargetResult,
) {
    target.ailment_damage += hp_damage.max(0) + stack as i32;
    target.ailment_affinity = match (target.ailment_affinity, def.affinity) {
        (Some(current), Some(new)) if new.index() < current.index() => Some(new),
        (None, new) => new,
        (current, _) => current,
    };
    let duration_us = stack as u64 * def.duration_ms as u64 * 1000;
    let until = now.add_micros(duration_us);
    if until > target.ailment_until {
        target.ailment_until = until;
    }

    result.ailment_affinity = target.ailment_affinity;
    result.ailment_damage = target.ailment_damage;
    result.ailment_duration_ms = (duration_us / 1000) as u32;
}

fn insert_status(
    def: &StatusDefinition,
    target: &mut EntityState,
    stack: i8,
    replace: bool,
    now: ServerTime,
) {
    let expiration = now.add_millis(def.duration_ms as u64);
    let entry = target
        .statuses
        .entry(def.id)
        .or_insert_with(|| StatusEffectInstance {
            stack: 0,
            expiration,
            cancel_on: def.cancel_on,
            is_sleep: def.is_sleep,
        });
    if replace {
        entry.stack = stack as u8;
    } else {
        entry.stack = entry
            .stack
            .saturating_add(stack as u8)
            .min(def.max_stack);
    }
    if expiration > entry.expiration || replace {
        entry.expiration = expiration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AddStatusEntry;
    use crate::entity::EntityKind;
    use crate::ids::SkillId;
    use crate::nra::NraKind;

    fn defs_with(status: StatusDefinition) -> DefinitionStore {
        let mut defs = DefinitionStore::new();
        defs.add_status(status);
        defs
    }

    fn ctx<'a>(defs: &'a DefinitionStore, tokusei: &'a TokuseiManager) -> StatusContext<'a> {
        StatusContext {
            definitions: defs,
            tokusei,
            now: ServerTime::from_millis(1000),
            source: EntityId(1),
            expertise_rank: 0,
            nra_status_null: true,
        }
    }

    fn target() -> EntityState {
        let mut e = EntityState::new(EntityId(2), EntityKind::Enemy, 2);
        e.hp = 100;
        e
    }

    fn poison_skill(rate: i16) -> SkillDefinition {
        SkillDefinition::new(SkillId(1))
            .with_status(AddStatusEntry::new(StatusId(10), 1, 3, rate))
    }

    #[test]
    fn test_certain_status_applies() {
        let defs = defs_with(StatusDefinition::new(StatusId(10)).with_duration(5000));
        let tokusei = TokuseiManager::new();
        let mut t = target();
        let calc = CorrectTable::new();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(100),
            false,
            0,
            false,
            &mut result,
        );

        assert!(t.has_status(StatusId(10)));
        assert_eq!(result.added_statuses.len(), 1);
        let stack = result.added_statuses[0].1;
        assert!((1..=3).contains(&stack));
        assert!(result.recalc.contains(&RecalcTrigger::StatusChanged));
    }

    #[test]
    fn test_zero_rate_never_applies() {
        let defs = defs_with(StatusDefinition::new(StatusId(10)));
        let tokusei = TokuseiManager::new();
        let mut t = target();
        let calc = CorrectTable::new();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(0),
            false,
            0,
            false,
            &mut result,
        );
        assert!(!t.has_status(StatusId(10)));
    }

    #[test]
    fn test_immunity_blocks() {
        let defs = defs_with(StatusDefinition::new(StatusId(10)));
        let mut tokusei = TokuseiManager::new();
        tokusei
            .table_mut(EntityId(2))
            .add_list_value(AspectType::StatusImmunity, 10);
        let mut t = target();
        let calc = CorrectTable::new();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(100),
            false,
            0,
            false,
            &mut result,
        );
        assert!(!t.has_status(StatusId(10)));
    }

    #[test]
    fn test_bad_status_blocked_by_shield() {
        let defs = defs_with(
            StatusDefinition::new(StatusId(10)).bad(Some(Affinity::Curse)),
        );
        let tokusei = TokuseiManager::new();
        let mut t = target();
        t.add_nra_shields(NraKind::Null, Affinity::Curse, 1);
        let calc = CorrectTable::new();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(100),
            false,
            0,
            false,
            &mut result,
        );
        assert!(!t.has_status(StatusId(10)));
        // The block consumed the shield.
        assert_eq!(t.nra_shield_count(NraKind::Null, Affinity::Curse), 0);
    }

    #[test]
    fn test_knockback_only_status() {
        let defs = defs_with(StatusDefinition::new(StatusId(10)));
        let tokusei = TokuseiManager::new();
        let calc = CorrectTable::new();
        let skill = SkillDefinition::new(SkillId(1))
            .with_status(AddStatusEntry::new(StatusId(10), 1, 1, 100).on_knockback());

        for (knocked, expected) in [(false, false), (true, true)] {
            let mut t = target();
            let mut rng = CombatRng::seeded(9);
            let mut result = SkillTargetResult::new(t.id);
            apply_statuses(
                &ctx(&defs, &tokusei),
                &mut t,
                &calc,
                &calc,
                &mut rng,
                &skill,
                knocked,
                0,
                false,
                &mut result,
            );
            assert_eq!(t.has_status(StatusId(10)), expected);
        }
    }

    #[test]
    fn test_skip_if_active_honors_replace() {
        let defs = defs_with(
            StatusDefinition::new(StatusId(10))
                .with_logic(ApplicationLogic::SkipIfActive)
                .with_duration(1000),
        );
        let tokusei = TokuseiManager::new();
        let calc = CorrectTable::new();
        let mut t = target();
        let mut rng = CombatRng::seeded(9);

        let plain = SkillDefinition::new(SkillId(1))
            .with_status(AddStatusEntry::new(StatusId(10), 2, 2, 100));
        let mut result = SkillTargetResult::new(t.id);
        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &plain,
            false,
            0,
            false,
            &mut result,
        );
        assert_eq!(t.statuses.get(&StatusId(10)).map(|s| s.stack), Some(2));

        // Second application skips: already active, no replace flag.
        let mut result = SkillTargetResult::new(t.id);
        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &plain,
            false,
            0,
            false,
            &mut result,
        );
        assert!(result.added_statuses.is_empty());

        let replacing = SkillDefinition::new(SkillId(1))
            .with_status(AddStatusEntry::new(StatusId(10), 3, 3, 100).replaces());
        let mut result = SkillTargetResult::new(t.id);
        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &replacing,
            false,
            0,
            false,
            &mut result,
        );
        assert_eq!(t.statuses.get(&StatusId(10)).map(|s| s.stack), Some(3));
    }

    #[test]
    fn test_ailment_pools_and_keeps_lower_affinity() {
        let mut ailment = StatusDefinition::new(StatusId(10))
            .with_logic(ApplicationLogic::Ailment)
            .with_category(2)
            .with_duration(2000);
        ailment.affinity = Some(Affinity::Curse);
        let defs = defs_with(ailment);
        let tokusei = TokuseiManager::new();
        let calc = CorrectTable::new();
        let mut t = target();
        t.ailment_affinity = Some(Affinity::Mystic);
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        let skill = SkillDefinition::new(SkillId(1))
            .with_status(AddStatusEntry::new(StatusId(10), 2, 2, 100));
        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &skill,
            false,
            40,
            false,
            &mut result,
        );

        assert!(!t.has_status(StatusId(10)));
        assert_eq!(t.ailment_damage, 42);
        // Curse has a lower affinity index than Mystic and wins.
        assert_eq!(t.ailment_affinity, Some(Affinity::Curse));
        assert_eq!(result.ailment_duration_ms, 4000);
    }

    #[test]
    fn test_cancel_addition_on_death() {
        let mut status = StatusDefinition::new(StatusId(10));
        status.cancel_addition_on_death = true;
        let defs = defs_with(status);
        let tokusei = TokuseiManager::new();
        let calc = CorrectTable::new();
        let mut t = target();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(100),
            false,
            0,
            true,
            &mut result,
        );
        assert!(!t.has_status(StatusId(10)));
    }

    #[test]
    fn test_rates_accumulate_before_single_roll() {
        let defs = defs_with(StatusDefinition::new(StatusId(10)));
        let mut tokusei = TokuseiManager::new();
        // 60 from the skill plus 40 from passives reaches certainty.
        tokusei
            .table_mut(EntityId(1))
            .add_map_value(AspectType::StatusAdd, 10, 40);
        let calc = CorrectTable::new();
        let mut t = target();
        let mut rng = CombatRng::seeded(9);
        let mut result = SkillTargetResult::new(t.id);

        apply_statuses(
            &ctx(&defs, &tokusei),
            &mut t,
            &calc,
            &calc,
            &mut rng,
            &poison_skill(60),
            false,
            0,
            false,
            &mut result,
        );
        assert!(t.has_status(StatusId(10)));
    }

    #[test]
    fn test_instant_death_rate_cap() {
        let mut status = StatusDefinition::new(StatusId(10));
        status.instant_death = true;
        let defs = DefinitionStore::new();
        let tokusei = TokuseiManager::new();
        let candidate = Candidate {
            status: StatusId(10),
            min_stack: 1,
            max_stack: 1,
            rate: 95,
            replace: false,
        };
        let calc = CorrectTable::new();
        let rate = effective_rate(&ctx(&defs, &tokusei), &candidate, &status, &calc, &calc);
        assert_eq!(rate, 50);
    }
}
