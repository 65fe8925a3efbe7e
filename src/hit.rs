//! Post-damage hit application: knockback, hit-stun timing, HP drain.
//!
//! These run per target after damage channels are computed, mutating the
//! target's windows and position. Windows are monotonic; an active window
//! is never shortened by a later hit.

use crate::correct::{CorrectValue, SkillClass};
use crate::definition::{DamageFormula, KnockbackType, SkillDefinition};
use crate::entity::{EntityState, Position, StatusTimeKind};
use crate::ids::ServerTime;
use crate::processing::KnockbackOutcome;
use crate::rng::CombatRng;

/// A knocked-back target cannot be knocked back again inside this window.
pub const KNOCKBACK_WINDOW_US: u64 = 2_000_000;
/// Extra stun carried by a successful knockback.
pub const KNOCKBACK_STUN_US: u64 = 500_000;

/// Outcome of one knockback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KnockbackResolution {
    /// The hit counts as a knockback; on-knockback statuses apply.
    pub knocked_back: bool,
    /// Positional displacement, absent when the target is displacement-
    /// immune but still "hit by" the knockback.
    pub outcome: Option<KnockbackOutcome>,
}

/// Whether the skill's numbers make this hit knockback-eligible at all.
pub fn knockback_eligible(skill: &SkillDefinition, damage1: i32) -> bool {
    if skill.knockback_modifier == 0.0 || skill.knockback_type == KnockbackType::StatusOnly {
        return false;
    }
    match skill.formula {
        DamageFormula::None => true,
        _ if skill.modifier1 == 0 && skill.modifier2 == 0 => true,
        _ => damage1 > 0,
    }
}

/// Resolve knockback against one target.
///
/// `kb_remove_chance` is the source's chance to strip knockback from its
/// own hits; `kb_null_chance` the target's chance to null it. Nulled
/// knockback keeps the on-knockback statuses but skips displacement.
#[allow(clippy::too_many_arguments)]
pub fn resolve_knockback(
    skill: &SkillDefinition,
    target: &mut EntityState,
    source_pos: Position,
    effective_target_pos: Position,
    is_primary: bool,
    hard_strike: bool,
    guarding: bool,
    kb_remove_chance: i32,
    kb_null_chance: i32,
    now: ServerTime,
    rng: &mut CombatRng,
) -> KnockbackResolution {
    // An active knockback window blocks everything.
    if target.in_status_window(StatusTimeKind::Knockback, now) {
        return KnockbackResolution::default();
    }
    if guarding {
        return KnockbackResolution::default();
    }
    if rng.chance(kb_remove_chance) {
        return KnockbackResolution::default();
    }

    // Nulled knockback still counts as one for on-knockback statuses.
    let displaced = !rng.chance(kb_null_chance);

    // Knockback resistance caps the displacement unless the strike was
    // predicted hard at scheduling time.
    let mut distance = skill.knockback_distance as f32 * skill.knockback_modifier;
    if !hard_strike {
        let resist = target.correct.value(CorrectValue::KnockbackResist) as f32 / 100.0;
        distance *= (1.0 - resist).max(0.0);
    }

    let outcome = if displaced && distance > 0.0 {
        displacement(skill.knockback_type, target, source_pos, effective_target_pos, is_primary, distance)
    } else if displaced {
        // Teleport-style kinds displace regardless of distance math.
        match skill.knockback_type {
            KnockbackType::MatchTarget | KnockbackType::AtSource => displacement(
                skill.knockback_type,
                target,
                source_pos,
                effective_target_pos,
                is_primary,
                distance,
            ),
            _ => None,
        }
    } else {
        None
    };

    if let Some(outcome) = outcome {
        target.pos.x = outcome.x;
        target.pos.y = outcome.y;
        target.pos.t = now;
    }
    target.extend_status_time(
        StatusTimeKind::Knockback,
        now.add_micros(KNOCKBACK_WINDOW_US),
    );

    KnockbackResolution {
        knocked_back: true,
        outcome,
    }
}

/// Compute the displaced position for one knockback kind.
fn displacement(
    kind: KnockbackType,
    target: &EntityState,
    source_pos: Position,
    effective_target_pos: Position,
    is_primary: bool,
    distance: f32,
) -> Option<KnockbackOutcome> {
    let away_from = |origin: Position| {
        let heading = origin.heading_to(&target.pos);
        KnockbackOutcome {
            kind,
            x: target.pos.x + heading.cos() * distance,
            y: target.pos.y + heading.sin() * distance,
        }
    };

    match kind {
        KnockbackType::AwayFromSource | KnockbackType::AwayFromSourceAlt => {
            Some(away_from(source_pos))
        }
        KnockbackType::AwayFromTarget => {
            // The primary target has no other target to flee; it downgrades
            // to away-from-source.
            if is_primary {
                Some(away_from(source_pos))
            } else {
                Some(away_from(effective_target_pos))
            }
        }
        KnockbackType::MatchTarget => Some(KnockbackOutcome {
            kind,
            x: effective_target_pos.x,
            y: effective_target_pos.y,
        }),
        KnockbackType::AtSource => Some(KnockbackOutcome {
            kind,
            x: source_pos.x,
            y: source_pos.y,
        }),
        KnockbackType::StatusOnly => None,
    }
}

// ============================================================================
// Hit-stun timing
// ============================================================================

/// Per-target stop window triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitStopTiming {
    pub start_stop: ServerTime,
    pub end_stop: ServerTime,
    pub end_ailment: ServerTime,
}

/// Compute the stop triple for a target and extend its hit-stun window to
/// the final deadline.
pub fn apply_hit_stop(
    skill: &SkillDefinition,
    target: &mut EntityState,
    damaged: bool,
    knocked_back: bool,
    now: ServerTime,
) -> HitStopTiming {
    let mut end_stop = now;
    if damaged {
        end_stop = end_stop.add_millis(skill.stiffness_ms as u64);
    }
    if knocked_back {
        end_stop = end_stop.add_micros(KNOCKBACK_STUN_US);
    }
    let end_ailment = if target.ailment_until > end_stop {
        target.ailment_until
    } else {
        end_stop
    };

    let timing = HitStopTiming {
        start_stop: now,
        end_stop,
        end_ailment,
    };

    if end_ailment > now {
        target.extend_status_time(StatusTimeKind::HitStun, end_ailment);
    }
    timing
}

/// Roll whether the target shrugs off hit-stun entirely.
pub fn can_hit_stun(
    hitstun_null_chance: i32,
    guarded: bool,
    absorbed: bool,
    rng: &mut CombatRng,
) -> bool {
    if guarded || absorbed {
        return false;
    }
    !rng.chance(hitstun_null_chance)
}

// ============================================================================
// HP drain
// ============================================================================

/// Drain returned to the source from dealt HP damage, as a self-heal.
pub fn drain_amount(total_generic_damage: i32, drain_percent: i16, source: &EntityState) -> i32 {
    if total_generic_damage <= 0 || drain_percent == 0 {
        return 0;
    }
    let heal_rate = source
        .correct
        .rate(CorrectValue::RateTaken(SkillClass::Heal));
    let amount = (total_generic_damage as f32 * drain_percent as f32 / 100.0 * heal_rate)
        .floor() as i32;
    amount.clamp(-9999, 9999)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SkillDefinition;
    use crate::entity::EntityKind;
    use crate::ids::{EntityId, SkillId};

    fn kb_skill(kind: KnockbackType) -> SkillDefinition {
        SkillDefinition::new(SkillId(1))
            .with_formula(DamageFormula::Normal, 100, 0)
            .with_knockback(1.0, kind, 100)
    }

    fn target_at(x: f32, y: f32) -> EntityState {
        let mut e = EntityState::new(EntityId(2), EntityKind::Enemy, 2);
        e.pos = Position::at(x, y);
        e.hp = 100;
        e
    }

    #[test]
    fn test_eligibility_rules() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        assert!(knockback_eligible(&skill, 10));
        assert!(!knockback_eligible(&skill, 0));

        let mut status_only = kb_skill(KnockbackType::StatusOnly);
        status_only.knockback_modifier = 1.0;
        assert!(!knockback_eligible(&status_only, 50));

        let mut no_modifier = kb_skill(KnockbackType::AwayFromSource);
        no_modifier.knockback_modifier = 0.0;
        assert!(!knockback_eligible(&no_modifier, 50));

        // Non-damaging skills knock back without dealing anything.
        let mut shove = kb_skill(KnockbackType::AwayFromSource);
        shove.formula = DamageFormula::None;
        assert!(knockback_eligible(&shove, 0));
    }

    #[test]
    fn test_window_blocks_second_knockback() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        let mut t = target_at(100.0, 0.0);
        let mut rng = CombatRng::seeded(4);
        let source = Position::at(0.0, 0.0);

        let first = resolve_knockback(
            &skill, &mut t, source, source, true, false, false, 0, 0,
            ServerTime(1_000_000), &mut rng,
        );
        assert!(first.knocked_back);
        assert!(first.outcome.is_some());

        let second = resolve_knockback(
            &skill, &mut t, source, source, true, false, false, 0, 0,
            ServerTime(1_500_000), &mut rng,
        );
        assert!(!second.knocked_back);

        // Window lapsed: knockback works again.
        let third = resolve_knockback(
            &skill, &mut t, source, source, true, false, false, 0, 0,
            ServerTime(3_100_000), &mut rng,
        );
        assert!(third.knocked_back);
    }

    #[test]
    fn test_away_from_source_direction() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        let mut t = target_at(100.0, 0.0);
        let mut rng = CombatRng::seeded(4);
        let source = Position::at(0.0, 0.0);

        let res = resolve_knockback(
            &skill, &mut t, source, source, true, false, false, 0, 0,
            ServerTime(1), &mut rng,
        );
        let outcome = res.outcome.expect("displaced");
        assert!(outcome.x > 100.0);
        assert!((outcome.y).abs() < 1e-3);
        assert!((t.pos.x - outcome.x).abs() < 1e-6);
    }

    #[test]
    fn test_null_keeps_knockback_status_eligibility() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        let mut t = target_at(100.0, 0.0);
        let mut rng = CombatRng::seeded(4);
        let source = Position::at(0.0, 0.0);

        let res = resolve_knockback(
            &skill, &mut t, source, source, true, false, false, 0, 100,
            ServerTime(1), &mut rng,
        );
        assert!(res.knocked_back);
        assert!(res.outcome.is_none());
        assert!((t.pos.x - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_guard_blocks_knockback() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        let mut t = target_at(100.0, 0.0);
        let mut rng = CombatRng::seeded(4);
        let source = Position::at(0.0, 0.0);

        let res = resolve_knockback(
            &skill, &mut t, source, source, true, false, true, 0, 0,
            ServerTime(1), &mut rng,
        );
        assert!(!res.knocked_back);
    }

    #[test]
    fn test_resist_caps_distance_unless_hard_strike() {
        let skill = kb_skill(KnockbackType::AwayFromSource);
        let source = Position::at(0.0, 0.0);

        let mut resistant = target_at(100.0, 0.0);
        resistant.correct.set(CorrectValue::KnockbackResist, 100);
        let mut rng = CombatRng::seeded(4);
        let res = resolve_knockback(
            &skill, &mut resistant, source, source, true, false, false, 0, 0,
            ServerTime(1), &mut rng,
        );
        // Fully resisted displacement, still a knockback hit.
        assert!(res.knocked_back);
        assert!(res.outcome.is_none());

        let mut resistant = target_at(100.0, 0.0);
        resistant.correct.set(CorrectValue::KnockbackResist, 100);
        let res = resolve_knockback(
            &skill, &mut resistant, source, source, true, true, false, 0, 0,
            ServerTime(1), &mut rng,
        );
        assert!(res.outcome.is_some());
    }

    #[test]
    fn test_match_target_teleport() {
        let skill = kb_skill(KnockbackType::MatchTarget);
        let mut t = target_at(100.0, 100.0);
        let mut rng = CombatRng::seeded(4);
        let source = Position::at(0.0, 0.0);
        let anchor = Position::at(30.0, 40.0);

        let res = resolve_knockback(
            &skill, &mut t, source, anchor, false, false, false, 0, 0,
            ServerTime(1), &mut rng,
        );
        let outcome = res.outcome.expect("teleported");
        assert!((outcome.x - 30.0).abs() < 1e-6);
        assert!((outcome.y - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_hit_stop_extends_monotonically() {
        let mut skill = SkillDefinition::new(SkillId(1));
        skill.stiffness_ms = 300;
        let mut t = target_at(0.0, 0.0);

        let timing = apply_hit_stop(&skill, &mut t, true, true, ServerTime(1_000_000));
        assert_eq!(timing.start_stop, ServerTime(1_000_000));
        assert_eq!(
            timing.end_stop,
            ServerTime(1_000_000 + 300_000 + KNOCKBACK_STUN_US)
        );
        let first_deadline = t.status_time(StatusTimeKind::HitStun);
        assert_eq!(first_deadline, timing.end_ailment);

        // A weaker later hit does not shorten the window.
        let mut weak = SkillDefinition::new(SkillId(2));
        weak.stiffness_ms = 10;
        apply_hit_stop(&weak, &mut t, true, false, ServerTime(1_050_000));
        assert!(t.status_time(StatusTimeKind::HitStun) >= first_deadline);
    }

    #[test]
    fn test_ailment_extends_stop() {
        let mut skill = SkillDefinition::new(SkillId(1));
        skill.stiffness_ms = 100;
        let mut t = target_at(0.0, 0.0);
        t.ailment_until = ServerTime(5_000_000);

        let timing = apply_hit_stop(&skill, &mut t, true, false, ServerTime(1_000_000));
        assert_eq!(timing.end_ailment, ServerTime(5_000_000));
        assert_eq!(t.status_time(StatusTimeKind::HitStun), ServerTime(5_000_000));
    }

    #[test]
    fn test_can_hit_stun_gates() {
        let mut rng = CombatRng::seeded(4);
        assert!(!can_hit_stun(0, true, false, &mut rng));
        assert!(!can_hit_stun(0, false, true, &mut rng));
        assert!(can_hit_stun(0, false, false, &mut rng));
        assert!(!can_hit_stun(100, false, false, &mut rng));
    }

    #[test]
    fn test_drain_amount() {
        let mut source = EntityState::new(EntityId(1), EntityKind::Character, 1);
        assert_eq!(drain_amount(1000, 10, &source), 100);
        assert_eq!(drain_amount(0, 10, &source), 0);
        assert_eq!(drain_amount(1000, 0, &source), 0);

        source
            .correct
            .set(CorrectValue::RateTaken(SkillClass::Heal), 50);
        assert_eq!(drain_amount(1000, 10, &source), 50);

        assert_eq!(drain_amount(1_000_000, 50, &source), 9999);
    }
}
