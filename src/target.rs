//! Target validation and area-of-effect gathering.
//!
//! Primary validation runs at execution time against the live zone; area
//! gathering runs during the hit phase around the *effective* source, which
//! may differ from the actual source after a reflect.

use std::f32::consts::PI;

use crate::definition::{ActionType, AreaType, SkillDefinition, ValidType};
use crate::entity::{EntityState, Position};
use crate::events::SkillError;
use crate::ids::EntityId;
use crate::world::Zone;

/// Whether a revival-style application may land on a dead target.
///
/// Players must have opted in; AI-controlled entities accept implicitly.
pub fn revival_allowed(target: &EntityState) -> bool {
    !target.is_player || target.accepts_revival
}

/// Validate the primary target of a skill at execution time.
pub fn validate_primary_target(
    zone: &Zone,
    source_id: EntityId,
    target_id: EntityId,
    skill: &SkillDefinition,
) -> Result<(), SkillError> {
    let Some(source) = zone.entity(source_id) else {
        return Err(SkillError::TargetInvalid);
    };
    let Some(target) = zone.entity(target_id) else {
        return Err(SkillError::TargetInvalid);
    };

    if !target.display_active {
        return Err(SkillError::TargetInvalid);
    }

    // Dead targets are only reachable by revival-capable heals.
    if !target.is_alive() {
        if !skill.formula.is_heal() {
            return Err(SkillError::TargetInvalid);
        }
        if !revival_allowed(target) {
            return Err(SkillError::TargetInvalid);
        }
    }

    if skill.action == ActionType::Talk {
        validate_talk_target(source, target)?;
    }

    if skill.target_range > 0 {
        let reach = skill.target_range as f32 + source.hitbox + target.hitbox;
        if source.pos.distance_to(&target.pos) > reach {
            return Err(SkillError::TooFar);
        }
    }

    if !type_compatible(source, target, skill.target) {
        return Err(SkillError::TargetInvalid);
    }

    Ok(())
}

/// Negotiation preconditions: enemy spawn, persuadable, within level.
fn validate_talk_target(source: &EntityState, target: &EntityState) -> Result<(), SkillError> {
    if !source.is_enemy_of(target) {
        return Err(SkillError::TalkInvalid);
    }
    if target.negotiation_locked || target.talk_resist >= 100 {
        return Err(SkillError::TalkInvalidState);
    }
    if target.level > source.level {
        return Err(SkillError::TalkLevel);
    }
    Ok(())
}

/// Relation check between a source and a candidate for one valid type.
fn type_compatible(source: &EntityState, target: &EntityState, valid: ValidType) -> bool {
    match valid {
        ValidType::None => true,
        ValidType::Enemy => source.is_enemy_of(target) && target.is_alive(),
        ValidType::Ally => !source.is_enemy_of(target) && target.is_alive(),
        ValidType::DeadAlly => {
            !source.is_enemy_of(target) && !target.is_alive() && revival_allowed(target)
        }
        ValidType::Party => same_party(source, target) && target.is_alive(),
        ValidType::DeadParty => {
            same_party(source, target) && !target.is_alive() && revival_allowed(target)
        }
        ValidType::Source => {
            target.id == source.id
                || source.partner == Some(target.id)
                || target.partner == Some(source.id)
        }
    }
}

fn same_party(source: &EntityState, target: &EntityState) -> bool {
    source.party.is_some() && source.party == target.party
}

// ============================================================================
// Area gathering
// ============================================================================

/// Gather area targets for a hit.
///
/// `primary` is excluded from the result; callers already hold its result
/// entry. Absorb-skipped areas must be filtered by the caller before this
/// runs.
pub fn gather_area_targets(
    zone: &Zone,
    effective_source: EntityId,
    primary: Option<EntityId>,
    skill: &SkillDefinition,
) -> Vec<EntityId> {
    let Some(source) = zone.entity(effective_source) else {
        return Vec::new();
    };
    let range = skill.area_range as f32;

    let mut gathered: Vec<EntityId> = match skill.area {
        AreaType::None => Vec::new(),
        AreaType::ZoneAll => zone
            .entity_ids()
            .into_iter()
            .filter(|id| zone.entity(*id).is_some_and(|e| e.is_ready()))
            .collect(),
        AreaType::Source => zone.entities_in_radius(source.pos.x, source.pos.y, range),
        AreaType::SourceRadius | AreaType::SourceRadius2 => {
            zone.entities_in_radius(source.pos.x, source.pos.y, range + source.hitbox)
        }
        AreaType::TargetRadius => match primary.and_then(|id| zone.entity(id)) {
            Some(target) => zone.entities_in_radius(target.pos.x, target.pos.y, range),
            None => Vec::new(),
        },
        AreaType::FrontArc1 | AreaType::FrontArc2 | AreaType::FrontArc3 => {
            let half_angle = skill.area_percent as f32 / 100.0 * PI;
            let reach = range + source.hitbox;
            zone.entity_ids()
                .into_iter()
                .filter(|id| {
                    zone.entity(*id).is_some_and(|e| {
                        e.is_ready() && in_front_arc(&source.pos, reach, half_angle, e)
                    })
                })
                .collect()
        }
        AreaType::StraightLine => {
            let Some(target) = primary.and_then(|id| zone.entity(id)) else {
                return Vec::new();
            };
            let heading = source.pos.heading_to(&target.pos);
            let length = source.pos.distance_to(&target.pos).max(range);
            let half_width = skill.area_percent as f32;
            zone.entity_ids()
                .into_iter()
                .filter(|id| {
                    zone.entity(*id).is_some_and(|e| {
                        e.is_ready() && in_line(&source.pos, heading, length, half_width, e)
                    })
                })
                .collect()
        }
    };

    gathered.retain(|id| Some(*id) != primary && *id != effective_source);
    gathered
}

/// Arc test around the source's facing, hitbox-inflated.
fn in_front_arc(source: &Position, reach: f32, half_angle: f32, candidate: &EntityState) -> bool {
    let distance = source.distance_to(&candidate.pos);
    if distance > reach + candidate.hitbox {
        return false;
    }
    if distance <= f32::EPSILON {
        return false;
    }
    let heading = source.heading_to(&candidate.pos);
    angle_difference(heading, source.rot).abs() <= half_angle
}

/// Rectangle test along a heading, hitbox-inflated.
fn in_line(
    source: &Position,
    heading: f32,
    length: f32,
    half_width: f32,
    candidate: &EntityState,
) -> bool {
    let dx = candidate.pos.x - source.x;
    let dy = candidate.pos.y - source.y;
    let along = dx * heading.cos() + dy * heading.sin();
    let across = -dx * heading.sin() + dy * heading.cos();
    along >= 0.0
        && along <= length + candidate.hitbox
        && across.abs() <= half_width + candidate.hitbox
}

/// Smallest signed difference between two angles.
fn angle_difference(a: f32, b: f32) -> f32 {
    let mut diff = a - b;
    while diff > PI {
        diff -= 2.0 * PI;
    }
    while diff < -PI {
        diff += 2.0 * PI;
    }
    diff
}

/// Keep only candidates the skill's valid type allows.
pub fn filter_valid_targets(
    zone: &Zone,
    source_id: EntityId,
    candidates: Vec<EntityId>,
    skill: &SkillDefinition,
) -> Vec<EntityId> {
    let Some(source) = zone.entity(source_id) else {
        return Vec::new();
    };
    candidates
        .into_iter()
        .filter(|id| {
            zone.entity(*id)
                .is_some_and(|target| type_compatible(source, target, skill.target))
        })
        .collect()
}
