//! Outbound lifecycle events and failure codes.
//!
//! Events are buffered on the zone and drained by the embedding server; the
//! engine never frames packets itself. Hit reports are batched to stay under
//! the transport cap, with a fresh executed event ahead of each batch so
//! clients keep their state in sync.

use num_derive::FromPrimitive;
use thiserror::Error;

use crate::ids::{ActivationId, EntityId, ServerTime, SkillId, StatusId};
use crate::processing::{
    AvoidClass, DamageType, HitFlags1, HitFlags2, SkillTargetResult,
};

/// Approximate transport budget for one reports packet.
pub const REPORT_PACKET_BUDGET: usize = 60 * 1024;

/// Client-visible failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Error)]
#[repr(u8)]
pub enum SkillError {
    #[error("skill is cooling down")]
    CoolingDown = 0,
    /// Failure with no client notification at all.
    #[error("silent failure")]
    SilentFail = 1,
    #[error("generic failure")]
    Generic = 2,
    #[error("skill cannot be used")]
    GenericUse = 3,
    #[error("cost cannot be paid")]
    GenericCost = 4,
    #[error("invalid target")]
    TargetInvalid = 5,
    #[error("target out of range")]
    TooFar = 6,
    #[error("condition restriction")]
    ConditionRestrict = 7,
    #[error("use restricted")]
    RestrictedUse = 8,
    #[error("location restriction")]
    LocationRestrict = 9,
    #[error("invalid zone")]
    ZoneInvalid = 10,
    #[error("another skill restricts mounting")]
    MountOtherSkillRestrict = 11,
    #[error("mount item missing")]
    MountItemMissing = 12,
    #[error("mount item durability exhausted")]
    MountItemDurability = 13,
    #[error("mount demon invalid")]
    MountDemonInvalid = 14,
    #[error("mount demon condition not met")]
    MountDemonCondition = 15,
    #[error("mount movement restricted")]
    MountMoveRestrict = 16,
    #[error("mount target too far")]
    MountTooFar = 17,
    #[error("mount summon restricted")]
    MountSummonRestrict = 18,
    #[error("activation failure")]
    ActivationFailure = 19,
    #[error("summon level too low")]
    SummonLevel = 20,
    #[error("summon invalid")]
    SummonInvalid = 21,
    #[error("partner missing")]
    PartnerMissing = 22,
    #[error("partner dead")]
    PartnerDead = 23,
    #[error("partner incompatible")]
    PartnerIncompatible = 24,
    #[error("item cannot be used")]
    ItemUse = 25,
    #[error("no inventory space")]
    InventorySpace = 26,
    #[error("partner familiarity too low")]
    MoochPartnerFamiliarity = 27,
    #[error("nothing happened here")]
    NothingHappenedHere = 28,
    #[error("nothing happened now")]
    NothingHappenedNow = 29,
    #[error("action should be retried")]
    ActionRetry = 30,
    #[error("time restriction")]
    TimeRestrict = 31,
    #[error("talk target invalid")]
    TalkInvalid = 32,
    #[error("talk target in invalid state")]
    TalkInvalidState = 33,
    #[error("talk target level too high")]
    TalkLevel = 34,
}

/// Completion mode reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum SkillCompleteMode {
    Done = 0,
    /// Cancelled after at least one execution; cooldown applies and the
    /// client releases its charge UI.
    CancelledWithCooldown = 1,
}

/// Per-target slice of a hit report.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport {
    pub entity: EntityId,
    pub damage1: i32,
    pub damage1_type: DamageType,
    pub damage2: i32,
    pub damage2_type: DamageType,
    pub flags1: HitFlags1,
    pub flags2: HitFlags2,
    pub hit_avoided: bool,
    pub hit_null: Option<AvoidClass>,
    pub hit_reflect: Option<AvoidClass>,
    pub hit_absorb: bool,
    pub technical_damage: i32,
    pub pursuit_damage: i32,
    pub ailment_damage: i32,
    pub ailment_duration_ms: u32,
    pub added_statuses: Vec<(StatusId, i8)>,
    pub cancelled_statuses: Vec<StatusId>,
    pub knockback: Option<(f32, f32)>,
}

impl TargetReport {
    pub fn from_result(result: &SkillTargetResult) -> Self {
        Self {
            entity: result.entity,
            damage1: result.damage1,
            damage1_type: result.damage1_type,
            damage2: result.damage2,
            damage2_type: result.damage2_type,
            flags1: result.flags1,
            flags2: result.flags2,
            hit_avoided: result.hit_avoided,
            hit_null: result.hit_null,
            hit_reflect: result.hit_reflect,
            hit_absorb: result.hit_absorb,
            technical_damage: result.technical_damage,
            pursuit_damage: result.pursuit_damage,
            ailment_damage: result.ailment_damage,
            ailment_duration_ms: result.ailment_duration_ms,
            added_statuses: result.added_statuses.clone(),
            cancelled_statuses: result.cancelled_statuses.clone(),
            knockback: result.knockback.map(|k| (k.x, k.y)),
        }
    }

    /// Conservative wire-size estimate used by batching.
    pub fn estimated_size(&self) -> usize {
        96 + 8 * (self.added_statuses.len() + self.cancelled_statuses.len())
    }
}

/// Discriminated lifecycle message to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    SkillActivated {
        source: EntityId,
        skill: SkillId,
        activation_id: ActivationId,
        charged_time: ServerTime,
        max_use_count: u8,
        category: crate::definition::SkillCategory,
        charge_move_speed: f32,
        charge_complete_move_speed: f32,
    },
    SkillExecuted {
        source: EntityId,
        skill: SkillId,
        activation_id: ActivationId,
        target: Option<EntityId>,
        cooldown_time: ServerTime,
        lock_out_time: ServerTime,
        hp_cost: u32,
        mp_cost: u32,
        rush_start: Option<(f32, f32)>,
        hard_strike: bool,
    },
    /// Combined execute/complete for instant activations, carrying the
    /// error code on failure.
    SkillExecutedInstant {
        error: Option<SkillError>,
        source: EntityId,
        skill: SkillId,
        target: Option<EntityId>,
        cooldown_time: ServerTime,
        hp_cost: u32,
        mp_cost: u32,
    },
    SkillCompleted {
        source: EntityId,
        skill: SkillId,
        activation_id: ActivationId,
        cooldown_time: ServerTime,
        movement_speed: f32,
        mode: SkillCompleteMode,
    },
    SkillFailed {
        source: EntityId,
        skill: SkillId,
        activation_id: ActivationId,
        error: SkillError,
    },
    SkillReports {
        source: EntityId,
        skill: SkillId,
        activation_id: ActivationId,
        targets: Vec<TargetReport>,
    },
    SkillSwitch {
        source: EntityId,
        skill: SkillId,
        on: bool,
    },
}

/// Split target reports into packet-sized batches.
///
/// The first batch follows the already-sent executed event; every later
/// batch is preceded by a fresh copy of it.
pub fn batch_skill_reports(
    executed: &OutboundEvent,
    source: EntityId,
    skill: SkillId,
    activation_id: ActivationId,
    targets: Vec<TargetReport>,
) -> Vec<OutboundEvent> {
    let mut batches: Vec<Vec<TargetReport>> = Vec::new();
    let mut batch: Vec<TargetReport> = Vec::new();
    let mut batch_size = 0usize;

    for report in targets {
        let size = report.estimated_size();
        if !batch.is_empty() && batch_size + size > REPORT_PACKET_BUDGET {
            batches.push(std::mem::take(&mut batch));
            batch_size = 0;
        }
        batch_size += size;
        batch.push(report);
    }
    batches.push(batch);

    let mut events = Vec::new();
    for (index, targets) in batches.into_iter().enumerate() {
        if index > 0 {
            events.push(executed.clone());
        }
        events.push(OutboundEvent::SkillReports {
            source,
            skill,
            activation_id,
            targets,
        });
    }
    events
}
