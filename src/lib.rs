//! waza: the skill execution engine of a channel server.
//!
//! Converts skill-use requests from players and AI into validated lifecycle
//! phases: activation, charging, cost payment, execution, hit resolution,
//! post-effects, and completion. The engine owns authoritative combat
//! outcomes inside a zone; packet framing, persistence, pathing, and AI sit
//! behind the event and side-effect queues on [`world::Zone`].

pub mod correct;
pub mod cost;
pub mod damage;
pub mod definition;
pub mod engine;
pub mod entity;
pub mod events;
pub mod hit;
pub mod ids;
pub mod nra;
pub mod processing;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod scripts;
pub mod status;
pub mod target;
pub mod tokusei;
pub mod world;

pub use correct::{Affinity, CorrectTable, CorrectValue, SkillClass};
pub use cost::{ResourceSnapshot, SkillCosts, determine_costs, pay_costs};
pub use damage::{
    CritLevel, DAMAGE_CAP_LIMIT_BREAK, DAMAGE_CAP_NORMAL, NormalDamageInput,
    calculate_normal_damage,
};
pub use definition::{
    ActionType, ActivationType, AddStatusEntry, AdjustRestrict, ApplicationLogic, AreaType,
    DamageFormula, DependencyType, Gender, ItemDefinition, KnockbackType, LncMask,
    SkillCategory, SkillDefinition, SkillRestriction, StatusDefinition, ValidType, WeaponType,
};
pub use engine::{
    ActivateRequest, activate, advance_to, cancel, execute, reactivate_saved_switch_skills,
    retarget,
};
pub use entity::{
    ActivatedAbility, EntityKind, EntityState, EquippedBullet, HpMpOutcome, Position,
    StatusEffectInstance, StatusTimeKind,
};
pub use events::{
    OutboundEvent, REPORT_PACKET_BUDGET, SkillCompleteMode, SkillError, TargetReport,
};
pub use hit::{KNOCKBACK_WINDOW_US, KnockbackResolution};
pub use ids::{
    ActivationId, CooldownGroup, EntityId, FunctionId, ItemId, ServerTime, SkillId, StatusId,
};
pub use nra::{NraKind, NraOutcome, resolve_nra};
pub use processing::{
    AvoidClass, DamageType, EffectCancelFlags, HitFlags1, HitFlags2, ProcessingSkill,
    SkillExecutionContext, SkillTargetResult,
};
pub use registry::{DefinitionError, DefinitionStore};
pub use rng::CombatRng;
pub use scheduler::{Scheduler, Task};
pub use scripts::{
    HOOK_OK, HOOK_SILENT_FAIL, HookContext, HookSettings, ScriptRegistry, SkillLogic,
};
pub use tokusei::{AspectType, CalcSide, CalcStateCache, RecalcTrigger, TokuseiManager};
pub use world::{SideEffect, WorldConfig, Zone};
