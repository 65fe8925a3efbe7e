//! Per-function skill logic: scripted hooks and built-in handlers.
//!
//! A skill definition may carry a function id. At startup the embedding
//! server registers one [`SkillLogic`] per function id, loaded from script
//! files or built in, and the engine invokes whichever hooks the logic's
//! settings declare. Hook returns follow the scripting convention: 0 is
//! success, 1 is an expected failure handled silently, anything else is
//! logged and treated as failure.

use std::collections::HashMap;

use crate::cost::SkillCosts;
use crate::definition::SkillDefinition;
use crate::entity::EntityState;
use crate::events::SkillError;
use crate::ids::{ActivationId, EntityId, FunctionId, ItemId, ServerTime};
use crate::processing::ProcessingSkill;
use crate::tokusei::{AspectType, TokuseiManager};
use crate::world::{SideEffect, WorldConfig, Zone};

pub const HOOK_OK: i32 = 0;
/// Expected failure; the skill fails without an error log.
pub const HOOK_SILENT_FAIL: i32 = 1;

/// Which hooks a logic implements.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookSettings {
    pub validate_activation: bool,
    pub validate_execution: bool,
    pub adjust_cost: bool,
    pub pre_action: bool,
    pub post_action: bool,
    /// The logic replaces the normal execution path entirely.
    pub replaces_execution: bool,
}

/// Read-only view handed to hooks.
pub struct HookContext<'a> {
    pub source: &'a EntityState,
    pub skill: &'a SkillDefinition,
    pub config: &'a WorldConfig,
    pub tokusei: &'a TokuseiManager,
    pub now: ServerTime,
    pub target: Option<EntityId>,
}

/// Behavior bound to one function id.
///
/// Hooks not declared in [`HookSettings`] are never invoked; the defaults
/// succeed so implementations only override what they use. Costs and the
/// processing skill are the only mutable surfaces.
pub trait SkillLogic: Send + Sync {
    fn settings(&self) -> HookSettings;

    fn validate_activation(&self, _ctx: &HookContext<'_>) -> i32 {
        HOOK_OK
    }

    fn validate_execution(&self, _ctx: &HookContext<'_>) -> i32 {
        HOOK_OK
    }

    fn adjust_cost(&self, _ctx: &HookContext<'_>, _costs: &mut SkillCosts) -> i32 {
        HOOK_OK
    }

    fn pre_action(&self, _ctx: &HookContext<'_>, _skill: &mut ProcessingSkill) -> i32 {
        HOOK_OK
    }

    fn post_action(&self, _ctx: &HookContext<'_>, _skill: &ProcessingSkill) -> i32 {
        HOOK_OK
    }

    /// Replacement execution path; only called when the settings declare it.
    /// Costs have been paid by the time this runs.
    fn execute_operation(
        &self,
        _zone: &mut Zone,
        _source: EntityId,
        _activation_id: ActivationId,
    ) -> Result<(), SkillError> {
        Ok(())
    }
}

/// Function id → logic map, immutable after startup.
#[derive(Default)]
pub struct ScriptRegistry {
    handlers: HashMap<FunctionId, Box<dyn SkillLogic>>,
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<u16> = self.handlers.keys().map(|id| id.0).collect();
        ids.sort_unstable();
        f.debug_struct("ScriptRegistry").field("functions", &ids).finish()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(functions::WARP, Box::new(WarpLogic));
        registry.register(functions::SUMMON_DEMON, Box::new(SummonLogic));
        registry.register(functions::DEMON_FUSION, Box::new(DemonFusionLogic));
        registry
    }

    pub fn register(&mut self, function: FunctionId, logic: Box<dyn SkillLogic>) {
        self.handlers.insert(function, logic);
    }

    pub fn get(&self, function: FunctionId) -> Option<&dyn SkillLogic> {
        self.handlers.get(&function).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Interpret a hook return value: `Ok(())` on success, the silent flag on
/// expected failure, and a logged failure otherwise.
pub fn check_hook_result(function: FunctionId, hook: &str, result: i32) -> Result<(), bool> {
    match result {
        HOOK_OK => Ok(()),
        HOOK_SILENT_FAIL => Err(true),
        other => {
            tracing::error!(function = function.0, hook, result = other, "skill hook failed");
            Err(false)
        }
    }
}

// ============================================================================
// Built-in function ids
// ============================================================================

pub mod functions {
    use crate::ids::FunctionId;

    pub const WARP: FunctionId = FunctionId(1);
    pub const SUMMON_DEMON: FunctionId = FunctionId(2);
    pub const DEMON_FUSION: FunctionId = FunctionId(3);
}

/// Magnetite consumed by summoning and fusion.
pub const MAGNETITE: ItemId = ItemId(800);
/// One fusion gauge stock.
pub const FUSION_GAUGE_STOCK: u32 = 10_000;

// ============================================================================
// Built-in handlers
// ============================================================================

/// Teleport skills: hand the destination to the zone manager instead of
/// running the damage pipeline.
struct WarpLogic;

impl SkillLogic for WarpLogic {
    fn settings(&self) -> HookSettings {
        HookSettings {
            replaces_execution: true,
            ..Default::default()
        }
    }

    fn execute_operation(
        &self,
        zone: &mut Zone,
        source: EntityId,
        _activation_id: ActivationId,
    ) -> Result<(), SkillError> {
        let Some(entity) = zone.entity(source) else {
            return Err(SkillError::Generic);
        };
        let (x, y) = (entity.pos.x, entity.pos.y);
        zone.push_side_effect(SideEffect::WarpRequest { entity: source, x, y });
        Ok(())
    }
}

/// Summoning layers a magnetite cost scaled by level and reduced by
/// passives.
struct SummonLogic;

impl SkillLogic for SummonLogic {
    fn settings(&self) -> HookSettings {
        HookSettings {
            adjust_cost: true,
            ..Default::default()
        }
    }

    fn adjust_cost(&self, ctx: &HookContext<'_>, costs: &mut SkillCosts) -> i32 {
        let base = ctx.source.level as i64 * 2;
        let reduce = ctx
            .tokusei
            .aspect_sum(ctx.source.id, AspectType::MagnetiteReduce)
            .clamp(0, 100) as i64;
        let magnetite = (base * (100 - reduce) / 100).max(1) as u32;
        costs.add_item(MAGNETITE, magnetite);
        HOOK_OK
    }
}

/// Compound demon skills add magnetite plus one fusion gauge stock.
struct DemonFusionLogic;

impl SkillLogic for DemonFusionLogic {
    fn settings(&self) -> HookSettings {
        HookSettings {
            adjust_cost: true,
            ..Default::default()
        }
    }

    fn adjust_cost(&self, ctx: &HookContext<'_>, costs: &mut SkillCosts) -> i32 {
        costs.add_item(MAGNETITE, ctx.source.level as u32);
        costs.fusion_gauge += FUSION_GAUGE_STOCK;
        HOOK_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    struct RejectingLogic;

    impl SkillLogic for RejectingLogic {
        fn settings(&self) -> HookSettings {
            HookSettings {
                validate_activation: true,
                ..Default::default()
            }
        }

        fn validate_activation(&self, _ctx: &HookContext<'_>) -> i32 {
            HOOK_SILENT_FAIL
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ScriptRegistry::new();
        assert!(registry.get(FunctionId(9)).is_none());
        registry.register(FunctionId(9), Box::new(RejectingLogic));
        assert!(registry.get(FunctionId(9)).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_builtins_present() {
        let registry = ScriptRegistry::with_builtins();
        assert!(registry.get(functions::WARP).is_some());
        assert!(registry.get(functions::SUMMON_DEMON).is_some());
        assert!(registry.get(functions::DEMON_FUSION).is_some());
    }

    #[test]
    fn test_hook_result_interpretation() {
        assert!(check_hook_result(FunctionId(1), "preAction", HOOK_OK).is_ok());
        assert_eq!(
            check_hook_result(FunctionId(1), "preAction", HOOK_SILENT_FAIL),
            Err(true)
        );
        assert_eq!(check_hook_result(FunctionId(1), "preAction", -3), Err(false));
    }

    #[test]
    fn test_summon_cost_reduction() {
        let mut source = EntityState::new(EntityId(1), EntityKind::Character, 1);
        source.level = 40;
        let mut tokusei = TokuseiManager::new();
        tokusei
            .table_mut(EntityId(1))
            .add_sum(AspectType::MagnetiteReduce, 25);
        let skill = SkillDefinition::new(crate::ids::SkillId(1));
        let config = WorldConfig::default();

        let ctx = HookContext {
            source: &source,
            skill: &skill,
            config: &config,
            tokusei: &tokusei,
            now: ServerTime::ZERO,
            target: None,
        };

        let mut costs = SkillCosts::free();
        assert_eq!(SummonLogic.adjust_cost(&ctx, &mut costs), HOOK_OK);
        // 40 * 2 = 80, reduced 25% -> 60.
        assert_eq!(costs.items.get(&MAGNETITE), Some(&60));
    }

    #[test]
    fn test_fusion_cost_layers() {
        let mut source = EntityState::new(EntityId(1), EntityKind::Character, 1);
        source.level = 30;
        let tokusei = TokuseiManager::new();
        let skill = SkillDefinition::new(crate::ids::SkillId(1));
        let config = WorldConfig::default();

        let ctx = HookContext {
            source: &source,
            skill: &skill,
            config: &config,
            tokusei: &tokusei,
            now: ServerTime::ZERO,
            target: None,
        };

        let mut costs = SkillCosts::free();
        DemonFusionLogic.adjust_cost(&ctx, &mut costs);
        assert_eq!(costs.items.get(&MAGNETITE), Some(&30));
        assert_eq!(costs.fusion_gauge, FUSION_GAUGE_STOCK);
    }
}
