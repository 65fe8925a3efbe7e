//! Cost determination and payment.
//!
//! Costs are fully determined and validated before anything is deducted; a
//! failed execution leaves HP, MP, items, bullets, and fusion gauge exactly
//! as they were. Percent HP/MP costs are computed against maximums, then
//! summed with flats. Passive adjustments multiply in unless the skill pins
//! its costs; scripts get the last word through the adjust-cost hook.

use std::collections::HashMap;

use crate::definition::{AdjustRestrict, SkillCategory, SkillDefinition};
use crate::entity::EntityState;
use crate::events::SkillError;
use crate::ids::{ItemId, ServerTime};
use crate::registry::DefinitionStore;
use crate::tokusei::{AspectType, TokuseiManager};
use crate::world::WorldConfig;

/// Fully determined costs for one skill use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillCosts {
    pub hp: u32,
    pub mp: u32,
    pub bullets: u32,
    pub items: HashMap<ItemId, u32>,
    /// Portion of item costs paid by decomposing compressed stacks:
    /// compressed item id → number of stacks to break.
    pub compressible_items: HashMap<ItemId, u32>,
    pub fusion_gauge: u32,
}

impl SkillCosts {
    pub fn free() -> Self {
        Self::default()
    }

    pub fn is_free(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn add_item(&mut self, item: ItemId, count: u32) {
        *self.items.entry(item).or_insert(0) += count;
    }
}

/// Multiply a cost by passive adjustments; each contribution applies as
/// `(1 + x/100)` and any contribution at or below −100 zeroes the cost.
fn apply_cost_adjusts(base: u32, adjusts: &[i32]) -> u32 {
    if base == 0 {
        return 0;
    }
    let mut cost = base as f64;
    for &adjust in adjusts {
        if adjust <= -100 {
            return 0;
        }
        cost *= 1.0 + adjust as f64 / 100.0;
    }
    cost.floor().max(0.0) as u32
}

/// Determine the costs of using `skill`.
///
/// Covers explicit definition costs and the implicit single-use item for
/// item-triggered skills. Function-specific layers (summon magnetite,
/// fusion stock, digitalize, gem crystals) are contributed by the skill's
/// registered logic through the adjust-cost hook afterwards.
pub fn determine_costs(
    skill: &SkillDefinition,
    source: &EntityState,
    tokusei: &TokuseiManager,
    definitions: &DefinitionStore,
    config: &WorldConfig,
    item_trigger: Option<ItemId>,
) -> Result<SkillCosts, SkillError> {
    let mut costs = SkillCosts::free();

    // Passive skills and already-toggled switches cost nothing to process.
    if skill.category == SkillCategory::Passive {
        return Ok(costs);
    }
    if skill.category == SkillCategory::Switch && source.switch_active.contains(&skill.id) {
        return Ok(costs);
    }

    let max_hp = source.max_hp().max(0) as u64;
    let max_mp = source.max_mp().max(0) as u64;
    let hp_base = skill.hp_cost as u64 + max_hp * skill.hp_cost_percent as u64 / 100;
    let mp_base = skill.mp_cost as u64 + max_mp * skill.mp_cost_percent as u64 / 100;
    costs.hp = hp_base.min(u32::MAX as u64) as u32;
    costs.mp = mp_base.min(u32::MAX as u64) as u32;

    if !skill.adjust_restrict.contains(AdjustRestrict::FIXED_COST) {
        costs.hp = apply_cost_adjusts(
            costs.hp,
            tokusei.aspect_list(source.id, AspectType::HpCostAdjust),
        );
        costs.mp = apply_cost_adjusts(
            costs.mp,
            tokusei.aspect_list(source.id, AspectType::MpCostAdjust),
        );
    }

    for &(item, count) in &skill.item_costs {
        costs.add_item(item, count);
    }
    costs.bullets = skill.bullet_cost as u32;

    // A single-use item that triggered the skill is consumed with it.
    if let Some(item) = item_trigger
        && definitions.item(item).is_ok_and(|def| def.single_use)
    {
        costs.add_item(item, 1);
    }

    plan_decompression(&mut costs, source, definitions, config)?;

    Ok(costs)
}

/// Decide how much of each item cost must come from compressed stacks.
///
/// Fails with the cost error when even decomposition cannot cover a cost.
pub fn plan_decompression(
    costs: &mut SkillCosts,
    source: &EntityState,
    definitions: &DefinitionStore,
    config: &WorldConfig,
) -> Result<(), SkillError> {
    let mut compressed: HashMap<ItemId, u32> = HashMap::new();

    for (&item, &need) in &costs.items {
        let have = source.item_count(item);
        if have >= need {
            continue;
        }
        if !config.auto_decompress_for_skill_uses {
            return Err(SkillError::GenericCost);
        }
        let Ok(item_def) = definitions.item(item) else {
            return Err(SkillError::GenericCost);
        };
        let Some((compressed_form, units)) = item_def.decompresses_from else {
            return Err(SkillError::GenericCost);
        };
        if units == 0 {
            return Err(SkillError::GenericCost);
        }
        let short = need - have;
        let break_count = short.div_ceil(units);
        if source.item_count(compressed_form) < break_count {
            return Err(SkillError::GenericCost);
        }
        compressed.insert(compressed_form, break_count);
    }

    costs.compressible_items = compressed;
    Ok(())
}

/// Validate that `source` can pay `costs` right now.
pub fn can_pay(
    costs: &SkillCosts,
    source: &EntityState,
    definitions: &DefinitionStore,
    now: ServerTime,
) -> Result<(), SkillError> {
    // HP costs may not be lethal.
    if costs.hp > 0 && source.hp <= costs.hp as i32 {
        return Err(SkillError::GenericCost);
    }
    if costs.mp > 0 && source.mp < costs.mp as i32 {
        return Err(SkillError::GenericCost);
    }

    for (&item, &need) in &costs.items {
        let mut available = source.item_count(item);
        if let Ok(def) = definitions.item(item)
            && let Some((compressed_form, units)) = def.decompresses_from
            && let Some(&break_count) = costs.compressible_items.get(&compressed_form)
        {
            available = available.saturating_add(break_count * units);
        }
        if available < need {
            return Err(SkillError::GenericCost);
        }
    }

    for (&compressed_form, &break_count) in &costs.compressible_items {
        if source.item_count(compressed_form) < break_count {
            return Err(SkillError::GenericCost);
        }
    }

    if costs.bullets > 0 {
        match &source.equipped_bullet {
            Some(bullet) if bullet.rental_active(now) => {}
            Some(bullet) if bullet.count >= costs.bullets => {}
            _ => return Err(SkillError::GenericCost),
        }
    }

    if costs.fusion_gauge > 0 && source.fusion_gauge < costs.fusion_gauge {
        return Err(SkillError::GenericCost);
    }

    Ok(())
}

/// Deduct `costs` from `source`. Validates first; partial payment never
/// happens.
pub fn pay_costs(
    costs: &SkillCosts,
    source: &mut EntityState,
    definitions: &DefinitionStore,
    now: ServerTime,
) -> Result<(), SkillError> {
    can_pay(costs, source, definitions, now)?;

    // Break compressed stacks first so loose counts cover the costs.
    for (&compressed_form, &break_count) in &costs.compressible_items {
        if !source.remove_items(compressed_form, break_count) {
            return Err(SkillError::GenericCost);
        }
        if let Some((loose, units)) = loose_form(definitions, compressed_form) {
            source.add_items(loose, break_count * units);
        }
    }

    for (&item, &need) in &costs.items {
        if !source.remove_items(item, need) {
            return Err(SkillError::GenericCost);
        }
    }

    if costs.hp > 0 {
        source.hp -= costs.hp as i32;
    }
    if costs.mp > 0 {
        source.mp -= costs.mp as i32;
    }

    if costs.bullets > 0
        && let Some(bullet) = &mut source.equipped_bullet
        && !bullet.rental_active(now)
    {
        bullet.count = bullet.count.saturating_sub(costs.bullets);
    }

    if costs.fusion_gauge > 0 {
        source.fusion_gauge -= costs.fusion_gauge;
    }

    Ok(())
}

/// Find the loose item a compressed stack decomposes into.
fn loose_form(definitions: &DefinitionStore, compressed: ItemId) -> Option<(ItemId, u32)> {
    definitions.all_items().find_map(|def| match def.decompresses_from {
        Some((form, units)) if form == compressed => Some((def.id, units)),
        _ => None,
    })
}

/// Record the determined costs on an activated ability for later reporting
/// and conservation checks.
pub fn record_costs(ability: &mut crate::entity::ActivatedAbility, costs: &SkillCosts) {
    ability.hp_cost = costs.hp;
    ability.mp_cost = costs.mp;
    ability.bullet_cost = costs.bullets;
    ability.item_costs = costs.items.clone();
    ability.compressible_item_costs = costs.compressible_items.clone();
    ability.fusion_gauge_cost = costs.fusion_gauge;
}

/// Snapshot of payable resources, used by conservation checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub hp: i32,
    pub mp: i32,
    pub items: Vec<(ItemId, u32)>,
    pub bullet_count: u32,
    pub fusion_gauge: u32,
}

impl ResourceSnapshot {
    pub fn of(source: &EntityState) -> Self {
        let mut items: Vec<(ItemId, u32)> =
            source.inventory.iter().map(|(&id, &n)| (id, n)).collect();
        items.sort_unstable();
        Self {
            hp: source.hp,
            mp: source.mp,
            items,
            bullet_count: source.equipped_bullet.as_ref().map_or(0, |b| b.count),
            fusion_gauge: source.fusion_gauge,
        }
    }
}
