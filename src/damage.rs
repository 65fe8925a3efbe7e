//! Damage math.
//!
//! Pure functions over calculated stat tables. Single-precision floats with
//! floors at the documented points; final amounts saturate into `i32` and
//! clamp to the report caps.

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::definition::{DamageFormula, DependencyType};
use crate::rng::CombatRng;

/// Report cap for uncritical damage.
pub const DAMAGE_CAP_NORMAL: i32 = 9999;
/// Report cap once limit break is reached.
pub const DAMAGE_CAP_LIMIT_BREAK: i32 = 30000;

/// Critical tier of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CritLevel {
    #[default]
    None,
    Critical,
    LimitBreak,
}

/// Inputs for one normal-formula channel.
#[derive(Debug, Clone)]
pub struct NormalDamageInput {
    pub offense: i32,
    pub defense: i32,
    /// Authored modifier, percent.
    pub modifier: u16,
    /// Expertise-rank offense bonus, added at half weight.
    pub exp_rank_boost: i32,
    /// Resist fraction; negative values are weaknesses.
    pub resist: f32,
    /// Boost fraction, already capped.
    pub boost: f32,
    /// Product of all dealt/taken rate multipliers.
    pub rate_multiplier: f32,
    pub crit: CritLevel,
    /// Limit-break damage stat, percent of the base 1.5 scale.
    pub limit_break_damage: i32,
    /// Fraction of defense ignored on a critical.
    pub crit_defense_reduction: f32,
    /// Skip variance and crit scaling (simple-formula skills).
    pub simple: bool,
    /// Minimum-damage passives at or above the crit tier floor the result
    /// to 1.
    pub min_damage_floor: bool,
}

impl Default for NormalDamageInput {
    fn default() -> Self {
        Self {
            offense: 0,
            defense: 0,
            modifier: 100,
            exp_rank_boost: 0,
            resist: 0.0,
            boost: 0.0,
            rate_multiplier: 1.0,
            crit: CritLevel::None,
            limit_break_damage: 100,
            crit_defense_reduction: 0.0,
            simple: false,
            min_damage_floor: false,
        }
    }
}

/// Offense stat for a dependency: main slot plus half the secondary.
pub fn offense_value(calc: &CorrectTable, dependency: DependencyType) -> i32 {
    let (main, secondary) = dependency.offense_slots();
    let mut offense = calc.value(main);
    if let Some(secondary) = secondary {
        offense += calc.value(secondary) / 2;
    }
    offense
}

/// Capped boost fraction for an affinity, including the weapon slot when
/// the skill's affinity came from the weapon.
pub fn boost_fraction(
    calc: &CorrectTable,
    affinity: Affinity,
    include_weapon: bool,
    cap_percent: i32,
) -> f32 {
    let mut boost = calc.value(CorrectValue::Boost(affinity));
    if include_weapon && affinity != Affinity::Weapon {
        boost += calc.value(CorrectValue::Boost(Affinity::Weapon));
    }
    boost.min(cap_percent) as f32 / 100.0
}

/// Run the normal damage pipeline for one channel.
pub fn calculate_normal_damage(input: &NormalDamageInput, rng: &mut CombatRng) -> i32 {
    if input.modifier == 0 {
        return 0;
    }

    let scale = if input.simple {
        1.0
    } else {
        match input.crit {
            CritLevel::None => rng.range_i32(80, 99) as f32 / 100.0,
            CritLevel::Critical => 1.2,
            CritLevel::LimitBreak => 1.5 * input.limit_break_damage as f32 / 100.0,
        }
    };

    let defense = if !input.simple && input.crit != CritLevel::None {
        input.defense as f32 * (1.0 - input.crit_defense_reduction)
    } else {
        input.defense as f32
    };

    let attack = input.offense as f32 * input.modifier as f32 / 100.0
        + input.exp_rank_boost as f32 * 0.5;
    let mut raw = (attack - defense).max(0.0);

    raw *= scale;
    raw *= 1.0 + -input.resist;
    raw *= 1.0 + input.boost;
    raw *= input.rate_multiplier;

    let mut amount = raw.floor() as i32;
    if amount < 1 && attack > 0.0 {
        amount = 1;
    }
    if input.min_damage_floor && amount > 0 {
        amount = 1;
    }
    amount
}

/// Literal-style formulas: static amounts and HP percentages.
pub fn formula_amount(
    formula: DamageFormula,
    modifier: u16,
    target_current: i32,
    target_max: i32,
    source_current: i32,
) -> i32 {
    let modifier = modifier as i64;
    let amount = match formula {
        DamageFormula::Static | DamageFormula::HealStatic => modifier,
        DamageFormula::Percent | DamageFormula::HealPercent => {
            target_current.max(0) as i64 * modifier / 100
        }
        DamageFormula::MaxPercent | DamageFormula::HealMaxPercent => {
            target_max.max(0) as i64 * modifier / 100
        }
        DamageFormula::SourcePercent => source_current.max(0) as i64 * modifier / 100,
        _ => 0,
    };
    amount.clamp(0, i32::MAX as i64) as i32
}

/// Clamp a channel to its report cap.
pub fn cap_damage(amount: i32, crit: CritLevel, intensive_cap_bonus: i32) -> i32 {
    let cap = match crit {
        CritLevel::LimitBreak if intensive_cap_bonus > 0 => {
            DAMAGE_CAP_LIMIT_BREAK.saturating_add(intensive_cap_bonus)
        }
        CritLevel::LimitBreak => DAMAGE_CAP_LIMIT_BREAK,
        _ => DAMAGE_CAP_NORMAL,
    };
    amount.min(cap)
}

/// Reduce an indirect target's damage; a positive base never reduces to 0.
pub fn apply_aoe_reduction(amount: i32, reduction_percent: u16) -> i32 {
    if amount <= 0 || reduction_percent == 0 {
        return amount;
    }
    let reduced =
        (amount as i64 * (100 - reduction_percent.min(100)) as i64 / 100) as i32;
    reduced.max(1)
}

/// Roll the critical tier for one hit.
///
/// The rate is evaluated in basis points: the attack side grows with the
/// crit stat, the defense side with crit defense and luck.
pub fn crit_level(
    attack_calc: &CorrectTable,
    defend_calc: &CorrectTable,
    knowledge_boost: i32,
    final_crit_bonus: i32,
    rng: &mut CombatRng,
) -> CritLevel {
    let crit =
        attack_calc.value(CorrectValue::Critical) + attack_calc.value(CorrectValue::Luck) + knowledge_boost;
    if crit <= 0 {
        return CritLevel::None;
    }

    let crit_def1 = (defend_calc.value(CorrectValue::CritDefense) as f32 / 5.0).max(0.0);
    let crit_def2 = 1.0 + defend_calc.value(CorrectValue::Luck) as f32 / 100.0;

    let numerator = (crit / 5) as f32 * (1.0 + crit as f32 / 100.0);
    let denominator = (crit_def1 * crit_def2).max(1.0);
    let rate_bp = (numerator / denominator * 100.0).floor() as i32 + final_crit_bonus;

    if !rng.chance_bp(rate_bp) {
        return CritLevel::None;
    }
    if rng.chance(attack_calc.value(CorrectValue::LimitBreakChance)) {
        CritLevel::LimitBreak
    } else {
        CritLevel::Critical
    }
}

/// Pursuit follow-up: a fraction of the base damage, never exceeding it.
pub fn pursuit_damage(base: i32, power_percent: i32) -> i32 {
    if base <= 0 {
        return 0;
    }
    let power = power_percent.max(1);
    let amount = (base as i64 * power as i64 / 100) as i32;
    amount.clamp(1, base)
}

/// Technical follow-up, capped like the base channel.
pub fn technical_damage(
    base: i32,
    power_percent: i32,
    crit: CritLevel,
    intensive_cap_bonus: i32,
) -> i32 {
    if base <= 0 || power_percent <= 0 {
        return 0;
    }
    let amount = (base as i64 * power_percent as i64 / 100) as i32;
    cap_damage(amount.max(0), crit, intensive_cap_bonus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_damage_range() {
        // CLSR 500 against PDEF 100 with a 150 modifier lands in
        // [520, 643] across the variance range.
        let input = NormalDamageInput {
            offense: 500,
            defense: 100,
            modifier: 150,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        for _ in 0..200 {
            let damage = calculate_normal_damage(&input, &mut rng);
            assert!((520..=643).contains(&damage), "damage {damage} out of range");
        }
    }

    #[test]
    fn test_variance_bounds_are_exact() {
        // (500 * 1.5 - 100) * 0.80 = 520 and * 0.99 = 643.5 -> 643.
        let base = 500.0f32 * 1.5 - 100.0;
        assert_eq!((base * 0.80).floor() as i32, 520);
        assert_eq!((base * 0.99).floor() as i32, 643);
    }

    #[test]
    fn test_crit_scale_and_defense_reduction() {
        let input = NormalDamageInput {
            offense: 500,
            defense: 100,
            modifier: 150,
            crit: CritLevel::Critical,
            crit_defense_reduction: 0.5,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        // (750 - 50) * 1.2 = 840, deterministic under crit.
        assert_eq!(calculate_normal_damage(&input, &mut rng), 840);
    }

    #[test]
    fn test_limit_break_scale() {
        let input = NormalDamageInput {
            offense: 500,
            defense: 0,
            modifier: 100,
            crit: CritLevel::LimitBreak,
            limit_break_damage: 120,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        // 500 * 1.5 * 1.2 = 900.
        assert_eq!(calculate_normal_damage(&input, &mut rng), 900);
    }

    #[test]
    fn test_resist_and_boost() {
        let input = NormalDamageInput {
            offense: 100,
            defense: 0,
            modifier: 100,
            resist: 0.5,
            boost: 0.25,
            simple: true,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        // 100 * 0.5 * 1.25 = 62.5 -> 62.
        assert_eq!(calculate_normal_damage(&input, &mut rng), 62);
    }

    #[test]
    fn test_minimum_one_when_attack_is_positive() {
        let input = NormalDamageInput {
            offense: 10,
            defense: 10_000,
            modifier: 100,
            simple: true,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        assert_eq!(calculate_normal_damage(&input, &mut rng), 1);

        let zero = NormalDamageInput {
            offense: 10,
            defense: 10_000,
            modifier: 0,
            simple: true,
            ..Default::default()
        };
        assert_eq!(calculate_normal_damage(&zero, &mut rng), 0);
    }

    #[test]
    fn test_min_damage_floor() {
        let input = NormalDamageInput {
            offense: 500,
            defense: 0,
            modifier: 200,
            simple: true,
            min_damage_floor: true,
            ..Default::default()
        };
        let mut rng = CombatRng::seeded(11);
        assert_eq!(calculate_normal_damage(&input, &mut rng), 1);
    }

    #[test]
    fn test_formula_amounts() {
        assert_eq!(
            formula_amount(DamageFormula::Static, 500, 100, 1000, 0),
            500
        );
        assert_eq!(
            formula_amount(DamageFormula::Percent, 50, 600, 1000, 0),
            300
        );
        assert_eq!(
            formula_amount(DamageFormula::MaxPercent, 25, 600, 1000, 0),
            250
        );
        assert_eq!(
            formula_amount(DamageFormula::SourcePercent, 10, 0, 0, 730),
            73
        );
    }

    #[test]
    fn test_damage_caps() {
        assert_eq!(cap_damage(50_000, CritLevel::None, 0), DAMAGE_CAP_NORMAL);
        assert_eq!(cap_damage(50_000, CritLevel::Critical, 0), DAMAGE_CAP_NORMAL);
        assert_eq!(
            cap_damage(50_000, CritLevel::LimitBreak, 0),
            DAMAGE_CAP_LIMIT_BREAK
        );
        assert_eq!(
            cap_damage(50_000, CritLevel::LimitBreak, 5000),
            DAMAGE_CAP_LIMIT_BREAK + 5000
        );
    }

    #[test]
    fn test_aoe_reduction_never_zeroes() {
        assert_eq!(apply_aoe_reduction(100, 30), 70);
        assert_eq!(apply_aoe_reduction(1, 99), 1);
        assert_eq!(apply_aoe_reduction(0, 50), 0);
        assert_eq!(apply_aoe_reduction(100, 100), 1);
    }

    #[test]
    fn test_offense_value_combined() {
        let mut calc = CorrectTable::new();
        calc.set(CorrectValue::CloseRange, 400);
        calc.set(CorrectValue::Spell, 300);
        assert_eq!(offense_value(&calc, DependencyType::CloseRange), 400);
        assert_eq!(offense_value(&calc, DependencyType::CloseRangeSpell), 550);
        assert_eq!(offense_value(&calc, DependencyType::SpellCloseRange), 500);
    }

    #[test]
    fn test_boost_cap() {
        let mut calc = CorrectTable::new();
        calc.set(CorrectValue::Boost(Affinity::Fire), 180);
        calc.set(CorrectValue::Boost(Affinity::Weapon), 40);
        assert!((boost_fraction(&calc, Affinity::Fire, false, 100) - 1.0).abs() < 1e-6);
        assert!((boost_fraction(&calc, Affinity::Fire, false, 200) - 1.8).abs() < 1e-6);
        assert!((boost_fraction(&calc, Affinity::Fire, true, 300) - 2.2).abs() < 1e-6);
    }

    #[test]
    fn test_pursuit_capped_at_base() {
        assert_eq!(pursuit_damage(100, 50), 50);
        assert_eq!(pursuit_damage(100, 300), 100);
        assert_eq!(pursuit_damage(100, 0), 1);
        assert_eq!(pursuit_damage(0, 50), 0);
    }

    #[test]
    fn test_technical_damage_caps() {
        assert_eq!(technical_damage(1000, 50, CritLevel::None, 0), 500);
        assert_eq!(
            technical_damage(30_000, 200, CritLevel::None, 0),
            DAMAGE_CAP_NORMAL
        );
        assert_eq!(technical_damage(0, 50, CritLevel::None, 0), 0);
    }

    #[test]
    fn test_crit_level_rates() {
        let mut attack = CorrectTable::new();
        attack.set(CorrectValue::Critical, 200);
        attack.set(CorrectValue::Luck, 50);
        attack.set(CorrectValue::LimitBreakChance, 100);
        let defend = CorrectTable::new();

        // With no crit defense the rate saturates; LB chance 100 always
        // upgrades.
        let mut rng = CombatRng::seeded(5);
        let mut saw_limit_break = false;
        for _ in 0..50 {
            if crit_level(&attack, &defend, 0, 0, &mut rng) == CritLevel::LimitBreak {
                saw_limit_break = true;
            }
        }
        assert!(saw_limit_break);

        let zero = CorrectTable::new();
        assert_eq!(
            crit_level(&zero, &defend, 0, 0, &mut rng),
            CritLevel::None
        );
    }
}
