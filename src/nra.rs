//! Null / Reflect / Absorb resolution.
//!
//! Avoidance has two sources: shield charges granted by status effects
//! (consumed one per prevented hit) and natural chances from the target's
//! calculated stat table. Shields are always spent before chances roll, and
//! within one resolution absorb outranks reflect outranks null.

use smallvec::SmallVec;

use crate::correct::{Affinity, CorrectTable, CorrectValue};
use crate::definition::DependencyType;
use crate::entity::EntityState;
use crate::rng::CombatRng;

/// The three avoidance classes, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NraKind {
    Null = 1,
    Reflect = 2,
    Absorb = 3,
}

impl NraKind {
    /// Evaluation order: strongest first.
    pub const PRECEDENCE: [NraKind; 3] = [NraKind::Absorb, NraKind::Reflect, NraKind::Null];

    fn chance_slot(self, affinity: Affinity) -> CorrectValue {
        match self {
            NraKind::Null => CorrectValue::NullChance(affinity),
            NraKind::Reflect => CorrectValue::ReflectChance(affinity),
            NraKind::Absorb => CorrectValue::AbsorbChance(affinity),
        }
    }
}

/// Result of resolving avoidance for one hit on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NraOutcome {
    pub kind: Option<NraKind>,
    /// Affinity slot that matched.
    pub affinity: Option<Affinity>,
    pub shield_consumed: bool,
    /// Player-versus-player damage floor in place of a full avoidance.
    pub auto_protected: bool,
}

impl NraOutcome {
    pub fn avoided(&self) -> bool {
        self.kind.is_some()
    }
}

/// Affinity slots to check, highest priority first: the class-level slot
/// from the dependency (skipped for almighty), the effective affinity, and
/// the base affinity when an override changed it.
pub fn affinity_chain(
    effective: Affinity,
    base: Affinity,
    dependency: DependencyType,
) -> SmallVec<[Affinity; 3]> {
    let mut chain = SmallVec::new();
    if !effective.is_almighty()
        && let Some(class) = dependency.class_affinity()
    {
        chain.push(class);
    }
    chain.push(effective);
    if base != effective && !base.is_almighty() {
        chain.push(base);
    }
    chain
}

/// Resolve avoidance for a hit.
///
/// Consumes at most one shield charge. In PvP, any positive natural chance
/// along the chain converts the hit into an auto-protected one instead of a
/// full avoidance.
pub fn resolve_nra(
    target: &mut EntityState,
    target_calc: &CorrectTable,
    rng: &mut CombatRng,
    effective: Affinity,
    base: Affinity,
    dependency: DependencyType,
    pvp: bool,
) -> NraOutcome {
    let chain = affinity_chain(effective, base, dependency);

    if pvp {
        let any_chance = NraKind::PRECEDENCE.iter().any(|kind| {
            chain
                .iter()
                .any(|aff| target_calc.value(kind.chance_slot(*aff)) > 0)
        });
        if any_chance {
            return NraOutcome {
                auto_protected: true,
                ..Default::default()
            };
        }
    }

    for kind in NraKind::PRECEDENCE {
        for &affinity in &chain {
            if target.consume_nra_shield(kind, affinity) {
                return NraOutcome {
                    kind: Some(kind),
                    affinity: Some(affinity),
                    shield_consumed: true,
                    auto_protected: false,
                };
            }
            let chance = target_calc.value(kind.chance_slot(affinity));
            if rng.chance(chance) {
                return NraOutcome {
                    kind: Some(kind),
                    affinity: Some(affinity),
                    shield_consumed: false,
                    auto_protected: false,
                };
            }
        }
    }

    NraOutcome::default()
}

/// Avoidance pre-roll for a harmful status effect on its own affinity.
///
/// Any success blocks the application. When `allow_null` is unset, null
/// avoidance is ignored and only reflect/absorb block.
pub fn nra_blocks_status(
    target: &mut EntityState,
    target_calc: &CorrectTable,
    rng: &mut CombatRng,
    affinity: Affinity,
    allow_null: bool,
) -> bool {
    for kind in NraKind::PRECEDENCE {
        if kind == NraKind::Null && !allow_null {
            continue;
        }
        if target.consume_nra_shield(kind, affinity) {
            return true;
        }
        if rng.chance(target_calc.value(kind.chance_slot(affinity))) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::ids::EntityId;

    fn target() -> EntityState {
        EntityState::new(EntityId(2), EntityKind::Enemy, 2)
    }

    #[test]
    fn test_affinity_chain_ordering() {
        let chain = affinity_chain(Affinity::Fire, Affinity::Fire, DependencyType::Spell);
        assert_eq!(chain.as_slice(), &[Affinity::Magic, Affinity::Fire]);

        let chain = affinity_chain(Affinity::Ice, Affinity::Weapon, DependencyType::CloseRange);
        assert_eq!(
            chain.as_slice(),
            &[Affinity::Physical, Affinity::Ice, Affinity::Weapon]
        );
    }

    #[test]
    fn test_almighty_skips_class_slot() {
        let chain = affinity_chain(Affinity::Almighty, Affinity::Almighty, DependencyType::Spell);
        assert_eq!(chain.as_slice(), &[Affinity::Almighty]);
    }

    #[test]
    fn test_support_has_no_class_slot() {
        let chain = affinity_chain(Affinity::Heal, Affinity::Heal, DependencyType::Support);
        assert_eq!(chain.as_slice(), &[Affinity::Heal]);
    }

    #[test]
    fn test_shield_consumed_before_chance() {
        let mut t = target();
        let mut calc = CorrectTable::new();
        // Guaranteed null by chance, but a reflect shield must win first.
        calc.set(CorrectValue::NullChance(Affinity::Fire), 100);
        t.add_nra_shields(NraKind::Reflect, Affinity::Fire, 1);

        let mut rng = CombatRng::seeded(3);
        let outcome = resolve_nra(
            &mut t,
            &calc,
            &mut rng,
            Affinity::Fire,
            Affinity::Fire,
            DependencyType::Spell,
            false,
        );
        assert_eq!(outcome.kind, Some(NraKind::Reflect));
        assert!(outcome.shield_consumed);
        assert_eq!(t.nra_shield_count(NraKind::Reflect, Affinity::Fire), 0);
    }

    #[test]
    fn test_absorb_outranks_reflect_and_null() {
        let mut t = target();
        let mut calc = CorrectTable::new();
        calc.set(CorrectValue::NullChance(Affinity::Fire), 100);
        calc.set(CorrectValue::ReflectChance(Affinity::Fire), 100);
        calc.set(CorrectValue::AbsorbChance(Affinity::Fire), 100);

        let mut rng = CombatRng::seeded(3);
        let outcome = resolve_nra(
            &mut t,
            &calc,
            &mut rng,
            Affinity::Fire,
            Affinity::Fire,
            DependencyType::Spell,
            false,
        );
        assert_eq!(outcome.kind, Some(NraKind::Absorb));
        assert!(!outcome.shield_consumed);
    }

    #[test]
    fn test_no_avoidance_means_clean_hit() {
        let mut t = target();
        let calc = CorrectTable::new();
        let mut rng = CombatRng::seeded(3);
        let outcome = resolve_nra(
            &mut t,
            &calc,
            &mut rng,
            Affinity::Slash,
            Affinity::Slash,
            DependencyType::CloseRange,
            false,
        );
        assert!(!outcome.avoided());
        assert!(!outcome.auto_protected);
    }

    #[test]
    fn test_pvp_auto_protect_consumes_nothing() {
        let mut t = target();
        let mut calc = CorrectTable::new();
        calc.set(CorrectValue::AbsorbChance(Affinity::Fire), 30);
        t.add_nra_shields(NraKind::Absorb, Affinity::Fire, 1);

        let mut rng = CombatRng::seeded(3);
        let outcome = resolve_nra(
            &mut t,
            &calc,
            &mut rng,
            Affinity::Fire,
            Affinity::Fire,
            DependencyType::Spell,
            true,
        );
        assert!(outcome.auto_protected);
        assert!(!outcome.avoided());
        assert_eq!(t.nra_shield_count(NraKind::Absorb, Affinity::Fire), 1);
    }

    #[test]
    fn test_status_block_respects_null_gate() {
        let mut t = target();
        let mut calc = CorrectTable::new();
        calc.set(CorrectValue::NullChance(Affinity::Curse), 100);

        let mut rng = CombatRng::seeded(3);
        assert!(nra_blocks_status(&mut t, &calc, &mut rng, Affinity::Curse, true));
        assert!(!nra_blocks_status(&mut t, &calc, &mut rng, Affinity::Curse, false));

        // Reflect shields block regardless of the null gate.
        t.add_nra_shields(NraKind::Reflect, Affinity::Curse, 1);
        assert!(nra_blocks_status(&mut t, &calc, &mut rng, Affinity::Curse, false));
        assert_eq!(t.nra_shield_count(NraKind::Reflect, Affinity::Curse), 0);
    }
}
