//! Definition store: immutable authored data shared by a zone.

use std::collections::HashMap;

use thiserror::Error;

use crate::definition::{ItemDefinition, SkillDefinition, StatusDefinition};
use crate::ids::{ItemId, SkillId, StatusId};

/// Lookup failures surfaced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("unknown skill {0:?}")]
    UnknownSkill(SkillId),
    #[error("unknown status {0:?}")]
    UnknownStatus(StatusId),
    #[error("unknown item {0:?}")]
    UnknownItem(ItemId),
}

/// All authored definitions the engine consults.
///
/// Built once at startup and shared read-only; see the loader in the
/// embedding server for population from authored JSON.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    skills: HashMap<SkillId, SkillDefinition>,
    statuses: HashMap<StatusId, StatusDefinition>,
    items: HashMap<ItemId, ItemDefinition>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_skill(&mut self, skill: SkillDefinition) -> &mut Self {
        self.skills.insert(skill.id, skill);
        self
    }

    pub fn add_status(&mut self, status: StatusDefinition) -> &mut Self {
        self.statuses.insert(status.id, status);
        self
    }

    pub fn add_item(&mut self, item: ItemDefinition) -> &mut Self {
        self.items.insert(item.id, item);
        self
    }

    pub fn skill(&self, id: SkillId) -> Result<&SkillDefinition, DefinitionError> {
        self.skills.get(&id).ok_or(DefinitionError::UnknownSkill(id))
    }

    pub fn status(&self, id: StatusId) -> Result<&StatusDefinition, DefinitionError> {
        self.statuses
            .get(&id)
            .ok_or(DefinitionError::UnknownStatus(id))
    }

    pub fn item(&self, id: ItemId) -> Result<&ItemDefinition, DefinitionError> {
        self.items.get(&id).ok_or(DefinitionError::UnknownItem(id))
    }

    pub fn all_items(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.values()
    }

    /// Load skills from authored JSON (an array of definitions).
    pub fn load_skills_json(&mut self, json: &str) -> Result<usize, serde_json::Error> {
        let skills: Vec<SkillDefinition> = serde_json::from_str(json)?;
        let count = skills.len();
        for skill in skills {
            self.add_skill(skill);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lookups_are_errors() {
        let store = DefinitionStore::new();
        assert_eq!(
            store.skill(SkillId(9)),
            Err(DefinitionError::UnknownSkill(SkillId(9)))
        );
        assert_eq!(
            store.status(StatusId(9)),
            Err(DefinitionError::UnknownStatus(StatusId(9)))
        );
        assert_eq!(
            store.item(ItemId(9)),
            Err(DefinitionError::UnknownItem(ItemId(9)))
        );
    }

    #[test]
    fn test_register_and_fetch() {
        let mut store = DefinitionStore::new();
        store.add_skill(SkillDefinition::new(SkillId(1)));
        assert!(store.skill(SkillId(1)).is_ok());
    }

    #[test]
    fn test_load_skills_json_roundtrip() {
        let skill = SkillDefinition::new(SkillId(42));
        let json = serde_json::to_string(&vec![skill]).unwrap();
        let mut store = DefinitionStore::new();
        assert_eq!(store.load_skills_json(&json).unwrap(), 1);
        assert!(store.skill(SkillId(42)).is_ok());
    }
}
