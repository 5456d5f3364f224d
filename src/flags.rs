//! the persisted unlock/finished flag table

use std::collections::HashMap;

use crate::error::StoryError;

/// Named boolean flags gating storyline availability, e.g.
/// `IS_TUTORIAL_DONE`. The key set is fixed at construction: accessors fail
/// on unknown names, and loading a save merges known keys only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagTable {
    values: HashMap<String, bool>,
}

impl FlagTable {
    /// Seed a flag with its default value. Only used while building a
    /// storyline; later mutation goes through [`FlagTable::set`].
    pub(crate) fn seed(&mut self, name: impl Into<String>, value: bool) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<bool, StoryError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| StoryError::UnknownFlag(name.to_string()))
    }

    pub fn set(&mut self, name: &str, value: bool) -> Result<(), StoryError> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoryError::UnknownFlag(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Non-strict lookup for availability checks, where a missing required
    /// flag means "locked" rather than an error.
    pub(crate) fn peek(&self, name: &str) -> Option<bool> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Copy of the table for serialization.
    pub(crate) fn snapshot(&self) -> HashMap<String, bool> {
        self.values.clone()
    }

    /// Merge a loaded save into the table, keeping only keys that already
    /// exist. Returns how many keys were applied; the rest are dropped
    /// silently, which is what makes stale saves harmless.
    pub(crate) fn merge_known(&mut self, loaded: HashMap<String, bool>) -> usize {
        let mut applied = 0;
        for (name, value) in loaded {
            if let Some(slot) = self.values.get_mut(&name) {
                *slot = value;
                applied += 1;
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::StoryError;

    fn table() -> FlagTable {
        let mut flags = FlagTable::default();
        flags.seed("UNLOCK_A", true);
        flags.seed("DONE_A", false);
        flags
    }

    #[test]
    fn unknown_names_are_a_lookup_error() {
        let mut flags = table();
        assert_eq!(
            flags.get("MISSING"),
            Err(StoryError::UnknownFlag("MISSING".to_string()))
        );
        assert_eq!(
            flags.set("MISSING", true),
            Err(StoryError::UnknownFlag("MISSING".to_string()))
        );
        // the failed set changed nothing
        assert_eq!(flags, table());
    }

    #[test]
    fn merge_keeps_known_keys_and_drops_the_rest() {
        let mut flags = table();
        let loaded = HashMap::from([
            ("DONE_A".to_string(), true),
            ("LEFTOVER_FROM_OLD_SAVE".to_string(), true),
        ]);
        assert_eq!(flags.merge_known(loaded), 1);
        assert_eq!(flags.get("DONE_A"), Ok(true));
        assert!(!flags.contains("LEFTOVER_FROM_OLD_SAVE"));
    }
}
