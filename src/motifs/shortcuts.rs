use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::library::MotifId;

/// Non-motif actions reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavAction {
    NextTrial,
    PrevTrial,
    StepForward,
    StepBackward,
    Delete,
    Edit,
    Cancel,
    PlaySelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Motif(MotifId),
    Nav(NavAction),
}

/// Shortcut key → action table. Keys are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyBindings {
    motifs: BTreeMap<String, MotifId>,
    navigation: BTreeMap<String, NavAction>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut motifs = BTreeMap::new();
        for id in 1..=9u16 {
            motifs.insert(id.to_string(), id);
        }
        motifs.insert("0".into(), 10);
        motifs.insert("q".into(), 11);
        motifs.insert("w".into(), 12);
        motifs.insert("r".into(), 13);
        motifs.insert("t".into(), 14);

        let mut navigation = BTreeMap::new();
        navigation.insert("down".into(), NavAction::NextTrial);
        navigation.insert("up".into(), NavAction::PrevTrial);
        navigation.insert("right".into(), NavAction::StepForward);
        navigation.insert("left".into(), NavAction::StepBackward);
        navigation.insert("d".into(), NavAction::Delete);
        navigation.insert("e".into(), NavAction::Edit);
        navigation.insert("escape".into(), NavAction::Cancel);
        navigation.insert("space".into(), NavAction::PlaySelected);

        Self { motifs, navigation }
    }
}

impl KeyBindings {
    pub fn empty() -> Self {
        Self {
            motifs: BTreeMap::new(),
            navigation: BTreeMap::new(),
        }
    }

    pub fn bind_motif(&mut self, key: &str, id: MotifId) {
        let key = normalize(key);
        self.navigation.remove(&key);
        self.motifs.insert(key, id);
    }

    pub fn bind_nav(&mut self, key: &str, action: NavAction) {
        let key = normalize(key);
        self.motifs.remove(&key);
        self.navigation.insert(key, action);
    }

    pub fn resolve(&self, key: &str) -> Option<KeyAction> {
        let key = normalize(key);
        if let Some(id) = self.motifs.get(&key) {
            return Some(KeyAction::Motif(*id));
        }
        self.navigation.get(&key).copied().map(KeyAction::Nav)
    }

    /// Display key for a motif, e.g. for a "(Press Q)" hint.
    pub fn key_for_motif(&self, id: MotifId) -> Option<String> {
        self.motifs
            .iter()
            .find(|(_, bound)| **bound == id)
            .map(|(key, _)| key.to_uppercase())
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_fourteen_motifs() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.resolve("1"), Some(KeyAction::Motif(1)));
        assert_eq!(bindings.resolve("0"), Some(KeyAction::Motif(10)));
        assert_eq!(bindings.resolve("Q"), Some(KeyAction::Motif(11)));
        assert_eq!(bindings.resolve("t"), Some(KeyAction::Motif(14)));
        assert_eq!(bindings.key_for_motif(12), Some("W".to_string()));
        assert_eq!(bindings.resolve("Escape"), Some(KeyAction::Nav(NavAction::Cancel)));
        assert_eq!(bindings.resolve("z"), None);
    }

    #[test]
    fn rebinding_a_key_replaces_previous_action() {
        let mut bindings = KeyBindings::default();
        bindings.bind_nav("q", NavAction::NextTrial);
        assert_eq!(bindings.resolve("q"), Some(KeyAction::Nav(NavAction::NextTrial)));
        bindings.bind_motif("e", 7);
        assert_eq!(bindings.resolve("E"), Some(KeyAction::Motif(7)));
    }
}
