use std::collections::BTreeMap;

use crate::dataset::{Coord, DatasetSchema, DimensionKind, TrialId};

/// Active dimension-name → coordinate mapping that drives what is rendered.
///
/// Kinds come from the dataset schema at load time. Before a dataset is
/// loaded (e.g. while restoring a saved session) values may be held for
/// dimensions the schema does not know yet; their kind is guessed from the name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    values: BTreeMap<String, Coord>,
    kinds: BTreeMap<String, DimensionKind>,
}

impl Selection {
    /// First coordinate of every dimension.
    pub fn default_for(schema: &DatasetSchema) -> Self {
        let mut selection = Selection::default();
        for dim in schema.dimensions() {
            selection.kinds.insert(dim.name.clone(), dim.kind);
            if let Some(first) = dim.coords.first() {
                selection.values.insert(dim.name.clone(), first.clone());
            }
        }
        selection
    }

    pub fn get(&self, dim: &str) -> Option<&Coord> {
        self.values.get(dim)
    }

    /// Returns true when the stored value changed.
    pub(crate) fn set(&mut self, dim: &str, value: Coord) -> bool {
        self.kinds
            .entry(dim.to_string())
            .or_insert_with(|| DimensionKind::from_name(dim));
        match self.values.get(dim) {
            Some(current) if *current == value => false,
            _ => {
                self.values.insert(dim.to_string(), value);
                true
            }
        }
    }

    pub fn kind_of(&self, dim: &str) -> Option<DimensionKind> {
        self.kinds.get(dim).copied()
    }

    pub fn value_of(&self, kind: DimensionKind) -> Option<&Coord> {
        self.kinds
            .iter()
            .find(|(_, k)| **k == kind)
            .and_then(|(name, _)| self.values.get(name))
    }

    pub fn text_of(&self, kind: DimensionKind) -> Option<String> {
        self.value_of(kind).map(Coord::as_text)
    }

    pub fn trial(&self) -> Option<TrialId> {
        self.value_of(DimensionKind::Trial)
            .and_then(Coord::as_int)
            .and_then(|v| TrialId::try_from(v).ok())
    }

    pub fn keypoint(&self) -> Option<String> {
        self.text_of(DimensionKind::Keypoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Coord)> {
        self.values.iter()
    }

    /// Keep only values valid under `schema`, falling back to the first
    /// coordinate elsewhere. Used when a restored session meets a dataset.
    pub fn reconciled_with(&self, schema: &DatasetSchema) -> Selection {
        let mut out = Selection::default_for(schema);
        for dim in schema.dimensions() {
            if let Some(value) = self.values.get(&dim.name) {
                if dim.coords.contains(value) {
                    out.values.insert(dim.name.clone(), value.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DatasetSchema {
        let mut schema = DatasetSchema::new();
        schema.set_dimension("trials", vec![Coord::Int(4), Coord::Int(5)]);
        schema.set_dimension("keypoints", vec!["beak".into(), "tail".into()]);
        schema
    }

    #[test]
    fn default_picks_first_coordinates() {
        let sel = Selection::default_for(&schema());
        assert_eq!(sel.trial(), Some(4));
        assert_eq!(sel.keypoint(), Some("beak".to_string()));
    }

    #[test]
    fn set_reports_changes_only() {
        let mut sel = Selection::default_for(&schema());
        assert!(!sel.set("trials", Coord::Int(4)));
        assert!(sel.set("trials", Coord::Int(5)));
        assert_eq!(sel.trial(), Some(5));
    }

    #[test]
    fn reconcile_drops_unknown_values() {
        let mut restored = Selection::default();
        restored.set("trials", Coord::Int(5));
        restored.set("keypoints", Coord::Text("wing".into()));
        let sel = restored.reconciled_with(&schema());
        assert_eq!(sel.trial(), Some(5));
        assert_eq!(sel.keypoint(), Some("beak".to_string()));
    }
}
