use std::fmt;

use serde::{Deserialize, Serialize};

pub type TrialId = u32;

/// Recognized roles a dataset dimension can play in a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DimensionKind {
    Trial,
    Keypoint,
    Individual,
    Feature,
    Camera,
    Mic,
    Other,
}

impl DimensionKind {
    /// Guess a kind from a dimension name as found in the dataset.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "trial" | "trials" => DimensionKind::Trial,
            "keypoint" | "keypoints" => DimensionKind::Keypoint,
            "individual" | "individuals" => DimensionKind::Individual,
            "feature" | "features" | "variable" | "variables" => DimensionKind::Feature,
            "camera" | "cameras" => DimensionKind::Camera,
            "mic" | "mics" => DimensionKind::Mic,
            _ => DimensionKind::Other,
        }
    }
}

/// A coordinate value along a dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coord {
    Int(i64),
    Text(String),
}

impl Coord {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Coord::Int(v) => Some(*v),
            Coord::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Coord::Int(v) => v.to_string(),
            Coord::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Int(v) => write!(f, "{v}"),
            Coord::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Coord {
    fn from(value: &str) -> Self {
        Coord::Text(value.to_string())
    }
}

impl From<i64> for Coord {
    fn from(value: i64) -> Self {
        Coord::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub kind: DimensionKind,
    pub coords: Vec<Coord>,
}

/// Dimensions a dataset exposes for selection, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSchema {
    dims: Vec<Dimension>,
}

impl DatasetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a dimension; the kind is derived from the name.
    pub fn set_dimension(&mut self, name: &str, coords: Vec<Coord>) {
        let kind = DimensionKind::from_name(name);
        if let Some(existing) = self.dims.iter_mut().find(|d| d.name == name) {
            existing.coords = coords;
            return;
        }
        self.dims.push(Dimension {
            name: name.to_string(),
            kind,
            coords,
        });
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    pub fn by_kind(&self, kind: DimensionKind) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_derived_from_names() {
        assert_eq!(DimensionKind::from_name("trials"), DimensionKind::Trial);
        assert_eq!(DimensionKind::from_name("Keypoints"), DimensionKind::Keypoint);
        assert_eq!(DimensionKind::from_name("variables"), DimensionKind::Feature);
        assert_eq!(DimensionKind::from_name("space"), DimensionKind::Other);
    }

    #[test]
    fn set_dimension_replaces_coords_in_place() {
        let mut schema = DatasetSchema::new();
        schema.set_dimension("trials", vec![Coord::Int(1)]);
        schema.set_dimension("keypoints", vec!["beak".into()]);
        schema.set_dimension("trials", vec![Coord::Int(1), Coord::Int(2)]);
        assert_eq!(schema.dimensions().len(), 2);
        assert_eq!(schema.dimensions()[0].coords.len(), 2);
        assert_eq!(schema.by_kind(DimensionKind::Keypoint).unwrap().name, "keypoints");
    }
}
