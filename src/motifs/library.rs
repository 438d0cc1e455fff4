use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{AnnotatorError, AnnotatorResult};

pub type MotifId = u16;

/// Label value written for unlabeled frames.
pub const BACKGROUND_MOTIF: MotifId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotifDefinition {
    pub id: MotifId,
    pub name: String,
    pub color: Rgb,
}

impl MotifDefinition {
    pub fn background() -> Self {
        Self {
            id: BACKGROUND_MOTIF,
            name: "background".into(),
            color: Rgb::WHITE,
        }
    }
}

/// A skipped line from a motif definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub content: String,
    pub reason: String,
}

/// What happened while loading a definition file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub missing_file: bool,
    pub skipped: Vec<SkippedLine>,
    pub duplicates: Vec<MotifId>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        !self.missing_file && self.skipped.is_empty() && self.duplicates.is_empty()
    }
}

/// Static id → definition mapping, loaded once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct MotifLibrary {
    motifs: BTreeMap<MotifId, MotifDefinition>,
}

impl Default for MotifLibrary {
    fn default() -> Self {
        let mut motifs = BTreeMap::new();
        motifs.insert(BACKGROUND_MOTIF, MotifDefinition::background());
        Self { motifs }
    }
}

impl MotifLibrary {
    /// Load `id name r g b` records from `path`.
    ///
    /// A missing file is not an error: the library holds only the background
    /// entry and `LoadReport::missing_file` is set. Other IO failures are.
    pub fn load(path: &Path) -> AnnotatorResult<(Self, LoadReport)> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "motif file {} not found; only background motif available",
                    path.display()
                );
                let report = LoadReport {
                    missing_file: true,
                    ..LoadReport::default()
                };
                Ok((Self::default(), report))
            }
            Err(err) => Err(AnnotatorError::io(
                format!("failed to read motif file {}", path.display()),
                err,
            )),
        }
    }

    pub fn parse(contents: &str) -> (Self, LoadReport) {
        let mut library = Self::default();
        let mut report = LoadReport::default();
        let mut seen = Vec::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_record(line) {
                Ok(definition) => {
                    if seen.contains(&definition.id) {
                        report.duplicates.push(definition.id);
                    } else {
                        seen.push(definition.id);
                    }
                    // Later records replace earlier ones, including the default background.
                    library.motifs.insert(definition.id, definition);
                }
                Err(err) => {
                    warn!("skipping motif line {}: {} ({})", idx + 1, line, err);
                    report.skipped.push(SkippedLine {
                        line_no: idx + 1,
                        content: line.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        (library, report)
    }

    pub fn get(&self, id: MotifId) -> Option<&MotifDefinition> {
        self.motifs.get(&id)
    }

    pub fn contains(&self, id: MotifId) -> bool {
        self.motifs.contains_key(&id)
    }

    pub fn color_of(&self, id: MotifId) -> Option<Rgb> {
        self.motifs.get(&id).map(|m| m.color)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotifDefinition> {
        self.motifs.values()
    }

    pub fn len(&self) -> usize {
        self.motifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motifs.is_empty()
    }
}

fn parse_record(line: &str) -> AnnotatorResult<MotifDefinition> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(AnnotatorError::validation(format!(
            "expected 5 fields, found {}",
            fields.len()
        )));
    }

    let id = fields[0]
        .parse::<MotifId>()
        .map_err(|_| AnnotatorError::validation(format!("invalid motif id '{}'", fields[0])))?;

    let components = [fields[2], fields[3], fields[4]];
    let color = parse_color(&components)?;

    Ok(MotifDefinition {
        id,
        name: fields[1].to_string(),
        color,
    })
}

/// Components are 0-255, except when all three are at most 1, in which case
/// they are fractions (`1 1 1` is white, `0.5 0 0` is dark red).
fn parse_color(components: &[&str; 3]) -> AnnotatorResult<Rgb> {
    let mut values = [0f64; 3];
    for (slot, raw) in values.iter_mut().zip(components.iter()) {
        let value = raw
            .parse::<f64>()
            .map_err(|_| AnnotatorError::validation(format!("invalid color component '{raw}'")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(AnnotatorError::validation(format!(
                "color component out of range '{raw}'"
            )));
        }
        *slot = value;
    }

    let fractional = values.iter().all(|v| *v <= 1.0);
    let scale = if fractional { 255.0 } else { 1.0 };

    let mut out = [0u8; 3];
    for (dst, value) in out.iter_mut().zip(values.iter()) {
        let scaled = (value * scale).round();
        if scaled > 255.0 {
            return Err(AnnotatorError::validation(format!(
                "color component {value} exceeds 255"
            )));
        }
        *dst = scaled as u8;
    }

    Ok(Rgb {
        r: out[0],
        g: out[1],
        b: out[2],
    })
}
