use std::path::PathBuf;

use serde_json::{Number, Value};

use crate::error::{AnnotatorError, AnnotatorResult};

/// A free-form saveable value.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Path(PathBuf),
    List(Vec<StateValue>),
}

impl StateValue {
    /// JSON form written to the session file. Non-finite floats become
    /// `"inf"`, `"-inf"` or `"nan"`; paths must be valid UTF-8.
    pub fn to_json(&self) -> AnnotatorResult<Value> {
        Ok(match self {
            StateValue::Null => Value::Null,
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Int(i) => Value::Number((*i).into()),
            StateValue::Float(f) => float_to_json(*f),
            StateValue::Text(s) => Value::String(s.clone()),
            StateValue::Path(p) => Value::String(path_to_string(p)?),
            StateValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(StateValue::to_json)
                    .collect::<AnnotatorResult<Vec<_>>>()?,
            ),
        })
    }

    /// Inverse of [`StateValue::to_json`] as far as JSON allows: paths come
    /// back as text and the non-finite markers come back as floats.
    pub fn from_json(value: &Value) -> StateValue {
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StateValue::Int(i),
                None => StateValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => match parse_non_finite(s) {
                Some(f) => StateValue::Float(f),
                None => StateValue::Text(s.clone()),
            },
            Value::Array(items) => StateValue::List(items.iter().map(StateValue::from_json).collect()),
            Value::Object(_) => StateValue::Text(value.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Int(i) => Some(*i as f64),
            StateValue::Float(f) => Some(*f),
            StateValue::Text(s) => parse_non_finite(s).or_else(|| s.parse().ok()),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl From<PathBuf> for StateValue {
    fn from(value: PathBuf) -> Self {
        StateValue::Path(value)
    }
}

pub(crate) fn float_to_json(f: f64) -> Value {
    if f.is_nan() {
        Value::String("nan".into())
    } else if f.is_infinite() {
        Value::String(if f > 0.0 { "inf" } else { "-inf" }.into())
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

pub(crate) fn path_to_string(path: &std::path::Path) -> AnnotatorResult<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        AnnotatorError::validation(format!(
            "path {} is not valid UTF-8 and cannot be saved",
            path.display()
        ))
    })
}

fn parse_non_finite(s: &str) -> Option<f64> {
    match s {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_floats_become_strings() {
        let list = StateValue::List(vec![
            StateValue::Float(f64::INFINITY),
            StateValue::Float(f64::NEG_INFINITY),
            StateValue::Float(f64::NAN),
            StateValue::Float(1.5),
        ]);
        assert_eq!(
            list.to_json().unwrap(),
            serde_json::json!(["inf", "-inf", "nan", 1.5])
        );
    }

    #[test]
    fn markers_read_back_as_floats() {
        let value = StateValue::from_json(&serde_json::json!("-inf"));
        assert_eq!(value.as_f64(), Some(f64::NEG_INFINITY));
        assert_eq!(
            StateValue::from_json(&serde_json::json!("beak")),
            StateValue::Text("beak".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = PathBuf::from(OsStr::from_bytes(b"/data/\xff.mp4"));
        let err = StateValue::Path(path).to_json().unwrap_err();
        assert!(err.is_validation());
    }
}
