//! Reshape a raw template library into an ingestible tree.
//!
//! Template libraries group templates as arrays at the bottom of a topic
//! hierarchy. Ingestion needs a mapping at every level, so each array is
//! replaced by an object keyed by the elements' `template_name`, with the
//! whole element stored as compact JSON text.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Field naming a template inside a library array.
pub const TEMPLATE_NAME_FIELD: &str = "template_name";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template library root must be a JSON object")]
    NotAnObject,

    #[error("invalid template library JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Format a template library. Nested objects are processed recursively,
/// arrays become `{template_name: element_json}` objects and other values
/// are kept. Elements that are not objects or lack a string
/// `template_name` are skipped.
pub fn format_library(value: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::Object(map) => Ok(Value::Object(format_map(map))),
        _ => Err(TemplateError::NotAnObject),
    }
}

fn format_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let formatted = match value {
                Value::Object(child) => Value::Object(format_map(child)),
                Value::Array(items) => Value::Object(format_templates(key, items)),
                other => other.clone(),
            };
            (key.clone(), formatted)
        })
        .collect()
}

fn format_templates(key: &str, items: &[Value]) -> Map<String, Value> {
    let mut out = Map::new();
    for item in items {
        let Some(name) = item
            .as_object()
            .and_then(|obj| obj.get(TEMPLATE_NAME_FIELD))
            .and_then(Value::as_str)
        else {
            warn!(group = key, "skipping template without a string template_name");
            continue;
        };
        out.insert(name.to_string(), Value::String(item.to_string()));
    }
    debug!(group = key, templates = out.len(), "formatted template group");
    out
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TemplateError + use<> {
    let path = path.display().to_string();
    move |source| TemplateError::Io { path, source }
}

/// Read `input`, format it and write pretty JSON to `output`.
pub fn format_library_file(input: &Path, output: &Path) -> Result<Value, TemplateError> {
    let text = std::fs::read_to_string(input).map_err(io_err(input))?;
    let raw: Value = serde_json::from_str(&text)?;
    let formatted = format_library(&raw)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let pretty = serde_json::to_string_pretty(&formatted)?;
    std::fs::write(output, pretty).map_err(io_err(output))?;
    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_become_named_templates() {
        let raw = json!({
            "Algebra": {
                "Quadratics": [
                    {"template_name": "Vieta", "steps": ["sum", "product"]},
                    {"template_name": "Discriminant", "steps": []}
                ]
            }
        });
        let formatted = format_library(&raw).unwrap();
        let group = &formatted["Algebra"]["Quadratics"];
        assert_eq!(group.as_object().unwrap().len(), 2);

        let vieta = group["Vieta"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(vieta).unwrap();
        assert_eq!(parsed["steps"], json!(["sum", "product"]));
    }

    #[test]
    fn invalid_elements_are_skipped() {
        let raw = json!({
            "T": [
                "bare string",
                {"no_name": 1},
                {"template_name": 42},
                {"template_name": "ok"}
            ]
        });
        let formatted = format_library(&raw).unwrap();
        let keys: Vec<_> = formatted["T"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["ok"]);
    }

    #[test]
    fn scalars_are_kept() {
        let raw = json!({"note": "plain", "n": 3});
        assert_eq!(format_library(&raw).unwrap(), raw);
    }

    #[test]
    fn root_must_be_object() {
        assert!(matches!(
            format_library(&json!([1])),
            Err(TemplateError::NotAnObject)
        ));
    }

    #[test]
    fn formats_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp.path().join("library.json");
        let output = tmp.path().join("out").join("format_library.json");
        std::fs::write(
            &input,
            r#"{"Geometry": {"Circles": [{"template_name": "Power of a Point"}]}}"#,
        )
        .unwrap();

        let formatted = format_library_file(&input, &output).unwrap();
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, formatted);
        assert!(written["Geometry"]["Circles"]["Power of a Point"].is_string());
    }

    #[test]
    fn missing_input_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = format_library_file(&tmp.path().join("nope.json"), &tmp.path().join("o.json"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
