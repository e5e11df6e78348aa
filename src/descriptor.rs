//! Annotation injection into the build's deployment descriptor
//!
//! A redeploy of an unchanged image only rolls out if the pod template
//! changes, so before triggering the build we embed the rollout marker into
//! the deployment descriptor inside the checkout, under
//! `spec.template.metadata.annotations`. The build collaborator then bakes
//! the marker into the deployment it applies, and the cluster performs a
//! rolling update whose new pods carry the marker.
//!
//! Descriptors are YAML; they are parsed via yaml-rust2 into
//! `serde_json::Value` and written back as pretty-printed JSON, which is
//! valid YAML and stays readable by the build tool.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Inject annotation pairs into the descriptor's pod template metadata.
///
/// Existing annotations are preserved; injected keys overwrite same-named
/// ones, so re-injection with the same marker is idempotent. Intermediate
/// objects (`spec.template.metadata.annotations`) are created when absent.
pub async fn inject_annotations(
    path: &Path,
    annotations: &BTreeMap<String, String>,
) -> Result<()> {
    let display_path = path.display().to_string();

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::descriptor(&display_path, format!("read failed: {}", e)))?;

    let mut doc = parse_yaml(&raw).map_err(|e| Error::descriptor(&display_path, e))?;

    let target = descend_object(&mut doc, &["spec", "template", "metadata", "annotations"])
        .ok_or_else(|| {
            Error::descriptor(&display_path, "descriptor root is not a mapping".to_string())
        })?;

    for (key, value) in annotations {
        target.insert(key.clone(), Value::String(value.clone()));
    }

    let mut out = serde_json::to_string_pretty(&doc)
        .map_err(|e| Error::descriptor(&display_path, format!("serialize failed: {}", e)))?;
    out.push('\n');

    tokio::fs::write(path, out)
        .await
        .map_err(|e| Error::descriptor(&display_path, format!("write failed: {}", e)))?;

    tracing::debug!(path = %display_path, count = annotations.len(), "injected descriptor annotations");
    Ok(())
}

/// Walk down a chain of object keys, creating empty objects along the way.
///
/// Returns `None` if the root (or any existing intermediate) is not a
/// mapping.
fn descend_object<'a>(value: &'a mut Value, keys: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = value.as_object_mut()?;
    for key in keys {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut()?;
    }
    Some(current)
}

/// Parse a YAML document into a `serde_json::Value`.
///
/// For multi-document input, only the first document is used; descriptors
/// are single-document fragments.
fn parse_yaml(input: &str) -> std::result::Result<Value, String> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| e.to_string())?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

fn yaml_to_json(yaml: Yaml) -> std::result::Result<Value, String> {
    match yaml {
        Yaml::Null | Yaml::BadValue => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s.parse().map_err(|e| format!("bad real {}: {}", s, e))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("non-finite real: {}", s))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(hash) => {
            let mut map = Map::with_capacity(hash.len());
            for (key, value) in hash {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key: {:?}", other)),
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Ok(Value::Object(map))
        }
        Yaml::Alias(_) => Err("YAML aliases are not supported in descriptors".to_string()),
    }
}
