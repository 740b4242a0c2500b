use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use timbre_core::model::track::NUMERIC_ATTRIBUTES;
use timbre_core::model::{PropertyMap, PropertyValue};
use timbre_core::GraphStore;
use timbre_similarity::Config;

use super::open_database;

pub fn run_import(config: &Config, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut db = open_database(config)?;
    let label = &config.similarity.track_label;

    let mut imported = 0;
    let mut skipped = 0;
    let mut featureless = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = match parse_record(&line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Line {}: {e}", index + 1);
                skipped += 1;
                continue;
            }
        };
        if !has_audio_attributes(&record) {
            log::warn!("Line {}: no numeric audio attributes", index + 1);
            featureless += 1;
        }
        db.create_node(label, record)?;
        imported += 1;
    }

    println!("✓ Imported {imported} tracks from {}", path.display());
    if skipped > 0 {
        println!("  Skipped {skipped} malformed lines");
    }
    if featureless > 0 {
        println!("  {featureless} tracks carry no audio attributes and will not match");
    }
    Ok(())
}

fn has_audio_attributes(record: &PropertyMap) -> bool {
    NUMERIC_ATTRIBUTES
        .iter()
        .any(|key| record.get(*key).and_then(PropertyValue::as_f64).is_some())
}

/// One JSON object to a property map. Nulls, arrays and nested objects
/// have no property representation and are dropped.
fn parse_record(line: &str) -> Result<PropertyMap> {
    let Value::Object(fields) = serde_json::from_str::<Value>(line)? else {
        bail!("expected a JSON object");
    };

    let mut record = PropertyMap::new();
    for (key, value) in fields {
        let value = match value {
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => match n.as_f64() {
                    Some(f) => PropertyValue::Float(f),
                    None => continue,
                },
            },
            Value::String(s) => PropertyValue::Text(s),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                log::debug!("Dropping non-scalar attribute {key}");
                continue;
            }
        };
        record.insert(key, value);
    }
    Ok(record)
}
