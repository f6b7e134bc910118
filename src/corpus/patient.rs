use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::{clean_field, PATIENT_SOURCE, UNTITLED};
use crate::models::{ChunkType, Document};

#[derive(Debug, Deserialize)]
struct PatientEntry {
    text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    title: Option<String>,
    /// Exports mix numeric and string ids.
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    url: Option<String>,
}

/// Load patient-friendly articles from a JSON array file, one document per entry.
pub fn load_patient_articles(path: &Path) -> Result<Vec<Document>> {
    tracing::info!("Loading patient articles from {}", path.display());
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patient articles {}", path.display()))?;
    let docs = parse_patient_json(&data)
        .with_context(|| format!("Failed to parse patient articles {}", path.display()))?;
    tracing::info!("Loaded {} patient documents", docs.len());
    Ok(docs)
}

pub fn parse_patient_json(data: &str) -> Result<Vec<Document>> {
    let entries: Vec<PatientEntry> =
        serde_json::from_str(data).context("Expected a JSON array of articles with a 'text' field")?;

    let mut docs = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.text.trim().is_empty() {
            tracing::warn!(
                "Skipping patient article with empty text: {}",
                entry.title.as_deref().unwrap_or(UNTITLED)
            );
            continue;
        }

        let mut doc = Document::new(entry.text)
            .with_meta(
                "source",
                clean_field(entry.source.as_deref()).unwrap_or_else(|| PATIENT_SOURCE.to_string()),
            )
            .with_meta(
                "title",
                clean_field(entry.title.as_deref()).unwrap_or_else(|| UNTITLED.to_string()),
            )
            .with_meta("chunk_type", ChunkType::Patient.as_str());

        if let Some(id) = entry.id.as_ref().and_then(id_to_string) {
            doc = doc.with_meta("id", id);
        }
        if let Some(url) = clean_field(entry.url.as_deref()) {
            doc = doc.with_meta("url", url);
        }
        docs.push(doc);
    }

    Ok(docs)
}

fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => clean_field(Some(s)),
        other => Some(other.to_string()),
    }
}
