use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use super::{clean_field, RESEARCH_SOURCE, UNTITLED};
use crate::models::{ChunkType, Document};

/// One row of the merged papers export. Only `abstract` and `fulltext` carry
/// retrievable text; `url` and `pmid` are optional columns.
#[derive(Debug, Deserialize)]
struct PaperRow {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    fulltext: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pmid: Option<String>,
}

/// Load research papers from a CSV file. Each row yields an abstract document
/// and/or a fulltext document; rows with neither are skipped.
pub fn load_research_papers(path: &Path) -> Result<Vec<Document>> {
    tracing::info!("Loading research papers from {}", path.display());
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open research CSV {}", path.display()))?;
    let docs = parse_research_csv(file)
        .with_context(|| format!("Failed to parse research CSV {}", path.display()))?;
    tracing::info!("Created {} research documents", docs.len());
    Ok(docs)
}

/// Parse research rows from any CSV reader.
pub fn parse_research_csv<R: Read>(reader: R) -> Result<Vec<Document>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers().context("CSV has no header row")?.clone();
    for required in ["title", "year", "abstract", "fulltext"] {
        if !headers.iter().any(|h| h.trim() == required) {
            anyhow::bail!("Research CSV is missing the '{required}' column");
        }
    }

    let mut docs = Vec::new();
    let mut skipped = 0usize;

    for (line, record) in rdr.deserialize::<PaperRow>().enumerate() {
        let row = record.with_context(|| format!("Malformed research CSV record {}", line + 1))?;
        let before = docs.len();
        docs.extend(row_documents(row));
        if docs.len() == before {
            skipped += 1;
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {skipped} research rows with neither abstract nor fulltext");
    }

    Ok(docs)
}

fn row_documents(row: PaperRow) -> Vec<Document> {
    let title = clean_field(row.title.as_deref()).unwrap_or_else(|| UNTITLED.to_string());
    let year = clean_field(row.year.as_deref()).map(|y| normalize_year(&y));
    let url = clean_field(row.url.as_deref());
    let pmid = clean_field(row.pmid.as_deref()).map(|p| normalize_year(&p));

    let chunks = [
        (clean_field(row.abstract_text.as_deref()), ChunkType::Abstract),
        (clean_field(row.fulltext.as_deref()), ChunkType::Fulltext),
    ];

    chunks
        .into_iter()
        .filter_map(|(text, chunk_type)| text.map(|t| (t, chunk_type)))
        .map(|(text, chunk_type)| {
            let mut doc = Document::new(text)
                .with_meta("title", title.clone())
                .with_meta("chunk_type", chunk_type.as_str())
                .with_meta("source", RESEARCH_SOURCE);
            if let Some(year) = &year {
                doc = doc.with_meta("year", year.clone());
            }
            if let Some(url) = &url {
                doc = doc.with_meta("url", url.clone());
            }
            if let Some(pmid) = &pmid {
                doc = doc.with_meta("pmid", pmid.clone());
            }
            doc
        })
        .collect()
}

/// Dataframe exports write integer columns with gaps as floats ("2019.0").
fn normalize_year(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => format!("{}", v as i64),
        _ => raw.to_string(),
    }
}
