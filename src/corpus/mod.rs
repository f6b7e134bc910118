//! Corpus loaders: research papers (CSV) and patient articles (JSON), plus the
//! passage splitter used when embedding long documents.

pub mod passages;
pub mod patient;
pub mod research;

/// `source` value stamped on every research-paper document.
pub const RESEARCH_SOURCE: &str = "Research";
/// Default `source` for patient articles that do not name one.
pub const PATIENT_SOURCE: &str = "Patient";
/// Title used when a record has none.
pub const UNTITLED: &str = "Untitled";

/// Normalise a raw text field from a dataset export. Blank values and the
/// placeholders dataframes write for missing cells count as absent.
pub fn clean_field(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "none" | "null" => None,
        _ => Some(trimmed.to_string()),
    }
}
