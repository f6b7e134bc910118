use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document metadata. Keys are kept sorted, so two maps holding the same
/// items compare equal no matter how they were built.
pub type Metadata = BTreeMap<String, String>;

/// Identity key used for deduplication: content plus the metadata item set.
pub type Signature = (String, Vec<(String, String)>);

/// A retrievable unit of text: a research abstract, a research fulltext,
/// a patient article, or a web-search snippet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insert.
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.meta("title")
    }

    pub fn source(&self) -> Option<&str> {
        self.meta("source")
    }

    pub fn year(&self) -> Option<&str> {
        self.meta("year")
    }

    pub fn url(&self) -> Option<&str> {
        self.meta("url")
    }

    pub fn pmid(&self) -> Option<&str> {
        self.meta("pmid")
    }

    pub fn chunk_type(&self) -> Option<ChunkType> {
        self.meta("chunk_type").and_then(ChunkType::parse)
    }

    pub fn signature(&self) -> Signature {
        (
            self.content.clone(),
            self.metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Which part of a source a document was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Abstract,
    Fulltext,
    Patient,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Abstract => "abstract",
            ChunkType::Fulltext => "fulltext",
            ChunkType::Patient => "patient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "abstract" => Some(ChunkType::Abstract),
            "fulltext" => Some(ChunkType::Fulltext),
            "patient" => Some(ChunkType::Patient),
            _ => None,
        }
    }
}

/// Result of one question-answering call.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// The documents placed in the LLM context, in context order.
    pub sources: Vec<Document>,
}

/// Compact, deduplicated reference to a source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub title: String,
    pub year: Option<String>,
    pub source: String,
    pub link: Option<String>,
    pub snippet: String,
}

const SNIPPET_CHARS: usize = 260;

impl SourceCitation {
    /// Build up to `max` citations, one per distinct title. Documents with no
    /// title are skipped.
    pub fn from_documents(docs: &[Document], max: usize) -> Vec<Self> {
        let mut seen = std::collections::HashSet::new();
        docs.iter()
            .filter_map(|d| d.title().map(|t| (t, d)))
            .filter(|(title, _)| seen.insert(*title))
            .take(max)
            .map(|(title, d)| SourceCitation {
                title: title.to_string(),
                year: d.year().map(str::to_string),
                source: d.source().unwrap_or("Research").to_string(),
                link: citation_link(d),
                snippet: clip_snippet(&d.content),
            })
            .collect()
    }
}

fn citation_link(doc: &Document) -> Option<String> {
    if let Some(url) = doc.url().map(str::trim).filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    doc.pmid()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}"))
}

fn clip_snippet(content: &str) -> String {
    let flat = content.trim().replace('\n', " ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let clipped: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", clipped.trim_end())
}

/// Ask request
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Prior "Q: ...\nA: ..." turns owned by the caller.
    #[serde(default)]
    pub history: Option<Vec<String>>,
}

/// Ask response
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<Document>,
    pub citations: Vec<SourceCitation>,
    pub history: Vec<String>,
}
