use anyhow::Result;

use crate::llm::completion::LanguageModel;

/// Ask the LLM for `n` rephrasings of the question, used to widen recall
/// before retrieval. The original question is only included when the model
/// returned fewer than `n` usable lines (see [`parse_variations`]).
pub async fn generate_query_variations(
    llm: &dyn LanguageModel,
    question: &str,
    n: usize,
) -> Result<Vec<String>> {
    let prompt = format!(
        "Generate {n} different variations of this user question to help retrieve relevant documents.\n\n\
         Original question: {question}\n\n\
         Return each variation on a new line without numbering or bullets."
    );

    let response = llm.complete(&prompt).await?;
    Ok(parse_variations(&response, question, n))
}

/// One variation per non-empty line. Models number their output regardless of
/// instructions, so leading list markers are stripped. Extra lines are
/// dropped; if fewer than `n` survive, the original question is appended once
/// so at least one query always runs.
pub fn parse_variations(content: &str, question: &str, n: usize) -> Vec<String> {
    let mut variations: Vec<String> = content
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .take(n)
        .collect();

    if variations.len() < n {
        tracing::warn!(
            "Expected {n} query variations, model returned {}; adding the original question",
            variations.len()
        );
        variations.push(question.to_string());
    }

    variations
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();

    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }

    // "1. foo" / "2) foo"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            // "1.5 mg ..." is a decimal, not a marker
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim();
            }
        }
    }

    line
}
