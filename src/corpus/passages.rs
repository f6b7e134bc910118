//! Paragraph-packing splitter for long documents headed into the vector store.
//!
//! Four-tier splitting strategy:
//! 1. Split at blank lines (natural paragraph boundaries)
//! 2. Merge small paragraphs up to the character budget
//! 3. If a paragraph is still too large, split at single newlines
//! 4. Last resort: split long lines at whitespace, then at char boundaries

use crate::models::Document;

/// Maximum non-whitespace characters per passage.
const CHAR_BUDGET: usize = 1500;

/// Split a document into passages that share its metadata. Documents already
/// within budget come back unchanged.
pub fn passages_for(doc: &Document) -> Vec<Document> {
    if weight(&doc.content) <= CHAR_BUDGET {
        return vec![doc.clone()];
    }
    split_passages(&doc.content)
        .into_iter()
        .map(|content| Document {
            content,
            metadata: doc.metadata.clone(),
        })
        .collect()
}

/// Split text into passages of at most `CHAR_BUDGET` non-whitespace characters.
pub fn split_passages(content: &str) -> Vec<String> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let mut passages = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in split_at_blank_lines(content) {
        let para_chars = weight(&para);

        if para_chars > CHAR_BUDGET {
            flush(&mut current, &mut passages);
            current_chars = 0;
            split_large_paragraph(&para, &mut passages);
        } else if !current.is_empty() && current_chars + para_chars > CHAR_BUDGET {
            flush(&mut current, &mut passages);
            current = para;
            current_chars = para_chars;
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&para);
            current_chars += para_chars;
        }
    }

    flush(&mut current, &mut passages);
    passages
}

fn weight(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

fn flush(current: &mut String, passages: &mut Vec<String>) {
    if !current.trim().is_empty() {
        passages.push(std::mem::take(current));
    }
    current.clear();
}

fn split_at_blank_lines(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }

    if !lines.is_empty() {
        paragraphs.push(lines.join("\n"));
    }

    paragraphs
}

fn split_large_paragraph(para: &str, passages: &mut Vec<String>) {
    let mut current = String::new();
    let mut chars = 0usize;

    for line in para.lines() {
        let line_chars = weight(line);
        if line_chars > CHAR_BUDGET {
            flush(&mut current, passages);
            chars = 0;
            split_long_line(line, passages);
            continue;
        }
        if chars + line_chars > CHAR_BUDGET && !current.is_empty() {
            flush(&mut current, passages);
            chars = 0;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        chars += line_chars;
    }

    flush(&mut current, passages);
}

fn split_long_line(line: &str, passages: &mut Vec<String>) {
    let mut current = String::new();
    let mut chars = 0usize;

    for word in line.split_whitespace() {
        let word_chars = word.chars().count();
        if word_chars > CHAR_BUDGET {
            flush(&mut current, passages);
            chars = 0;
            let glyphs: Vec<char> = word.chars().collect();
            for piece in glyphs.chunks(CHAR_BUDGET) {
                passages.push(piece.iter().collect());
            }
            continue;
        }
        if chars + word_chars > CHAR_BUDGET && !current.is_empty() {
            flush(&mut current, passages);
            chars = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        chars += word_chars;
    }

    flush(&mut current, passages);
}
