//! Semantic chunker (C5)
//!
//! Splits an enriched note into bounded, overlapping, structure-aware
//! chunks. Token estimates never use a real tokenizer: `ceil(len(s)/3.5)`
//! is the whole contract, matching `ai/rag.rs`'s own heuristic.

use crate::config::RagSettings;
use crate::note::Note;
use crate::rag::types::Chunk;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEADER_RE: Regex = Regex::new(r"^(#{1,6})\s+(.*)$").unwrap();
    static ref LIST_BULLET_RE: Regex = Regex::new(r"^\s*([-*+]\s+|\d+\.\s+)").unwrap();
    static ref SENTENCE_BOUNDARY_RE: Regex = Regex::new(r"[.!?](?: |\n)").unwrap();
}

const PLACEHOLDER_PREFIX: char = '\u{0}';

pub fn estimate_tokens(s: &str) -> usize {
    (s.len() as f64 / 3.5).ceil() as usize
}

fn build_enriched_content(note: &Note) -> String {
    let tags = note.tags.join(", ");
    format!(
        "Title: {}\nTags: {}\nCreated: {}\nLast Updated: {}\n\nContent:\n{}",
        note.title,
        tags,
        note.created_at.format("%Y-%m-%d"),
        note.updated_at.format("%Y-%m-%d"),
        note.body,
    )
}

struct Section {
    header: String,
    level: usize,
    parent_header: Option<String>,
    content: String,
}

fn parse_sections(body: &str, title: &str) -> Vec<Section> {
    let mut headers: Vec<(usize, usize, String)> = Vec::new();
    let mut offset = 0usize;
    for line in body.lines() {
        if let Some(caps) = HEADER_RE.captures(line) {
            let level = caps[1].len();
            let header = caps[2].trim().to_string();
            headers.push((offset, level, header));
        }
        offset += line.len() + 1;
    }

    let mut sections = Vec::new();
    if headers.is_empty() {
        sections.push(Section {
            header: title.to_string(),
            level: 0,
            parent_header: None,
            content: body.to_string(),
        });
        return sections;
    }

    if headers[0].0 > 0 {
        sections.push(Section {
            header: title.to_string(),
            level: 0,
            parent_header: None,
            content: body[..headers[0].0].to_string(),
        });
    }

    for i in 0..headers.len() {
        let (start, level, header) = &headers[i];
        let end = if i + 1 < headers.len() {
            headers[i + 1].0
        } else {
            body.len()
        };
        sections.push(Section {
            header: header.clone(),
            level: *level,
            parent_header: None,
            content: body[*start..end].to_string(),
        });
    }

    let mut stack: Vec<(usize, String)> = Vec::new();
    for section in sections.iter_mut() {
        while let Some(&(lvl, _)) = stack.last() {
            if lvl >= section.level {
                stack.pop();
            } else {
                break;
            }
        }
        section.parent_header = stack.last().map(|(_, h)| h.clone());
        stack.push((section.level, section.header.clone()));
    }

    sections
}

fn context_header(section: &Section) -> String {
    let heading_line = if section.level == 0 {
        section.header.clone()
    } else {
        format!("{} {}", "#".repeat(section.level), section.header)
    };
    match &section.parent_header {
        Some(parent) => format!("Section: {}\n{}", parent, heading_line),
        None => heading_line,
    }
}

/// Extract fenced code blocks, replacing them with opaque placeholders so
/// paragraph splitting never cuts through one.
fn extract_code_blocks(text: &str) -> (String, Vec<String>) {
    let mut blocks = Vec::new();
    let mut result = String::with_capacity(text.len());
    let mut in_block = false;
    let mut block_buf = String::new();

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        if trimmed.trim_start().starts_with("```") {
            if in_block {
                block_buf.push_str(line);
                blocks.push(std::mem::take(&mut block_buf));
                result.push(PLACEHOLDER_PREFIX);
                result.push_str(&format!("CODEBLOCK_{}", blocks.len() - 1));
                result.push(PLACEHOLDER_PREFIX);
                result.push('\n');
                in_block = false;
            } else {
                in_block = true;
                block_buf.clear();
                block_buf.push_str(line);
            }
            continue;
        }
        if in_block {
            block_buf.push_str(line);
        } else {
            result.push_str(line);
        }
    }
    if in_block {
        // Unterminated fence: treat what we have as plain text.
        result.push_str(&block_buf);
    }

    (result, blocks)
}

fn restore_code_blocks(text: &str, blocks: &[String]) -> String {
    let mut result = text.to_string();
    for (i, block) in blocks.iter().enumerate() {
        let placeholder = format!("{}CODEBLOCK_{}{}", PLACEHOLDER_PREFIX, i, PLACEHOLDER_PREFIX);
        result = result.replace(&placeholder, block);
    }
    result
}

fn is_list_paragraph(paragraph: &str) -> bool {
    let lines: Vec<&str> = paragraph.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let matches = lines.iter().filter(|l| LIST_BULLET_RE.is_match(l)).count();
    (matches as f64 / lines.len() as f64) > 0.5
}

fn split_into_units(section_content: &str) -> Vec<String> {
    let (placeholder_text, blocks) = extract_code_blocks(section_content);

    let mut units = Vec::new();
    let mut current = String::new();
    for para in placeholder_text.split("\n\n") {
        if para.trim().is_empty() {
            continue;
        }
        if is_list_paragraph(para) {
            if !current.is_empty() {
                units.push(restore_code_blocks(&current, &blocks));
                current.clear();
            }
            units.push(restore_code_blocks(para, &blocks));
        } else {
            units.push(restore_code_blocks(para, &blocks));
        }
    }
    if !current.is_empty() {
        units.push(restore_code_blocks(&current, &blocks));
    }
    units
}

fn split_by_sentence(unit: &str, budget_tokens: usize) -> Vec<String> {
    let boundaries: Vec<usize> = SENTENCE_BOUNDARY_RE
        .find_iter(unit)
        .map(|m| m.end())
        .collect();

    if boundaries.is_empty() {
        return vec![unit.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut current = String::new();
    let mut last = 0usize;
    for &b in &boundaries {
        let sentence = &unit[last..b];
        if estimate_tokens(&current) + estimate_tokens(sentence) > budget_tokens && !current.is_empty() {
            pieces.push(current.clone());
            current.clear();
            start = last;
        }
        current.push_str(sentence);
        last = b;
        let _ = start;
    }
    if last < unit.len() {
        current.push_str(&unit[last..]);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn pack_units(
    units: &[String],
    header: &str,
    budget_tokens: usize,
    overlap_tokens: usize,
) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_units: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    let mut push_current = |current_units: &mut Vec<String>, current_tokens: &mut usize, chunks: &mut Vec<String>| {
        if current_units.is_empty() {
            return;
        }
        chunks.push(format!("{}\n{}", header, current_units.join("\n\n")));
        *current_tokens = 0;
        current_units.clear();
    };

    for unit in units {
        let unit_tokens = estimate_tokens(unit);
        let expanded: Vec<String> = if unit_tokens > budget_tokens {
            split_by_sentence(unit, budget_tokens)
        } else {
            vec![unit.clone()]
        };

        for piece in expanded {
            let piece_tokens = estimate_tokens(&piece);
            if current_tokens + piece_tokens > budget_tokens && !current_units.is_empty() {
                let overlap = take_overlap(&current_units, overlap_tokens);
                push_current(&mut current_units, &mut current_tokens, &mut chunks);
                current_units = overlap;
                current_tokens = current_units.iter().map(|u| estimate_tokens(u)).sum();
            }
            current_units.push(piece.clone());
            current_tokens += piece_tokens;
        }
    }
    push_current(&mut current_units, &mut current_tokens, &mut chunks);

    chunks
}

/// Take the last units of an emitted chunk whose combined token count is
/// at most `overlap_tokens`, to seed the next chunk.
fn take_overlap(units: &[String], overlap_tokens: usize) -> Vec<String> {
    if overlap_tokens == 0 {
        return Vec::new();
    }
    let mut overlap = Vec::new();
    let mut total = 0usize;
    for unit in units.iter().rev() {
        let t = estimate_tokens(unit);
        if total + t > overlap_tokens && !overlap.is_empty() {
            break;
        }
        overlap.push(unit.clone());
        total += t;
    }
    overlap.reverse();
    overlap
}

/// Split an enriched Note into ordered, contiguous-indexed chunks.
pub fn chunk_note(note: &Note, settings: &RagSettings) -> Vec<Chunk> {
    let max_tokens = settings.max_chunk_size;
    let min_tokens = settings.min_chunk_size;
    let overlap_tokens = settings.chunk_overlap;

    let enriched = build_enriched_content(note);

    if !settings.enable_chunking || note.body.trim().is_empty() {
        if enriched.trim().is_empty() {
            return Vec::new();
        }
        let token_count = estimate_tokens(&enriched);
        return vec![Chunk {
            note_id: note.id.clone(),
            index: 0,
            content: enriched.clone(),
            section_header: None,
            token_count,
            start_byte: 0,
            end_byte: enriched.len(),
        }];
    }

    let total_tokens = estimate_tokens(&enriched);
    let mut raw_chunks: Vec<String> = if total_tokens <= max_tokens {
        vec![enriched.clone()]
    } else if !settings.enable_semantic_chunking {
        pack_units(&split_into_units(&enriched), "", max_tokens, overlap_tokens)
    } else {
        let sections = parse_sections(&note.body, &note.title);
        let mut chunks = Vec::new();
        for section in &sections {
            let header = context_header(section);
            let header_tokens = estimate_tokens(&header);
            let section_tokens = estimate_tokens(&section.content);

            if header_tokens + section_tokens <= max_tokens {
                chunks.push(format!("{}\n{}", header, section.content));
                continue;
            }

            let budget = max_tokens.saturating_sub(header_tokens + 10);
            let units = split_into_units(&section.content);
            chunks.extend(pack_units(&units, &header, budget, overlap_tokens));
        }
        chunks
    };

    if raw_chunks.is_empty() {
        raw_chunks.push(enriched.clone());
    }

    let mut chunks: Vec<Chunk> = raw_chunks
        .drain(..)
        .enumerate()
        .map(|(i, content)| {
            let token_count = estimate_tokens(&content);
            Chunk {
                note_id: note.id.clone(),
                index: i,
                content: content.clone(),
                section_header: None,
                token_count,
                start_byte: 0,
                end_byte: content.len(),
            }
        })
        .collect();

    post_merge(&mut chunks, min_tokens, max_tokens);
    reindex(&mut chunks);

    chunks
}

/// Merge any chunk below `min_tokens` into its successor when the sum
/// fits, then re-index to stay 0-based and contiguous.
fn post_merge(chunks: &mut Vec<Chunk>, min_tokens: usize, max_tokens: usize) {
    if chunks.len() <= 1 {
        return;
    }
    let mut i = 0;
    while i + 1 < chunks.len() {
        if chunks[i].token_count < min_tokens
            && chunks[i].token_count + chunks[i + 1].token_count <= max_tokens
        {
            let next = chunks.remove(i + 1);
            chunks[i].content = format!("{}\n\n{}", chunks[i].content, next.content);
            chunks[i].token_count = estimate_tokens(&chunks[i].content);
            chunks[i].end_byte = chunks[i].content.len();
        } else {
            i += 1;
        }
    }
}

fn reindex(chunks: &mut [Chunk]) {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(title: &str, body: &str) -> Note {
        let now = Utc::now();
        Note {
            id: "n1".into(),
            owner_id: "u1".into(),
            title: title.into(),
            body: body.into(),
            tags: vec![],
            created_at: now,
            updated_at: now,
            summary: None,
            image_descriptions: vec![],
        }
    }

    #[test]
    fn test_single_chunk_below_max() {
        let settings = RagSettings::default();
        let n = note("Coffee", "I brew coffee every morning.");
        let chunks = chunk_note(&n, &settings);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert!(chunks[0].content.contains("Coffee"));
        assert!(chunks[0].content.contains("I brew coffee every morning."));
    }

    #[test]
    fn test_empty_body_with_title_is_valid_single_chunk() {
        let settings = RagSettings::default();
        let n = note("Empty body", "");
        let chunks = chunk_note(&n, &settings);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Empty body"));
    }

    #[test]
    fn test_chunking_disabled_yields_single_chunk() {
        let mut settings = RagSettings::default();
        settings.enable_chunking = false;
        let body = "word ".repeat(2000);
        let n = note("Big", &body);
        let chunks = chunk_note(&n, &settings);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_long_body_splits_into_multiple_chunks_with_contiguous_indices() {
        let mut settings = RagSettings::default();
        settings.max_chunk_size = 50;
        settings.min_chunk_size = 10;
        settings.chunk_overlap = 5;

        let mut body = String::new();
        for i in 0..20 {
            body.push_str(&format!("## Section {}\nThis is paragraph {} with some content to push past the token budget for this chunk.\n\n", i, i));
        }
        let n = note("Long note", &body);
        let chunks = chunk_note(&n, &settings);

        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_token_estimate_heuristic() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("1234567"), 2); // ceil(7/3.5) = 2
    }

    #[test]
    fn test_code_block_not_split() {
        let text = "intro\n\n```\nfn main() {\n    // a very long comment that would otherwise be split across multiple paragraph units\n}\n```\n\noutro";
        let (placeholder_text, blocks) = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        let restored = restore_code_blocks(&placeholder_text, &blocks);
        assert_eq!(restored, text);
    }

    #[test]
    fn test_list_paragraph_detection() {
        let list = "- one\n- two\n- three";
        assert!(is_list_paragraph(list));
        let prose = "This is a sentence.\nAnd another one here.";
        assert!(!is_list_paragraph(prose));
    }

    #[test]
    fn test_oversized_list_paragraph_is_sentence_split() {
        let mut list = String::new();
        for i in 0..30 {
            list.push_str(&format!("- Bullet item number {i} with enough words to add up.\n"));
        }
        assert!(is_list_paragraph(&list));

        let budget = 40;
        assert!(estimate_tokens(&list) > budget);
        let chunks = pack_units(&[list.clone()], "", budget, 0);
        assert!(chunks.len() > 1, "oversized list paragraph must be split across chunks");
        for c in &chunks {
            // The header/newline prefix added by `pack_units` is a fixed
            // small overhead on top of the sentence-split budget.
            assert!(estimate_tokens(c) <= budget + 5);
        }
    }
}
