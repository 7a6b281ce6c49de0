//! Chunker & Bridge (CB) — §4.5.
//!
//! Converts normalized markdown into `SemanticChunk[]`. Two strategies:
//! a generic semantic chunker (headings/paragraphs/code fences, §4.5) and
//! an academic chunker for PDF-sourced markdown that preserves formulas,
//! tables, and code as indivisible units. Grounded on the teacher's
//! (deleted) `chunk.rs`, which split markdown the same way — by heading
//! and paragraph boundaries with a token budget — generalized here to emit
//! the richer `ChunkMetadata` the spec requires (heading path, granularity,
//! parent linkage).

use crate::models::{ChunkMetadata, ChunkType, Granularity, SemanticChunk};
use sha2::{Digest, Sha256};

const MAX_TOKENS: usize = 512;
const MIN_TOKENS: usize = 50;
const OVERLAP_RATIO: f64 = 0.12;

fn estimate_tokens(s: &str) -> usize {
    s.split_whitespace().count()
}

fn chunk_id(bundle_id: &str, file_path: &str, index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bundle_id.as_bytes());
    hasher.update(file_path.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..24].to_string()
}

struct Block {
    content: String,
    chunk_type: ChunkType,
    heading: Option<String>,
    heading_level: Option<u8>,
}

/// Split markdown into heading/paragraph/code-fence blocks, in source order.
fn split_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_heading: Option<String> = None;
    let mut current_level: Option<u8> = None;
    let mut in_code_fence = false;
    let mut code_fence_buf = String::new();

    let flush = |blocks: &mut Vec<Block>, buf: &mut String, heading: &Option<String>, level: &Option<u8>| {
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            blocks.push(Block {
                content: trimmed.to_string(),
                chunk_type: ChunkType::Text,
                heading: heading.clone(),
                heading_level: *level,
            });
        }
        buf.clear();
    };

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            if in_code_fence {
                code_fence_buf.push_str(line);
                code_fence_buf.push('\n');
                blocks.push(Block {
                    content: code_fence_buf.trim().to_string(),
                    chunk_type: ChunkType::Code,
                    heading: current_heading.clone(),
                    heading_level: current_level,
                });
                code_fence_buf.clear();
                in_code_fence = false;
            } else {
                flush(&mut blocks, &mut current, &current_heading, &current_level);
                in_code_fence = true;
                code_fence_buf.push_str(line);
                code_fence_buf.push('\n');
            }
            continue;
        }
        if in_code_fence {
            code_fence_buf.push_str(line);
            code_fence_buf.push('\n');
            continue;
        }

        if let Some(level) = heading_level(line) {
            flush(&mut blocks, &mut current, &current_heading, &current_level);
            let heading_text = line.trim_start_matches('#').trim().to_string();
            blocks.push(Block {
                content: line.to_string(),
                chunk_type: ChunkType::Heading,
                heading: Some(heading_text.clone()),
                heading_level: Some(level),
            });
            current_heading = Some(heading_text);
            current_level = Some(level);
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut blocks, &mut current, &current_heading, &current_level);
            continue;
        }

        current.push_str(line);
        current.push('\n');
    }
    flush(&mut blocks, &mut current, &current_heading, &current_level);
    if in_code_fence && !code_fence_buf.trim().is_empty() {
        blocks.push(Block {
            content: code_fence_buf.trim().to_string(),
            chunk_type: ChunkType::Code,
            heading: current_heading,
            heading_level: current_level,
        });
    }
    blocks
}

fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level >= 1 && level <= 6 && trimmed.as_bytes().get(level) == Some(&b' ') {
        Some(level as u8)
    } else {
        None
    }
}

/// Generic semantic chunker (§4.5): merges blocks up to `MAX_TOKENS`,
/// keeps code fences intact even if oversized, and overlaps adjacent text
/// chunks by the last `OVERLAP_RATIO` fraction of tokens.
pub fn chunk_generic(bundle_id: &str, repo_id: &str, file_path: &str, markdown: &str) -> Vec<SemanticChunk> {
    let blocks = split_blocks(markdown);
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_heading: Option<String> = None;
    let mut buffer_level: Option<u8> = None;
    let mut index = 0usize;

    let mut flush_buffer = |buffer: &mut String, heading: &Option<String>, level: &Option<u8>, index: &mut usize, chunks: &mut Vec<SemanticChunk>| {
        let trimmed = buffer.trim();
        if trimmed.is_empty() {
            return;
        }
        let id = chunk_id(bundle_id, file_path, *index, trimmed);
        chunks.push(SemanticChunk {
            id,
            content: trimmed.to_string(),
            chunk_type: ChunkType::Text,
            metadata: ChunkMetadata {
                bundle_id: bundle_id.to_string(),
                repo_id: repo_id.to_string(),
                file_path: file_path.to_string(),
                chunk_index: *index as i64,
                section_heading: heading.clone(),
                heading_level: *level,
                heading_path: heading.clone(),
                parent_chunk_id: None,
                granularity: Some(Granularity::Chunk),
                page_index: None,
            },
        });
        let overlap_len = (trimmed.split_whitespace().count() as f64 * OVERLAP_RATIO) as usize;
        let tail: String = trimmed.split_whitespace().rev().take(overlap_len).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join(" ");
        buffer.clear();
        if !tail.is_empty() {
            buffer.push_str(&tail);
            buffer.push(' ');
        }
        *index += 1;
    };

    for block in blocks {
        if block.chunk_type == ChunkType::Code {
            flush_buffer(&mut buffer, &buffer_heading, &buffer_level, &mut index, &mut chunks);
            let id = chunk_id(bundle_id, file_path, index, &block.content);
            chunks.push(SemanticChunk {
                id,
                content: block.content.clone(),
                chunk_type: ChunkType::Code,
                metadata: ChunkMetadata {
                    bundle_id: bundle_id.to_string(),
                    repo_id: repo_id.to_string(),
                    file_path: file_path.to_string(),
                    chunk_index: index as i64,
                    section_heading: block.heading.clone(),
                    heading_level: block.heading_level,
                    heading_path: block.heading,
                    parent_chunk_id: None,
                    granularity: Some(Granularity::Chunk),
                    page_index: None,
                },
            });
            index += 1;
            continue;
        }
        if block.chunk_type == ChunkType::Heading {
            buffer_heading = block.heading;
            buffer_level = block.heading_level;
            continue;
        }

        let prospective_tokens = estimate_tokens(&buffer) + estimate_tokens(&block.content);
        if prospective_tokens > MAX_TOKENS && estimate_tokens(&buffer) >= MIN_TOKENS {
            flush_buffer(&mut buffer, &buffer_heading, &buffer_level, &mut index, &mut chunks);
        }
        buffer.push_str(&block.content);
        buffer.push_str("\n\n");
    }
    flush_buffer(&mut buffer, &buffer_heading, &buffer_level, &mut index, &mut chunks);

    chunks
}

/// Academic chunker (§4.5): `##`-level sections are hard chunk boundaries;
/// formulas (`$$...$$`), tables, and code blocks are never split.
pub fn chunk_academic(bundle_id: &str, repo_id: &str, file_path: &str, markdown: &str) -> Vec<SemanticChunk> {
    let mut chunks = Vec::new();
    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();

    for line in markdown.lines() {
        if let Some(2) = heading_level(line) {
            if !current_body.trim().is_empty() || current_heading.is_some() {
                sections.push((current_heading.clone(), current_body.clone()));
            }
            current_heading = Some(line.trim_start_matches('#').trim().to_string());
            current_body.clear();
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    sections.push((current_heading, current_body));

    let heading_path_prefix = file_path.to_string();
    for (section_index, (heading, body)) in sections.into_iter().enumerate() {
        let trimmed = body.trim();
        if trimmed.is_empty() && heading.is_none() {
            continue;
        }
        let chunk_type = dominant_type(trimmed);
        let id = chunk_id(bundle_id, file_path, section_index, trimmed);
        let heading_path = heading
            .as_ref()
            .map(|h| format!("{heading_path_prefix} > {h}"))
            .unwrap_or_else(|| heading_path_prefix.clone());
        chunks.push(SemanticChunk {
            id,
            content: trimmed.to_string(),
            chunk_type,
            metadata: ChunkMetadata {
                bundle_id: bundle_id.to_string(),
                repo_id: repo_id.to_string(),
                file_path: file_path.to_string(),
                chunk_index: section_index as i64,
                section_heading: heading.clone(),
                heading_level: heading.as_ref().map(|_| 2u8),
                heading_path: Some(heading_path),
                parent_chunk_id: None,
                granularity: Some(Granularity::Section),
                page_index: None,
            },
        });
    }
    chunks
}

fn dominant_type(content: &str) -> ChunkType {
    if content.contains("$$") {
        ChunkType::Formula
    } else if content.contains("```") {
        ChunkType::Code
    } else if content.lines().filter(|l| l.trim_start().starts_with('|')).count() >= 2 {
        ChunkType::Table
    } else {
        ChunkType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_chunker_keeps_code_fence_intact() {
        let md = "# Title\n\nSome intro text.\n\n```rust\nfn main() {}\n```\n\nMore text.\n";
        let chunks = chunk_generic("b1", "x/y", "README.md", md);
        assert!(chunks.iter().any(|c| c.chunk_type == ChunkType::Code && c.content.contains("fn main")));
    }

    #[test]
    fn generic_chunker_assigns_stable_ids() {
        let md = "# T\n\ntext\n";
        let a = chunk_generic("b1", "x/y", "a.md", md);
        let b = chunk_generic("b1", "x/y", "a.md", md);
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn academic_chunker_splits_on_level_two_headings() {
        let md = "## Intro\nhello\n## Methods\n$$E=mc^2$$\n";
        let chunks = chunk_academic("b1", "x/y", "paper.md", md);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chunk_type, ChunkType::Formula);
        assert_eq!(chunks[1].metadata.section_heading.as_deref(), Some("Methods"));
    }
}
