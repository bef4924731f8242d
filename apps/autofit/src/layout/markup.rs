//! Structured text → markup conversion.
//!
//! The HTML form is what gets printed; the block list is what the metric oracle
//! lays out. Both come from one `pulldown-cmark` parse of the source.

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

/// Layout-relevant kind of a top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Heading level 1..=6.
    Heading(u8),
    Paragraph,
    ListItem,
    CodeBlock,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Plain text with inline markup stripped. Code blocks keep their newlines.
    pub text: String,
}

/// Counts the render report hands back so callers can judge how much to cut or add.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    pub word_count: u32,
    /// Non-whitespace characters.
    pub char_count: u32,
    pub h1_count: u32,
    pub h2_count: u32,
    pub li_count: u32,
    pub p_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Markup {
    html: String,
    blocks: Vec<Block>,
    stats: ContentStats,
}

impl Markup {
    pub fn to_html(&self) -> &str {
        &self.html
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn stats(&self) -> ContentStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

pub fn parse_markdown(source: &str) -> Markup {
    let mut html_out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut html_out, Parser::new_ext(source, options()));

    let blocks = collect_blocks(source);
    let stats = compute_stats(&blocks);
    Markup {
        html: html_out,
        blocks,
        stats,
    }
}

fn collect_blocks(source: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open(&mut blocks, &mut current, BlockKind::Heading(level as u8));
            }
            // Loose list items wrap their text in paragraphs; those belong to the item.
            Event::Start(Tag::Paragraph) => {
                if !is_open(&current, BlockKind::ListItem) {
                    open(&mut blocks, &mut current, BlockKind::Paragraph);
                }
            }
            Event::Start(Tag::Item) => open(&mut blocks, &mut current, BlockKind::ListItem),
            Event::Start(Tag::CodeBlock(_)) => {
                open(&mut blocks, &mut current, BlockKind::CodeBlock);
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(block) = current.as_mut() {
                    block.text.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(block) = current.as_mut() {
                    block.text.push(' ');
                }
            }
            Event::Rule => {
                close(&mut blocks, &mut current);
                blocks.push(Block {
                    kind: BlockKind::Rule,
                    text: String::new(),
                });
            }
            Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::CodeBlock) => {
                close(&mut blocks, &mut current);
            }
            Event::End(TagEnd::Paragraph) => {
                if is_open(&current, BlockKind::Paragraph) {
                    close(&mut blocks, &mut current);
                } else if let Some(block) = current.as_mut() {
                    block.text.push(' ');
                }
            }
            Event::End(TagEnd::Item) => {
                if is_open(&current, BlockKind::ListItem) {
                    close(&mut blocks, &mut current);
                }
            }
            _ => {}
        }
    }
    close(&mut blocks, &mut current);
    blocks
}

fn is_open(current: &Option<Block>, kind: BlockKind) -> bool {
    current.as_ref().is_some_and(|b| b.kind == kind)
}

fn open(blocks: &mut Vec<Block>, current: &mut Option<Block>, kind: BlockKind) {
    close(blocks, current);
    *current = Some(Block {
        kind,
        text: String::new(),
    });
}

fn close(blocks: &mut Vec<Block>, current: &mut Option<Block>) {
    if let Some(mut block) = current.take() {
        if block.kind != BlockKind::CodeBlock {
            block.text = block.text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        blocks.push(block);
    }
}

fn compute_stats(blocks: &[Block]) -> ContentStats {
    let mut stats = ContentStats::default();
    for block in blocks {
        stats.word_count += block.text.split_whitespace().count() as u32;
        stats.char_count += block.text.chars().filter(|c| !c.is_whitespace()).count() as u32;
        match block.kind {
            BlockKind::Heading(1) => stats.h1_count += 1,
            BlockKind::Heading(2) => stats.h2_count += 1,
            BlockKind::ListItem => stats.li_count += 1,
            BlockKind::Paragraph => stats.p_count += 1,
            _ => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "# Ada Lovelace\n\nAnalyst and *writer*.\n\n## Experience\n\n- Wrote the first `program`\n- Annotated the\n  Menabrea paper\n\n---\n\n## Skills\n\nMathematics\n";

    #[test]
    fn test_blocks_in_document_order() {
        let markup = parse_markdown(RESUME);
        let kinds: Vec<BlockKind> = markup.blocks().iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(1),
                BlockKind::Paragraph,
                BlockKind::Heading(2),
                BlockKind::ListItem,
                BlockKind::ListItem,
                BlockKind::Rule,
                BlockKind::Heading(2),
                BlockKind::Paragraph,
            ]
        );
    }

    #[test]
    fn test_inline_markup_stripped_and_breaks_joined() {
        let markup = parse_markdown(RESUME);
        assert_eq!(markup.blocks()[1].text, "Analyst and writer.");
        assert_eq!(markup.blocks()[3].text, "Wrote the first program");
        assert_eq!(markup.blocks()[4].text, "Annotated the Menabrea paper");
    }

    #[test]
    fn test_loose_list_item_is_one_block() {
        let markup = parse_markdown("- first para\n\n  second para\n- next\n");
        let items: Vec<&str> = markup.blocks().iter().map(|b| b.text.as_str()).collect();
        assert_eq!(items, vec!["first para second para", "next"]);
        assert!(markup.blocks().iter().all(|b| b.kind == BlockKind::ListItem));
    }

    #[test]
    fn test_content_stats() {
        let stats = parse_markdown(RESUME).stats();
        assert_eq!(stats.h1_count, 1);
        assert_eq!(stats.h2_count, 2);
        assert_eq!(stats.li_count, 2);
        assert_eq!(stats.p_count, 2);
        assert_eq!(stats.word_count, 16);
        // 11 + 17 + 10 + 20 + 25 + 6 + 11
        assert_eq!(stats.char_count, 100);
    }

    #[test]
    fn test_html_output() {
        let markup = parse_markdown(RESUME);
        assert!(markup.to_html().contains("<h1>Ada Lovelace</h1>"));
        assert!(markup.to_html().contains("<em>writer</em>"));
        assert!(markup.to_html().contains("<hr />"));
    }

    #[test]
    fn test_empty_source() {
        let markup = parse_markdown("   \n\n");
        assert!(markup.is_empty());
        assert_eq!(markup.stats(), ContentStats::default());
    }
}
