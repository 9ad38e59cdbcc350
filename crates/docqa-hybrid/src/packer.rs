//! Greedy, order-preserving packing of source groups into a character budget.
//!
//! Higher-ranked sources always win budget over lower-ranked ones; this is a
//! first-fit pass, not an optimal selection.

use docqa_core::types::truncate_with_marker;
use docqa_core::{ContextBudget, SourceGroup};

pub const TRUNCATION_MARKER: &str = "...(truncated)";
/// Titles listed per source block; the rest are left out of the prompt.
const MAX_TITLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPacker {
    budget: ContextBudget,
}

impl ContextPacker {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Keep sources in rank order while their serialized blocks fit in
    /// `total_char_limit`. Each content is first clipped to
    /// `per_item_char_limit`. The first source that does not fit is clipped
    /// into the remaining space when more than `min_slice_chars` of content
    /// would survive, and packing stops there either way.
    pub fn pack(&self, sources: &[SourceGroup]) -> Vec<SourceGroup> {
        let b = self.budget;
        let mut used = 0usize;
        let mut packed = Vec::new();

        for group in sources.iter().take(b.max_items) {
            let content = truncate_with_marker(&group.merged_content, b.per_item_char_limit, TRUNCATION_MARKER);
            let overhead = block_overhead(group);
            let cost = overhead + content.chars().count();

            if used + cost <= b.total_char_limit {
                used += cost;
                packed.push(with_content(group, content));
                continue;
            }

            let room = b.total_char_limit.saturating_sub(used + overhead);
            if room > b.min_slice_chars {
                packed.push(with_content(group, truncate_with_marker(&content, room, TRUNCATION_MARKER)));
            }
            break;
        }
        packed
    }

    /// The context section for a prompt: a header, then one block per source.
    /// `retrieved` is how many sources were available before packing.
    pub fn render(&self, packed: &[SourceGroup], retrieved: usize) -> String {
        if packed.is_empty() {
            return String::new();
        }
        let mut out = if packed.len() < retrieved {
            format!("=== Archive excerpts (first {} of {} sources) ===", packed.len(), retrieved)
        } else {
            "=== Archive excerpts ===".to_string()
        };
        for group in packed {
            out.push_str(&block(group, &group.merged_content));
        }
        out
    }
}

/// Character count of the rendered source blocks, header excluded.
pub fn packed_size(packed: &[SourceGroup]) -> usize {
    packed.iter().map(|g| block(g, &g.merged_content).chars().count()).sum()
}

fn block(group: &SourceGroup, content: &str) -> String {
    let mut s = format!("\n[Source: {}]\n", group.source_id);
    if !group.titles.is_empty() {
        let shown: Vec<&str> = group.titles.iter().take(MAX_TITLES).map(String::as_str).collect();
        s.push_str("Title: ");
        s.push_str(&shown.join(", "));
        s.push('\n');
    }
    s.push_str("Content: ");
    s.push_str(content);
    s
}

fn block_overhead(group: &SourceGroup) -> usize {
    block(group, "").chars().count()
}

fn with_content(group: &SourceGroup, content: String) -> SourceGroup {
    SourceGroup { merged_content: content, ..group.clone() }
}
