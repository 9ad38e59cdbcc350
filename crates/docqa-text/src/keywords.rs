use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

/// Runs of 2-4 CJK ideographs, or letter/digit words of 2+ characters in any
/// other script.
const TOKEN_PATTERN: &str = r"[\x{4e00}-\x{9fff}]{2,4}|[[\p{L}\p{N}]--[\x{4e00}-\x{9fff}]]{2,}";

const CJK_STOP_WORDS: &[&str] = &[
    "什麼", "如何", "怎樣", "為何", "為什麼", "何時", "哪裡", "哪個", "多少", "的", "了", "是", "在", "有", "會",
    "要", "可以", "能夠", "這個", "那個",
];

const EN_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can",
    "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
    "you", "your", "me", "my", "we", "our", "about", "tell",
];

pub struct KeywordExtractor {
    pattern: Regex,
    stop_words: HashSet<&'static str>,
}

impl KeywordExtractor {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(TOKEN_PATTERN).context("compiling keyword pattern")?;
        let stop_words = CJK_STOP_WORDS.iter().chain(EN_STOP_WORDS).copied().collect();
        Ok(Self { pattern, stop_words })
    }

    /// Distinct keywords in order of first appearance, lowercased.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|kw| !self.stop_words.contains(kw.as_str()))
            .filter(|kw| seen.insert(kw.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cjk_runs_are_split_into_two_to_four_chars() {
        let kw = KeywordExtractor::new().unwrap();
        assert_eq!(kw.extract("外婆，老房子？"), ["外婆", "老房子"]);
        assert_eq!(kw.extract("阿公年輕時的工作"), ["阿公年輕", "時的工作"]);
    }

    #[test]
    fn stop_words_dropped_and_duplicates_collapsed() {
        let kw = KeywordExtractor::new().unwrap();
        assert_eq!(kw.extract("What is the Farm? the farm, THE FARM!"), ["farm"]);
        assert_eq!(kw.extract("什麼"), Vec::<String>::new());
    }

    #[test]
    fn mixed_scripts_keep_order() {
        let kw = KeywordExtractor::new().unwrap();
        assert_eq!(kw.extract("Taipei 老家 1968 x"), ["taipei", "老家", "1968"]);
    }
}
