//! Character trigram counts.

use crate::FrequencyTable;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Separator inserted between tokens so windows can straddle token boundaries.
const TOKEN_SEPARATOR: char = ' ';

/// Counts of 3-grapheme windows over lowercased text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharTrigrams {
    counts: HashMap<String, u64>,
    total: u64,
}

impl CharTrigrams {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every 3-grapheme window of `text` (lowercased).
    pub fn add(&mut self, text: &str) -> &mut Self {
        self.count_windows(&text.to_lowercase());
        self
    }

    /// Count the windows of a token sequence joined by single spaces.
    ///
    /// `["ab", "cd"]` yields `"ab "`, `"b c"` and `" cd"`.
    pub fn add_tokens<'a, I>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut text = String::new();
        for token in tokens {
            if !text.is_empty() {
                text.push(TOKEN_SEPARATOR);
            }
            text.push_str(&token.to_lowercase());
        }
        self.count_windows(&text);
        self
    }

    fn count_windows(&mut self, text: &str) {
        let starts: Vec<usize> = text.grapheme_indices(true).map(|(i, _)| i).collect();
        if starts.len() < 3 {
            return;
        }

        for i in 0..=starts.len() - 3 {
            let end = starts.get(i + 3).copied().unwrap_or(text.len());
            self.insert(&text[starts[i]..end], 1);
        }
    }

    /// Add `count` occurrences of a single key.
    pub fn insert(&mut self, key: &str, count: u64) {
        if count == 0 {
            return;
        }
        match self.counts.get_mut(key) {
            Some(n) => *n += count,
            None => {
                self.counts.insert(key.to_string(), count);
            }
        }
        self.total += count;
    }

    /// Count for `key`, zero if never inserted.
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Iterate over `(trigram, count)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct trigrams.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Merge `other` into this table.
    pub fn append(&mut self, other: CharTrigrams) {
        if self.counts.is_empty() {
            *self = other;
            return;
        }
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.total += other.total;
    }
}

impl FrequencyTable for CharTrigrams {
    fn append(&mut self, other: Self) {
        CharTrigrams::append(self, other);
    }

    fn total(&self) -> u64 {
        CharTrigrams::total(self)
    }

    fn is_empty(&self) -> bool {
        CharTrigrams::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(t: &CharTrigrams) -> u64 {
        t.iter().map(|(_, n)| n).sum()
    }

    #[test]
    fn test_add_counts_windows() {
        let mut t = CharTrigrams::new();
        t.add("Hello");

        assert_eq!(t.len(), 3); // "hel", "ell", "llo"
        assert_eq!(t.get("hel"), 1);
        assert_eq!(t.get("llo"), 1);
        assert_eq!(t.get("Hel"), 0);
        assert_eq!(t.total(), 3);
    }

    #[test]
    fn test_short_text_is_ignored() {
        let mut t = CharTrigrams::new();
        t.add("ab").add("");
        assert!(t.is_empty());
        assert_eq!(t.total(), 0);
    }

    #[test]
    fn test_windows_are_graphemes() {
        let mut t = CharTrigrams::new();
        // "e\u{301}" is a single grapheme.
        t.add("cafe\u{301}s");
        assert_eq!(t.get("afe\u{301}"), 1);
        assert_eq!(t.get("fe\u{301}s"), 1);
        assert_eq!(t.total(), 3);
    }

    #[test]
    fn test_add_tokens_straddles_boundaries() {
        let mut t = CharTrigrams::new();
        t.add_tokens(["cat", "sat"]);

        assert_eq!(t.get("cat"), 1);
        assert_eq!(t.get("at "), 1);
        assert_eq!(t.get("t s"), 1);
        assert_eq!(t.get(" sa"), 1);
        assert_eq!(t.get("sat"), 1);
        assert_eq!(t.total(), 5);
    }

    #[test]
    fn test_append_sums_counts() {
        let mut a = CharTrigrams::new();
        a.add("one two three");
        let mut b = CharTrigrams::new();
        b.add("fourfivesix").add("one");

        let mut merged = a.clone();
        merged.append(b.clone());

        assert_eq!(merged.get("one"), a.get("one") + b.get("one"));
        assert_eq!(merged.total(), a.total() + b.total());
        assert_eq!(sum(&merged), merged.total());
    }

    #[test]
    fn test_append_is_order_independent() {
        let docs = ["the cat sat", "on the mat", "the end", "xy"];
        let tables: Vec<CharTrigrams> = docs
            .iter()
            .map(|d| {
                let mut t = CharTrigrams::new();
                t.add(d);
                t
            })
            .collect();

        let mut forward = CharTrigrams::new();
        for t in tables.iter().cloned() {
            forward.append(t);
        }

        let mut backward = CharTrigrams::new();
        for t in tables.iter().rev().cloned() {
            backward.append(t);
        }

        let mut left = tables[0].clone();
        left.append(tables[1].clone());
        let mut right = tables[2].clone();
        right.append(tables[3].clone());
        left.append(right);

        assert_eq!(forward, backward);
        assert_eq!(forward, left);
    }
}
