//! Token trigram counts stored as a three-level tree: first → second → third → count.

use crate::FrequencyTable;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Third token → count.
pub type Thirds = HashMap<String, u64>;

/// Second token → thirds.
pub type Seconds = HashMap<String, Thirds>;

/// Hierarchical token trigram table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigrams {
    firsts: HashMap<String, Seconds>,
    total: u64,
}

impl Trigrams {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `(first, second, third)`.
    pub fn add(&mut self, first: &str, second: &str, third: &str) -> &mut Self {
        *self
            .firsts
            .entry_ref(first)
            .or_default()
            .entry_ref(second)
            .or_default()
            .entry_ref(third)
            .or_insert(0) += 1;
        self.total += 1;
        self
    }

    /// Count every window of three consecutive tokens.
    ///
    /// Fewer than three tokens add nothing.
    pub fn add_all<S: AsRef<str>>(&mut self, tokens: &[S]) -> &mut Self {
        for w in tokens.windows(3) {
            self.add(w[0].as_ref(), w[1].as_ref(), w[2].as_ref());
        }
        self
    }

    /// Merge the subtree of a single first token.
    pub fn append_entry(&mut self, first: String, seconds: Seconds) {
        let added: u64 = seconds.values().flat_map(|t| t.values()).sum();
        if added == 0 {
            return;
        }

        match self.firsts.get_mut(&first) {
            Some(existing) => merge_seconds(existing, seconds),
            None => {
                self.firsts.insert(first, seconds);
            }
        }
        self.total += added;
    }

    /// Merge `other` into this table.
    pub fn append(&mut self, other: Trigrams) {
        if self.firsts.is_empty() {
            *self = other;
            return;
        }
        for (first, seconds) in other.firsts {
            match self.firsts.get_mut(&first) {
                Some(existing) => merge_seconds(existing, seconds),
                None => {
                    self.firsts.insert(first, seconds);
                }
            }
        }
        self.total += other.total;
    }

    /// Everything under `first`.
    pub fn get_first(&self, first: &str) -> Option<&Seconds> {
        self.firsts.get(first)
    }

    /// Everything under `(first, second)`.
    pub fn get_second(&self, first: &str, second: &str) -> Option<&Thirds> {
        self.firsts.get(first)?.get(second)
    }

    /// Count of `(first, second, third)`, zero if never inserted.
    pub fn get(&self, first: &str, second: &str, third: &str) -> u64 {
        self.get_second(first, second)
            .and_then(|thirds| thirds.get(third))
            .copied()
            .unwrap_or(0)
    }

    /// Iterate over first tokens and their subtrees.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Seconds)> {
        self.firsts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume the table, yielding each first token with its subtree.
    pub fn into_entries(self) -> impl Iterator<Item = (String, Seconds)> {
        self.firsts.into_iter()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct first tokens.
    pub fn len(&self) -> usize {
        self.firsts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firsts.is_empty()
    }
}

fn merge_seconds(into: &mut Seconds, from: Seconds) {
    for (second, thirds) in from {
        match into.get_mut(&second) {
            Some(existing) => {
                for (third, count) in thirds {
                    *existing.entry(third).or_insert(0) += count;
                }
            }
            None => {
                into.insert(second, thirds);
            }
        }
    }
}

impl FrequencyTable for Trigrams {
    fn append(&mut self, other: Self) {
        Trigrams::append(self, other);
    }

    fn total(&self) -> u64 {
        Trigrams::total(self)
    }

    fn is_empty(&self) -> bool {
        Trigrams::is_empty(self)
    }
}
