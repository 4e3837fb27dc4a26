//! The merge contract shared by all frequency tables.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A counting table that can be merged with another table of the same kind.
///
/// `append` must be commutative and associative, so any order or batching of
/// merges yields the same counts and the same total.
pub trait FrequencyTable: Default + Serialize + DeserializeOwned + Send + 'static {
    /// Merge `other` into `self`, summing counts at matching keys.
    fn append(&mut self, other: Self);

    /// Sum of all counts in the table.
    fn total(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
