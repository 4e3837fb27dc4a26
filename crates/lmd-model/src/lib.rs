//! lmd-model: Frequency tables, their on-disk store, and the query engine.

pub mod char_trigrams;
pub mod query;
pub mod shard;
pub mod store;
pub mod table;
pub mod trigrams;

pub use char_trigrams::CharTrigrams;
pub use query::{QueryEngine, QueryError};
pub use shard::{shard_of, FormatManifest, Layout};
pub use table::FrequencyTable;
pub use trigrams::{Seconds, Thirds, Trigrams};
