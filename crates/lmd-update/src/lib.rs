//! lmd-update: Ingestion pipeline turning documents into sharded frequency tables.

pub mod aggregator;
pub mod compact;
pub mod extractor;
pub mod pipeline;
pub mod tokenizer;
pub mod writer;

pub use compact::{compact, CompactSummary};
pub use extractor::Extracted;
pub use pipeline::{Pipeline, RunSummary};
pub use tokenizer::{PlainTextTokenizer, Token, Tokenizer};
