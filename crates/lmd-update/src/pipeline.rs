//! Update run orchestration.
//!
//! Documents are extracted in parallel on a rayon pool. Local tables fan in
//! to two aggregator threads over bounded channels, and the aggregators hand
//! full blocks to the writer pool:
//!
//! ```text
//! extractors ──► char3grams aggregator ──┐
//!            └─► trigrams aggregator  ───┴─► writer pool ──► data_dir
//! ```

use crate::aggregator::{run_char3grams, run_trigrams};
use crate::extractor::extract_document;
use crate::tokenizer::{PlainTextTokenizer, Tokenizer};
use crate::writer::WriterPool;
use lmd_core::{Config, Error, Result};
use lmd_model::{CharTrigrams, FormatManifest, Layout, Trigrams};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info};

/// Pending flush requests each writer accepts before aggregators block.
pub const FLUSH_QUEUE_CAPACITY: usize = 16;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Documents extracted.
    pub documents: usize,
    /// Character trigram occurrences added.
    pub char_total: u64,
    /// Token trigram occurrences added, as written to the total file.
    pub grand_total: u64,
    /// Records appended or replaced by the writer pool.
    pub flushes: usize,
}

/// One configured update pipeline.
pub struct Pipeline {
    config: Config,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Pipeline {
    /// Pipeline reading plain text documents.
    pub fn new(config: Config) -> Self {
        Self::with_tokenizer(config, Arc::new(PlainTextTokenizer))
    }

    pub fn with_tokenizer(config: Config, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.config.data_dir, self.config.shard_count)
    }

    /// Extract `documents` and merge their tables into the data directory.
    ///
    /// Any document, aggregation or write failure fails the whole run. Blocks
    /// flushed before the failure stay on disk.
    pub fn run(&self, documents: &[PathBuf]) -> Result<RunSummary> {
        self.config.validate()?;
        self.config.ensure_data_dir()?;
        let layout = self.layout();
        self.prepare_manifest(&layout)?;

        let start = Instant::now();
        info!(
            "Updating {} from {} documents ({} workers, {} writers, {} shards)",
            layout.dir().display(),
            documents.len(),
            self.config.workers,
            self.config.writers,
            layout.shard_count()
        );

        let writers = WriterPool::start(self.config.writers, FLUSH_QUEUE_CAPACITY)?;
        let capacity = self.config.workers * 2;
        let (char_tx, char_rx) = sync_channel::<CharTrigrams>(capacity);
        let (tri_tx, tri_rx) = sync_channel::<Trigrams>(capacity);
        let aborted = Arc::new(AtomicBool::new(false));

        let char_stage = {
            let flush = writers.sender()?;
            let path = layout.char3grams_path();
            let block_size = self.config.block_size;
            let aborted = Arc::clone(&aborted);
            spawn_stage("lmd-char3grams", move || {
                run_char3grams(char_rx, flush, path, block_size, aborted)
            })?
        };
        let tri_stage = {
            let flush = writers.sender()?;
            let layout = layout.clone();
            let block_size = self.config.block_size;
            let aborted = Arc::clone(&aborted);
            spawn_stage("lmd-trigrams", move || {
                run_trigrams(tri_rx, flush, layout, block_size, aborted)
            })?
        };

        let extracted = self.extract_all(documents, &char_tx, &tri_tx);
        // The aggregators must see the flag before their input closes.
        if extracted.is_err() {
            aborted.store(true, Ordering::SeqCst);
        }
        drop(char_tx);
        drop(tri_tx);

        let char_total = join_stage(char_stage, "character trigram aggregator");
        let grand_total = join_stage(tri_stage, "token trigram aggregator");
        let flushes = writers.finish();

        // Report the stage closest to the root cause: a dead writer makes the
        // aggregators fail, and a dead aggregator makes the extractors fail.
        let flushes = flushes?;
        let char_total = char_total?;
        let grand_total = grand_total?;
        let documents = extracted.map_err(|e| {
            error!("Update failed: {}", e);
            e
        })?;

        let summary = RunSummary {
            documents,
            char_total,
            grand_total,
            flushes,
        };
        info!(
            "Update complete in {:?}: {} documents, {} character trigrams, {} token trigrams, {} flushes",
            start.elapsed(),
            summary.documents,
            summary.char_total,
            summary.grand_total,
            summary.flushes
        );
        Ok(summary)
    }

    /// Refuse to extend data written with another hash or shard count, then
    /// record the format this run writes.
    fn prepare_manifest(&self, layout: &Layout) -> Result<()> {
        if let Some(existing) = FormatManifest::load(layout)? {
            existing.check_compatible(layout.shard_count())?;
        }
        FormatManifest::current(layout.shard_count()).save(layout)
    }

    fn extract_all(
        &self,
        documents: &[PathBuf],
        char_tx: &SyncSender<CharTrigrams>,
        tri_tx: &SyncSender<Trigrams>,
    ) -> Result<usize> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("lmd-extract-{i}"))
            .build()
            .map_err(|e| Error::Pipeline(format!("cannot start extractor pool: {e}")))?;
        let tokenizer = self.tokenizer.as_ref();
        let senders = (char_tx.clone(), tri_tx.clone());

        pool.install(move || {
            documents.par_iter().enumerate().try_for_each_with(
                senders,
                |(char_tx, tri_tx), (i, path)| {
                    let extracted = extract_document(tokenizer, path, i + 1)?;
                    char_tx
                        .send(extracted.char3grams)
                        .map_err(|_| stage_stopped("character trigram aggregator"))?;
                    tri_tx
                        .send(extracted.trigrams)
                        .map_err(|_| stage_stopped("token trigram aggregator"))
                },
            )
        })?;

        Ok(documents.len())
    }
}

fn stage_stopped(stage: &str) -> Error {
    Error::Pipeline(format!("{stage} stopped accepting tables"))
}

fn spawn_stage<F>(name: &str, f: F) -> Result<JoinHandle<Result<u64>>>
where
    F: FnOnce() -> Result<u64> + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(Error::Io)
}

fn join_stage(handle: JoinHandle<Result<u64>>, stage: &str) -> Result<u64> {
    handle
        .join()
        .map_err(|_| Error::Pipeline(format!("{stage} panicked")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            data_dir: dir.join("data"),
            shard_count: 8,
            block_size: 100,
            workers: 2,
            writers: 2,
        }
    }

    #[test]
    fn test_run_without_documents_writes_zero_total() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path()));

        let summary = pipeline.run(&[]).unwrap();
        assert_eq!(summary.documents, 0);
        assert_eq!(summary.grand_total, 0);
        assert_eq!(summary.flushes, 1);

        let layout = pipeline.layout();
        assert_eq!(lmd_model::store::read_total(&layout.total_path()).unwrap(), Some(0));
        assert_eq!(
            FormatManifest::load(&layout).unwrap(),
            Some(FormatManifest::current(8))
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.workers = 0;

        let err = Pipeline::new(cfg).run(&[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!dir.path().join("data").exists());
    }
}
