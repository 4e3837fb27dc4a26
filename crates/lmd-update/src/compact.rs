//! Offline compaction: rewrite every table file as a single merged record.

use lmd_core::{Config, Result};
use lmd_model::{store, CharTrigrams, FormatManifest, Layout, Trigrams};
use tracing::{debug, info};

/// Outcome of a compaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactSummary {
    /// Table files rewritten.
    pub files: usize,
    /// Total of the character trigram table.
    pub char_total: u64,
    /// Sum of the totals of every token trigram shard.
    pub trigram_total: u64,
}

/// Compact the data directory named by `config`.
///
/// Must not run concurrently with an update of the same directory. Any
/// undecodable record aborts the compaction.
pub fn compact(config: &Config) -> Result<CompactSummary> {
    config.validate()?;
    let layout = Layout::new(&config.data_dir, config.shard_count);
    if let Some(manifest) = FormatManifest::load(&layout)? {
        manifest.check_compatible(config.shard_count)?;
    }

    info!("Compacting {}", layout.dir().display());
    let mut summary = CompactSummary::default();

    if let Some(total) = store::compact::<CharTrigrams>(&layout.char3grams_path())? {
        summary.files += 1;
        summary.char_total = total;
    }
    for (h, path) in layout.existing_shards() {
        if let Some(total) = store::compact::<Trigrams>(&path)? {
            debug!("shard {:#x}: {} trigrams", h, total);
            summary.files += 1;
            summary.trigram_total += total;
        }
    }

    info!(
        "Compacted {} files ({} character trigrams, {} token trigrams)",
        summary.files, summary.char_total, summary.trigram_total
    );
    Ok(summary)
}
