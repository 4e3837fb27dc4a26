//! Sharding aggregators: fold local tables into block accumulators and decide
//! when a block is handed to the writer pool.
//!
//! Each aggregator is owned by exactly one thread. Accumulators are moved into
//! flush requests, never shared.

use crate::writer::{FlushQueue, FlushRequest, Payload};
use lmd_core::Result;
use lmd_model::{shard_of, CharTrigrams, Layout, Trigrams};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Global character trigram accumulator.
#[derive(Debug)]
pub struct CharAggregator {
    block_size: u64,
    block: CharTrigrams,
}

impl CharAggregator {
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            block: CharTrigrams::new(),
        }
    }

    /// Merge a local table. Returns the accumulated block once its total
    /// exceeds the block size, leaving an empty accumulator behind.
    pub fn push(&mut self, table: CharTrigrams) -> Option<CharTrigrams> {
        self.block.append(table);
        if self.block.total() > self.block_size {
            Some(std::mem::take(&mut self.block))
        } else {
            None
        }
    }

    /// Whatever remains at end of input, unless it is empty.
    pub fn finish(self) -> Option<CharTrigrams> {
        (!self.block.is_empty()).then_some(self.block)
    }
}

/// Per-shard token trigram accumulators plus the running grand total.
#[derive(Debug)]
pub struct TrigramAggregator {
    block_size: u64,
    shard_count: u32,
    shards: Vec<Option<Trigrams>>,
    grand_total: u64,
}

impl TrigramAggregator {
    pub fn new(block_size: u64, shard_count: u32) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            block_size,
            shard_count,
            shards: (0..shard_count).map(|_| None).collect(),
            grand_total: 0,
        }
    }

    /// Route every first-token entry of `table` to its shard, then return the
    /// shards whose totals exceed the block size.
    pub fn push(&mut self, table: Trigrams) -> Vec<(u32, Trigrams)> {
        self.grand_total += table.total();
        for (first, seconds) in table.into_entries() {
            let h = shard_of(&first, self.shard_count) as usize;
            self.shards[h]
                .get_or_insert_with(Trigrams::new)
                .append_entry(first, seconds);
        }

        let block_size = self.block_size;
        let mut full = Vec::new();
        for (h, slot) in self.shards.iter_mut().enumerate() {
            if matches!(slot, Some(shard) if shard.total() > block_size) {
                if let Some(shard) = slot.take() {
                    full.push((h as u32, shard));
                }
            }
        }
        full
    }

    /// Sum of `total()` over every table pushed so far.
    pub fn grand_total(&self) -> u64 {
        self.grand_total
    }

    /// Every non-empty shard, plus the grand total.
    pub fn finish(self) -> (Vec<(u32, Trigrams)>, u64) {
        let rest = self
            .shards
            .into_iter()
            .enumerate()
            .filter_map(|(h, slot)| slot.filter(|s| !s.is_empty()).map(|s| (h as u32, s)))
            .collect();
        (rest, self.grand_total)
    }
}

fn submit(flush: &FlushQueue, path: PathBuf, payload: Payload) -> Result<()> {
    flush.send(FlushRequest { path, payload })
}

/// Drain local character tables until the channel closes. Returns the total
/// number of character trigrams received.
///
/// If `aborted` is set once the input closes, the final partial block is
/// dropped instead of flushed.
pub fn run_char3grams(
    input: Receiver<CharTrigrams>,
    flush: FlushQueue,
    path: PathBuf,
    block_size: u64,
    aborted: Arc<AtomicBool>,
) -> Result<u64> {
    let mut aggregator = CharAggregator::new(block_size);
    let mut received = 0;

    for table in input {
        received += table.total();
        if let Some(block) = aggregator.push(table) {
            debug!("flushing {} character trigrams", block.total());
            submit(&flush, path.clone(), Payload::Char3Grams(block))?;
        }
    }

    if aborted.load(Ordering::SeqCst) {
        warn!("Extraction failed, skipping final character trigram flush");
        return Ok(received);
    }
    if let Some(block) = aggregator.finish() {
        debug!("final flush of {} character trigrams", block.total());
        submit(&flush, path, Payload::Char3Grams(block))?;
    }
    info!("Character trigrams done: {} occurrences", received);
    Ok(received)
}

/// Drain local token tables until the channel closes, then flush every shard
/// and overwrite the total file. Returns the grand total.
///
/// If `aborted` is set once the input closes, neither the remaining shards
/// nor the total are written.
pub fn run_trigrams(
    input: Receiver<Trigrams>,
    flush: FlushQueue,
    layout: Layout,
    block_size: u64,
    aborted: Arc<AtomicBool>,
) -> Result<u64> {
    let mut aggregator = TrigramAggregator::new(block_size, layout.shard_count());

    for table in input {
        for (h, shard) in aggregator.push(table) {
            debug!("flushing shard {:#x} ({} trigrams)", h, shard.total());
            submit(&flush, layout.shard_path(h), Payload::Trigrams(shard))?;
        }
    }

    if aborted.load(Ordering::SeqCst) {
        warn!("Extraction failed, skipping final shard flushes and total");
        return Ok(aggregator.grand_total());
    }
    let (rest, grand_total) = aggregator.finish();
    for (h, shard) in rest {
        debug!("final flush of shard {:#x} ({} trigrams)", h, shard.total());
        submit(&flush, layout.shard_path(h), Payload::Trigrams(shard))?;
    }
    submit(&flush, layout.total_path(), Payload::Total(grand_total))?;

    info!("Token trigrams done: grand total {}", grand_total);
    Ok(grand_total)
}
