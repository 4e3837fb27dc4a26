//! Writer pool performing flush I/O on behalf of the aggregators.

use lmd_core::{Error, Result};
use lmd_model::shard::fnv1a32;
use lmd_model::{store, CharTrigrams, Trigrams};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// What a flush request persists.
#[derive(Debug)]
pub enum Payload {
    /// Appended as one record.
    Char3Grams(CharTrigrams),
    /// Appended as one record.
    Trigrams(Trigrams),
    /// Replaces the target file.
    Total(u64),
}

/// A unit of work for the writer pool.
#[derive(Debug)]
pub struct FlushRequest {
    pub path: PathBuf,
    pub payload: Payload,
}

impl FlushRequest {
    /// Perform the write. Returns whether anything was written.
    pub fn execute(self) -> Result<bool> {
        match self.payload {
            Payload::Char3Grams(table) => store::append_table(&self.path, &table),
            Payload::Trigrams(table) => store::append_table(&self.path, &table),
            Payload::Total(total) => {
                debug!("writing total {} to {}", total, self.path.display());
                store::write_total(&self.path, total)?;
                Ok(true)
            }
        }
    }
}

/// Submits flush requests to the writer pool.
///
/// Every writer drains its own bounded lane. A request goes to the lane picked
/// by the FNV-1a hash of its target path, so all requests for one file are
/// written by the same thread in the order they were sent.
#[derive(Debug, Clone)]
pub struct FlushQueue {
    lanes: Vec<SyncSender<FlushRequest>>,
}

impl FlushQueue {
    /// Queue `request` on the lane owning its target, blocking while that
    /// lane is full.
    pub fn send(&self, request: FlushRequest) -> Result<()> {
        let lane = &self.lanes[self.lane_of(&request.path)];
        lane.send(request)
            .map_err(|_| Error::Pipeline("writer pool stopped accepting flushes".to_string()))
    }

    fn lane_of(&self, path: &Path) -> usize {
        fnv1a32(path.to_string_lossy().as_bytes()) as usize % self.lanes.len()
    }
}

impl From<SyncSender<FlushRequest>> for FlushQueue {
    fn from(sender: SyncSender<FlushRequest>) -> Self {
        Self {
            lanes: vec![sender],
        }
    }
}

/// Fixed set of writer threads, each owning one lane of the flush queue.
///
/// Each request is processed to completion by exactly one writer, and a given
/// target is only ever written by one writer.
pub struct WriterPool {
    queue: Option<FlushQueue>,
    handles: Vec<JoinHandle<Result<usize>>>,
}

impl WriterPool {
    /// Spawn `writers` threads, each with a lane of `capacity` pending
    /// requests.
    pub fn start(writers: usize, capacity: usize) -> Result<Self> {
        let mut lanes = Vec::with_capacity(writers.max(1));
        let mut handles = Vec::with_capacity(writers.max(1));

        for i in 0..writers.max(1) {
            let (sender, receiver) = sync_channel(capacity);
            let handle = std::thread::Builder::new()
                .name(format!("lmd-writer-{i}"))
                .spawn(move || writer_loop(receiver))
                .map_err(Error::Io)?;
            lanes.push(sender);
            handles.push(handle);
        }

        Ok(Self {
            queue: Some(FlushQueue { lanes }),
            handles,
        })
    }

    /// A handle for submitting flush requests.
    pub fn sender(&self) -> Result<FlushQueue> {
        self.queue
            .clone()
            .ok_or_else(|| Error::Pipeline("writer pool already closed".to_string()))
    }

    /// Close the lanes, wait for every writer to drain its own, and return the
    /// number of records written. The first writer error wins.
    pub fn finish(mut self) -> Result<usize> {
        drop(self.queue.take());

        let mut written = 0;
        let mut first_error = None;
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error
                        .get_or_insert(Error::Pipeline("writer thread panicked".to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

fn writer_loop(receiver: Receiver<FlushRequest>) -> Result<usize> {
    let mut written = 0;
    for request in receiver {
        let path = request.path.clone();
        match request.execute() {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                return Err(e);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WriterPool::start(3, 2).unwrap();
        let sender = pool.sender().unwrap();

        for i in 0..5u32 {
            let mut t = Trigrams::new();
            t.add("a", "b", "c");
            sender
                .send(FlushRequest {
                    path: dir.path().join(format!("{i:02x}Ngrams.bin")),
                    payload: Payload::Trigrams(t),
                })
                .unwrap();
        }
        sender
            .send(FlushRequest {
                path: dir.path().join("total.bin"),
                payload: Payload::Total(5),
            })
            .unwrap();
        sender
            .send(FlushRequest {
                path: dir.path().join("empty.bin"),
                payload: Payload::Char3Grams(CharTrigrams::new()),
            })
            .unwrap();
        drop(sender);

        assert_eq!(pool.finish().unwrap(), 6);
        for i in 0..5u32 {
            let path = dir.path().join(format!("{i:02x}Ngrams.bin"));
            let t: Trigrams = store::read_merged(&path).unwrap().unwrap();
            assert_eq!(t.total(), 1);
        }
        let total = store::read_total(&dir.path().join("total.bin")).unwrap();
        assert_eq!(total, Some(5));
        assert!(!dir.path().join("empty.bin").exists());
    }

    fn wide_table(prefix: &str, n: usize) -> Trigrams {
        let mut t = Trigrams::new();
        for i in 0..n {
            t.add(&format!("{prefix}{i}"), "sat", "mat");
        }
        t
    }

    #[test]
    fn test_large_records_for_one_target_stay_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00Ngrams.bin");
        let pool = WriterPool::start(4, 4).unwrap();
        let sender = pool.sender().unwrap();

        // Each record is far larger than one buffered write.
        let records = 6;
        for r in 0..records {
            sender
                .send(FlushRequest {
                    path: path.clone(),
                    payload: Payload::Trigrams(wide_table(&format!("r{r}w"), 20_000)),
                })
                .unwrap();
        }
        drop(sender);

        assert_eq!(pool.finish().unwrap(), records);
        let t: Trigrams = store::read_merged(&path).unwrap().unwrap();
        assert_eq!(t.total(), records as u64 * 20_000);
        assert_eq!(t.get("r5w19999", "sat", "mat"), 1);
    }

    #[test]
    fn test_one_target_always_maps_to_one_lane() {
        let pool = WriterPool::start(8, 1).unwrap();
        let queue = pool.sender().unwrap();
        let path = Path::new("/data/3fNgrams.bin");
        let lane = queue.lane_of(path);
        assert!(lane < 8);
        for _ in 0..10 {
            assert_eq!(queue.lane_of(path), lane);
        }
        drop(queue);
        assert_eq!(pool.finish().unwrap(), 0);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WriterPool::start(1, 1).unwrap();
        let sender = pool.sender().unwrap();

        sender
            .send(FlushRequest {
                path: dir.path().join("missing-dir").join("total.bin"),
                payload: Payload::Total(1),
            })
            .unwrap();
        drop(sender);

        assert!(pool.finish().is_err());
    }
}
