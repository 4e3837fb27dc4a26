//! Query engine answering character and token trigram lookups.

use crate::shard::{FormatManifest, Layout};
use crate::{store, CharTrigrams, Trigrams};
use lmd_core::ipc::{
    Char3GramsRequest, Char3GramsResponse, CharNGramMatch, TrigramMatches, TrigramsRequest,
    TrigramsResponse,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Regex scans check the deadline once per this many entries.
const DEADLINE_CHECK_INTERVAL: usize = 4096;

/// Per-request query failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Turn an optional request timeout into an absolute deadline.
pub fn deadline_from(timeout_ms: Option<u64>) -> Option<Instant> {
    timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms))
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), QueryError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(QueryError::DeadlineExceeded),
        _ => Ok(()),
    }
}

/// Answers lookups against a data directory.
///
/// The character trigram table is merged once when the engine is opened.
/// Token trigram shards are merged from disk on every request.
pub struct QueryEngine {
    layout: Layout,
    char3grams: CharTrigrams,
}

impl QueryEngine {
    /// Open a data directory.
    ///
    /// The shard count comes from the directory's format manifest when present,
    /// otherwise `fallback_shard_count` is used. Missing or unreadable files
    /// are logged and treated as empty.
    pub fn open(data_dir: &Path, fallback_shard_count: u32) -> Self {
        let probe = Layout::new(data_dir, fallback_shard_count);
        let shard_count = match FormatManifest::load(&probe) {
            Ok(Some(manifest)) => manifest.shard_count,
            Ok(None) => fallback_shard_count,
            Err(e) => {
                warn!("Ignoring unreadable format manifest: {}", e);
                fallback_shard_count
            }
        };
        let layout = Layout::new(data_dir, shard_count);

        let path = layout.char3grams_path();
        let char3grams = match store::read_merged::<CharTrigrams>(&path) {
            Ok(Some(table)) => table,
            Ok(None) => {
                warn!("No character trigrams at {}", path.display());
                CharTrigrams::new()
            }
            Err(e) => {
                warn!("Cannot load character trigrams: {}", e);
                CharTrigrams::new()
            }
        };
        debug!(
            "Loaded {} character trigrams ({} occurrences)",
            char3grams.len(),
            char3grams.total()
        );

        Self::with_char3grams(layout, char3grams)
    }

    /// Build an engine around an already loaded character trigram table.
    pub fn with_char3grams(layout: Layout, char3grams: CharTrigrams) -> Self {
        Self { layout, char3grams }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Look up a character trigram exactly, or every trigram matching a regex.
    pub fn char3grams(
        &self,
        request: &Char3GramsRequest,
        deadline: Option<Instant>,
    ) -> Result<Char3GramsResponse, QueryError> {
        let mut response = Char3GramsResponse {
            request: request.clone(),
            total: self.char3grams.total(),
            matches: Vec::new(),
        };

        if !request.regex {
            let key = request.q.to_lowercase();
            let count = self.char3grams.get(&key);
            response.matches.push(CharNGramMatch { ngram: key, count });
            return Ok(response);
        }

        let re = Regex::new(&request.q).map_err(|e| QueryError::InvalidRegex {
            pattern: request.q.clone(),
            message: e.to_string(),
        })?;

        for (i, (ngram, count)) in self.char3grams.iter().enumerate() {
            if i % DEADLINE_CHECK_INTERVAL == 0 {
                check_deadline(deadline)?;
            }
            if re.is_match(ngram) {
                response.matches.push(CharNGramMatch {
                    ngram: ngram.to_string(),
                    count,
                });
            }
        }
        Ok(response)
    }

    /// Descend the token trigram tree as far as the request allows.
    pub fn trigrams(
        &self,
        request: &TrigramsRequest,
        deadline: Option<Instant>,
    ) -> Result<TrigramsResponse, QueryError> {
        let first = request.first.trim().to_lowercase();
        let second = request.second.trim().to_lowercase();
        let third = request.third.trim().to_lowercase();

        let empty = if second.is_empty() {
            TrigramMatches::Seconds(BTreeMap::new())
        } else if third.is_empty() {
            TrigramMatches::Thirds(BTreeMap::new())
        } else {
            TrigramMatches::Count(0)
        };

        let mut response = TrigramsResponse {
            request: request.clone(),
            total: self.grand_total(),
            matches: empty,
        };
        if first.is_empty() {
            return Ok(response);
        }

        let Some(shard) = self.load_shard(&first, deadline)? else {
            return Ok(response);
        };

        response.matches = if second.is_empty() {
            TrigramMatches::Seconds(
                shard
                    .get_first(&first)
                    .map(|seconds| {
                        seconds
                            .iter()
                            .map(|(s, thirds)| (s.clone(), to_btree(thirds)))
                            .collect()
                    })
                    .unwrap_or_default(),
            )
        } else if third.is_empty() {
            TrigramMatches::Thirds(
                shard
                    .get_second(&first, &second)
                    .map(to_btree)
                    .unwrap_or_default(),
            )
        } else {
            TrigramMatches::Count(shard.get(&first, &second, &third))
        };
        Ok(response)
    }

    /// Grand total from the total file, zero if it is missing or unreadable.
    pub fn grand_total(&self) -> u64 {
        match store::read_total(&self.layout.total_path()) {
            Ok(Some(total)) => total,
            Ok(None) => 0,
            Err(e) => {
                warn!("Cannot read grand total: {}", e);
                0
            }
        }
    }

    /// Merge the shard holding `first`. Unreadable shards are logged and read
    /// as absent; only a passed deadline is reported.
    fn load_shard(
        &self,
        first: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Trigrams>, QueryError> {
        let path = self.layout.shard_path(self.layout.shard_of(first));
        let records = match store::open_records::<Trigrams>(&path) {
            Ok(Some(records)) => records,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Cannot open shard {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        let mut merged = Trigrams::new();
        for record in records {
            check_deadline(deadline)?;
            match record {
                Ok(t) => merged.append(t),
                Err(e) => {
                    warn!("Corrupt shard {}: {}", path.display(), e);
                    return Ok(None);
                }
            }
        }
        Ok(Some(merged))
    }
}

fn to_btree(map: &hashbrown::HashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|(k, &v)| (k.clone(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn engine_with(dir: &Path, texts: &[&str]) -> QueryEngine {
        let mut table = CharTrigrams::new();
        for t in texts {
            table.add(t);
        }
        QueryEngine::with_char3grams(Layout::new(dir, 128), table)
    }

    fn char_request(q: &str, regex: bool) -> Char3GramsRequest {
        Char3GramsRequest {
            q: q.to_string(),
            regex,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_exact_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), &["banana", "bandana"]);

        let resp = engine.char3grams(&char_request("ana", false), None).unwrap();
        assert_eq!(resp.total, 9);
        assert_eq!(
            resp.matches,
            vec![CharNGramMatch {
                ngram: "ana".to_string(),
                count: 3
            }]
        );

        let resp = engine.char3grams(&char_request("xyz", false), None).unwrap();
        assert_eq!(resp.matches[0].count, 0);
    }

    #[test]
    fn test_regex_lookup_returns_matching_set() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), &["banana", "bandana"]);

        let resp = engine.char3grams(&char_request("^an", true), None).unwrap();
        let got: HashSet<(String, u64)> = resp
            .matches
            .into_iter()
            .map(|m| (m.ngram, m.count))
            .collect();
        let want: HashSet<(String, u64)> = [("ana".to_string(), 3), ("and".to_string(), 1)]
            .into_iter()
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_invalid_regex_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), &["banana"]);

        let err = engine.char3grams(&char_request("(", true), None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRegex { pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_expired_deadline_stops_scan() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), &["banana"]);
        let past = Instant::now() - Duration::from_millis(1);

        let err = engine
            .char3grams(&char_request(".", true), Some(past))
            .unwrap_err();
        assert_eq!(err, QueryError::DeadlineExceeded);
    }

    #[test]
    fn test_empty_first_returns_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        store::write_total(&dir.path().join("total.bin"), 7).unwrap();
        let engine = engine_with(dir.path(), &[]);

        let resp = engine
            .trigrams(&TrigramsRequest::default(), None)
            .unwrap();
        assert!(resp.matches.is_empty());
        assert!(matches!(resp.matches, TrigramMatches::Seconds(_)));
        assert_eq!(resp.total, 7);
    }

    #[test]
    fn test_missing_data_dir_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QueryEngine::open(&dir.path().join("absent"), 128);

        let resp = engine
            .char3grams(&char_request("abc", false), None)
            .unwrap();
        assert_eq!(resp.total, 0);

        let resp = engine
            .trigrams(
                &TrigramsRequest {
                    first: "dog".to_string(),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(resp.total, 0);
        assert!(resp.matches.is_empty());
    }
}
