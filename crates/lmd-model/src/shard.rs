//! Data directory layout and token-trigram sharding.
//!
//! Token trigrams are partitioned by the 32-bit FNV-1a hash of their lowercased
//! first token, modulo the shard count. Changing either the hash function or the
//! shard count reassigns first tokens to different files, so both are recorded
//! in `format.json` and checked before any update touches existing shards.

use lmd_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version of the on-disk layout described in this module.
pub const FORMAT_VERSION: u32 = 1;

/// Name of the hash function used to pick shards.
pub const HASH_FUNCTION: &str = "fnv1a-32";

pub const CHAR3GRAMS_FILE: &str = "char3grams.bin";
pub const TOTAL_FILE: &str = "total.bin";
pub const MANIFEST_FILE: &str = "format.json";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ b as u32).wrapping_mul(FNV_PRIME)
    })
}

/// Shard index of a first token: `fnv1a32(lowercase(token)) mod shard_count`.
pub fn shard_of(token: &str, shard_count: u32) -> u32 {
    fnv1a32(token.to_lowercase().as_bytes()) % shard_count.max(1)
}

/// File name of a shard, e.g. `0aNgrams.bin`.
///
/// The index is lowercase hex, zero padded to the width of the largest index
/// (at least two digits).
pub fn shard_file_name(shard: u32, shard_count: u32) -> String {
    let largest = shard_count.saturating_sub(1);
    let digits = ((32 - largest.leading_zeros() + 3) / 4).max(2) as usize;
    format!("{shard:0digits$x}Ngrams.bin")
}

/// Paths of every persisted file in a data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    dir: PathBuf,
    shard_count: u32,
}

impl Layout {
    pub fn new(dir: impl Into<PathBuf>, shard_count: u32) -> Self {
        Self {
            dir: dir.into(),
            shard_count: shard_count.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn char3grams_path(&self) -> PathBuf {
        self.dir.join(CHAR3GRAMS_FILE)
    }

    pub fn total_path(&self) -> PathBuf {
        self.dir.join(TOTAL_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn shard_of(&self, first: &str) -> u32 {
        shard_of(first, self.shard_count)
    }

    pub fn shard_path(&self, shard: u32) -> PathBuf {
        self.dir.join(shard_file_name(shard, self.shard_count))
    }

    /// Every shard file currently present on disk.
    pub fn existing_shards(&self) -> Vec<(u32, PathBuf)> {
        (0..self.shard_count)
            .map(|h| (h, self.shard_path(h)))
            .filter(|(_, p)| p.exists())
            .collect()
    }
}

/// Compatibility record persisted next to the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatManifest {
    pub version: u32,
    pub hash: String,
    pub shard_count: u32,
}

impl FormatManifest {
    /// Manifest describing data written by this build.
    pub fn current(shard_count: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            hash: HASH_FUNCTION.to_string(),
            shard_count,
        }
    }

    /// Read the manifest, `None` if the directory has none yet.
    pub fn load(layout: &Layout) -> Result<Option<Self>> {
        let path = layout.manifest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!("cannot decode {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    pub fn save(&self, layout: &Layout) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(layout.manifest_path(), content)?;
        Ok(())
    }

    /// Fail unless data described by `self` can be extended by this build
    /// with the given shard count.
    pub fn check_compatible(&self, shard_count: u32) -> Result<()> {
        if self.version != FORMAT_VERSION || self.hash != HASH_FUNCTION {
            return Err(Error::Format(format!(
                "data written with format v{} ({}), this build writes v{} ({})",
                self.version, self.hash, FORMAT_VERSION, HASH_FUNCTION
            )));
        }
        if self.shard_count != shard_count {
            return Err(Error::Format(format!(
                "data is sharded {} ways, configured shard count is {}",
                self.shard_count, shard_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a32_reference_values() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_shard_of_is_stable_and_in_range() {
        for token in ["the", "cat", "über", "", "123", "日本"] {
            let h = shard_of(token, 128);
            assert!(h < 128);
            assert_eq!(h, shard_of(token, 128));
        }
        assert_eq!(shard_of("a", 128), 0xe40c_292c % 128);
    }

    #[test]
    fn test_shard_of_ignores_case() {
        assert_eq!(shard_of("Cat", 128), shard_of("cat", 128));
        assert_eq!(shard_of("ÜBER", 64), shard_of("über", 64));
        // Titlecase letters are not uppercase but still lowercase to another char.
        assert_eq!(
            shard_of("\u{1c5}ungla", 1 << 16),
            shard_of("\u{1c6}ungla", 1 << 16)
        );
    }

    #[test]
    fn test_shard_file_names() {
        assert_eq!(shard_file_name(0, 128), "00Ngrams.bin");
        assert_eq!(shard_file_name(127, 128), "7fNgrams.bin");
        assert_eq!(shard_file_name(5, 1), "05Ngrams.bin");
        assert_eq!(shard_file_name(255, 4096), "0ffNgrams.bin");
        assert_eq!(shard_file_name(4095, 4096), "fffNgrams.bin");
    }

    #[test]
    fn test_manifest_compatibility() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path(), 128);
        assert!(FormatManifest::load(&layout).unwrap().is_none());

        FormatManifest::current(128).save(&layout).unwrap();
        let loaded = FormatManifest::load(&layout).unwrap().unwrap();
        assert_eq!(loaded, FormatManifest::current(128));
        assert!(loaded.check_compatible(128).is_ok());
        assert!(matches!(loaded.check_compatible(64), Err(Error::Format(_))));

        let mut old = loaded;
        old.version = 0;
        assert!(matches!(old.check_compatible(128), Err(Error::Format(_))));
    }
}
