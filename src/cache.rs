// 🗃️ Extract Cache - explicit memo of cleaned extracts by content fingerprint
//
// Key: extract path. Entry: the cleaned snapshot plus the fingerprint it was
// built from. Invalidation rule: every lookup re-reads and re-hashes the
// bytes; a different fingerprint (content or settings changed) rebuilds the
// entry. `invalidate` and `clear` drop entries explicitly.

use crate::error::{PipelineError, Result};
use crate::loader::LoadOptions;
use crate::pipeline::{CleanedExtract, Pipeline};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// SHA-256 over the bytes and everything that changes how they are read
pub fn fingerprint(bytes: &[u8], options: LoadOptions, settings: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update([0u8, options.delimiter]);
    hasher.update(options.encoding.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(settings.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
pub struct ExtractCache {
    entries: HashMap<PathBuf, Arc<CleanedExtract>>,
    stats: CacheStats,
}

impl ExtractCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleaned snapshot for `path`, rebuilt if the content fingerprint moved
    pub fn get_or_load(
        &mut self,
        pipeline: &Pipeline,
        path: &Path,
        options: LoadOptions,
    ) -> Result<Arc<CleanedExtract>> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::SourceUnreadable {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let fp = fingerprint(&bytes, options, &pipeline.settings_key());

        if let Some(entry) = self.entries.get(path) {
            if entry.fingerprint == fp {
                self.stats.hits += 1;
                tracing::debug!(path = %path.display(), "extract cache hit");
                return Ok(Arc::clone(entry));
            }
            self.stats.invalidations += 1;
            tracing::info!(
                path = %path.display(),
                old = %short(&entry.fingerprint),
                new = %short(&fp),
                "extract changed, rebuilding"
            );
        }

        self.stats.misses += 1;
        let source = crate::loader::ExtractSource::from_bytes(path.display().to_string(), &bytes, options)?;
        let cleaned = Arc::new(pipeline.run(&source, fp)?);
        self.entries.insert(path.to_path_buf(), Arc::clone(&cleaned));
        Ok(cleaned)
    }

    /// Drop the entry for one path; true if there was one
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let removed = self.entries.remove(path).is_some();
        if removed {
            self.stats.invalidations += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

fn short(fp: &str) -> &str {
    &fp[..fp.len().min(12)]
}
