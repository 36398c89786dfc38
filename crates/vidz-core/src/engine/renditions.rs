//! Cache of pitch-corrected renditions
//!
//! Entries are immutable once published and shared as `Arc`s: a deck playing
//! a rendition holds a clone, the cache holds the other. An entry with no
//! deck reference can be reclaimed once a clip has more than
//! `retention_per_clip` renditions; its file is deleted.
//!
//! Renders left behind by earlier runs are not known to the cache, so the
//! engine sweeps them out of the rendition directory on startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::timestretch::is_rendition_file_name;
use crate::types::ClipId;

/// A published pitch-corrected rendition
#[derive(Debug, PartialEq)]
pub struct AudioRendition {
    /// Unique rendition ID
    pub id: u64,
    pub clip: ClipId,
    /// Playback ratio the rendition was rendered for
    pub ratio: f64,
    /// Generation of the request that produced it
    pub generation: u64,
    pub path: PathBuf,
}

impl AudioRendition {
    pub fn matches_ratio(&self, ratio: f64) -> bool {
        ratio_key(self.ratio) == ratio_key(ratio)
    }
}

/// Ratios are compared at 1e-4 resolution
fn ratio_key(ratio: f64) -> i64 {
    (ratio * 10_000.0).round() as i64
}

#[derive(Debug)]
pub struct RenditionCache {
    entries: HashMap<ClipId, Vec<Arc<AudioRendition>>>,
    retention_per_clip: usize,
    next_id: u64,
}

impl RenditionCache {
    pub fn new(retention_per_clip: usize) -> Self {
        Self {
            entries: HashMap::new(),
            retention_per_clip,
            next_id: 1,
        }
    }

    /// Publish a finished render
    ///
    /// If the clip already has a rendition at this ratio the existing entry is
    /// returned and the duplicate file is removed.
    pub fn publish(
        &mut self,
        clip: ClipId,
        ratio: f64,
        generation: u64,
        path: PathBuf,
    ) -> Arc<AudioRendition> {
        if let Some(existing) = self.lookup(clip, ratio) {
            if existing.path != path {
                remove_file(&path);
            }
            return existing;
        }

        let rendition = Arc::new(AudioRendition {
            id: self.next_id,
            clip,
            ratio,
            generation,
            path,
        });
        self.next_id += 1;
        self.entries.entry(clip).or_default().push(rendition.clone());
        rendition
    }

    pub fn lookup(&self, clip: ClipId, ratio: f64) -> Option<Arc<AudioRendition>> {
        self.entries
            .get(&clip)?
            .iter()
            .find(|r| r.matches_ratio(ratio))
            .cloned()
    }

    /// Number of cached renditions for a clip
    pub fn len(&self, clip: ClipId) -> usize {
        self.entries.get(&clip).map(Vec::len).unwrap_or(0)
    }

    /// Drop unreferenced renditions of `clip` beyond the retention cap, oldest first
    pub fn reclaim(&mut self, clip: ClipId) -> usize {
        let Some(list) = self.entries.get_mut(&clip) else {
            return 0;
        };
        let mut excess = list.len().saturating_sub(self.retention_per_clip);
        let mut removed = 0;
        list.retain(|r| {
            if excess > 0 && Arc::strong_count(r) == 1 {
                excess -= 1;
                removed += 1;
                log::debug!("[RENDITIONS] Reclaiming {:?} ({:.3}x)", r.path, r.ratio);
                remove_file(&r.path);
                false
            } else {
                true
            }
        });
        if list.is_empty() {
            self.entries.remove(&clip);
        }
        removed
    }

    /// Reclaim across every clip
    pub fn reclaim_all(&mut self) -> usize {
        let clips: Vec<ClipId> = self.entries.keys().copied().collect();
        clips.into_iter().map(|c| self.reclaim(c)).sum()
    }
}

/// Delete every rendition file in `dir`. Other files are left alone.
pub fn sweep_rendition_dir(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[RENDITIONS] Cannot sweep {:?}: {}", dir, e);
            }
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_rendition = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_rendition_file_name);
        if is_rendition && path.is_file() {
            remove_file(&path);
            removed += 1;
        }
    }
    removed
}

fn remove_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("[RENDITIONS] Failed to delete {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"wav").unwrap();
        path
    }

    #[test]
    fn test_publish_and_lookup() {
        let mut cache = RenditionCache::new(4);
        let r = cache.publish(ClipId(0), 1.2, 3, PathBuf::from("/tmp/none_1.wav"));
        assert_eq!(r.generation, 3);
        assert!(cache.lookup(ClipId(0), 1.20001).is_some());
        assert!(cache.lookup(ClipId(0), 1.25).is_none());
        assert!(cache.lookup(ClipId(1), 1.2).is_none());
    }

    #[test]
    fn test_duplicate_ratio_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = RenditionCache::new(4);
        let first = cache.publish(ClipId(0), 1.2, 1, touch(dir.path(), "a.wav"));
        let dup_path = touch(dir.path(), "b.wav");
        let second = cache.publish(ClipId(0), 1.2, 2, dup_path.clone());
        assert_eq!(first.id, second.id);
        assert!(!dup_path.exists());
        assert_eq!(cache.len(ClipId(0)), 1);
    }

    #[test]
    fn test_reclaim_respects_references_and_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = RenditionCache::new(1);
        let held = cache.publish(ClipId(0), 1.1, 1, touch(dir.path(), "1.wav"));
        let old = cache.publish(ClipId(0), 1.2, 2, touch(dir.path(), "2.wav"));
        let old_path = old.path.clone();
        drop(old);
        cache.publish(ClipId(0), 1.3, 3, touch(dir.path(), "3.wav"));

        // Three entries, cap 1: the held one survives, the oldest free one goes
        assert_eq!(cache.reclaim(ClipId(0)), 2);
        assert_eq!(cache.len(ClipId(0)), 1);
        assert!(!old_path.exists());
        assert!(cache.lookup(ClipId(0), 1.1).is_some());
        assert!(held.path.exists());

        drop(held);
        assert_eq!(cache.reclaim(ClipId(0)), 0);
        assert_eq!(cache.len(ClipId(0)), 1);
    }

    #[test]
    fn test_sweep_removes_only_renditions() {
        let dir = tempfile::tempdir().unwrap();
        let stale = touch(dir.path(), "loop_st_1.200_g3.wav");
        let stale_too = touch(dir.path(), "other_st_0.833_g12.wav");
        let base = touch(dir.path(), "loop_0badc0de_base.wav");
        let unrelated = touch(dir.path(), "notes.wav");

        assert_eq!(sweep_rendition_dir(dir.path()), 2);
        assert!(!stale.exists());
        assert!(!stale_too.exists());
        assert!(base.exists());
        assert!(unrelated.exists());

        assert_eq!(sweep_rendition_dir(&dir.path().join("missing")), 0);
    }
}
