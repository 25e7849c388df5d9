//! Named, immutable multichannel sample buffers.
//!
//! Entries are handed out as `Arc<ResourceEntry>` and never change once
//! registered. Replacing or pruning a name moves the old entry onto a retire
//! list; it is freed on the control context once no committed snapshot holds
//! it any more.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::buffer::MAX_CHANNELS;
use crate::error::EngineError;

/// One registered sample buffer, stored planar.
#[derive(Debug)]
pub struct ResourceEntry {
    name: String,
    channels: usize,
    frames: usize,
    data: Box<[f32]>,
    generation: u64,
}

impl ResourceEntry {
    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Registry generation this entry was registered in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Samples of one channel. Out-of-range channels are empty.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        if index >= self.channels {
            return &[];
        }
        let start = index * self.frames;
        &self.data[start..start + self.frames]
    }

    /// All samples, channel regions concatenated.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Registry of named resources.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: HashMap<String, Arc<ResourceEntry>>,
    retired: Vec<Arc<ResourceEntry>>,
    generation: u64,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a resource, taking ownership of `data`.
    ///
    /// `data` must hold `channels * frames` planar samples and `channels`
    /// must not exceed [`MAX_CHANNELS`].
    pub fn register(
        &mut self,
        name: impl Into<String>,
        channels: usize,
        frames: usize,
        data: Vec<f32>,
    ) -> Result<Arc<ResourceEntry>, EngineError> {
        let name = name.into();
        if channels > MAX_CHANNELS {
            return Err(EngineError::capacity("channel count", channels, MAX_CHANNELS));
        }
        let expected = channels.checked_mul(frames).ok_or_else(|| {
            EngineError::capacity("sample count", usize::MAX, isize::MAX as usize)
        })?;
        if data.len() != expected {
            return Err(EngineError::ResourceSize {
                name,
                expected,
                actual: data.len(),
            });
        }

        self.generation += 1;
        let entry = Arc::new(ResourceEntry {
            name: name.clone(),
            channels,
            frames,
            data: data.into_boxed_slice(),
            generation: self.generation,
        });
        debug!(
            "resource_register: '{name}' {channels}ch × {frames} frames (gen {})",
            self.generation
        );
        if let Some(previous) = self.entries.insert(name, Arc::clone(&entry)) {
            self.retired.push(previous);
        }
        Ok(entry)
    }

    /// Looks up a resource by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<ResourceEntry>, EngineError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ResourceNotFound(name.to_string()))
    }

    /// Returns true if a resource is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Current registry generation (increments on every registration).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Removes every resource whose name is not in `referenced`.
    ///
    /// Returns the removed names, sorted.
    pub fn prune(&mut self, referenced: &HashSet<&str>) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .cloned()
            .collect();
        removed.sort_unstable();
        for name in &removed {
            if let Some(entry) = self.entries.remove(name) {
                self.retired.push(entry);
            }
        }
        if !removed.is_empty() {
            debug!("resource_prune: removed {removed:?}");
        }
        removed
    }

    /// Frees retired entries no snapshot references any more.
    ///
    /// Returns how many were freed.
    pub fn reclaim(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|entry| Arc::strong_count(entry) > 1);
        let freed = before - self.retired.len();
        if freed > 0 {
            debug!("resource_retire: freed {freed}, {} still held", self.retired.len());
        }
        freed
    }

    /// Number of retired entries awaiting reclamation.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn register_and_resolve() {
        let mut registry = ResourceRegistry::new();
        registry
            .register("buf", 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let entry = registry.resolve("buf").unwrap();
        assert_eq!(entry.channels(), 2);
        assert_eq!(entry.frames(), 3);
        assert_eq!(entry.channel(1), &[4.0, 5.0, 6.0]);
        assert!(entry.channel(2).is_empty());
    }

    #[test]
    fn too_many_channels_is_capacity_error() {
        let mut registry = ResourceRegistry::new();
        let err = registry.register("wide", 33, 1, vec![0.0; 33]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert!(!registry.contains("wide"));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut registry = ResourceRegistry::new();
        let err = registry.register("buf", 2, 4, vec![0.0; 7]).unwrap_err();
        assert_eq!(
            err,
            EngineError::ResourceSize {
                name: "buf".into(),
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn missing_resource_is_reference_error() {
        let registry = ResourceRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Reference);
    }

    #[test]
    fn replacement_keeps_old_handle_intact() {
        let mut registry = ResourceRegistry::new();
        registry.register("buf", 1, 2, vec![1.0, 1.0]).unwrap();
        let held = registry.resolve("buf").unwrap();
        registry.register("buf", 1, 2, vec![2.0, 2.0]).unwrap();

        assert_eq!(held.data(), &[1.0, 1.0]);
        assert_eq!(registry.resolve("buf").unwrap().data(), &[2.0, 2.0]);
        assert_eq!(registry.reclaim(), 0, "old entry still held");
        drop(held);
        assert_eq!(registry.reclaim(), 1);
        assert_eq!(registry.retired_len(), 0);
    }

    #[test]
    fn prune_keeps_referenced() {
        let mut registry = ResourceRegistry::new();
        registry.register("a", 1, 1, vec![0.0]).unwrap();
        registry.register("b", 1, 1, vec![0.0]).unwrap();
        registry.register("c", 1, 1, vec![0.0]).unwrap();
        let referenced: HashSet<&str> = ["b"].into_iter().collect();
        assert_eq!(registry.prune(&referenced), vec!["a", "c"]);
        assert_eq!(registry.names(), vec!["b"]);
    }
}
