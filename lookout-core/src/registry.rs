use crate::notification::WatchDescriptor;
use std::collections::BTreeMap;

/// Maps watch descriptors to the paths they were registered for.
///
/// Pure bookkeeping: nothing here touches the kernel. The bridge is the
/// only writer, and it decides when the notification channel lives or
/// dies by asking whether this table is empty.
#[derive(Debug, Default, Clone)]
pub struct WatchRegistry {
    /// Descriptor to the exact path string passed at registration
    entries: BTreeMap<WatchDescriptor, String>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path under a descriptor, replacing any previous entry.
    ///
    /// The kernel returns the same descriptor when the same inode is
    /// watched twice, so overwriting is the expected behaviour.
    pub fn add(&mut self, descriptor: WatchDescriptor, path: impl Into<String>) {
        self.entries.insert(descriptor, path.into());
    }

    /// Drops the entry for a descriptor, returning its path if there was one.
    pub fn remove(&mut self, descriptor: WatchDescriptor) -> Option<String> {
        self.entries.remove(&descriptor)
    }

    /// Resolves a descriptor to its registered path.
    pub fn lookup(&self, descriptor: WatchDescriptor) -> Option<&str> {
        self.entries.get(&descriptor).map(String::as_str)
    }

    pub fn contains(&self, descriptor: WatchDescriptor) -> bool {
        self.entries.contains_key(&descriptor)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All registered descriptors, in ascending order.
    pub fn descriptors(&self) -> Vec<WatchDescriptor> {
        self.entries.keys().copied().collect()
    }

    /// Iterates `(descriptor, path)` pairs in ascending descriptor order.
    pub fn iter(&self) -> impl Iterator<Item = (WatchDescriptor, &str)> {
        self.entries.iter().map(|(wd, path)| (*wd, path.as_str()))
    }
}
