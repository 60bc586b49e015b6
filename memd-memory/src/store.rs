// Copyright 2026 memd Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::hash::BuildHasher;

use hashbrown::{hash_map::DefaultHashBuilder, hash_table::HashTable};
use memd_common::arena::{Arena, NodeId};
use serde::{Deserialize, Serialize};

use crate::Storage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of bytes the store may hold, counted as
    /// `key.len() + value.len()` over all live entries.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

struct Node {
    key: Box<[u8]>,
    value: Vec<u8>,
    /// Towards the head (more recently used).
    prev: Option<NodeId>,
    /// Towards the tail (less recently used).
    next: Option<NodeId>,
}

impl Node {
    fn charge(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// LRU key/value store bounded by total byte usage.
///
/// Entries live in an arena and are linked into a recency list by handle;
/// the index maps key hashes to handles. `head` is the most recently used
/// entry, `tail` the least. An entry larger than the capacity on its own is
/// never admitted.
pub struct LruStore {
    capacity: usize,
    usage: usize,

    head: Option<NodeId>,
    tail: Option<NodeId>,

    arena: Arena<Node>,
    index: HashTable<NodeId>,
    hash_builder: DefaultHashBuilder,
}

impl LruStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            capacity: config.capacity,
            usage: 0,
            head: None,
            tail: None,
            arena: Arena::new(),
            index: HashTable::new(),
            hash_builder: DefaultHashBuilder::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig { capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.arena.get(id) {
            Some(node) => node,
            None => unreachable!("dangling node handle"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.arena.get_mut(id) {
            Some(node) => node,
            None => unreachable!("dangling node handle"),
        }
    }

    fn lookup(&self, hash: u64, key: &[u8]) -> Option<NodeId> {
        let Self { arena, index, .. } = self;
        index
            .find(hash, |&id| {
                arena.get(id).is_some_and(|node| node.key.as_ref() == key)
            })
            .copied()
    }

    /// Detach a node from the recency list, fixing up head/tail.
    fn unlink(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        let prev = node.prev.take();
        let next = node.next.take();

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    /// Link a detached node in front of the current head.
    fn link_front(&mut self, id: NodeId) {
        let old_head = self.head;

        let node = self.node_mut(id);
        debug_assert!(node.prev.is_none() && node.next.is_none());
        node.next = old_head;

        match old_head {
            Some(head) => self.node_mut(head).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn promote(&mut self, id: NodeId) {
        if self.head == Some(id) {
            return;
        }
        self.unlink(id);
        self.link_front(id);
    }

    /// Remove an entry entirely: list first, then index, then the node.
    fn remove_node(&mut self, id: NodeId) {
        self.unlink(id);

        let hash = self.hash_builder.hash_one(self.node(id).key.as_ref());
        if let Ok(entry) = self.index.find_entry(hash, |&cand| cand == id) {
            entry.remove();
        } else {
            unreachable!("entry missing from index");
        }

        match self.arena.remove(id) {
            Some(node) => self.usage -= node.charge(),
            None => unreachable!("dangling node handle"),
        }
    }

    /// Evict the least recently used entry, skipping `keep` if given.
    ///
    /// Returns false when no eviction victim exists.
    fn evict_one(&mut self, keep: Option<NodeId>) -> bool {
        let mut cur = self.tail;
        while let Some(id) = cur {
            if Some(id) != keep {
                self.remove_node(id);
                return true;
            }
            cur = self.node(id).prev;
        }
        false
    }

    fn insert_new(&mut self, hash: u64, key: &[u8], value: &[u8]) -> bool {
        let charge = key.len() + value.len();
        if charge > self.capacity {
            return false;
        }

        while self.usage + charge > self.capacity {
            let evicted = self.evict_one(None);
            debug_assert!(evicted);
        }

        let id = self.arena.insert(Node {
            key: key.into(),
            value: value.to_vec(),
            prev: None,
            next: None,
        });
        self.link_front(id);
        self.usage += charge;

        let Self {
            arena,
            index,
            hash_builder,
            ..
        } = self;
        index.insert_unique(hash, id, |&cand| match arena.get(cand) {
            Some(node) => hash_builder.hash_one(node.key.as_ref()),
            None => unreachable!("dangling node handle"),
        });

        true
    }

    /// Replace the value of a live entry, evicting other entries if the new
    /// value no longer fits. The entry being updated is never evicted; if
    /// the pair alone exceeds the capacity the old value stays intact.
    fn replace_value(&mut self, id: NodeId, value: &[u8]) -> bool {
        let (key_len, old_value_len) = {
            let node = self.node(id);
            (node.key.len(), node.value.len())
        };

        let new_charge = key_len + value.len();
        if new_charge > self.capacity {
            return false;
        }

        while self.usage - key_len - old_value_len + new_charge > self.capacity {
            let evicted = self.evict_one(Some(id));
            debug_assert!(evicted);
        }

        self.node_mut(id).value = value.to_vec();
        self.usage = self.usage - old_value_len + value.len();
        self.promote(id);
        true
    }
}

impl Storage for LruStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        let hash = self.hash_builder.hash_one(key);
        match self.lookup(hash, key) {
            Some(id) => self.replace_value(id, value),
            None => self.insert_new(hash, key, value),
        }
    }

    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        let hash = self.hash_builder.hash_one(key);
        match self.lookup(hash, key) {
            Some(_) => false,
            None => self.insert_new(hash, key, value),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        let hash = self.hash_builder.hash_one(key);
        match self.lookup(hash, key) {
            Some(id) => self.replace_value(id, value),
            None => false,
        }
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        let hash = self.hash_builder.hash_one(key);
        match self.lookup(hash, key) {
            Some(id) => {
                self.remove_node(id);
                true
            }
            None => false,
        }
    }

    fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        let hash = self.hash_builder.hash_one(key);
        let id = self.lookup(hash, key)?;
        self.promote(id);
        Some(self.node(id).value.as_slice())
    }
}

#[cfg(test)]
impl LruStore {
    /// Keys in recency order, head (MRU) to tail (LRU).
    fn dump_keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(id) = cur {
            let node = self.node(id);
            keys.push(node.key.to_vec());
            cur = node.next;
        }
        keys
    }

    /// Assert every structural invariant of the store.
    fn check(&self) {
        assert!(self.usage <= self.capacity);

        // Walk the list and verify adjacency both ways.
        let mut walked = 0;
        let mut charge_sum = 0;
        let mut prev: Option<NodeId> = None;
        let mut cur = self.head;
        while let Some(id) = cur {
            let node = self.node(id);
            assert_eq!(node.prev, prev, "prev link broken");
            walked += 1;
            charge_sum += node.charge();
            prev = cur;
            cur = node.next;
        }
        assert_eq!(self.tail, prev, "tail does not terminate the list");

        assert_eq!(walked, self.arena.len());
        assert_eq!(walked, self.index.len());
        assert_eq!(charge_sum, self.usage);

        // Every live node is reachable through the index under its own key.
        for (id, node) in self.arena.iter() {
            let hash = self.hash_builder.hash_one(node.key.as_ref());
            assert_eq!(self.lookup(hash, &node.key), Some(id));
        }
    }
}
