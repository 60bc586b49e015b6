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

use std::num::NonZeroUsize;

/// Stable handle into an [`Arena`].
///
/// Stored with a +1 offset so that `Option<NodeId>` has the same size as
/// `NodeId` and can serve as an intrusive link field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(NonZeroUsize);

impl NodeId {
    fn new(index: usize) -> Self {
        // `index + 1` cannot be zero.
        unsafe { Self(NonZeroUsize::new_unchecked(index + 1)) }
    }

    pub fn index(&self) -> usize {
        self.0.get() - 1
    }
}

/// Slot arena with stable handles and a vacant-chain free list.
///
/// Handles stay valid until the value they refer to is removed; slots are
/// reused in LIFO order afterwards.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    len: usize,
    next: usize,
}

#[derive(Debug)]
enum Slot<T> {
    Vacant(usize),
    Occupied(T),
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
            next: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            len: 0,
            next: 0,
        }
    }

    pub fn insert(&mut self, val: T) -> NodeId {
        let index = self.next;
        self.len += 1;

        if index == self.slots.len() {
            self.slots.push(Slot::Occupied(val));
            self.next = index + 1;
        } else {
            self.next = match self.slots.get(index) {
                Some(&Slot::Vacant(next)) => next,
                _ => unreachable!("free list points at an occupied slot"),
            };
            self.slots[index] = Slot::Occupied(val);
        }

        NodeId::new(index)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let index = id.index();
        let slot = self.slots.get_mut(index)?;

        if matches!(slot, Slot::Vacant(_)) {
            return None;
        }

        let slot = std::mem::replace(slot, Slot::Vacant(self.next));
        match slot {
            Slot::Vacant(_) => unreachable!(),
            Slot::Occupied(val) => {
                self.len -= 1;
                self.next = index;
                Some(val)
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(val)) => Some(val),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied(val)) => Some(val),
            _ => None,
        }
    }

    /// Iterate occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(val) => Some((NodeId::new(index), val)),
            Slot::Vacant(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
