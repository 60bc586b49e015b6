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

/// Behavior surface commands execute against.
///
/// Keys and values are binary-safe byte strings. Running out of capacity is
/// never an error; every operation completes synchronously with a boolean
/// result.
pub trait Storage {
    /// Inserts the pair or replaces the value of an existing key, evicting
    /// the least recently used entries as needed.
    ///
    /// Returns false if `key.len() + value.len()` exceeds the store capacity.
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Inserts the pair only if the key is absent, evicting as needed.
    ///
    /// Returns false if the key is present or the pair is too large. A hit
    /// leaves the recency order untouched.
    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Replaces the value of an existing key and promotes the entry.
    ///
    /// Returns false if the key is absent or the new pair is too large.
    fn set(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Removes a key. Returns true if the key existed and was removed.
    fn delete(&mut self, key: &[u8]) -> bool;

    /// Returns the value for a key and promotes the entry.
    fn get(&mut self, key: &[u8]) -> Option<&[u8]>;
}
