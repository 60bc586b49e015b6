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

//! In-memory bounded key/value store with LRU eviction.
//!
//! The store is NOT thread-safe; callers that share it across threads must
//! serialize access externally (the server wraps it in a mutex).

mod storage;
mod store;

pub use storage::Storage;
pub use store::{CacheConfig, LruStore};
