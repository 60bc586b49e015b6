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

//! Dynamically-sized worker pool executing opaque unit-of-work closures.
//!
//! The pool keeps between `low_watermark` and `high_watermark` detached
//! worker threads alive. Workers above the low watermark exit after sitting
//! idle for `idle_timeout`; workers at or below it are immortal while the
//! pool is running. Shutdown is graceful only: every accepted task runs
//! exactly once before the pool reaches zero workers.

mod pool;

pub use pool::{WorkerPool, WorkerPoolConfig};
