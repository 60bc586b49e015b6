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

//! Blocking TCP front end speaking the memcached text protocol.
//!
//! One acceptor thread, one detached worker thread per accepted connection
//! (bounded), a fixed receive buffer per connection. Requests on a single
//! connection are processed strictly in order; no ordering exists across
//! connections.

mod command;
mod conn;
mod protocol;
mod server;

pub use command::{Command, StoreOp};
pub use protocol::Parser;
pub use server::{Server, ServerConfig};
