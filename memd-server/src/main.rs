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

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use bytesize::MIB;
use clap::Parser;
use memd_memory::{CacheConfig, LruStore};
use memd_server::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(short, long, default_value_t = 11211)]
    port: u16,

    /// Cache capacity. (MiB)
    #[arg(short, long, default_value_t = 64)]
    mem: usize,

    /// Maximum concurrent client connections.
    #[arg(long, default_value_t = 64)]
    max_connections: usize,

    /// Per-connection receive timeout. (s)
    #[arg(long, default_value_t = 5)]
    read_timeout: u64,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> memd_common::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let store = LruStore::new(CacheConfig {
        capacity: args.mem * MIB as usize,
    });
    let mut server = Server::new(
        ServerConfig {
            port: args.port,
            max_workers: args.max_connections,
            read_timeout: Duration::from_secs(args.read_timeout),
        },
        store,
    );

    install_signal_handlers();

    server.start()?;
    tracing::info!(
        "[memd]: listening on port {}, capacity {} MiB, up to {} connections",
        args.port,
        args.mem,
        args.max_connections
    );

    while !SHUTDOWN.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("[memd]: shutdown signal received");
    server.stop();
    server.join();
    tracing::info!("[memd]: bye");

    Ok(())
}
