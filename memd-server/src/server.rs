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
    io::Write,
    net::{SocketAddr, TcpListener, TcpStream},
    os::fd::{AsRawFd, FromRawFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use memd_common::error::{Error, ErrorKind, Result};
use memd_memory::Storage;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::conn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port to listen on. Port 0 binds an ephemeral port.
    pub port: u16,
    /// Maximum concurrent per-connection worker threads.
    pub max_workers: usize,
    /// Receive timeout on client sockets. An elapsed timeout disconnects.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 11211,
            max_workers: 64,
            read_timeout: Duration::from_secs(5),
        }
    }
}

const BACKLOG: libc::c_int = 5;

/// Tracks live per-connection workers so `stop` can drain them.
struct WorkerGate {
    workers: Mutex<usize>,
    all_done: Condvar,
}

/// Thread-per-connection TCP server.
///
/// The storage is shared across connection workers under a mutex; the store
/// itself is not thread-safe.
pub struct Server<S>
where
    S: Storage + Send + 'static,
{
    config: ServerConfig,
    storage: Arc<Mutex<S>>,
    running: Arc<AtomicBool>,
    gate: Arc<WorkerGate>,
    listener: Option<TcpListener>,
    acceptor: Option<JoinHandle<()>>,
}

impl<S> Server<S>
where
    S: Storage + Send + 'static,
{
    pub fn new(config: ServerConfig, storage: S) -> Self {
        Self {
            config,
            storage: Arc::new(Mutex::new(storage)),
            running: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(WorkerGate {
                workers: Mutex::new(0),
                all_done: Condvar::new(),
            }),
            listener: None,
            acceptor: None,
        }
    }

    /// Bind the listening socket and spawn the acceptor thread.
    pub fn start(&mut self) -> Result<()> {
        if self.acceptor.is_some() {
            return Err(Error::new(ErrorKind::Config, "server already started"));
        }
        tracing::info!("[server]: start blocking network service");

        let listener = listen(self.config.port, BACKLOG)?;
        let acceptor_listener = listener
            .try_clone()
            .map_err(|e| Error::new(ErrorKind::Io, "failed to clone listener").with_source(e))?;

        self.running.store(true, Ordering::Release);

        let running = Arc::clone(&self.running);
        let gate = Arc::clone(&self.gate);
        let storage = Arc::clone(&self.storage);
        let max_workers = self.config.max_workers;
        let read_timeout = self.config.read_timeout;

        let acceptor = std::thread::Builder::new()
            .name("memd-acceptor".to_string())
            .spawn(move || {
                accept_loop(
                    acceptor_listener,
                    running,
                    gate,
                    storage,
                    max_workers,
                    read_timeout,
                );
            })
            .map_err(|e| Error::new(ErrorKind::Io, "failed to spawn acceptor").with_source(e))?;

        self.listener = Some(listener);
        self.acceptor = Some(acceptor);
        Ok(())
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Stop accepting work: flip the running flag, wait for in-flight
    /// connection workers to drain, then shut the listening socket down to
    /// unblock a pending `accept`.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("[server]: stopping");

        {
            let mut workers = self.gate.workers.lock();
            while *workers > 0 {
                self.gate.all_done.wait(&mut workers);
            }
        }

        if let Some(listener) = &self.listener {
            // Flipping the flag alone does not unblock accept().
            unsafe {
                libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR);
            }
        }
    }

    /// Join the acceptor thread and release the listening socket.
    pub fn join(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        self.listener = None;
    }
}

impl<S> Drop for Server<S>
where
    S: Storage + Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn accept_loop<S>(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    gate: Arc<WorkerGate>,
    storage: Arc<Mutex<S>>,
    max_workers: usize,
    read_timeout: Duration,
) where
    S: Storage + Send + 'static,
{
    while running.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(err) => {
                if running.load(Ordering::Acquire) {
                    tracing::debug!("[server]: accept failed: {err}");
                }
                continue;
            }
        };
        if !running.load(Ordering::Acquire) {
            break;
        }

        tracing::debug!("[server]: accepted connection from {peer}");

        if let Err(err) = stream.set_read_timeout(Some(read_timeout)) {
            tracing::error!("[server]: failed to set read timeout: {err}");
            continue;
        }

        // The counter moves before the spawn so a concurrent stop() cannot
        // observe zero workers while this connection is starting up.
        let mut workers = gate.workers.lock();
        if *workers == max_workers {
            reject(stream, peer);
            continue;
        }
        *workers += 1;

        let running = Arc::clone(&running);
        let gate_worker = Arc::clone(&gate);
        let storage = Arc::clone(&storage);
        let spawned = std::thread::Builder::new()
            .name("memd-conn".to_string())
            .spawn(move || {
                if let Err(err) = conn::serve(stream, &storage, &running) {
                    tracing::debug!("[server]: connection from {peer} closed: {err}");
                }
                let mut workers = gate_worker.workers.lock();
                *workers -= 1;
                gate_worker.all_done.notify_one();
            });
        if let Err(err) = spawned {
            *workers -= 1;
            tracing::error!("[server]: failed to spawn connection worker: {err}");
        }
    }

    tracing::warn!("[server]: network stopped");
}

fn reject(mut stream: TcpStream, peer: SocketAddr) {
    tracing::warn!("[server]: connection limit exceeded, rejecting {peer}");
    if let Err(err) = stream.write_all(b"Connection limit exceeded\r\n") {
        tracing::error!("[server]: failed to write response to client: {err}");
    }
}

/// Create an IPv4 listening socket with `SO_REUSEADDR`, bound to
/// `INADDR_ANY:port`.
fn listen(port: u16, backlog: libc::c_int) -> Result<TcpListener> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP);
        if fd < 0 {
            return Err(os_error("failed to open socket"));
        }

        let opt: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) != 0
        {
            let err = os_error("socket setsockopt() failed");
            libc::close(fd);
            return Err(err);
        }

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_port = port.to_be();
        addr.sin_addr.s_addr = libc::INADDR_ANY;

        if libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ) != 0
        {
            let err = os_error("socket bind() failed");
            libc::close(fd);
            return Err(err);
        }

        if libc::listen(fd, backlog) != 0 {
            let err = os_error("socket listen() failed");
            libc::close(fd);
            return Err(err);
        }

        Ok(TcpListener::from_raw_fd(fd))
    }
}

fn os_error(message: &str) -> Error {
    Error::new(ErrorKind::Io, message).with_source(std::io::Error::last_os_error())
}
