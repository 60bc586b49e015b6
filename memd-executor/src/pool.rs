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
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Workers kept alive while the pool is running.
    pub low_watermark: usize,
    /// Upper bound on concurrently live workers.
    pub high_watermark: usize,
    /// Upper bound on queued, not-yet-running tasks.
    pub max_queue_size: usize,
    /// How long a worker above the low watermark waits for work before it
    /// exits.
    pub idle_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            low_watermark: 2,
            high_watermark: 8,
            max_queue_size: 64,
            idle_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Stopped,
}

struct Shared {
    state: State,
    tasks: VecDeque<Task>,
    live_workers: usize,
    free_workers: usize,
}

struct Inner {
    shared: Mutex<Shared>,
    /// Awaits new tasks in idle workers.
    task_available: Condvar,
    /// Awaits `live_workers` reaching zero in `stop`.
    workers_done: Condvar,
    config: WorkerPoolConfig,
}

/// Thread pool with watermark sizing and graceful drain-on-stop.
///
/// Tasks are executed in FIFO order overall; interleaving across workers is
/// arbitrary. A task failure never poisons the pool.
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// # Panics
    ///
    /// Panics if the watermarks are inverted or the high watermark is zero.
    pub fn new(config: WorkerPoolConfig) -> Self {
        assert!(
            1 <= config.low_watermark && config.low_watermark <= config.high_watermark,
            "watermarks must satisfy 1 <= low <= high, given: low={} high={}",
            config.low_watermark,
            config.high_watermark,
        );

        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: State::Stopped,
                    tasks: VecDeque::new(),
                    live_workers: 0,
                    free_workers: 0,
                }),
                task_available: Condvar::new(),
                workers_done: Condvar::new(),
                config,
            }),
        }
    }

    /// Spawn the low-watermark workers and start accepting tasks.
    ///
    /// A no-op unless the pool is stopped.
    pub fn start(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.state != State::Stopped {
            return;
        }

        shared.state = State::Running;
        for _ in 0..self.inner.config.low_watermark {
            shared.live_workers += 1;
            shared.free_workers += 1;
            if let Err(err) = spawn_worker(&self.inner) {
                shared.live_workers -= 1;
                shared.free_workers -= 1;
                tracing::error!("[worker pool]: failed to spawn worker: {err}");
            }
        }
    }

    /// Schedule a task for execution.
    ///
    /// Returns false and drops the task if the pool is not running or the
    /// queue is full. If all live workers are busy and the high watermark is
    /// not reached yet, one extra worker is spawned first.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> bool {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state != State::Running {
                return false;
            }
            if shared.tasks.len() >= self.inner.config.max_queue_size {
                return false;
            }

            if shared.free_workers == 0 && shared.live_workers < self.inner.config.high_watermark {
                shared.live_workers += 1;
                shared.free_workers += 1;
                if let Err(err) = spawn_worker(&self.inner) {
                    shared.live_workers -= 1;
                    shared.free_workers -= 1;
                    tracing::warn!("[worker pool]: failed to spawn extra worker: {err}");
                    if shared.live_workers == 0 {
                        // Nobody left to service the queue.
                        return false;
                    }
                }
            }

            shared.tasks.push_back(Box::new(task));
        }
        self.inner.task_available.notify_one();
        true
    }

    /// Stop accepting tasks and let the workers drain the queue.
    ///
    /// With `wait` set, blocks until every worker has exited; tasks accepted
    /// before the call are all executed first.
    pub fn stop(&self, wait: bool) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state == State::Running {
                shared.state = State::Stopping;
                // Every worker must observe the transition, including the
                // immortal ones parked without a deadline.
                self.inner.task_available.notify_all();
            }
        }

        if wait {
            let mut shared = self.inner.shared.lock();
            while shared.live_workers > 0 {
                self.inner.workers_done.wait(&mut shared);
            }
            if shared.state == State::Stopping {
                shared.state = State::Stopped;
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn spawn_worker(inner: &Arc<Inner>) -> std::io::Result<()> {
    let inner = Arc::clone(inner);
    std::thread::Builder::new()
        .name("memd-worker".to_string())
        .spawn(move || run(inner))
        .map(|_| ())
}

/// Worker loop. Runs detached; the pool tracks it only through the counters.
fn run(inner: Arc<Inner>) {
    let config = &inner.config;
    let mut shared = inner.shared.lock();

    loop {
        if let Some(task) = shared.tasks.pop_front() {
            shared.free_workers -= 1;
            MutexGuard::unlocked(&mut shared, || {
                if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!("[worker pool]: task panicked, worker continues");
                }
            });
            shared.free_workers += 1;
            continue;
        }

        match shared.state {
            State::Running => {
                let deadline = Instant::now() + config.idle_timeout;
                let mut timed_out = false;
                while shared.tasks.is_empty() && shared.state == State::Running {
                    if inner
                        .task_available
                        .wait_until(&mut shared, deadline)
                        .timed_out()
                    {
                        timed_out = true;
                        break;
                    }
                }

                if timed_out && shared.tasks.is_empty() && shared.state == State::Running {
                    if shared.live_workers > config.low_watermark {
                        // Idle above the low watermark: this worker is
                        // expendable.
                        break;
                    }
                    // A low-watermark worker waits without a deadline.
                    while shared.tasks.is_empty() && shared.state == State::Running {
                        inner.task_available.wait(&mut shared);
                    }
                }
            }
            State::Stopping => {
                if shared.tasks.is_empty() {
                    break;
                }
                // Loop back and drain the remaining tasks.
            }
            State::Stopped => break,
        }
    }

    // Exit path. The worker is idle here, so it is counted in both.
    shared.free_workers -= 1;
    shared.live_workers -= 1;
    if shared.state != State::Running {
        if shared.live_workers == 0 {
            shared.state = State::Stopped;
            inner.workers_done.notify_all();
        }
        // Propagate the shutdown wake to the next sleeping peer.
        inner.task_available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Barrier,
        },
        thread,
    };

    use crossbeam::channel;

    use super::*;

    fn config(low: usize, high: usize, queue: usize, idle_ms: u64) -> WorkerPoolConfig {
        WorkerPoolConfig {
            low_watermark: low,
            high_watermark: high,
            max_queue_size: queue,
            idle_timeout: Duration::from_millis(idle_ms),
        }
    }

    fn live_workers(pool: &WorkerPool) -> usize {
        pool.inner.shared.lock().live_workers
    }

    #[test]
    fn test_start_spawns_low_watermark_workers() {
        let pool = WorkerPool::new(config(2, 4, 10, 1000));
        pool.start();
        assert_eq!(live_workers(&pool), 2);
        pool.stop(true);
        assert_eq!(live_workers(&pool), 0);
    }

    #[test]
    fn test_execute_rejected_unless_running() {
        let pool = WorkerPool::new(config(1, 2, 10, 1000));
        assert!(!pool.execute(|| {}));

        pool.start();
        assert!(pool.execute(|| {}));

        pool.stop(true);
        assert!(!pool.execute(|| {}));
    }

    #[test]
    fn test_queue_backpressure() {
        let pool = WorkerPool::new(config(1, 1, 2, 1000));
        pool.start();

        let gate = Arc::new(Barrier::new(2));
        {
            let gate = Arc::clone(&gate);
            assert!(pool.execute(move || {
                gate.wait();
            }));
        }
        // Give the single worker time to pick the blocking task up.
        thread::sleep(Duration::from_millis(100));

        assert!(pool.execute(|| {}));
        assert!(pool.execute(|| {}));
        // Queue is at capacity now.
        assert!(!pool.execute(|| {}));

        gate.wait();
        pool.stop(true);
    }

    #[test]
    fn test_grows_to_high_watermark_and_reaps_idle_workers() {
        let pool = WorkerPool::new(config(2, 4, 10, 100));
        pool.start();

        // Four concurrently-blocking tasks force the pool to its high
        // watermark. Wait for each task to start so the next submission
        // observes all live workers busy.
        let gate = Arc::new(Barrier::new(5));
        let started = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let gate = Arc::clone(&gate);
            let started_clone = Arc::clone(&started);
            assert!(pool.execute(move || {
                started_clone.fetch_add(1, Ordering::SeqCst);
                gate.wait();
            }));
            while started.load(Ordering::SeqCst) < i + 1 {
                thread::sleep(Duration::from_millis(5));
            }
        }

        // A fifth task just sits in the queue while all workers block.
        let done = Arc::new(AtomicUsize::new(0));
        {
            let done = Arc::clone(&done);
            assert!(pool.execute(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(live_workers(&pool), 4);

        gate.wait();

        // The two extra workers exit once they have idled past the timeout.
        let deadline = Instant::now() + Duration::from_secs(5);
        while live_workers(&pool) > 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(live_workers(&pool), 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);

        pool.stop(true);
    }

    #[test]
    fn test_fifo_order() {
        let pool = WorkerPool::new(config(1, 1, 64, 1000));
        pool.start();

        let (tx, rx) = channel::unbounded();
        for i in 0..32 {
            let tx = tx.clone();
            assert!(pool.execute(move || {
                tx.send(i).unwrap();
            }));
        }
        pool.stop(true);

        let order: Vec<i32> = rx.try_iter().collect();
        assert_eq!(order, (0..32).collect::<Vec<_>>());
    }

    #[test_log::test]
    fn test_stop_drains_queue() {
        let pool = WorkerPool::new(config(1, 2, 10, 1000));
        pool.start();

        let counter = Arc::new(AtomicUsize::new(0));
        let mut accepted = 0;
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            if pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);

        pool.stop(true);

        // Every accepted task ran exactly once before the pool emptied.
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(live_workers(&pool), 0);
        assert!(pool.inner.shared.lock().tasks.is_empty());
    }

    #[test]
    fn test_task_panic_does_not_poison_pool() {
        let pool = WorkerPool::new(config(1, 1, 10, 1000));
        pool.start();

        assert!(pool.execute(|| panic!("boom")));

        let (tx, rx) = channel::bounded(1);
        assert!(pool.execute(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.stop(true);
    }

    #[test]
    fn test_restart_after_stop() {
        let pool = WorkerPool::new(config(1, 2, 10, 1000));
        pool.start();
        pool.stop(true);
        assert_eq!(live_workers(&pool), 0);

        pool.start();
        let (tx, rx) = channel::bounded(1);
        assert!(pool.execute(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.stop(true);
    }
}
