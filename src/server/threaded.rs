//! Bounded worker-pool accept loop: a fixed number of worker threads drain
//! a job queue fed by the accept loop, which itself rejects new connections
//! with `503 BUSY` once `active_connections` reaches the configured limit
//!. Both wildcard modes and `BATCH` are available here.

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use super::{read_line, ReadOutcome, Shared};
use crate::config::ConfigWatcher;
use crate::error::{Result, WordSearchError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads draining a shared job queue, in the
/// style of a hand-rolled `std::thread` + `mpsc` pool rather than pulling in
/// an async runtime for a service with no other use for one.
struct WorkerPool {
    workers: Vec<std::thread::JoinHandle<()>>,
    sender: Option<mpsc::Sender<Job>>,
}

impl WorkerPool {
    fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            workers.push(std::thread::spawn(move || loop {
                let job = {
                    let guard = receiver.lock().expect("worker pool mutex poisoned");
                    guard.recv()
                };
                match job {
                    Ok(job) => job(),
                    Err(_) => {
                        tracing::debug!(worker = id, "worker shutting down");
                        break;
                    }
                }
            }));
        }
        WorkerPool {
            workers,
            sender: Some(sender),
        }
    }

    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(job);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Runs the threaded server's accept loop until `shutdown` is set. Blocks
/// the calling thread; connection handling happens on the worker pool.
pub fn run(
    shared: Arc<Shared>,
    host: &str,
    port: u16,
    config_path: Option<&Path>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).map_err(|source| WordSearchError::Bind {
        addr: addr.clone(),
        source,
    })?;
    let startup_cfg = shared.config();
    info!(
        %addr,
        workers = startup_cfg.max_workers,
        words = shared.session.index.len(),
        "threaded server listening"
    );

    let pool = WorkerPool::new(startup_cfg.max_workers);
    let mut watcher = ConfigWatcher::new(config_path.map(|p| p.to_path_buf()));
    listener
        .set_nonblocking(false)
        .map_err(|source| WordSearchError::Bind {
            addr: addr.clone(),
            source,
        })?;

    for stream in listener.incoming() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if let Some(new_config) = watcher.poll() {
            info!("config reloaded");
            shared.apply_reload(new_config);
        }
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let cfg = shared.config();
        let timeout = Duration::from_secs(cfg.request_timeout_secs);
        let max_concurrent = cfg.max_concurrent_connections;
        let active = shared.session.stats.snapshot().active_connections as usize;
        if active >= max_concurrent {
            let _ = reject_busy(stream);
            shared
                .session
                .stats
                .record_rejected(crate::stats::StatusClass::Busy, 0.0);
            continue;
        }

        shared.session.stats.connection_opened();
        let shared_for_job = Arc::clone(&shared);
        pool.execute(Box::new(move || {
            serve_connection(&shared_for_job, stream, timeout);
            shared_for_job.session.stats.connection_closed();
        }));
    }
    Ok(())
}

fn reject_busy(mut stream: TcpStream) -> std::io::Result<()> {
    stream.write_all(b"503 BUSY 0\nEND\n")
}

fn serve_connection(shared: &Arc<Shared>, stream: TcpStream, timeout: Duration) {
    let peer = stream.peer_addr().ok();
    let mut reader = BufReader::new(stream.try_clone().expect("clone connected stream"));
    let mut writer = stream;
    loop {
        match read_line(
            &mut reader,
            &writer,
            timeout,
            shared.session.max_pattern_length,
        ) {
            Ok(ReadOutcome::Line(line)) if !line.is_empty() => {
                let outcome = shared.session.handle_line(&line);
                if writer.write_all(outcome.response.as_bytes()).is_err() {
                    break;
                }
                if outcome.should_close {
                    break;
                }
            }
            Ok(ReadOutcome::Line(_)) => continue,
            Ok(ReadOutcome::Eof) => break,
            Ok(ReadOutcome::Timeout) => {
                let _ = writer.write_all(b"400 BAD-REQUEST timeout\nEND\n");
                break;
            }
            Ok(ReadOutcome::InvalidUtf8) => {
                let _ = writer.write_all(b"400 BAD-REQUEST non-utf8\nEND\n");
                break;
            }
            Err(_) => break,
        }
    }
    if let Some(addr) = peer {
        tracing::debug!(%addr, "connection closed");
    }
}
