//! Single-threaded accept loop: one connection served to completion before
//! the next is accepted, exact-mode only, no `BATCH`.

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{read_line, ReadOutcome, Shared};
use crate::config::ConfigWatcher;
use crate::error::{Result, WordSearchError};

/// Runs the basic server's accept loop until `shutdown` is set. Blocks the
/// calling thread.
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
    listener
        .set_nonblocking(false)
        .map_err(|source| WordSearchError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, words = shared.session.index.len(), "basic server listening");

    let mut watcher = ConfigWatcher::new(config_path.map(|p| p.to_path_buf()));

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
            shared.session.stats.record_rejected(
                crate::stats::StatusClass::Busy,
                0.0,
            );
            continue;
        }
        shared.session.stats.connection_opened();
        serve_connection(&shared, stream, timeout);
        shared.session.stats.connection_closed();
    }
    Ok(())
}

fn reject_busy(mut stream: TcpStream) -> std::io::Result<()> {
    stream.write_all(b"503 BUSY 0\nEND\n")
}

/// Serves exactly one request then returns, matching the original
/// single-`readline`-then-close shape: no loop over multiple requests on
/// the same connection.
fn serve_connection(shared: &Arc<Shared>, stream: TcpStream, timeout: Duration) {
    let peer = stream.peer_addr().ok();
    let mut reader = BufReader::new(stream.try_clone().expect("clone connected stream"));
    let mut writer = stream;
    match read_line(
        &mut reader,
        &writer,
        timeout,
        shared.session.max_pattern_length,
    ) {
        Ok(ReadOutcome::Line(line)) if !line.is_empty() => {
            let outcome = shared.session.handle_line(&line);
            let _ = writer.write_all(outcome.response.as_bytes());
        }
        Ok(ReadOutcome::Line(_)) | Ok(ReadOutcome::Eof) => {}
        Ok(ReadOutcome::Timeout) => {
            let _ = writer.write_all(b"400 BAD-REQUEST timeout\nEND\n");
        }
        Ok(ReadOutcome::InvalidUtf8) => {
            let _ = writer.write_all(b"400 BAD-REQUEST non-utf8\nEND\n");
        }
        Err(_) => {}
    }
    if let Some(addr) = peer {
        tracing::debug!(%addr, "connection closed");
    }
}
