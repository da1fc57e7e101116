//! Minimal `/health` HTTP endpoint. A second plain
//! `TcpListener` accept loop, one thread per request, hand-parses the
//! request line and writes a literal HTTP/1.1 response -- no web framework
//! for one endpoint.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::Shared;

pub fn run(shared: Arc<Shared>, host: &str, port: u16, shutdown: Arc<AtomicBool>) {
    let addr = format!("{host}:{port}");
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            warn!(%addr, error = %e, "health endpoint failed to bind, disabled");
            return;
        }
    };
    info!(%addr, "health endpoint listening");
    for stream in listener.incoming() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let Ok(mut stream) = stream else { continue };
        let shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stream.try_clone().expect("clone health stream"));
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                return;
            }
            let body = health_body(&shared);
            let (status_line, payload) = if request_line.starts_with("GET /health") {
                ("HTTP/1.1 200 OK", body)
            } else {
                ("HTTP/1.1 404 Not Found", "{}".to_string())
            };
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            let _ = stream.write_all(response.as_bytes());
        });
    }
}

fn health_body(shared: &Shared) -> String {
    let uptime = shared.start_time.elapsed().as_secs_f64();
    let snap = shared.session.stats.snapshot();
    format!(
        "{{\"status\":\"ok\",\"uptime_s\":{uptime:.3},\"words_total\":{},\"requests\":{},\"active_connections\":{}}}",
        shared.session.index.len(),
        snap.requests,
        snap.active_connections,
    )
}
