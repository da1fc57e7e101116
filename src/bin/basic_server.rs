//! Thin CLI front-end for the basic (single-connection-at-a-time,
//! exact-mode-only) server.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use wordsearch::config::Config;
use wordsearch::server::{self, Shared};
use wordsearch::{load_corpus, WordIndex};

#[derive(Parser, Debug)]
#[command(name = "wordsearch-basic", about = "Wildcard word-search server, one connection at a time")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 9999)]
    port: u16,
    #[arg(long)]
    wordlist: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    health_port: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut cfg = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    cfg.host = args.host.clone();
    cfg.port = args.port;
    cfg.validate();

    let words = match load_corpus(&args.wordlist) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to load word list");
            std::process::exit(1);
        }
    };
    let index = WordIndex::build(words);

    let shared = Shared::new(index, cfg, /* allow_mode_override */ false, /* allow_batch */ false);
    let shutdown = Arc::new(AtomicBool::new(false));

    if args.health_port > 0 {
        let health_shared = Arc::clone(&shared);
        let health_host = args.host.clone();
        let health_shutdown = Arc::clone(&shutdown);
        let health_port = args.health_port;
        std::thread::spawn(move || {
            server::health::run(health_shared, &health_host, health_port, health_shutdown);
        });
    }

    if let Err(e) = server::basic::run(shared, &args.host, args.port, args.config.as_deref(), shutdown) {
        error!(error = %e, "basic server exited");
        std::process::exit(1);
    }
}
