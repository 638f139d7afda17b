//! Journal Bookkeeper - Binary Entry Point
//!
//! Replays a JSON-lines journal into a file-backed store:
//!
//! ```text
//! bookkeeper <journal.jsonl> [data_dir]
//! ```
//!
//! Configuration comes from `BOOKKEEPER_*` environment variables, log
//! filtering from `RUST_LOG`.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use journal_bookkeeper::collaborators::{JsonlSink, PackageHandler, TracingEventSink};
use journal_bookkeeper::error::ApplyError;
use journal_bookkeeper::store::RecordKey;
use journal_bookkeeper::types::ValueMap;
use journal_bookkeeper::{
    read_journal, BookKeeper, BookKeeperConfig, Collaborators, FileStore, PackageMessage,
    RequestType, StoreSession, Subscriber,
};

const CONTENT_STORE_TYPE: &str = "content";
const DEFAULT_DATA_DIR: &str = "./bookkeeper-data";

/// Records the paths of applied packages in the bookkeeper's session
///
/// Added paths map to the package id, deleted paths to `null`. Nothing is
/// committed here, so content lands together with status and offset.
struct ContentHandler;

impl PackageHandler for ContentHandler {
    fn apply(&self, session: &mut dyn StoreSession, msg: &PackageMessage) -> Result<(), ApplyError> {
        let value = match msg.req_type {
            RequestType::Add => Value::from(msg.pkg_id.clone()),
            RequestType::Delete => Value::Null,
            other => {
                return Err(ApplyError::new(format!(
                    "unsupported request type {} for package {}",
                    other, msg.pkg_id
                )))
            }
        };
        let values: ValueMap = msg
            .paths
            .iter()
            .map(|path| (path.clone(), value.clone()))
            .collect();
        session.stage(&RecordKey::new(CONTENT_STORE_TYPE, &msg.pub_agent_name), values)?;
        Ok(())
    }
}

/// Log filter used when `RUST_LOG` is unset or invalid
const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` directives win over the default level
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() {
    let directives = env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(directives.as_deref()))
        .init();

    if let Err(e) = run() {
        error!(error = %e, "Bookkeeper failed");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let journal_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: bookkeeper <journal.jsonl> [data_dir]");
            process::exit(2);
        }
    };
    let data_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    info!(
        "Starting {} v{}",
        journal_bookkeeper::NAME,
        journal_bookkeeper::VERSION
    );

    let config = BookKeeperConfig::from_env();
    let store = Arc::new(FileStore::open(&data_dir)?);

    let collaborators = Collaborators::new(Arc::new(ContentHandler))
        .with_status_sink(Arc::new(JsonlSink::new(data_dir.join("status.jsonl"))))
        .with_log_sink(Arc::new(JsonlSink::new(data_dir.join("log.jsonl"))))
        .with_event_sink(Arc::new(TracingEventSink));
    let bookkeeper = Arc::new(BookKeeper::new(store, config, collaborators));

    let interrupt = bookkeeper.interrupt().clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping");
        interrupt.trigger();
    })?;

    let entries = read_journal(&journal_path)?;
    info!(
        journal = %journal_path.display(),
        entries = entries.len(),
        "Loaded journal"
    );

    let summary = Subscriber::new(Arc::clone(&bookkeeper)).run(entries);
    let metrics = bookkeeper.metrics_snapshot();
    info!(
        handled = summary.handled,
        already_processed = summary.already_processed,
        retries = summary.retries,
        interrupted = summary.interrupted,
        offset = ?bookkeeper.load_offset()?,
        failed_imports = metrics.failed_package_imports,
        permanent_errors = metrics.permanent_import_errors,
        "Replay finished"
    );
    Ok(())
}
