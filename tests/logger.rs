use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use spanner_admin::logger::DatabaseLogger;
use spanner_admin::name::DatabaseName;
use tracing::{Dispatch, Level};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(max_level: Level) -> (Dispatch, Captured) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(max_level)
        .finish();
    (Dispatch::new(subscriber), captured)
}

fn db1() -> DatabaseName {
    "projects/p/instances/i/databases/db1".parse().unwrap()
}

#[test]
fn test_transport_receives_tagged_events() {
    let (dispatch, captured) = capture(Level::TRACE);
    let logger = DatabaseLogger::with_transport(db1(), dispatch);

    logger.info("schema update queued");
    logger.error("backup failed");

    let text = captured.text();
    assert!(text.contains("INFO"));
    assert!(text.contains("ERROR"));
    assert!(text.contains("schema update queued"));
    assert!(text.contains("backup failed"));
    assert!(text.contains("spanner_admin::database"));
    assert!(text.contains("database=projects/p/instances/i/databases/db1"));
}

#[test]
fn test_transport_level_filter_applies() {
    let (dispatch, captured) = capture(Level::INFO);
    let logger = DatabaseLogger::with_transport(db1(), dispatch);

    logger.debug("noisy detail");
    logger.warn("slow operation");

    let text = captured.text();
    assert!(!text.contains("noisy detail"));
    assert!(text.contains("WARN"));
    assert!(text.contains("slow operation"));
}

#[test]
fn test_without_transport_uses_current_subscriber() {
    let (dispatch, captured) = capture(Level::TRACE);
    let logger = DatabaseLogger::new(db1());

    tracing::dispatcher::with_default(&dispatch, || logger.info("via default"));

    assert!(captured.text().contains("via default"));
}

#[test]
fn test_scope_tags_nested_events() {
    let (dispatch, captured) = capture(Level::TRACE);
    let logger = DatabaseLogger::with_transport(db1(), dispatch);

    let answer = logger.scope(|| {
        tracing::info!("inside the scope");
        42
    });

    assert_eq!(answer, 42);
    let text = captured.text();
    assert!(text.contains("inside the scope"));
    assert!(text.contains("database{name=projects/p/instances/i/databases/db1}"));
}

#[test]
fn test_loggers_are_independent() {
    let (first, first_out) = capture(Level::TRACE);
    let (second, second_out) = capture(Level::TRACE);
    let a = DatabaseLogger::with_transport(db1(), first);
    let b = DatabaseLogger::with_transport(
        "projects/p/instances/i/databases/db2".parse().unwrap(),
        second,
    );

    a.info("only for a");
    b.info("only for b");

    assert!(first_out.text().contains("only for a"));
    assert!(!first_out.text().contains("only for b"));
    assert!(second_out.text().contains("databases/db2"));
    assert_eq!(b.database().database(), "db2");
    assert!(format!("{a:?}").contains("custom_transport: true"));
}
