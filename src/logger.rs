//! Per-database diagnostics.
//!
//! A [`DatabaseLogger`] is handed around next to the database it describes.
//! Without a transport it logs through the global subscriber; with one,
//! its events go only to the supplied [`Dispatch`].

use tracing::{Dispatch, Level};

use crate::name::DatabaseName;

pub const TARGET: &str = "spanner_admin::database";

#[derive(Clone)]
pub struct DatabaseLogger {
    database: DatabaseName,
    transport: Option<Dispatch>,
}

impl DatabaseLogger {
    pub fn new(database: DatabaseName) -> Self {
        Self {
            database,
            transport: None,
        }
    }

    /// Routes this logger's events to `transport` instead of the global
    /// subscriber.
    pub fn with_transport(database: DatabaseName, transport: Dispatch) -> Self {
        Self {
            database,
            transport: Some(transport),
        }
    }

    pub fn database(&self) -> &DatabaseName {
        &self.database
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Runs `f` inside a span tagged with the database name, so library
    /// events raised by `f` carry it too.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let run = || tracing::info_span!(target: TARGET, "database", name = %self.database).in_scope(f);
        match &self.transport {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, run),
            None => run(),
        }
    }

    fn log(&self, level: Level, message: &str) {
        let database = &self.database;
        let event = || {
            if level == Level::ERROR {
                tracing::error!(target: TARGET, %database, "{message}");
            } else if level == Level::WARN {
                tracing::warn!(target: TARGET, %database, "{message}");
            } else if level == Level::INFO {
                tracing::info!(target: TARGET, %database, "{message}");
            } else if level == Level::DEBUG {
                tracing::debug!(target: TARGET, %database, "{message}");
            } else {
                tracing::trace!(target: TARGET, %database, "{message}");
            }
        };
        match &self.transport {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, event),
            None => event(),
        }
    }
}

impl std::fmt::Debug for DatabaseLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseLogger")
            .field("database", &self.database.to_string())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}
