//! PostgreSQL target backed by `sqlx`.
//!
//! Every scope gets its own connection; nothing is pooled. A batch is sent
//! with the simple-query protocol so a script may contain many statements.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, instrument, warn};

use crate::core::connection::take_connect_timeout;
use crate::core::policy::ScopeOptions;
use crate::core::types::ServerMessage;
use crate::error::ExecutionError;
use crate::io::database::{Database, Session};
use crate::logging::NoticeTap;

/// Largest `statement_timeout` the server accepts, in milliseconds.
const MAX_STATEMENT_TIMEOUT_MILLIS: u64 = i32::MAX as u64;

pub struct PgDatabase {
    options: PgConnectOptions,
    connect_timeout: Duration,
    statement_timeout: Duration,
    notices: NoticeTap,
}

impl PgDatabase {
    pub fn new(
        options: PgConnectOptions,
        connect_timeout: Duration,
        statement_timeout: Duration,
        notices: NoticeTap,
    ) -> Self {
        Self {
            options,
            connect_timeout,
            statement_timeout,
            notices,
        }
    }

    /// Build a target from a normalized connection string.
    ///
    /// The `connect_timeout` parameter is enforced here rather than by the
    /// driver; without one, `statement_timeout` bounds the connect as well.
    pub fn from_connection_string(
        url: &str,
        statement_timeout: Duration,
        notices: NoticeTap,
    ) -> Result<Self> {
        let (driver_url, connect_timeout) = take_connect_timeout(url);
        let options: PgConnectOptions = driver_url.parse().context("parse connection string")?;
        Ok(Self::new(
            options,
            connect_timeout.unwrap_or(statement_timeout),
            statement_timeout,
            notices,
        ))
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

/// `statement_timeout` value for a session, capped at the server's limit.
fn statement_timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis())
        .unwrap_or(u64::MAX)
        .min(MAX_STATEMENT_TIMEOUT_MILLIS)
}

#[async_trait]
impl Database for PgDatabase {
    type Session = PgSession;

    #[instrument(skip_all, fields(isolation = options.isolation.as_sql()))]
    async fn begin(&self, options: &ScopeOptions) -> Result<PgSession, ExecutionError> {
        let stale = self.notices.drain();
        if !stale.is_empty() {
            debug!(count = stale.len(), "discarding notices from a closed scope");
        }

        let connect = PgConnection::connect_with(&self.options);
        let mut conn = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                return Err(ExecutionError::Connect {
                    message: err.to_string(),
                });
            }
            Err(_) => {
                return Err(ExecutionError::Connect {
                    message: format!("timed out after {}s", self.connect_timeout.as_secs()),
                });
            }
        };

        let setup = format!(
            "SET statement_timeout = {}; BEGIN ISOLATION LEVEL {}",
            statement_timeout_millis(self.statement_timeout),
            options.isolation.as_sql()
        );
        (&mut conn)
            .execute(sqlx::raw_sql(&setup))
            .await
            .map_err(|err| ExecutionError::Connect {
                message: format!("begin transaction: {err}"),
            })?;

        debug!("transaction opened");
        Ok(PgSession {
            conn,
            notices: self.notices.clone(),
            errors: Vec::new(),
        })
    }
}

/// A connection inside `BEGIN ... COMMIT`.
///
/// Dropping it closes the socket, which makes the server roll back.
pub struct PgSession {
    conn: PgConnection,
    notices: NoticeTap,
    errors: Vec<ServerMessage>,
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<(), ExecutionError> {
        match (&mut self.conn).execute(sqlx::raw_sql(sql)).await {
            Ok(done) => {
                debug!(rows_affected = done.rows_affected(), "batch executed");
                Ok(())
            }
            Err(sqlx::Error::Database(err)) => {
                self.errors.push(ServerMessage::server(err.message()));
                Err(ExecutionError::Rejected {
                    message: err.to_string(),
                })
            }
            Err(err) => Err(ExecutionError::Rejected {
                message: err.to_string(),
            }),
        }
    }

    fn take_messages(&mut self) -> Vec<ServerMessage> {
        let mut messages: Vec<ServerMessage> = self
            .notices
            .drain()
            .into_iter()
            .map(ServerMessage::info)
            .collect();
        messages.append(&mut self.errors);
        messages
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        (&mut self.conn)
            .execute(sqlx::raw_sql("COMMIT"))
            .await
            .map(|_| ())
            .map_err(|err| ExecutionError::Commit {
                message: err.to_string(),
            })
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        let result = (&mut self.conn).execute(sqlx::raw_sql("ROLLBACK")).await;
        if let Err(err) = &result {
            warn!(err = %err, "rollback failed; connection will be dropped");
        }
        result.map(|_| ()).map_err(|err| ExecutionError::Rejected {
            message: format!("rollback: {err}"),
        })
    }
}
