//! Database abstraction for script execution.
//!
//! The [`Database`] trait decouples the coordinator from the actual server
//! (currently PostgreSQL via `sqlx`). Tests use `test_support::FakeDatabase`,
//! an in-memory transactional target.

use async_trait::async_trait;

use crate::core::policy::ScopeOptions;
use crate::core::types::ServerMessage;
use crate::error::ExecutionError;

/// A server that scripts can be applied to.
#[async_trait]
pub trait Database: Send + Sync {
    type Session: Session;

    /// Open a fresh connection and begin a transaction on it.
    async fn begin(&self, options: &ScopeOptions) -> Result<Self::Session, ExecutionError>;
}

/// One connection with an open transaction.
///
/// Dropping a session that was neither committed nor rolled back must discard
/// its work.
#[async_trait]
pub trait Session: Send {
    /// Send `sql` as a single batch.
    ///
    /// Messages the server produces are kept by the session until
    /// [`Session::take_messages`], so they survive a batch whose future is
    /// dropped mid-flight.
    async fn execute(&mut self, sql: &str) -> Result<(), ExecutionError>;

    /// Messages received since the last call, oldest first.
    fn take_messages(&mut self) -> Vec<ServerMessage>;

    async fn commit(&mut self) -> Result<(), ExecutionError>;

    async fn rollback(&mut self) -> Result<(), ExecutionError>;
}
