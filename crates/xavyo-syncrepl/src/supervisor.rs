//! Connection supervisor.
//!
//! Drives one connection attempt at a time: connect, bind, start the sync
//! search, poll and dispatch. Every attempt gets a fresh [`SyncConsumer`];
//! its state is dropped when the attempt ends. Only invalid credentials and
//! shutdown end the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::consumer::SyncConsumer;
use crate::error::SessionError;
use crate::session::SyncSearch;
use crate::traits::{ChangeSink, DirectoryConnector, DirectorySession, SyncCallbacks};

/// Fixed delay between a failed attempt and the next one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested.
    Shutdown,
    /// The directory rejected the credentials.
    AuthenticationFailed,
}

impl SupervisorExit {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorExit::Shutdown => 0,
            SupervisorExit::AuthenticationFailed => 1,
        }
    }
}

/// Result of a single connection attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Shutdown was requested while polling.
    Shutdown,
    /// The attempt failed in a way retrying cannot fix.
    Fatal(SessionError),
    /// The attempt failed; back off and reconnect.
    Retry(SessionError),
    /// The directory ended the search; reconnect right away.
    Exhausted,
}

impl From<SessionError> for AttemptOutcome {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials { .. } => AttemptOutcome::Fatal(e),
            SessionError::Unreachable { .. } | SessionError::Protocol { .. } => {
                AttemptOutcome::Retry(e)
            }
        }
    }
}

/// Owns the reconnect loop around the sync consumer.
pub struct ConnectionSupervisor {
    connector: Arc<dyn DirectoryConnector>,
    sink: Arc<dyn ChangeSink>,
    search: SyncSearch,
    retry_delay: Duration,
}

impl ConnectionSupervisor {
    /// Create a supervisor with the default retry delay.
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        sink: Arc<dyn ChangeSink>,
        search: SyncSearch,
    ) -> Self {
        Self {
            connector,
            sink,
            search,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the delay between failed attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run until shutdown or an authentication failure.
    pub async fn run(&self, shutdown: CancellationToken) -> SupervisorExit {
        loop {
            if shutdown.is_cancelled() {
                return SupervisorExit::Shutdown;
            }

            match self.run_attempt(&shutdown).await {
                AttemptOutcome::Shutdown => {
                    tracing::info!(target: "ldap_sync", "Shutdown requested, stopping sync");
                    return SupervisorExit::Shutdown;
                }
                AttemptOutcome::Fatal(e) => {
                    tracing::error!(
                        target: "ldap_sync",
                        endpoint = %self.connector.endpoint(),
                        error = %e,
                        "Login to directory failed"
                    );
                    return SupervisorExit::AuthenticationFailed;
                }
                AttemptOutcome::Exhausted => {
                    tracing::info!(
                        target: "ldap_sync",
                        endpoint = %self.connector.endpoint(),
                        "Sync search ended by server, reconnecting"
                    );
                }
                AttemptOutcome::Retry(e) => {
                    tracing::warn!(
                        target: "ldap_sync",
                        endpoint = %self.connector.endpoint(),
                        error_code = e.error_code(),
                        error = %e,
                        retry_in_secs = self.retry_delay.as_secs_f64(),
                        "Sync session failed, reconnecting"
                    );
                    if !self.backoff(&shutdown).await {
                        return SupervisorExit::Shutdown;
                    }
                }
            }
        }
    }

    /// Sleep the retry delay. Returns false if shutdown was requested.
    async fn backoff(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.retry_delay) => true,
        }
    }

    /// Run one connection attempt with a fresh consumer.
    #[instrument(skip_all, fields(endpoint = %self.connector.endpoint()))]
    pub async fn run_attempt(&self, shutdown: &CancellationToken) -> AttemptOutcome {
        tracing::info!(target: "ldap_sync", "Connecting to directory");

        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => return e.into(),
        };

        let outcome = self.drive(session.as_mut(), shutdown).await;
        session.close().await;
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn DirectorySession,
        shutdown: &CancellationToken,
    ) -> AttemptOutcome {
        if let Err(e) = session.bind().await {
            return e.into();
        }

        let mut consumer = SyncConsumer::new(Arc::clone(&self.sink));

        tracing::info!(
            target: "ldap_sync",
            base_dn = %self.search.base_dn,
            filter = %self.search.filter,
            "Starting syncrepl"
        );
        // A reconnect always refreshes from empty state; no cookie is sent.
        if let Err(e) = session.start_sync(&self.search, None).await {
            return e.into();
        }

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return AttemptOutcome::Shutdown,
                polled = session.poll() => polled,
            };

            match polled {
                Ok(Some(message)) => consumer.dispatch(message).await,
                Ok(None) => return AttemptOutcome::Exhausted,
                Err(e) => return e.into(),
            }
        }
    }
}
