//! # LDAP Sync Publisher
//!
//! Watches an LDAP subtree with the Content Synchronization protocol
//! (RFC 4533, "syncrepl") and publishes every add, modify and delete as a JSON
//! change-set to an HTTP sink.
//!
//! ## Architecture
//!
//! - [`SyncConsumer`] - keeps the last known state of every entry and turns
//!   sync callbacks into [`ChangeEvent`]s. Nothing is published during the
//!   initial refresh; deletions are always published.
//! - [`ChangePublisher`] - one best-effort HTTP `PUT` per change.
//! - [`ConnectionSupervisor`] - connect, bind, search, poll; reconnects with a
//!   fixed delay on any failure except invalid credentials.
//! - [`LdapConnector`] - the `ldap3` backed directory session.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use xavyo_syncrepl::{ChangePublisher, ConnectionSupervisor, LdapConnector, SyncConfig, SyncSearch};
//!
//! let config = SyncConfig::from_file("pypubsub-ldap.yaml")?;
//! let publisher = ChangePublisher::new(&config.pubsuburl, config.sink_timeout())?;
//! let supervisor = ConnectionSupervisor::new(
//!     Arc::new(LdapConnector::new(config.ldapurl.clone())),
//!     Arc::new(publisher),
//!     SyncSearch::from_url(&config.ldapurl),
//! );
//! let exit = supervisor.run(CancellationToken::new()).await;
//! std::process::exit(exit.exit_code());
//! ```

pub mod config;
pub mod consumer;
pub mod entry;
pub mod error;
pub mod ldap;
pub mod ldap_url;
pub mod publisher;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod traits;

// Re-exports
pub use config::{ConfigError, SyncConfig};
pub use consumer::SyncConsumer;
pub use entry::{AttributeMap, AttributeValue, ChangeEvent, ChangeKind, Entry, EntryId};
pub use error::{PublishError, SessionError, SessionResult};
pub use ldap::LdapConnector;
pub use ldap_url::{LdapUrl, LdapUrlError, SearchScope};
pub use publisher::{stringify, ChangePayload, ChangePublisher, PayloadValue};
pub use session::{SyncMessage, SyncSearch};
pub use state::{SyncPhase, SyncState};
pub use supervisor::{AttemptOutcome, ConnectionSupervisor, SupervisorExit};
pub use traits::{ChangeSink, DirectoryConnector, DirectorySession, SyncCallbacks};

// Re-export async_trait for session and sink implementors
pub use async_trait::async_trait;
