//! Capability traits
//!
//! The connection side and the synchronization-callback side are separate
//! capabilities:
//!
//! - [`DirectoryConnector`] / [`DirectorySession`] - open, bind, search, poll
//! - [`SyncCallbacks`] - react to decoded protocol events
//! - [`ChangeSink`] - receive the resulting change events

use async_trait::async_trait;

use crate::entry::{AttributeMap, ChangeEvent, EntryId};
use crate::error::SessionResult;
use crate::session::{SyncMessage, SyncSearch};

/// Factory for directory sessions; one session per connection attempt.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Endpoint description used in log lines.
    fn endpoint(&self) -> String;

    /// Open a new connection to the directory.
    async fn connect(&self) -> SessionResult<Box<dyn DirectorySession>>;
}

/// An open connection to the directory.
#[async_trait]
pub trait DirectorySession: Send {
    /// Authenticate with the configured credentials.
    async fn bind(&mut self) -> SessionResult<()>;

    /// Start a refresh-and-persist synchronization search.
    async fn start_sync(&mut self, search: &SyncSearch, cookie: Option<Vec<u8>>)
        -> SessionResult<()>;

    /// Get the next protocol event. `Ok(None)` means the search is exhausted.
    async fn poll(&mut self) -> SessionResult<Option<SyncMessage>>;

    /// Release the connection. Errors are ignored.
    async fn close(&mut self) {}
}

/// Receiver of synchronization events.
#[async_trait]
pub trait SyncCallbacks: Send {
    /// An entry was sent with its full attribute set.
    async fn on_entry(&mut self, dn: String, attributes: AttributeMap, id: EntryId);

    /// Presence information; `ids == None` ends the presence phase.
    async fn on_present(&mut self, ids: Option<Vec<EntryId>>, refresh_deletes: bool);

    /// Entries were deleted.
    async fn on_delete(&mut self, ids: Vec<EntryId>);

    /// The refresh stage is over.
    async fn on_refresh_done(&mut self);

    /// A new resume cookie was received.
    fn on_cookie(&mut self, cookie: Vec<u8>);

    /// Route a decoded message to its handler.
    async fn dispatch(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Entry { dn, attributes, id } => self.on_entry(dn, attributes, id).await,
            SyncMessage::Present {
                ids,
                refresh_deletes,
            } => self.on_present(ids, refresh_deletes).await,
            SyncMessage::Delete { ids } => self.on_delete(ids).await,
            SyncMessage::RefreshDone => self.on_refresh_done().await,
            SyncMessage::Cookie(cookie) => self.on_cookie(cookie),
        }
    }
}

/// Destination of change events. Delivery is best-effort and never fails
/// from the caller's point of view.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Deliver one change.
    async fn publish(&self, event: ChangeEvent);
}
