//! Content synchronization consumer.
//!
//! Turns entry, presence and delete events into add/modify/delete changes.
//! Entry changes seen while refreshing only update the shadow state; once the
//! refresh is done every change is published as it arrives. Deletions are
//! always published.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::entry::{AttributeMap, ChangeEvent, Entry, EntryId};
use crate::state::{SyncPhase, SyncState};
use crate::traits::{ChangeSink, SyncCallbacks};

/// Consumer for one synchronization session.
pub struct SyncConsumer {
    state: SyncState,
    sink: Arc<dyn ChangeSink>,
}

impl SyncConsumer {
    /// Create a consumer with fresh state.
    pub fn new(sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            state: SyncState::new(),
            sink,
        }
    }

    /// Get the shadow state.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Get the current phase.
    pub fn phase(&self) -> SyncPhase {
        self.state.phase()
    }

    async fn delete_entries(&mut self, ids: Vec<EntryId>) {
        for id in ids {
            // Unknown identifiers are ignored so repeated deletions are harmless.
            let Some(entry) = self.state.remove(&id) else {
                trace!(entry_id = %id, "Ignoring deletion of unknown entry");
                continue;
            };
            info!(dn = %entry.dn, change_type = "delete", "Detected deletion of entry");
            self.sink
                .publish(ChangeEvent::deleted(entry.dn, entry.attributes))
                .await;
        }
    }
}

#[async_trait]
impl SyncCallbacks for SyncConsumer {
    async fn on_entry(&mut self, dn: String, attributes: AttributeMap, id: EntryId) {
        let stored = Entry::new(dn.clone(), attributes.clone());
        let event = match self.state.upsert(id, stored) {
            Some(previous) => ChangeEvent::modified(dn, previous, attributes),
            None => ChangeEvent::added(dn, attributes),
        };

        if !self.state.is_persisting() {
            trace!(dn = %event.dn, change_type = %event.kind, "Applied entry during refresh");
            return;
        }

        info!(dn = %event.dn, change_type = %event.kind, "Detected change of entry");
        self.sink.publish(event).await;
    }

    async fn on_present(&mut self, ids: Option<Vec<EntryId>>, refresh_deletes: bool) {
        match ids {
            None => {
                if !refresh_deletes {
                    let absent = self.state.absent_ids();
                    debug!(
                        absent = absent.len(),
                        "Presence phase ended, deleting entries not reported"
                    );
                    self.delete_entries(absent).await;
                }
                self.state.clear_present();
            }
            Some(ids) if refresh_deletes => self.delete_entries(ids).await,
            Some(ids) => {
                for id in ids {
                    self.state.mark_present(id);
                }
            }
        }
    }

    async fn on_delete(&mut self, ids: Vec<EntryId>) {
        self.delete_entries(ids).await;
    }

    async fn on_refresh_done(&mut self) {
        if self.state.finish_refresh() {
            info!(
                entries = self.state.len(),
                "Initial sync done, polling for changes"
            );
        }
    }

    fn on_cookie(&mut self, cookie: Vec<u8>) {
        trace!(len = cookie.len(), "Received sync cookie");
        self.state.set_cookie(cookie);
    }
}
