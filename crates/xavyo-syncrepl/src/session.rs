//! Directory session messages and search parameters.

use crate::entry::{AttributeMap, EntryId};
use crate::ldap_url::{LdapUrl, SearchScope};

/// One decoded protocol event, in the order the directory delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// An entry was added or modified (or sent during the refresh).
    Entry {
        dn: String,
        attributes: AttributeMap,
        id: EntryId,
    },
    /// Presence information. `ids == None` marks the end of a presence phase.
    Present {
        ids: Option<Vec<EntryId>>,
        refresh_deletes: bool,
    },
    /// Explicit deletion of entries.
    Delete { ids: Vec<EntryId> },
    /// The refresh stage is over; the session now persists.
    RefreshDone,
    /// A new resume cookie.
    Cookie(Vec<u8>),
}

/// Parameters of the synchronization search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSearch {
    /// Base DN of the watched subtree.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Requested attributes (empty means all user attributes).
    pub attributes: Vec<String>,
    /// Search filter.
    pub filter: String,
}

impl SyncSearch {
    /// Build the search from the decoded LDAP URL.
    pub fn from_url(url: &LdapUrl) -> Self {
        Self {
            base_dn: url.base_dn.clone(),
            scope: url.scope,
            attributes: url.attributes.clone(),
            filter: url.filter.clone(),
        }
    }

    /// Attribute list as sent on the wire (`*` when none was requested).
    pub fn wire_attributes(&self) -> Vec<String> {
        if self.attributes.is_empty() {
            vec!["*".to_string()]
        } else {
            self.attributes.clone()
        }
    }
}
