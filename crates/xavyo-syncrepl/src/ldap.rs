//! LDAP directory session
//!
//! Implements the session traits over `ldap3`, running a content
//! synchronization search (RFC 4533) in refresh-and-persist mode and decoding
//! Sync State controls, Sync Info messages and the final Sync Done control
//! into [`SyncMessage`]s.

use async_trait::async_trait;
use ldap3::controls::{
    parse_syncinfo, Control, ControlType, EntryState, RefreshMode, SyncDone, SyncInfo,
    SyncRequest, SyncState as SyncStateControl,
};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, ResultEntry, Scope, SearchEntry, SearchStream};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

use crate::entry::{AttributeMap, AttributeValue, EntryId};
use crate::error::{SessionError, SessionResult, LDAP_INVALID_CREDENTIALS};
use crate::ldap_url::{LdapUrl, SearchScope};
use crate::session::{SyncMessage, SyncSearch};
use crate::traits::{DirectoryConnector, DirectorySession};

/// Default timeout for opening the TCP/TLS connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens LDAP sessions against the server named in the LDAP URL.
pub struct LdapConnector {
    url: LdapUrl,
    connect_timeout: Duration,
    starttls: bool,
}

impl LdapConnector {
    /// Create a connector for the given LDAP URL.
    pub fn new(url: LdapUrl) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            starttls: false,
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Upgrade plain `ldap://` connections with STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    fn endpoint(&self) -> String {
        self.url.server_url()
    }

    async fn connect(&self) -> SessionResult<Box<dyn DirectorySession>> {
        let server_url = self.url.server_url();
        debug!(url = %server_url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.starttls && self.url.scheme == "ldap");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &server_url)
            .await
            .map_err(|e| {
                SessionError::unreachable_with_source(
                    &server_url,
                    "failed to connect to LDAP server",
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(LdapSession {
            ldap,
            server_url,
            bind_dn: self.url.bind_dn.clone(),
            bind_password: self.url.bind_password.clone(),
            stream: None,
            pending: VecDeque::new(),
            refreshing: true,
            finished: false,
        }))
    }
}

/// One open LDAP connection running a sync search.
pub struct LdapSession {
    ldap: Ldap,
    server_url: String,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    stream: Option<SearchStream<'static, String, Vec<String>>>,
    pending: VecDeque<SyncMessage>,
    refreshing: bool,
    finished: bool,
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self), fields(url = %self.server_url))]
    async fn bind(&mut self) -> SessionResult<()> {
        let bind_dn = self.bind_dn.as_deref().unwrap_or("");
        let bind_password = self.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = self
            .ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                SessionError::unreachable_with_source(
                    &self.server_url,
                    format!("LDAP bind failed for '{bind_dn}'"),
                    e,
                )
            })?;

        if result.rc == LDAP_INVALID_CREDENTIALS {
            return Err(SessionError::InvalidCredentials {
                bind_dn: bind_dn.to_string(),
            });
        }
        if result.rc != 0 {
            return Err(SessionError::protocol(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(url = %self.server_url, "LDAP connection established successfully");
        Ok(())
    }

    async fn start_sync(
        &mut self,
        search: &SyncSearch,
        cookie: Option<Vec<u8>>,
    ) -> SessionResult<()> {
        let request = SyncRequest {
            mode: RefreshMode::RefreshAndPersist,
            cookie,
            reload_hint: false,
        };

        let stream = self
            .ldap
            .with_controls(request)
            .streaming_search(
                &search.base_dn,
                ldap_scope(search.scope),
                &search.filter,
                search.wire_attributes(),
            )
            .await
            .map_err(|e| SessionError::protocol_with_source("failed to start sync search", e))?;

        self.stream = Some(stream);
        self.pending.clear();
        self.refreshing = true;
        self.finished = false;
        Ok(())
    }

    async fn poll(&mut self) -> SessionResult<Option<SyncMessage>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }
            if self.finished {
                return Ok(None);
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| SessionError::protocol("sync search not started"))?;

            let next = stream
                .next()
                .await
                .map_err(|e| SessionError::protocol_with_source("failed to read sync message", e))?;

            match next {
                Some(entry) => {
                    let messages = decode_result_entry(entry, self.refreshing)?;
                    self.refreshing = still_refreshing(self.refreshing, &messages);
                    self.pending.extend(messages);
                }
                None => {
                    let result = stream.finish().await;
                    self.finished = true;
                    if result.rc != 0 {
                        return Err(SessionError::protocol(format!(
                            "sync search ended with code {}: {}",
                            result.rc, result.text
                        )));
                    }
                    self.pending.extend(sync_done_messages(&result.ctrls));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.stream = None;
        if let Err(e) = self.ldap.unbind().await {
            trace!(error = %e, "LDAP unbind failed");
        }
    }
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Decode one message of the sync search.
fn decode_result_entry(entry: ResultEntry, refreshing: bool) -> SessionResult<Vec<SyncMessage>> {
    if entry.is_intermediate() {
        return Ok(syncinfo_messages(parse_syncinfo(entry)));
    }
    if entry.is_ref() {
        trace!("Ignoring search reference");
        return Ok(Vec::new());
    }

    let state = entry.1.iter().find_map(|ctrl| match ctrl {
        Control(Some(ControlType::SyncState), raw) => Some(raw.parse::<SyncStateControl>()),
        _ => None,
    });
    let Some(state) = state else {
        return Err(SessionError::protocol(
            "search entry without Sync State control",
        ));
    };

    let content = match &state.state {
        EntryState::Add | EntryState::Modify => {
            let entry = SearchEntry::construct(entry);
            Some((entry.dn, attribute_map(entry.attrs, entry.bin_attrs)))
        }
        EntryState::Present | EntryState::Delete => None,
    };

    Ok(sync_state_messages(
        state.state,
        EntryId::from(state.entry_uuid),
        content,
        state.cookie,
        refreshing,
    ))
}

/// Messages for one entry carrying a Sync State control.
///
/// Entries sent while `refreshing` also count as present, so the end of a
/// presence phase does not delete them.
fn sync_state_messages(
    state: EntryState,
    id: EntryId,
    content: Option<(String, AttributeMap)>,
    cookie: Option<Vec<u8>>,
    refreshing: bool,
) -> Vec<SyncMessage> {
    let mut messages = Vec::with_capacity(3);
    match (state, content) {
        (EntryState::Present, _) => messages.push(SyncMessage::Present {
            ids: Some(vec![id]),
            refresh_deletes: false,
        }),
        (EntryState::Delete, _) => messages.push(SyncMessage::Delete { ids: vec![id] }),
        (EntryState::Add | EntryState::Modify, Some((dn, attributes))) => {
            messages.push(SyncMessage::Entry {
                dn,
                attributes,
                id: id.clone(),
            });
            if refreshing {
                messages.push(SyncMessage::Present {
                    ids: Some(vec![id]),
                    refresh_deletes: false,
                });
            }
        }
        (EntryState::Add | EntryState::Modify, None) => {
            warn!(entry_id = %id, "Sync State entry without content, skipping");
        }
    }
    messages.extend(cookie.map(SyncMessage::Cookie));
    messages
}

/// The refresh stage lasts until a decoded batch carries `RefreshDone`.
fn still_refreshing(refreshing: bool, messages: &[SyncMessage]) -> bool {
    refreshing && !messages.contains(&SyncMessage::RefreshDone)
}

fn syncinfo_messages(info: SyncInfo) -> Vec<SyncMessage> {
    #[allow(unreachable_patterns)]
    match info {
        SyncInfo::NewCookie(cookie) => vec![SyncMessage::Cookie(cookie)],
        SyncInfo::RefreshPresent {
            cookie,
            refresh_done,
        } => phase_end_messages(false, cookie, refresh_done),
        SyncInfo::RefreshDelete {
            cookie,
            refresh_done,
        } => phase_end_messages(true, cookie, refresh_done),
        SyncInfo::SyncIdSet {
            cookie,
            refresh_deletes,
            sync_uuids,
        } => {
            let mut messages = vec![SyncMessage::Present {
                ids: Some(sync_uuids.into_iter().map(EntryId::from).collect()),
                refresh_deletes,
            }];
            messages.extend(cookie.map(SyncMessage::Cookie));
            messages
        }
        _ => Vec::new(),
    }
}

fn sync_done_messages(ctrls: &[Control]) -> Vec<SyncMessage> {
    ctrls
        .iter()
        .find_map(|ctrl| match ctrl {
            Control(Some(ControlType::SyncDone), raw) => Some(raw.parse::<SyncDone>()),
            _ => None,
        })
        .map(|done| phase_end_messages(done.refresh_deletes, done.cookie, true))
        .unwrap_or_default()
}

/// Messages for the end of a refresh phase: close the presence phase, store
/// the cookie, and switch to persisting when the refresh is complete.
fn phase_end_messages(
    refresh_deletes: bool,
    cookie: Option<Vec<u8>>,
    refresh_done: bool,
) -> Vec<SyncMessage> {
    let mut messages = vec![SyncMessage::Present {
        ids: None,
        refresh_deletes,
    }];
    messages.extend(cookie.map(SyncMessage::Cookie));
    if refresh_done {
        messages.push(SyncMessage::RefreshDone);
    }
    messages
}

fn attribute_map(
    attrs: HashMap<String, Vec<String>>,
    bin_attrs: HashMap<String, Vec<Vec<u8>>>,
) -> AttributeMap {
    let mut map = AttributeMap::new();
    for (name, values) in attrs {
        map.entry(name)
            .or_insert_with(Vec::new)
            .extend(values.into_iter().map(AttributeValue::Text));
    }
    for (name, values) in bin_attrs {
        map.entry(name)
            .or_insert_with(Vec::new)
            .extend(values.into_iter().map(AttributeValue::Binary));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_ldap_scope() {
        assert!(matches!(ldap_scope(SearchScope::Base), Scope::Base));
        assert!(matches!(ldap_scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(ldap_scope(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn test_phase_end_refresh_present_done() {
        let messages = phase_end_messages(false, Some(b"csn".to_vec()), true);
        assert_eq!(
            messages,
            vec![
                SyncMessage::Present {
                    ids: None,
                    refresh_deletes: false
                },
                SyncMessage::Cookie(b"csn".to_vec()),
                SyncMessage::RefreshDone,
            ]
        );
    }

    #[test]
    fn test_phase_end_refresh_delete_not_done() {
        let messages = phase_end_messages(true, None, false);
        assert_eq!(
            messages,
            vec![SyncMessage::Present {
                ids: None,
                refresh_deletes: true
            }]
        );
    }

    fn person() -> Option<(String, AttributeMap)> {
        let mut attrs = AttributeMap::new();
        attrs.insert("cn".to_string(), vec![AttributeValue::from("alice")]);
        Some(("cn=alice,dc=example,dc=com".to_string(), attrs))
    }

    fn entry_message(id: &EntryId) -> SyncMessage {
        let (dn, attributes) = person().unwrap();
        SyncMessage::Entry {
            dn,
            attributes,
            id: id.clone(),
        }
    }

    fn present(id: &EntryId) -> SyncMessage {
        SyncMessage::Present {
            ids: Some(vec![id.clone()]),
            refresh_deletes: false,
        }
    }

    #[test]
    fn test_add_during_refresh_is_also_present() {
        let id = EntryId::from("alice");
        let messages = sync_state_messages(EntryState::Add, id.clone(), person(), None, true);
        assert_eq!(messages, vec![entry_message(&id), present(&id)]);
    }

    #[test]
    fn test_modify_after_refresh_is_entry_only() {
        let id = EntryId::from("alice");
        let messages = sync_state_messages(EntryState::Modify, id.clone(), person(), None, false);
        assert_eq!(messages, vec![entry_message(&id)]);
    }

    #[test]
    fn test_present_and_delete_states() {
        let id = EntryId::from("bob");
        assert_eq!(
            sync_state_messages(EntryState::Present, id.clone(), None, None, true),
            vec![present(&id)]
        );
        assert_eq!(
            sync_state_messages(EntryState::Delete, id.clone(), None, None, false),
            vec![SyncMessage::Delete {
                ids: vec![id.clone()]
            }]
        );
    }

    #[test]
    fn test_sync_state_cookie_is_forwarded_last() {
        let id = EntryId::from("alice");
        let messages = sync_state_messages(
            EntryState::Add,
            id.clone(),
            person(),
            Some(b"rid=001,csn=2".to_vec()),
            true,
        );
        assert_eq!(
            messages,
            vec![
                entry_message(&id),
                present(&id),
                SyncMessage::Cookie(b"rid=001,csn=2".to_vec()),
            ]
        );

        let messages =
            sync_state_messages(EntryState::Delete, id.clone(), None, Some(b"csn".to_vec()), false);
        assert_eq!(messages.last(), Some(&SyncMessage::Cookie(b"csn".to_vec())));
    }

    #[test]
    fn test_add_without_content_is_skipped() {
        let messages = sync_state_messages(EntryState::Add, EntryId::from("x"), None, None, true);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_refresh_ends_with_refresh_done() {
        let id = EntryId::from("alice");
        assert!(still_refreshing(true, &[entry_message(&id), present(&id)]));
        assert!(!still_refreshing(
            true,
            &phase_end_messages(false, None, true)
        ));
        assert!(still_refreshing(true, &phase_end_messages(true, None, false)));
        assert!(!still_refreshing(false, &[entry_message(&id)]));
    }

    #[test]
    fn test_syncinfo_new_cookie() {
        assert_eq!(
            syncinfo_messages(SyncInfo::NewCookie(b"csn".to_vec())),
            vec![SyncMessage::Cookie(b"csn".to_vec())]
        );
    }

    #[test]
    fn test_syncinfo_refresh_delete_done() {
        assert_eq!(
            syncinfo_messages(SyncInfo::RefreshDelete {
                cookie: None,
                refresh_done: true,
            }),
            vec![
                SyncMessage::Present {
                    ids: None,
                    refresh_deletes: true
                },
                SyncMessage::RefreshDone,
            ]
        );
    }

    #[test]
    fn test_syncinfo_id_set() {
        let uuids = vec![b"uuid-a".to_vec(), b"uuid-b".to_vec()];
        let messages = syncinfo_messages(SyncInfo::SyncIdSet {
            cookie: Some(b"csn".to_vec()),
            refresh_deletes: true,
            sync_uuids: uuids.clone().into_iter().collect(),
        });

        assert_eq!(messages.len(), 2);
        let SyncMessage::Present {
            ids: Some(ids),
            refresh_deletes: true,
        } = &messages[0]
        else {
            panic!("expected a deletion batch, got {:?}", messages[0]);
        };
        let ids: BTreeSet<EntryId> = ids.iter().cloned().collect();
        let expected: BTreeSet<EntryId> = uuids.into_iter().map(EntryId::from).collect();
        assert_eq!(ids, expected);
        assert_eq!(messages[1], SyncMessage::Cookie(b"csn".to_vec()));
    }

    #[test]
    fn test_sync_done_missing() {
        assert!(sync_done_messages(&[]).is_empty());
    }

    #[test]
    fn test_attribute_map_merges_text_and_binary() {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["alice".to_string()]);
        let mut bin_attrs = HashMap::new();
        bin_attrs.insert("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]]);

        let map = attribute_map(attrs, bin_attrs);

        assert_eq!(map["cn"], vec![AttributeValue::Text("alice".to_string())]);
        assert_eq!(map["jpegPhoto"], vec![AttributeValue::Binary(vec![0xff, 0xd8])]);
    }

    #[test]
    fn test_connector_endpoint() {
        let url = LdapUrl::parse("ldap://ldap.example.com:389/dc=example,dc=com").unwrap();
        let connector = LdapConnector::new(url).with_starttls(true);
        assert_eq!(connector.endpoint(), "ldap://ldap.example.com:389");
    }
}
