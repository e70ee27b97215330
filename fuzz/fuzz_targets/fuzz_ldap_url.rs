//! Fuzz target for LDAP URL decoding.
//!
//! Configuration and environment overrides carry the directory location as an
//! RFC 4516 URL; decoding must reject bad input without panicking.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_ldap_url -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use xavyo_syncrepl::{LdapUrl, SyncSearch};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(url) = LdapUrl::parse(s) {
        assert!(!url.host.is_empty());
        assert!(!url.filter.is_empty());

        // The server part of a decoded URL must decode again.
        let server = LdapUrl::parse(&url.server_url()).unwrap();
        assert_eq!(server.scheme, url.scheme);
        assert_eq!(server.port, url.port);

        let search = SyncSearch::from_url(&url);
        assert!(!search.wire_attributes().is_empty());
    }
});
