//! Opening stores from address strings
//!
//! An address names the engine directory through its host and path, with
//! optional query parameters:
//!
//! ```text
//! sync    : interval between background syncs (duration; default 10s)
//! compact : interval between background compactions (duration; default 1m)
//! ```
//!
//! Both `//data/blobs?sync=5s` and `file:///var/lib/blobs?compact=0s` are
//! accepted, as is a plain path such as `blobs/main`. Durations use
//! humantime syntax with an optional leading `-`. A zero duration turns the
//! task off. A negative `sync` syncs after every write instead, and a
//! negative `compact` disables background compaction.

use crate::store::{Options, Store};
use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// A parsed store address
#[derive(Clone, Debug, PartialEq)]
pub struct Address {
    /// Directory holding the engine's files
    pub path: PathBuf,
    /// Options derived from the query parameters
    pub options: Options,
}

impl Address {
    /// Parse an address string
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, path, query) = match Url::parse(addr) {
            Ok(url) => (
                url.host_str().unwrap_or_default().to_string(),
                url.path().to_string(),
                url.query().map(str::to_string),
            ),
            Err(url::ParseError::RelativeUrlWithoutBase) => split_relative(addr),
            Err(e) => return Err(Error::Config(format!("invalid address {addr:?}: {e}"))),
        };

        let path = dir_path(&host, &path)?;
        let mut options = Options::default();
        if let Some(query) = query {
            apply_query(&mut options, &query)?;
        }
        Ok(Address { path, options })
    }

    /// Open the store this address names
    pub fn open(&self) -> Result<Store> {
        Store::open(&self.path, &self.options)
    }
}

/// Parse `addr` and open the store it names
pub fn open_address(addr: &str) -> Result<Store> {
    Address::parse(addr)?.open()
}

/// Split a scheme-less address into host, path and query
fn split_relative(addr: &str) -> (String, String, Option<String>) {
    let addr = addr.split_once('#').map_or(addr, |(rest, _)| rest);
    let (rest, query) = match addr.split_once('?') {
        Some((rest, query)) => (rest, Some(query.to_string())),
        None => (addr, None),
    };

    match rest.strip_prefix("//") {
        Some(authority) => match authority.find('/') {
            Some(i) => (
                authority[..i].to_string(),
                authority[i..].to_string(),
                query,
            ),
            None => (authority.to_string(), String::new(), query),
        },
        None => (String::new(), rest.to_string(), query),
    }
}

/// Join host and path into the engine directory
fn dir_path(host: &str, path: &str) -> Result<PathBuf> {
    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|e| Error::Config(format!("invalid path encoding: {e}")))?;

    if host.is_empty() {
        if path.is_empty() {
            return Err(Error::Config("address names no directory".into()));
        }
        return Ok(PathBuf::from(path.into_owned()));
    }
    Ok(PathBuf::from(host).join(path.trim_start_matches('/')))
}

fn apply_query(options: &mut Options, query: &str) -> Result<()> {
    let mut sync = None;
    let mut compact = None;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        // The first occurrence of a parameter wins
        match name.as_ref() {
            "sync" if sync.is_none() => sync = Some(value.into_owned()),
            "compact" if compact.is_none() => compact = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(s) = sync.filter(|s| !s.is_empty()) {
        match parse_interval("sync", &s)? {
            Interval::Every(d) => options.engine.sync_interval = d,
            Interval::Negative => {
                options.engine.sync_interval = Duration::ZERO;
                options.engine.sync_on_write = true;
            }
        }
    }
    if let Some(s) = compact.filter(|s| !s.is_empty()) {
        options.engine.compaction_interval = match parse_interval("compact", &s)? {
            Interval::Every(d) => d,
            Interval::Negative => Duration::ZERO,
        };
    }
    Ok(())
}

enum Interval {
    Every(Duration),
    Negative,
}

fn parse_interval(name: &str, value: &str) -> Result<Interval> {
    let (negative, magnitude) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let d = humantime::parse_duration(magnitude)
        .map_err(|e| Error::Config(format!("invalid {name} interval {value:?}: {e}")))?;
    if negative && !d.is_zero() {
        Ok(Interval::Negative)
    } else {
        Ok(Interval::Every(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let addr = Address::parse("//var/blobs").unwrap();
        assert_eq!(addr.path, Path::new("var/blobs"));
        assert_eq!(addr.options, Options::default());
        assert_eq!(addr.options.engine.sync_interval, Duration::from_secs(10));
        assert_eq!(
            addr.options.engine.compaction_interval,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_absolute_path_with_intervals() {
        let addr = Address::parse("///tmp/store/db?sync=5s&compact=15s").unwrap();
        assert_eq!(addr.path, Path::new("/tmp/store/db"));
        assert_eq!(addr.options.engine.sync_interval, Duration::from_secs(5));
        assert_eq!(
            addr.options.engine.compaction_interval,
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_scheme_address() {
        let addr = Address::parse("file:///srv/blobs?compact=1h%2030m").unwrap();
        assert_eq!(addr.path, Path::new("/srv/blobs"));
        assert_eq!(
            addr.options.engine.compaction_interval,
            Duration::from_secs(90 * 60)
        );

        let addr = Address::parse("hashstore://data/main?sync=250ms").unwrap();
        assert_eq!(addr.path, Path::new("data/main"));
        assert_eq!(addr.options.engine.sync_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_plain_relative_path() {
        let addr = Address::parse("blobs/main?sync=0s").unwrap();
        assert_eq!(addr.path, Path::new("blobs/main"));
        assert_eq!(addr.options.engine.sync_interval, Duration::ZERO);
    }

    #[test]
    fn test_percent_decoded_path() {
        let addr = Address::parse("///tmp/my%20blobs").unwrap();
        assert_eq!(addr.path, Path::new("/tmp/my blobs"));
    }

    #[test]
    fn test_bad_duration() {
        let err = Address::parse("//blobs?sync=soon").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("sync")));

        let err = Address::parse("//blobs?compact=10 parsecs").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("compact")));
    }

    #[test]
    fn test_negative_durations() {
        let addr = Address::parse("//blobs?sync=-1s&compact=-5m").unwrap();
        assert!(addr.options.engine.sync_on_write);
        assert_eq!(addr.options.engine.sync_interval, Duration::ZERO);
        assert_eq!(addr.options.engine.compaction_interval, Duration::ZERO);

        // Negative zero is plain zero
        let addr = Address::parse("//blobs?sync=-0s").unwrap();
        assert!(!addr.options.engine.sync_on_write);
        assert_eq!(addr.options.engine.sync_interval, Duration::ZERO);

        let err = Address::parse("//blobs?sync=--1s").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("sync")));
    }

    #[test]
    fn test_unknown_and_empty_parameters_ignored() {
        let addr = Address::parse("//blobs?color=blue&sync=").unwrap();
        assert_eq!(addr.options, Options::default());
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!(Address::parse(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_open_address() {
        let dir = tempdir().unwrap();
        let addr = format!("//{}?sync=0s&compact=0s", dir.path().join("db").display());
        let store = open_address(&addr).unwrap();
        assert!(dir.path().join("db").join(crate::engine::LOG_FILE_NAME).exists());
        crate::BlobStore::close(store).unwrap();
    }
}
