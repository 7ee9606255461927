//! Worker identity strings.
//!
//! A worker is named `"<prefix>host:<hostname> pid:<pid> thread:<thread>"`.
//! The name is computed on first access, on whatever thread makes that first
//! access, and then frozen until it is explicitly replaced or reset.
//!
//! [`ParsedIdentity::parse`] inverts the encoding so the reconciler can tell
//! which host, process and thread an entry in the registry belongs to.

use std::cell::OnceCell;
use std::fmt;

use hive_core::types::REGISTRY_DELIMITER;

/// Raw thread names longer than this are cut down before use.
pub const MAX_THREAD_NAME_LEN: usize = 100;

/// Display identity of one worker instance.
#[derive(Debug, Default)]
pub struct WorkerIdentity {
    prefix: Option<String>,
    name: OnceCell<String>,
}

impl WorkerIdentity {
    /// Identity without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity whose computed name starts with `prefix` (kept verbatim).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            name: OnceCell::new(),
        }
    }

    /// The configured prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Change the prefix; a computed name is discarded, an explicit one kept.
    pub fn set_prefix(&mut self, prefix: Option<String>) {
        self.prefix = prefix;
        self.name = OnceCell::new();
    }

    /// The worker's name, computing it on first call.
    pub fn name(&self) -> &str {
        self.name.get_or_init(|| {
            compose(
                self.prefix.as_deref().unwrap_or_default(),
                local_host().as_deref(),
                std::process::id(),
                &current_thread_label(),
            )
        })
    }

    /// Override the name. `None` or an empty string forces recomputation.
    pub fn set_name(&mut self, name: Option<String>) {
        self.name = match name {
            Some(name) if !name.is_empty() => OnceCell::from(name),
            _ => OnceCell::new(),
        };
    }

    /// Forget the cached name.
    pub fn reset(&mut self) {
        self.name = OnceCell::new();
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build an identity string from its parts.
///
/// Without a host the `host:` component is dropped; such identities never
/// parse back and are therefore never pruned.
pub fn compose(prefix: &str, host: Option<&str>, pid: u32, thread: &str) -> String {
    match host {
        Some(host) => format!("{prefix}host:{host} pid:{pid} thread:{thread}"),
        None => format!("{prefix}pid:{pid} thread:{thread}"),
    }
}

/// The local host name, or `None` when it cannot be resolved.
pub fn local_host() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty() && !host.contains(char::is_whitespace))
}

/// Label for the current thread: its name, or its id when unnamed.
pub fn current_thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => clean_thread_name(name),
        None => format!("{:?}", current.id()),
    }
}

/// Shorten abnormally long thread names and strip the registry delimiter.
///
/// Names over [`MAX_THREAD_NAME_LEN`] characters are cut before the first
/// `": <path>"` segment (a `": "` followed by a word containing `/`).
pub fn clean_thread_name(raw: &str) -> String {
    let mut name = raw;
    if raw.chars().count() > MAX_THREAD_NAME_LEN {
        for (idx, _) in raw.match_indices(": ") {
            let rest = &raw[idx + 2..];
            let word = rest.split_whitespace().next().unwrap_or_default();
            if word.contains('/') {
                name = &raw[..idx];
                break;
            }
        }
    }
    name.replace([REGISTRY_DELIMITER, '\n'], "_")
}

/// Host, process and thread recovered from an identity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentity {
    pub host: String,
    pub pid: u32,
    pub thread: String,
}

impl ParsedIdentity {
    /// Parse an identity produced by [`compose`].
    ///
    /// Prefixes may contain anything; the first `host:` that is followed by a
    /// well-formed `pid:` and `thread:` wins.
    pub fn parse(identity: &str) -> Option<Self> {
        identity
            .match_indices("host:")
            .find_map(|(idx, _)| Self::parse_tail(&identity[idx + "host:".len()..]))
    }

    fn parse_tail(tail: &str) -> Option<Self> {
        let (host, rest) = tail.split_once(' ')?;
        let (pid, rest) = rest.strip_prefix("pid:")?.split_once(' ')?;
        let thread = rest.strip_prefix("thread:")?;
        if host.is_empty() || thread.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            pid: pid.parse().ok()?,
            thread: thread.to_string(),
        })
    }

    /// Re-encode with the given prefix.
    pub fn encode(&self, prefix: &str) -> String {
        compose(prefix, Some(&self.host), self.pid, &self.thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_name_includes_thread_name() {
        let name = thread::Builder::new()
            .name("worker_2".into())
            .spawn(|| {
                let identity = WorkerIdentity::with_prefix("PREFIX ");
                identity.name().to_string()
            })
            .unwrap()
            .join()
            .unwrap();

        let parts: Vec<&str> = name.split(' ').collect();
        assert_eq!(parts.len(), 4, "{parts:?}");
        assert_eq!(parts[0], "PREFIX");
        assert_eq!(parts[1], format!("host:{}", local_host().unwrap()));
        assert_eq!(parts[2], format!("pid:{}", std::process::id()));
        assert_eq!(parts[3], "thread:worker_2");
    }

    #[test]
    fn test_name_is_frozen_after_first_access() {
        let identity = WorkerIdentity::new();
        let first = identity.name().to_string();

        let other_thread = thread::spawn(move || identity.name().to_string())
            .join()
            .unwrap();
        assert_eq!(first, other_thread);
    }

    #[test]
    fn test_name_can_be_changed_and_reset() {
        let mut identity = WorkerIdentity::new();
        assert!(!identity.name().is_empty());

        identity.set_name(Some("foo-bar".into()));
        assert_eq!(identity.name(), "foo-bar");

        identity.set_name(None);
        assert!(identity.name().starts_with("host:"));
        assert!(identity.name().contains(" thread:"));

        identity.set_name(Some(String::new()));
        assert!(identity.name().starts_with("host:"));
    }

    #[test]
    fn test_display_is_name() {
        let identity = WorkerIdentity::with_prefix("42");
        assert_eq!(identity.to_string(), identity.name());
    }

    #[test]
    fn test_unnamed_thread_uses_thread_id() {
        let label = thread::spawn(current_thread_label).join().unwrap();
        assert!(label.starts_with("ThreadId("), "{label}");
    }

    #[test]
    fn test_long_thread_name_is_cut_before_path() {
        let raw = format!("RubyThread-7: {}/lib/worker.rb:42", "/very/long/path".repeat(8));
        assert!(raw.len() > MAX_THREAD_NAME_LEN);
        assert_eq!(clean_thread_name(&raw), "RubyThread-7");

        // short names are kept as-is even with a path
        assert_eq!(clean_thread_name("t: /a/b"), "t: /a/b");

        // long names without a path segment are kept
        let long = "x".repeat(150);
        assert_eq!(clean_thread_name(&long), long);
    }

    #[test]
    fn test_delimiter_is_stripped_from_thread_names() {
        assert_eq!(clean_thread_name("a,b"), "a_b");
    }

    #[test]
    fn test_hostless_identity_does_not_parse() {
        let degraded = compose("p ", None, 7, "main");
        assert_eq!(degraded, "p pid:7 thread:main");
        assert!(ParsedIdentity::parse(&degraded).is_none());
    }

    #[test]
    fn test_parse_skips_prefix_containing_host_marker() {
        let identity = "host:fake host:box pid:12 thread:hive-worker#3";
        let parsed = ParsedIdentity::parse(identity).unwrap();
        assert_eq!(parsed.host, "box");
        assert_eq!(parsed.pid, 12);
        assert_eq!(parsed.thread, "hive-worker#3");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ParsedIdentity::parse("foo-bar").is_none());
        assert!(ParsedIdentity::parse("host:box pid:x thread:t").is_none());
        assert!(ParsedIdentity::parse("host:box pid:1 thread:").is_none());
        assert!(ParsedIdentity::parse("host:box thread:t").is_none());
    }

    proptest! {
        #[test]
        fn prop_identity_round_trips(
            prefix in "[A-Z ]{0,8}",
            host in "[a-z0-9][a-z0-9.-]{0,30}",
            pid in any::<u32>(),
            thread in "[a-zA-Z0-9_#:. -]{1,40}",
        ) {
            let encoded = compose(&prefix, Some(&host), pid, &thread);
            prop_assert_eq!(&encoded, &compose(&prefix, Some(&host), pid, &thread));

            let parsed = ParsedIdentity::parse(&encoded).unwrap();
            prop_assert_eq!(&parsed.host, &host);
            prop_assert_eq!(parsed.pid, pid);
            prop_assert_eq!(&parsed.thread, &thread);
            prop_assert_eq!(parsed.encode(&prefix), encoded);
        }
    }
}
