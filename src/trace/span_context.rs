use crate::trace::{TraceError, TraceResult};
use crate::{SpanId, TraceFlags, TraceId};
use thiserror::Error;

/// TraceState carries tracing-system specific context in a list of key-value
/// pairs, allowing multiple vendors to participate in the same trace.
///
/// Entries keep their insertion order: the position of a list member is
/// meaningful to the vendors reading the header, so the container never
/// sorts. Membership is bounded at [`TraceState::MAX_MEMBERS`] entries, and
/// every stored key and value satisfies the W3C grammar.
///
/// Please review the [W3C specification] for details on this field.
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// The default `TraceState`, as a constant.
    pub const NONE: TraceState = TraceState(Vec::new());

    /// The maximum number of list members a `TraceState` may hold.
    pub const MAX_MEMBERS: usize = 32;

    const MAX_KEY_LEN: usize = 256;
    const MAX_VALUE_LEN: usize = 256;

    /// Returns whether the given `TraceState` list-member key is valid per the
    /// [W3C spec]: non-empty, at most 256 characters, first character in
    /// `[a-z0-9]`, the rest in `[a-z0-9_\-*/]` with at most one `@` (the
    /// tenant separator of `tenant@vendor` keys).
    ///
    /// [W3C spec]: https://www.w3.org/TR/trace-context/#key
    pub fn is_valid_key(key: &str) -> bool {
        let bytes = key.as_bytes();
        if bytes.is_empty() || bytes.len() > TraceState::MAX_KEY_LEN {
            return false;
        }
        if !(bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit()) {
            return false;
        }

        let mut ats = 0;
        for &b in bytes {
            match b {
                b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'*' | b'/' => {}
                b'@' => {
                    ats += 1;
                    if ats > 1 {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Returns whether the given `TraceState` list-member value is valid per
    /// the [W3C spec]: non-empty, at most 256 bytes, every byte printable
    /// ASCII (`0x20..=0x7e`) excluding `,` and `=`.
    ///
    /// [W3C spec]: https://www.w3.org/TR/trace-context/#value
    pub fn is_valid_value(value: &str) -> bool {
        let bytes = value.as_bytes();
        if bytes.is_empty() || bytes.len() > TraceState::MAX_VALUE_LEN {
            return false;
        }

        bytes
            .iter()
            .all(|&b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// Creates a new `TraceState` from the given key-value collection.
    ///
    /// Keys are unique: a repeated key updates the earlier entry in place,
    /// keeping its position, the same way [`set`] does. Fails if any key or
    /// value is invalid, or if more than [`TraceState::MAX_MEMBERS`] distinct
    /// keys remain.
    ///
    /// [`set`]: TraceState::set
    ///
    /// # Examples
    ///
    /// ```
    /// use tracecontext::trace::TraceState;
    ///
    /// let kvs = vec![("foo", "bar"), ("apple", "banana")];
    /// let trace_state = TraceState::from_key_value(kvs);
    ///
    /// assert!(trace_state.is_ok());
    /// assert_eq!(trace_state.unwrap().header(), String::from("foo=bar,apple=banana"))
    /// ```
    pub fn from_key_value<T, K, V>(trace_state: T) -> TraceResult<Self>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (key, value) in trace_state {
            let (key, value) = (key.to_string(), value.to_string());
            if !TraceState::is_valid_key(key.as_str()) {
                return Err(TraceStateError::Key(key).into());
            }
            if !TraceState::is_valid_value(value.as_str()) {
                return Err(TraceStateError::Value(value).into());
            }

            if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                entries.push((key, value));
            }
        }

        if entries.len() > TraceState::MAX_MEMBERS {
            return Err(TraceStateError::TooManyMembers(entries.len()).into());
        }

        Ok(TraceState(entries))
    }

    /// Retrieves the value for the given key, if one exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts the given key-value pair.
    ///
    /// An existing key is updated in place, keeping its position in the list;
    /// a new key is appended at the end. Returns `false` without mutating the
    /// state if the key or value is invalid per the W3C grammar, or if the
    /// key is new and the state already holds [`TraceState::MAX_MEMBERS`]
    /// members.
    pub fn set<K, V>(&mut self, key: K, value: V) -> bool
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::is_valid_key(key.as_str()) || !TraceState::is_valid_value(value.as_str()) {
            return false;
        }

        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return true;
        }

        if self.0.len() >= TraceState::MAX_MEMBERS {
            return false;
        }
        self.0.push((key, value));
        true
    }

    /// Iterates the `(key, value)` entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of list members held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the state holds no list members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes to the `tracestate` header value: entries in insertion
    /// order, each rendered as `key=value`, joined by `,` with no
    /// surrounding whitespace.
    pub fn header(&self) -> String {
        let mut header = String::new();
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                header.push(',');
            }
            header.push_str(key);
            header.push('=');
            header.push_str(value);
        }
        header
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
enum TraceStateError {
    /// The key is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#key> for requirements on keys.
    #[error("{0} is not a valid key in TraceState, see https://www.w3.org/TR/trace-context/#key for more details")]
    Key(String),

    /// The value is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#value> for requirements on values.
    #[error("{0} is not a valid value in TraceState, see https://www.w3.org/TR/trace-context/#value for more details")]
    Value(String),

    /// The list holds more members than the header format allows.
    #[error("TraceState is limited to 32 list members, got {0}")]
    TooManyMembers(usize),
}

impl From<TraceStateError> for TraceError {
    fn from(err: TraceStateError) -> Self {
        TraceError::Other(Box::new(err))
    }
}

/// Immutable portion of a span which can be serialized and propagated.
///
/// This representation conforms to the [W3C TraceContext specification]: the
/// trace and span identifiers, the flags byte, and the vendor trace state,
/// plus whether the context arrived from a remote parent.
///
/// A `SpanContext` built through [`SpanContext::local`] or
/// [`SpanContext::remote`] is either fully valid (both ids non-zero) or the
/// canonical invalid context [`SpanContext::NONE`]; there is no in-between.
///
/// [W3C TraceContext specification]: https://www.w3.org/TR/trace-context
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// The canonical invalid span context: zero ids, no flags, empty trace
    /// state, not remote.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Create an invalid empty span context.
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a `SpanContext` for a locally created span.
    ///
    /// Both ids must be non-zero; otherwise the canonical invalid context is
    /// returned.
    pub fn local(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        trace_state: TraceState,
    ) -> Self {
        SpanContext::with_origin(trace_id, span_id, trace_flags, trace_state, false)
    }

    /// Construct a `SpanContext` extracted from a remote parent.
    ///
    /// Both ids must be non-zero; otherwise the canonical invalid context is
    /// returned.
    pub fn remote(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        trace_state: TraceState,
    ) -> Self {
        SpanContext::with_origin(trace_id, span_id, trace_flags, trace_state, true)
    }

    fn with_origin(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        trace_state: TraceState,
        is_remote: bool,
    ) -> Self {
        if !trace_id.is_valid() || !span_id.is_valid() {
            return SpanContext::NONE;
        }

        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The flags byte carried alongside the identifiers.
    ///
    /// Reserved bits are preserved as received.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span context has a valid (non-zero) `trace_id`
    /// and a valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the span context was extracted from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// A reference to the span context's [`TraceState`].
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn key_test_data() -> Vec<(&'static str, bool)> {
        vec![
            ("123", true),
            ("bar", true),
            ("foo@bar", true),
            ("foo@0123456789abcdef", true),
            ("1a-2f@foo", true),
            ("1a-_*/2b@foo", true),
            ("foo-_*/bar", true),
            ("foo@bar@baz", false),
            ("@foo", false),
            ("_foo", false),
            ("FOO", false),
            ("foo bar", false),
            ("", false),
            ("你好", false),
        ]
    }

    #[rustfmt::skip]
    fn value_test_data() -> Vec<(&'static str, bool)> {
        vec![
            ("bar", true),
            ("bar baz", true),
            ("congosSecondPosition", true),
            ("~!@#$%^&*()_+", true),
            ("", false),
            ("bar,baz", false),
            ("bar=baz", false),
            ("bar\tbaz", false),
            ("bar\x7fbaz", false),
        ]
    }

    #[test]
    fn trace_state_key_grammar() {
        for (key, expected) in key_test_data() {
            assert_eq!(TraceState::is_valid_key(key), expected, "test key: {:?}", key);
        }

        assert!(TraceState::is_valid_key("a".repeat(256).as_str()));
        assert!(!TraceState::is_valid_key("a".repeat(257).as_str()));
    }

    #[test]
    fn trace_state_value_grammar() {
        for (value, expected) in value_test_data() {
            assert_eq!(
                TraceState::is_valid_value(value),
                expected,
                "test value: {:?}",
                value
            );
        }

        assert!(TraceState::is_valid_value("b".repeat(256).as_str()));
        assert!(!TraceState::is_valid_value("b".repeat(257).as_str()));
    }

    #[test]
    fn trace_state_set_appends_and_replaces_in_place() {
        let mut state = TraceState::default();
        assert!(state.set("congo", "t61rcWkgMzE"));
        assert!(state.set("rojo", "00f067aa0ba902b7"));
        assert_eq!(state.header(), "congo=t61rcWkgMzE,rojo=00f067aa0ba902b7");

        // Updating an existing key keeps its position.
        assert!(state.set("congo", "updated"));
        assert_eq!(state.header(), "congo=updated,rojo=00f067aa0ba902b7");
        assert_eq!(state.get("congo"), Some("updated"));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn trace_state_set_rejects_invalid_entries() {
        let mut state = TraceState::default();
        assert!(!state.set("Invalid", "value"));
        assert!(!state.set("key", ""));
        assert!(!state.set("key", "a,b"));
        assert!(state.is_empty());
        assert_eq!(state.header(), "");
    }

    #[test]
    fn trace_state_capacity() {
        let mut state = TraceState::default();
        for i in 0..TraceState::MAX_MEMBERS {
            assert!(state.set(format!("key{}", i), "v"));
        }
        assert_eq!(state.len(), TraceState::MAX_MEMBERS);

        // A new key at capacity is rejected and the state left unchanged.
        let before = state.clone();
        assert!(!state.set("overflow", "v"));
        assert_eq!(state, before);

        // An existing key can still be updated.
        assert!(state.set("key0", "updated"));
        assert_eq!(state.len(), TraceState::MAX_MEMBERS);
        assert_eq!(state.get("key0"), Some("updated"));
    }

    #[test]
    fn trace_state_equality_is_position_sensitive() {
        let ab = TraceState::from_key_value(vec![("a", "1"), ("b", "2")]).unwrap();
        let ba = TraceState::from_key_value(vec![("b", "2"), ("a", "1")]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(
            ab,
            TraceState::from_key_value(vec![("a", "1"), ("b", "2")]).unwrap()
        );
    }

    #[test]
    fn trace_state_from_key_value_validates() {
        assert!(TraceState::from_key_value(vec![("FOO", "bar")]).is_err());
        assert!(TraceState::from_key_value(vec![("foo", "bar,baz")]).is_err());
        assert!(TraceState::from_key_value((0..33).map(|i| (format!("k{}", i), "v"))).is_err());
        assert!(TraceState::from_key_value((0..32).map(|i| (format!("k{}", i), "v"))).is_ok());
        assert_eq!(
            TraceState::from_key_value(Vec::<(&str, &str)>::new()).unwrap(),
            TraceState::NONE
        );
    }

    #[test]
    fn trace_state_from_key_value_replaces_repeated_keys_in_place() {
        let state =
            TraceState::from_key_value(vec![("foo", "1"), ("bar", "2"), ("foo", "3")]).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("foo"), Some("3"));
        assert_eq!(state.header(), "foo=3,bar=2");

        // Same result as driving `set` with the same pairs.
        let mut via_set = TraceState::default();
        assert!(via_set.set("foo", "1"));
        assert!(via_set.set("bar", "2"));
        assert!(via_set.set("foo", "3"));
        assert_eq!(state, via_set);

        // The member cap counts distinct keys, not input pairs.
        let dup_heavy = (0..33).map(|i| (format!("k{}", i % 32), "v"));
        assert!(TraceState::from_key_value(dup_heavy).is_ok());
    }

    #[test]
    fn span_context_validity() {
        let trace_id = TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128);
        let span_id = SpanId::from(0x00f0_67aa_0ba9_02b7u64);

        let local = SpanContext::local(trace_id, span_id, TraceFlags::SAMPLED, TraceState::NONE);
        assert!(local.is_valid());
        assert!(!local.is_remote());
        assert!(local.is_sampled());

        let remote = SpanContext::remote(trace_id, span_id, TraceFlags::default(), TraceState::NONE);
        assert!(remote.is_valid());
        assert!(remote.is_remote());
        assert!(!remote.is_sampled());

        // A zero id on either side collapses to the canonical invalid context.
        assert_eq!(
            SpanContext::remote(TraceId::INVALID, span_id, TraceFlags::SAMPLED, TraceState::NONE),
            SpanContext::NONE
        );
        assert_eq!(
            SpanContext::local(trace_id, SpanId::INVALID, TraceFlags::SAMPLED, TraceState::NONE),
            SpanContext::NONE
        );
        assert!(!SpanContext::empty_context().is_valid());
    }
}
