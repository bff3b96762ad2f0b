//! Propagation of context across process boundaries.
//!
//! Propagators read and write context data on a *carrier*: any object
//! holding named string headers, typically an HTTP request's header map.
//! The carrier is reached only through the [`Injector`] and [`Extractor`]
//! seams supplied by the integrator, so the propagation layer itself does no
//! I/O and has no opinion about the transport.
//!
//! The crate ships:
//! - [`TraceContextPropagator`], the [W3C TraceContext] codec for the
//!   `traceparent`/`tracestate` headers;
//! - [`TextMapCompositePropagator`], which chains several
//!   [`TextMapPropagator`]s into one.
//!
//! [W3C TraceContext]: https://www.w3.org/TR/trace-context/
use std::collections::HashMap;

pub mod composite;
pub mod text_map_propagator;
mod trace_context;

pub use composite::TextMapCompositePropagator;
pub use text_map_propagator::TextMapPropagator;
pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an underlying
/// carrier like a `HashMap`.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier like a `HashMap`.
///
/// Header lookup is case-insensitive on the wire; honoring that is the
/// extractor's responsibility.
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn hash_map_get() {
        let mut carrier = HashMap::new();
        carrier.set("headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
    }

    #[test]
    fn hash_map_keys() {
        let mut carrier = HashMap::new();
        carrier.set("headerName1", "value1".to_string());
        carrier.set("headerName2", "value2".to_string());

        let got = Extractor::keys(&carrier);
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }
}
