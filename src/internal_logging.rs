#![allow(unused_macros)]
//! Internal diagnostics for the crate's own bookkeeping.
//!
//! This macro is for use inside `tracecontext` and its extensions only; it
//! is not a general-purpose logging facade, and the wire codec itself never
//! logs. With the `internal-logs` feature disabled it compiles to nothing.

/// Log an internal warning through [`tracing`].
///
/// # Fields:
/// - `name`: the operation or anomaly being reported.
/// - Additional key-value pairs may follow as attributes.
///
/// [`tracing`]: https://docs.rs/tracing
#[macro_export]
macro_rules! tracecontext_warn {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, "");
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+, "");
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}
