//! Implements [W3C Trace Context] propagation: carrying the identity of a
//! distributed trace across process boundaries in the `traceparent` and
//! `tracestate` HTTP headers.
//!
//! [W3C Trace Context]: https://www.w3.org/TR/trace-context/
//!
//! ## Overview
//!
//! Tracing systems need two things from the wire: a way to *inject* the
//! identity of the current span into an outbound request, and a way to
//! *extract* the caller's identity from an inbound one. This crate provides
//! both, hung on three pieces:
//!
//! * [`trace::SpanContext`], the span identity itself: trace id, span id,
//!   flags byte and vendor [`trace::TraceState`]. Extraction yields either a
//!   fully valid remote context or the canonical invalid one, never a
//!   partial value.
//! * [`Context`], an immutable, execution-scoped value bag holding the
//!   current span. Deriving a context never mutates the original.
//! * [`propagation::TraceContextPropagator`], the codec between the two
//!   headers and [`trace::SpanContext`], reading and writing any carrier
//!   through the [`propagation::Injector`] and [`propagation::Extractor`]
//!   seams.
//!
//! `traceparent` parsing is strict: any deviation from the fixed-width
//! grammar (length, delimiter position, hex alphabet, all-zero identifiers,
//! the reserved `ff` version) produces the invalid context. `tracestate`
//! parsing is tolerant: damaged list members are dropped without
//! invalidating a well-formed `traceparent`. Neither operation panics or
//! returns an error on arbitrary input.
//!
//! ## Quick start
//!
//! ```
//! use std::collections::HashMap;
//! use tracecontext::propagation::{TextMapPropagator, TraceContextPropagator};
//! use tracecontext::trace::TraceContextExt;
//!
//! let propagator = TraceContextPropagator::new();
//!
//! // Reconstruct the caller's span identity from inbound headers.
//! let mut inbound = HashMap::new();
//! inbound.insert(
//!     "traceparent".to_string(),
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
//! );
//! let cx = propagator.extract(&inbound);
//! assert!(cx.span().span_context().is_valid());
//! assert!(cx.span().span_context().is_remote());
//!
//! // Hand the same identity on to the next hop.
//! let mut outbound = HashMap::new();
//! propagator.inject_context(&cx, &mut outbound);
//! assert_eq!(outbound.get("traceparent"), inbound.get("traceparent"));
//! ```
//!
//! ## Feature flags
//!
//! * `internal-logs` (default): route the crate's own bookkeeping
//!   diagnostics through [`tracing`]. The codec itself never logs.
//! * `futures`: `FutureExt` for carrying a [`Context`] across `poll`
//!   boundaries.
//! * `testing`: expose `testing::trace::TestSpan` to downstream test
//!   suites.
//!
//! [`tracing`]: https://docs.rs/tracing
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod context;
mod internal_logging;
mod trace_context;

pub mod propagation;
pub mod trace;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use context::{Context, ContextGuard};

#[cfg(feature = "futures")]
#[cfg_attr(docsrs, doc(cfg(feature = "futures")))]
pub use context::{FutureExt, WithContext};

pub use trace_context::{FromHexError, SpanId, TraceFlags, TraceId};
