//! Span identity and the types it travels in.
//!
//! This module holds the wire-facing identity of a span ([`SpanContext`]
//! with its [`TraceId`], [`SpanId`], [`TraceFlags`] and [`TraceState`]) and
//! the minimal span object model the propagation layer needs: the [`Span`]
//! and [`Tracer`] traits plus the [`DefaultSpan`]/[`DefaultTracer`] stubs
//! that carry identity without recording anything.
//!
//! The active span for a given [`Context`] is managed through
//! [`TraceContextExt`], and for the current thread through
//! [`mark_span_as_active`] and [`get_active_span`].
//!
//! [`Context`]: crate::Context

use crate::Context;
use thiserror::Error;

pub(crate) mod context;
mod noop;
mod span_context;

pub use self::context::{SpanRef, TraceContextExt};
pub use self::noop::{DefaultSpan, DefaultTracer};
pub use self::span_context::{SpanContext, TraceState};
pub use crate::trace_context::{FromHexError, SpanId, TraceFlags, TraceId};

/// Describe the result of operations in tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the trace API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// Other errors propagated from trace operations.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Interface for a single operation within a trace.
///
/// Only the identity surface is modeled here: implementations hand out their
/// [`SpanContext`] and may otherwise do nothing, like [`DefaultSpan`].
pub trait Span {
    /// The [`SpanContext`] identifying this span on the wire.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` if this span is recording information.
    fn is_recording(&self) -> bool;

    /// Record an event for this span.
    fn add_event(&mut self, name: &str);

    /// Signal that the operation described by this span has now ended.
    fn end(&mut self);
}

/// Interface for constructing [`Span`]s.
pub trait Tracer {
    /// The [`Span`] type produced by this tracer.
    type Span: Span;

    /// Starts a new span in the current context.
    fn start(&self, name: &str) -> Self::Span {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Starts a new span with the given parent context.
    fn start_with_context(&self, name: &str, parent_cx: &Context) -> Self::Span;
}

/// Mark the given `Span` as active on the current thread, returning a guard
/// that restores the previously active span when dropped.
#[must_use = "Dropping the guard detaches the context."]
pub fn mark_span_as_active<T: Span + Send + Sync + 'static>(span: T) -> crate::ContextGuard {
    let cx = Context::current_with_span(span);
    cx.attach()
}

/// Executes a closure with a reference to this thread's current span.
pub fn get_active_span<F, T>(f: F) -> T
where
    F: FnOnce(SpanRef<'_>) -> T,
{
    Context::map_current(|cx| f(cx.span()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_span_follows_attached_context() {
        let span_context = SpanContext::local(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::SAMPLED,
            TraceState::NONE,
        );

        get_active_span(|span| assert!(!span.span_context().is_valid()));

        {
            let _guard = mark_span_as_active(DefaultSpan::new(span_context.clone()));
            get_active_span(|span| assert_eq!(span.span_context(), &span_context));
        }

        get_active_span(|span| assert!(!span.span_context().is_valid()));
    }
}
