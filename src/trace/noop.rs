//! Identity-only span and tracer stubs.
//!
//! These implementations carry a [`SpanContext`] without recording anything.
//! They are what the propagation layer wraps extracted identity in, and what
//! callers get when no real tracing backend is wired up.
use crate::trace::{Span, SpanContext, TraceContextExt as _, Tracer};
use crate::Context;

/// A [`Span`] that holds a context and records nothing.
#[derive(Clone, Debug)]
pub struct DefaultSpan {
    span_context: SpanContext,
}

impl DefaultSpan {
    /// The invalid `DefaultSpan`, as a constant.
    pub const INVALID: DefaultSpan = DefaultSpan {
        span_context: SpanContext::NONE,
    };

    /// Creates a span stub carrying the given context.
    pub fn new(span_context: SpanContext) -> Self {
        DefaultSpan { span_context }
    }
}

impl Span for DefaultSpan {
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `false`, signifying that this span is never recording.
    fn is_recording(&self) -> bool {
        false
    }

    /// Ignores all events.
    fn add_event(&mut self, _name: &str) {}

    /// Ignores `Span` endings.
    fn end(&mut self) {}
}

/// A [`Tracer`] that starts [`DefaultSpan`]s.
///
/// Spans started from a parent context inherit the parent's span context, so
/// identity keeps flowing even without a tracing backend.
#[derive(Clone, Debug, Default)]
pub struct DefaultTracer {
    _private: (),
}

impl DefaultTracer {
    /// Create a new `DefaultTracer`.
    pub fn new() -> Self {
        DefaultTracer { _private: () }
    }
}

impl Tracer for DefaultTracer {
    type Span = DefaultSpan;

    fn start_with_context(&self, _name: &str, parent_cx: &Context) -> Self::Span {
        DefaultSpan::new(parent_cx.span().span_context().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn valid_span_context() -> SpanContext {
        SpanContext::local(
            TraceId::from(42u128),
            SpanId::from(42u64),
            TraceFlags::default(),
            TraceState::NONE,
        )
    }

    #[test]
    fn default_tracer_defaults_to_invalid_span() {
        let tracer = DefaultTracer::new();
        let span = tracer.start_with_context("foo", &Context::new());
        assert!(!span.span_context().is_valid());
    }

    #[test]
    fn default_tracer_propagates_span_context_from_parent() {
        let tracer = DefaultTracer::new();
        let cx = Context::new().with_span(DefaultSpan::new(valid_span_context()));
        let span = tracer.start_with_context("foo", &cx);
        assert_eq!(span.span_context(), &valid_span_context());
    }

    #[test]
    fn default_tracer_propagates_remote_span_context() {
        let tracer = DefaultTracer::new();
        let cx = Context::new().with_remote_span_context(SpanContext::remote(
            TraceId::from(42u128),
            SpanId::from(42u64),
            TraceFlags::default(),
            TraceState::NONE,
        ));
        let span = tracer.start_with_context("foo", &cx);
        assert!(span.span_context().is_valid());
        assert!(span.span_context().is_remote());
    }
}
