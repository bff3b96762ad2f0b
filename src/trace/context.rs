//! Context extensions for tracing.
use crate::trace::{Span, SpanContext};
use crate::Context;
use std::sync::{Mutex, PoisonError};

static NOOP_SPAN: SynchronizedSpan = SynchronizedSpan {
    span_context: SpanContext::NONE,
    inner: None,
};

/// A reference to the currently active span in this context.
#[derive(Debug)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

pub(crate) struct SynchronizedSpan {
    /// Immutable span context
    span_context: SpanContext,
    /// Mutable span inner that requires synchronization
    inner: Option<Mutex<Box<dyn Span + Send>>>,
}

impl std::fmt::Debug for SynchronizedSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizedSpan")
            .field("span_context", &self.span_context)
            .finish()
    }
}

impl From<SpanContext> for SynchronizedSpan {
    fn from(value: SpanContext) -> Self {
        Self {
            span_context: value,
            inner: None,
        }
    }
}

impl<T: Span + Send + Sync + 'static> From<T> for SynchronizedSpan {
    fn from(value: T) -> Self {
        Self {
            span_context: value.span_context().clone(),
            inner: Some(Mutex::new(Box::new(value))),
        }
    }
}

impl SpanRef<'_> {
    fn with_inner_mut<F: FnOnce(&mut Box<dyn Span + Send>)>(&self, f: F) {
        if let Some(ref inner) = self.0.inner {
            f(&mut inner.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    /// A reference to the [`SpanContext`] for this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.0.span_context
    }

    /// Returns `true` if the underlying span is recording information.
    pub fn is_recording(&self) -> bool {
        self.0
            .inner
            .as_ref()
            .map(|inner| {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_recording()
            })
            .unwrap_or(false)
    }

    /// Record an event on the underlying span.
    pub fn add_event(&self, name: &str) {
        self.with_inner_mut(|inner| inner.add_event(name))
    }

    /// Signals that the operation described by this span has now ended.
    pub fn end(&self) {
        self.with_inner_mut(|inner| inner.end())
    }
}

/// Methods for storing and retrieving trace data in a [`Context`].
///
/// See [`Context`] for examples of setting and retrieving the current context.
pub trait TraceContextExt {
    /// Returns a clone of the current context with the included [`Span`].
    fn current_with_span<T: Span + Send + Sync + 'static>(span: T) -> Self;

    /// Returns a clone of this context with the included [`Span`].
    fn with_span<T: Span + Send + Sync + 'static>(&self, span: T) -> Self;

    /// Returns a reference to this context's span, or an invalid default span
    /// if none has been set.
    fn span(&self) -> SpanRef<'_>;

    /// Returns whether or not an active span has been set.
    fn has_active_span(&self) -> bool;

    /// Returns a copy of this context with the span context included.
    ///
    /// This is useful for building propagators.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;
}

impl TraceContextExt for Context {
    fn current_with_span<T: Span + Send + Sync + 'static>(span: T) -> Self {
        Context::current_with_synchronized_span(span.into())
    }

    fn with_span<T: Span + Send + Sync + 'static>(&self, span: T) -> Self {
        self.with_synchronized_span(span.into())
    }

    fn span(&self) -> SpanRef<'_> {
        if let Some(span) = self.span.as_ref() {
            SpanRef(span)
        } else {
            SpanRef(&NOOP_SPAN)
        }
    }

    fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_synchronized_span(span_context.into())
    }
}

impl SynchronizedSpan {
    pub(crate) fn span_context(&self) -> &SpanContext {
        &self.span_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{DefaultSpan, SpanId, TraceFlags, TraceId, TraceState};

    fn remote_context() -> SpanContext {
        SpanContext::remote(
            TraceId::from(0xdeadu128),
            SpanId::from(0xbeefu64),
            TraceFlags::SAMPLED,
            TraceState::NONE,
        )
    }

    #[test]
    fn context_without_span_yields_invalid_span_ref() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert_eq!(cx.span().span_context(), &SpanContext::NONE);
        assert!(!cx.span().is_recording());
    }

    #[test]
    fn with_remote_span_context_derives_a_new_context() {
        let cx = Context::new();
        let derived = cx.with_remote_span_context(remote_context());

        assert!(!cx.has_active_span());
        assert!(derived.has_active_span());
        assert_eq!(derived.span().span_context(), &remote_context());
    }

    #[test]
    fn with_span_stores_the_span_context() {
        let cx = Context::new().with_span(DefaultSpan::new(remote_context()));
        assert_eq!(cx.span().span_context(), &remote_context());
        assert!(!cx.span().is_recording());

        // Span operations on the stored stub are accepted and ignored.
        cx.span().add_event("an event");
        cx.span().end();
        assert_eq!(cx.span().span_context(), &remote_context());
    }
}
