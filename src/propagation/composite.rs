//! # Composite Propagator
//!
//! A utility over multiple [`TextMapPropagator`]s, grouping propagators for
//! different cross-cutting concerns so they can be driven as a single
//! entity.
use crate::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    Context,
};
use std::collections::HashSet;

/// Composite propagator for [`TextMapPropagator`]s.
///
/// Chains multiple [`TextMapPropagator`]s together, injecting and extracting
/// by their respective header names. The order of the propagators passed in
/// during initialization is preserved for both operations.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use tracecontext::propagation::{
///     TextMapCompositePropagator, TextMapPropagator, TraceContextPropagator,
/// };
///
/// let composite = TextMapCompositePropagator::new(vec![
///     Box::new(TraceContextPropagator::new()),
/// ]);
///
/// let mut carrier = HashMap::new();
/// carrier.insert(
///     "traceparent".to_string(),
///     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
/// );
///
/// let cx = composite.extract(&carrier);
///
/// let mut outbound = HashMap::new();
/// composite.inject_context(&cx, &mut outbound);
/// assert_eq!(outbound.get("traceparent"), carrier.get("traceparent"));
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a new propagator out of instances of [`TextMapPropagator`].
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut fields = HashSet::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                fields.insert(field.to_string());
            }
        }

        TextMapCompositePropagator {
            propagators,
            fields: fields.into_iter().collect(),
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    /// Encodes the values of the `Context` and injects them into the
    /// `Injector`, one propagator at a time.
    fn inject_context(&self, context: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    /// Retrieves encoded `Context` information using the `Extractor`. Each
    /// propagator derives the context in turn, so later propagators observe
    /// what earlier ones extracted.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::TraceContextPropagator;
    use crate::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
    use std::collections::HashMap;

    /// A test propagator that carries a single marker header.
    #[derive(Debug)]
    struct TestPropagator {
        fields: [String; 1],
    }

    impl TestPropagator {
        fn new(field: &str) -> Self {
            TestPropagator {
                fields: [field.to_string()],
            }
        }
    }

    #[derive(Debug, PartialEq)]
    struct Marker(String);

    impl TextMapPropagator for TestPropagator {
        fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
            if let Some(marker) = cx.get::<Marker>() {
                injector.set(&self.fields[0], marker.0.clone());
            }
        }

        fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
            match extractor.get(&self.fields[0]) {
                Some(value) => cx.with_value(Marker(value.to_string())),
                None => cx.clone(),
            }
        }

        fn fields(&self) -> FieldIter<'_> {
            FieldIter::new(&self.fields)
        }
    }

    fn composite() -> TextMapCompositePropagator {
        TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(TestPropagator::new("x-marker")),
        ])
    }

    #[test]
    fn extract_and_inject_through_all_propagators() {
        let propagator = composite();

        let mut carrier = HashMap::new();
        carrier.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        carrier.insert("x-marker".to_string(), "marked".to_string());

        let cx = propagator.extract(&carrier);
        assert!(cx.span().span_context().is_valid());
        assert_eq!(cx.get::<Marker>(), Some(&Marker("marked".to_string())));

        let mut outbound = HashMap::new();
        propagator.inject_context(&cx, &mut outbound);
        assert_eq!(outbound, carrier);
    }

    #[test]
    fn later_propagators_observe_earlier_extractions() {
        // The span extracted by the first propagator is visible to the
        // second one while it runs.
        #[derive(Debug)]
        struct SpanObserver {
            fields: [String; 0],
        }

        impl TextMapPropagator for SpanObserver {
            fn inject_context(&self, _cx: &Context, _injector: &mut dyn Injector) {}

            fn extract_with_context(&self, cx: &Context, _extractor: &dyn Extractor) -> Context {
                cx.with_value(Marker(cx.span().span_context().trace_id().to_string()))
            }

            fn fields(&self) -> FieldIter<'_> {
                FieldIter::new(&self.fields)
            }
        }

        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(SpanObserver { fields: [] }),
        ]);

        let mut carrier = HashMap::new();
        carrier.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );

        let cx = propagator.extract(&carrier);
        assert_eq!(
            cx.get::<Marker>(),
            Some(&Marker("4bf92f3577b34da6a3ce929d0e0e4736".to_string()))
        );
    }

    #[test]
    fn fields_are_the_union_of_all_propagators() {
        let propagator = composite();
        let mut fields = propagator.fields().collect::<Vec<_>>();
        fields.sort_unstable();
        assert_eq!(fields, vec!["traceparent", "tracestate", "x-marker"]);
    }

    #[test]
    fn injecting_an_invalid_span_leaves_trace_headers_out() {
        let propagator = composite();
        let cx = Context::new()
            .with_remote_span_context(SpanContext::remote(
                TraceId::INVALID,
                SpanId::INVALID,
                TraceFlags::default(),
                TraceState::NONE,
            ))
            .with_value(Marker("still here".to_string()));

        let mut outbound = HashMap::new();
        propagator.inject_context(&cx, &mut outbound);
        assert_eq!(outbound.get("traceparent"), None);
        assert_eq!(outbound.get("x-marker"), Some(&"still here".to_string()));
    }
}
