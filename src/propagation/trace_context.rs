//! # W3C Trace Context Propagator
//!

use crate::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    trace::{DefaultSpan, SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use std::sync::OnceLock;

const SUPPORTED_VERSION: u8 = 0;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

/// Total length of a `traceparent` value:
/// `version "-" trace-id "-" span-id "-" trace-flags` = 2 + 1 + 32 + 1 + 16 + 1 + 2.
const TRACEPARENT_LEN: usize = 55;

// Byte offsets of the three `-` delimiters in the fixed-width header.
const DELIMITER_OFFSETS: [usize; 3] = [2, 35, 52];

static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 2] {
    TRACE_CONTEXT_HEADER_FIELDS
        .get_or_init(|| [TRACEPARENT_HEADER.to_owned(), TRACESTATE_HEADER.to_owned()])
}

/// Propagates [`SpanContext`]s in [W3C TraceContext] format under the
/// `traceparent` and `tracestate` headers.
///
/// The `traceparent` header carries the identity of the calling request in a
/// common format understood by all vendors:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// It has four fields: version, trace-id, parent-id and trace-flags, each
/// fixed-width lowercase base16. Parsing is strict: a value that deviates
/// from the grammar in any way yields the invalid span context, never a
/// partial one.
///
/// The `tracestate` header carries vendor-specific data alongside:
///
/// `tracestate: vendorname1=opaqueValue1,vendorname2=opaqueValue2`
///
/// Parsing of `tracestate` is tolerant (damaged list members are dropped
/// rather than invalidating the context), since a bad `tracestate` must not
/// prevent propagation of a well-formed `traceparent`.
///
/// See the [w3c trace-context docs] for more details.
///
/// [w3c trace-context docs]: https://w3c.github.io/trace-context/
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from the w3c trace-context headers.
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).unwrap_or("");
        let bytes = header_value.as_bytes();

        // An absent header and a malformed one are indistinguishable to the
        // caller: both must yield the invalid context. The length check also
        // rejects any future-version value carrying trailing data.
        if bytes.len() != TRACEPARENT_LEN {
            return Err(());
        }
        if DELIMITER_OFFSETS.iter().any(|&offset| bytes[offset] != b'-') {
            return Err(());
        }

        // Delimiters verified above are single-byte, so these slices cannot
        // split a UTF-8 sequence.
        let version = &header_value[0..2];
        if !is_lower_hex(version) || version == "ff" {
            return Err(());
        }

        let trace_id = TraceId::from_hex(&header_value[3..35]).map_err(|_| ())?;
        let span_id = SpanId::from_hex(&header_value[36..52]).map_err(|_| ())?;

        // Reserved flag bits are carried through untouched for downstream
        // propagation.
        let trace_flags = TraceFlags::from_hex(&header_value[53..55]).map_err(|_| ())?;

        if !trace_id.is_valid() || !span_id.is_valid() {
            return Err(());
        }

        let trace_state = match extractor.get(TRACESTATE_HEADER) {
            Some(trace_state_header) if !trace_state_header.is_empty() => {
                extract_trace_state(trace_state_header)
            }
            _ => TraceState::NONE,
        };

        Ok(SpanContext::remote(
            trace_id,
            span_id,
            trace_flags,
            trace_state,
        ))
    }
}

/// Tolerant `tracestate` parse.
///
/// Members are split on `,` with tab/space padding trimmed. Empty members
/// (including one left by a trailing comma) and members whose key or value
/// fail the W3C grammar are dropped silently. Surviving members are inserted
/// in encounter order, a duplicate key updating its earlier position. A
/// header that would exceed [`TraceState::MAX_MEMBERS`] accepted members is
/// discarded wholesale, equivalent to no `tracestate` at all.
fn extract_trace_state(header: &str) -> TraceState {
    let mut trace_state = TraceState::NONE;
    for member in header.split(',') {
        let member = member.trim_matches(|c| c == ' ' || c == '\t');
        if member.is_empty() {
            continue;
        }
        let Some((key, value)) = member.split_once('=') else {
            continue;
        };
        if !TraceState::is_valid_key(key) || !TraceState::is_valid_value(value) {
            continue;
        }
        if trace_state.get(key).is_none() && trace_state.len() == TraceState::MAX_MEMBERS {
            return TraceState::NONE;
        }
        trace_state.set(key, value);
    }
    trace_state
}

impl TextMapPropagator for TraceContextPropagator {
    /// Properly encodes the values of the `SpanContext` and injects them
    /// into the `Injector`.
    ///
    /// An invalid span context is not propagated: nothing is written. The
    /// `tracestate` header is only written when the trace state is
    /// non-empty.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags(),
            );
            injector.set(TRACEPARENT_HEADER, header_value);

            if !span_context.trace_state().is_empty() {
                injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
            }
        }
    }

    /// Retrieves encoded `SpanContext`s using the `Extractor` and returns a
    /// context derived from `cx` carrying the result under the current-span
    /// slot: the extracted remote context when the headers parse, the
    /// invalid placeholder otherwise. The input context is not mutated.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Ok(span_context) => cx.with_remote_span_context(span_context),
            Err(()) => cx.with_span(DefaultSpan::INVALID),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}
