//! # Text propagator
//!
//! [`TextMapPropagator`] is the interface shared by propagators that read
//! and write text key/value pairs on a carrier, such as HTTP headers.
use crate::{
    propagation::{Extractor, Injector},
    Context,
};
use std::fmt::Debug;
use std::slice;

/// Methods to inject and extract a value as text into carriers that travel
/// in-band across process boundaries.
///
/// Implementations are stateless: injection and extraction are pure
/// functions of the given context and carrier, so a single propagator value
/// may be shared freely between threads.
pub trait TextMapPropagator: Debug {
    /// Properly encodes the values of the current [`Context`] and injects
    /// them into the [`Injector`].
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Properly encodes the values of the [`Context`] and injects them into
    /// the [`Injector`].
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Retrieves encoded data using the provided [`Extractor`]. If no data
    /// for this format was retrieved OR if the retrieved data is invalid,
    /// then the current [`Context`] is derived with an invalid placeholder
    /// rather than failing.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// Retrieves encoded data using the provided [`Extractor`] and derives a
    /// new context from `cx` carrying it. The given context is never
    /// mutated.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Returns iter of fields used by [`TextMapPropagator`].
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the header names a propagator reads and writes.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of header names.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
