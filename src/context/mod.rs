//! Execution-scoped context propagation.
//!
//! A [`Context`] is an immutable, execution-scoped collection of values:
//! cross-cutting concerns store their state in it and read it back further
//! down the call stack, without threading extra parameters through every
//! signature. Write operations return a new context sharing structure with
//! the original, so readers holding an earlier snapshot are never affected
//! by later writers.
//!
//! A context can be made *current* for the calling thread with
//! [`attach`], and the previous context is restored when the returned
//! [`ContextGuard`] is dropped.
//!
//! [`attach`]: Context::attach()

use crate::tracecontext_warn;
use crate::trace::context::SynchronizedSpan;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "futures")]
mod future_ext;

#[cfg(feature = "futures")]
pub use future_ext::{FutureExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// An execution-scoped collection of values.
///
/// Values are keyed by their type, so application-specific newtypes are the
/// recommended way to store state without clobbering anyone else's entries.
/// The currently active span travels in a dedicated slot written through
/// [`TraceContextExt`].
///
/// `Context`s are immutable; write operations produce a new context
/// containing the original entries plus the new one.
///
/// [`TraceContextExt`]: crate::trace::TraceContextExt
///
/// # Examples
///
/// ```
/// use tracecontext::Context;
///
/// // Application-specific `a` and `b` values
/// #[derive(Debug, PartialEq)]
/// struct ValueA(&'static str);
/// #[derive(Debug, PartialEq)]
/// struct ValueB(u64);
///
/// let _outer_guard = Context::new().with_value(ValueA("a")).attach();
///
/// // Only value a has been set
/// let current = Context::current();
/// assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(current.get::<ValueB>(), None);
///
/// {
///     let _inner_guard = Context::current_with_value(ValueB(42)).attach();
///     // Both values are set in inner context
///     let current = Context::current();
///     assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
///     assert_eq!(current.get::<ValueB>(), Some(&ValueB(42)));
/// }
///
/// // Resets to only the `a` value when inner guard is dropped
/// let current = Context::current();
/// assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(current.get::<ValueB>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Arc<SynchronizedSpan>>,
    entries: Option<Arc<EntryMap>>,
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>;

impl Context {
    /// Creates an empty `Context`.
    ///
    /// An empty context does not allocate; use [`with_value`] to derive a
    /// context that holds entries.
    ///
    /// [`with_value`]: Context::with_value()
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context returning its value.
    ///
    /// This avoids cloning the current context when a snapshot is not
    /// actually needed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| cx.borrow().map_current_cx(f))
    }

    /// Returns a clone of the current thread's context with the given value.
    ///
    /// This is a more efficient form of `Context::current().with_value(value)`
    /// as it avoids the intermediate context clone.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Self::map_current(|cx| cx.with_value(value))
    }

    /// Returns a reference to the entry for the corresponding value type.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracecontext::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    /// #[derive(Debug, PartialEq)]
    /// struct ValueB(u64);
    ///
    /// let cx = Context::new().with_value(ValueA("a"));
    ///
    /// assert_eq!(cx.get::<ValueA>(), Some(&ValueA("a")));
    /// assert_eq!(cx.get::<ValueB>(), None);
    /// ```
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of the context with the new value included.
    ///
    /// The original context is unchanged; both contexts share the entries
    /// they have in common.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let entries = if let Some(current_entries) = &self.entries {
            let mut inner_entries = (**current_entries).clone();
            inner_entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(inner_entries))
        } else {
            let mut entries = EntryMap::default();
            entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(entries))
        };
        Context {
            entries,
            span: self.span.clone(),
        }
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] resets the current context to
    /// its previous value. Guards may be dropped out of order; the thread's
    /// current context only changes when the most recently attached guard
    /// goes away.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracecontext::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    ///
    /// let my_cx = Context::new().with_value(ValueA("a"));
    ///
    /// // Set the current thread context
    /// let cx_guard = my_cx.attach();
    /// assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA("a")));
    ///
    /// // Drop the guard to restore the previous context
    /// drop(cx_guard);
    /// assert_eq!(Context::current().get::<ValueA>(), None);
    /// ```
    pub fn attach(self) -> ContextGuard {
        let cx_pos = CURRENT_CONTEXT.with(|cx| cx.borrow_mut().push(self));

        ContextGuard {
            cx_pos,
            _marker: PhantomData,
        }
    }

    pub(crate) fn current_with_synchronized_span(value: SynchronizedSpan) -> Self {
        Self::map_current(|cx| Context {
            span: Some(Arc::new(value)),
            entries: cx.entries.clone(),
        })
    }

    pub(crate) fn with_synchronized_span(&self, value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: self.entries.clone(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Context");
        match &self.span {
            Some(span) => dbg.field("span", span.span_context()),
            None => dbg.field("span", &"None"),
        };

        dbg.field(
            "entries",
            &self.entries.as_ref().map_or(0, |entries| entries.len()),
        )
        .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    // Position of the attached context in the stack, used to pop it.
    cx_pos: u16,
    // Ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let id = self.cx_pos;
        if id > ContextStack::BASE_POS && id < ContextStack::MAX_POS {
            CURRENT_CONTEXT.with(|context_stack| context_stack.borrow_mut().pop_id(id));
        }
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher holds the u64
/// of the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

/// A stack for keeping track of the [`Context`] instances attached to a
/// thread.
///
/// Popping is by position, so [`ContextGuard`] instances may be dropped out
/// of order: only when the top of the stack is popped does the thread's
/// current context actually change.
///
/// The stack relies on being thread local: guards constructed from its ids
/// can't move to other threads, so the ids stay valid and in bounds.
struct ContextStack {
    /// The current [`Context`] active on this thread: the top of the stack,
    /// kept out of `stack` for fast access.
    current_cx: Context,
    /// The other contexts that have been attached to the thread, with
    /// out-of-order popped slots cleared to `None`.
    stack: Vec<Option<Context>>,
    /// Ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, cx: Context) -> u16 {
        // The next id is the length of the stack, plus one for the top of
        // the stack held in `current_cx`.
        let next_id = self.stack.len() + 1;
        if next_id < ContextStack::MAX_POS.into() {
            let current_cx = std::mem::replace(&mut self.current_cx, cx);
            self.stack.push(Some(current_cx));
            next_id as u16
        } else {
            tracecontext_warn!(
                name: "Context.AttachFailed",
                message = format!("Too many attached contexts, max is {}. \
                  Context::current() remains unchanged as this attach failed. \
                  Dropping the returned ContextGuard will have no impact on Context::current().",
                  ContextStack::MAX_POS)
            );
            ContextStack::MAX_POS
        }
    }

    #[inline(always)]
    fn pop_id(&mut self, pos: u16) {
        if pos == ContextStack::BASE_POS || pos == ContextStack::MAX_POS {
            // The base context can never be popped and the overflow position
            // is not a real attachment.
            tracecontext_warn!(
                name: "Context.OutOfOrderDrop",
                position = pos,
                message = if pos == ContextStack::BASE_POS {
                    "Attempted to pop the base context which is not allowed"
                } else {
                    "Attempted to pop the overflow position which is not allowed"
                }
            );
            return;
        }
        let len: u16 = self.stack.len() as u16;
        // Are we at the top of the stack?
        if pos == len {
            // Shrink the stack if possible to clear out any out of order pops.
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            // Restore the previous context. This will always happen since the
            // base context sits at the bottom of a non-empty stack.
            if let Some(Some(next_cx)) = self.stack.pop() {
                self.current_cx = next_cx;
            }
        } else {
            // This is an out of order pop.
            if pos >= len {
                // This is an invalid id, ignore it.
                tracecontext_warn!(
                    name: "Context.PopOutOfBounds",
                    position = pos,
                    stack_length = len,
                    message = "Attempted to pop beyond the end of the context stack"
                );
                return;
            }
            // Clear out the entry at the given id.
            _ = self.stack[pos as usize].take();
        }
    }

    #[inline(always)]
    fn map_current_cx<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.current_cx)
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(u64);

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct Outer(u8);
        #[derive(Debug, PartialEq)]
        struct Inner(u8);

        let _outer = Context::new().with_value(Outer(1)).attach();
        {
            let _inner = Context::current_with_value(Inner(2)).attach();
            assert_eq!(Context::current().get(), Some(&Outer(1)));
            assert_eq!(Context::current().get(), Some(&Inner(2)));
        }
        assert_eq!(Context::current().get(), Some(&Outer(1)));
        assert_eq!(Context::current().get::<Inner>(), None);
    }

    #[test]
    fn with_value_leaves_the_original_untouched() {
        let cx_with_a = Context::new().with_value(ValueA(1));
        let cx_with_a_and_b = cx_with_a.with_value(ValueB(2));

        assert_eq!(cx_with_a.get(), Some(&ValueA(1)));
        assert_eq!(cx_with_a.get::<ValueB>(), None);

        assert_eq!(cx_with_a_and_b.get(), Some(&ValueA(1)));
        assert_eq!(cx_with_a_and_b.get(), Some(&ValueB(2)));
    }

    #[test]
    fn overwriting_a_value_type_replaces_the_entry() {
        let cx = Context::new().with_value(ValueA(1)).with_value(ValueA(2));
        assert_eq!(cx.get(), Some(&ValueA(2)));
    }

    #[test]
    fn out_of_order_guard_drops() {
        let guard_a = Context::new().with_value(ValueA(1)).attach();
        let guard_b = Context::current_with_value(ValueB(2)).attach();

        // Dropping the older guard first must not disturb the current context.
        drop(guard_a);
        assert_eq!(Context::current().get(), Some(&ValueB(2)));

        drop(guard_b);
        assert_eq!(Context::current().get::<ValueA>(), None);
        assert_eq!(Context::current().get::<ValueB>(), None);
    }

    #[test]
    fn empty_context_has_no_entries() {
        let cx = Context::new();
        assert_eq!(cx.get::<ValueA>(), None);
        assert!(!format!("{:?}", cx).is_empty());
    }
}
