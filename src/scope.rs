//! The per-request resource arena.
//!
//! The reference implementation hand-rolls a stack of `(pointer,
//! destructor)` pairs as a stand-in for scoped resources. Rust already
//! has that facility — `Drop` — so `RequestScope` leans on ownership for
//! the "release on all exit paths" guarantee, while still exposing
//! `add`/`collect`/`destroy` as an explicit API, because §8 of the
//! specification treats scoped-cleanup as a testable property in its own
//! right, not just an implementation detail.
//!
//! A null pointer has no equivalent in safe Rust, so "adding a null
//! pointer is a no-op" becomes `add(None)`. "Adding the same pointer
//! twice is a programming error, detected in debug builds" is realised by
//! tracking already-seen `Box` addresses under `cfg!(debug_assertions)`.

use std::any::Any;
use std::collections::HashSet;

#[derive(Default)]
pub struct RequestScope {
    items: Vec<Box<dyn Any + Send>>,
    #[cfg(debug_assertions)]
    seen: HashSet<usize>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `item` for release no later than the scope's end.
    /// `None` is a no-op, matching "adding a null pointer is a no-op".
    pub fn add(&mut self, item: Option<Box<dyn Any + Send>>) {
        let Some(item) = item else { return };

        #[cfg(debug_assertions)]
        {
            let addr = item.as_ref() as *const dyn Any as *const () as usize;
            assert!(
                self.seen.insert(addr),
                "RequestScope::add called twice with the same pointer"
            );
        }

        self.items.push(item);
    }

    /// Releases everything registered so far, in arbitrary order, and
    /// empties the scope. Can be called any number of times; a second
    /// call is a no-op.
    pub fn collect(&mut self) {
        self.items.clear();
        #[cfg(debug_assertions)]
        self.seen.clear();
    }

    /// Equivalent to `collect` followed by dropping the scope itself.
    pub fn destroy(mut self) {
        self.collect();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountsDrops(Arc<AtomicUsize>);

    impl Drop for CountsDrops {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn collect_drops_each_item_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scope = RequestScope::new();
        for _ in 0..5 {
            scope.add(Some(Box::new(CountsDrops(counter.clone()))));
        }
        assert_eq!(scope.len(), 5);
        scope.collect();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(scope.is_empty());
    }

    #[test]
    fn adding_none_is_a_no_op() {
        let mut scope = RequestScope::new();
        scope.add(None::<Box<dyn Any + Send>>);
        assert!(scope.is_empty());
    }

    #[test]
    fn drop_releases_everything_on_any_exit_path() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut scope = RequestScope::new();
            scope.add(Some(Box::new(CountsDrops(counter.clone()))));
            scope.add(Some(Box::new(CountsDrops(counter.clone()))));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn distinct_allocations_never_collide() {
        // Ownership makes the C contract's "same pointer added twice"
        // mistake unreachable in safe code: you cannot hand the same
        // `Box` to `add` twice without first getting it back. This just
        // confirms two distinct boxes are never treated as a collision.
        let mut scope = RequestScope::new();
        scope.add(Some(Box::new(1_i32) as Box<dyn Any + Send>));
        scope.add(Some(Box::new(2_i32) as Box<dyn Any + Send>));
        assert_eq!(scope.len(), 2);
    }
}
