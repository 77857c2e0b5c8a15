//! Path tracing and node-level error enrichment
//!
//! The path-trace stack lives in a thread-local so concurrent runs never see each
//! other's frames. Frames are pushed and popped in strict LIFO order by
//! [`TraceGuard`], including when a node fails.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use super::types::{from_fn, Callable};
use std::cell::RefCell;

thread_local! {
    static PATH: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Keeps one frame on the path-trace stack for as long as it lives
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct TraceGuard {
    depth: usize,
}

impl TraceGuard {
    pub fn enter(segment: impl Into<String>) -> Self {
        PATH.with(|path| {
            let mut path = path.borrow_mut();
            path.push(segment.into());
            TraceGuard {
                depth: path.len() - 1,
            }
        })
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        PATH.with(|path| path.borrow_mut().truncate(self.depth));
    }
}

/// Current frames, outermost first
pub fn snapshot() -> Vec<String> {
    PATH.with(|path| path.borrow().clone())
}

/// Wrap a leaf callable so failures carry the node's name.
///
/// While path tracing is on, `name` is on the stack for the duration of the call and
/// the stack is copied into the error. The origin slot and path are only filled if a
/// nested node has not filled them already.
pub fn instrument(name: String, inner: Callable) -> Callable {
    from_fn(move |value, scope| {
        let _frame = scope.trace_paths.then(|| TraceGuard::enter(name.as_str()));
        inner(value, scope).map_err(|err| {
            err.map_processing(|e| {
                e.set_origin_if_absent(&name);
                if scope.trace_paths {
                    e.set_path_if_absent(snapshot());
                }
            })
        })
    })
}
