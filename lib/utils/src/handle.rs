//! Lightweight handle types for shared ownership and weak parent references.
//!
//! Provide two complementary handle types:
//! - [Handle<T>] owns a strong reference to an object using [std::sync::Arc]. Use it where
//!   shared, long-lived ownership is required (for example device and bus nodes).
//!   There should be only one owning chain for a given node; references obtained by
//!   calling [HandleRef<T>::get] should be treated as temporary borrows of that ownership.
//! - [HandleRef<T>] stores a weak reference ([std::sync::Weak]) and is suitable for parent
//!   pointers or other non-owning references that must not keep the target alive.
//!
//! Key guarantees and semantics:
//! - Call [Handle::downgrade] to derive a [HandleRef] from an existing strong [Handle].
//! - Call [HandleRef::get] to attempt an upgrade; it returns [None] if every strong owner
//!   has dropped the object. **Consumers must handle the [None] case explicitly.**

use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Strong owning handle backed by [Arc<T>].
#[derive(Debug)]
pub struct Handle<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ?Sized> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: ?Sized> Handle<T> {
    /// Create a non-owning [HandleRef<T>] that refers to the same underlying object.
    ///
    /// The returned [HandleRef<T>] does not increment the strong reference count and
    /// must be upgraded with [HandleRef::get] before use. Use this to store parent
    /// pointers or other back-references without preventing the object from dropping.
    pub fn downgrade(&self) -> HandleRef<T> {
        HandleRef {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak (non-owning) handle backed by [Weak<T>].
#[derive(Debug)]
pub struct HandleRef<T: ?Sized> {
    inner: Weak<T>,
}

impl<T: ?Sized> Clone for HandleRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> HandleRef<T> {
    /// Attempt to upgrade the weak reference into a strong [Handle<T>].
    ///
    /// Returns `Some(Handle<T>)` if the target is still alive, otherwise `None`.
    pub fn get(&self) -> Option<Handle<T>> {
        self.inner.upgrade().map(|inner| Handle { inner })
    }
}
