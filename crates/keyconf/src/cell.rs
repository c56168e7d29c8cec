//! The typed value cell and its nil-safe handle.
//!
//! A [`TypedValue`] holds one configuration value. Any number of threads may
//! read it while another replaces it with [`TypedValue::update`]; readers see
//! either the old or the new value, never a mix. Registered watch callbacks
//! run after the swap, in registration order, outside the write lock.
//!
//! Lookups return a [`ValueRef`], which may be empty. Its accessors return the
//! zero value of their type when empty, so call sites never need to match.
//!
//! ```rust
//! use keyconf::{TypedValue, ValueRef, watch_fn};
//! use std::sync::Arc;
//!
//! let cell = Arc::new(TypedValue::new(8080, "port"));
//! cell.add_watch_callbacks([watch_fn(|old, new| {
//!     println!("port: {} -> {}", old.as_int(), new.as_int());
//!     Ok(())
//! })]);
//!
//! assert!(cell.update(9090));
//! assert_eq!(cell.as_int(), 9090);
//!
//! let missing = ValueRef::none();
//! assert_eq!(missing.as_int(), 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::convert::convert;
use crate::error::CallbackError;
use crate::source::Origin;
use crate::value::{ConfigValue, ValueType};

/// Change-notification callback.
///
/// Called with a snapshot of the cell before the update and the live cell,
/// which already holds the new value.
pub type WatchFn =
    Arc<dyn Fn(&TypedValue, &TypedValue) -> Result<(), CallbackError> + Send + Sync>;

/// Wraps a closure as a [`WatchFn`].
pub fn watch_fn<F>(f: F) -> WatchFn
where
    F: Fn(&TypedValue, &TypedValue) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Generates the typed accessors of [`TypedValue`].
macro_rules! typed_accessors {
    ($($method:ident -> $t:ty => $variant:ident),+ $(,)?) => {
        $(
            #[doc = concat!(
                "Returns the value as `", stringify!($t), "`.\n\n",
                "On a type mismatch this logs a warning and returns the zero value."
            )]
            #[must_use]
            pub fn $method(&self) -> $t {
                self.typed(ValueType::$variant, |value| match value {
                    ConfigValue::$variant(v) => Some(v.clone()),

                    _ => None,
                })
            }
        )+
    };
}

/// Forwards accessors from [`ValueRef`] to the cell, with zero-value fallback.
macro_rules! forward_accessors {
    ($($method:ident -> $t:ty),+ $(,)?) => {
        $(
            #[doc = concat!(
                "See [`TypedValue::", stringify!($method), "`]. Empty refs return the zero value."
            )]
            #[must_use]
            pub fn $method(&self) -> $t {
                self.0.as_ref().map_or_else(<$t>::default, |cell| cell.$method())
            }
        )+
    };
}

struct Inner {
    value: ConfigValue,
    callbacks: Vec<WatchFn>,
}

/// A named, concurrently readable, replaceable configuration value.
///
/// # Locking
///
/// Value and callback list share one [`parking_lot::RwLock`]. Accessors take
/// it with `read_recursive`, so a callback may read the cell that is
/// notifying it. A callback must not call [`update`](Self::update) or
/// [`add_watch_callbacks`](Self::add_watch_callbacks) on that same cell;
/// both need the write lock and would deadlock.
pub struct TypedValue {
    key: String,
    origin: Origin,
    inner: RwLock<Inner>,
    watch: AtomicBool,
    epoch: AtomicU64,
}

impl TypedValue {
    /// Creates a cell holding `value` for `key`.
    pub fn new(value: impl Into<ConfigValue>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            origin: Origin::Runtime,
            inner: RwLock::new(Inner {
                value: value.into(),
                callbacks: Vec::new(),
            }),
            watch: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Sets where the initial value came from.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// The configuration key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Where the initial value came from.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The type of the value currently held.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.inner.read_recursive().value.value_type()
    }

    /// A clone of the current value.
    #[must_use]
    pub fn get(&self) -> ConfigValue {
        self.inner.read_recursive().value.clone()
    }

    /// Reads the current value via a closure, without cloning it.
    pub fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&ConfigValue) -> R,
    {
        let guard = self.inner.read_recursive();
        f(&guard.value)
    }

    /// A copy of the key, origin and current value, without callbacks.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self::new(self.get(), self.key.clone()).with_origin(self.origin.clone())
    }

    fn typed<T, F>(&self, expected: ValueType, pick: F) -> T
    where
        T: Default,
        F: FnOnce(&ConfigValue) -> Option<T>,
    {
        let guard = self.inner.read_recursive();
        if let Some(value) = pick(&guard.value) {
            return value;
        }

        tracing::warn!(
            key = %self.key,
            value = %guard.value,
            actual = %guard.value.value_type(),
            %expected,
            "invalid value type"
        );
        T::default()
    }

    typed_accessors! {
        as_string -> String => String,
        as_int -> i64 => Int,
        as_float -> f64 => Float,
        as_bool -> bool => Bool,
        as_duration -> Duration => Duration,
        as_int_map -> HashMap<String, i64> => IntMap,
    }

    /// Replaces the value and notifies watchers.
    ///
    /// The swap happens under the write lock. Callbacks then run in
    /// registration order, each under a read lock, receiving a snapshot of
    /// the previous state and this cell. A callback error is logged and the
    /// remaining callbacks still run.
    ///
    /// Returns `false`, without changing anything, when `new_value` is a
    /// different type than the current value.
    pub fn update(&self, new_value: impl Into<ConfigValue>) -> bool {
        let new_value = new_value.into();

        let (old, callbacks) = {
            let mut guard = self.inner.write();

            if !guard.value.same_variant(&new_value) {
                let expected = guard.value.value_type();
                drop(guard);
                tracing::warn!(
                    key = %self.key,
                    %expected,
                    actual = %new_value.value_type(),
                    "rejected update with mismatched type"
                );
                return false;
            }

            let old_value = std::mem::replace(&mut guard.value, new_value);
            self.epoch.fetch_add(1, Ordering::Release);

            let old = Self::new(old_value, self.key.clone()).with_origin(self.origin.clone());
            (old, guard.callbacks.clone())
        };

        for callback in &callbacks {
            let _guard = self.inner.read_recursive();
            if let Err(error) = callback(&old, self) {
                tracing::error!(key = %self.key, %error, "update config");
            }
        }

        true
    }

    /// Converts `raw` with the current value type, then [`update`](Self::update)s.
    ///
    /// Returns `false` if conversion fails (logged) or the update is rejected.
    pub fn update_from_str(&self, raw: &str) -> bool {
        match convert(raw, &self.value_type()) {
            Some(value) => self.update(value),

            None => false,
        }
    }

    /// Marks the cell as watched. Idempotent.
    pub fn start_watch(&self) {
        self.watch.store(true, Ordering::Release);
    }

    /// Returns `true` once [`start_watch`](Self::start_watch) was called.
    #[must_use]
    pub fn is_watch_started(&self) -> bool {
        self.watch.load(Ordering::Acquire)
    }

    /// Appends callbacks, keeping any already registered.
    pub fn add_watch_callbacks<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = WatchFn>,
    {
        self.inner.write().callbacks.extend(callbacks);
    }

    /// Appends a single callback closure.
    pub fn add_watch_callback<F>(&self, f: F)
    where
        F: Fn(&Self, &Self) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.add_watch_callbacks([watch_fn(f)]);
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.inner.read_recursive().callbacks.len()
    }

    /// Incremented by every applied update.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Returns `true` if the value was updated since `epoch` was read.
    #[must_use]
    pub fn has_changed_since(&self, epoch: u64) -> bool {
        self.epoch() != epoch
    }
}

// Manual Debug impl: callbacks are opaque
impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read_recursive();
        f.debug_struct("TypedValue")
            .field("key", &self.key)
            .field("value", &guard.value)
            .field("origin", &self.origin)
            .field("callbacks", &guard.callbacks.len())
            .field("watch", &self.is_watch_started())
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// Result of a lookup: a shared cell, or nothing.
///
/// All accessors are safe on an empty ref and return zero values.
#[derive(Clone, Debug, Default)]
pub struct ValueRef(Option<Arc<TypedValue>>);

impl ValueRef {
    /// An empty ref.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Returns `true` if the lookup found a cell.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        self.0.is_some()
    }

    /// Returns `true` if the lookup found nothing.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The underlying cell, if any.
    #[must_use]
    pub const fn cell(&self) -> Option<&Arc<TypedValue>> {
        self.0.as_ref()
    }

    /// Consumes the ref, returning the underlying cell.
    #[must_use]
    pub fn into_inner(self) -> Option<Arc<TypedValue>> {
        self.0
    }

    /// The key, if a cell is present.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.0.as_deref().map(TypedValue::key)
    }

    /// A clone of the current value, if a cell is present.
    #[must_use]
    pub fn get(&self) -> Option<ConfigValue> {
        self.0.as_deref().map(TypedValue::get)
    }

    forward_accessors! {
        as_string -> String,
        as_int -> i64,
        as_float -> f64,
        as_bool -> bool,
        as_duration -> Duration,
        as_int_map -> HashMap<String, i64>,
        is_watch_started -> bool,
        epoch -> u64,
    }

    /// See [`TypedValue::update`]. No-op returning `false` on an empty ref.
    pub fn update(&self, new_value: impl Into<ConfigValue>) -> bool {
        self.0.as_ref().is_some_and(|cell| cell.update(new_value))
    }

    /// See [`TypedValue::start_watch`]. No-op on an empty ref.
    pub fn start_watch(&self) {
        if let Some(cell) = &self.0 {
            cell.start_watch();
        }
    }

    /// See [`TypedValue::add_watch_callbacks`]. No-op on an empty ref.
    pub fn add_watch_callbacks<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = WatchFn>,
    {
        if let Some(cell) = &self.0 {
            cell.add_watch_callbacks(callbacks);
        }
    }
}

impl From<Arc<TypedValue>> for ValueRef {
    fn from(cell: Arc<TypedValue>) -> Self {
        Self(Some(cell))
    }
}

impl From<Option<Arc<TypedValue>>> for ValueRef {
    fn from(cell: Option<Arc<TypedValue>>) -> Self {
        Self(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_accessors_match() {
        assert_eq!(TypedValue::new("str", "k").as_string(), "str");
        assert_eq!(TypedValue::new(2, "k").as_int(), 2);
        assert!((TypedValue::new(1.1, "k").as_float() - 1.1).abs() < f64::EPSILON);
        assert!(TypedValue::new(true, "k").as_bool());
        assert_eq!(
            TypedValue::new(Duration::from_secs(60), "k").as_duration(),
            Duration::from_secs(60)
        );

        let map = HashMap::from([("a".to_string(), 1)]);
        assert_eq!(TypedValue::new(map.clone(), "k").as_int_map(), map);
    }

    #[test]
    fn test_accessors_mismatch_return_zero() {
        let cell = TypedValue::new("not a number", "k");
        assert_eq!(cell.as_int(), 0);
        assert_eq!(cell.as_float(), 0.0);
        assert!(!cell.as_bool());
        assert_eq!(cell.as_duration(), Duration::ZERO);
        assert!(cell.as_int_map().is_empty());

        let cell = TypedValue::new(5, "k");
        assert_eq!(cell.as_string(), "");
    }

    #[test]
    fn test_empty_ref_is_zero() {
        let r = ValueRef::none();
        assert!(r.is_none());
        assert_eq!(r.key(), None);
        assert_eq!(r.as_string(), "");
        assert_eq!(r.as_int(), 0);
        assert_eq!(r.as_float(), 0.0);
        assert!(!r.as_bool());
        assert_eq!(r.as_duration(), Duration::ZERO);
        assert!(r.as_int_map().is_empty());
        assert!(!r.is_watch_started());
        assert!(!r.update(1));
        r.start_watch();
        r.add_watch_callbacks([watch_fn(|_, _| Ok(()))]);
    }

    #[test]
    fn test_update_notifies_in_order() {
        let cell = TypedValue::new(1, "counter");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let seen = Arc::clone(&seen);
            cell.add_watch_callback(move |old, new| {
                seen.lock().unwrap().push((id, old.as_int(), new.as_int()));
                Ok(())
            });
        }

        assert!(cell.update(2));
        assert_eq!(cell.as_int(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(0, 1, 2), (1, 1, 2), (2, 1, 2)]);
    }

    #[test]
    fn test_callback_error_does_not_abort() {
        let cell = TypedValue::new("a", "k");
        let calls = Arc::new(Mutex::new(0));

        cell.add_watch_callback(|_, _| Err("boom".into()));
        let c = Arc::clone(&calls);
        cell.add_watch_callback(move |_, _| {
            *c.lock().unwrap() += 1;
            Ok(())
        });

        assert!(cell.update("b"));
        assert_eq!(cell.as_string(), "b");
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_update_rejects_other_variant() {
        let cell = TypedValue::new(1, "k");
        let epoch = cell.epoch();

        assert!(!cell.update("one"));
        assert_eq!(cell.as_int(), 1);
        assert!(!cell.has_changed_since(epoch));
    }

    #[test]
    fn test_update_from_str() {
        let cell = TypedValue::new(Duration::from_secs(1), "timeout");
        assert!(cell.update_from_str("2s"));
        assert_eq!(cell.as_duration(), Duration::from_secs(2));
        assert!(!cell.update_from_str("soon"));
        assert_eq!(cell.as_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_epoch_and_watch_flag() {
        let cell = TypedValue::new(false, "k");
        assert_eq!(cell.epoch(), 0);
        cell.update(true);
        assert!(cell.has_changed_since(0));

        assert!(!cell.is_watch_started());
        cell.start_watch();
        cell.start_watch();
        assert!(cell.is_watch_started());
    }

    #[test]
    fn test_snapshot_has_no_callbacks() {
        let cell = TypedValue::new(3, "k").with_origin(Origin::Default);
        cell.add_watch_callback(|_, _| Ok(()));

        let snap = cell.snapshot();
        assert_eq!(snap.as_int(), 3);
        assert_eq!(snap.origin(), &Origin::Default);
        assert_eq!(snap.callback_count(), 0);
    }
}
