use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A shared, observable setting value.
///
/// Clones share the same value. Listeners run on the thread calling [`LiveValue::set`], after
/// the new value is visible to [`LiveValue::get`], and only when the value actually changed.
pub struct LiveValue<T> {
    inner: Arc<LiveInner<T>>,
}

struct LiveInner<T> {
    value: RwLock<T>,
    next_listener_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
}

impl<T> Clone for LiveValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> LiveValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(LiveInner {
                value: RwLock::new(value),
                next_listener_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Stores `value`, returning `true` if it differs from the previous one.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }

        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&value);
        }
        true
    }

    /// Registers `listener` until the returned subscription is dropped.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> LiveValueSubscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<LiveInner<T>> = Arc::downgrade(&self.inner);
        LiveValueSubscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(other, _)| *other != id);
                }
            })),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LiveValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LiveValue")
            .field(&*self.inner.value.read())
            .finish()
    }
}

/// Keeps a [`LiveValue`] listener registered while alive.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct LiveValueSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl LiveValueSubscription {
    /// Keep the listener registered for the lifetime of the value.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl std::fmt::Debug for LiveValueSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveValueSubscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

impl Drop for LiveValueSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
