//! Event primitives used throughout the crate instead of a dynamic
//! string-keyed event bus: a struct holds named [`OneShot`]/[`Many`] fields
//! directly, and binding/firing is generic over the payload type.
use crate::errors::ErrorKind;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::error;

/// A bound event listener. Returning `Err` from a `pre_request` listener
/// aborts the request; elsewhere the error is logged and ignored.
pub type Listener<T> = Arc<dyn Fn(&T) -> Result<(), ErrorKind> + Send + Sync>;

/// Convenience for listener bodies that want to abort the request they are
/// reacting to, e.g. `hub.pre_request.bind(Arc::new(|_| abort_request()))`.
pub fn abort_request() -> Result<(), ErrorKind> {
    Err(ErrorKind::AbortEvent)
}

struct OneShotInner<T> {
    result: Option<T>,
    listeners: Vec<Listener<T>>,
}

/// Fires at most once. A listener bound after firing is invoked immediately
/// with the stored result, exactly as if it had been bound before the fire.
pub struct OneShot<T> {
    inner: Mutex<OneShotInner<T>>,
    notify: Notify,
}

impl<T: Clone + Send + Sync + 'static> OneShot<T> {
    pub fn new() -> Self {
        OneShot {
            inner: Mutex::new(OneShotInner {
                result: None,
                listeners: Vec::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn fired(&self) -> bool {
        self.inner.lock().unwrap().result.is_some()
    }

    pub fn bind(&self, listener: Listener<T>) {
        let late = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.result {
                Some(result) => Some(result.clone()),
                None => {
                    inner.listeners.push(listener.clone());
                    None
                }
            }
        };
        if let Some(result) = late {
            if let Err(err) = listener(&result) {
                error!(?err, "one-shot listener failed on late bind");
            }
        }
    }

    /// Fires the event. A second call is a no-op (idempotent), returning
    /// `Ok(())` without re-invoking listeners. Returns the first `Err`
    /// raised by a listener, if any.
    pub fn fire(&self, value: T) -> Result<(), ErrorKind> {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            if inner.result.is_some() {
                return Ok(());
            }
            inner.result = Some(value.clone());
            std::mem::take(&mut inner.listeners)
        };
        self.notify.notify_waiters();

        let mut first_err = Ok(());
        for listener in listeners {
            if let Err(err) = listener(&value) {
                if first_err.is_ok() {
                    first_err = Err(err);
                }
            }
        }
        first_err
    }

    /// Resolves once the event has fired, yielding a clone of the result.
    pub async fn waiter(&self) -> T {
        loop {
            if let Some(result) = self.inner.lock().unwrap().result.clone() {
                return result;
            }
            self.notify.notified().await;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires any number of times; every bound listener runs on every firing.
pub struct Many<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> Many<T> {
    pub fn new() -> Self {
        Many {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn bind(&self, listener: Listener<T>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Invokes every listener in bind order; a listener error is logged,
    /// never aborts the firing loop for the remaining listeners.
    pub fn fire(&self, value: &T) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            if let Err(err) = listener(value) {
                error!(?err, "event listener failed");
            }
        }
    }

    /// Shallow-copies `other`'s listeners into `self` — an `Arc` bump per
    /// listener, not a deep copy. Used so a per-connection consumer
    /// inherits server-wide repeated-event subscribers.
    pub fn copy_many_times_events(&self, other: &Many<T>) {
        let mut mine = self.listeners.lock().unwrap();
        mine.extend(other.listeners.lock().unwrap().iter().cloned());
    }
}

impl<T> Default for Many<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once_and_replays_late_binders() {
        let hub = OneShot::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        hub.bind(Arc::new(move |v: &u32| {
            s1.lock().unwrap().push(*v);
            Ok(())
        }));

        assert!(hub.fire(7).is_ok());
        assert!(hub.fire(9).is_ok()); // second fire is a no-op

        let s2 = seen.clone();
        hub.bind(Arc::new(move |v: &u32| {
            s2.lock().unwrap().push(*v);
            Ok(())
        }));

        assert_eq!(*seen.lock().unwrap(), vec![7, 7]);
    }

    #[test]
    fn one_shot_propagates_abort() {
        let hub = OneShot::<()>::new();
        hub.bind(Arc::new(|_: &()| Err(ErrorKind::AbortEvent)));
        assert!(matches!(hub.fire(()), Err(ErrorKind::AbortEvent)));
    }

    #[test]
    fn many_fires_every_time_and_survives_listener_errors() {
        let hub = Many::<u32>::new();
        let count = Arc::new(Mutex::new(0u32));

        let c1 = count.clone();
        hub.bind(Arc::new(move |v: &u32| {
            *c1.lock().unwrap() += v;
            Ok(())
        }));
        hub.bind(Arc::new(|_: &u32| Err(ErrorKind::AbortEvent)));

        hub.fire(&1);
        hub.fire(&2);

        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn copy_many_times_events_is_a_cheap_shallow_copy() {
        let source = Many::<u32>::new();
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        source.bind(Arc::new(move |_: &u32| {
            *c.lock().unwrap() += 1;
            Ok(())
        }));

        let target = Many::<u32>::new();
        target.copy_many_times_events(&source);
        target.fire(&0);

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
