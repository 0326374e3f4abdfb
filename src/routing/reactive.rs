//! Observable values with change notification
//!
//! A [`Reactive`] holds a value behind a watch channel: readers take cheap
//! snapshots, writers publish atomically, and subscribers learn about
//! changes. Equal successive values are suppressed, so a derived value
//! settles at most once per actual change.

use std::sync::Arc;

use tokio::sync::watch;

/// An observable value
pub struct Reactive<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Reactive<T> {
    /// Create an observable holding `initial`
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value; equal values publish nothing
    pub fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Mutate the value in place; publishes only when the result differs.
    ///
    /// The closure runs under the channel's write lock, so concurrent
    /// updates are linearized.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_if_modified(|current| {
            let before = current.clone();
            f(current);
            *current != before
        });
    }

    /// A receiver that observes every published change
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Reactive").field(&*self.tx.borrow()).finish()
    }
}

/// A value derived from two observables, recomputed whenever either changes.
///
/// The recomputation task ends when both inputs are dropped. Bursts of input
/// changes coalesce: the watch channel only reports "changed since last
/// seen", so downstream settles at most once per burst.
pub fn derive2<A, B, T, F>(a: &Reactive<A>, b: &Reactive<B>, f: F) -> Arc<Reactive<T>>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    B: Clone + PartialEq + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&A, &B) -> T + Send + 'static,
{
    let mut rx_a = a.subscribe();
    let mut rx_b = b.subscribe();
    let initial = {
        let va = rx_a.borrow_and_update();
        let vb = rx_b.borrow_and_update();
        f(&va, &vb)
    };
    let derived = Arc::new(Reactive::new(initial));

    let out = derived.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = rx_a.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = rx_b.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let next = {
                let va = rx_a.borrow_and_update();
                let vb = rx_b.borrow_and_update();
                f(&va, &vb)
            };
            out.set(next);
        }
    });

    derived
}
