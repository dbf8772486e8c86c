use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Poll, Waker},
};

use derive_ex::Ex;
use futures::{Stream, stream};
use slabmap::SlabMap;

#[cfg(test)]
mod tests;

#[derive(Debug)]
struct WatchState {
    waker: Option<Waker>,
    is_dirty: bool,
}

/// Streams observing a container.
///
/// Each stream starts dirty so that its first poll yields the current value.
#[derive(Debug, Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Watchers(SlabMap<Arc<Mutex<WatchState>>>);

impl Watchers {
    pub fn new() -> Self {
        Self(SlabMap::new())
    }
    fn insert(&mut self) -> (usize, Arc<Mutex<WatchState>>) {
        let ws = Arc::new(Mutex::new(WatchState {
            waker: None,
            is_dirty: true,
        }));
        (self.0.insert(ws.clone()), ws)
    }
    fn remove(&mut self, key: usize) {
        self.0.remove(key);
    }

    /// Marks every stream dirty and wakes the ones waiting.
    pub fn notify(&self) {
        for (_, ws) in self.0.iter() {
            let mut ws = lock(ws);
            ws.is_dirty = true;
            let waker = ws.waker.take();
            drop(ws);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

/// Locks `m`, ignoring poisoning.
///
/// Containers commit their state only after running user code, so a panic
/// that poisoned the lock left them consistent.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub trait Watched {
    fn watchers(&mut self) -> &mut Watchers;
}

/// Creates a stream that yields `f(container)` now and again after every
/// [`Watchers::notify`] of the container.
///
/// Values produced between two polls are coalesced into the latest one.
pub fn watch<C, U>(
    container: &Arc<Mutex<C>>,
    mut f: impl FnMut(&C) -> U + 'static,
) -> impl Stream<Item = U> + 'static
where
    C: Watched + 'static,
    U: 'static,
{
    let (key, ws) = lock(container).watchers().insert();
    let target = Target {
        container: container.clone(),
        key,
    };
    stream::poll_fn(move |cx| {
        let c = lock(&target.container);
        let mut w = lock(&ws);
        if w.is_dirty {
            w.is_dirty = false;
            drop(w);
            Poll::Ready(Some(f(&*c)))
        } else {
            w.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    })
}

struct Target<C: Watched> {
    container: Arc<Mutex<C>>,
    key: usize,
}
impl<C: Watched> Drop for Target<C> {
    fn drop(&mut self) {
        lock(&self.container).watchers().remove(self.key);
    }
}
