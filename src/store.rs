use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use derive_ex::Ex;
use futures::Stream;
use slabmap::SlabMap;

use crate::utils::watch::{Watched, Watchers, watch};
use crate::{Error, QueryParams, Result};


/// Monotonic counter of effective changes to a [`ParamStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub fn get(self) -> u64 {
        self.0
    }
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a write is recorded in the navigation history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HistoryMode {
    /// Add a new entry after the current one, discarding forward entries.
    #[default]
    Push,
    /// Overwrite the current entry.
    Replace,
}

/// Identity of a listener, used as the origin of the writes it makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Notification passed to listeners after the store changed.
#[derive(Debug, Clone)]
pub struct ParamsChange {
    pub params: QueryParams,
    pub revision: Revision,
    /// Listener whose write caused the change. `None` for navigation and
    /// writes made directly on the store.
    pub origin: Option<ListenerId>,
}

type Listener = Arc<dyn Fn(&ParamsChange) + Send + Sync>;

#[derive(Debug)]
struct History {
    entries: Vec<QueryParams>,
    index: usize,
    limit: usize,
}
impl History {
    fn new(params: QueryParams, limit: usize) -> Self {
        Self {
            entries: vec![params],
            index: 0,
            limit: limit.max(1),
        }
    }
    fn current(&self) -> &QueryParams {
        &self.entries[self.index]
    }
    fn record(&mut self, params: QueryParams, mode: HistoryMode) {
        match mode {
            HistoryMode::Push => {
                self.entries.truncate(self.index + 1);
                self.entries.push(params);
                self.index += 1;
                if self.entries.len() > self.limit {
                    let excess = self.entries.len() - self.limit;
                    self.entries.drain(..excess);
                    self.index -= excess;
                }
            }
            HistoryMode::Replace => self.entries[self.index] = params,
        }
    }
    fn go(&mut self, delta: isize) -> bool {
        match self.index.checked_add_signed(delta) {
            Some(index) if index != self.index && index < self.entries.len() => {
                self.index = index;
                true
            }
            _ => false,
        }
    }
}

#[derive(Ex)]
#[derive_ex(Debug)]
struct RawParamStore {
    history: History,
    revision: Revision,
    #[debug(ignore)]
    listeners: SlabMap<Listener>,
    listener_remove: Arc<Mutex<Vec<usize>>>,
    watchers: Watchers,
}
impl RawParamStore {
    fn apply_listener_remove(&mut self) {
        let listener_remove = self.listener_remove.clone();
        let mut ids = listener_remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for id in ids.drain(..) {
            self.listeners.remove(id);
        }
    }

    fn changed(&mut self, origin: Option<ListenerId>) -> Notice {
        self.revision = self.revision.next();
        self.watchers.notify();
        Notice {
            change: ParamsChange {
                params: self.history.current().clone(),
                revision: self.revision,
                origin,
            },
            listeners: self
                .listeners
                .iter()
                .map(|(id, l)| (ListenerId(id), l.clone()))
                .collect(),
        }
    }
    fn commit(
        &mut self,
        params: QueryParams,
        mode: HistoryMode,
        origin: Option<ListenerId>,
    ) -> Option<Notice> {
        if *self.history.current() == params {
            tracing::trace!(revision = %self.revision, "query parameters unchanged, write skipped");
            return None;
        }
        self.history.record(params, mode);
        let notice = self.changed(origin);
        tracing::debug!(
            revision = %self.revision,
            query = %notice.change.params,
            ?mode,
            "query parameters written"
        );
        Some(notice)
    }
}
impl Watched for RawParamStore {
    fn watchers(&mut self) -> &mut Watchers {
        &mut self.watchers
    }
}

/// Listeners to call once the store lock is released.
struct Notice {
    change: ParamsChange,
    listeners: Vec<(ListenerId, Listener)>,
}
impl Notice {
    /// Calls every listener, then resumes the first panic raised by any of them.
    fn dispatch(self) {
        let mut panicked = None;
        for (id, listener) in self.listeners {
            if Some(id) == self.change.origin {
                continue;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(&self.change))) {
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
    }
}

/// Registration of a [`ParamStore::listen`] callback.
///
/// Dropping the key unregisters the callback.
#[derive(Ex)]
#[derive_ex(Debug)]
pub struct ListenerKey {
    id: usize,
    #[debug(ignore)]
    listener_remove: Arc<Mutex<Vec<usize>>>,
}
impl ListenerKey {
    pub fn id(&self) -> ListenerId {
        ListenerId(self.id)
    }
}
impl Drop for ListenerKey {
    fn drop(&mut self) {
        self.listener_remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.id);
    }
}

/// Shared URL query parameter store with navigation history.
///
/// Cloning yields another handle to the same store. The history keeps at
/// most [`DEFAULT_HISTORY_LIMIT`](Self::DEFAULT_HISTORY_LIMIT) entries unless
/// created with [`with_history_limit`](Self::with_history_limit); pushing
/// past the limit drops the oldest entry.
#[derive(Clone, Debug)]
pub struct ParamStore(Arc<Mutex<RawParamStore>>);

impl Default for ParamStore {
    fn default() -> Self {
        Self::new(QueryParams::new())
    }
}

impl ParamStore {
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    pub fn new(params: QueryParams) -> Self {
        Self::with_history_limit(params, Self::DEFAULT_HISTORY_LIMIT)
    }
    /// Creates a store whose history holds at most `limit` entries (at least one).
    pub fn with_history_limit(params: QueryParams, limit: usize) -> Self {
        Self(Arc::new(Mutex::new(RawParamStore {
            history: History::new(params, limit),
            revision: Revision::default(),
            listeners: SlabMap::new(),
            listener_remove: Arc::new(Mutex::new(Vec::new())),
            watchers: Watchers::new(),
        })))
    }

    /// Creates a store seeded from the query portion of `uri`.
    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(QueryParams::from_uri(uri)?))
    }

    // A panicking codec or closure never leaves `RawParamStore` half updated,
    // since `commit` runs after them, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, RawParamStore> {
        let mut s = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        s.apply_listener_remove();
        s
    }

    pub fn params(&self) -> QueryParams {
        self.lock().history.current().clone()
    }
    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().history.current().get(name).map(str::to_owned)
    }
    pub fn revision(&self) -> Revision {
        self.lock().revision
    }
    pub fn snapshot(&self) -> (QueryParams, Revision) {
        let s = self.lock();
        (s.history.current().clone(), s.revision)
    }

    /// Replaces the whole parameter set, adding a history entry.
    pub fn set_params(&self, params: QueryParams) -> Revision {
        self.replace_with(params, HistoryMode::Push)
    }
    /// Replaces the whole parameter set, overwriting the current history entry.
    pub fn replace_params(&self, params: QueryParams) -> Revision {
        self.replace_with(params, HistoryMode::Replace)
    }
    fn replace_with(&self, params: QueryParams, mode: HistoryMode) -> Revision {
        self.write(None, mode, |p, _| *p = params).1
    }

    /// Replaces the parameter set only if the store is still at `expected`.
    pub fn compare_and_replace(
        &self,
        expected: Revision,
        params: QueryParams,
        mode: HistoryMode,
    ) -> Result<Revision> {
        let mut s = self.lock();
        if s.revision != expected {
            return Err(Error::StaleRevision {
                expected,
                actual: s.revision,
            });
        }
        let notice = s.commit(params, mode, None);
        let revision = s.revision;
        drop(s);
        if let Some(notice) = notice {
            notice.dispatch();
        }
        Ok(revision)
    }

    /// Applies `f` to the latest parameter set and stores the result.
    ///
    /// The read and the replace happen under one lock, so concurrent
    /// modifications of different parameters are never lost.
    pub fn modify<R>(&self, mode: HistoryMode, f: impl FnOnce(&mut QueryParams) -> R) -> R {
        self.write(None, mode, |params, _| f(params)).0
    }

    /// Like [`modify`](Self::modify), but the listener `origin` is not
    /// notified of its own write.
    ///
    /// `f` also receives the revision the write will have if it changes the
    /// parameters. Listeners are dispatched only after `f` returned.
    pub(crate) fn write<R>(
        &self,
        origin: Option<ListenerId>,
        mode: HistoryMode,
        f: impl FnOnce(&mut QueryParams, Revision) -> R,
    ) -> (R, Revision) {
        let mut s = self.lock();
        let mut params = s.history.current().clone();
        let ret = f(&mut params, s.revision.next());
        let notice = s.commit(params, mode, origin);
        let revision = s.revision;
        drop(s);
        if let Some(notice) = notice {
            notice.dispatch();
        }
        (ret, revision)
    }

    /// Moves through the history by `delta` entries, like the browser's
    /// back and forward buttons. Returns `false` if there is no such entry.
    pub fn go(&self, delta: isize) -> bool {
        let mut s = self.lock();
        let from = s.history.current().clone();
        if !s.history.go(delta) {
            return false;
        }
        tracing::debug!(delta, index = s.history.index, "history navigation");
        let notice = (*s.history.current() != from).then(|| s.changed(None));
        drop(s);
        if let Some(notice) = notice {
            notice.dispatch();
        }
        true
    }
    pub fn back(&self) -> bool {
        self.go(-1)
    }
    pub fn forward(&self) -> bool {
        self.go(1)
    }
    pub fn can_go_back(&self) -> bool {
        self.lock().history.index > 0
    }
    pub fn can_go_forward(&self) -> bool {
        let s = self.lock();
        s.history.index + 1 < s.history.entries.len()
    }
    pub fn history_len(&self) -> usize {
        self.lock().history.entries.len()
    }

    /// Registers `f` to be called after every change of the store.
    ///
    /// `f` runs without the store lock held and may read or write the store.
    pub fn listen(&self, f: impl Fn(&ParamsChange) + Send + Sync + 'static) -> ListenerKey {
        let mut s = self.lock();
        let id = s.listeners.insert(Arc::new(f));
        ListenerKey {
            id,
            listener_remove: s.listener_remove.clone(),
        }
    }

    /// Returns a stream yielding the current parameters now and after each change.
    pub fn subscribe(&self) -> impl Stream<Item = QueryParams> + 'static {
        watch(&self.0, |s| s.history.current().clone())
    }
}
