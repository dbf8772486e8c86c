use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex, Weak},
};

use derive_ex::Ex;
use futures::Stream;
use serde::{Serialize, de::DeserializeOwned};

use crate::codec::{Codec, FnCodec, JsonCodec, ParseCodec};
use crate::store::{HistoryMode, ListenerId, ListenerKey, ParamStore, ParamsChange, Revision};
use crate::utils::watch::{Watched, Watchers, lock, watch};
use crate::QueryParams;

/// Settings of a [`query_state`] binding.
#[derive(Ex)]
#[derive_ex(Clone, bound())]
pub struct QueryStateConfig<T> {
    name: String,
    codec: Arc<dyn Codec<T>>,
    history: HistoryMode,
}

impl<T> QueryStateConfig<T> {
    pub fn new(name: impl Into<String>, codec: impl Codec<T> + 'static) -> Self {
        Self {
            name: name.into(),
            codec: Arc::new(codec),
            history: HistoryMode::default(),
        }
    }
    pub fn with_fns(
        name: impl Into<String>,
        decode: impl Fn(Option<&str>) -> T + Send + Sync + 'static,
        encode: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, FnCodec::new(decode, encode))
    }

    /// Sets how this binding's writes are recorded in the history.
    pub fn history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
impl<T> QueryStateConfig<T>
where
    T: FromStr + Display + PartialEq + Clone + Default + Send + Sync + 'static,
{
    pub fn parse(name: impl Into<String>) -> Self {
        Self::new(name, ParseCodec::<T>::default())
    }
}
impl<T> QueryStateConfig<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, JsonCodec::<T>::new())
    }
}

/// A new value, or a function computing it from the latest committed value.
///
/// The function runs before [`SetQueryState::apply`] returns, so it may
/// borrow from the caller.
pub enum Update<'a, T> {
    Value(T),
    With(Box<dyn FnOnce(&T) -> T + 'a>),
}
impl<'a, T> Update<'a, T> {
    pub fn with(f: impl FnOnce(&T) -> T + 'a) -> Self {
        Self::With(Box::new(f))
    }
    fn resolve(self, prev: &T) -> T {
        match self {
            Update::Value(value) => value,
            Update::With(f) => f(prev),
        }
    }
}
impl<T> From<T> for Update<'_, T> {
    fn from(value: T) -> Self {
        Update::Value(value)
    }
}

struct RawQueryState<T> {
    value: T,
    name: String,
    codec: Arc<dyn Codec<T>>,
    seen: Revision,
    watchers: Watchers,
}
impl<T: PartialEq> RawQueryState<T> {
    fn reconcile(&mut self, params: &QueryParams, revision: Revision) -> bool {
        if revision < self.seen {
            tracing::trace!(name = %self.name, %revision, seen = %self.seen, "stale notification ignored");
            return false;
        }
        self.seen = revision;
        let value = self.codec.decode(params.get(&self.name));
        if value == self.value {
            return false;
        }
        tracing::debug!(name = %self.name, %revision, "state reconciled from query parameters");
        self.value = value;
        self.watchers.notify();
        true
    }
}
impl<T> Watched for RawQueryState<T> {
    fn watchers(&mut self) -> &mut Watchers {
        &mut self.watchers
    }
}

struct Binding<T> {
    raw: Arc<Mutex<RawQueryState<T>>>,
    store: ParamStore,
    history: HistoryMode,
    origin: ListenerId,
    _listener: ListenerKey,
}

/// Read side of a query parameter binding.
#[derive(Ex)]
#[derive_ex(Clone, bound())]
pub struct QueryState<T>(Arc<Binding<T>>);

/// Write side of a query parameter binding.
#[derive(Ex)]
#[derive_ex(Clone, bound())]
pub struct SetQueryState<T>(Arc<Binding<T>>);

/// Binds a value of `T` to the query parameter `config.name` of `store`.
///
/// The initial value is decoded from the current parameter. Writes through
/// the returned [`SetQueryState`] update the value and the parameter
/// together, and changes of the parameter made by anyone else (navigation,
/// other bindings, direct store writes) are decoded back into the value.
///
/// The binding lives until both handles are dropped.
pub fn query_state<T>(
    store: &ParamStore,
    config: QueryStateConfig<T>,
) -> (QueryState<T>, SetQueryState<T>)
where
    T: PartialEq + Send + 'static,
{
    let QueryStateConfig {
        name,
        codec,
        history,
    } = config;
    let (params, revision) = store.snapshot();
    let raw = Arc::new(Mutex::new(RawQueryState {
        value: codec.decode(params.get(&name)),
        name,
        codec,
        seen: revision,
        watchers: Watchers::new(),
    }));
    let listener = store.listen({
        let raw: Weak<Mutex<RawQueryState<T>>> = Arc::downgrade(&raw);
        move |change: &ParamsChange| {
            if let Some(raw) = raw.upgrade() {
                lock(&raw).reconcile(&change.params, change.revision);
            }
        }
    });
    let binding = Arc::new(Binding {
        raw,
        store: store.clone(),
        history,
        origin: listener.id(),
        _listener: listener,
    });
    // Catch changes made before the listener was registered.
    binding.sync();
    (QueryState(binding.clone()), SetQueryState(binding))
}

impl<T: PartialEq> Binding<T> {
    fn sync(&self) -> bool {
        let (params, revision) = self.store.snapshot();
        lock(&self.raw).reconcile(&params, revision)
    }

    fn apply(&self, update: Update<'_, T>) {
        self.store.write(Some(self.origin), self.history, |params, revision| {
            let mut s = lock(&self.raw);
            let value = update.resolve(&s.value);
            match s.codec.encode(&value) {
                Some(encoded) => params.set(s.name.as_str(), encoded),
                None => {
                    params.remove(&s.name);
                }
            }
            // Raised before the store lock is released, so notifications
            // older than this write are ignored however late they arrive.
            s.seen = s.seen.max(revision);
            s.value = value;
            s.watchers.notify();
        });
    }
}

impl<T: PartialEq> QueryState<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        lock(&self.0.raw).value.clone()
    }
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&lock(&self.0.raw).value)
    }
    pub fn name(&self) -> String {
        lock(&self.0.raw).name.clone()
    }
    pub fn store(&self) -> &ParamStore {
        &self.0.store
    }

    /// Re-reads the parameter from the store, returning `true` if the value changed.
    ///
    /// Never writes the store.
    pub fn sync(&self) -> bool {
        self.0.sync()
    }

    /// Returns a stream yielding the current value now and after each change.
    pub fn subscribe(&self) -> impl Stream<Item = T> + 'static
    where
        T: Clone + 'static,
    {
        watch(&self.0.raw, |s| s.value.clone())
    }

    pub fn setter(&self) -> SetQueryState<T> {
        SetQueryState(self.0.clone())
    }
}

impl<T: PartialEq> SetQueryState<T> {
    pub fn set(&self, value: T) {
        self.apply(Update::Value(value));
    }
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.apply(Update::with(f));
    }

    /// Commits the value and writes its encoding to the store in one step.
    ///
    /// The parameter is removed when the codec encodes the value as `None`.
    pub fn apply<'a>(&self, update: impl Into<Update<'a, T>>) {
        self.0.apply(update.into());
    }
}
