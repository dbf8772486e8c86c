use std::time::Duration;

use anyhow::Result;
use assert_call::{CallRecorder, call};
use futures::StreamExt;
use tokio::{spawn, test, time::sleep};
use urlstate::{Error, HistoryMode, ParamStore, QueryParams};

fn p(s: &str) -> QueryParams {
    QueryParams::parse(s).unwrap()
}

#[test]
async fn from_uri() -> Result<()> {
    let store = ParamStore::from_uri("/list?page=2&sort=name")?;
    assert_eq!(store.get("page").as_deref(), Some("2"));
    assert_eq!(store.get("sort").as_deref(), Some("name"));
    assert_eq!(store.revision().get(), 0);
    Ok(())
}

#[test]
async fn revision_counts_effective_changes() {
    let store = ParamStore::default();
    let r1 = store.set_params(p("a=1"));
    let r2 = store.set_params(p("a=1"));
    let r3 = store.replace_params(p("a=2"));
    assert_eq!(r1.get(), 1);
    assert_eq!(r2, r1);
    assert_eq!(r3.get(), 2);
    assert_eq!(store.history_len(), 2);
}

#[test]
async fn compare_and_replace_rejects_stale() -> Result<()> {
    let store = ParamStore::default();
    let (_, r0) = store.snapshot();
    store.set_params(p("a=1"));
    match store.compare_and_replace(r0, p("b=1"), HistoryMode::Push) {
        Err(Error::StaleRevision { expected, actual }) => {
            assert_eq!(expected, r0);
            assert_eq!(actual.get(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    let r = store.compare_and_replace(store.revision(), p("b=1"), HistoryMode::Push)?;
    assert_eq!(r.get(), 2);
    assert_eq!(store.params(), p("b=1"));
    Ok(())
}

#[test]
async fn modify_reads_latest() {
    let store = ParamStore::new(p("a=1"));
    store.modify(HistoryMode::Push, |params| params.set("b", "2"));
    let removed = store.modify(HistoryMode::Push, |params| params.remove("a"));
    assert!(removed);
    assert_eq!(store.params().to_string(), "b=2");
}

#[test]
async fn navigation() {
    let store = ParamStore::new(p("a=1"));
    store.set_params(p("a=2"));
    store.set_params(p("a=3"));
    assert!(store.can_go_back());
    assert!(!store.can_go_forward());
    assert!(store.go(-2));
    assert_eq!(store.get("a").as_deref(), Some("1"));
    assert!(!store.can_go_back());
    assert!(!store.go(5));
    assert!(store.forward());
    assert_eq!(store.get("a").as_deref(), Some("2"));

    store.set_params(p("a=9"));
    assert_eq!(store.history_len(), 3);
    assert!(!store.can_go_forward());
}

#[test]
async fn listeners_see_every_change() {
    let mut cr = CallRecorder::new();
    let store = ParamStore::default();
    let key = store.listen(|change| call!("{} @{}", change.params, change.revision));
    store.set_params(p("a=1"));
    store.set_params(p("a=1"));
    store.modify(HistoryMode::Push, |params| params.set("b", "2"));
    store.back();
    cr.verify(["a=1 @1", "a=1&b=2 @2", "a=1 @3"]);

    drop(key);
    store.set_params(p("c=3"));
    cr.verify(());
}

#[test]
async fn listener_may_write_store() {
    let store = ParamStore::default();
    let _key = store.listen({
        let store = store.clone();
        move |change| {
            if change.params.get("a").is_some() && change.params.get("seen").is_none() {
                store.modify(HistoryMode::Replace, |params| params.set("seen", "1"));
            }
        }
    });
    store.set_params(p("a=1"));
    assert_eq!(store.params().to_string(), "a=1&seen=1");
}

#[test]
async fn subscribe() -> Result<()> {
    let mut cr = CallRecorder::new();
    let store = ParamStore::new(p("a=1"));
    let mut s = store.subscribe();
    spawn(async move {
        while let Some(params) = s.next().await {
            call!("{params}");
        }
    });
    sleep(Duration::from_millis(100)).await;
    cr.verify("a=1");

    store.set_params(p("a=2"));
    sleep(Duration::from_millis(100)).await;
    cr.verify("a=2");

    store.back();
    sleep(Duration::from_millis(100)).await;
    cr.verify("a=1");
    Ok(())
}

#[test]
async fn history_limit_drops_oldest_entries() {
    let store = ParamStore::with_history_limit(p("page=1"), 3);
    for page in 2..=5 {
        store.set_params(p(&format!("page={page}")));
    }
    assert_eq!(store.history_len(), 3);
    assert!(store.back());
    assert!(store.back());
    assert_eq!(store.get("page").as_deref(), Some("3"));
    assert!(!store.can_go_back());
    assert!(!store.back());
    assert_eq!(store.revision().get(), 6);
}

#[test]
async fn default_history_limit() {
    let store = ParamStore::default();
    for i in 0..ParamStore::DEFAULT_HISTORY_LIMIT + 10 {
        store.set_params(p(&format!("i={i}")));
    }
    assert_eq!(store.history_len(), ParamStore::DEFAULT_HISTORY_LIMIT);
}

#[test]
async fn serialize_error_message() {
    let e = Error::from(<serde_urlencoded::ser::Error as serde::ser::Error>::custom(
        "unsupported value",
    ));
    assert!(matches!(e, Error::Serialize(_)));
    assert_eq!(
        e.to_string(),
        "query string could not be serialized: unsupported value"
    );
}
