use std::sync::{Arc, Mutex};

use futures::{FutureExt, StreamExt};

use super::*;

struct Counter {
    value: u32,
    watchers: Watchers,
}
impl Watched for Counter {
    fn watchers(&mut self) -> &mut Watchers {
        &mut self.watchers
    }
}
fn counter() -> Arc<Mutex<Counter>> {
    Arc::new(Mutex::new(Counter {
        value: 0,
        watchers: Watchers::new(),
    }))
}
fn set(c: &Arc<Mutex<Counter>>, value: u32) {
    let mut c = c.lock().unwrap();
    c.value = value;
    c.watchers.notify();
}

#[test]
fn first_poll_yields_current() {
    let c = counter();
    let mut s = watch(&c, |c| c.value);
    assert_eq!(s.next().now_or_never(), Some(Some(0)));
    assert_eq!(s.next().now_or_never(), None);
}

#[test]
fn notify_wakes() {
    let c = counter();
    let mut s = watch(&c, |c| c.value);
    assert_eq!(s.next().now_or_never(), Some(Some(0)));
    set(&c, 5);
    assert_eq!(s.next().now_or_never(), Some(Some(5)));
}

#[test]
fn coalesces_between_polls() {
    let c = counter();
    let mut s = watch(&c, |c| c.value);
    assert_eq!(s.next().now_or_never(), Some(Some(0)));
    set(&c, 1);
    set(&c, 2);
    set(&c, 3);
    assert_eq!(s.next().now_or_never(), Some(Some(3)));
    assert_eq!(s.next().now_or_never(), None);
}

#[test]
fn drop_unregisters() {
    let c = counter();
    let s = watch(&c, |c| c.value);
    assert_eq!(c.lock().unwrap().watchers.0.len(), 1);
    drop(s);
    assert!(c.lock().unwrap().watchers.0.is_empty());
}
