// Shared helpers for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use redis_lua_mock::Store;

pub fn args(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
}

pub fn setup_store() -> Store {
    Store::new().expect("store should start")
}

/// Yield until `n` blocked pops are subscribed to the marker channel
pub async fn wait_for_listeners(store: &Store, n: usize) {
    for _ in 0..1000 {
        if store.marker_listener_count() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {} marker listeners, found {}",
        n,
        store.marker_listener_count()
    );
}
