//! Tests for the item store (in-memory and file-backed).

use std::sync::Arc;

use super::{FileKv, ItemStore, KvStore, MemoryKv, QUEUE_NAMESPACE};
use crate::job::{DownloadJob, JobId, JobStatus, NewJob};

fn job(id: &str) -> DownloadJob {
    DownloadJob::new(
        JobId::new(id),
        NewJob {
            filename: format!("{id}.bin"),
            source_url: format!("https://host.example/{id}"),
            resolved_url: format!("https://cdn.host.example/{id}"),
            total_bytes: 2_048,
            host_label: None,
        },
        "tester",
    )
}

fn empty_store(kv: &MemoryKv) -> ItemStore {
    let (store, recovered) = ItemStore::load(Arc::new(kv.clone())).unwrap();
    assert_eq!(recovered, 0);
    store
}

#[test]
fn append_keeps_insertion_order_and_persists() {
    let kv = MemoryKv::new();
    let mut store = empty_store(&kv);
    store.append(job("a"));
    store.append(job("b"));
    store.append(job("c"));

    let ids: Vec<_> = store.snapshot().iter().map(|j| j.id.to_string()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let reloaded = empty_store(&kv);
    let ids: Vec<_> = reloaded.iter().map(|j| j.id.to_string()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[test]
fn mutate_unknown_id_is_noop() {
    let kv = MemoryKv::new();
    let mut store = empty_store(&kv);
    store.append(job("a"));
    assert!(!store.mutate(&JobId::new("zzz"), |j| j.admit(1)));
    assert_eq!(store.count(JobStatus::Pending), 1);
}

#[test]
fn mutate_persists_changes_only_when_applied() {
    let kv = MemoryKv::new();
    let mut store = empty_store(&kv);
    let id = store.append(job("a"));
    assert!(store.mutate(&id, |j| j.admit(5)));
    assert!(!store.mutate(&id, |j| j.resume()));

    let reloaded_kv = kv.fork();
    let bytes = reloaded_kv.get(QUEUE_NAMESPACE).unwrap().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\"downloading\""));
}

#[test]
fn snapshot_is_a_copy() {
    let kv = MemoryKv::new();
    let mut store = empty_store(&kv);
    let id = store.append(job("a"));
    let snap = store.snapshot();
    store.mutate(&id, |j| j.admit(1));
    assert_eq!(snap.get(&id).unwrap().status, JobStatus::Pending);
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Downloading);
}

#[test]
fn load_reclassifies_downloading_as_pending() {
    let kv = MemoryKv::new();
    {
        let mut store = empty_store(&kv);
        let a = store.append(job("a"));
        let b = store.append(job("b"));
        store.mutate(&a, |j| j.admit(1) && j.apply_progress(42.0, 1_000.0));
        store.mutate(&b, |j| j.admit(1) && j.pause());
    }

    let (store, recovered) = ItemStore::load(Arc::new(kv.clone())).unwrap();
    assert_eq!(recovered, 1);
    let a = store.get(&JobId::new("a")).unwrap();
    assert_eq!(a.status, JobStatus::Pending);
    assert_eq!(a.speed_bps, 0.0);
    assert!(a.eta_secs.is_none());
    assert_eq!(store.get(&JobId::new("b")).unwrap().status, JobStatus::Paused);

    // Recovery is written back, so a second load has nothing to do.
    let (_, again) = ItemStore::load(Arc::new(kv)).unwrap();
    assert_eq!(again, 0);
}

#[test]
fn remove_retain_and_clear() {
    let kv = MemoryKv::new();
    let mut store = empty_store(&kv);
    for id in ["a", "b", "c", "d"] {
        store.append(job(id));
    }
    store.mutate(&JobId::new("b"), |j| j.admit(1) && j.complete(2));
    store.mutate(&JobId::new("d"), |j| j.admit(1) && j.complete(2));

    assert!(store.remove(&JobId::new("a")).is_some());
    assert!(store.remove(&JobId::new("a")).is_none());

    let removed = store.retain(|j| j.status != JobStatus::Completed);
    assert_eq!(removed.len(), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.clear(), 1);
    assert!(store.is_empty());
    assert!(empty_store(&kv).is_empty());
}

#[test]
fn corrupt_record_is_an_error() {
    let kv = MemoryKv::new();
    kv.put(QUEUE_NAMESPACE, b"not json").unwrap();
    assert!(ItemStore::load(Arc::new(kv)).is_err());
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let kv = FileKv::open(dir.path()).unwrap();
        let (mut store, _) = ItemStore::load(Arc::new(kv)).unwrap();
        let id = store.append(job("a"));
        store.mutate(&id, |j| j.admit(1));
    }
    let kv = FileKv::open(dir.path()).unwrap();
    let (store, recovered) = ItemStore::load(Arc::new(kv)).unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(store.get(&JobId::new("a")).unwrap().status, JobStatus::Pending);
}
