//! Multi-threaded behavior of the in-memory backend.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use unikv_storage::{
    read_value, Context, Database, Getter, KvResult, MemoryDatabase, Ranger, Setter, Transaction,
};

fn read_counter(tx: &impl Getter, ctx: &Context) -> KvResult<u64> {
    match tx.get(ctx, b"counter") {
        Ok(value) => {
            let bytes = read_value(value)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes);
            Ok(u64::from_be_bytes(raw))
        }
        Err(err) if err.is_not_found() => Ok(0),
        Err(err) => Err(err),
    }
}

fn increment(db: &MemoryDatabase, ctx: &Context) -> usize {
    let mut conflicts = 0;
    loop {
        let mut tx = db.new_transaction(ctx).unwrap();
        let next = read_counter(&tx, ctx).unwrap() + 1;
        tx.set(ctx, b"counter", &mut &next.to_be_bytes()[..]).unwrap();
        match tx.commit(ctx) {
            Ok(()) => return conflicts,
            Err(err) if err.is_conflict() => {
                tx.rollback(ctx).unwrap_err();
                conflicts += 1;
            }
            Err(err) => panic!("unexpected commit error: {err}"),
        }
    }
}

#[test]
fn no_lost_updates_under_contention() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 50;

    let db = Arc::new(MemoryDatabase::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let ctx = Context::background();
                (0..PER_THREAD).map(|_| increment(&db, &ctx)).sum::<usize>()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ctx = Context::background();
    let snap = db.new_snapshot(&ctx).unwrap();
    assert_eq!(read_counter(&snap, &ctx).unwrap(), THREADS * PER_THREAD);
    drop(snap);
    assert_eq!(db.active_handles(), 0);
}

#[test]
fn readers_keep_their_view_while_writers_commit() {
    let db = MemoryDatabase::new();
    let ctx = Context::background();
    let mut tx = db.new_transaction(&ctx).unwrap();
    for i in 0..100u32 {
        tx.set(&ctx, format!("k{i:03}").as_bytes(), &mut &b"old"[..]).unwrap();
    }
    tx.commit(&ctx).unwrap();

    let snap = db.new_snapshot(&ctx).unwrap();
    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            let ctx = Context::background();
            for i in 0..100u32 {
                let mut tx = db.new_transaction(&ctx).unwrap();
                tx.set(&ctx, format!("k{i:03}").as_bytes(), &mut &b"new"[..]).unwrap();
                tx.commit(&ctx).unwrap();
            }
        })
    };

    let mut seen = 0;
    for entry in snap.ascend(&ctx, b"", b"") {
        let (_, value) = entry.unwrap();
        assert_eq!(read_value(value).unwrap(), b"old");
        seen += 1;
    }
    writer.join().unwrap();
    assert_eq!(seen, 100);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn set_then_get_returns_exact_bytes(
        entries in prop::collection::btree_map(
            prop::collection::vec(any::<u8>(), 1..16),
            prop::collection::vec(any::<u8>(), 0..64),
            0..32,
        )
    ) {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let mut tx = db.new_transaction(&ctx).unwrap();
        for (key, value) in &entries {
            tx.set(&ctx, key, &mut &value[..]).unwrap();
        }
        tx.commit(&ctx).unwrap();

        let snap = db.new_snapshot(&ctx).unwrap();
        let mut dumped = BTreeMap::new();
        for entry in snap.ascend(&ctx, b"", b"") {
            let (key, value) = entry.unwrap();
            dumped.insert(key, read_value(value).unwrap());
        }
        prop_assert_eq!(&dumped, &entries);
        for (key, value) in &entries {
            prop_assert_eq!(&read_value(snap.get(&ctx, key).unwrap()).unwrap(), value);
        }
    }
}
