//! Backend conformance suite.
//!
//! Every `check_*` function takes an empty database and panics if the
//! backend breaks the contract. [`run_all`] runs the whole suite, asking the
//! factory for a fresh database per check.
//!
//! ```rust
//! use unikv_storage::MemoryDatabase;
//!
//! unikv_testkit::conformance::run_all(MemoryDatabase::new);
//! ```

use crate::fixtures::{backup_bytes, dump, populate, record_stream, value_of, Contents};
use std::io::Cursor;
use tracing::debug;
use unikv_core::{clear, restore, validate_backup, with_read_writer};
use unikv_storage::{
    read_value, Context, Database, Deleter, Getter, Ranger, Reader, Scanner, Setter, Snapshot,
    Transaction,
};

/// Runs every check against fresh databases from `factory`.
pub fn run_all<D, F>(mut factory: F)
where
    D: Database,
    F: FnMut() -> D,
{
    let checks: &[(&str, fn(&D))] = &[
        ("set_then_get", check_set_then_get),
        ("empty_key_rejected", check_empty_key_rejected),
        ("missing_key_not_found", check_missing_key_not_found),
        ("inverted_range_rejected", check_inverted_range_rejected),
        ("range_order_and_bounds", check_range_order_and_bounds),
        ("read_your_writes", check_read_your_writes),
        ("snapshot_is_point_in_time", check_snapshot_is_point_in_time),
        ("terminal_states_absorb", check_terminal_states_absorb),
        ("conflicting_writers", check_conflicting_writers),
        ("iterated_read_conflicts", check_iterated_read_conflicts),
        ("failed_work_leaves_store", check_failed_work_leaves_store),
        ("cancelled_context", check_cancelled_context),
        ("backup_restore_roundtrip", check_backup_restore_roundtrip),
        ("validate_detects_flips", check_validate_detects_flips),
        ("clear_empties_store", check_clear_empties_store),
        ("restore_chunking_invisible", check_restore_chunking_invisible),
        ("restore_three_in_two_chunks", check_restore_three_in_two_chunks),
    ];
    for (name, check) in checks {
        debug!(check = *name, "running conformance check");
        check(&factory());
    }
}

fn read_all(
    reader: &dyn Reader,
    ctx: &Context,
    begin: &[u8],
    end: &[u8],
    descending: bool,
) -> Vec<Vec<u8>> {
    let iter = if descending {
        reader.descend(ctx, begin, end)
    } else {
        reader.ascend(ctx, begin, end)
    };
    iter.map(|entry| entry.expect("Iteration failed").0).collect()
}

fn keys(names: &[&str]) -> Vec<Vec<u8>> {
    names.iter().map(|name| name.as_bytes().to_vec()).collect()
}

/// `set` then `get` returns exactly the bytes written, overwrites included.
pub fn check_set_then_get<D: Database>(db: &D) {
    let ctx = Context::background();
    let binary: Vec<u8> = (0..=255).collect();
    populate(
        db,
        [
            (&b"bin"[..], &binary[..]),
            (&b"empty"[..], &b""[..]),
            (&b"text"[..], &b"hello"[..]),
        ],
    );
    assert_eq!(value_of(db, b"bin"), Some(binary));
    assert_eq!(value_of(db, b"empty"), Some(Vec::new()));

    populate(db, [("text", "replaced")]);
    assert_eq!(value_of(db, b"text"), Some(b"replaced".to_vec()));

    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    let value = tx.get(&ctx, b"text").expect("Failed to get");
    assert_eq!(read_value(value).expect("Failed to read value"), b"replaced");
    tx.rollback(&ctx).expect("Failed to roll back");
}

/// Empty keys are `InvalidArgument` for every keyed operation.
pub fn check_empty_key_rejected<D: Database>(db: &D) {
    let ctx = Context::background();
    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    assert!(tx.get(&ctx, b"").err().expect("get accepted empty key").is_invalid_argument());
    assert!(tx
        .set(&ctx, b"", &mut &b"v"[..])
        .expect_err("set accepted empty key")
        .is_invalid_argument());
    assert!(tx
        .delete(&ctx, b"")
        .expect_err("delete accepted empty key")
        .is_invalid_argument());
    tx.rollback(&ctx).expect("Failed to roll back");

    let mut snapshot = db.new_snapshot(&ctx).expect("Failed to snapshot");
    assert!(snapshot.get(&ctx, b"").err().expect("get accepted empty key").is_invalid_argument());
    snapshot.discard(&ctx).expect("Failed to discard");
}

/// Absent keys are `NotFound` for `get` and `delete`.
pub fn check_missing_key_not_found<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("present", "1")]);

    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    assert!(tx.get(&ctx, b"absent").err().expect("absent key found").is_not_found());
    assert!(tx.delete(&ctx, b"absent").expect_err("deleted absent key").is_not_found());

    tx.delete(&ctx, b"present").expect("Failed to delete");
    assert!(tx.get(&ctx, b"present").err().expect("deleted key visible").is_not_found());
    assert!(tx.delete(&ctx, b"present").expect_err("deleted twice").is_not_found());
    tx.rollback(&ctx).expect("Failed to roll back");

    assert_eq!(value_of(db, b"present"), Some(b"1".to_vec()));
}

/// Ranges with a non-empty `begin` after `end` report `InvalidArgument`.
pub fn check_inverted_range_rejected<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("a", "1"), ("m", "2"), ("z", "3")]);

    let snapshot = db.new_snapshot(&ctx).expect("Failed to snapshot");
    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    let readers: [&dyn Reader; 2] = [&snapshot, &tx];
    for reader in readers {
        for mut iter in [reader.ascend(&ctx, b"z", b"a"), reader.descend(&ctx, b"z", b"a")] {
            let first = iter.next().expect("Inverted range reported nothing");
            assert!(first.err().expect("Inverted range yielded data").is_invalid_argument());
        }
        // a range that is empty but well formed is not an error
        assert!(reader.ascend(&ctx, b"m", b"m").next().is_none());
    }
    tx.rollback(&ctx).expect("Failed to roll back");
}

/// Ascend and descend honour half-open and open-ended bounds.
pub fn check_range_order_and_bounds<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("d", ""), ("b", ""), ("a", ""), ("c", ""), ("ca", "")]);

    let snapshot = db.new_snapshot(&ctx).expect("Failed to snapshot");
    assert_eq!(read_all(&snapshot, &ctx, b"", b"", false), keys(&["a", "b", "c", "ca", "d"]));
    assert_eq!(read_all(&snapshot, &ctx, b"", b"", true), keys(&["d", "ca", "c", "b", "a"]));
    assert_eq!(read_all(&snapshot, &ctx, b"b", b"d", false), keys(&["b", "c", "ca"]));
    assert_eq!(read_all(&snapshot, &ctx, b"b", b"d", true), keys(&["ca", "c", "b"]));
    assert_eq!(read_all(&snapshot, &ctx, b"c", b"", false), keys(&["c", "ca", "d"]));
    assert_eq!(read_all(&snapshot, &ctx, b"", b"b", true), keys(&["a"]));
    assert_eq!(snapshot.scan(&ctx).count(), 5);
}

/// A transaction sees its own writes; nobody else does until commit.
pub fn check_read_your_writes<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("a", "old"), ("b", "keep")]);

    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    tx.set(&ctx, b"a", &mut &b"new"[..]).expect("Failed to set");
    tx.set(&ctx, b"c", &mut &b"added"[..]).expect("Failed to set");
    tx.delete(&ctx, b"b").expect("Failed to delete");

    let value = tx.get(&ctx, b"a").expect("Own write invisible");
    assert_eq!(read_value(value).expect("Failed to read value"), b"new");
    assert_eq!(read_all(&tx, &ctx, b"", b"", false), keys(&["a", "c"]));
    assert_eq!(read_all(&tx, &ctx, b"", b"", true), keys(&["c", "a"]));

    let other = db.new_snapshot(&ctx).expect("Failed to snapshot");
    assert_eq!(read_all(&other, &ctx, b"", b"", false), keys(&["a", "b"]));
    assert_eq!(value_of(db, b"a"), Some(b"old".to_vec()));

    tx.commit(&ctx).expect("Failed to commit");
    assert_eq!(value_of(db, b"a"), Some(b"new".to_vec()));
    assert_eq!(value_of(db, b"b"), None);
    assert_eq!(value_of(db, b"c"), Some(b"added".to_vec()));
}

/// A snapshot keeps its view while later commits land.
pub fn check_snapshot_is_point_in_time<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("a", "1"), ("b", "2")]);

    let snapshot = db.new_snapshot(&ctx).expect("Failed to snapshot");
    let mut iter = snapshot.ascend(&ctx, b"", b"");
    let (first, _) = iter.next().expect("Empty snapshot").expect("Iteration failed");
    assert_eq!(first, b"a");

    populate(db, [("a", "changed"), ("aa", "new"), ("c", "3")]);

    let rest: Vec<Vec<u8>> = iter.map(|entry| entry.expect("Iteration failed").0).collect();
    assert_eq!(rest, keys(&["b"]));
    let value = snapshot.get(&ctx, b"a").expect("Snapshot lost key");
    assert_eq!(read_value(value).expect("Failed to read value"), b"1");
    assert!(snapshot.get(&ctx, b"c").err().expect("Snapshot saw later write").is_not_found());
}

/// Commit and rollback are terminal: any later terminal call is
/// `AlreadyClosed` and changes nothing.
pub fn check_terminal_states_absorb<D: Database>(db: &D) {
    let ctx = Context::background();

    let mut committed = db.new_transaction(&ctx).expect("Failed to begin");
    committed.set(&ctx, b"k", &mut &b"v"[..]).expect("Failed to set");
    committed.commit(&ctx).expect("Failed to commit");
    assert!(committed.commit(&ctx).expect_err("committed twice").is_already_closed());
    assert!(committed.rollback(&ctx).expect_err("rolled back a commit").is_already_closed());
    assert_eq!(value_of(db, b"k"), Some(b"v".to_vec()));

    let mut rolled_back = db.new_transaction(&ctx).expect("Failed to begin");
    rolled_back.set(&ctx, b"k", &mut &b"other"[..]).expect("Failed to set");
    rolled_back.rollback(&ctx).expect("Failed to roll back");
    assert!(rolled_back.commit(&ctx).expect_err("committed a rollback").is_already_closed());
    assert!(rolled_back.rollback(&ctx).expect_err("rolled back twice").is_already_closed());
    assert_eq!(value_of(db, b"k"), Some(b"v".to_vec()));

    let mut snapshot = db.new_snapshot(&ctx).expect("Failed to snapshot");
    snapshot.discard(&ctx).expect("Failed to discard unused snapshot");
}

/// Two transactions that read and write the same key cannot both commit.
pub fn check_conflicting_writers<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("counter", "0")]);

    let mut first = db.new_transaction(&ctx).expect("Failed to begin");
    let mut second = db.new_transaction(&ctx).expect("Failed to begin");
    for tx in [&mut first, &mut second] {
        let value = tx.get(&ctx, b"counter").expect("Failed to get");
        let mut next = read_value(value).expect("Failed to read value");
        next.push(b'+');
        tx.set(&ctx, b"counter", &mut &next[..]).expect("Failed to set");
    }

    first.commit(&ctx).expect("First commit failed");
    let err = second.commit(&ctx).expect_err("Both conflicting commits succeeded");
    assert!(err.is_conflict(), "expected a conflict, got {err}");
    assert_eq!(value_of(db, b"counter"), Some(b"0+".to_vec()));
    // cleanup after a failed commit is harmless
    let _ = second.rollback(&ctx);
    assert_eq!(value_of(db, b"counter"), Some(b"0+".to_vec()));
}

/// A key observed only through iteration is part of the commit check.
pub fn check_iterated_read_conflicts<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("balance", "100")]);

    let mut auditor = db.new_transaction(&ctx).expect("Failed to begin");
    let seen: Vec<(Vec<u8>, Vec<u8>)> = auditor
        .ascend(&ctx, b"", b"")
        .map(|entry| {
            let (key, value) = entry.expect("Iteration failed");
            (key, read_value(value).expect("Failed to read value"))
        })
        .collect();
    assert_eq!(seen, vec![(b"balance".to_vec(), b"100".to_vec())]);
    auditor
        .set(&ctx, b"audit", &mut &seen[0].1[..])
        .expect("Failed to set");

    populate(db, [("balance", "0")]);

    let err = auditor.commit(&ctx).expect_err("Commit after a stale iterated read succeeded");
    assert!(err.is_conflict(), "expected a conflict, got {err}");
    let _ = auditor.rollback(&ctx);
    assert_eq!(value_of(db, b"audit"), None);
    assert_eq!(value_of(db, b"balance"), Some(b"0".to_vec()));
}

/// A failing unit of work leaves the store as it was.
pub fn check_failed_work_leaves_store<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("a", "1"), ("b", "2")]);
    let before = dump(db);

    let result = with_read_writer(&ctx, db, |ctx, tx| {
        tx.set(ctx, b"a", &mut &b"changed"[..])?;
        tx.delete(ctx, b"b")?;
        tx.set(ctx, b"c", &mut &b"3"[..])?;
        tx.get(ctx, b"missing").map(|_| ())
    });
    assert!(result.expect_err("Work should have failed").is_not_found());
    assert_eq!(dump(db), before);
}

/// A cancelled context stops work at the store boundary.
pub fn check_cancelled_context<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("a", "1")]);

    let cancelled = ctx.child();
    cancelled.cancel();
    assert!(db
        .new_snapshot(&cancelled)
        .err()
        .expect("Snapshot opened on a cancelled context")
        .is_cancelled());

    let mut tx = db.new_transaction(&ctx).expect("Failed to begin");
    let err = tx
        .set(&cancelled, b"b", &mut &b"2"[..])
        .expect_err("Set ran on a cancelled context");
    assert!(err.is_cancelled());
    let mut iter = tx.ascend(&cancelled, b"", b"");
    assert!(iter
        .next()
        .expect("Cancelled iteration reported nothing")
        .err()
        .expect("Cancelled iteration yielded data")
        .is_cancelled());
    drop(iter);
    // cancellation does not close the transaction by itself
    tx.rollback(&ctx).expect("Failed to roll back");
}

/// Backup then restore into an empty store reproduces every pair.
pub fn check_backup_restore_roundtrip<D: Database>(db: &D) {
    let ctx = Context::background();
    let binary: Vec<u8> = (0..=255).rev().collect();
    populate(
        db,
        [
            (&b"\x00\xff"[..], &binary[..]),
            (&b"k1"[..], &b""[..]),
            (&b"k2"[..], &b"two"[..]),
        ],
    );
    populate(db, crate::fixtures::sample_entries(40));
    let expected = dump(db);

    let stream = backup_bytes(db);
    assert_eq!(
        validate_backup(&ctx, &stream[..]).expect("Valid backup rejected"),
        expected.len() as u64
    );
    clear(&ctx, db, 0).expect("Failed to clear");
    assert!(dump(db).is_empty());

    let stats = restore(&ctx, db, &stream[..], 7).expect("Failed to restore");
    assert_eq!(stats.records, expected.len() as u64);
    assert_eq!(dump(db), expected);
}

/// Flipping a key or value byte fails validation with a checksum mismatch.
pub fn check_validate_detects_flips<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, [("key", "value")]);
    let stream = backup_bytes(db);

    // array(3), bytes(3) "key", bytes(5) "value", checksum
    for at in [2usize, 4, 6, 10] {
        let mut corrupted = stream.clone();
        corrupted[at] ^= 0x04;
        let err = validate_backup(&ctx, Cursor::new(corrupted)).expect_err("Flip not detected");
        assert!(err.is_checksum_mismatch(), "byte {at}: {err}");
    }
}

/// Clearing with no chunk limit leaves nothing to iterate.
pub fn check_clear_empties_store<D: Database>(db: &D) {
    let ctx = Context::background();
    populate(db, crate::fixtures::sample_entries(30));

    let stats = clear(&ctx, db, 0).expect("Failed to clear");
    assert_eq!(stats.deleted, 30);
    assert_eq!(stats.transactions, 1);
    assert!(dump(db).is_empty());

    let again = clear(&ctx, db, 0).expect("Failed to clear empty store");
    assert_eq!(again.transactions, 0);
}

/// Restoring one record per transaction ends like restoring all at once.
pub fn check_restore_chunking_invisible<D: Database>(db: &D) {
    let ctx = Context::background();
    let stream = record_stream(crate::fixtures::sample_entries(12));

    let single = restore(&ctx, db, &stream[..], 1).expect("Failed to restore");
    assert_eq!(single.transactions, 12);
    let chunked: Contents = dump(db);

    clear(&ctx, db, 5).expect("Failed to clear");
    let whole = restore(&ctx, db, &stream[..], 0).expect("Failed to restore");
    assert_eq!(whole.transactions, 1);
    assert_eq!(dump(db), chunked);
}

/// Three records with two per transaction commit in exactly two chunks.
pub fn check_restore_three_in_two_chunks<D: Database>(db: &D) {
    let ctx = Context::background();
    let stream = record_stream([("a", "1"), ("b", "2"), ("c", "3")]);

    let stats = restore(&ctx, db, &stream[..], 2).expect("Failed to restore");
    assert_eq!(stats.records, 3);
    assert_eq!(stats.transactions, 2);
    for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
        assert_eq!(value_of(db, key.as_bytes()), Some(value.as_bytes().to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unikv_storage::MemoryDatabase;

    #[test]
    fn conflict_check_on_fresh_memory_database() {
        check_conflicting_writers(&MemoryDatabase::new());
    }

    #[test]
    fn flip_offsets_match_layout() {
        let stream = record_stream([("key", "value")]);
        assert_eq!(stream[0], 0x83);
        assert_eq!(&stream[2..5], b"key");
        assert_eq!(&stream[6..11], b"value");
    }
}
