//! CBOR-encoded typed values.
//!
//! Values written with [`set_cbor`] are plain CBOR, so any CBOR reader can
//! decode them. Decode failures name the key they happened at.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use unikv_storage::{Context, Getter, KvError, KvIter, Ranger, Setter, ValueReader};

/// Reads the value at `key` and decodes it as `T`.
///
/// ```
/// use unikv_core::{get_cbor, set_cbor, with_read_writer};
/// use unikv_storage::{Context, MemoryDatabase};
///
/// let db = MemoryDatabase::new();
/// let ctx = Context::background();
/// let loaded: Vec<u32> = with_read_writer(&ctx, &db, |ctx, tx| {
///     set_cbor(ctx, tx, b"primes", &vec![2u32, 3, 5])?;
///     get_cbor(ctx, &*tx, b"primes")
/// })
/// .unwrap();
/// assert_eq!(loaded, vec![2, 3, 5]);
/// ```
///
/// # Errors
///
/// Returns the backend's error (`NotFound` included) or
/// [`CoreError::Value`] if the bytes are not a `T`.
pub fn get_cbor<T, G>(ctx: &Context, getter: &G, key: &[u8]) -> CoreResult<T>
where
    T: DeserializeOwned,
    G: Getter + ?Sized,
{
    decode(key, getter.get(ctx, key)?)
}

/// Encodes `value` as CBOR and stores it at `key`.
///
/// # Errors
///
/// Returns [`CoreError::Value`] if `value` cannot be encoded, or the
/// backend's error.
pub fn set_cbor<T, S>(ctx: &Context, setter: &mut S, key: &[u8], value: &T) -> CoreResult<()>
where
    T: Serialize + ?Sized,
    S: Setter + ?Sized,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|err| CoreError::value(key, format!("encoding failed: {err:?}")))?;
    setter.set(ctx, key, &mut buf.as_slice())?;
    Ok(())
}

/// Iterates `[begin, end)` in ascending order, decoding each value as `T`.
pub fn ascend_cbor<'a, T, R>(ctx: &Context, ranger: &'a R, begin: &[u8], end: &[u8]) -> CborIter<'a, T>
where
    T: DeserializeOwned,
    R: Ranger + ?Sized,
{
    CborIter::new(ranger.ascend(ctx, begin, end))
}

/// Iterates `[begin, end)` in descending order, decoding each value as `T`.
pub fn descend_cbor<'a, T, R>(
    ctx: &Context,
    ranger: &'a R,
    begin: &[u8],
    end: &[u8],
) -> CborIter<'a, T>
where
    T: DeserializeOwned,
    R: Ranger + ?Sized,
{
    CborIter::new(ranger.descend(ctx, begin, end))
}

/// Iterator of decoded `(key, value)` pairs. Ends after its first error.
pub struct CborIter<'a, T> {
    inner: KvIter<'a>,
    failed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> CborIter<'a, T> {
    fn new(inner: KvIter<'a>) -> Self {
        Self {
            inner,
            failed: false,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Iterator for CborIter<'_, T> {
    type Item = CoreResult<(Vec<u8>, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.inner.next()? {
            Ok((key, value)) => decode(&key, value).map(|decoded| (key, decoded)),
            Err(err) => Err(err.into()),
        };
        self.failed = item.is_err();
        Some(item)
    }
}

fn decode<T: DeserializeOwned>(key: &[u8], value: ValueReader) -> CoreResult<T> {
    ciborium::from_reader(value).map_err(|err| match err {
        ciborium::de::Error::Io(err) if err.kind() != io::ErrorKind::UnexpectedEof => {
            CoreError::Storage(KvError::Io(err))
        }
        other => CoreError::value(key, format!("decoding failed: {other:?}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoped::with_read_writer;
    use serde::Deserialize;
    use unikv_storage::{Database, MemoryDatabase, Transaction};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    fn user(name: &str, age: u32) -> User {
        User {
            name: name.to_string(),
            age,
        }
    }

    fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        with_read_writer(&ctx, &db, |ctx, tx| -> CoreResult<()> {
            set_cbor(ctx, tx, b"user/1", &user("ada", 36))?;
            set_cbor(ctx, tx, b"user/2", &user("grace", 45))?;
            set_cbor(ctx, tx, b"user/3", &user("alan", 41))?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn struct_round_trip() {
        let db = seeded();
        let ctx = Context::background();
        let snap = db.new_snapshot(&ctx).unwrap();
        let loaded: User = get_cbor(&ctx, &snap, b"user/2").unwrap();
        assert_eq!(loaded, user("grace", 45));
        assert!(get_cbor::<User, _>(&ctx, &snap, b"user/9")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn typed_iteration_in_both_directions() {
        let db = seeded();
        let ctx = Context::background();
        let snap = db.new_snapshot(&ctx).unwrap();

        let names: Vec<String> = ascend_cbor::<User, _>(&ctx, &snap, b"user/", b"user0")
            .map(|item| item.unwrap().1.name)
            .collect();
        assert_eq!(names, ["ada", "grace", "alan"]);

        let keys: Vec<Vec<u8>> = descend_cbor::<User, _>(&ctx, &snap, b"", b"")
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(keys, [b"user/3".to_vec(), b"user/2".to_vec(), b"user/1".to_vec()]);
    }

    #[test]
    fn wrong_type_names_key_and_stops_iteration() {
        let db = seeded();
        let ctx = Context::background();
        let mut tx = db.new_transaction(&ctx).unwrap();
        tx.set(&ctx, b"user/15", &mut &b"\xff\xff"[..]).unwrap();

        let mut iter = ascend_cbor::<User, _>(&ctx, &tx, b"", b"");
        assert!(iter.next().unwrap().is_ok());
        match iter.next().unwrap() {
            Err(CoreError::Value { key, .. }) => assert_eq!(key, b"user/15"),
            other => panic!("expected value error, got {:?}", other.map(|(k, _)| k)),
        }
        assert!(iter.next().is_none());
        drop(iter);
        tx.rollback(&ctx).unwrap();
    }

    #[test]
    fn invalid_range_is_reported() {
        let db = seeded();
        let ctx = Context::background();
        let snap = db.new_snapshot(&ctx).unwrap();
        let mut iter = descend_cbor::<User, _>(&ctx, &snap, b"z", b"a");
        assert!(iter.next().unwrap().unwrap_err().is_invalid_argument());
        assert!(iter.next().is_none());
    }
}
