use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::{error::ErrorKind, Result};

use super::{decode, encode, Collectable, Identifiable};

#[derive(Clone, Debug)]
pub struct SledDb {
    inner: sled::Db,
}

impl SledDb {
    pub fn new() -> Result<Self> {
        Self::new_at("./db")
    }

    pub fn new_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let inner = sled::Config::default().path(path).open()?;
        Ok(Self { inner })
    }

    /// In-memory store that exists only for the lifetime of the handle.
    /// Used by the test suites.
    pub fn temporary() -> Result<Self> {
        let inner = sled::Config::default().temporary(true).open()?;
        Ok(Self { inner })
    }

    pub fn get_collection<T: DeserializeOwned + Collectable>(&self) -> Result<Vec<T>> {
        self.get_collection_at(T::get_collection_name())
    }

    /// Gets a collection of entries of the same type from the collection
    /// specified by name.
    pub fn get_collection_at<T: DeserializeOwned>(
        &self,
        name: impl AsRef<[u8]>,
    ) -> Result<Vec<T>> {
        let tree = self.inner.open_tree(name)?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value_bytes) = entry?;
            let value: T = decode(&value_bytes)?;
            out.push(value);
        }
        Ok(out)
    }

    /// Returns the length of the collection as defined for the specified type.
    pub fn len<T: Collectable>(&self) -> Result<usize> {
        Ok(self.inner.open_tree(T::get_collection_name())?.len())
    }

    /// Gets an item from the collection defined for the item type.
    pub fn get<T: DeserializeOwned + Collectable>(&self, id: Uuid) -> Result<T> {
        self.get_opt(id)?.ok_or_else(|| {
            ErrorKind::DbError(format!(
                "entity with id '{}' not found in collection {}",
                id,
                T::get_collection_name()
            ))
            .into()
        })
    }

    /// Gets an item from the collection defined for the item type, with
    /// absence reported as `None` rather than an error.
    pub fn get_opt<T: DeserializeOwned + Collectable>(&self, id: Uuid) -> Result<Option<T>> {
        let tree = self.inner.open_tree(T::get_collection_name())?;
        match tree.get(id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + Identifiable + Collectable>(&self, value: &T) -> Result<()> {
        self.set_at(T::get_collection_name(), value)?;
        Ok(())
    }

    pub fn set_at<T: Serialize + Identifiable>(
        &self,
        collection: impl AsRef<[u8]>,
        value: &T,
    ) -> Result<()> {
        self.set_raw_at(collection, value, value.get_id())?;
        Ok(())
    }

    pub fn set_raw_at<T: Serialize>(
        &self,
        collection: impl AsRef<[u8]>,
        value: &T,
        id: Uuid,
    ) -> Result<()> {
        let tree = self.inner.open_tree(collection)?;
        let encoded = encode(value)?;
        tree.insert(id, encoded)?;
        Ok(())
    }

    /// Atomically applies `update` to the stored item. Lost-update safe:
    /// concurrent callers each see a consistent prior value. Returns
    /// whether the item existed; a missing item is left missing.
    pub fn update<T, F>(&self, id: Uuid, update: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned + Collectable,
        F: Fn(&mut T),
    {
        self.update_at(T::get_collection_name(), id, update)
    }

    pub fn update_at<T, F>(&self, collection: impl AsRef<[u8]>, id: Uuid, update: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T),
    {
        let tree = self.inner.open_tree(collection)?;
        let result = tree.update_and_fetch(id, |existing| {
            let bytes = existing?;
            match decode::<T>(bytes) {
                Ok(mut value) => {
                    update(&mut value);
                    // An encode failure must not drop the record.
                    encode(&value).ok().or_else(|| Some(bytes.to_vec()))
                }
                Err(_) => Some(bytes.to_vec()),
            }
        })?;
        Ok(result.is_some())
    }

    /// Atomic create-if-absent on a raw key. Returns true when this call
    /// created the entry, false when it already existed. The compare and
    /// swap runs against absence, so two racing callers cannot both win.
    pub fn create_if_absent_at(
        &self,
        collection: impl AsRef<[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool> {
        let tree = self.inner.open_tree(collection)?;
        let outcome = tree.compare_and_swap(key, None as Option<&[u8]>, Some(value))?;
        Ok(outcome.is_ok())
    }

    pub fn remove<T: Identifiable + Collectable>(&self, value: &T) -> Result<()> {
        self.remove_at(T::get_collection_name(), value.get_id())
    }

    pub fn remove_at(&self, collection: impl AsRef<[u8]>, id: Uuid) -> Result<()> {
        let tree = self.inner.open_tree(collection)?;
        tree.remove(id)?;
        Ok(())
    }

    pub fn clear_at(&self, collection: &str) -> Result<()> {
        let tree = self.inner.open_tree(collection)?;
        tree.clear()?;
        Ok(())
    }

    pub fn clear<T: Collectable>(&self) -> Result<()> {
        let tree = self.inner.open_tree(T::get_collection_name())?;
        tree.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: Uuid,
        count: u64,
    }

    impl Collectable for Widget {
        fn get_collection_name() -> &'static str {
            "widgets"
        }
    }

    impl Identifiable for Widget {
        fn get_id(&self) -> Uuid {
            self.id
        }
    }

    #[test]
    fn set_get_roundtrip() {
        let db = SledDb::temporary().unwrap();
        let widget = Widget {
            id: Uuid::new_v4(),
            count: 3,
        };
        db.set(&widget).unwrap();
        assert_eq!(db.get::<Widget>(widget.id).unwrap(), widget);
        assert_eq!(db.get_opt::<Widget>(Uuid::new_v4()).unwrap(), None);
        assert!(db.get::<Widget>(Uuid::new_v4()).is_err());
    }

    #[test]
    fn update_increments_in_place() {
        let db = SledDb::temporary().unwrap();
        let widget = Widget {
            id: Uuid::new_v4(),
            count: 0,
        };
        db.set(&widget).unwrap();

        for _ in 0..5 {
            assert!(db.update::<Widget, _>(widget.id, |w| w.count += 1).unwrap());
        }
        assert_eq!(db.get::<Widget>(widget.id).unwrap().count, 5);
    }

    #[test]
    fn update_on_missing_is_noop() {
        let db = SledDb::temporary().unwrap();
        let touched = db
            .update::<Widget, _>(Uuid::new_v4(), |w| w.count += 1)
            .unwrap();
        assert!(!touched);
        assert_eq!(db.len::<Widget>().unwrap(), 0);
    }

    #[test]
    fn create_if_absent_wins_once() {
        let db = SledDb::temporary().unwrap();
        assert!(db.create_if_absent_at("dedup", b"key", b"a").unwrap());
        assert!(!db.create_if_absent_at("dedup", b"key", b"b").unwrap());
        assert!(db.create_if_absent_at("dedup", b"other", b"c").unwrap());
    }
}
