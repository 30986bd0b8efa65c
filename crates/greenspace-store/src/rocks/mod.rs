//! `RocksDB` storage implementation.
//!
//! The store opens a pessimistic `TransactionDB`. Every repository call runs
//! on a [`StoreTx`], and rows read for modification are locked with
//! `get_for_update` so concurrent read-modify-write cycles serialise.

mod cluster;
mod plan;
mod reference;
mod sensor;
mod tree;

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    Transaction, TransactionDB, TransactionDBOptions,
};

use crate::error::{Result, StoreError};
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<TransactionDB<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            cf_descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Store for RocksStore {
    type Tx<'a> = StoreTx<'a>;

    fn with_tx<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Self::Tx<'_>) -> std::result::Result<T, E>,
    {
        let tx = StoreTx {
            db: &self.db,
            txn: self.db.transaction(),
        };
        // Dropping an uncommitted transaction rolls it back.
        let out = f(&tx)?;
        tx.txn.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

/// A transaction handle implementing every repository.
pub struct StoreTx<'a> {
    db: &'a TransactionDB<MultiThreaded>,
    txn: Transaction<'a, TransactionDB<MultiThreaded>>,
}

impl<'a> StoreTx<'a> {
    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.txn
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Read a row and take an exclusive lock on it until commit.
    fn get_for_update<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.txn
            .get_for_update_cf(&cf, key, true)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        Ok(self.txn.get_cf(&cf, key)?)
    }

    fn get_raw_for_update(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        Ok(self.txn.get_for_update_cf(&cf, key, true)?)
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.txn.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn put_raw(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.txn.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.txn.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Deserialize every value of a column family in key order.
    fn scan_values<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.txn.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Collect every key/value pair under a prefix.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let mut entries = Vec::new();
        let iter = self
            .txn
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Allocate the next value of a sequence, starting at 1.
    fn next_id(&self, sequence: &str) -> Result<i64> {
        let current = match self.get_raw_for_update(cf::META, sequence.as_bytes())? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    StoreError::Serialization(format!("corrupt sequence {sequence}"))
                })?;
                i64::from_be_bytes(bytes)
            }
            None => 0,
        };
        let next = current + 1;
        self.put_raw(cf::META, sequence.as_bytes(), &next.to_be_bytes())?;
        Ok(next)
    }

    /// Allocate the next value of a 32-bit sequence.
    fn next_id_i32(&self, sequence: &str) -> Result<i32> {
        let next = self.next_id(sequence)?;
        i32::try_from(next)
            .map_err(|_| StoreError::Database(format!("sequence {sequence} exhausted")))
    }
}
