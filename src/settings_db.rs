use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

const MANIFEST: TableDefinition<&str, &[u8]> = TableDefinition::new("manifest");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const STATE: TableDefinition<&str, u64> = TableDefinition::new("state");

/// Small key/value database holding user settings, the index manifest and
/// internal index counters.
pub struct SettingsDb {
    db: Database,
}

impl SettingsDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(MANIFEST)?;
        txn.open_table(SETTINGS)?;
        txn.open_table(STATE)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Manifest --

    /// Replace the whole manifest with `entries` in a single transaction.
    ///
    /// Entries for documents that are no longer present disappear, so the
    /// stored manifest always mirrors the last successfully indexed set.
    pub fn replace_manifest(
        &self,
        entries: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(MANIFEST)?;
        {
            let mut table = txn.open_table(MANIFEST)?;
            for (path, data) in entries {
                table.insert(path.as_str(), data.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    #[cfg(test)]
    fn get_manifest_entry(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MANIFEST)?;
        Ok(table.get(path)?.map(|v| v.value().to_vec()))
    }

    /// Return all (path, entry_bytes) pairs in a single read transaction.
    pub fn list_manifest(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MANIFEST)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(result)
    }

    pub fn clear_manifest(&self) -> Result<()> {
        self.replace_manifest(&[])
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Index state --

    /// A stored counter, zero when never set.
    pub fn get_counter(&self, key: &str) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        Ok(table.get(key)?.map(|v| v.value()).unwrap_or(0))
    }

    pub fn set_counter(&self, key: &str, value: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for SettingsDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsDb").finish_non_exhaustive()
    }
}
