//! Single-record settings storage using SQLite.
//!
//! The credential is sealed with AES-256-GCM before it is written. The four
//! dependent identifiers are stored in clear.

use super::{ConfigurationRecord, ModelId, SealingKey};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Persistence failures. Messages never carry field values.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("credential encryption failed: {0}")]
    Encryption(String),

    #[error("settings store lock poisoned")]
    Poisoned,
}

/// Settings storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE settings (
///     id INTEGER PRIMARY KEY CHECK (id = 1),
///     credential TEXT,                  -- Encrypted (NULL when unset)
///     credential_nonce TEXT,            -- Nonce for credential
///     persona_id TEXT NOT NULL,
///     avatar_id TEXT NOT NULL,
///     voice_id TEXT NOT NULL,
///     model_id TEXT NOT NULL,
///     updated_at TEXT NOT NULL          -- ISO 8601 timestamp
/// );
/// ```
///
/// A missing row reads as the all-default record. Every write replaces the
/// whole row in one statement, so a reader never sees half of a save.
///
/// # Thread Safety
/// - Connection is wrapped in Mutex, which serializes writers
pub struct SettingsStore {
    conn: Mutex<Connection>,
    key: SealingKey,
}

impl SettingsStore {
    /// Creates or opens the settings database.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `key` - Master key sealing the credential column
    pub fn new<P: AsRef<Path>>(db_path: P, key: SealingKey) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                credential TEXT,
                credential_nonce TEXT,
                persona_id TEXT NOT NULL,
                avatar_id TEXT NOT NULL,
                voice_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Reads the current record, or the default record if none was saved.
    pub fn get(&self) -> Result<ConfigurationRecord, StorageError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                r#"
                SELECT credential, credential_nonce,
                       persona_id, avatar_id, voice_id, model_id
                FROM settings
                WHERE id = 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((sealed, nonce, persona_id, avatar_id, voice_id, model_id)) = row else {
            return Ok(ConfigurationRecord::default());
        };

        let credential = match (sealed, nonce) {
            (Some(sealed), Some(nonce)) => self
                .key
                .open(&sealed, &nonce)
                .map_err(|e| StorageError::Encryption(e.to_string()))?,
            _ => String::new(),
        };

        Ok(ConfigurationRecord::new(
            credential,
            persona_id,
            avatar_id,
            voice_id,
            ModelId::clamp(&model_id),
        ))
    }

    /// Replaces the stored record.
    pub fn put(&self, record: &ConfigurationRecord) -> Result<(), StorageError> {
        let (sealed, nonce) = if record.has_credential() {
            let (sealed, nonce) = self
                .key
                .seal(record.credential())
                .map_err(|e| StorageError::Encryption(e.to_string()))?;
            (Some(sealed), Some(nonce))
        } else {
            (None, None)
        };

        let now = Utc::now().to_rfc3339();

        self.lock()?.execute(
            r#"
            INSERT INTO settings (
                id, credential, credential_nonce,
                persona_id, avatar_id, voice_id, model_id, updated_at
            )
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                credential = excluded.credential,
                credential_nonce = excluded.credential_nonce,
                persona_id = excluded.persona_id,
                avatar_id = excluded.avatar_id,
                voice_id = excluded.voice_id,
                model_id = excluded.model_id,
                updated_at = excluded.updated_at
            "#,
            params![
                sealed,
                nonce,
                record.persona_id,
                record.avatar_id,
                record.voice_id,
                record.model_id.as_str(),
                now,
            ],
        )?;

        Ok(())
    }

    /// Resets to defaults by removing the row. Deleting an absent row is fine.
    pub fn delete(&self) -> Result<(), StorageError> {
        self.lock()?.execute("DELETE FROM settings WHERE id = 1", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn test_key() -> SealingKey {
        SealingKey::from_base64(&BASE64.encode([7u8; 32])).unwrap()
    }

    fn create_test_store() -> SettingsStore {
        SettingsStore::new(":memory:", test_key()).expect("Failed to create test store")
    }

    fn full_record() -> ConfigurationRecord {
        ConfigurationRecord::new("sk-abc", "persona-1", "avatar-1", "voice-1", ModelId::Gemini25Flash)
    }

    #[test]
    fn test_get_without_row_returns_default() {
        let store = create_test_store();
        assert_eq!(store.get().unwrap(), ConfigurationRecord::default());
    }

    #[test]
    fn test_put_and_get() {
        let store = create_test_store();
        store.put(&full_record()).unwrap();

        let record = store.get().unwrap();
        assert_eq!(record, full_record());
        assert_eq!(record.credential(), "sk-abc");
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let store = create_test_store();
        store.put(&full_record()).unwrap();

        let replacement = ConfigurationRecord::new("sk-new", "p2", "a2", "v2", ModelId::Gpt4oMini);
        store.put(&replacement).unwrap();

        assert_eq!(store.get().unwrap(), replacement);
    }

    #[test]
    fn test_empty_credential_with_dependents_is_accepted() {
        let store = create_test_store();
        let record = ConfigurationRecord::new("", "p", "a", "v", ModelId::Gpt4oMini);
        store.put(&record).unwrap();

        let read = store.get().unwrap();
        assert_eq!(read, record);
        assert!(!read.is_complete());
    }

    #[test]
    fn test_credential_is_not_stored_in_clear() {
        let store = create_test_store();
        store.put(&full_record()).unwrap();

        let conn = store.conn.lock().unwrap();
        let stored: String = conn
            .query_row("SELECT credential FROM settings WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, "sk-abc");
        assert!(!stored.contains("sk-abc"));
    }

    #[test]
    fn test_delete_resets_to_default() {
        let store = create_test_store();
        store.put(&full_record()).unwrap();

        store.delete().unwrap();
        assert_eq!(store.get().unwrap(), ConfigurationRecord::default());

        // Deleting again is harmless
        store.delete().unwrap();
        assert_eq!(store.get().unwrap(), ConfigurationRecord::default());
    }

    #[test]
    fn test_unknown_stored_model_reads_as_default() {
        let store = create_test_store();
        store.put(&full_record()).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE settings SET model_id = 'retired-model' WHERE id = 1", [])
            .unwrap();

        assert_eq!(store.get().unwrap().model_id, ModelId::default());
    }

    #[test]
    fn test_reopen_with_wrong_key_fails_to_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        let store = SettingsStore::new(&path, test_key()).unwrap();
        store.put(&full_record()).unwrap();
        drop(store);

        let other_key = SealingKey::from_base64(&BASE64.encode([9u8; 32])).unwrap();
        let reopened = SettingsStore::new(&path, other_key).unwrap();
        let err = reopened.get().unwrap_err();
        assert!(matches!(err, StorageError::Encryption(_)));
        assert!(!err.to_string().contains("sk-abc"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        SettingsStore::new(&path, test_key())
            .unwrap()
            .put(&full_record())
            .unwrap();

        let reopened = SettingsStore::new(&path, test_key()).unwrap();
        assert_eq!(reopened.get().unwrap(), full_record());
    }
}
