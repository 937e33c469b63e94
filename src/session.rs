use std::collections::HashMap;
use std::path::PathBuf;

use crate::Error;

/// What survives of a resumable upload between invocations: the server-assigned session url and,
/// once any data has been accepted, the first up-to-16 bytes of the payload.
///
/// A record without a `first_chunk` belongs to a session that has accepted no data yet. When a
/// resumed upload presents a different first chunk than the recorded one, the payload has changed
/// and the session must be abandoned for a fresh one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    /// The upload url the server assigned to this session.
    pub uri: String,
    /// The first bytes of the payload as the server saw them (after compression, when used).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "first_chunk_base64")]
    pub first_chunk: Option<Vec<u8>>,
}

/// An on-disk map from object name to [`SessionRecord`], so an interrupted upload can be resumed
/// by a later process.
///
/// Records are keyed by object name alone; uploading objects of the same name in different
/// buckets concurrently from one machine will confuse the store, as will concurrent uploads to
/// one name. Callers serialize those. Writes replace the whole file atomically.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl Default for SessionStore {
    fn default() -> Self {
        let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            path: base.join("gcs-objects").join("resumable-sessions.json"),
        }
    }
}

impl SessionStore {
    /// A store backed by the given file instead of the per-user default.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Looks up the persisted session for `object_name`, if any.
    pub async fn get(&self, object_name: &str) -> Result<Option<SessionRecord>, Error> {
        Ok(self.load().await?.remove(object_name))
    }

    /// Stores (or replaces) the session for `object_name`.
    pub async fn put(&self, object_name: &str, record: SessionRecord) -> Result<(), Error> {
        let mut records = self.load().await?;
        records.insert(object_name.to_string(), record);
        self.save(&records).await
    }

    /// Forgets the session for `object_name`. Deleting a session that does not exist is fine.
    pub async fn delete(&self, object_name: &str) -> Result<(), Error> {
        let mut records = self.load().await?;
        if records.remove(object_name).is_some() {
            self.save(&records).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<HashMap<String, SessionRecord>, Error> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &HashMap<String, SessionRecord>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash mid-write never leaves a torn file behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }
}

mod first_chunk_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S: Serializer>(
        chunk: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match chunk {
            Some(bytes) => serializer.serialize_str(&ENGINE.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => ENGINE
                .decode(encoded)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_store() -> SessionStore {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let file = format!(
            "gcs-objects-session-test-{}-{}.json",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed),
        );
        SessionStore::with_path(std::env::temp_dir().join(file))
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let store = scratch_store();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_round_trip() {
        let store = scratch_store();
        let record = SessionRecord {
            uri: "https://upload.example/session/1".to_string(),
            first_chunk: Some(b"0123456789abcdef".to_vec()),
        };
        store.put("file.bin", record.clone()).await.unwrap();
        assert_eq!(store.get("file.bin").await.unwrap(), Some(record));

        store.delete("file.bin").await.unwrap();
        assert_eq!(store.get("file.bin").await.unwrap(), None);
        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn a_record_without_data_omits_the_first_chunk() {
        let store = scratch_store();
        store
            .put(
                "fresh.bin",
                SessionRecord {
                    uri: "https://upload.example/session/2".to_string(),
                    first_chunk: None,
                },
            )
            .await
            .unwrap();
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(!raw.contains("first_chunk"));

        // and upgrading it with a chunk keeps other records intact
        store
            .put(
                "other.bin",
                SessionRecord {
                    uri: "https://upload.example/session/3".to_string(),
                    first_chunk: Some(vec![1, 2, 3]),
                },
            )
            .await
            .unwrap();
        assert!(store.get("fresh.bin").await.unwrap().is_some());
        let _ = tokio::fs::remove_file(store.path()).await;
    }
}
