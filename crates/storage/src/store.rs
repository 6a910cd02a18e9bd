use crate::{
    errors::StoreError,
    models::{NewPrediction, StoredPrediction},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
};
use std::path::Path;

const MAX_CONNECTIONS: u32 = 5;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image_path TEXT,
        predictions_json TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        device_type TEXT
    )
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, image_path, predictions_json, created_at, device_type FROM predictions";

/// Handle to the predictions database.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PredictionStore {
    pool: SqlitePool,
}

impl PredictionStore {
    /// Opens the database file (creating it if missing) and ensures the table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;

        tracing::info!(path = %path.as_ref().display(), "Prediction store ready");
        Ok(store)
    }

    /// Creates the `predictions` table if it does not exist yet.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Appends one prediction and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected by the database.
    pub async fn save(&self, new: &NewPrediction<'_>) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO predictions (image_path, predictions_json, device_type)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&new.image_path)
        .bind(Json(new.predictions))
        .bind(&new.device_type)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(
            id,
            image_path = %new.image_path,
            device_type = %new.device_type,
            "Prediction saved"
        );
        Ok(id)
    }

    /// Returns up to `limit` predictions, newest first.
    ///
    /// `created_at` only has second resolution, so rows inserted within the same
    /// second are ordered by id.
    pub async fn latest(&self, limit: u32) -> Result<Vec<StoredPrediction>, StoreError> {
        let rows = sqlx::query_as::<_, StoredPrediction>(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Looks up a single prediction by id.
    pub async fn by_id(&self, id: i64) -> Result<Option<StoredPrediction>, StoreError> {
        let row = sqlx::query_as::<_, StoredPrediction>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Total number of stored predictions.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEVICE_API;
    use inference::{Detection, DetectionResult};
    use tempfile::tempdir;

    fn sample_result(label: &str) -> DetectionResult {
        [Detection::new([10.0, 20.0, 30.0, 40.0], label, 0.9)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.db");

        let store = PredictionStore::open(&path).await.unwrap();
        assert!(path.exists(), "Database file should be created");
        assert_eq!(store.count().await.unwrap(), 0);

        // Re-running init on an existing schema is a no-op
        store.init().await.unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn test_save_and_lookup_by_id() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path().join("p.db")).await.unwrap();

        let result = sample_result("carpetweed");
        let id = store
            .save(&NewPrediction::new("uploads/one.jpg", &result).with_device(DEVICE_API))
            .await
            .unwrap();

        let stored = store.by_id(id).await.unwrap().expect("row should exist");
        assert_eq!(stored.id, id);
        assert_eq!(stored.image_path, "uploads/one.jpg");
        assert_eq!(stored.device_type, "api");
        assert_eq!(stored.predictions_json.0, result);

        assert!(store.by_id(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path().join("p.db")).await.unwrap();
        let result = DetectionResult::default();

        let first = store
            .save(&NewPrediction::new("a.jpg", &result))
            .await
            .unwrap();
        let second = store
            .save(&NewPrediction::new("b.jpg", &result))
            .await
            .unwrap();
        assert!(second > first);

        let stored = store.by_id(first).await.unwrap().unwrap();
        assert_eq!(stored.device_type, "unknown");
    }

    #[tokio::test]
    async fn test_latest_returns_newest_first() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path().join("p.db")).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..5 {
            let result = sample_result(&format!("weed_class_{i}"));
            let path = format!("uploads/{i}.jpg");
            ids.push(store.save(&NewPrediction::new(path, &result)).await.unwrap());
        }

        let latest = store.latest(3).await.unwrap();
        let latest_ids: Vec<i64> = latest.iter().map(|p| p.id).collect();
        assert_eq!(latest_ids, vec![ids[4], ids[3], ids[2]]);

        let all = store.latest(10).await.unwrap();
        assert_eq!(all.len(), 5);
    }
}
