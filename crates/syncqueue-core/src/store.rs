//! Durable queue persistence using redb
//!
//! Each category's queue is stored as one value under a category-scoped
//! key, rewritten in full on every mutation. redb write transactions commit
//! atomically, so a reader never observes a partially written list.
//! Discarded items live in a separate dead-letter table under the same key
//! scheme.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::warn;

use crate::error::{QueueError, QueueResult};
use crate::types::{Category, DeadLetter, PersistedQueue, QueueItem};

// Table definitions
const QUEUES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("queues");
const DEAD_LETTERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dead_letters");

/// Fixed prefix for category-scoped keys
const KEY_PREFIX: &str = "offline_queue/";

/// Durable store for per-category operation queues
#[derive(Clone)]
pub struct QueueStore {
    db: Arc<RwLock<Database>>,
}

impl QueueStore {
    /// Create a store at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create the queue and dead-letter tables
    pub fn new(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(QUEUES_TABLE)?;
            let _ = write_txn.open_table(DEAD_LETTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    fn key(category: &Category) -> String {
        format!("{}{}", KEY_PREFIX, category)
    }

    /// Load the persisted queue for a category.
    ///
    /// Returns an empty list if nothing has been persisted or the stored
    /// value is corrupt; corruption is logged, never fatal.
    pub fn load(&self, category: &Category) -> QueueResult<Vec<QueueItem>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(QUEUES_TABLE)?;
        let key = Self::key(category);

        match table.get(key.as_str())? {
            Some(v) => match serde_json::from_slice::<PersistedQueue>(v.value()) {
                Ok(persisted) => Ok(persisted.items),
                Err(e) => {
                    warn!(%category, error = %e, "Discarding corrupt persisted queue");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the persisted queue for a category with the full item list.
    pub fn save(&self, category: &Category, items: &[QueueItem]) -> QueueResult<()> {
        let persisted = PersistedQueue {
            category: category.clone(),
            items: items.to_vec(),
        };
        let data = serde_json::to_vec(&persisted)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUEUES_TABLE)?;
            let key = Self::key(category);
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// List every category with a persisted queue.
    pub fn categories(&self) -> QueueResult<Vec<Category>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(QUEUES_TABLE)?;

        let mut categories = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            if let Some(name) = key.value().strip_prefix(KEY_PREFIX) {
                categories.push(Category::new(name));
            }
        }
        Ok(categories)
    }

    /// Load the dead-letter list for a category.
    ///
    /// Corrupt values are treated the same way as corrupt queues: empty.
    pub fn load_dead_letters(&self, category: &Category) -> QueueResult<Vec<DeadLetter>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTERS_TABLE)?;
        let key = Self::key(category);

        match table.get(key.as_str())? {
            Some(v) => match serde_json::from_slice::<Vec<DeadLetter>>(v.value()) {
                Ok(letters) => Ok(letters),
                Err(e) => {
                    warn!(%category, error = %e, "Discarding corrupt dead-letter list");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    /// Append a discarded item to a category's dead-letter list.
    pub fn append_dead_letter(&self, category: &Category, letter: DeadLetter) -> QueueResult<()> {
        let mut letters = self.load_dead_letters(category)?;
        letters.push(letter);

        let data =
            serde_json::to_vec(&letters).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(DEAD_LETTERS_TABLE)?;
            let key = Self::key(category);
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove a category's persisted queue and dead letters.
    pub fn clear(&self, category: &Category) -> QueueResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let key = Self::key(category);
            let mut queues = write_txn.open_table(QUEUES_TABLE)?;
            let mut dead_letters = write_txn.open_table(DEAD_LETTERS_TABLE)?;

            queues.remove(key.as_str())?;
            dead_letters.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (QueueStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let store = QueueStore::new(&db_path).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_store_can_be_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        assert!(QueueStore::new(&db_path).is_ok());
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/path/to/test.redb");
        let store = QueueStore::new(&db_path);
        assert!(store.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_load_missing_category_is_empty() {
        let (store, _temp) = create_test_store();
        let items = store.load(&Category::new("messages")).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (store, _temp) = create_test_store();
        let category = Category::new("messages");

        let items = vec![
            QueueItem::new("send", vec![json!("user-42"), json!("hello")]),
            QueueItem::new("delete", vec![json!("msg-7")]),
            QueueItem::new("send", vec![json!("user-9"), json!("hi")]),
        ];
        store.save(&category, &items).unwrap();

        let loaded = store.load(&category).unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_save_overwrites_previous_list() {
        let (store, _temp) = create_test_store();
        let category = Category::new("messages");

        let items = vec![
            QueueItem::new("send", vec![json!("a")]),
            QueueItem::new("send", vec![json!("b")]),
        ];
        store.save(&category, &items).unwrap();
        store.save(&category, &items[1..]).unwrap();

        let loaded = store.load(&category).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], items[1]);
    }

    #[test]
    fn test_queue_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let category = Category::new("documents");

        let items = vec![QueueItem::new("upload", vec![json!({"doc": "cv.pdf"})])];
        {
            let store = QueueStore::new(&db_path).unwrap();
            store.save(&category, &items).unwrap();
        }

        let store = QueueStore::new(&db_path).unwrap();
        assert_eq!(store.load(&category).unwrap(), items);
    }

    #[test]
    fn test_corrupt_value_loads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let category = Category::new("messages");

        // Plant garbage bytes under the category key, then reopen
        {
            let db = Database::create(&db_path).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let mut table = write_txn.open_table(QUEUES_TABLE).unwrap();
                table
                    .insert("offline_queue/messages", b"{not json".as_slice())
                    .unwrap();
            }
            write_txn.commit().unwrap();
        }

        let store = QueueStore::new(&db_path).unwrap();
        let items = store.load(&category).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_categories_lists_persisted_queues() {
        let (store, _temp) = create_test_store();

        store
            .save(&Category::new("messages"), &[QueueItem::new("send", vec![])])
            .unwrap();
        store
            .save(&Category::new("documents"), &[QueueItem::new("upload", vec![])])
            .unwrap();

        let mut categories = store.categories().unwrap();
        categories.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(
            categories,
            vec![Category::new("documents"), Category::new("messages")]
        );
    }

    #[test]
    fn test_dead_letters_append_and_load() {
        let (store, _temp) = create_test_store();
        let category = Category::new("applications");

        let mut item = QueueItem::new("submit", vec![json!("app-1")]);
        item.record_failure("server rejected");
        store
            .append_dead_letter(&category, DeadLetter::new(item.clone()))
            .unwrap();

        let letters = store.load_dead_letters(&category).unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].item, item);
    }

    #[test]
    fn test_clear_removes_queue_and_dead_letters() {
        let (store, _temp) = create_test_store();
        let category = Category::new("messages");

        store
            .save(&category, &[QueueItem::new("send", vec![])])
            .unwrap();
        store
            .append_dead_letter(&category, DeadLetter::new(QueueItem::new("send", vec![])))
            .unwrap();

        store.clear(&category).unwrap();

        assert!(store.load(&category).unwrap().is_empty());
        assert!(store.load_dead_letters(&category).unwrap().is_empty());
        assert!(store.categories().unwrap().is_empty());
    }
}
