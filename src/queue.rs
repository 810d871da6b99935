//! Article sources: where the list of saved articles comes from.
//!
//! The engine itself only ever sees `&[ArticleItem]`. A source hands it that
//! list for one queue, already in reading order. [`JsonQueue`] reads an
//! export of the browser store from disk, in either shape:
//!
//! ```text
//! [ {"id": "...", "title": "...", ...}, ... ]
//! {"items": [ {...}, ... ]}
//! ```
//!
//! Items with no `queue_id` belong to the `default` queue. Within a queue,
//! items sort by `order`, falling back to `created_at`, and ties keep their
//! file order.

use crate::types::ArticleItem;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("queue '{0}' has no articles")]
    Empty(String),
}

/// Supplies the articles of a queue in reading order.
pub trait ArticleSource {
    /// Articles in `queue`, or in every queue when `None`.
    fn list(&self, queue: Option<&str>) -> Result<Vec<ArticleItem>, QueueError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueueFile {
    Items(Vec<ArticleItem>),
    Wrapped { items: Vec<ArticleItem> },
}

/// A JSON file of saved articles.
#[derive(Debug, Clone)]
pub struct JsonQueue {
    path: PathBuf,
}

impl JsonQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<ArticleItem>, QueueError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| QueueError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_items(&content).map_err(|source| QueueError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

impl ArticleSource for JsonQueue {
    fn list(&self, queue: Option<&str>) -> Result<Vec<ArticleItem>, QueueError> {
        let items = self.load()?;
        let listed = select_queue(items, queue);
        if listed.is_empty() {
            return Err(QueueError::Empty(queue.unwrap_or("*").to_string()));
        }
        Ok(listed)
    }
}

/// Parse either file shape.
pub fn parse_items(json: &str) -> Result<Vec<ArticleItem>, serde_json::Error> {
    Ok(match serde_json::from_str(json)? {
        QueueFile::Items(items) | QueueFile::Wrapped { items } => items,
    })
}

/// Keep the items of `queue` (all items when `None`), stably sorted by
/// [`ArticleItem::sort_key`].
pub fn select_queue(items: Vec<ArticleItem>, queue: Option<&str>) -> Vec<ArticleItem> {
    let mut selected: Vec<ArticleItem> = match queue {
        Some(q) => items.into_iter().filter(|item| item.queue() == q).collect(),
        None => items,
    };
    selected.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::queued;
    use std::fs;
    use tempfile::TempDir;

    fn titles(items: &[ArticleItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    fn write(dir: &TempDir, json: &str) -> JsonQueue {
        let path = dir.path().join("items.json");
        fs::write(&path, json).unwrap();
        JsonQueue::new(path)
    }

    #[test]
    fn loads_array_form() {
        let dir = TempDir::new().unwrap();
        let queue = write(&dir, r#"[{"id": "1", "title": "One"}, {"id": "2", "title": "Two"}]"#);
        let items = queue.list(None).unwrap();
        assert_eq!(titles(&items), vec!["One", "Two"]);
    }

    #[test]
    fn loads_object_form() {
        let dir = TempDir::new().unwrap();
        let queue = write(&dir, r#"{"items": [{"id": "1", "title": "One"}]}"#);
        assert_eq!(titles(&queue.list(None).unwrap()), vec!["One"]);
    }

    #[test]
    fn filters_by_queue_with_default() {
        let dir = TempDir::new().unwrap();
        let queue = write(
            &dir,
            r#"[
                {"id": "1", "title": "Loose"},
                {"id": "2", "title": "Work", "queue_id": "work"},
                {"id": "3", "title": "Home", "queue_id": "default"}
            ]"#,
        );
        assert_eq!(titles(&queue.list(Some("default")).unwrap()), vec!["Loose", "Home"]);
        assert_eq!(titles(&queue.list(Some("work")).unwrap()), vec!["Work"]);
    }

    #[test]
    fn sorts_by_order_then_created_at() {
        let items = vec![
            queued("c", "q", 3.0),
            queued("a", "q", 1.0),
            ArticleItem {
                title: "dated".to_string(),
                queue_id: Some("q".to_string()),
                created_at: "1970-01-01T00:00:00.002Z".to_string(),
                ..Default::default()
            },
            queued("b", "q", 1.0),
        ];
        let sorted = select_queue(items, Some("q"));
        assert_eq!(titles(&sorted), vec!["a", "b", "dated", "c"]);
    }

    #[test]
    fn empty_queue_is_an_error() {
        let dir = TempDir::new().unwrap();
        let queue = write(&dir, r#"[{"id": "1", "queue_id": "work"}]"#);
        let err = queue.list(Some("later")).unwrap_err();
        assert!(matches!(err, QueueError::Empty(ref q) if q == "later"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = JsonQueue::new(dir.path().join("nope.json")).list(None).unwrap_err();
        assert!(matches!(err, QueueError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_json_error() {
        let dir = TempDir::new().unwrap();
        let err = write(&dir, "{not json").list(None).unwrap_err();
        assert!(matches!(err, QueueError::Json { .. }));
    }
}
