use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::conversation::Conversation;

/// The whole persisted state: conversation id -> conversation.
///
/// Iteration order is insertion order. It is kept in `order` and survives a
/// save/load cycle because the JSON object is written and read key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    order: Vec<String>,
    conversations: HashMap<String, Conversation>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, id: String, conversation: Conversation) {
        if self.conversations.insert(id.clone(), conversation).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let removed = self.conversations.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.conversations.clear();
    }

    /// First id by insertion order
    pub fn first_id(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Conversation)> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id).map(|c| (id.as_str(), c)))
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (id, conversation) in self.iter() {
            map.serialize_entry(id, conversation)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = Document;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of conversation id to conversation")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Document, A::Error> {
                let mut document = Document::new();
                while let Some((id, conversation)) = access.next_entry::<String, Conversation>()? {
                    document.insert(id, conversation);
                }
                Ok(document)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Durable whole-document persistence
pub trait DocumentStore {
    /// Read the stored document.
    ///
    /// Never fails: a missing or unparseable store reads as an empty document.
    fn load(&self) -> Document;

    /// Overwrite the stored document. No partial write is ever visible to `load`.
    fn save(&self, document: &Document) -> Result<()>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn load(&self) -> Document {
        (**self).load()
    }

    fn save(&self, document: &Document) -> Result<()> {
        (**self).save(document)
    }
}

/// Parse stored JSON, treating anything unreadable as no prior state
fn parse_document(content: &str, source: &str) -> Document {
    if content.trim().is_empty() {
        return Document::new();
    }
    match serde_json::from_str::<Document>(content) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(source, error = %e, "conversation store is unreadable, starting empty");
            Document::new()
        }
    }
}

/// JSON file store with atomic replace
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> Document {
        if !self.path.exists() {
            return Document::new();
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => parse_document(&content, &self.path.display().to_string()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read conversation store");
                Document::new()
            }
        }
    }

    fn save(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context("Failed to create conversation store directory")?;
            }
        }

        let content = serde_json::to_string_pretty(document)
            .context("Failed to serialize conversations")?;

        // Write beside the target, then rename over it
        let temp = self.temp_path();
        fs::write(&temp, content)
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        fs::rename(&temp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), conversations = document.len(), "saved conversations");
        Ok(())
    }
}

/// In-memory store holding the serialized document, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    content: Mutex<Option<String>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose initial content is the given raw text
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
            ..Self::default()
        }
    }

    /// Store that rejects every save
    pub fn failing() -> Self {
        Self {
            fail_writes: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Start or stop rejecting saves
    pub fn set_failing(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Raw stored text, if anything has been saved
    pub fn raw(&self) -> Option<String> {
        self.content.lock().ok().and_then(|guard| guard.clone())
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Document {
        match self.raw() {
            Some(content) => parse_document(&content, "memory"),
            None => Document::new(),
        }
    }

    fn save(&self, document: &Document) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("memory store is read-only");
        }
        let content = serde_json::to_string(document)
            .context("Failed to serialize conversations")?;
        let mut guard = self
            .content
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        *guard = Some(content);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Message, DEFAULT_TITLE};
    use tempfile::TempDir;

    fn sample_document() -> Document {
        let mut document = Document::new();
        for (id, prompt) in [("b-second", "Zebra facts"), ("a-first", "Apple pie"), ("c-third", "Middle")] {
            let mut conversation = Conversation::new();
            conversation.rename_if_first_message(prompt);
            conversation.push(Message::user(prompt));
            conversation.push(Message::assistant("ok"));
            document.insert(id.to_string(), conversation);
        }
        document
    }

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("conversations.json"));
        (store, temp_dir)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (store, _temp) = create_test_store();
        let document = sample_document();

        store.save(&document).unwrap();
        assert_eq!(store.load(), document);
    }

    #[test]
    fn insertion_order_survives_round_trip() {
        let (store, _temp) = create_test_store();
        store.save(&sample_document()).unwrap();

        let ids: Vec<String> = store.load().ids().map(str::to_string).collect();
        assert_eq!(ids, vec!["b-second", "a-first", "c-third"]);
    }

    #[test]
    fn corrupted_file_loads_empty() {
        let (store, _temp) = create_test_store();
        fs::write(store.path(), "{ not json at all").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn wrong_shape_loads_empty() {
        let (store, _temp) = create_test_store();
        fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let (store, _temp) = create_test_store();
        let raw = r#"{
            "abc": {
                "title": "Legacy",
                "pinned": true,
                "messages": [{"role": "user", "content": "hi", "tokens": 3}]
            }
        }"#;
        fs::write(store.path(), raw).unwrap();

        let document = store.load();
        let conversation = document.get("abc").unwrap();
        assert_eq!(conversation.title, "Legacy");
        assert_eq!(conversation.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();
        store.save(&sample_document()).unwrap();

        assert!(store.path().exists());
        assert!(!temp_dir.path().join("conversations.json.tmp").exists());
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested").join("store.json"));
        store.save(&sample_document()).unwrap();
        assert_eq!(store.load().len(), 3);
    }

    #[test]
    fn save_overwrites_whole_document() {
        let (store, _temp) = create_test_store();
        store.save(&sample_document()).unwrap();

        let mut smaller = Document::new();
        smaller.insert("only".to_string(), Conversation::new());
        store.save(&smaller).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("only").unwrap().title, DEFAULT_TITLE);
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut document = sample_document();
        document.remove("a-first");
        let ids: Vec<&str> = document.ids().collect();
        assert_eq!(ids, vec!["b-second", "c-third"]);
        assert_eq!(document.first_id(), Some("b-second"));
    }

    #[test]
    fn memory_store_counts_saves_and_round_trips() {
        let store = MemoryStore::new();
        let document = sample_document();
        store.save(&document).unwrap();
        store.save(&document).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load(), document);
    }

    #[test]
    fn failing_memory_store_rejects_save() {
        let store = MemoryStore::failing();
        assert!(store.save(&sample_document()).is_err());
        assert_eq!(store.save_count(), 0);

        store.set_failing(false);
        assert!(store.save(&sample_document()).is_ok());
        assert_eq!(store.save_count(), 1);
    }
}
