use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-open record content.
///
/// Each calling module stores whatever keys it needs; the storage layer never
/// interprets them. Typed access goes through a serde round-trip, so any
/// `Serialize`/`DeserializeOwned` value works as a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    values: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key, deserialized into `T`.
    ///
    /// Returns `None` when the key is absent or the stored value does not
    /// convert into `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a value by key, falling back to `default`.
    pub fn get_or<T>(&self, key: &str, default: T) -> T
    where
        T: DeserializeOwned,
    {
        self.get(key).unwrap_or(default)
    }

    /// Set a value. Fails only if `value` cannot be represented as JSON.
    pub fn set<T>(&mut self, key: &str, value: T) -> Result<(), serde_json::Error>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    /// Remove a key, returning the raw value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge another document into this one; `other`'s values win on
    /// conflicting keys.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Drop all keys.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set() {
        let mut doc = Document::new();
        doc.set("name", "Bob").unwrap();
        doc.set("level", 42).unwrap();
        doc.set("flag", true).unwrap();

        assert_eq!(doc.get::<String>("name"), Some("Bob".to_owned()));
        assert_eq!(doc.get::<i32>("level"), Some(42));
        assert_eq!(doc.get::<bool>("flag"), Some(true));
        assert_eq!(doc.get::<String>("missing"), None);
        assert_eq!(doc.get_or("missing", 7), 7);
    }

    #[test]
    fn mismatched_type_is_none() {
        let mut doc = Document::new();
        doc.set("name", "Bob").unwrap();
        assert_eq!(doc.get::<i32>("name"), None);
    }

    #[test]
    fn round_trip() {
        let mut doc = Document::new();
        doc.set("nickname", "Bobby").unwrap();
        doc.set("scores", vec![1, 2, 3]).unwrap();

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.get::<Vec<i32>>("scores"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn merge_prefers_other() {
        let mut a = Document::new();
        a.set("x", 1).unwrap();
        a.set("y", 1).unwrap();
        let mut b = Document::new();
        b.set("y", 2).unwrap();

        a.merge(&b);
        assert_eq!(a.get::<i32>("x"), Some(1));
        assert_eq!(a.get::<i32>("y"), Some(2));
    }

    #[test]
    fn remove_and_clear() {
        let mut doc = Document::new();
        doc.set("key", "value").unwrap();
        assert!(doc.contains_key("key"));
        assert!(doc.remove("key").is_some());
        assert!(doc.is_empty());

        doc.set("key", "value").unwrap();
        doc.clear();
        assert_eq!(doc.len(), 0);
    }
}
