//! Inbound submission data.
//!
//! The transport (query string, request body, multipart uploads) lives
//! outside this crate; a [`RequestSource`] hands over what it decoded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Method;
use crate::path::{FieldPath, FieldStore};
use crate::value::FormData;

/// Per-file keys of the transport's upload layout.
pub const UPLOAD_KEYS: &[&str] = &["name", "type", "tmp_name", "error", "size"];

pub trait RequestSource {
    /// Every submitted value for `method`, keyed by form identifier.
    fn fields(&self, method: Method) -> FormData;

    /// Upload metadata keyed by form identifier, in transport layout.
    fn files(&self) -> FormData;
}

/// In-memory source, for tests and for hosts that already decoded the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSource {
    pub post: FormData,
    pub get: FormData,
    pub files: FormData,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit `data` for `form_id` under `method`.
    pub fn with_submission(mut self, method: Method, form_id: &str, data: Value) -> Self {
        let target = match method {
            Method::Post => &mut self.post,
            Method::Get => &mut self.get,
        };
        target.insert(form_id.to_string(), data);
        self
    }

    pub fn with_files(mut self, form_id: &str, files: Value) -> Self {
        self.files.insert(form_id.to_string(), files);
        self
    }
}

impl RequestSource for StaticSource {
    fn fields(&self, method: Method) -> FormData {
        match method {
            Method::Post => self.post.clone(),
            Method::Get => self.get.clone(),
        }
    }

    fn files(&self) -> FormData {
        self.files.clone()
    }
}

/// Pivot transport-layout upload metadata into the field tree.
///
/// `{name: {avatar: "a.png"}, size: {avatar: 10}}` becomes
/// `{avatar: {name: "a.png", size: 10}}`; nested and list-valued fields keep
/// their shape. Input already keyed by field is returned unchanged.
pub fn normalize_files(files: &FormData) -> FormData {
    let transport_layout =
        !files.is_empty() && files.keys().all(|k| UPLOAD_KEYS.contains(&k.as_str()));
    if !transport_layout {
        return files.clone();
    }

    let mut store = FieldStore::default();
    for (attribute, tree) in files {
        let mut segments = Vec::new();
        pivot(tree, attribute, &mut segments, &mut store);
    }
    store.into_data()
}

fn pivot(node: &Value, attribute: &str, segments: &mut Vec<String>, store: &mut FieldStore) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                segments.push(key.clone());
                pivot(child, attribute, segments, store);
                segments.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                segments.push(index.to_string());
                pivot(child, attribute, segments, store);
                segments.pop();
            }
        }
        leaf => {
            if segments.is_empty() {
                return;
            }
            let mut full = segments.clone();
            full.push(attribute.to_string());
            store.set(&FieldPath::from_segments(full), leaf.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> FormData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_single_upload() {
        let files = map(json!({
            "name": {"avatar": "me.png"},
            "type": {"avatar": "image/png"},
            "tmp_name": {"avatar": "/tmp/php1"},
            "error": {"avatar": 0},
            "size": {"avatar": 2048}
        }));
        assert_eq!(
            Value::Object(normalize_files(&files)),
            json!({"avatar": {
                "name": "me.png",
                "type": "image/png",
                "tmp_name": "/tmp/php1",
                "error": 0,
                "size": 2048
            }})
        );
    }

    #[test]
    fn test_normalize_nested_and_multiple() {
        let files = map(json!({
            "name": {"docs": {"cv": "cv.pdf"}, "photos": ["a.jpg", "b.jpg"]},
            "size": {"docs": {"cv": 1}, "photos": [2, 3]}
        }));
        assert_eq!(
            Value::Object(normalize_files(&files)),
            json!({
                "docs": {"cv": {"name": "cv.pdf", "size": 1}},
                "photos": [{"name": "a.jpg", "size": 2}, {"name": "b.jpg", "size": 3}]
            })
        );
    }

    #[test]
    fn test_already_normalized_passes_through() {
        let files = map(json!({"avatar": {"name": "x"}}));
        assert_eq!(normalize_files(&files), files);
    }

    #[test]
    fn test_static_source_routes_by_method() {
        let source = StaticSource::new().with_submission(Method::Get, "f", json!({"q": "rust"}));
        assert!(source.fields(Method::Post).is_empty());
        assert_eq!(source.fields(Method::Get)["f"], json!({"q": "rust"}));
    }
}
