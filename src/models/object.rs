//! Represents an object (file) written to, or reported by, the storage backend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for an object about to be created.
///
/// Built by the upload service right before the storage call. The name is
/// always generated here and never derived from anything the caller sent.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Generated object name (UUID v4, optionally with an extension).
    pub name: String,

    /// Destination bucket. Carried in the request path, not in the metadata.
    #[serde(skip)]
    pub bucket: String,

    /// Content type (MIME type) stored with the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Cache-Control directive served on later reads of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl ObjectDescriptor {
    /// Generate a fresh object name.
    ///
    /// With `infer_extension` set, the first extension registered for the
    /// media type of `content_type` is appended (`image/png` -> `<uuid>.png`).
    /// Unknown or absent content types yield a bare UUID.
    pub fn generate_name(content_type: Option<&str>, infer_extension: bool) -> String {
        let id = Uuid::new_v4().to_string();
        if !infer_extension {
            return id;
        }
        match content_type.and_then(extension_for) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id,
        }
    }
}

/// Look up the first file extension registered for a media type.
/// Parameters (`; charset=utf-8`) are ignored and wildcards never match.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || kind == "*" || subtype == "*" {
        return None;
    }
    mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied())
}

/// Object resource returned by the storage JSON API after a successful insert.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub name: String,

    pub bucket: String,

    /// Backend download URL for the object's content.
    #[serde(default)]
    pub media_link: Option<String>,

    #[serde(default)]
    pub self_link: Option<String>,

    /// Object size in bytes. The API reports it as a decimal string.
    #[serde(default)]
    pub size: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub cache_control: Option<String>,

    #[serde(default)]
    pub generation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_names_are_v4_uuids() {
        let name = ObjectDescriptor::generate_name(Some("image/png"), false);
        let parsed = Uuid::parse_str(&name).expect("name should be a uuid");
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(name, parsed.hyphenated().to_string());
    }

    #[test]
    fn generated_names_are_distinct() {
        let names: HashSet<String> = (0..1000)
            .map(|_| ObjectDescriptor::generate_name(None, false))
            .collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn png_gets_png_extension() {
        let name = ObjectDescriptor::generate_name(Some("image/png"), true);
        let (id, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "png");
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn parameters_and_case_are_ignored_for_lookup() {
        assert_eq!(extension_for("IMAGE/PNG"), Some("png"));
        assert_eq!(extension_for("image/png; foo=bar"), Some("png"));
    }

    #[test]
    fn unknown_or_absent_types_get_no_extension() {
        let cases = [
            None,
            Some(""),
            Some("application/x-not-a-real-type"),
            Some("image/*"),
            Some("garbage"),
        ];
        for content_type in cases {
            let name = ObjectDescriptor::generate_name(content_type, true);
            assert!(!name.contains('.'), "{:?} produced {}", content_type, name);
            assert!(Uuid::parse_str(&name).is_ok());
        }
    }

    #[test]
    fn descriptor_metadata_omits_bucket_and_unset_fields() {
        let descriptor = ObjectDescriptor {
            name: "abc".into(),
            bucket: "assets".into(),
            content_type: Some("text/plain".into()),
            cache_control: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "abc", "contentType": "text/plain" })
        );
    }

    #[test]
    fn stored_object_reads_api_resource() {
        let body = r#"{
            "kind": "storage#object",
            "name": "abc.png",
            "bucket": "assets",
            "generation": "1700000000000000",
            "size": "5",
            "contentType": "image/png",
            "mediaLink": "https://storage.googleapis.com/download/storage/v1/b/assets/o/abc.png?alt=media"
        }"#;
        let object: StoredObject = serde_json::from_str(body).unwrap();
        assert_eq!(object.name, "abc.png");
        assert_eq!(object.size.as_deref(), Some("5"));
        assert!(object.media_link.unwrap().ends_with("alt=media"));
        assert!(object.cache_control.is_none());
    }
}
