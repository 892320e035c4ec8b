use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type reserved for folders. Folders never carry content.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type assigned to notes created by this workspace.
pub const NOTE_MIME_TYPE: &str = "text/markdown";

/// Suffix appended to non-folder item names in storage and stripped on the way out.
pub const NOTE_SUFFIX: &str = ".md";

/// Parent sentinel for the top of a tenant's hierarchy.
pub const ROOT_FOLDER_ID: &str = "root";

/// Metadata about a file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Backend-assigned identifier
    pub id: String,
    /// Display name (suffix already stripped for notes)
    pub name: String,
    pub mime_type: String,
    pub modified_time: DateTime<Utc>,
    /// Size in bytes (0 for folders)
    pub size: u64,
    /// Opaque version token, compared only for equality
    pub etag: String,
    /// Parent folder IDs; empty or `["root"]` means top-level
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default)]
    pub starred: bool,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Whether this item is a direct child of `folder_id`.
    pub fn is_child_of(&self, folder_id: &str) -> bool {
        if self.parents.iter().any(|p| p == folder_id) {
            return true;
        }
        folder_id == ROOT_FOLDER_ID && self.parents.is_empty()
    }

    /// Whether this item sits literally at the top of the hierarchy.
    pub fn is_top_level(&self) -> bool {
        self.parents.is_empty() || self.parents.iter().any(|p| p == ROOT_FOLDER_ID)
    }
}

/// A file with its content. Content is only loaded on explicit fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    #[serde(flatten)]
    pub metadata: FileMetadata,
    pub content: Vec<u8>,
}

/// Append the note suffix unless it is already present.
pub fn to_storage_name(name: &str) -> String {
    if name.ends_with(NOTE_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, NOTE_SUFFIX)
    }
}

/// Strip the note suffix for external responses.
pub fn from_storage_name(name: &str) -> String {
    name.strip_suffix(NOTE_SUFFIX).unwrap_or(name).to_string()
}

/// Whether a parent entry denotes the top of the hierarchy.
pub fn is_root_parent(parent: &str) -> bool {
    parent.is_empty() || parent == ROOT_FOLDER_ID
}

/// Pick the folder an operation targets: explicit ID, then base folder, then root.
pub fn resolve_target_folder(folder_id: &str, base_folder_id: Option<&str>) -> String {
    if !folder_id.is_empty() {
        return folder_id.to_string();
    }
    match base_folder_id {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => ROOT_FOLDER_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(parents: &[&str]) -> FileMetadata {
        FileMetadata {
            id: "id".to_string(),
            name: "n".to_string(),
            mime_type: NOTE_MIME_TYPE.to_string(),
            modified_time: Utc::now(),
            size: 0,
            etag: "e".to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            starred: false,
        }
    }

    #[test]
    fn test_storage_name_round_trip() {
        assert_eq!(to_storage_name("note"), "note.md");
        assert_eq!(to_storage_name("note.md"), "note.md");
        assert_eq!(from_storage_name("note.md"), "note");
        assert_eq!(from_storage_name("note"), "note");
        assert_eq!(from_storage_name("a.md.md"), "a.md");
    }

    #[test]
    fn test_is_child_of() {
        assert!(meta(&["folder-1"]).is_child_of("folder-1"));
        assert!(!meta(&["folder-1"]).is_child_of("folder-2"));
        assert!(meta(&[]).is_child_of(ROOT_FOLDER_ID));
        assert!(meta(&[ROOT_FOLDER_ID]).is_child_of(ROOT_FOLDER_ID));
        assert!(!meta(&[]).is_child_of("folder-1"));
    }

    #[test]
    fn test_resolve_target_folder() {
        assert_eq!(resolve_target_folder("f", Some("base")), "f");
        assert_eq!(resolve_target_folder("", Some("base")), "base");
        assert_eq!(resolve_target_folder("", Some("")), ROOT_FOLDER_ID);
        assert_eq!(resolve_target_folder("", None), ROOT_FOLDER_ID);
    }

    #[test]
    fn test_metadata_json_shape() {
        let json = serde_json::to_value(meta(&["p"])).unwrap();
        assert_eq!(json["mimeType"], NOTE_MIME_TYPE);
        assert_eq!(json["parents"][0], "p");
        assert!(json.get("modifiedTime").is_some());
    }
}
