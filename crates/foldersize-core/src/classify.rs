//! Entry classification from name and directory flag alone.
//!
//! No I/O happens here: the caller has already fetched whatever metadata it
//! needs and only hands over the entry name and whether it is a directory.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Coarse type tag of a listing entry.
///
/// The set is closed. `Folder` is the only tag a directory can carry, and no
/// file ever carries it, so "is this a directory" is `file_type == Folder`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    Folder,
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Code,
    Executable,
    #[default]
    Other,
}

/// Extension to category table.
///
/// Extensions are lowercase and without the leading dot. Adding extensions
/// is backward compatible; moving one to another category is not.
pub const CATEGORY_TABLE: &[(FileType, &[&str])] = &[
    (
        FileType::Image,
        &[
            "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "tif", "tiff", "heic", "raw",
            "psd",
        ],
    ),
    (
        FileType::Video,
        &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg"],
    ),
    (
        FileType::Audio,
        &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus", "mid", "midi"],
    ),
    (
        FileType::Document,
        &[
            "doc", "docx", "pdf", "txt", "rtf", "odt", "md", "xls", "xlsx", "ods", "csv", "ppt",
            "pptx", "odp", "epub",
        ],
    ),
    (
        FileType::Archive,
        &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "zst", "iso", "dmg"],
    ),
    (
        FileType::Code,
        &[
            "rs", "go", "py", "js", "ts", "tsx", "jsx", "c", "h", "cpp", "hpp", "java", "kt",
            "swift", "rb", "php", "cs", "sh", "html", "css", "json", "toml", "yaml", "yml", "xml",
            "sql",
        ],
    ),
    (
        FileType::Executable,
        &["exe", "msi", "dll", "so", "dylib", "bin", "app", "apk", "deb", "rpm"],
    ),
];

impl FileType {
    /// Look up the category of a lowercase extension.
    pub fn from_extension(extension: &str) -> Self {
        if extension.is_empty() {
            return FileType::Other;
        }
        CATEGORY_TABLE
            .iter()
            .find(|(_, extensions)| extensions.contains(&extension))
            .map(|(file_type, _)| *file_type)
            .unwrap_or(FileType::Other)
    }

    /// Check if this tag denotes a directory.
    pub fn is_folder(self) -> bool {
        self == FileType::Folder
    }
}

/// Result of classifying one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Lowercase extension without the dot, empty when there is none.
    pub extension: CompactString,
    /// Coarse type tag.
    pub file_type: FileType,
    /// Whether the name marks the entry as hidden.
    pub is_hidden: bool,
}

/// Classify an entry by name.
pub fn classify(name: &str, is_dir: bool) -> Classification {
    let is_hidden = is_hidden(name);

    if is_dir {
        return Classification {
            extension: CompactString::default(),
            file_type: FileType::Folder,
            is_hidden,
        };
    }

    let extension = extension_of(name);
    let file_type = FileType::from_extension(&extension);
    Classification {
        extension,
        file_type,
        is_hidden,
    }
}

/// Hidden means the name starts with a dot, on every platform.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Lowercased text after the last dot of `name`.
///
/// A dotfile like `.bashrc` has no extension; `.config.json` has `json`.
pub fn extension_of(name: &str) -> CompactString {
    match name.rfind('.') {
        Some(0) | None => CompactString::default(),
        Some(idx) => CompactString::from(name[idx + 1..].to_lowercase()),
    }
}
