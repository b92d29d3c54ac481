use std::fmt;

/// Normalized, slash-separated relative path from the tree root.
///
/// The path is the sole identity of an item within a provider: two items are
/// equal iff their normalized paths are equal (case-sensitive). Construction
/// strips leading and trailing separators, so a folder path never carries the
/// trailing delimiter some backends append to virtual directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPath(String);

impl ItemPath {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim_matches('/').to_owned())
    }

    /// The tree root (empty path).
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one child segment.
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self::new(segment)
        } else {
            Self::new(format!("{}/{}", self.0, segment))
        }
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Percent-decoded form, used as a fallback equality during
    /// reconciliation so a backend-encoded key still matches the plain
    /// source path it denotes.
    pub fn percent_decoded(&self) -> String {
        percent_decode(&self.0)
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A downloadable file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileItem {
    pub path: ItemPath,
    /// Opaque backend-specific locator (raw-content URL, blob URL, absolute
    /// filesystem path). Only meaningful to the provider that produced it.
    pub download_url: String,
    pub size: Option<u64>,
}

/// One node in a template tree. Items are transient: produced fresh on each
/// listing call and never cached by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateItem {
    Folder(ItemPath),
    File(FileItem),
}

impl TemplateItem {
    pub fn path(&self) -> &ItemPath {
        match self {
            Self::Folder(path) => path,
            Self::File(file) => &file.path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes; malformed escapes pass through unchanged.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
        {
            out.push(hi * 16 + lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
