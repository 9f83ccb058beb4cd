//! File identifiers handed to the compiler
//!
//! The compiler works on file-shaped handles. In-memory units get a synthetic
//! `mem:///` identifier derived from their qualified name; on-disk files keep
//! their path.

use std::fmt;
use std::path::{Path, PathBuf};

/// Root of synthetic in-memory file identifiers
pub const MEMORY_ROOT: &str = "mem:///";

/// Kind of file the compiler reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Kiln source text
    Source,
    /// Compiled type image
    Output,
}

impl FileKind {
    /// File extension, including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Source => ".kiln",
            FileKind::Output => ".kbc",
        }
    }
}

/// Identifier of a file the compiler reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileId {
    /// Synthetic identifier for a unit that only exists in memory
    Memory(String),
    /// A file on disk
    Path(PathBuf),
}

impl FileId {
    /// Synthetic identifier for a qualified name: `pkg.Name` -> `mem:///pkg/Name.kiln`
    pub fn for_name(name: &str, kind: FileKind) -> Self {
        FileId::Memory(format!(
            "{}{}{}",
            MEMORY_ROOT,
            name.replace('.', "/"),
            kind.extension()
        ))
    }

    /// Recover the qualified name from a synthetic identifier
    pub fn qualified_name(&self) -> Option<String> {
        let FileId::Memory(uri) = self else {
            return None;
        };
        let rest = uri.strip_prefix(MEMORY_ROOT)?;
        let stem = rest
            .strip_suffix(FileKind::Source.extension())
            .or_else(|| rest.strip_suffix(FileKind::Output.extension()))?;
        Some(stem.replace('/', "."))
    }

    /// Check if this identifier is in-memory
    pub fn is_memory(&self) -> bool {
        matches!(self, FileId::Memory(_))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileId::Memory(uri) => f.write_str(uri),
            FileId::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Relative path of a binary name inside a directory tree:
/// `pkg.Outer$Inner` -> `pkg/Outer$Inner.kbc`
pub fn relative_path(name: &str, kind: FileKind) -> PathBuf {
    let mut path: PathBuf = name.split('.').collect();
    let file_name = format!(
        "{}{}",
        path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default(),
        kind.extension()
    );
    path.set_file_name(file_name);
    path
}

/// Join a relative binary-name path onto a root directory
pub fn path_in(root: &Path, name: &str, kind: FileKind) -> PathBuf {
    root.join(relative_path(name, kind))
}

/// One compilation unit of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Qualified name the unit was registered under
    pub name: String,
    /// Identifier the compiler reads the text through
    pub id: FileId,
}

impl SourceFile {
    /// In-memory unit for a qualified name
    pub fn in_memory(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = FileId::for_name(&name, FileKind::Source);
        Self { name, id }
    }

    /// Package part of the qualified name (empty for the root package)
    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }

    /// Last segment of the qualified name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(_, n)| n).unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_ids() {
        let id = FileId::for_name("rules.pricing.Discount", FileKind::Source);
        assert_eq!(id.to_string(), "mem:///rules/pricing/Discount.kiln");
        assert_eq!(id.qualified_name().as_deref(), Some("rules.pricing.Discount"));

        let out = FileId::for_name("rules.Discount$Tier", FileKind::Output);
        assert_eq!(out.to_string(), "mem:///rules/Discount$Tier.kbc");
        assert_eq!(out.qualified_name().as_deref(), Some("rules.Discount$Tier"));
    }

    #[test]
    fn test_path_ids_have_no_qualified_name() {
        let id = FileId::Path(PathBuf::from("/tmp/Discount.kiln"));
        assert!(!id.is_memory());
        assert_eq!(id.qualified_name(), None);
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path("rules.Discount$Tier", FileKind::Output),
            PathBuf::from("rules").join("Discount$Tier.kbc")
        );
        assert_eq!(relative_path("Top", FileKind::Source), PathBuf::from("Top.kiln"));
    }

    #[test]
    fn test_source_file_parts() {
        let unit = SourceFile::in_memory("rules.pricing.Discount");
        assert_eq!(unit.package(), "rules.pricing");
        assert_eq!(unit.simple_name(), "Discount");

        let top = SourceFile::in_memory("Top");
        assert_eq!(top.package(), "");
        assert_eq!(top.simple_name(), "Top");
    }
}
