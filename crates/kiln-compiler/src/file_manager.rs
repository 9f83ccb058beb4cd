//! File managers
//!
//! The compiler never touches the filesystem directly: it reads source text,
//! writes compiled images and looks up types it does not compile through a
//! [`FileManager`].

use kiln_bytecode::platform::platform_type;
use kiln_bytecode::{TypeImage, TypeSignature};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::file::{path_in, FileId, FileKind};

/// Everything the compiler needs from its environment
pub trait FileManager {
    /// Read the text of a source file
    fn read_source(&self, file: &FileId) -> io::Result<String>;

    /// Open a sink for the output named `name`
    ///
    /// `name` is a binary name (`pkg.Outer$Inner`). Opening the same name
    /// twice replaces the earlier content.
    fn open_output(&mut self, name: &str, kind: FileKind) -> io::Result<Box<dyn Write + '_>>;

    /// Signature of a type the batch does not declare
    fn resolve_type(&self, name: &str) -> Option<TypeSignature>;
}

/// File manager backed by the real filesystem
///
/// Types resolve against the platform library first, then against compiled
/// images under each classpath directory (`<dir>/pkg/Name.kbc`).
#[derive(Debug, Clone, Default)]
pub struct StandardFileManager {
    classpath: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
}

impl StandardFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classpath(classpath: Vec<PathBuf>) -> Self {
        Self {
            classpath,
            output_dir: None,
        }
    }

    /// Write outputs under `dir`
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    fn find_on_classpath(&self, name: &str) -> Option<TypeSignature> {
        for dir in &self.classpath {
            let path = path_in(dir, name, FileKind::Output);
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            match TypeImage::decode(&bytes) {
                Ok(image) if image.name == name => return Some(image.signature()),
                Ok(image) => {
                    log::debug!(
                        "Ignoring {}: declares '{}' instead of '{}'",
                        path.display(),
                        image.name,
                        name
                    );
                }
                Err(e) => {
                    log::debug!("Ignoring unreadable image {}: {}", path.display(), e);
                }
            }
        }
        None
    }
}

impl FileManager for StandardFileManager {
    fn read_source(&self, file: &FileId) -> io::Result<String> {
        match file {
            FileId::Path(path) => fs::read_to_string(path),
            FileId::Memory(uri) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not backed by a file", uri),
            )),
        }
    }

    fn open_output(&mut self, name: &str, kind: FileKind) -> io::Result<Box<dyn Write + '_>> {
        let Some(dir) = &self.output_dir else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no output directory configured",
            ));
        };
        let path = path_in(dir, name, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(fs::File::create(path)?)))
    }

    fn resolve_type(&self, name: &str) -> Option<TypeSignature> {
        if let Some(sig) = platform_type(name) {
            return Some(sig.clone());
        }
        self.find_on_classpath(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bytecode::Function;
    use tempfile::TempDir;

    fn image_bytes(name: &str) -> Vec<u8> {
        let mut image = TypeImage::new(name);
        image.functions.push(Function {
            name: "one".to_string(),
            param_count: 0,
            code: vec![0x07, 1, 0, 0, 0, 0, 0, 0, 0, 0xA2],
        });
        image.encode()
    }

    #[test]
    fn test_platform_types_resolve() {
        let fm = StandardFileManager::new();
        let math = fm.resolve_type("Math").unwrap();
        assert_eq!(math.function("clamp").unwrap().arity, 3);
        assert!(fm.resolve_type("lib.Missing").is_none());
    }

    #[test]
    fn test_classpath_lookup() {
        let dir = TempDir::new().unwrap();
        let path = path_in(dir.path(), "lib.Util", FileKind::Output);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, image_bytes("lib.Util")).unwrap();

        let fm = StandardFileManager::with_classpath(vec![dir.path().to_path_buf()]);
        let sig = fm.resolve_type("lib.Util").unwrap();
        assert_eq!(sig.name, "lib.Util");
        assert_eq!(sig.function("one").unwrap().arity, 0);
    }

    #[test]
    fn test_classpath_ignores_mismatched_image() {
        let dir = TempDir::new().unwrap();
        let path = path_in(dir.path(), "lib.Util", FileKind::Output);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, image_bytes("lib.Other")).unwrap();

        let fm = StandardFileManager::with_classpath(vec![dir.path().to_path_buf()]);
        assert!(fm.resolve_type("lib.Util").is_none());
    }

    #[test]
    fn test_memory_ids_are_not_readable() {
        let fm = StandardFileManager::new();
        let err = fm
            .read_source(&FileId::for_name("a.B", FileKind::Source))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_output_requires_directory() {
        let mut fm = StandardFileManager::new();
        assert!(fm.open_output("a.B", FileKind::Output).is_err());
    }

    #[test]
    fn test_output_written_under_directory() {
        let dir = TempDir::new().unwrap();
        let mut fm = StandardFileManager::new().output_dir(dir.path());
        {
            let mut sink = fm.open_output("a.B$C", FileKind::Output).unwrap();
            sink.write_all(b"bytes").unwrap();
            sink.flush().unwrap();
        }
        let written = fs::read(dir.path().join("a").join("B$C.kbc")).unwrap();
        assert_eq!(written, b"bytes");
    }
}
