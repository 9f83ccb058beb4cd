//! Virtual file manager
//!
//! Stands between the compiler service and its standard file manager. Source
//! reads for staged in-memory units are answered from memory, compiled output
//! is captured in memory; every other request goes to the standard manager
//! unchanged.
//!
//! Output of a batch is staged first and only becomes visible in the
//! [`ArtifactStore`] on [`commit`](VirtualFileManager::commit), so a failed
//! batch leaves no artifacts behind.

use kiln_bytecode::TypeSignature;
use kiln_compiler::{FileId, FileKind, FileManager, SourceFile};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::io::{self, Write};
use std::sync::Arc;

use crate::registry::SourceUnit;

/// Committed artifacts of one compiler instance, shared with its loader
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    inner: Arc<RwLock<FxHashMap<String, Arc<[u8]>>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<[u8]>> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Artifact names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of the whole map
    pub fn snapshot(&self) -> FxHashMap<String, Arc<[u8]>> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// In-memory decorator over the compiler service's standard file manager
pub struct VirtualFileManager {
    standard: Box<dyn FileManager + Send>,
    /// Staged units keyed by synthetic id: (qualified name, text)
    sources: FxHashMap<String, (String, String)>,
    /// Output written during the current batch
    staged: FxHashMap<String, Vec<u8>>,
    artifacts: ArtifactStore,
}

impl VirtualFileManager {
    pub fn new(standard: Box<dyn FileManager + Send>) -> Self {
        Self {
            standard,
            sources: FxHashMap::default(),
            staged: FxHashMap::default(),
            artifacts: ArtifactStore::new(),
        }
    }

    /// Handle on the committed artifacts
    pub fn artifact_store(&self) -> ArtifactStore {
        self.artifacts.clone()
    }

    /// Make `units` readable by the compiler and return their file handles
    pub fn stage_sources<'u>(
        &mut self,
        units: impl IntoIterator<Item = &'u SourceUnit>,
    ) -> Vec<SourceFile> {
        self.sources.clear();
        units
            .into_iter()
            .map(|unit| {
                let file = SourceFile::in_memory(unit.name.clone());
                self.sources
                    .insert(file.id.to_string(), (unit.name.clone(), unit.text.clone()));
                file
            })
            .collect()
    }

    /// Text of a unit staged for the current batch
    pub fn source_for(&self, name: &str) -> Option<&str> {
        let id = FileId::for_name(name, FileKind::Source).to_string();
        self.sources.get(&id).map(|(_, text)| text.as_str())
    }

    /// Empty buffer capturing the output for `name`
    ///
    /// Any name is accepted; the compiler names outputs after the types it
    /// produces, which need not match a registered unit.
    pub fn output_sink_for(&mut self, name: &str) -> &mut Vec<u8> {
        let buffer = self.staged.entry(name.to_string()).or_default();
        buffer.clear();
        buffer
    }

    /// Names of outputs written during the current batch, sorted
    pub fn staged_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.staged.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every committed artifact
    pub fn artifacts_produced(&self) -> FxHashMap<String, Arc<[u8]>> {
        self.artifacts.snapshot()
    }

    /// Publish staged output as artifacts.
    ///
    /// Artifacts are write-once: if any staged name was committed by an
    /// earlier batch, nothing is published and the colliding names are
    /// returned as the error.
    pub fn commit(&mut self) -> Result<Vec<String>, Vec<String>> {
        let mut artifacts = self.artifacts.inner.write();
        let mut collisions: Vec<String> = self
            .staged
            .keys()
            .filter(|name| artifacts.contains_key(*name))
            .cloned()
            .collect();
        if !collisions.is_empty() {
            collisions.sort();
            return Err(collisions);
        }

        let mut committed = Vec::with_capacity(self.staged.len());
        for (name, bytes) in self.staged.drain() {
            artifacts.insert(name.clone(), Arc::from(bytes));
            committed.push(name);
        }
        committed.sort();
        self.sources.clear();
        Ok(committed)
    }

    /// Drop staged sources and output
    pub fn discard(&mut self) {
        self.staged.clear();
        self.sources.clear();
    }
}

impl FileManager for VirtualFileManager {
    fn read_source(&self, file: &FileId) -> io::Result<String> {
        match file {
            FileId::Memory(id) => match self.sources.get(id) {
                Some((_, text)) => Ok(text.clone()),
                None => self.standard.read_source(file),
            },
            FileId::Path(_) => self.standard.read_source(file),
        }
    }

    fn open_output(&mut self, name: &str, kind: FileKind) -> io::Result<Box<dyn Write + '_>> {
        match kind {
            FileKind::Output => Ok(Box::new(self.output_sink_for(name))),
            FileKind::Source => self.standard.open_output(name, kind),
        }
    }

    fn resolve_type(&self, name: &str) -> Option<TypeSignature> {
        self.standard.resolve_type(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceStatus;
    use kiln_compiler::StandardFileManager;

    fn vfm() -> VirtualFileManager {
        VirtualFileManager::new(Box::new(StandardFileManager::new()))
    }

    fn unit(name: &str, text: &str) -> SourceUnit {
        SourceUnit {
            name: name.to_string(),
            text: text.to_string(),
            status: SourceStatus::Pending,
        }
    }

    #[test]
    fn test_staged_sources_are_readable() {
        let mut fm = vfm();
        let units = [unit("demo.A", "class A {}")];
        let files = fm.stage_sources(&units);
        assert_eq!(files[0].id.to_string(), "mem:///demo/A.kiln");
        assert_eq!(fm.read_source(&files[0].id).unwrap(), "class A {}");
        assert_eq!(fm.source_for("demo.A"), Some("class A {}"));

        let unknown = FileId::for_name("demo.B", FileKind::Source);
        assert_eq!(
            fm.read_source(&unknown).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_output_sink_truncates_on_reopen() {
        let mut fm = vfm();
        fm.output_sink_for("demo.A$Inner").extend_from_slice(b"first");
        {
            let mut sink = fm.open_output("demo.A$Inner", FileKind::Output).unwrap();
            sink.write_all(b"second").unwrap();
        }
        assert_eq!(fm.staged_names(), vec!["demo.A$Inner".to_string()]);
        assert_eq!(fm.commit().unwrap(), vec!["demo.A$Inner".to_string()]);
        assert_eq!(&*fm.artifact_store().get("demo.A$Inner").unwrap(), b"second");
    }

    #[test]
    fn test_source_kind_output_is_delegated() {
        let mut fm = vfm();
        assert!(fm.open_output("demo.A", FileKind::Source).is_err());
        assert!(fm.staged_names().is_empty());
    }

    #[test]
    fn test_commit_rejects_collisions_without_mutation() {
        let mut fm = vfm();
        fm.output_sink_for("demo.A").extend_from_slice(b"one");
        fm.commit().unwrap();

        fm.output_sink_for("demo.A").extend_from_slice(b"two");
        fm.output_sink_for("demo.B").extend_from_slice(b"three");
        assert_eq!(fm.commit(), Err(vec!["demo.A".to_string()]));
        assert_eq!(&*fm.artifact_store().get("demo.A").unwrap(), b"one");
        assert!(!fm.artifact_store().contains("demo.B"));

        fm.discard();
        assert!(fm.staged_names().is_empty());
        assert_eq!(fm.artifacts_produced().len(), 1);
    }

    #[test]
    fn test_discard_forgets_sources() {
        let mut fm = vfm();
        let units = [unit("demo.A", "class A {}")];
        fm.stage_sources(&units);
        fm.discard();
        assert_eq!(fm.source_for("demo.A"), None);
    }

    #[test]
    fn test_types_resolve_through_standard_manager() {
        let fm = vfm();
        assert!(fm.resolve_type("Math").is_some());
        assert!(fm.resolve_type("demo.Nothing").is_none());
    }
}
