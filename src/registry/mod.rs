//! Dynamic model registry.
//!
//! Sources are either built-in units or user catalog files. Every source
//! owns a sub-mapping of model name → descriptor; loading a source is a
//! pure function of its current contents ([`ModelRegistry::discover`]),
//! and a re-scan atomically swaps the source's sub-mapping for a fresh
//! load. There is no implicit cache anywhere on the discovery path —
//! definitions removed from a source disappear on the next re-scan.
//!
//! Failure isolation: a source that fails to load leaves the registry
//! untouched, including that source's previous contents.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{FitError, FitResult};
use crate::models::{builtin_units, load_builtin_unit, load_model_file, ModelDescriptor};

/// Where a source's definitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A built-in unit, addressed by its unit name.
    Builtin,
    /// A user catalog file, addressed by canonical path.
    UserFile(PathBuf),
}

/// One source and its current model sub-mapping.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    kind: SourceKind,
    models: IndexMap<String, ModelDescriptor>,
}

impl SourceEntry {
    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn models(&self) -> &IndexMap<String, ModelDescriptor> {
        &self.models
    }
}

/// Registry snapshot: source id → (model name → descriptor).
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    sources: IndexMap<String, SourceEntry>,
}

impl ModelRegistry {
    /// An empty registry with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the built-in units.
    ///
    /// Units load independently, in parallel; insertion order follows the
    /// catalog order so snapshots stay deterministic.
    pub fn with_builtins() -> Self {
        let loaded: Vec<(String, SourceEntry)> = builtin_units()
            .par_iter()
            .map(|unit| {
                // Built-in units are static; a missing unit name here is a bug.
                let models = load_builtin_unit(unit)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| (m.name().to_string(), m))
                    .collect();
                (
                    unit.to_string(),
                    SourceEntry {
                        kind: SourceKind::Builtin,
                        models,
                    },
                )
            })
            .collect();

        Self {
            sources: loaded.into_iter().collect(),
        }
    }

    /// Source ids in insertion order.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceEntry> {
        self.sources.get(source_id)
    }

    /// Models currently known for one source.
    pub fn models_in(&self, source_id: &str) -> Option<&IndexMap<String, ModelDescriptor>> {
        self.sources.get(source_id).map(|s| &s.models)
    }

    /// Pure load of a source's current contents.
    ///
    /// Always reads afresh — the caller decides what to do with the result,
    /// and nothing is cached on failure.
    pub fn discover(
        kind: &SourceKind,
        source_id: &str,
    ) -> FitResult<IndexMap<String, ModelDescriptor>> {
        let models = match kind {
            SourceKind::Builtin => {
                load_builtin_unit(source_id).ok_or_else(|| FitError::Discovery {
                    source_id: source_id.to_string(),
                    reason: "unknown built-in unit".to_string(),
                })?
            }
            SourceKind::UserFile(path) => load_model_file(path, source_id)?,
        };
        Ok(models.into_iter().map(|m| (m.name().to_string(), m)).collect())
    }

    /// Re-scan one source against its current contents and atomically swap
    /// in the fresh sub-mapping.
    ///
    /// On failure the previous sub-mapping stays in place and the error is
    /// returned; other sources are never affected either way.
    pub fn rescan(&mut self, source_id: &str) -> FitResult<()> {
        let Some(entry) = self.sources.get(source_id) else {
            return Err(FitError::Discovery {
                source_id: source_id.to_string(),
                reason: "no such source".to_string(),
            });
        };
        let fresh = Self::discover(&entry.kind.clone(), source_id)?;
        debug!(source_id, models = fresh.len(), "rescanned source");
        // Swap only after a fully successful load.
        if let Some(entry) = self.sources.get_mut(source_id) {
            entry.models = fresh;
        }
        Ok(())
    }

    /// Register a user catalog file as a new source and return its id.
    ///
    /// - paths without a `.json` extension are rejected as invalid sources
    /// - re-adding the exact same file is a no-op returning the existing id
    /// - a different file whose derived name collides with an existing
    ///   source is registered under a disambiguated id so both stay
    ///   addressable
    pub fn add_user_source(&mut self, path: &Path) -> FitResult<String> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(FitError::InvalidSource(path.to_path_buf()));
        }
        let canonical = path
            .canonicalize()
            .map_err(|_| FitError::InvalidSource(path.to_path_buf()))?;
        let stem = canonical
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FitError::InvalidSource(path.to_path_buf()))?
            .to_string();

        let mut source_id = stem.clone();
        if let Some(existing) = self.sources.get(&source_id) {
            if existing.kind == SourceKind::UserFile(canonical.clone()) {
                debug!(%source_id, "source already registered, keeping existing entry");
                return Ok(source_id);
            }
            // Same name, different origin: keep both, disambiguated by the
            // new file's directory.
            let dir = canonical
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            source_id = format!("{stem} ({dir})");
            warn!(%source_id, "source name collision, registering under disambiguated id");
            if let Some(existing) = self.sources.get(&source_id) {
                if existing.kind == SourceKind::UserFile(canonical.clone()) {
                    return Ok(source_id);
                }
            }
        }

        let kind = SourceKind::UserFile(canonical);
        let models = Self::discover(&kind, &source_id)?;
        debug!(%source_id, models = models.len(), "added user source");
        self.sources.insert(source_id.clone(), SourceEntry { kind, models });
        Ok(source_id)
    }

    /// Look up a descriptor by model name and source id.
    ///
    /// This is the resolution step for deserialized options; a miss is a
    /// reportable [`FitError::UnresolvedModel`], never a substitute model.
    pub fn resolve(&self, name: &str, source_id: &str) -> FitResult<&ModelDescriptor> {
        self.sources
            .get(source_id)
            .and_then(|s| s.models.get(name))
            .ok_or_else(|| FitError::UnresolvedModel {
                name: name.to_string(),
                source_id: source_id.to_string(),
            })
    }

    /// Flatten all sources into one unique name space.
    ///
    /// Sources are visited in insertion order; when a later source exports
    /// a name an earlier source already claimed, the later descriptor is
    /// kept under `name (source_id)` rather than overwriting.
    pub fn snapshot(&self) -> IndexMap<String, ModelDescriptor> {
        let mut flat: IndexMap<String, ModelDescriptor> = IndexMap::new();
        for (source_id, entry) in &self.sources {
            for (name, descriptor) in &entry.models {
                if flat.contains_key(name) {
                    // The composed key can itself be taken (a model may be
                    // literally named that way); keep extending until free.
                    let mut key = format!("{name} ({source_id})");
                    let mut n = 2;
                    while flat.contains_key(&key) {
                        key = format!("{name} ({source_id} {n})");
                        n += 1;
                    }
                    flat.insert(key, descriptor.clone());
                } else {
                    flat.insert(name.clone(), descriptor.clone());
                }
            }
        }
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn catalog_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    const TWO_MODELS: &str = r#"{
        "models": {
            "Line": {"signature": "x, a, b", "expr": "a*x + b"},
            "Decay": {"signature": "x, amp, tau", "expr": "amp * exp(-x/tau)"}
        }
    }"#;

    #[test]
    fn builtins_load_with_unique_names_per_source() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(
            registry.source_ids().collect::<Vec<_>>(),
            ["generic", "oscillations", "peaks"]
        );

        // (name, source) pairs are unique across the flattened space.
        let mut pairs = Vec::new();
        for id in ["generic", "oscillations", "peaks"] {
            for (name, m) in registry.models_in(id).unwrap() {
                let pair = (name.clone(), m.source_id().to_string());
                assert!(!pairs.contains(&pair), "duplicate {pair:?}");
                pairs.push(pair);
            }
        }
        assert!(!pairs.is_empty());
    }

    #[test]
    fn rescan_reflects_on_disk_edits_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(dir.path(), "mine.json", TWO_MODELS);

        let mut registry = ModelRegistry::with_builtins();
        let id = registry.add_user_source(&path).unwrap();
        let names: Vec<_> = registry.models_in(&id).unwrap().keys().cloned().collect();
        assert_eq!(names, ["Line", "Decay"]);

        // Edit the file: Decay removed, Step added.
        catalog_file(
            dir.path(),
            "mine.json",
            r#"{
                "models": {
                    "Line": {"signature": "x, a, b", "expr": "a*x + b"},
                    "Step": {"signature": "x, h, x0", "expr": "h * tanh(x - x0)"}
                }
            }"#,
        );
        registry.rescan(&id).unwrap();
        let names: Vec<_> = registry.models_in(&id).unwrap().keys().cloned().collect();
        assert_eq!(names, ["Line", "Step"], "stale definitions leaked");
    }

    #[test]
    fn rescan_failure_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(dir.path(), "mine.json", TWO_MODELS);

        let mut registry = ModelRegistry::with_builtins();
        let id = registry.add_user_source(&path).unwrap();

        catalog_file(dir.path(), "mine.json", "{ broken");
        assert!(registry.rescan(&id).is_err());
        assert_eq!(registry.models_in(&id).unwrap().len(), 2);
    }

    #[test]
    fn add_same_file_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(dir.path(), "mine.json", TWO_MODELS);

        let mut registry = ModelRegistry::new();
        let a = registry.add_user_source(&path).unwrap();
        let b = registry.add_user_source(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.source_ids().count(), 1);
    }

    #[test]
    fn same_name_different_file_is_disambiguated() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let path_a = catalog_file(dir_a.path(), "mine.json", TWO_MODELS);
        let path_b = catalog_file(
            dir_b.path(),
            "mine.json",
            r#"{"models": {"Other": {"signature": "x, c", "expr": "c * x"}}}"#,
        );

        let mut registry = ModelRegistry::new();
        let a = registry.add_user_source(&path_a).unwrap();
        let b = registry.add_user_source(&path_b).unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with("mine ("), "got '{b}'");
        assert!(registry.models_in(&a).unwrap().contains_key("Line"));
        assert!(registry.models_in(&b).unwrap().contains_key("Other"));
    }

    #[test]
    fn non_catalog_paths_are_invalid_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(dir.path(), "notes.txt", "hello");

        let mut registry = ModelRegistry::new();
        assert!(matches!(
            registry.add_user_source(&path),
            Err(FitError::InvalidSource(_))
        ));
        assert!(matches!(
            registry.add_user_source(&dir.path().join("missing.json")),
            Err(FitError::InvalidSource(_))
        ));
        assert_eq!(registry.source_ids().count(), 0);
    }

    #[test]
    fn snapshot_disambiguates_later_name_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(
            dir.path(),
            "extra.json",
            r#"{"models": {"Linear": {"signature": "x, m, q", "expr": "m*x + q"}}}"#,
        );

        let mut registry = ModelRegistry::with_builtins();
        let id = registry.add_user_source(&path).unwrap();

        let flat = registry.snapshot();
        // Built-in Linear keeps its plain name; the user's Linear is suffixed.
        assert_eq!(flat.get("Linear").unwrap().source_id(), "generic");
        let suffixed = flat.get(&format!("Linear ({id})")).unwrap();
        assert_eq!(suffixed.source_id(), id);
    }

    #[test]
    fn snapshot_never_overwrites_a_taken_disambiguated_key() {
        // A model literally named like the composed key must not be
        // clobbered when disambiguation lands on the same string.
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_file(
            dir.path(),
            "extra.json",
            r#"{
                "models": {
                    "Linear (extra)": {"signature": "x, c", "expr": "c * x"},
                    "Linear": {"signature": "x, m, q", "expr": "m*x + q"}
                }
            }"#,
        );

        let mut registry = ModelRegistry::with_builtins();
        registry.add_user_source(&path).unwrap();

        let flat = registry.snapshot();
        let total: usize = ["generic", "oscillations", "peaks", "extra"]
            .iter()
            .map(|id| registry.models_in(id).unwrap().len())
            .sum();
        assert_eq!(flat.len(), total, "a snapshot entry was overwritten");
        assert_eq!(flat.get("Linear (extra)").unwrap().param_names(), ["c".to_string()]);
        assert_eq!(flat.get("Linear (extra 2)").unwrap().source_id(), "extra");
    }

    #[test]
    fn resolve_misses_report_unresolved_model() {
        let registry = ModelRegistry::with_builtins();
        assert!(registry.resolve("Linear", "generic").is_ok());
        assert!(matches!(
            registry.resolve("Linear", "gone"),
            Err(FitError::UnresolvedModel { .. })
        ));
        assert!(matches!(
            registry.resolve("NoSuchModel", "generic"),
            Err(FitError::UnresolvedModel { .. })
        ));
    }
}
