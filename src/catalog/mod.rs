//! Check catalogs: versioned JSON documents, one per `(engine, standard)`.
//!
//! Catalogs are loaded once at startup and validated before the service
//! accepts requests: ids are unique, every check names a known section,
//! checks appear grouped in section order, automated checks carry queries and
//! a predicate, and every statement passes the read-only guard.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::guard;
use crate::models::check::CheckDefinition;
use crate::models::engine::EngineType;

const EMBEDDED: [(&str, &str); 3] = [
    ("postgres/cis.json", include_str!("../../catalogs/postgres/cis.json")),
    ("mssql/cis.json", include_str!("../../catalogs/mssql/cis.json")),
    ("oracle/cis.json", include_str!("../../catalogs/oracle/cis.json")),
];

/// A heading in the catalog's section hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
}

impl Section {
    /// Nesting depth derived from the dotted id ("2" → 1, "2.2" → 2).
    pub fn depth(&self) -> usize {
        self.id.split('.').count()
    }
}

/// A complete catalog for one engine and standard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub engine: EngineType,
    pub standard: String,
    pub version: String,
    pub title: String,
    pub sections: Vec<Section>,
    pub checks: Vec<CheckDefinition>,
}

impl Catalog {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn check(&self, id: &str) -> Option<&CheckDefinition> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Parse and validate a catalog document.
    pub fn from_json(source: &str, data: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog =
            serde_json::from_str(data).map_err(|e| CatalogError::Parse {
                source_name: source.to_string(),
                message: e.to_string(),
            })?;
        catalog.validate().map_err(|message| CatalogError::Invalid {
            source_name: source.to_string(),
            message,
        })?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), String> {
        if self.standard.trim().is_empty() {
            return Err("standard must not be empty".to_string());
        }

        let mut section_ids = HashSet::new();
        for section in &self.sections {
            if !section_ids.insert(section.id.as_str()) {
                return Err(format!("duplicate section id '{}'", section.id));
            }
        }

        let section_order: BTreeMap<&str, usize> = self
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut check_ids = HashSet::new();
        let mut last_section = 0usize;
        for check in &self.checks {
            if !check_ids.insert(check.id.as_str()) {
                return Err(format!("duplicate check id '{}'", check.id));
            }

            let position = *section_order.get(check.section.as_str()).ok_or_else(|| {
                format!("check '{}' names unknown section '{}'", check.id, check.section)
            })?;
            if position < last_section {
                return Err(format!(
                    "check '{}' in section '{}' appears after a later section",
                    check.id, check.section
                ));
            }
            last_section = position;

            if !check.classification.is_manual() {
                if check.queries.is_empty() {
                    return Err(format!("automated check '{}' has no queries", check.id));
                }
                if check.predicate.is_none() {
                    return Err(format!("automated check '{}' has no predicate", check.id));
                }
            }

            for statement in check.all_queries() {
                guard::ensure_read_only(statement)
                    .map_err(|e| format!("check '{}': {e}", check.id))?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse catalog {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("invalid catalog {source_name}: {message}")]
    Invalid { source_name: String, message: String },

    #[error("catalog for {engine}/{standard} is defined more than once")]
    Duplicate { engine: EngineType, standard: String },
}

/// Summary row for catalog listings.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub engine: EngineType,
    pub standard: String,
    pub version: String,
    pub title: String,
    pub checks: usize,
}

/// Immutable set of loaded catalogs, keyed by engine and upper-cased standard.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    catalogs: BTreeMap<(EngineType, String), Catalog>,
}

impl CatalogRegistry {
    /// Catalogs compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        let mut registry = Self::default();
        for (name, data) in EMBEDDED {
            registry.insert(Catalog::from_json(name, data)?)?;
        }
        Ok(registry)
    }

    /// Every `*.json` file under `dir`, searched one level of subdirectories deep.
    pub fn from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut files = Vec::new();
        collect_json_files(dir, 1, &mut files)?;
        files.sort();

        let mut registry = Self::default();
        for path in files {
            let data = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            registry.insert(Catalog::from_json(&path.display().to_string(), &data)?)?;
        }
        Ok(registry)
    }

    /// Load from `dir` when given, otherwise the embedded catalogs.
    pub fn load(dir: Option<&Path>) -> Result<Self, CatalogError> {
        let registry = match dir {
            Some(dir) => Self::from_dir(dir)?,
            None => Self::embedded()?,
        };
        for summary in registry.summaries() {
            tracing::info!(
                engine = %summary.engine,
                standard = %summary.standard,
                version = %summary.version,
                checks = summary.checks,
                "Loaded check catalog"
            );
        }
        Ok(registry)
    }

    pub fn insert(&mut self, catalog: Catalog) -> Result<(), CatalogError> {
        let key = (catalog.engine, catalog.standard.to_uppercase());
        if self.catalogs.contains_key(&key) {
            return Err(CatalogError::Duplicate {
                engine: catalog.engine,
                standard: catalog.standard,
            });
        }
        self.catalogs.insert(key, catalog);
        Ok(())
    }

    /// Look up a catalog; the standard name is case-insensitive.
    pub fn get(&self, engine: EngineType, standard: &str) -> Option<&Catalog> {
        self.catalogs.get(&(engine, standard.trim().to_uppercase()))
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    pub fn summaries(&self) -> Vec<CatalogSummary> {
        self.catalogs
            .values()
            .map(|c| CatalogSummary {
                engine: c.engine,
                standard: c.standard.clone(),
                version: c.version.clone(),
                title: c.title.clone(),
                checks: c.len(),
            })
            .collect()
    }
}

fn collect_json_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_dir() {
            if depth > 0 {
                collect_json_files(&path, depth - 1, out)?;
            }
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::check::Classification;
    use serde_json::json;

    fn catalog_json(checks: serde_json::Value) -> String {
        json!({
            "engine": "postgres",
            "standard": "CIS",
            "version": "test",
            "title": "Test catalog",
            "sections": [
                { "id": "1", "title": "Installation" },
                { "id": "3", "title": "Logging" },
                { "id": "3.1", "title": "PostgreSQL Logging" }
            ],
            "checks": checks
        })
        .to_string()
    }

    #[test]
    fn embedded_catalogs_load_and_validate() {
        let registry = CatalogRegistry::embedded().unwrap();
        assert_eq!(registry.len(), 3);
        for engine in EngineType::ALL {
            let catalog = registry.get(engine, "cis").unwrap();
            assert_eq!(catalog.engine, engine);
            assert!(!catalog.is_empty());
            assert!(catalog.checks.iter().any(|c| c.classification == Classification::Manual));
        }
    }

    #[test]
    fn oracle_catalog_has_multitenant_variants() {
        let registry = CatalogRegistry::embedded().unwrap();
        let oracle = registry.get(EngineType::Oracle, "CIS").unwrap();
        assert!(oracle.checks.iter().any(|c| c.multitenant_queries.is_some()));
    }

    #[test]
    fn section_depth_follows_dotted_id() {
        let section = Section {
            id: "2.2".to_string(),
            title: "Parameters".to_string(),
        };
        assert_eq!(section.depth(), 2);
    }

    #[test]
    fn rejects_duplicate_check_ids() {
        let data = catalog_json(json!([
            { "id": "1.1", "title": "a", "section": "1", "classification": "manual" },
            { "id": "1.1", "title": "b", "section": "1", "classification": "manual" }
        ]));
        let err = Catalog::from_json("test", &data).unwrap_err();
        assert!(err.to_string().contains("duplicate check id '1.1'"));
    }

    #[test]
    fn rejects_unknown_section() {
        let data = catalog_json(json!([
            { "id": "9.1", "title": "a", "section": "9", "classification": "manual" }
        ]));
        let err = Catalog::from_json("test", &data).unwrap_err();
        assert!(err.to_string().contains("unknown section '9'"));
    }

    #[test]
    fn rejects_checks_out_of_section_order() {
        let data = catalog_json(json!([
            { "id": "3.1.1", "title": "a", "section": "3.1", "classification": "manual" },
            { "id": "1.1", "title": "b", "section": "1", "classification": "manual" }
        ]));
        let err = Catalog::from_json("test", &data).unwrap_err();
        assert!(err.to_string().contains("appears after a later section"));
    }

    #[test]
    fn rejects_side_effecting_statements() {
        let data = catalog_json(json!([{
            "id": "3.1.1",
            "title": "a",
            "section": "3.1",
            "queries": ["DROP TABLE pg_settings"],
            "predicate": { "kind": "no_rows" }
        }]));
        let err = Catalog::from_json("test", &data).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));
        assert!(err.to_string().contains("3.1.1"));
    }

    #[test]
    fn rejects_statements_that_lift_read_only_mode() {
        let data = catalog_json(json!([{
            "id": "3.1.2",
            "title": "a",
            "section": "3.1",
            "queries": ["SELECT set_config('default_transaction_read_only', 'off', false)"],
            "predicate": { "kind": "has_rows" }
        }]));
        let err = Catalog::from_json("operator.json", &data).unwrap_err();
        assert!(err.to_string().contains("set_config"));
    }

    #[test]
    fn rejects_automated_check_without_predicate() {
        let data = catalog_json(json!([{
            "id": "3.1.1",
            "title": "a",
            "section": "3.1",
            "queries": ["SHOW logging_collector"]
        }]));
        let err = Catalog::from_json("test", &data).unwrap_err();
        assert!(err.to_string().contains("has no predicate"));
    }

    #[test]
    fn registry_rejects_duplicate_catalogs() {
        let data = catalog_json(json!([]));
        let mut registry = CatalogRegistry::default();
        registry.insert(Catalog::from_json("a", &data).unwrap()).unwrap();
        let err = registry
            .insert(Catalog::from_json("b", &data).unwrap())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { .. }));
    }

    #[test]
    fn loads_catalogs_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("postgres");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(
            sub.join("internal.json"),
            catalog_json(json!([
                { "id": "1.1", "title": "a", "section": "1", "classification": "manual" }
            ]))
            .replace("\"CIS\"", "\"INTERNAL\""),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = CatalogRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(EngineType::Postgres, "internal").is_some());
        assert!(registry.get(EngineType::Postgres, "CIS").is_none());
    }
}
