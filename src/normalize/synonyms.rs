use crate::error::{PipelineError, Result};
use crate::types::DataType;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const BUILTIN_SYNONYMS: &str = include_str!("../../resources/synonyms.toml");

/// Maps a raw gene label to a canonical marker id.
pub trait Nomenclature: Send + Sync {
    fn lookup(&self, raw_label: &str, data_type: DataType) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct SynonymFile {
    #[serde(default)]
    mt: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    cp: BTreeMap<String, Vec<String>>,
}

/// Synonym table with one panel per organelle
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    mt: HashMap<String, String>,
    cp: HashMap<String, String>,
}

/// Lookup key: lower-cased with whitespace runs collapsed
fn lookup_key(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn build_panel(panel: &str, entries: BTreeMap<String, Vec<String>>) -> Result<HashMap<String, String>> {
    let mut index = HashMap::new();
    for (canonical, synonyms) in entries {
        for label in std::iter::once(&canonical).chain(synonyms.iter()) {
            let key = lookup_key(label);
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = index.insert(key.clone(), canonical.clone()) {
                if previous != canonical {
                    return Err(PipelineError::Configuration(format!(
                        "synonym '{}' in panel '{}' maps to both {} and {}",
                        label, panel, previous, canonical
                    )));
                }
            }
        }
    }
    Ok(index)
}

impl SynonymTable {
    /// Table shipped with the crate (mitochondrial and chloroplast markers)
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_SYNONYMS)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: SynonymFile = toml::from_str(text)?;
        Ok(Self {
            mt: build_panel("mt", file.mt)?,
            cp: build_panel("cp", file.cp)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read synonyms file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    fn panel(&self, data_type: DataType) -> &HashMap<String, String> {
        match data_type {
            DataType::Mt => &self.mt,
            DataType::Cp => &self.cp,
        }
    }

    pub fn len(&self, data_type: DataType) -> usize {
        self.panel(data_type).len()
    }
}

impl Nomenclature for SynonymTable {
    fn lookup(&self, raw_label: &str, data_type: DataType) -> Option<String> {
        self.panel(data_type).get(&lookup_key(raw_label)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads_both_panels() {
        let table = SynonymTable::builtin().unwrap();
        assert!(table.len(DataType::Mt) > 13);
        assert!(table.len(DataType::Cp) > 19);
    }

    #[test]
    fn test_lookup_ignores_case_and_spacing() {
        let table = SynonymTable::builtin().unwrap();
        assert_eq!(table.lookup("cox1", DataType::Mt).as_deref(), Some("COI"));
        assert_eq!(
            table.lookup("ATP  synthase F0 subunit 6", DataType::Mt).as_deref(),
            Some("ATP6")
        );
        assert_eq!(table.lookup("RBCL", DataType::Cp).as_deref(), Some("rbcL"));
        assert_eq!(table.lookup("rbcL", DataType::Mt), None);
    }

    #[test]
    fn test_conflicting_synonyms_are_rejected() {
        let text = "[mt]\nCOI = [\"co1\"]\nCOII = [\"CO1\"]\n";
        let err = SynonymTable::from_toml_str(text).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
