//! Skill id to display name lookup

use crate::storage::read_dataset;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ID_FIELDS: [&str; 3] = ["id", "skill_id", "skillId"];
const NAME_FIELDS: [&str; 4] = ["name_en", "enname", "name", "jpname"];

/// Read-only skill name table, built once per run and shared by reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillNames {
    names: HashMap<String, String>,
}

impl SkillNames {
    /// Loads names from the first candidate file that yields any
    ///
    /// Missing or unreadable candidates are skipped; if none yields names the
    /// table is empty and hint names stay blank.
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            let names = Self::from_file(path);
            if !names.is_empty() {
                tracing::debug!("Loaded {} skill names from {}", names.len(), path.display());
                return names;
            }
        }

        if !candidates.is_empty() {
            tracing::warn!("No skill names found in {} candidate file(s)", candidates.len());
        }
        Self::default()
    }

    fn from_file(path: &Path) -> Self {
        match read_dataset(path) {
            Ok(records) => Self::from_records(&records),
            Err(e) => {
                tracing::debug!("Skipping skill name file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Builds the table from dataset records
    pub fn from_records(records: &[Value]) -> Self {
        let names = records
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|record| {
                let id = ID_FIELDS
                    .iter()
                    .filter_map(|f| record.get(*f))
                    .find_map(id_text)?;
                let name = NAME_FIELDS
                    .iter()
                    .filter_map(|f| record.get(*f))
                    .filter_map(Value::as_str)
                    .find(|n| !n.is_empty())?;
                Some((id, name.to_string()))
            })
            .collect();

        Self { names }
    }

    /// Name for a skill id, if known
    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
