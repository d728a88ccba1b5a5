//! Document manifest (`manifest.json`) loading, field-merging, and saving.
//!
//! The manifest is kept as a JSON object rather than a typed struct: its
//! schema belongs to the authoring application and changes between
//! releases, and the merge must preserve fields this crate knows nothing
//! about.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::ManifestError;
use crate::models::MANIFEST_FILE;

/// A parsed manifest bound to the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl Manifest {
    /// Read the manifest of the working copy rooted at `dir`.
    pub fn generate<P: AsRef<Path>>(dir: P) -> Result<Self, ManifestError> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        if !path.exists() {
            return Err(ManifestError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| ManifestError::Invalid {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        let Value::Object(fields) = value else {
            return Err(ManifestError::Invalid {
                path: path.display().to_string(),
                detail: "top level is not a JSON object".into(),
            });
        };
        debug!(path = %path.display(), fields = fields.len(), "loaded manifest");
        Ok(Self { path, fields })
    }

    /// Field-merge two manifests. The remote side wins on every key both
    /// sides hold, except that nested objects merge recursively and arrays
    /// keep local-only elements after the remote ones. Keys only the local
    /// side holds are preserved. The result is bound to the remote's path.
    pub fn merge(local: &Manifest, remote: &Manifest) -> Manifest {
        let fields = merge_objects(&local.fields, &remote.fields);
        Manifest {
            path: remote.path.clone(),
            fields,
        }
    }

    /// Write the manifest back to its file, pretty-printed.
    pub fn save(&self) -> Result<(), ManifestError> {
        let json = serde_json::to_string_pretty(&Value::Object(self.fields.clone())).map_err(
            |e| ManifestError::Invalid {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            },
        )?;
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "saved manifest");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn merge_objects(local: &Map<String, Value>, remote: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = remote.clone();
    for (key, local_value) in local {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), local_value.clone());
            continue;
        }
        match (merged.get_mut(key), local_value) {
            (Some(Value::Object(remote_obj)), Value::Object(local_obj)) => {
                let nested = merge_objects(local_obj, remote_obj);
                *remote_obj = nested;
            }
            (Some(Value::Array(remote_items)), Value::Array(local_items)) => {
                for item in local_items {
                    if !remote_items.contains(item) {
                        remote_items.push(item.clone());
                    }
                }
            }
            _ => {}
        }
    }
    merged
}
