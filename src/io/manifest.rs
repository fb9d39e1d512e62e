//! Dataset identity for each input file.
//!
//! Two sources are supported:
//!
//! - `FilenameConvention`: the legacy
//!   `{plate}_{experiment}_{dataset1}_{dataset2}[_{dataset3}_{dataset4}].txt`
//!   naming scheme, parsed positionally
//! - `JsonManifest`: an explicit list of files with their plate, experiment and
//!   dataset names (and optionally a per-file layout)

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FileManifest, ReplicateLayout};
use crate::error::AppError;

/// Resolves the manifest of an input file.
pub trait ManifestSource {
    /// `Ok(None)` means the file is not an input and should be skipped.
    fn resolve(&self, path: &Path) -> Result<Option<FileManifest>, AppError>;
}

/// Legacy underscore-delimited file names.
#[derive(Debug, Clone, Copy)]
pub struct FilenameConvention {
    /// Number of dataset names expected after plate and experiment.
    pub datasets: usize,
}

impl ManifestSource for FilenameConvention {
    fn resolve(&self, path: &Path) -> Result<Option<FileManifest>, AppError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(stem) = file_name.strip_suffix(".txt") else {
            return Ok(None);
        };

        let fields: Vec<&str> = stem.split('_').collect();
        let needed = 2 + self.datasets;
        if fields.len() < needed {
            return Err(AppError::config(format!(
                "File name '{file_name}' has {} fields; expected plate_experiment followed by {} dataset names.",
                fields.len(),
                self.datasets
            )));
        }
        if let Some(idx) = fields[..needed].iter().position(|f| f.is_empty()) {
            return Err(AppError::config(format!("File name '{file_name}' has an empty field at position {idx}.")));
        }

        Ok(Some(FileManifest {
            plate_id: fields[0].to_string(),
            experiment: fields[1].to_string(),
            datasets: fields[2..needed].iter().map(|s| s.to_string()).collect(),
            layout: None,
        }))
    }
}

/// One entry of a JSON manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name inside the input directory.
    pub file: String,
    pub plate_id: String,
    pub experiment: String,
    pub datasets: Vec<String>,
    #[serde(default)]
    pub layout: Option<ReplicateLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    files: Vec<ManifestEntry>,
}

/// Explicit manifest loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonManifest {
    entries: BTreeMap<String, FileManifest>,
}

impl JsonManifest {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open manifest '{}': {e}", path.display())))?;
        let parsed: ManifestFile = serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Invalid manifest '{}': {e}", path.display())))?;
        Self::from_entries(parsed.files)
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self, AppError> {
        let mut map = BTreeMap::new();
        for e in entries {
            if e.datasets.is_empty() {
                return Err(AppError::config(format!("Manifest entry '{}' lists no datasets.", e.file)));
            }
            let manifest = FileManifest {
                plate_id: e.plate_id,
                experiment: e.experiment,
                datasets: e.datasets,
                layout: e.layout,
            };
            if map.insert(e.file.clone(), manifest).is_some() {
                return Err(AppError::config(format!("Manifest lists '{}' twice.", e.file)));
            }
        }
        Ok(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ManifestSource for JsonManifest {
    fn resolve(&self, path: &Path) -> Result<Option<FileManifest>, AppError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        Ok(self.entries.get(file_name).cloned())
    }
}
