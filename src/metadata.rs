use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How observed field names are normalized before they are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    #[default]
    Upper,
    Lower,
    Normal,
}

impl NameStyle {
    pub fn apply(self, name: &str) -> String {
        let trimmed = name.trim();
        match self {
            NameStyle::Upper => trimmed.to_uppercase(),
            NameStyle::Lower => trimmed.to_lowercase(),
            NameStyle::Normal => trimmed.to_string(),
        }
    }
}

/// Distinct field names observed while mapping a result, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    style: NameStyle,
    columns: Vec<String>,
}

impl TableMetadata {
    pub fn new(style: NameStyle) -> Self {
        Self {
            style,
            columns: Vec::new(),
        }
    }

    pub fn style(&self) -> NameStyle {
        self.style
    }

    /// Records `name`; returns `true` when it was not seen before.
    pub fn add_column(&mut self, name: &str) -> bool {
        let normalized = self.style.apply(name);
        if self.columns.contains(&normalized) {
            return false;
        }
        self.columns.push(normalized);
        true
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let normalized = self.style.apply(name);
        self.columns.iter().position(|c| *c == normalized)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating meta file {path:?}"))?;
        serde_json::to_writer_pretty(file, self).context("Writing metadata JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening meta file {path:?}"))?;
        let reader = BufReader::new(file);
        let metadata = serde_json::from_reader(reader).context("Parsing metadata JSON")?;
        Ok(metadata)
    }
}
