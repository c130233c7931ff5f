//! Message dataset: the labelled CSV the lookup backend, training and
//! evaluation read from.
//!
//! Expected header columns: `message_id`, `text`, `label`, `suggested_queue`.
//! Extra columns are ignored; column order does not matter.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatasetError;

/// Columns every dataset must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["message_id", "text", "label", "suggested_queue"];

/// One labelled row of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub text: String,
    pub label: String,
    pub suggested_queue: String,
}

/// In-memory, read-only message dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<MessageRecord>,
    /// First row index per message id.
    by_id: HashMap<String, usize>,
}

impl Dataset {
    /// Load a dataset from a CSV file.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::NotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        let dataset = Self::from_reader(file)?;
        debug!(path = %path.display(), rows = dataset.len(), "Loaded message dataset");
        Ok(dataset)
    }

    /// Parse a dataset from any CSV source with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|&&c| position(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DatasetError::MissingColumns(missing));
        }

        // Presence checked above.
        let [id_col, text_col, label_col, queue_col] =
            REQUIRED_COLUMNS.map(|c| position(c).unwrap_or_default());

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();
            records.push(MessageRecord {
                message_id: field(id_col),
                text: field(text_col),
                label: field(label_col),
                suggested_queue: field(queue_col),
            });
        }

        Ok(Self::from_records(records))
    }

    /// Build a dataset from already-parsed records.
    pub fn from_records(records: Vec<MessageRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            by_id.entry(record.message_id.trim().to_string()).or_insert(idx);
        }
        Self { records, by_id }
    }

    /// Find the first record with the given message id.
    pub fn find(&self, message_id: &str) -> Option<&MessageRecord> {
        self.by_id
            .get(message_id.trim())
            .and_then(|&idx| self.records.get(idx))
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
