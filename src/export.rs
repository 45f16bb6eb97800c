use crate::errors::Result;
use crate::types::ExtractedRecord;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CSV_HEADER: [&str; 8] = [
    "no",
    "entity_name",
    "application_type",
    "address",
    "category",
    "region",
    "subregion",
    "selected_category",
];

/// UTF-8 byte order mark, so spreadsheet tools detect the Hangul text.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub trait RecordSink {
    /// Persists `records`, returning how many were written.
    fn write_records(&mut self, records: &[ExtractedRecord]) -> Result<usize>;
}

pub struct CsvSink {
    path: PathBuf,
    bom: bool,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bom: true,
        }
    }

    pub fn without_bom(mut self) -> Self {
        self.bom = false;
        self
    }
}

impl RecordSink for CsvSink {
    fn write_records(&mut self, records: &[ExtractedRecord]) -> Result<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(&self.path)?;
        if self.bom {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;
        for record in records {
            writer.write_record([
                record.no.as_str(),
                record.entity_name.as_str(),
                record.application_type.as_str(),
                record.address.as_str(),
                record.category.as_str(),
                record.combination.region.as_str(),
                record.combination.subregion.as_str(),
                record.combination.category.as_str(),
            ])?;
        }
        writer.flush()?;

        info!(path = %self.path.display(), records = records.len(), "records written");
        Ok(records.len())
    }
}
