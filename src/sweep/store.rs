use crate::types::{ExtractedRecord, SelectionCombination};
use std::collections::HashSet;

/// Append-only record accumulator for one sweep.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<ExtractedRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExtractedRecord) {
        self.records.push(record);
    }

    /// Tags untagged rows with the combination they were observed under.
    pub fn extend_tagged(
        &mut self,
        combination: &SelectionCombination,
        rows: impl IntoIterator<Item = ExtractedRecord>,
    ) {
        self.records
            .extend(rows.into_iter().map(|r| r.with_combination(combination)));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    /// Drops exact duplicates, keeping the first occurrence of each.
    pub fn into_deduplicated(self) -> Vec<ExtractedRecord> {
        let mut seen = HashSet::with_capacity(self.records.len());
        self.records
            .into_iter()
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(no: &str, name: &str) -> ExtractedRecord {
        ExtractedRecord {
            no: no.to_string(),
            entity_name: name.to_string(),
            ..ExtractedRecord::default()
        }
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let combination = SelectionCombination::new("A", "X", "P");
        let mut store = RecordStore::new();
        store.extend_tagged(&combination, vec![row("1", "a"), row("2", "b"), row("1", "a")]);
        store.push(row("1", "a").with_combination(&combination));

        assert_eq!(store.len(), 4);
        let records = store.into_deduplicated();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity_name, "a");
        assert_eq!(records[1].entity_name, "b");
    }

    #[test]
    fn test_same_row_under_different_combinations_is_kept() {
        let mut store = RecordStore::new();
        store.extend_tagged(&SelectionCombination::new("A", "X", "P"), vec![row("1", "a")]);
        store.extend_tagged(&SelectionCombination::new("A", "Y", "P"), vec![row("1", "a")]);

        assert_eq!(store.into_deduplicated().len(), 2);
    }
}
