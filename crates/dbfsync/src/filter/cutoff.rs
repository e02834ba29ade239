use dbfsync_protocol::{SyncDataset, TableIdentity};

use super::{record_date, CutoffDate, FilterRule};

/// Drops records dated before the cutoff. Records without a usable date
/// are kept.
#[derive(Debug, Clone)]
pub struct DateCutoffRule {
    tables: Vec<TableIdentity>,
    date_fields: Vec<String>,
}

impl DateCutoffRule {
    pub fn new(tables: Vec<TableIdentity>, date_fields: Vec<String>) -> Self {
        Self {
            tables,
            date_fields,
        }
    }
}

impl FilterRule for DateCutoffRule {
    fn name(&self) -> &'static str {
        "date_cutoff"
    }

    fn applies(&self, table: &TableIdentity) -> bool {
        self.tables.contains(table)
    }

    fn apply(&self, dataset: SyncDataset, cutoff: &CutoffDate) -> SyncDataset {
        let rows = dataset
            .rows
            .iter()
            .filter(|record| match record_date(&dataset, record, &self.date_fields) {
                Some(date) => date.as_str() >= cutoff.as_str(),
                None => true,
            })
            .cloned()
            .collect();
        dataset.with_rows(rows)
    }
}
