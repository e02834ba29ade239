use dbfsync_protocol::{Record, SyncDataset, TableIdentity};
use std::collections::HashMap;

use super::{
    default_group_field, default_reference_field, default_sub_type, default_type_field,
    record_date, CutoffDate, FilterRule,
};

/// Among records of the supersedable sub-type dated on or before the
/// cutoff, keeps one per group key: the greatest `(date, reference)`
/// pair, compared as strings. Everything else is kept.
#[derive(Debug, Clone)]
pub struct KeepLatestPerKeyRule {
    tables: Vec<TableIdentity>,
    date_fields: Vec<String>,
    type_field: String,
    sub_type: String,
    group_field: String,
    reference_field: String,
}

impl KeepLatestPerKeyRule {
    pub fn new(tables: Vec<TableIdentity>, date_fields: Vec<String>) -> Self {
        Self {
            tables,
            date_fields,
            type_field: default_type_field(),
            sub_type: default_sub_type(),
            group_field: default_group_field(),
            reference_field: default_reference_field(),
        }
    }

    pub fn with_type(mut self, field: &str, sub_type: &str) -> Self {
        self.type_field = field.to_string();
        self.sub_type = sub_type.to_string();
        self
    }

    pub fn with_group_field(mut self, field: &str) -> Self {
        self.group_field = field.to_string();
        self
    }

    pub fn with_reference_field(mut self, field: &str) -> Self {
        self.reference_field = field.to_string();
        self
    }

    fn text(dataset: &SyncDataset, record: &Record, field: &str) -> String {
        dataset
            .value(record, field)
            .and_then(|v| v.to_text())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

impl FilterRule for KeepLatestPerKeyRule {
    fn name(&self) -> &'static str {
        "keep_latest"
    }

    fn applies(&self, table: &TableIdentity) -> bool {
        self.tables.contains(table)
    }

    fn apply(&self, dataset: SyncDataset, cutoff: &CutoffDate) -> SyncDataset {
        // group key -> (index, date, reference) of the current winner
        let mut latest: HashMap<String, (usize, String, String)> = HashMap::new();
        let mut superseded = vec![false; dataset.rows.len()];

        for (index, record) in dataset.rows.iter().enumerate() {
            if Self::text(&dataset, record, &self.type_field) != self.sub_type {
                continue;
            }
            let Some(date) = record_date(&dataset, record, &self.date_fields) else {
                continue;
            };
            if date.as_str() > cutoff.as_str() {
                continue;
            }
            let key = Self::text(&dataset, record, &self.group_field);
            let reference = Self::text(&dataset, record, &self.reference_field);

            match latest.get_mut(&key) {
                Some(winner) if (&date, &reference) > (&winner.1, &winner.2) => {
                    superseded[winner.0] = true;
                    *winner = (index, date, reference);
                }
                Some(_) => superseded[index] = true,
                None => {
                    latest.insert(key, (index, date, reference));
                }
            }
        }

        let rows = dataset
            .rows
            .iter()
            .zip(&superseded)
            .filter(|(_, dropped)| !**dropped)
            .map(|(record, _)| record.clone())
            .collect();
        dataset.with_rows(rows)
    }
}
