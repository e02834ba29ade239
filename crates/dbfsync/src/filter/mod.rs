//! Per-table business filters applied between the reader and the loader.
//!
//! A [`FilterRegistry`] holds an ordered list of [`FilterRule`]s; the
//! first rule whose [`applies`](FilterRule::applies) matches a table
//! decides its rows. Tables no rule claims, and every table when no
//! cutoff is configured, pass through unchanged.

mod cutoff;
mod keep_latest;

pub use cutoff::DateCutoffRule;
pub use keep_latest::KeepLatestPerKeyRule;

use chrono::NaiveDate;
use dbfsync_protocol::{Record, SyncDataset, TableIdentity};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Primary date field first, then the fallbacks.
pub const DEFAULT_DATE_FIELDS: [&str; 4] = ["DATE", "SODATE", "UPDATED_ON", "CREATED_ON"];

/// A validated `YYYYMMDD` cutoff.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CutoffDate(String);

impl CutoffDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CutoffDate {
    type Err = ConfigError;

    /// Accepts `YYYYMMDD` or `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.trim().chars().filter(|c| *c != '-').collect();
        if compact.len() == 8
            && compact.bytes().all(|b| b.is_ascii_digit())
            && NaiveDate::parse_from_str(&compact, "%Y%m%d").is_ok()
        {
            Ok(Self(compact))
        } else {
            Err(ConfigError::InvalidCutoff(s.to_string()))
        }
    }
}

impl fmt::Display for CutoffDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of filtering one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub dataset: SyncDataset,
    pub skipped: usize,
    /// Name of the rule that ran, if any.
    pub rule: Option<&'static str>,
}

impl FilterOutcome {
    fn unchanged(dataset: SyncDataset) -> Self {
        Self {
            dataset,
            skipped: 0,
            rule: None,
        }
    }
}

pub trait FilterRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, table: &TableIdentity) -> bool;

    /// Return the kept rows; the schema is never changed.
    fn apply(&self, dataset: SyncDataset, cutoff: &CutoffDate) -> SyncDataset;
}

/// Pins a table as unfiltered so no later rule can claim it.
#[derive(Debug, Clone)]
pub struct PassThroughRule {
    tables: Vec<TableIdentity>,
}

impl PassThroughRule {
    pub fn new(tables: Vec<TableIdentity>) -> Self {
        Self { tables }
    }
}

impl FilterRule for PassThroughRule {
    fn name(&self) -> &'static str {
        "pass_through"
    }

    fn applies(&self, table: &TableIdentity) -> bool {
        self.tables.contains(table)
    }

    fn apply(&self, dataset: SyncDataset, _cutoff: &CutoffDate) -> SyncDataset {
        dataset
    }
}

#[derive(Default)]
pub struct FilterRegistry {
    rules: Vec<Box<dyn FilterRule>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sales documents are cut off by date, the order header table keeps
    /// only the latest open order per agent, and order lines are never
    /// filtered here.
    pub fn with_default_rules() -> Self {
        let stock = "UBSSTK2015";
        Self::new()
            .with_rule(PassThroughRule::new(vec![TableIdentity::new(stock, "ictran")]))
            .with_rule(DateCutoffRule::new(
                vec![
                    TableIdentity::new(stock, "artran"),
                    TableIdentity::new(stock, "arpso"),
                ],
                default_date_fields(),
            ))
            .with_rule(KeepLatestPerKeyRule::new(
                vec![TableIdentity::new(stock, "icpso")],
                default_date_fields(),
            ))
    }

    pub fn from_specs(specs: &[FilterSpec]) -> Self {
        specs
            .iter()
            .fold(Self::new(), |registry, spec| registry.with_boxed(spec.build()))
    }

    pub fn with_rule(self, rule: impl FilterRule + 'static) -> Self {
        self.with_boxed(Box::new(rule))
    }

    fn with_boxed(mut self, rule: Box<dyn FilterRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_for(&self, table: &TableIdentity) -> Option<&dyn FilterRule> {
        self.rules
            .iter()
            .find(|rule| rule.applies(table))
            .map(|rule| rule.as_ref())
    }

    pub fn filter(
        &self,
        dataset: SyncDataset,
        table: &TableIdentity,
        cutoff: Option<&CutoffDate>,
    ) -> FilterOutcome {
        let (Some(cutoff), Some(rule)) = (cutoff, self.rule_for(table)) else {
            return FilterOutcome::unchanged(dataset);
        };
        let before = dataset.rows.len();
        let dataset = rule.apply(dataset, cutoff);
        FilterOutcome {
            skipped: before.saturating_sub(dataset.rows.len()),
            dataset,
            rule: Some(rule.name()),
        }
    }
}

/// `[[filters]]` entry in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    DateCutoff {
        tables: Vec<TableIdentity>,
        #[serde(default = "default_date_fields")]
        date_fields: Vec<String>,
    },
    KeepLatest {
        tables: Vec<TableIdentity>,
        #[serde(default = "default_date_fields")]
        date_fields: Vec<String>,
        #[serde(default = "default_type_field")]
        type_field: String,
        #[serde(default = "default_sub_type")]
        sub_type: String,
        #[serde(default = "default_group_field")]
        group_field: String,
        #[serde(default = "default_reference_field")]
        reference_field: String,
    },
    PassThrough {
        tables: Vec<TableIdentity>,
    },
}

impl FilterSpec {
    fn build(&self) -> Box<dyn FilterRule> {
        match self {
            FilterSpec::DateCutoff {
                tables,
                date_fields,
            } => Box::new(DateCutoffRule::new(tables.clone(), date_fields.clone())),
            FilterSpec::KeepLatest {
                tables,
                date_fields,
                type_field,
                sub_type,
                group_field,
                reference_field,
            } => Box::new(
                KeepLatestPerKeyRule::new(tables.clone(), date_fields.clone())
                    .with_type(type_field, sub_type)
                    .with_group_field(group_field)
                    .with_reference_field(reference_field),
            ),
            FilterSpec::PassThrough { tables } => Box::new(PassThroughRule::new(tables.clone())),
        }
    }
}

pub fn default_date_fields() -> Vec<String> {
    DEFAULT_DATE_FIELDS.iter().map(|s| s.to_string()).collect()
}

fn default_type_field() -> String {
    "TYPE".to_string()
}

fn default_sub_type() -> String {
    "SO".to_string()
}

fn default_group_field() -> String {
    "AGENNO".to_string()
}

fn default_reference_field() -> String {
    "REFNO".to_string()
}

/// Date of `record` as `YYYYMMDD`: the first of `fields` that is present
/// and non-null decides. Dashes are dropped and the first eight characters
/// kept; anything that is not eight digits afterwards is no date.
pub fn record_date(dataset: &SyncDataset, record: &Record, fields: &[String]) -> Option<String> {
    let value = fields
        .iter()
        .filter_map(|field| dataset.value(record, field))
        .find(|value| !value.is_null())?;
    let compact: String = value
        .to_text()?
        .chars()
        .filter(|c| *c != '-')
        .take(8)
        .collect();
    (compact.len() == 8 && compact.bytes().all(|b| b.is_ascii_digit())).then_some(compact)
}


#[cfg(test)]
mod tests {
    use super::test_support::{orders, refnos};
    use super::*;
    use dbfsync_protocol::{FieldDescriptor, FieldType, TableSchema, Value};

    fn cutoff() -> CutoffDate {
        "20251212".parse().unwrap()
    }

    #[test]
    fn cutoff_accepts_compact_and_dashed_forms() {
        assert_eq!(cutoff().as_str(), "20251212");
        assert_eq!("2025-12-12".parse::<CutoffDate>().unwrap(), cutoff());
        assert!("20251332".parse::<CutoffDate>().is_err());
        assert!("2025121".parse::<CutoffDate>().is_err());
        assert!("yesterday".parse::<CutoffDate>().is_err());
    }

    #[test]
    fn record_date_uses_fallbacks_only_when_primary_is_absent() {
        let schema = TableSchema::new(vec![
            FieldDescriptor::new("DATE", FieldType::Date, 8, 0),
            FieldDescriptor::new("UPDATED_ON", FieldType::DateTime, 8, 0),
        ]);
        let fields = default_date_fields();
        let ds = SyncDataset::new(schema, vec![]);

        let both = Record::new(vec![
            Value::from("2025-12-01"),
            Value::from("2025-12-20T08:00:00"),
        ]);
        assert_eq!(record_date(&ds, &both, &fields).as_deref(), Some("20251201"));

        let fallback = Record::new(vec![Value::Null, Value::from("2025-12-20T08:00:00")]);
        assert_eq!(record_date(&ds, &fallback, &fields).as_deref(), Some("20251220"));

        let garbage = Record::new(vec![Value::from("n/a"), Value::Null]);
        assert_eq!(record_date(&ds, &garbage, &fields), None);
    }

    #[test]
    fn no_cutoff_means_no_filtering() {
        let registry = FilterRegistry::with_default_rules();
        let table = TableIdentity::new("UBSSTK2015", "artran");
        let ds = orders(&[("1", "IN", "A", Some("2020-01-01"))]);
        let outcome = registry.filter(ds.clone(), &table, None);
        assert_eq!(outcome.dataset, ds);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.rule, None);
    }

    #[test]
    fn default_registry_routes_tables() {
        let registry = FilterRegistry::with_default_rules();
        let name = |group: &str, table: &str| {
            registry
                .rule_for(&TableIdentity::new(group, table))
                .map(|r| r.name())
        };
        assert_eq!(name("UBSSTK2015", "artran"), Some("date_cutoff"));
        assert_eq!(name("ubsstk2015", "ARPSO.DBF"), Some("date_cutoff"));
        assert_eq!(name("UBSSTK2015", "icpso"), Some("keep_latest"));
        assert_eq!(name("UBSSTK2015", "ictran"), Some("pass_through"));
        assert_eq!(name("UBSACC2015", "artran"), None);
        assert_eq!(name("UBSACC2015", "arcust"), None);
    }

    #[test]
    fn pass_through_keeps_everything() {
        let registry = FilterRegistry::with_default_rules();
        let table = TableIdentity::new("UBSSTK2015", "ictran");
        let ds = orders(&[("1", "IN", "A", Some("2000-01-01"))]);
        let outcome = registry.filter(ds, &table, Some(&cutoff()));
        assert_eq!(outcome.skipped, 0);
        assert_eq!(refnos(&outcome.dataset), vec!["1"]);
    }

    #[test]
    fn specs_parse_from_toml() {
        #[derive(Deserialize)]
        struct Root {
            filters: Vec<FilterSpec>,
        }
        let root: Root = toml::from_str(
            r#"
            [[filters]]
            kind = "pass_through"
            tables = ["UBSSTK2015/ictran"]

            [[filters]]
            kind = "date_cutoff"
            tables = ["UBSSTK2015/artran"]
            date_fields = ["DATE"]

            [[filters]]
            kind = "keep_latest"
            tables = ["UBSSTK2015/icpso"]
            sub_type = "QT"
            "#,
        )
        .unwrap();

        assert_eq!(root.filters.len(), 3);
        assert_eq!(
            root.filters[1],
            FilterSpec::DateCutoff {
                tables: vec![TableIdentity::new("UBSSTK2015", "artran")],
                date_fields: vec!["DATE".to_string()],
            }
        );
        match &root.filters[2] {
            FilterSpec::KeepLatest {
                sub_type,
                group_field,
                ..
            } => {
                assert_eq!(sub_type, "QT");
                assert_eq!(group_field, "AGENNO");
            }
            other => panic!("unexpected {other:?}"),
        }

        let registry = FilterRegistry::from_specs(&root.filters);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry
                .rule_for(&TableIdentity::new("UBSSTK2015", "icpso"))
                .map(|r| r.name()),
            Some("keep_latest")
        );
    }

    #[test]
    fn unknown_filter_kind_is_rejected() {
        #[derive(Debug, Deserialize)]
        struct Root {
            #[allow(dead_code)]
            filters: Vec<FilterSpec>,
        }
        let err = toml::from_str::<Root>(
            r#"
            [[filters]]
            kind = "regex"
            tables = ["a/b"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("regex"));
    }
}
