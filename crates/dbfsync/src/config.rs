//! Run configuration.
//!
//! Built once at startup from, in increasing precedence: built-in
//! defaults, an optional TOML file, then environment variables and CLI
//! flags (both arrive through [`Overrides`]). The result is immutable and
//! handed to every stage explicitly.

use dbfsync_protocol::defaults::{
    DEFAULT_DATABASE_NAME, DEFAULT_LOCK_DIR, DEFAULT_SOURCE_ROOT, DEFAULT_SOURCE_SUBPATH,
    DEFAULT_TABLE_PREFIX,
};
use dbfsync_protocol::TableIdentity;
use dbfsync_sinks::{LoaderOptions, SessionOptions};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::filter::{CutoffDate, FilterRegistry, FilterSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid cutoff date '{0}': expected YYYYMMDD")]
    InvalidCutoff(String),

    #[error("Unsupported database type '{0}' (expected mysql, postgresql or sqlite)")]
    UnsupportedDbType(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Table plan is empty")]
    EmptyPlan,

    #[error("Cannot build the database URL: {0}")]
    DatabaseUrl(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbType {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl DbType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DbType::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(DbType::Postgres),
            "sqlite" | "sqlite3" => Ok(DbType::Sqlite),
            _ => Err(ConfigError::UnsupportedDbType(s.to_string())),
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DbType::MySql => 3306,
            DbType::Postgres => 5432,
            DbType::Sqlite => 0,
        }
    }
}

/// Connection parameters, kept apart so the password never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            db_type: DbType::MySql,
            host: "localhost".to_string(),
            port: DbType::MySql.default_port(),
            user: "root".to_string(),
            password: String::new(),
            name: DEFAULT_DATABASE_NAME.to_string(),
            sqlite_path: PathBuf::from("database.db"),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.redacted_url())
            .finish()
    }
}

impl DatabaseConfig {
    /// `DATABASE_URL` if set, otherwise assembled from the parts.
    pub fn url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let scheme = match self.db_type {
            DbType::Sqlite => {
                return Ok(format!("sqlite://{}?mode=rwc", self.sqlite_path.display()))
            }
            DbType::MySql => "mysql",
            DbType::Postgres => "postgres",
        };

        let invalid = |what: &str| ConfigError::DatabaseUrl(what.to_string());
        let mut url = Url::parse(&format!("{scheme}://localhost/"))
            .map_err(|e| ConfigError::DatabaseUrl(e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| ConfigError::DatabaseUrl(format!("host '{}': {e}", self.host)))?;
        url.set_port(Some(self.port))
            .map_err(|_| invalid("port rejected"))?;
        url.set_username(&self.user)
            .map_err(|_| invalid("user rejected"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("password rejected"))?;
        }
        url.path_segments_mut()
            .map_err(|_| invalid("database name rejected"))?
            .pop_if_empty()
            .push(&self.name);
        Ok(url.into())
    }

    /// The URL with any password replaced by `***`.
    pub fn redacted_url(&self) -> String {
        match self.url() {
            Ok(url) => redact_url(&url),
            Err(e) => format!("<{e}>"),
        }
    }
}

fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "<unparseable database URL>".to_string();
    };
    if url.password().is_some() && url.set_password(Some("***")).is_err() {
        return "<unparseable database URL>".to_string();
    }
    url.into()
}

/// One source group and the tables synced from it, in run order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanGroup {
    pub group: String,
    pub tables: Vec<String>,
}

/// A table as configured (original casing, used for paths) and its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTable {
    pub group: String,
    pub table: String,
    pub identity: TableIdentity,
}

impl PlannedTable {
    pub fn new(group: &str, table: &str) -> Self {
        Self {
            group: group.to_string(),
            table: table.to_string(),
            identity: TableIdentity::new(group, table),
        }
    }

    /// `<table>.dbf`, unless the configured name already has the extension.
    pub fn file_name(&self) -> String {
        if self.table.to_ascii_lowercase().ends_with(".dbf") {
            self.table.clone()
        } else {
            format!("{}.dbf", self.table)
        }
    }

    /// `GROUP/table.dbf`, the label used in progress lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.group, self.file_name())
    }
}

pub fn default_plan() -> Vec<PlanGroup> {
    let group = |name: &str, tables: &[&str]| PlanGroup {
        group: name.to_string(),
        tables: tables.iter().map(|t| t.to_string()).collect(),
    };
    vec![
        group(
            "UBSACC2015",
            &["arcust", "apvend", "arpay", "arpost", "gldata", "glbatch", "glpost"],
        ),
        group(
            "UBSSTK2015",
            &["icitem", "icgroup", "artran", "ictran", "arpso", "icpso"],
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub root: PathBuf,
    pub subpath: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            subpath: DEFAULT_SOURCE_SUBPATH.to_string(),
        }
    }
}

impl SourceConfig {
    /// `{root}/{group}/{subpath}/{table}.dbf`
    pub fn path_for(&self, table: &PlannedTable) -> PathBuf {
        let mut path = self.root.join(&table.group);
        if !self.subpath.is_empty() {
            path.push(&self.subpath);
        }
        path.push(table.file_name());
        path
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub lock_dir: PathBuf,
    pub table_prefix: String,
    pub plan: Vec<PlanGroup>,
    pub cutoff: Option<CutoffDate>,
    /// `None` selects the built-in rules.
    pub filters: Option<Vec<FilterSpec>>,
    pub loader: LoaderOptions,
    pub session: SessionOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            source: SourceConfig::default(),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            plan: default_plan(),
            cutoff: None,
            filters: None,
            loader: LoaderOptions::default(),
            session: SessionOptions::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults, then `config_path` if given, then `overrides`.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = config_path {
            config.apply_file(FileConfig::read(path)?)?;
        }
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tables(&self) -> Vec<PlannedTable> {
        self.plan
            .iter()
            .flat_map(|group| {
                group
                    .tables
                    .iter()
                    .map(move |table| PlannedTable::new(&group.group, table))
            })
            .collect()
    }

    pub fn filter_registry(&self) -> FilterRegistry {
        match &self.filters {
            Some(specs) => FilterRegistry::from_specs(specs),
            None => FilterRegistry::with_default_rules(),
        }
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        let db = file.database;
        self.set_db_type(db.db_type.as_deref(), db.port)?;
        set(&mut self.database.url, db.url.map(Some));
        set(&mut self.database.host, db.host);
        set(&mut self.database.user, db.user);
        set(&mut self.database.password, db.password);
        set(&mut self.database.name, db.name);
        set(&mut self.database.sqlite_path, db.sqlite_path);

        set(&mut self.source.root, file.source.root);
        set(&mut self.source.subpath, file.source.subpath);
        set(&mut self.lock_dir, file.lock.dir);

        let sync = file.sync;
        set(&mut self.table_prefix, sync.table_prefix);
        if let Some(cutoff) = sync.cutoff_date {
            self.cutoff = Some(cutoff.parse()?);
        }
        set(&mut self.loader.batch_size, sync.batch_size);
        set(&mut self.loader.oversize_sub_batch, sync.oversize_sub_batch);
        set(&mut self.loader.string_cap_bytes, sync.string_cap_bytes);
        set(
            &mut self.loader.oversize_string_cap_bytes,
            sync.oversize_string_cap_bytes,
        );
        set(&mut self.loader.max_attempts, sync.max_attempts);
        set(
            &mut self.loader.retry_backoff,
            sync.retry_backoff_secs.map(Duration::from_secs),
        );
        set(&mut self.session.idle_timeout_secs, sync.idle_timeout_secs);
        set(&mut self.session.net_timeout_secs, sync.net_timeout_secs);

        if !file.plan.is_empty() {
            self.plan = file.plan;
        }
        if let Some(filters) = file.filters {
            self.filters = Some(filters);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, o: Overrides) -> Result<()> {
        self.set_db_type(o.db_type.as_deref(), o.db_port)?;
        set(&mut self.database.url, o.database_url.map(Some));
        set(&mut self.database.host, o.db_host);
        set(&mut self.database.user, o.db_user);
        set(&mut self.database.password, o.db_password);
        set(&mut self.database.name, o.db_name);
        set(&mut self.database.sqlite_path, o.sqlite_path);
        set(&mut self.source.root, o.dbf_root);
        set(&mut self.source.subpath, o.dbf_subpath);
        set(&mut self.lock_dir, o.lock_dir);
        set(&mut self.table_prefix, o.table_prefix);
        set(&mut self.loader.batch_size, o.batch_size);
        if let Some(cutoff) = o.cutoff_date.filter(|c| !c.trim().is_empty()) {
            self.cutoff = Some(cutoff.parse()?);
        }
        Ok(())
    }

    /// A new database type resets the port to that type's default unless a
    /// port is given alongside it.
    fn set_db_type(&mut self, db_type: Option<&str>, port: Option<u16>) -> Result<()> {
        if let Some(db_type) = db_type {
            self.database.db_type = DbType::parse(db_type)?;
            self.database.port = self.database.db_type.default_port();
        }
        set(&mut self.database.port, port);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.loader.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.loader.oversize_sub_batch == 0 {
            return Err(ConfigError::Zero("oversize_sub_batch"));
        }
        if self.loader.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.plan.iter().all(|g| g.tables.is_empty()) {
            return Err(ConfigError::EmptyPlan);
        }
        self.database.url()?;
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Values from environment variables and command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub db_type: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub sqlite_path: Option<PathBuf>,
    pub dbf_root: Option<PathBuf>,
    pub dbf_subpath: Option<String>,
    pub lock_dir: Option<PathBuf>,
    pub table_prefix: Option<String>,
    pub batch_size: Option<usize>,
    pub cutoff_date: Option<String>,
}

/// On-disk shape of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    database: DatabaseSection,
    source: SourceSection,
    lock: LockSection,
    sync: SyncSection,
    plan: Vec<PlanGroup>,
    filters: Option<Vec<FilterSpec>>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseSection {
    url: Option<String>,
    #[serde(rename = "type")]
    db_type: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
    sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceSection {
    root: Option<PathBuf>,
    subpath: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LockSection {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncSection {
    table_prefix: Option<String>,
    cutoff_date: Option<String>,
    batch_size: Option<usize>,
    oversize_sub_batch: Option<usize>,
    string_cap_bytes: Option<usize>,
    oversize_string_cap_bytes: Option<usize>,
    max_attempts: Option<u32>,
    retry_backoff_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    net_timeout_secs: Option<u64>,
}
