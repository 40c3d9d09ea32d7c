//! Scramble configuration: reconciliation and YAML persistence
//!
//! A [`Config`] built from the live schema is merged with the hand-edited file
//! on disk through [`Config::update_with`], so method annotations survive
//! schema changes.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::domain::{Column, ScrambleMethod, Table};
use crate::env::{interpolate_all, Env};
use crate::error::{CoreError, Result};

/// Dump path written by the schema factory
pub const DEFAULT_DUMP_PATH: &str = "scrambled.dump.gz";

/// Storage-destination placeholders written by the schema factory
pub fn default_s3_template() -> BTreeMap<String, String> {
    [
        ("bucket", "YOUR-S3-BUCKET"),
        ("region", "YOUR-REGION"),
        ("prefix", "YOUR-S3-PATH-PREFIX"),
        ("access_key_id", "${AWS_ACCESS_KEY_ID}"),
        ("secret_key", "${AWS_SECRET_KEY}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// On-disk shape of the config file
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    dump_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s3: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exclude_tables: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pgdump_args: Option<String>,
    #[serde(default)]
    tables: Option<BTreeMap<String, BTreeMap<String, Option<ScrambleMethod>>>>,
}

/// The full scramble configuration for one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    tables: BTreeMap<String, Table>,
    dump_path: String,
    s3: Option<BTreeMap<String, String>>,
    resolved_s3: Option<BTreeMap<String, String>>,
    exclude_tables: BTreeSet<String>,
    pgdump_args: Option<String>,
}

impl Config {
    /// Build a config. Tables are keyed and iterated by name; duplicate names fail.
    ///
    /// When `s3` is given, every value is expanded against `env` into
    /// [`Config::resolved_s3`].
    pub fn new<E: Env + ?Sized>(
        tables: impl IntoIterator<Item = Table>,
        dump_path: impl Into<String>,
        s3: Option<BTreeMap<String, String>>,
        exclude_tables: impl IntoIterator<Item = String>,
        pgdump_args: Option<String>,
        env: &E,
    ) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for table in tables {
            if by_name.contains_key(table.name()) {
                return Err(CoreError::DuplicateTable(table.name().to_string()));
            }
            by_name.insert(table.name().to_string(), table);
        }

        let resolved_s3 = s3.as_ref().map(|props| interpolate_all(props, env));

        Ok(Self {
            tables: by_name,
            dump_path: dump_path.into(),
            s3,
            resolved_s3,
            exclude_tables: exclude_tables.into_iter().collect(),
            pgdump_args,
        })
    }

    pub fn dump_path(&self) -> &str {
        &self.dump_path
    }

    /// Storage properties as written in the file
    pub fn s3(&self) -> Option<&BTreeMap<String, String>> {
        self.s3.as_ref()
    }

    /// Storage properties with `${VAR}` templates expanded
    pub fn resolved_s3(&self) -> Option<&BTreeMap<String, String>> {
        self.resolved_s3.as_ref()
    }

    pub fn exclude_tables(&self) -> &BTreeSet<String> {
        &self.exclude_tables
    }

    pub fn pgdump_args(&self) -> Option<&str> {
        self.pgdump_args.as_deref()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Reconcile this (freshly introspected) config with a persisted one.
    ///
    /// Tables on both sides are merged column by column, with the persisted
    /// methods winning. Tables only in `other` are kept verbatim, since the
    /// introspector may simply not have seen them. Dump metadata always comes
    /// from `self`.
    pub fn update_with<E: Env + ?Sized>(&self, other: &Config, env: &E) -> Result<Config> {
        let mut tables: Vec<Table> = self
            .tables
            .values()
            .map(|table| match other.table(table.name()) {
                Some(persisted) => table.update_with(persisted),
                None => table.clone(),
            })
            .collect();

        let orphaned: Vec<&Table> = other
            .tables
            .values()
            .filter(|table| !self.tables.contains_key(table.name()))
            .collect();
        if !orphaned.is_empty() {
            info!(
                "Keeping {} tables missing from the schema: {:?}",
                orphaned.len(),
                orphaned.iter().map(|t| t.name()).collect::<Vec<_>>()
            );
        }
        tables.extend(orphaned.into_iter().cloned());

        Config::new(
            tables,
            self.dump_path.clone(),
            self.s3.clone(),
            self.exclude_tables.iter().cloned(),
            self.pgdump_args.clone(),
            env,
        )
    }

    /// Unspecified columns per table; fully specified tables are left out
    pub fn unspecified_columns(&self) -> BTreeMap<&str, Vec<&Column>> {
        self.tables
            .values()
            .map(|table| (table.name(), table.unspecified_columns()))
            .filter(|(_, columns)| !columns.is_empty())
            .collect()
    }

    /// Obfuscator flags for every table, in table then column order
    pub fn obfuscator_options(&self) -> String {
        self.tables
            .values()
            .map(Table::options)
            .filter(|options| !options.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Extra `pg_dump` arguments: data exclusions first, then `pgdump_args`
    pub fn pg_dump_options(&self) -> Vec<String> {
        self.exclude_tables
            .iter()
            .map(|table| format!("--exclude-table-data={}", table))
            .chain(
                self.pgdump_args
                    .iter()
                    .flat_map(|args| args.split_whitespace().map(str::to_string)),
            )
            .collect()
    }

    /// Parse a YAML config document.
    ///
    /// Tagged nodes are rejected; anchors, aliases and `<<` merge keys are resolved.
    pub fn read<R: Read, E: Env + ?Sized>(mut reader: R, env: &E) -> Result<Config> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        Self::from_yaml_str(&source, env)
    }

    pub fn read_file<E: Env + ?Sized>(path: impl AsRef<Path>, env: &E) -> Result<Config> {
        let path = path.as_ref();
        debug!("Reading config from {}", path.display());
        let file = File::open(path)?;
        Self::read(file, env)
    }

    pub fn from_yaml_str<E: Env + ?Sized>(source: &str, env: &E) -> Result<Config> {
        if source.trim().is_empty() {
            return Err(CoreError::MalformedConfig("empty document".to_string()));
        }

        let mut value: Value = serde_yaml::from_str(source)?;
        reject_tags(&value, "$")?;
        value.apply_merge()?;

        if value.is_null() {
            return Err(CoreError::MalformedConfig("empty document".to_string()));
        }

        let document: Document = serde_yaml::from_value(value)
            .map_err(|e| CoreError::MalformedConfig(e.to_string()))?;

        let mut tables = Vec::new();
        for (table_name, columns) in document.tables.unwrap_or_default() {
            let columns = columns
                .into_iter()
                .map(|(name, method)| Column::new(name, method));
            tables.push(Table::new(table_name, columns)?);
        }

        Config::new(
            tables,
            document.dump_path,
            document.s3,
            document.exclude_tables.unwrap_or_default(),
            document.pgdump_args,
            env,
        )
    }

    /// Serialize to YAML. Only specified columns are written, and tables
    /// without any are omitted.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        serde_yaml::to_writer(writer, &self.to_document())?;
        Ok(())
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        info!("Wrote config with {} tables to {}", self.tables.len(), path.display());
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_document())?)
    }

    fn to_document(&self) -> Document {
        let tables = self
            .tables
            .values()
            .filter_map(|table| {
                let columns: BTreeMap<String, Option<ScrambleMethod>> = table
                    .columns()
                    .into_iter()
                    .map(|c| (c.name().to_string(), c.scramble_method().cloned()))
                    .collect();
                (!columns.is_empty()).then(|| (table.name().to_string(), columns))
            })
            .collect();

        Document {
            dump_path: self.dump_path.clone(),
            s3: self.s3.clone(),
            exclude_tables: (!self.exclude_tables.is_empty()).then(|| self.exclude_tables.clone()),
            pgdump_args: self.pgdump_args.clone(),
            tables: Some(tables),
        }
    }
}

/// Fail on any explicitly tagged node (`!ruby/object:...`, `!Foo`)
fn reject_tags(value: &Value, path: &str) -> Result<()> {
    match value {
        Value::Tagged(tagged) => Err(CoreError::UnsafeYaml(format!(
            "tag {} at {}",
            tagged.tag, path
        ))),
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                reject_tags(item, &format!("{}[{}]", path, index))?;
            }
            Ok(())
        }
        Value::Mapping(mapping) => {
            for (key, item) in mapping {
                reject_tags(key, path)?;
                let key = key.as_str().map_or_else(|| format!("{:?}", key), str::to_string);
                reject_tags(item, &format!("{}.{}", path, key))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn table(name: &str, columns: &[(&str, Option<&str>)]) -> Table {
        Table::new(
            name,
            columns
                .iter()
                .map(|(c, m)| Column::new(*c, m.map(ScrambleMethod::from))),
        )
        .unwrap()
    }

    fn config(tables: Vec<Table>) -> Config {
        Config::new(tables, "out.dump.gz", None, Vec::new(), None, &no_env()).unwrap()
    }

    fn method_of<'a>(config: &'a Config, table: &str, column: &str) -> Option<&'a ScrambleMethod> {
        config
            .table(table)
            .and_then(|t| t.column(column))
            .and_then(Column::scramble_method)
    }

    #[test]
    fn test_tables_sorted_by_name() {
        let c = config(vec![
            table("z_table_name", &[("a", None)]),
            table("a_table_name", &[("a", None)]),
        ]);
        assert_eq!(c.table_names(), vec!["a_table_name", "z_table_name"]);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = Config::new(
            vec![table("users", &[]), table("users", &[])],
            "out",
            None,
            Vec::new(),
            None,
            &no_env(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTable(name) if name == "users"));
    }

    #[test]
    fn test_unknown_table_is_none() {
        let c = config(vec![table("users", &[("a", None)])]);
        assert!(c.table("orders").is_none());
    }

    #[test]
    fn test_s3_resolution() {
        let mut env = HashMap::new();
        env.insert("ENV_VAR".to_string(), "secret123".to_string());
        let mut s3 = BTreeMap::new();
        s3.insert("access_key_id".to_string(), "${ENV_VAR}".to_string());

        let c = Config::new(Vec::new(), "out", Some(s3), Vec::new(), None, &env).unwrap();

        assert_eq!(c.resolved_s3().unwrap()["access_key_id"], "secret123");
        assert_eq!(c.s3().unwrap()["access_key_id"], "${ENV_VAR}");
    }

    #[test]
    fn test_no_s3_means_no_resolved_s3() {
        let c = config(Vec::new());
        assert!(c.s3().is_none());
        assert!(c.resolved_s3().is_none());
    }

    #[test]
    fn test_update_with_identity() {
        let c = config(vec![
            table("users", &[("email", Some("email")), ("name", None)]),
            table("orders", &[("note", Some("nop"))]),
        ]);
        let merged = c.update_with(&c, &no_env()).unwrap();
        assert_eq!(merged, c);
    }

    #[test]
    fn test_update_with_preserves_orphaned_tables() {
        let fresh = config(vec![table("t1", &[("a", None)])]);
        let persisted = config(vec![
            table("t2", &[("x", Some("email"))]),
            table("t1", &[("a", Some("mask")), ("gone", Some("bytes"))]),
        ]);

        let merged = fresh.update_with(&persisted, &no_env()).unwrap();

        assert_eq!(merged.table_names(), vec!["t1", "t2"]);
        assert_eq!(merged.table("t1").unwrap().column_names(), vec!["a"]);
        assert_eq!(method_of(&merged, "t1", "a"), Some(&ScrambleMethod::named("mask")));
        assert_eq!(merged.table("t2"), persisted.table("t2"));
    }

    #[test]
    fn test_update_with_takes_metadata_from_self() {
        let mut env = HashMap::new();
        env.insert("KEY".to_string(), "k".to_string());
        let mut s3 = BTreeMap::new();
        s3.insert("access_key_id".to_string(), "${KEY}".to_string());

        let fresh = Config::new(
            Vec::new(),
            "fresh.dump",
            Some(s3),
            vec!["logs".to_string()],
            Some("--no-owner".to_string()),
            &env,
        )
        .unwrap();
        let persisted = Config::new(
            Vec::new(),
            "persisted.dump",
            None,
            vec!["sessions".to_string()],
            None,
            &env,
        )
        .unwrap();

        let merged = fresh.update_with(&persisted, &env).unwrap();

        assert_eq!(merged.dump_path(), "fresh.dump");
        assert_eq!(merged.resolved_s3().unwrap()["access_key_id"], "k");
        assert!(merged.exclude_tables().contains("logs"));
        assert!(!merged.exclude_tables().contains("sessions"));
        assert_eq!(merged.pgdump_args(), Some("--no-owner"));
    }

    #[test]
    fn test_unspecified_columns_report() {
        let c = config(vec![
            table("users", &[("email", Some("email")), ("name", None)]),
            table("orders", &[("note", Some("bytes"))]),
        ]);

        let report = c.unspecified_columns();
        assert_eq!(report.len(), 1);
        let names: Vec<&str> = report["users"].iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["name"]);
        assert!(!report.contains_key("orders"));
    }

    #[test]
    fn test_obfuscator_options_ordering() {
        let c = config(vec![
            table("users", &[("name", Some("name")), ("email", Some("email"))]),
            table("empty", &[("x", None)]),
            table("accounts", &[("iban", Some("digits"))]),
        ]);
        assert_eq!(
            c.obfuscator_options(),
            "-c accounts:iban:digits -c users:email:email -c users:name:name"
        );
    }

    #[test]
    fn test_pg_dump_options() {
        let c = Config::new(
            Vec::new(),
            "out",
            None,
            vec!["sessions".to_string(), "audit_logs".to_string()],
            Some("--no-owner  --no-acl".to_string()),
            &no_env(),
        )
        .unwrap();

        assert_eq!(
            c.pg_dump_options(),
            vec![
                "--exclude-table-data=audit_logs",
                "--exclude-table-data=sessions",
                "--no-owner",
                "--no-acl",
            ]
        );
    }

    #[test]
    fn test_write_omits_unspecified() {
        let c = config(vec![
            table("users", &[("email", Some("email")), ("name", None)]),
            table("orders", &[("note", None)]),
        ]);

        let yaml = c.to_yaml_string().unwrap();
        assert!(yaml.contains("users"));
        assert!(yaml.contains("email: email"));
        assert!(!yaml.contains("name"));
        assert!(!yaml.contains("orders"));
        assert!(!yaml.contains("exclude_tables"));
        assert!(!yaml.contains("s3"));
    }

    #[test]
    fn test_write_emits_raw_s3_and_excludes() {
        let mut env = HashMap::new();
        env.insert("AWS_SECRET_KEY".to_string(), "do-not-write".to_string());
        let mut s3 = BTreeMap::new();
        s3.insert("secret_key".to_string(), "${AWS_SECRET_KEY}".to_string());

        let c = Config::new(Vec::new(), "out", Some(s3), vec!["logs".to_string()], None, &env)
            .unwrap();
        let yaml = c.to_yaml_string().unwrap();

        assert!(yaml.contains("${AWS_SECRET_KEY}"));
        assert!(!yaml.contains("do-not-write"));
        assert!(yaml.contains("exclude_tables"));
        assert!(yaml.contains("- logs"));
    }

    #[test]
    fn test_round_trip() {
        let c = config(vec![
            table("users", &[("email", Some("email")), ("bio", Some("nop"))]),
            table("accounts", &[("iban", Some("digits"))]),
        ]);

        let mut buf = Vec::new();
        c.write(&mut buf).unwrap();
        let read = Config::read(buf.as_slice(), &no_env()).unwrap();

        assert_eq!(read, c);
    }

    #[test]
    fn test_blank_method_round_trip() {
        let c = config(vec![
            table("users", &[("a", Some("")), ("email", Some("email"))]),
            table("orders", &[("note", Some(" "))]),
        ]);

        let yaml = c.to_yaml_string().unwrap();
        assert!(!yaml.contains("a: ''"));
        assert!(!yaml.contains("orders"));
        assert_eq!(c.obfuscator_options(), "-c users:email:email");

        let unspecified = c.unspecified_columns();
        assert_eq!(unspecified["users"].len(), 1);
        assert_eq!(unspecified["orders"].len(), 1);

        let read = Config::from_yaml_str(&yaml, &no_env()).unwrap();
        assert_eq!(read.table("users").unwrap().columns(), c.table("users").unwrap().columns());
    }

    #[test]
    fn test_read_minimal_document() {
        let c = Config::from_yaml_str("dump_path: out.dump.gz\n", &no_env()).unwrap();
        assert_eq!(c.dump_path(), "out.dump.gz");
        assert!(c.table_names().is_empty());
        assert!(c.exclude_tables().is_empty());
        assert!(c.pgdump_args().is_none());
    }

    #[test]
    fn test_read_full_document() {
        let yaml = r#"
dump_path: out.dump.gz
s3:
  bucket: my-bucket
  access_key_id: ${KEY_ID}
exclude_tables:
  - sessions
pgdump_args: --no-owner
tables:
  users:
    email: email
    name:
    phone: ""
"#;
        let mut env = HashMap::new();
        env.insert("KEY_ID".to_string(), "AKIA".to_string());

        let c = Config::from_yaml_str(yaml, &env).unwrap();

        assert_eq!(c.resolved_s3().unwrap()["access_key_id"], "AKIA");
        assert_eq!(c.resolved_s3().unwrap()["bucket"], "my-bucket");
        assert!(c.exclude_tables().contains("sessions"));
        assert_eq!(c.pgdump_args(), Some("--no-owner"));
        assert_eq!(method_of(&c, "users", "email"), Some(&ScrambleMethod::named("email")));
        assert!(method_of(&c, "users", "name").is_none());
        assert!(method_of(&c, "users", "phone").is_none());
    }

    #[test]
    fn test_read_supports_aliases() {
        let yaml = r#"
dump_path: out
tables:
  users:
    email: &masked
      method: replace
      params: [example.com]
  admins:
    email: *masked
"#;
        let c = Config::from_yaml_str(yaml, &no_env()).unwrap();

        let users = method_of(&c, "users", "email").unwrap();
        let admins = method_of(&c, "admins", "email").unwrap();
        assert_eq!(users, admins);
        assert_eq!(users.to_string(), "replace:example.com");
    }

    #[test]
    fn test_read_rejects_tags() {
        let yaml = "dump_path: out\ntables:\n  users:\n    email: !ruby/object:Foo {}\n";
        let err = Config::from_yaml_str(yaml, &no_env()).unwrap_err();
        assert!(matches!(err, CoreError::UnsafeYaml(_)));
        assert!(err.to_string().contains("$.tables.users.email"));
    }

    #[test]
    fn test_read_rejects_non_mapping_tables() {
        let yaml = "dump_path: out\ntables:\n  - users\n";
        let err = Config::from_yaml_str(yaml, &no_env()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedConfig(_)));
    }

    #[test]
    fn test_read_requires_dump_path() {
        let err = Config::from_yaml_str("tables: {}\n", &no_env()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedConfig(_)));
    }

    #[test]
    fn test_read_empty_document() {
        let err = Config::from_yaml_str("", &no_env()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedConfig(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrambler.yml");
        let c = config(vec![table("users", &[("email", Some("email"))])]);

        c.write_file(&path).unwrap();
        let read = Config::read_file(&path, &no_env()).unwrap();

        assert_eq!(read, c);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::read_file(dir.path().join("missing.yml"), &no_env()).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
