//! Domain models: scramble methods, columns and tables

use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Method identifier that leaves a column untouched
pub const NOP_METHOD: &str = "nop";

/// How a column should be scrambled by the external obfuscator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrambleMethod {
    /// A bare method identifier, e.g. `email` or `nop`
    Named(String),
    /// A method with parameters, written as a mapping in the config file
    Directive(Directive),
}

/// Parameterized scramble method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directive {
    pub method: String,
    #[serde(
        default,
        deserialize_with = "scalar_params",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub params: Vec<String>,
}

/// Accept `params: [10, true, x]` as strings; nested values are rejected
fn scalar_params<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<serde_yaml::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|value| match value {
            serde_yaml::Value::String(s) => Ok(s),
            serde_yaml::Value::Number(n) => Ok(n.to_string()),
            serde_yaml::Value::Bool(b) => Ok(b.to_string()),
            other => Err(de::Error::custom(format!(
                "scramble method params must be scalars, got {:?}",
                other
            ))),
        })
        .collect()
}

impl ScrambleMethod {
    pub fn named(method: impl Into<String>) -> Self {
        ScrambleMethod::Named(method.into())
    }

    pub fn nop() -> Self {
        ScrambleMethod::Named(NOP_METHOD.to_string())
    }

    /// Method identifier without parameters
    pub fn method(&self) -> &str {
        match self {
            ScrambleMethod::Named(method) => method,
            ScrambleMethod::Directive(directive) => &directive.method,
        }
    }

    pub fn is_nop(&self) -> bool {
        self.method() == NOP_METHOD
    }

    /// True when the method identifier is empty or whitespace
    pub fn is_blank(&self) -> bool {
        self.method().trim().is_empty()
    }
}

impl From<&str> for ScrambleMethod {
    fn from(method: &str) -> Self {
        ScrambleMethod::named(method)
    }
}

impl fmt::Display for ScrambleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrambleMethod::Named(method) => write!(f, "{}", method),
            ScrambleMethod::Directive(directive) => {
                write!(f, "{}", directive.method)?;
                for param in &directive.params {
                    write!(f, ":{}", param)?;
                }
                Ok(())
            }
        }
    }
}

/// A table column and the method assigned to it
///
/// A column without a method is "unspecified": it still needs a human decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    scramble_method: Option<ScrambleMethod>,
}

impl Column {
    /// A blank method counts as no method
    pub fn new(name: impl Into<String>, scramble_method: Option<ScrambleMethod>) -> Self {
        Self {
            name: name.into(),
            scramble_method: scramble_method.filter(|m| !m.is_blank()),
        }
    }

    /// Column freshly seen in the schema, no method yet
    pub fn unspecified(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scramble_method(&self) -> Option<&ScrambleMethod> {
        self.scramble_method.as_ref()
    }

    pub fn is_specified(&self) -> bool {
        self.scramble_method.is_some()
    }

    /// Copy of this column carrying a different method
    pub fn with_scramble_method(&self, scramble_method: Option<ScrambleMethod>) -> Self {
        Self::new(self.name.clone(), scramble_method)
    }
}

/// A named set of columns, ordered by column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: BTreeMap<String, Column>,
}

impl Table {
    /// Build a table, rejecting duplicate column names
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = Column>) -> Result<Self> {
        let name = name.into();
        let mut by_name = BTreeMap::new();

        for column in columns {
            if by_name.contains_key(column.name()) {
                return Err(CoreError::DuplicateColumn {
                    table: name,
                    column: column.name,
                });
            }
            by_name.insert(column.name.clone(), column);
        }

        Ok(Self {
            name,
            columns: by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Every column, specified or not
    pub fn all_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Columns that have a scramble method
    pub fn columns(&self) -> Vec<&Column> {
        self.columns.values().filter(|c| c.is_specified()).collect()
    }

    /// Columns still waiting for a scramble method
    pub fn unspecified_columns(&self) -> Vec<&Column> {
        self.columns.values().filter(|c| !c.is_specified()).collect()
    }

    /// Obfuscator flags for this table, one `-c table:column:method` per column.
    /// `nop` columns produce no flag.
    pub fn options(&self) -> String {
        self.columns
            .values()
            .filter_map(|column| {
                column
                    .scramble_method()
                    .filter(|method| !method.is_nop())
                    .map(|method| format!("-c {}:{}:{}", self.name, column.name, method))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Merge persisted methods from `other` into this table's columns.
    ///
    /// Only columns of `self` survive. A column present in `other` takes its
    /// method from `other`, even when that method is unset.
    pub fn update_with(&self, other: &Table) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| {
                let merged = match other.column(name) {
                    Some(persisted) => column.with_scramble_method(persisted.scramble_method.clone()),
                    None => column.clone(),
                };
                (name.clone(), merged)
            })
            .collect();

        let dropped: Vec<&str> = other
            .columns
            .keys()
            .filter(|name| !self.columns.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !dropped.is_empty() {
            debug!("Dropping stale columns of {}: {:?}", self.name, dropped);
        }

        Table {
            name: self.name.clone(),
            columns,
        }
    }
}
