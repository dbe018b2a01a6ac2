use crate::core::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered attribute names bound positionally to the fields of each line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBindingSpec {
    names: Vec<String>,
}

impl FieldBindingSpec {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(BatchError::Config(
                "Field binding spec needs at least one name".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(BatchError::Config("Field name must not be blank".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(BatchError::Config(format!("Duplicate field name '{}'", name)));
            }
        }

        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for FieldBindingSpec {
    fn default() -> Self {
        Self {
            names: vec!["firstName".to_string(), "lastName".to_string()],
        }
    }
}

/// A single-row insert written with named parameters, e.g.
/// `INSERT INTO people (first_name, last_name) VALUES (:firstName, :lastName)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub parameters: Vec<String>,
}

impl InsertStatement {
    pub fn parse(sql: &str) -> Result<Self> {
        let invalid = |reason: &str| BatchError::Config(format!("{}: {}", reason, sql));

        let trimmed = sql.trim().trim_end_matches(';').trim();
        let head = "INSERT INTO";
        if !trimmed.to_ascii_uppercase().starts_with(head) {
            return Err(invalid("Statement must start with INSERT INTO"));
        }
        let rest = &trimmed[head.len()..];

        let open = rest.find('(').ok_or_else(|| invalid("Missing column list"))?;
        let close = rest[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| invalid("Unterminated column list"))?;
        let table = rest[..open].trim().to_string();
        let columns = split_list(&rest[open + 1..close]);

        let tail = rest[close + 1..].trim();
        if !tail.to_ascii_uppercase().starts_with("VALUES") {
            return Err(invalid("Missing VALUES clause"));
        }
        let values = tail["VALUES".len()..].trim();
        let inner = values
            .strip_prefix('(')
            .and_then(|v| v.strip_suffix(')'))
            .ok_or_else(|| invalid("Malformed VALUES list"))?;

        let parameters = split_list(inner)
            .into_iter()
            .map(|p| {
                p.strip_prefix(':')
                    .map(str::to_string)
                    .ok_or_else(|| invalid("Values must be named parameters like :name"))
            })
            .collect::<Result<Vec<_>>>()?;

        if !is_identifier(&table) {
            return Err(invalid("Invalid table name"));
        }
        if columns.is_empty() || columns.len() != parameters.len() {
            return Err(invalid("Column and parameter counts differ"));
        }
        if let Some(bad) = columns
            .iter()
            .chain(parameters.iter())
            .find(|name| !is_identifier(name))
        {
            return Err(invalid(&format!("Invalid identifier '{}'", bad)));
        }

        Ok(Self {
            table,
            columns,
            parameters,
        })
    }

    /// Positional form of the statement, one `?` per column.
    pub fn template(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders
        )
    }
}

/// One statement template plus one parameter set per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInsert {
    pub table: String,
    pub columns: Vec<String>,
    pub sql: String,
    pub rows: Vec<Vec<String>>,
}

impl BatchInsert {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
