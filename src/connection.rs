//! DuckDB connection holding locally exported access logs.
//!
//! Each registered table is built from one or more newline-delimited JSON
//! exports and has two columns: `user_agent` and `day` (`YYYY-MM-DD`, cut
//! from the record's `@timestamp`).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use duckdb::{types::ValueRef, Connection as DuckDbConnection};
use serde_json::Value;

use crate::error::{Result, UsageError};

/// Wraps a DuckDB connection and tracks the log tables registered on it.
pub struct Connection {
    conn: DuckDbConnection,
    tables: HashSet<String>,
}

impl Connection {
    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: DuckDbConnection::open_in_memory()?,
            tables: HashSet::new(),
        })
    }

    /// Create (or replace) `table` from NDJSON access-log exports.
    ///
    /// Only `@timestamp` and `user_agent` are read; records missing either
    /// are kept with NULLs and filtered out by the queries.
    pub fn register_ndjson_logs<P: AsRef<Path>>(&mut self, table: &str, paths: &[P]) -> Result<()> {
        let table = quote_identifier(table)?;
        if paths.is_empty() {
            return Err(UsageError::InvalidArgument(
                "at least one log file is required".to_string(),
            ));
        }
        let files = paths
            .iter()
            .map(|p| {
                // Forward slashes keep DuckDB happy on every platform.
                let path = p.as_ref().to_string_lossy().replace('\\', "/");
                format!("'{}'", path.replace('\'', "''"))
            })
            .collect::<Vec<_>>()
            .join(", ");

        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {table} AS \
             SELECT user_agent, substr(\"@timestamp\", 1, 10) AS day \
             FROM read_json([{files}], format='newline_delimited', \
             columns={{'@timestamp': 'VARCHAR', 'user_agent': 'VARCHAR'}})"
        ))?;
        log::debug!("Registered log table {} from {} file(s)", table, paths.len());
        self.tables.insert(table);
        Ok(())
    }

    /// Whether `table` has been registered on this connection.
    pub fn has_table(&self, table: &str) -> bool {
        quote_identifier(table)
            .map(|quoted| self.tables.contains(&quoted))
            .unwrap_or(false)
    }

    /// Execute SQL and return each row as a column-name keyed map.
    pub fn execute(&self, sql: &str, params: &[String]) -> Result<Vec<HashMap<String, Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let param_values: Vec<&dyn duckdb::ToSql> =
            params.iter().map(|p| p as &dyn duckdb::ToSql).collect();

        let mut rows = stmt.query(param_values.as_slice())?;

        // Column metadata is only available once the query has run.
        let column_names: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names().into_iter().map(|n| n.to_string()).collect())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = HashMap::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), convert_value_ref(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    /// First column of the first row, or `None` for an empty result.
    pub fn execute_scalar(&self, sql: &str, params: &[String]) -> Result<Option<Value>> {
        let mut stmt = self.conn.prepare(sql)?;
        let param_values: Vec<&dyn duckdb::ToSql> =
            params.iter().map(|p| p as &dyn duckdb::ToSql).collect();

        let mut rows = stmt.query(param_values.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(convert_value_ref(row.get_ref(0)?))),
            None => Ok(None),
        }
    }
}

/// Double-quote a plain identifier, rejecting anything that is not
/// `[A-Za-z0-9_-]+`.
pub fn quote_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(UsageError::InvalidArgument(format!(
            "'{name}' is not a valid table or column name"
        )));
    }
    Ok(format!("\"{name}\""))
}

/// Convert a DuckDB `ValueRef` to a `serde_json::Value`.
fn convert_value_ref(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::Number(n.into()),
        ValueRef::SmallInt(n) => Value::Number(n.into()),
        ValueRef::Int(n) => Value::Number(n.into()),
        ValueRef::BigInt(n) => Value::Number(n.into()),
        ValueRef::UBigInt(n) => Value::Number(n.into()),
        ValueRef::HugeInt(n) => match i64::try_from(n) {
            Ok(i) => Value::Number(i.into()),
            Err(_) => Value::String(n.to_string()),
        },
        ValueRef::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).to_string()),
        _ => Value::Null,
    }
}
