//! Parameterized SELECT statements over the registered access-log tables.
//!
//! Values are bound through DuckDB's `?` placeholders and never spliced
//! into the SQL text; only column and table names (already validated by
//! [`quote_identifier`](crate::connection::quote_identifier)) are.
//!
//! # Example
//!
//! ```rust
//! use usage_analytics::{DateRange, FormattedDate, SqlBuilder};
//!
//! let window = DateRange::ending_on(FormattedDate::parse("2024-05-14").unwrap(), 14);
//! let (sql, params) = SqlBuilder::new("access_logs")
//!     .select(&["user_agent", "day", "COUNT(*) AS doc_count"])
//!     .where_within("day", &window)
//!     .group_by(&["user_agent", "day"])
//!     .order_by(&["user_agent ASC", "day ASC"])
//!     .build();
//! assert_eq!(params, vec!["2024-05-01", "2024-05-14"]);
//! ```

use crate::date::DateRange;

/// One WHERE condition and the values it binds.
enum Condition {
    Compare { column: String, op: &'static str, value: String },
    Present(String),
    Raw { text: String, values: Vec<String> },
}

impl Condition {
    fn render(&self) -> String {
        match self {
            Condition::Compare { column, op, .. } => format!("{column} {op} ?"),
            Condition::Present(column) => format!("{column} IS NOT NULL AND {column} <> ''"),
            Condition::Raw { text, .. } => text.clone(),
        }
    }

    fn values(&self) -> &[String] {
        match self {
            Condition::Compare { value, .. } => std::slice::from_ref(value),
            Condition::Present(_) => &[],
            Condition::Raw { values, .. } => values,
        }
    }
}

/// Builds one parameterized query; chain the clauses, then [`build`](Self::build).
pub struct SqlBuilder {
    table: String,
    columns: Vec<String>,
    conditions: Vec<Condition>,
    grouping: Vec<String>,
    ordering: Vec<String>,
    limit: Option<usize>,
}

impl SqlBuilder {
    /// `SELECT * FROM {table}` until [`select`](Self::select) narrows it.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            conditions: Vec::new(),
            grouping: Vec::new(),
            ordering: Vec::new(),
            limit: None,
        }
    }

    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Free-form condition; `values` bind its `?` placeholders in order.
    pub fn where_clause(&mut self, condition: &str, values: &[&str]) -> &mut Self {
        self.conditions.push(Condition::Raw {
            text: condition.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn where_eq(&mut self, column: &str, value: &str) -> &mut Self {
        self.compare(column, "=", value)
    }

    pub fn where_gte(&mut self, column: &str, value: &str) -> &mut Self {
        self.compare(column, ">=", value)
    }

    pub fn where_lte(&mut self, column: &str, value: &str) -> &mut Self {
        self.compare(column, "<=", value)
    }

    /// Both ends of `range` inclusive, compared as `YYYY-MM-DD` text.
    pub fn where_within(&mut self, column: &str, range: &DateRange) -> &mut Self {
        self.where_gte(column, &range.start.to_string())
            .where_lte(column, &range.end.to_string())
    }

    /// Non-NULL and non-empty text column.
    pub fn where_present(&mut self, column: &str) -> &mut Self {
        self.conditions.push(Condition::Present(column.to_string()));
        self
    }

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        self.grouping.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Ordering terms such as `"day ASC"`.
    pub fn order_by(&mut self, terms: &[&str]) -> &mut Self {
        self.ordering.extend(terms.iter().map(|t| t.to_string()));
        self
    }

    pub fn limit(&mut self, rows: usize) -> &mut Self {
        self.limit = Some(rows);
        self
    }

    /// The SQL text, one clause per line, and its bound values.
    pub fn build(&self) -> (String, Vec<String>) {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {columns}\nFROM {}", self.table);

        if !self.conditions.is_empty() {
            let rendered: Vec<String> = self.conditions.iter().map(Condition::render).collect();
            sql.push_str(&format!("\nWHERE {}", rendered.join(" AND ")));
        }
        if !self.grouping.is_empty() {
            sql.push_str(&format!("\nGROUP BY {}", self.grouping.join(", ")));
        }
        if !self.ordering.is_empty() {
            sql.push_str(&format!("\nORDER BY {}", self.ordering.join(", ")));
        }
        if let Some(rows) = self.limit {
            sql.push_str(&format!("\nLIMIT {rows}"));
        }

        let params = self
            .conditions
            .iter()
            .flat_map(|c| c.values().iter().cloned())
            .collect();
        (sql, params)
    }

    fn compare(&mut self, column: &str, op: &'static str, value: &str) -> &mut Self {
        self.conditions.push(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.to_string(),
        });
        self
    }
}
