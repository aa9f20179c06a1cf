//! Access-log aggregation sources feeding the user-agent grouping pass.
//!
//! Both implementations answer the same two questions over a date range:
//! how many log records exist, and how many records each distinct value of
//! a key field (the user agent) produced per day.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{json, Value};

use crate::config::{Settings, LOG_AGGREGATION_SIZE};
use crate::connection::{quote_identifier, Connection};
use crate::date::{DateRange, FormattedDate};
use crate::error::{Result, UsageError};
use crate::http::{HttpClient, HttpRequest};
use crate::models::ActivityRecord;
use crate::sql_builder::SqlBuilder;
use crate::user_agent::AggregateBucket;

/// Field holding the raw user agent in every log record.
pub const USER_AGENT_FIELD: &str = "user_agent";

/// A store of access logs that can count and aggregate records.
pub trait LogSource: Send {
    /// Number of records in `index` whose day falls inside `range`.
    fn count(&self, index: &str, range: &DateRange) -> Result<u64>;

    /// One bucket per distinct non-empty `key` value with its per-day counts,
    /// largest first.
    fn aggregate(&self, index: &str, range: &DateRange, key: &str) -> Result<Vec<AggregateBucket>>;
}

// ---------------------------------------------------------------------------
// Search engine
// ---------------------------------------------------------------------------

/// `YYYY-MM-DDT00:00:00.000Z`, the timestamp form the index stores.
fn index_timestamp(date: FormattedDate) -> String {
    format!("{date}T00:00:00.000Z")
}

/// Bool query: `key` exists and is not empty, `@timestamp` in
/// `[range.start, range.end + 1)`.
pub fn range_query(range: &DateRange, key: &str) -> Value {
    json!({
        "bool": {
            "must": [
                {"exists": {"field": key}},
                {"range": {"@timestamp": {
                    "gte": index_timestamp(range.start),
                    "lt": index_timestamp(range.end + 1),
                }}}
            ],
            "must_not": [
                {"term": {key: ""}}
            ]
        }
    })
}

/// Terms aggregation on `key` with a daily date histogram per bucket.
pub fn aggregate_body(range: &DateRange, key: &str) -> Value {
    json!({
        "size": 0,
        "query": range_query(range, key),
        "aggs": {
            "user_agents": {
                "terms": {"field": key, "size": LOG_AGGREGATION_SIZE},
                "aggs": {
                    "docs_per_day": {
                        "date_histogram": {
                            "field": "@timestamp",
                            "calendar_interval": "day",
                            "format": "yyyy-MM-dd"
                        }
                    }
                }
            }
        }
    })
}

/// Buckets of a `_search` answer built by [`aggregate_body`].
pub fn parse_aggregate_response(payload: &Value, range: &DateRange) -> Vec<AggregateBucket> {
    payload
        .pointer("/aggregations/user_agents/buckets")
        .and_then(Value::as_array)
        .map(|buckets| {
            buckets
                .iter()
                .map(|bucket| AggregateBucket::from_search_bucket(bucket, range))
                .collect()
        })
        .unwrap_or_default()
}

/// [`LogSource`] backed by an Elasticsearch-compatible HTTP endpoint.
pub struct ElasticLogSource {
    base_url: String,
    user: Option<String>,
    password: Option<String>,
    http: HttpClient,
}

impl ElasticLogSource {
    pub fn new(base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: None,
            password: None,
            http,
        }
    }

    /// Built from `LOG_URL` and the search credentials in `settings`.
    pub fn from_settings(settings: &Settings, http: HttpClient) -> Result<Self> {
        let url = settings
            .log_url
            .clone()
            .ok_or_else(|| UsageError::InvalidArgument("LOG_URL is not configured".to_string()))?;
        Ok(Self::new(url, http).with_credentials(settings.log_user.clone(), settings.log_password.clone()))
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    fn post(&self, index: &str, endpoint: &str, body: Value) -> Result<Value> {
        let request = HttpRequest::post_json(format!("{}/{index}/{endpoint}", self.base_url), body)
            .basic_auth(self.user.as_deref(), self.password.as_deref());
        self.http.get_json(&request)
    }
}

impl LogSource for ElasticLogSource {
    fn count(&self, index: &str, range: &DateRange) -> Result<u64> {
        let payload = self.post(index, "_count", json!({"query": range_query(range, USER_AGENT_FIELD)}))?;
        payload
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| UsageError::Format("count answer without 'count'".to_string()))
    }

    fn aggregate(&self, index: &str, range: &DateRange, key: &str) -> Result<Vec<AggregateBucket>> {
        let payload = self.post(index, "_search", aggregate_body(range, key))?;
        Ok(parse_aggregate_response(&payload, range))
    }
}

// ---------------------------------------------------------------------------
// Local exports
// ---------------------------------------------------------------------------

/// [`LogSource`] over NDJSON exports loaded into an in-memory DuckDB.
///
/// The `index` argument names the table the exports were registered under.
pub struct LocalLogSource {
    conn: Connection,
}

impl LocalLogSource {
    pub fn open<P: AsRef<Path>>(index: &str, paths: &[P]) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.register_ndjson_logs(index, paths)?;
        Ok(Self { conn })
    }

    fn table(&self, index: &str) -> Result<String> {
        if !self.conn.has_table(index) {
            return Err(UsageError::NotFound(format!("log table '{index}'")));
        }
        quote_identifier(index)
    }
}

impl LogSource for LocalLogSource {
    fn count(&self, index: &str, range: &DateRange) -> Result<u64> {
        let table = self.table(index)?;
        let (sql, params) = SqlBuilder::new(&table)
            .select(&["COUNT(*) AS n"])
            .where_present(USER_AGENT_FIELD)
            .where_within("day", range)
            .build();
        Ok(self
            .conn
            .execute_scalar(&sql, &params)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    fn aggregate(&self, index: &str, range: &DateRange, key: &str) -> Result<Vec<AggregateBucket>> {
        let table = self.table(index)?;
        let column = quote_identifier(key)?;
        let key_expr = format!("{column} AS key");
        let (sql, params) = SqlBuilder::new(&table)
            .select(&[key_expr.as_str(), "day", "COUNT(*) AS doc_count"])
            .where_present(&column)
            .where_within("day", range)
            .group_by(&[column.as_str(), "day"])
            .order_by(&["key ASC", "day ASC"])
            .build();

        let mut buckets: Vec<AggregateBucket> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        for row in self.conn.execute(&sql, &params)? {
            let key = row.get("key").and_then(Value::as_str).unwrap_or_default().to_string();
            let count = row.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
            let day = row.get("day").and_then(Value::as_str).unwrap_or_default();
            let date = match FormattedDate::parse(day) {
                Ok(date) => date,
                Err(e) => {
                    log::warn!("skipping log day for '{key}': {e}");
                    continue;
                }
            };

            let position = *index_of.entry(key.clone()).or_insert_with(|| {
                buckets.push(AggregateBucket {
                    key,
                    doc_count: 0,
                    days: Vec::new(),
                });
                buckets.len() - 1
            });
            let bucket = &mut buckets[position];
            bucket.doc_count += count;
            bucket.days.push(ActivityRecord::new(date, count));
        }

        buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
        buckets.truncate(LOG_AGGREGATION_SIZE);
        Ok(buckets)
    }
}
