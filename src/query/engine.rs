// SPDX-License-Identifier: Apache-2.0

use crate::entry::{LogEntry, Priority};
use crate::query::builder::{self, SET_AGGREGATION};
use crate::query::errors::{QueryError, Result};
use crate::query::filter::{Cursor, LogFilter};
use crate::query::geo::GeoLookup;
use crate::search::SearchBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HIGH_PRIORITY: Priority = Priority::Warn;
pub const UNUSUAL_IP_WINDOW_DAYS: u32 = 30;

const SET_AGGREGATION_KINDS: [&str; 3] = ["sterms", "lterms", "dterms"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub total: u64,
    /// Position of the last entry, to be passed back for the next page
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnusualIp {
    pub ip: String,
    pub country: Option<String>,
    pub count: u64,
}

pub struct QueryEngine {
    backend: Arc<dyn SearchBackend>,
    index: String,
    page_size: usize,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(backend: Arc<dyn SearchBackend>, index: impl Into<String>) -> Self {
        Self {
            backend,
            index: index.into(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One page of entries matching `filter`, newest first. Priority is an
    /// exact match.
    pub async fn get_logs(&self, filter: &LogFilter, cursor: Option<&Cursor>) -> Result<LogPage> {
        let body = builder::logs_query(filter, cursor, self.page_size, false)?;
        self.page(&body).await
    }

    /// Like [`get_logs`](Self::get_logs) with priority as a threshold,
    /// defaulting to `Warn`.
    pub async fn get_logs_at_or_above(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
    ) -> Result<LogPage> {
        let mut filter = filter.clone();
        filter.priority.get_or_insert(DEFAULT_HIGH_PRIORITY);
        let body = builder::logs_query(&filter, cursor, self.page_size, true)?;
        self.page(&body).await
    }

    /// Distinct values of `attr` among matching entries, with their counts.
    pub async fn get_set(&self, attr: &str, filter: &LogFilter) -> Result<BTreeMap<String, u64>> {
        builder::validate_attribute(attr)?;
        self.facet(attr, filter).await
    }

    pub async fn get_apps(&self) -> Result<Vec<String>> {
        let apps = self.get_set("app", &LogFilter::default()).await?;
        Ok(apps.into_keys().collect())
    }

    /// Addresses seen outside the dominant country of the filtered traffic,
    /// least frequent first. Unresolvable addresses are always reported.
    /// Without a time window the last 30 days are searched.
    pub async fn get_unusual_ips(
        &self,
        filter: &LogFilter,
        geo: &dyn GeoLookup,
    ) -> Result<Vec<UnusualIp>> {
        let mut filter = filter.clone();
        if !filter.has_window() {
            filter.last_n_days = Some(UNUSUAL_IP_WINDOW_DAYS);
        }

        let counts = self.facet("remote_ip", &filter).await?;
        let located: Vec<UnusualIp> = counts
            .into_iter()
            .map(|(ip, count)| UnusualIp {
                country: ip.parse::<IpAddr>().ok().and_then(|addr| geo.country(addr)),
                ip,
                count,
            })
            .collect();

        let mut by_country: HashMap<&str, u64> = HashMap::new();
        for entry in &located {
            if let Some(country) = &entry.country {
                *by_country.entry(country).or_default() += entry.count;
            }
        }
        let dominant = by_country
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(country, _)| country.to_string());
        debug!(dominant = ?dominant, addresses = located.len(), "Resolved address countries");

        let mut unusual: Vec<UnusualIp> = located
            .into_iter()
            .filter(|entry| entry.country.is_none() || entry.country != dominant)
            .collect();
        unusual.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.ip.cmp(&b.ip)));
        Ok(unusual)
    }

    async fn search(&self, body: &Value) -> Result<Value> {
        match tokio::time::timeout(self.timeout, self.backend.search(&self.index, body)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(QueryError::Timeout),
        }
    }

    async fn page(&self, body: &Value) -> Result<LogPage> {
        let response = self.search(body).await?;
        parse_page(body, &response)
    }

    async fn facet(&self, field: &str, filter: &LogFilter) -> Result<BTreeMap<String, u64>> {
        let body = builder::set_query(field, filter)?;
        let response = self.search(&body).await?;
        parse_set(&response)
    }
}

fn sort_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_page(request: &Value, response: &Value) -> Result<LogPage> {
    let hits = &response["hits"];
    let total = match &hits["total"] {
        Value::Number(n) => n.as_u64(),
        total => total["value"].as_u64(),
    }
    .ok_or_else(|| QueryError::Decode("missing hits.total".to_string()))?;

    let raw = hits["hits"]
        .as_array()
        .ok_or_else(|| QueryError::Decode("missing hits.hits".to_string()))?;

    let mut entries = Vec::with_capacity(raw.len());
    for hit in raw {
        entries.push(LogEntry::deserialize(&hit["_source"])?);
    }

    let next = raw.last().and_then(|hit| {
        let values = hit["sort"].as_array()?;
        let fields = request["sort"].as_array()?;
        let mut cursor = Cursor::default();
        for (field, value) in fields.iter().zip(values) {
            if field.get("when").is_some() {
                cursor.when = sort_value(value);
            } else if field.get("id").is_some() {
                cursor.id = sort_value(value);
            }
        }
        (!cursor.is_empty()).then_some(cursor)
    });

    Ok(LogPage {
        entries,
        total,
        next,
    })
}

fn parse_set(response: &Value) -> Result<BTreeMap<String, u64>> {
    let aggregations = response["aggregations"]
        .as_object()
        .ok_or_else(|| QueryError::Decode("missing aggregations".to_string()))?;

    let (name, aggregation) = aggregations
        .iter()
        .find(|(name, _)| name.rsplit_once('#').map(|(_, n)| n) == Some(SET_AGGREGATION))
        .ok_or_else(|| QueryError::Decode(format!("missing {} aggregation", SET_AGGREGATION)))?;

    let kind = name.split_once('#').map(|(kind, _)| kind).unwrap_or_default();
    if !SET_AGGREGATION_KINDS.contains(&kind) {
        return Err(QueryError::UnknownAggregation(kind.to_string()));
    }

    let buckets = aggregation["buckets"]
        .as_array()
        .ok_or_else(|| QueryError::Decode("missing buckets".to_string()))?;

    let mut set = BTreeMap::new();
    for bucket in buckets {
        let key = bucket
            .get("key_as_string")
            .and_then(sort_value)
            .or_else(|| sort_value(&bucket["key"]))
            .ok_or_else(|| QueryError::Decode("bucket without key".to_string()))?;
        let count = bucket["doc_count"].as_u64().unwrap_or_default();
        set.insert(key, count);
    }
    Ok(set)
}
