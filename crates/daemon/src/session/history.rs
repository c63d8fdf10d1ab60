//! Records of finished sessions, served by the terminal history endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::SessionId;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

/// One destroyed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub id: SessionId,
    /// Target host the session was opened for.
    pub ip: Option<String>,
    pub role: Option<String>,
    /// Local time the session was created, `YYYY-MM-DD HH:MM:SS`.
    pub create_time: String,
    /// Lifetime as `HH:MM:SS`.
    pub duration: String,
    /// `completed`, or `timeout` for reaped sessions.
    pub status: String,
    pub commands: Vec<String>,
}

/// Query string of the history endpoint. Numbers stay text so a bad value
/// falls back to the default instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub ip: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl HistoryQuery {
    fn page(&self) -> usize {
        parse_positive(self.page.as_deref()).unwrap_or(1)
    }

    fn page_size(&self) -> usize {
        parse_positive(self.page_size.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }
}

fn parse_positive(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub list: Vec<HistoryRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Bounded in-memory history. The oldest record is evicted when full.
#[derive(Debug)]
pub struct SessionHistory {
    records: Mutex<VecDeque<HistoryRecord>>,
    capacity: usize,
}

impl SessionHistory {
    /// Creates a history keeping at most `capacity` records. Zero disables
    /// recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn record(&self, record: HistoryRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Filters by exact `ip` when given, then paginates (pages start at 1).
    pub fn query(&self, query: &HistoryQuery) -> HistoryPage {
        let page = query.page();
        let page_size = query.page_size();
        let ip = query.ip.as_deref().filter(|ip| !ip.is_empty());

        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let matching: Vec<&HistoryRecord> = records
            .iter()
            .rev()
            .filter(|record| ip.map_or(true, |ip| record.ip.as_deref() == Some(ip)))
            .collect();

        let list = matching
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(|record| (*record).clone())
            .collect();

        HistoryPage {
            list,
            total: matching.len(),
            page,
            page_size,
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Formats Unix milliseconds as local `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|time| {
            time.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

/// Formats a millisecond span as `HH:MM:SS`.
pub(crate) fn format_duration(millis: u64) -> String {
    let secs = millis / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
