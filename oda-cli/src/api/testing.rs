//! Test doubles for the transport and retry sleeper

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::constants::MODIFIED_FIELD;
use crate::api::models::Record;
use crate::api::query::Page;
use crate::api::resilience::Sleeper;
use crate::api::transport::{Transport, TransportOutcome};

/// Serves an in-memory record set, honouring `$top`/`$skip` from the rendered request
#[derive(Debug)]
pub struct FakeTransport {
    records: Mutex<Vec<Record>>,
    failures: Mutex<HashMap<u64, VecDeque<TransportOutcome>>>,
    calls: Mutex<Vec<String>>,
    count_override: Option<u64>,
    include_count: bool,
    fixed_page_len: Option<usize>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub fn with_records(n: usize) -> Self {
        Self {
            records: Mutex::new((0..n).map(|i| fake_record(i, "2025-01-01T00:00:00")).collect()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            count_override: None,
            include_count: true,
            fixed_page_len: None,
            delay: None,
        }
    }

    /// Queue an outcome returned (once) for the next request at this skip offset
    pub fn fail_at(self, skip: u64, outcome: TransportOutcome) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(skip)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count_override = Some(count);
        self
    }

    pub fn without_count(mut self) -> Self {
        self.include_count = false;
        self
    }

    /// Return this many records per page whatever `$top` says
    pub fn ignoring_top(mut self, len: usize) -> Self {
        self.fixed_page_len = Some(len);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn skips(&self) -> Vec<u64> {
        self.calls()
            .iter()
            .map(|c| param(c, "skip").unwrap_or(0))
            .collect()
    }

    pub fn tops(&self) -> Vec<u64> {
        self.calls()
            .iter()
            .filter_map(|c| param(c, "top"))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: &str, _timeout: Duration) -> TransportOutcome {
        assert!(!request.contains('$'), "unencoded request: {}", request);
        self.calls.lock().unwrap().push(request.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let skip = param(request, "skip").unwrap_or(0);
        let queued = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&skip)
            .and_then(VecDeque::pop_front);
        if let Some(outcome) = queued {
            return outcome;
        }

        let top = param(request, "top").unwrap_or(100) as usize;
        let mut records = self.records.lock().unwrap().clone();
        let ordered_desc = format!("%24orderby={}%20desc", MODIFIED_FIELD);
        if request.contains(&ordered_desc) {
            records.sort_by(|a, b| b[MODIFIED_FIELD].as_str().cmp(&a[MODIFIED_FIELD].as_str()));
        }

        let total = records.len();
        let len = self.fixed_page_len.unwrap_or(top);
        let start = (skip as usize).min(total);
        let end = start.saturating_add(len).min(total);
        let mut page = Page::new(records[start..end].to_vec());
        if self.include_count && request.contains("%24inlinecount=allpages") {
            page.total_count = Some(self.count_override.unwrap_or(total as u64));
        }
        TransportOutcome::Success(page)
    }
}

pub fn fake_record(id: usize, modified: &str) -> Record {
    json!({
        "id": id,
        "titel": format!("Sag {}", id),
        MODIFIED_FIELD: modified,
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn param(request: &str, name: &str) -> Option<u64> {
    let marker = format!("%24{}=", name);
    let start = request.find(&marker)? + marker.len();
    request[start..]
        .split('&')
        .next()
        .and_then(|v| v.parse().ok())
}

/// Records requested delays without waiting
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
