//! Item notes (kitchen remarks attached to catalogue items).
//!
//! [`NotesCache`] is a plain bounded map with a TTL; the caller supplies
//! `now`, so expiry is testable without sleeping. [`NotesService`] owns one
//! cache and fetches only the codes it is missing, in a single `list_items`
//! call.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use kds_client::{CancellationToken, Method, RequestClient, RequestOptions};
use serde_json::{json, Value};
use tracing::debug;

use crate::FetchCancelled;

pub const ITEMS_ENDPOINT: &str = "list_items";

#[derive(Debug)]
pub struct NotesCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, (String, Instant)>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

impl NotesCache {
    /// `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entry for `code`; an expired entry is dropped and reported as a miss.
    pub fn get(&mut self, code: &str, now: Instant) -> Option<String> {
        let expired = match self.entries.get(code) {
            None => return None,
            Some((_, at)) => now.saturating_duration_since(*at) >= self.ttl,
        };
        if expired {
            self.remove(code);
            return None;
        }
        self.entries.get(code).map(|(note, _)| note.clone())
    }

    /// Insert or refresh. Re-inserting moves the code to the young end.
    pub fn insert(&mut self, code: impl Into<String>, note: impl Into<String>, now: Instant) {
        let code = code.into();
        if self.entries.contains_key(&code) {
            self.order.retain(|c| c != &code);
        }
        self.entries.insert(code.clone(), (note.into(), now));
        self.order.push_back(code);

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, (_, at))| now.saturating_duration_since(*at) >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for code in stale {
            self.remove(&code);
        }
    }

    fn remove(&mut self, code: &str) {
        self.entries.remove(code);
        self.order.retain(|c| c != code);
    }
}

#[derive(Debug)]
pub struct NotesService {
    client: RequestClient,
    cache: Mutex<NotesCache>,
}

impl NotesService {
    pub fn new(client: RequestClient, cache: NotesCache) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
        }
    }

    /// Notes for every distinct non-empty code. Codes the upstream does not
    /// know are cached as empty notes.
    pub async fn notes_for<S: AsRef<str>>(
        &self,
        codes: &[S],
        cancel: Option<&CancellationToken>,
    ) -> Result<BTreeMap<String, String>, FetchCancelled> {
        let mut found = BTreeMap::new();
        let mut missing: Vec<String> = Vec::new();
        {
            let now = Instant::now();
            let mut cache = self.lock();
            for code in codes.iter().map(AsRef::as_ref).filter(|c| !c.is_empty()) {
                if found.contains_key(code) || missing.iter().any(|m| m == code) {
                    continue;
                }
                match cache.get(code, now) {
                    Some(note) => {
                        found.insert(code.to_string(), note);
                    }
                    None => missing.push(code.to_string()),
                }
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }

        let mut opts = RequestOptions::default();
        if let Some(c) = cancel {
            opts = opts.cancel(c.clone());
        }
        let body = items_filter(&missing);
        let out = self
            .client
            .request_json(Method::Post, ITEMS_ENDPOINT, Some(&body), &BTreeMap::new(), &opts)
            .await;
        if out.cancelled {
            return Err(FetchCancelled);
        }
        if !out.ok {
            // Not cached: the next read retries these codes.
            debug!(requested = missing.len(), error = ?out.error, "item notes unavailable");
            found.extend(missing.into_iter().map(|code| (code, String::new())));
            return Ok(found);
        }

        let fetched: HashMap<String, String> = out
            .data
            .get("list_items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|it| {
                        let code = it.get("item_code_365")?.as_str()?.to_string();
                        let note = match it.get("notes") {
                            Some(Value::String(s)) => s.clone(),
                            Some(Value::Null) | None => String::new(),
                            Some(other) => other.to_string(),
                        };
                        Some((code, note))
                    })
                    .collect()
            })
            .unwrap_or_default();
        debug!(requested = missing.len(), returned = fetched.len(), "item notes fetched");

        let now = Instant::now();
        let mut cache = self.lock();
        for code in missing {
            let note = fetched.get(&code).cloned().unwrap_or_default();
            cache.insert(code.clone(), note.clone(), now);
            found.insert(code, note);
        }
        Ok(found)
    }

    pub async fn note_for(
        &self,
        code: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, FetchCancelled> {
        let mut map = self.notes_for(&[code], cancel).await?;
        Ok(map.remove(code).unwrap_or_default())
    }

    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NotesCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn items_filter(codes: &[String]) -> Value {
    json!({
        "filter_define": {
            "only_counted": "N",
            "page_number": 1,
            "page_size": codes.len().max(1),
            "active_type": "active",
            "ecommerce_type": "all",
            "categories_selection": "",
            "departments_selection": "",
            "brands_selection": "",
            "items_selection": codes.join(","),
            "keyword_search_item_code_365": "",
            "keyword_search_item_name": ""
        }
    })
}
