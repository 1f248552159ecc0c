//! Remote collection provider: pagination, filter state and a local overlay
//! of mutations on top of the pages fetched from one endpoint.
//!
//! # Design
//! A `RemoteCollection` is bound to one `CollectionConfig` for its whole life
//! and carries a generation number assigned by whoever built it. Fetches run
//! in two halves so the host can do the I/O: `begin_fetch` returns a
//! `PendingFetch` ticket and `complete_fetch` applies the response, rejecting
//! tickets from any other generation.
//!
//! Rows and overlay entries are keyed by the configured key field. Starting
//! a fetch under a different filter resets the loaded window, so rows from
//! two filters never mix and pagination restarts at offset 0.
//!
//! Local reads see the loaded server rows with the overlay applied on top.
//! `refresh` only marks the view for re-fetching. When a page at offset 0
//! arrives it replaces the loaded rows and drops every overlay entry written
//! before that fetch began; entries written while it was in flight survive.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::CollectionConfig;
use crate::endpoint::CollectionEndpoint;
use crate::error::{ApiError, MutationError};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{FetchRequest, ItemMetadata, Page, Record};

/// Snapshot published to subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub generation: u64,
    /// Bumped on every applied page, mutation and refresh.
    pub revision: u64,
    pub in_flight: usize,
    /// Set by `refresh`, cleared when a page at offset 0 is applied.
    pub needs_refetch: bool,
}

/// A fetch that has been started but not yet completed.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    generation: u64,
    epoch: u64,
    request: FetchRequest,
    http: HttpRequest,
}

impl PendingFetch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// The request the host has to execute.
    pub fn http_request(&self) -> &HttpRequest {
        &self.http
    }
}

/// One local change. `metadata` carries the key of each affected record,
/// in the same order as `data`.
#[derive(Debug, Clone)]
pub enum Mutation<R: Record> {
    Add {
        data: Vec<R>,
        metadata: Vec<ItemMetadata<R::Key>>,
    },
    Update {
        data: Vec<R>,
        metadata: Vec<ItemMetadata<R::Key>>,
    },
    Remove {
        metadata: Vec<ItemMetadata<R::Key>>,
    },
}

impl<R: Record> Mutation<R> {
    /// Add `data`, taking each record's key from `key_field`.
    pub fn add(data: Vec<R>, key_field: &str) -> Result<Self, MutationError> {
        let metadata = metadata_for(&data, key_field)?;
        Ok(Self::Add { data, metadata })
    }

    pub fn update(data: Vec<R>, key_field: &str) -> Result<Self, MutationError> {
        let metadata = metadata_for(&data, key_field)?;
        Ok(Self::Update { data, metadata })
    }

    pub fn remove(keys: Vec<R::Key>) -> Self {
        Self::Remove {
            metadata: keys.into_iter().map(|key| ItemMetadata { key }).collect(),
        }
    }

    pub fn keys(&self) -> Vec<R::Key> {
        let metadata = match self {
            Self::Add { metadata, .. } | Self::Update { metadata, .. } | Self::Remove { metadata } => metadata,
        };
        metadata.iter().map(|m| m.key.clone()).collect()
    }
}

fn metadata_for<R: Record>(data: &[R], key_field: &str) -> Result<Vec<ItemMetadata<R::Key>>, MutationError> {
    data.iter()
        .map(|record| {
            record
                .key(key_field)
                .map(|key| ItemMetadata { key })
                .ok_or_else(|| MutationError::MissingKeyField(key_field.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Change<R> {
    Upsert(R),
    Removed,
}

/// An overlay change stamped with the epoch it was written in.
#[derive(Debug, Clone)]
struct OverlayEntry<R> {
    epoch: u64,
    change: Change<R>,
}

/// A paginated, filterable, locally mutable view of one remote collection.
#[derive(Debug)]
pub struct RemoteCollection<R: Record> {
    endpoint: CollectionEndpoint<R>,
    generation: u64,
    filter_text: Option<String>,
    rows: IndexMap<R::Key, R>,
    overlay: IndexMap<R::Key, OverlayEntry<R>>,
    loaded: usize,
    total_size: i64,
    has_more: bool,
    fetched_once: bool,
    /// Bumped by every mutation and refresh.
    epoch: u64,
    refreshed_at: u64,
    status: watch::Sender<CollectionStatus>,
}

impl<R: Record> RemoteCollection<R> {
    pub fn new(config: Arc<CollectionConfig>, generation: u64) -> Self {
        info!(url = %config.base_url(), generation, "created remote collection");
        let (status, _) = watch::channel(CollectionStatus {
            generation,
            revision: 0,
            in_flight: 0,
            needs_refetch: false,
        });
        Self {
            endpoint: CollectionEndpoint::new(config),
            generation,
            filter_text: None,
            rows: IndexMap::new(),
            overlay: IndexMap::new(),
            loaded: 0,
            total_size: -1,
            has_more: false,
            fetched_once: false,
            epoch: 0,
            refreshed_at: 0,
            status,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &CollectionConfig {
        self.endpoint.config()
    }

    pub fn endpoint(&self) -> &CollectionEndpoint<R> {
        &self.endpoint
    }

    /// Filter text of the most recent fetch.
    pub fn filter_text(&self) -> Option<&str> {
        self.filter_text.as_deref()
    }

    pub fn status(&self) -> CollectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionStatus> {
        self.status.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.status.borrow().in_flight > 0
    }

    pub fn needs_refetch(&self) -> bool {
        self.status.borrow().needs_refetch
    }

    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// The next window to load under the current filter, or `None` once the
    /// server has reported the end. Restarts at offset 0 after `refresh`.
    pub fn next_fetch(&self, size: usize) -> Option<FetchRequest> {
        let mut request = if !self.fetched_once || self.needs_refetch() {
            FetchRequest::new(0, size)
        } else if self.has_more {
            FetchRequest::new(self.loaded, size)
        } else {
            return None;
        };
        request.filter_text = self.filter_text.clone();
        Some(request)
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Start a fetch. The returned ticket's request must be executed by the
    /// host and handed back to `complete_fetch` (or `cancel_fetch`).
    pub fn begin_fetch(&mut self, request: FetchRequest) -> Result<PendingFetch, ApiError> {
        let http = self.endpoint.build_fetch(&request)?;
        let filter_text = request.filter().map(str::to_string);
        if filter_text != self.filter_text {
            self.reset_window();
            self.filter_text = filter_text;
        }
        self.status.send_modify(|s| s.in_flight += 1);
        debug!(
            generation = self.generation,
            offset = request.offset,
            size = request.size,
            filter = ?self.filter_text,
            "begin fetch"
        );
        Ok(PendingFetch {
            generation: self.generation,
            epoch: self.epoch,
            request,
            http,
        })
    }

    /// Apply the response for `pending` and return the server page verbatim.
    ///
    /// A page at offset 0 replaces the loaded rows and reconciles the overlay.
    /// A later page is merged by key if it continues the loaded window. A page
    /// fetched under a filter other than the current one, or one that would
    /// leave a gap, is returned but not merged.
    pub fn complete_fetch(&mut self, pending: PendingFetch, response: HttpResponse) -> Result<Page<R>, ApiError> {
        self.check_generation(&pending)?;
        self.status.send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));

        let page = self.endpoint.parse_fetch(response)?;
        if pending.request.filter() != self.filter_text.as_deref() {
            debug!(
                generation = self.generation,
                offset = pending.request.offset,
                "page belongs to a previous filter, not merged"
            );
            return Ok(page);
        }

        let offset = pending.request.offset;
        if offset > 0 && (!self.fetched_once || offset > self.loaded) {
            debug!(
                generation = self.generation,
                offset,
                loaded = self.loaded,
                "page does not continue the loaded window, not merged"
            );
            return Ok(page);
        }

        let reconciled = offset == 0 && self.refreshed_at <= pending.epoch;
        if offset == 0 {
            self.rows.clear();
            self.overlay.retain(|_, entry| entry.epoch > pending.epoch);
            self.loaded = 0;
        }
        for record in &page.data {
            if let Some(key) = self.endpoint.key_of(record) {
                self.rows.insert(key, record.clone());
            }
        }
        self.loaded = self.loaded.max(offset + page.data.len());
        self.total_size = page.total_size;
        self.has_more = page.has_more;
        self.fetched_once = true;

        self.status.send_modify(|s| {
            s.revision += 1;
            if reconciled {
                s.needs_refetch = false;
            }
        });
        Ok(page)
    }

    /// Give up on `pending` without applying anything, e.g. after the
    /// transport failed.
    pub fn cancel_fetch(&mut self, pending: PendingFetch) -> Result<(), ApiError> {
        self.check_generation(&pending)?;
        self.status.send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
        Ok(())
    }

    /// Fetch one page through `transport`.
    pub fn fetch_page<T: Transport>(&mut self, transport: &T, request: FetchRequest) -> Result<Page<R>, ApiError> {
        let pending = self.begin_fetch(request)?;
        match transport.execute(pending.http.clone()) {
            Ok(response) => self.complete_fetch(pending, response),
            Err(err) => {
                self.cancel_fetch(pending)?;
                Err(err)
            }
        }
    }

    /// Forget the loaded window of the previous filter. The overlay stays.
    fn reset_window(&mut self) {
        debug!(generation = self.generation, filter = ?self.filter_text, "filter changed, resetting window");
        self.rows.clear();
        self.loaded = 0;
        self.total_size = -1;
        self.has_more = false;
        self.fetched_once = false;
        self.status.send_modify(|s| s.revision += 1);
    }

    fn check_generation(&self, pending: &PendingFetch) -> Result<(), ApiError> {
        if pending.generation == self.generation {
            return Ok(());
        }
        Err(ApiError::StaleResponse {
            expected: self.generation,
            received: pending.generation,
        })
    }

    // ── Local reads ──────────────────────────────────────────────────

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        match self.overlay.get(key).map(|entry| &entry.change) {
            Some(Change::Upsert(record)) => Some(record),
            Some(Change::Removed) => None,
            None => self.rows.get(key),
        }
    }

    pub fn contains_key(&self, key: &R::Key) -> bool {
        self.get(key).is_some()
    }

    /// Loaded rows in server order with the overlay applied; records added
    /// locally follow at the end in the order they were added.
    pub fn rows(&self) -> Vec<&R> {
        let loaded = self.rows.keys().filter_map(|key| self.get(key));
        let added = self.overlay.iter().filter_map(|(key, entry)| match &entry.change {
            Change::Upsert(record) if !self.rows.contains_key(key) => Some(record),
            _ => None,
        });
        loaded.chain(added).collect()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Apply `op` to the overlay. Preconditions are checked for every record
    /// first; on failure nothing changes.
    pub fn mutate(&mut self, op: Mutation<R>) -> Result<(), MutationError> {
        let keys = op.keys();
        if keys.is_empty() {
            return Err(MutationError::Empty);
        }

        let epoch = self.epoch + 1;
        match op {
            Mutation::Add { data, metadata } => {
                check_metadata(&data, &metadata, self.config().key_field())?;
                let mut batch = std::collections::HashSet::with_capacity(keys.len());
                for key in &keys {
                    if self.contains_key(key) || !batch.insert(key) {
                        return Err(MutationError::DuplicateKey(key.to_string()));
                    }
                }
                self.upsert_all(data, metadata, epoch);
            }
            Mutation::Update { data, metadata } => {
                check_metadata(&data, &metadata, self.config().key_field())?;
                self.require_visible(&keys)?;
                self.upsert_all(data, metadata, epoch);
            }
            Mutation::Remove { .. } => {
                self.require_visible(&keys)?;
                for key in keys.iter().cloned() {
                    if self.rows.contains_key(&key) {
                        let entry = OverlayEntry {
                            epoch,
                            change: Change::Removed,
                        };
                        self.overlay.insert(key, entry);
                    } else {
                        self.overlay.shift_remove(&key);
                    }
                }
            }
        }

        self.epoch = epoch;
        debug!(generation = self.generation, keys = ?keys, "applied mutation");
        self.status.send_modify(|s| s.revision += 1);
        Ok(())
    }

    /// Mark the view for re-fetching from offset 0 under the current filter.
    /// Does not fetch.
    pub fn refresh(&mut self) {
        debug!(generation = self.generation, "refresh requested");
        self.epoch += 1;
        self.refreshed_at = self.epoch;
        self.status.send_modify(|s| {
            s.revision += 1;
            s.needs_refetch = true;
        });
    }

    /// Steps two and three of write-then-sync: mutate the overlay, then
    /// refresh. The refresh happens even if the mutation is rejected, so the
    /// next fetch re-derives the view from the server either way.
    pub fn apply_write(&mut self, op: Mutation<R>) -> Result<(), MutationError> {
        let result = self.mutate(op);
        self.refresh();
        result
    }

    fn upsert_all(&mut self, data: Vec<R>, metadata: Vec<ItemMetadata<R::Key>>, epoch: u64) {
        for (record, meta) in data.into_iter().zip(metadata) {
            let entry = OverlayEntry {
                epoch,
                change: Change::Upsert(record),
            };
            self.overlay.insert(meta.key, entry);
        }
    }

    fn require_visible(&self, keys: &[R::Key]) -> Result<(), MutationError> {
        match keys.iter().find(|key| !self.contains_key(key)) {
            Some(key) => Err(MutationError::UnknownKey(key.to_string())),
            None => Ok(()),
        }
    }

    // ── Write-then-sync ──────────────────────────────────────────────

    /// POST `body`, then add the server's record locally and refresh.
    pub fn create<T: Transport, B: Serialize>(&mut self, transport: &T, body: &B) -> Result<R, ApiError> {
        let request = self.endpoint.build_create(body)?;
        let created = transport
            .execute(request)
            .and_then(|response| self.endpoint.parse_create(response))
            .inspect_err(|err| warn!(generation = self.generation, error = %err, "create failed"))?;
        let op = Mutation::add(vec![created.clone()], self.config().key_field());
        self.sync_write(op);
        Ok(created)
    }

    /// PUT `body` at `key`, then replace the local record and refresh.
    pub fn update<T: Transport, B: Serialize>(&mut self, transport: &T, key: &R::Key, body: &B) -> Result<R, ApiError> {
        let request = self.endpoint.build_update(key, body)?;
        let updated = transport
            .execute(request)
            .and_then(|response| self.endpoint.parse_update(response))
            .inspect_err(|err| warn!(generation = self.generation, key = %key, error = %err, "update failed"))?;

        let returned = self.endpoint.key_of(&updated);
        if returned.as_ref() != Some(key) {
            // The PUT was accepted: the view is stale even though nothing is merged.
            self.refresh();
            let returned = returned.map_or_else(|| "none".to_string(), |k| k.to_string());
            warn!(generation = self.generation, key = %key, returned = %returned, "update returned a different record");
            return Err(ApiError::Deserialization {
                message: format!("updated record has key {returned}, expected {key}"),
                body: String::new(),
            });
        }
        let op = Mutation::update(vec![updated.clone()], self.config().key_field());
        self.sync_write(op);
        Ok(updated)
    }

    /// DELETE `key`; only a 200 response removes it locally.
    pub fn remove<T: Transport>(&mut self, transport: &T, key: &R::Key) -> Result<(), ApiError> {
        let request = self.endpoint.build_delete(key)?;
        transport
            .execute(request)
            .and_then(|response| self.endpoint.parse_delete(response))
            .inspect_err(|err| warn!(generation = self.generation, key = %key, error = %err, "delete failed"))?;
        self.sync_write(Ok(Mutation::remove(vec![key.clone()])));
        Ok(())
    }

    fn sync_write(&mut self, op: Result<Mutation<R>, MutationError>) {
        let result = match op {
            Ok(op) => self.apply_write(op),
            Err(err) => {
                self.refresh();
                Err(err)
            }
        };
        if let Err(err) = result {
            warn!(generation = self.generation, error = %err, "overlay out of step with write, waiting for refetch");
        }
    }
}

fn check_metadata<R: Record>(
    data: &[R],
    metadata: &[ItemMetadata<R::Key>],
    key_field: &str,
) -> Result<(), MutationError> {
    if data.len() != metadata.len() {
        return Err(MutationError::KeyMismatch);
    }
    if data
        .iter()
        .zip(metadata)
        .any(|(record, meta)| record.key(key_field).as_ref() != Some(&meta.key))
    {
        return Err(MutationError::KeyMismatch);
    }
    Ok(())
}
