//! Query cache with generation-checked writes
//!
//! Entries are grouped by [`QueryKey`]. Listings are further told apart by
//! the filter and page they were fetched with, so each [`QueryId`] holds
//! exactly the response to that query.
//!
//! Every key carries a generation that is bumped on invalidation, and every
//! fetch is numbered when it starts. A result is stored only if its key was
//! not invalidated since the fetch began and no later-started fetch of the
//! same query has already stored a value. A response overtaken by a mutation
//! or by a newer fetch is returned to its caller but never written over
//! newer state.

use crate::access::RequestFilter;
use crate::models::{
    AttachmentDto, PageRequest, RequestDto, RequestMessage, RequestStatus, StatusCounts,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClientError, Page};
use crate::lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    AllRequests,
    MyRequests,
    Request(i64),
    Messages(i64),
    Attachments(i64),
    Stats,
}

/// One cached query: its key plus, for listings, the encoded filter and page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId {
    key: QueryKey,
    params: String,
}

impl QueryId {
    pub fn listing(key: QueryKey, filter: &RequestFilter, page: &PageRequest) -> Self {
        let params = format!(
            "{}&{}",
            serde_urlencoded::to_string(filter).unwrap_or_default(),
            serde_urlencoded::to_string(page).unwrap_or_default()
        );
        Self { key, params }
    }

    pub fn key(&self) -> QueryKey {
        self.key
    }
}

impl From<QueryKey> for QueryId {
    fn from(key: QueryKey) -> Self {
        Self {
            key,
            params: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cached {
    Requests(Page<RequestDto>),
    Request(RequestDto),
    Messages(Vec<RequestMessage>),
    Attachments(Vec<AttachmentDto>),
    Stats(StatusCounts),
}

impl Cached {
    /// Apply a status change to request `id` wherever it appears
    pub fn apply_status(&mut self, id: i64, status: RequestStatus, now: DateTime<Utc>) {
        let update = |request: &mut RequestDto| {
            if request.id == id {
                request.resolved_date =
                    lifecycle::resolved_date_after(request.status, request.resolved_date, status, now);
                request.status = status;
            }
        };
        match self {
            Cached::Requests(page) => page.items.iter_mut().for_each(update),
            Cached::Request(request) => update(request),
            _ => {}
        }
    }

    /// Drop request `id` from a listing
    pub fn remove_request(&mut self, id: i64) {
        if let Cached::Requests(page) = self {
            let before = page.items.len();
            page.items.retain(|r| r.id != id);
            if page.items.len() < before {
                page.total = (page.total - 1).max(0);
            }
        }
    }
}

macro_rules! cached_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Cached {
            fn from(value: $ty) -> Self {
                Cached::$variant(value)
            }
        }
    };
}

cached_from!(Requests, Page<RequestDto>);
cached_from!(Request, RequestDto);
cached_from!(Messages, Vec<RequestMessage>);
cached_from!(Attachments, Vec<AttachmentDto>);
cached_from!(Stats, StatusCounts);

#[derive(Debug, Clone)]
struct Entry {
    started: u64,
    value: Cached,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    started: u64,
    entries: HashMap<String, Entry>,
}

/// Issued when a fetch starts; redeemed when its result arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    id: QueryId,
    generation: u64,
    started: u64,
}

type Snapshot = Vec<(QueryKey, u64, HashMap<String, Entry>)>;

/// Shared cache handle. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    slots: Arc<Mutex<HashMap<QueryKey, Slot>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, id: impl Into<QueryId>) -> Option<Cached> {
        let id = id.into();
        self.slots()
            .get(&id.key)
            .and_then(|slot| slot.entries.get(&id.params))
            .map(|entry| entry.value.clone())
    }

    pub fn generation(&self, key: QueryKey) -> u64 {
        self.slots().get(&key).map_or(0, |slot| slot.generation)
    }

    pub fn begin_fetch(&self, id: impl Into<QueryId>) -> FetchTicket {
        let id = id.into();
        let mut slots = self.slots();
        let slot = slots.entry(id.key).or_default();
        slot.started += 1;
        FetchTicket {
            generation: slot.generation,
            started: slot.started,
            id,
        }
    }

    /// Store a fetch result unless its key was invalidated after the fetch
    /// began or a later fetch of the same query already stored its result.
    /// Returns whether the value was stored.
    pub fn complete_fetch(&self, ticket: FetchTicket, value: Cached) -> bool {
        let mut slots = self.slots();
        let slot = slots.entry(ticket.id.key).or_default();
        if slot.generation != ticket.generation {
            return false;
        }
        if slot
            .entries
            .get(&ticket.id.params)
            .is_some_and(|entry| entry.started > ticket.started)
        {
            return false;
        }
        slot.entries.insert(
            ticket.id.params,
            Entry {
                started: ticket.started,
                value,
            },
        );
        true
    }

    /// Edit every cached value under `key` in place
    pub fn patch(&self, key: QueryKey, mut edit: impl FnMut(&mut Cached)) {
        if let Some(slot) = self.slots().get_mut(&key) {
            slot.entries.values_mut().for_each(|entry| edit(&mut entry.value));
        }
    }

    /// Drop every value under `key`, listings of all filters included
    pub fn invalidate(&self, key: QueryKey) {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        slot.generation += 1;
        slot.entries.clear();
    }

    fn snapshot(&self) -> Snapshot {
        self.slots()
            .iter()
            .map(|(key, slot)| (*key, slot.generation, slot.entries.clone()))
            .collect()
    }

    /// Put back snapshotted values nobody has refreshed since
    fn restore(&self, snapshot: Snapshot) {
        let mut slots = self.slots();
        for (key, generation, entries) in snapshot {
            let Some(slot) = slots.get_mut(&key) else {
                continue;
            };
            if slot.generation != generation {
                continue;
            }
            for (params, saved) in entries {
                if let Some(current) = slot.entries.get_mut(&params) {
                    if current.started == saved.started {
                        *current = saved;
                    }
                }
            }
        }
    }

    /// Run `fetch` and cache its result under `id`, subject to the checks
    /// of [`QueryCache::complete_fetch`]
    pub async fn fetch<T, F>(&self, id: impl Into<QueryId>, fetch: F) -> Result<T, ClientError>
    where
        T: Clone + Into<Cached>,
        F: Future<Output = Result<T, ClientError>>,
    {
        let ticket = self.begin_fetch(id);
        let value = fetch.await?;
        let id = ticket.id.clone();
        if !self.complete_fetch(ticket, value.clone().into()) {
            tracing::debug!("Discarding superseded response for {:?}", id);
        }
        Ok(value)
    }

    /// The single write path: apply `optimistic` locally, await `call`, roll
    /// the local edit back if the call fails, then invalidate `affected`
    /// whatever the outcome. The next fetch of those keys is authoritative.
    pub async fn mutate<T, P, F>(
        &self,
        optimistic: P,
        call: F,
        affected: &[QueryKey],
    ) -> Result<T, ClientError>
    where
        P: FnOnce(&QueryCache),
        F: Future<Output = Result<T, ClientError>>,
    {
        let snapshot = self.snapshot();
        optimistic(self);

        let result = call.await;
        if let Err(e) = &result {
            tracing::warn!("Mutation failed, rolling back local changes: {}", e);
            self.restore(snapshot);
        }

        for key in affected {
            self.invalidate(*key);
        }
        result
    }
}
