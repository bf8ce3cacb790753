//! Explicit session state machine and the single-slot TTL cache that lets a
//! session re-enter a phase without re-fetching.
//!
//! `Session` is an immutable record: `advance` consumes the old record and
//! returns a new one with the transition appended. Illegal (phase, action)
//! pairs are rejected by name.

use std::time::{Duration, Instant};

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::market::{RecencyWindow, Region};
use crate::util::env::env_parse;

const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Start,
    Survey,
    Analyzing,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Begin,
    Submit,
    Complete,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
}

/// Filter parameters whose equality defines cache compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterParams {
    pub region: Region,
    pub window: RecencyWindow,
    pub top_n: usize,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub phase: Phase,
    pub filters: FilterParams,
    pub transitions: Vec<Transition>,
}

impl Session {
    pub fn new(filters: FilterParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Start,
            filters,
            transitions: Vec::new(),
        }
    }

    /// Applies `action`, returning the successor record. Reset is legal from
    /// every phase; everything else only from its designated predecessor.
    pub fn advance(self, action: Action) -> anyhow::Result<Session> {
        let to = match (self.phase, action) {
            (_, Action::Reset) => Phase::Start,
            (Phase::Start, Action::Begin) => Phase::Survey,
            (Phase::Survey, Action::Submit) => Phase::Analyzing,
            (Phase::Analyzing, Action::Complete) => Phase::Result,
            (phase, action) => bail!("action {action:?} is not legal in phase {phase:?}"),
        };
        let mut transitions = self.transitions;
        transitions.push(Transition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        Ok(Session {
            id: self.id,
            phase: to,
            filters: self.filters,
            transitions,
        })
    }
}

struct CacheSlot<T> {
    payload: T,
    fetched_at: Instant,
    params: FilterParams,
}

/// Single-slot cache: a fresh entry is served only to callers holding equal
/// filter params. Stale or foreign-filter entries are never served. The
/// cache lives outside the `Session` record and survives `Reset`.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Option<CacheSlot<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    /// TTL from `CACHE_TTL_SECS`, default one hour.
    pub fn from_env() -> Self {
        Self::new(Duration::from_secs(env_parse(
            "CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )))
    }

    pub fn get(&self, params: &FilterParams) -> Option<T> {
        let slot = self.slot.as_ref()?;
        if slot.params == *params && slot.fetched_at.elapsed() < self.ttl {
            Some(slot.payload.clone())
        } else {
            None
        }
    }

    pub fn put(&mut self, params: FilterParams, payload: T) {
        self.put_at(params, payload, Instant::now());
    }

    fn put_at(&mut self, params: FilterParams, payload: T, fetched_at: Instant) {
        self.slot = Some(CacheSlot {
            payload,
            fetched_at,
            params,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> FilterParams {
        FilterParams {
            region: Region::Kr,
            window: RecencyWindow {
                year_min: 2023,
                year_max: 2026,
            },
            top_n: 50,
            sample_size: 100,
        }
    }

    #[test]
    fn legal_chain_reaches_result() {
        let s = Session::new(filters());
        let id = s.id;
        let s = s.advance(Action::Begin).unwrap();
        let s = s.advance(Action::Submit).unwrap();
        let s = s.advance(Action::Complete).unwrap();
        assert_eq!(s.phase, Phase::Result);
        assert_eq!(s.id, id);
        assert_eq!(s.transitions.len(), 3);
    }

    #[test]
    fn reset_is_legal_from_every_phase() {
        for reachable in [
            Session::new(filters()),
            Session::new(filters()).advance(Action::Begin).unwrap(),
            Session::new(filters())
                .advance(Action::Begin)
                .unwrap()
                .advance(Action::Submit)
                .unwrap(),
        ] {
            let s = reachable.advance(Action::Reset).unwrap();
            assert_eq!(s.phase, Phase::Start);
        }
    }

    #[test]
    fn illegal_pairs_are_rejected_by_name() {
        let err = Session::new(filters())
            .advance(Action::Complete)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Complete"), "{msg}");
        assert!(msg.contains("Start"), "{msg}");
    }

    #[test]
    fn transitions_record_from_and_to() {
        let s = Session::new(filters()).advance(Action::Begin).unwrap();
        let t = &s.transitions[0];
        assert_eq!(t.from, Phase::Start);
        assert_eq!(t.to, Phase::Survey);
    }

    #[test]
    fn cache_serves_fresh_matching_entry() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.put(filters(), 42u32);
        assert_eq!(cache.get(&filters()), Some(42));
    }

    #[test]
    fn cache_misses_on_stale_entry() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let stale = Instant::now() - Duration::from_secs(120);
        cache.put_at(filters(), 42u32, stale);
        assert_eq!(cache.get(&filters()), None);
    }

    #[test]
    fn cache_misses_on_foreign_filters() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.put(filters(), 42u32);
        let mut other = filters();
        other.top_n = 10;
        assert_eq!(cache.get(&other), None);
    }
}
