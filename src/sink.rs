//! Upsert sink: the external datastore collaborator.
//!
//! Deliberately out of scope per spec (§1/§6): the core only depends on this
//! narrow batch-upsert trait, the same way the teacher treats
//! `ProgressReporter` as a trait it owns the shape of but not every
//! implementation of. Production wiring is left to the caller (e.g. a
//! Supabase REST client); tests substitute an in-memory fake.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ScrapeError;
use crate::types::{Class, Organization, Ref};

/// A location row as sent to the sink, paired with the organization ref it
/// belongs to.
#[derive(Debug, Clone)]
pub struct LocationRow {
    pub name: String,
    pub address: Option<String>,
    pub iana_timezone: String,
}

/// Narrow batch-upsert contract (spec §6). All three calls send every row in
/// one request; conflict policy is update-in-place on the unique key.
#[async_trait]
pub trait UpsertSink: Send + Sync {
    /// Keyed on `website_url`.
    async fn upsert_organization(&self, org: &Organization) -> Result<Ref, ScrapeError>;

    /// Keyed on `(org_ref, name)`. Returns a map from location name to ref.
    async fn upsert_locations(
        &self,
        org_ref: &Ref,
        locations: &[LocationRow],
    ) -> Result<HashMap<String, Ref>, ScrapeError>;

    /// Keyed on `(location_ref, start_instant, name)`. Returns the number of
    /// rows upserted.
    async fn upsert_classes(&self, classes: &[Class]) -> Result<usize, ScrapeError>;
}

/// An in-process fake sink for tests and dry runs: keyed maps mirroring the
/// sink's own idempotency keys, so repeated upserts are genuinely
/// idempotent rather than just returning a fixed count.
#[derive(Debug, Default)]
pub struct InMemorySink {
    orgs: parking_lot::Mutex<HashMap<String, Ref>>,
    locations: parking_lot::Mutex<HashMap<(Ref, String), Ref>>,
    classes: parking_lot::Mutex<HashMap<(Ref, DateTime<Utc>, String), Class>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl InMemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ref(&self) -> Ref {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("ref-{id}")
    }

    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.lock().len()
    }
}

#[async_trait]
impl UpsertSink for InMemorySink {
    async fn upsert_organization(&self, org: &Organization) -> Result<Ref, ScrapeError> {
        let mut orgs = self.orgs.lock();
        if let Some(existing) = orgs.get(&org.website_url) {
            return Ok(existing.clone());
        }
        let new_ref = self.next_ref();
        orgs.insert(org.website_url.clone(), new_ref.clone());
        Ok(new_ref)
    }

    async fn upsert_locations(
        &self,
        org_ref: &Ref,
        locations: &[LocationRow],
    ) -> Result<HashMap<String, Ref>, ScrapeError> {
        let mut table = self.locations.lock();
        let mut out = HashMap::with_capacity(locations.len());
        for loc in locations {
            let key = (org_ref.clone(), loc.name.clone());
            let loc_ref = table
                .entry(key)
                .or_insert_with(|| {
                    let id = self
                        .next_id
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    format!("ref-{id}")
                })
                .clone();
            out.insert(loc.name.clone(), loc_ref);
        }
        Ok(out)
    }

    async fn upsert_classes(&self, classes: &[Class]) -> Result<usize, ScrapeError> {
        let mut table = self.classes.lock();
        for class in classes {
            table.insert(class.idempotency_key(), class.clone());
        }
        Ok(classes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(location_ref: &str, name: &str, hour: u32) -> Class {
        use chrono::TimeZone;
        Class {
            location_ref: location_ref.to_string(),
            name: name.to_string(),
            start_instant_utc: Utc.with_ymd_and_hms(2026, 7, 27, hour, 0, 0).unwrap(),
            end_instant_utc: None,
            instructor: None,
            spots_total: None,
        }
    }

    #[tokio::test]
    async fn organization_upsert_is_idempotent_on_website_url() {
        let sink = InMemorySink::new();
        let org = Organization {
            name: "Gym".into(),
            website_url: "https://gym.test".into(),
        };
        let a = sink.upsert_organization(&org).await.unwrap();
        let b = sink.upsert_organization(&org).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn class_upsert_on_same_key_does_not_grow_count() {
        let sink = InMemorySink::new();
        let c = class("loc-1", "Yoga", 18);
        sink.upsert_classes(&[c.clone()]).await.unwrap();
        sink.upsert_classes(&[c]).await.unwrap();
        assert_eq!(sink.class_count(), 1);
    }

    #[tokio::test]
    async fn locations_keyed_by_org_and_name() {
        let sink = InMemorySink::new();
        let rows = vec![LocationRow {
            name: "Downtown".into(),
            address: None,
            iana_timezone: "UTC".into(),
        }];
        let map_a = sink.upsert_locations(&"org-1".to_string(), &rows).await.unwrap();
        let map_b = sink.upsert_locations(&"org-1".to_string(), &rows).await.unwrap();
        assert_eq!(map_a["Downtown"], map_b["Downtown"]);
    }
}
