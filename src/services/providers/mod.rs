//! Historical sighting sources
//!
//! The recommenders only see the `SightingStore` trait, so the eBird API, a local
//! copy of the eBird Basic Dataset and in-memory fixtures are interchangeable.
//! `ObserverHistory` is the per-observer view used to build evaluation cases, and
//! `TaxonomySource` resolves the names found in eBird's own exports.
use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::{
    error::AppResult,
    models::{Checklist, HotspotId, ObserverRecord, Species},
};

pub mod ebird_api;
pub mod memory;
pub mod postgres;

pub use ebird_api::EbirdApiStore;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Source of historical checklists
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SightingStore: Send + Sync {
    /// Fetch every checklist submitted at any of `hotspots` on any of `dates`
    ///
    /// A hotspot/date pair without data contributes nothing; that is not an error.
    async fn fetch_checklists(
        &self,
        hotspots: &BTreeSet<HotspotId>,
        dates: &BTreeSet<NaiveDate>,
    ) -> AppResult<Vec<Checklist>>;

    /// Store name for logging and error messages
    fn name(&self) -> &'static str;
}

/// Source of the observations made by individual observers
#[async_trait::async_trait]
pub trait ObserverHistory: Send + Sync {
    /// Fetch all observations by `observer_ids` dated strictly before `until`
    async fn fetch_observer_records(
        &self,
        observer_ids: &[String],
        until: NaiveDate,
    ) -> AppResult<Vec<ObserverRecord>>;
}

/// Source of the species taxonomy
#[async_trait::async_trait]
pub trait TaxonomySource: Send + Sync {
    /// Every species the source knows, with common and scientific names
    async fn fetch_species(&self) -> AppResult<Vec<Species>>;
}
