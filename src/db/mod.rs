//! Data access handles passed explicitly into reports and sync jobs.
//!
//! Reports only ever see [`PricingStore`], which has no write methods. Sync jobs use
//! [`SyncStore`]. Both are implemented by [`PgStore`] and by the in-process [`MemoryStore`].

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::AppResult;
use crate::models::{
    DailyDeprecation, DailyUsage, OwnershipType, ProfitCenter, Service, UsagePrice, UsageType,
    Venture, Warehouse,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Selects daily usages of one usage type inside an inclusive date range.
#[derive(Debug, Clone)]
pub struct UsageFilter<'a> {
    pub usage_type_id: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub venture_ids: &'a [i32],
    /// `Some` restricts rows to one warehouse, `None` keeps every row.
    pub warehouse_id: Option<i32>,
}

impl UsageFilter<'_> {
    pub fn matches(&self, usage: &DailyUsage) -> bool {
        usage.usage_type_id == self.usage_type_id
            && self.start <= usage.date
            && usage.date <= self.end
            && self.venture_ids.contains(&usage.venture_id)
            && (self.warehouse_id.is_none() || usage.warehouse_id == self.warehouse_id)
    }
}

/// key: pricing-store -> read-only report data
#[async_trait]
pub trait PricingStore: Send + Sync {
    /// Ventures ordered by case-folded name. `Some(flag)` filters on `is_active`, `None` lists
    /// every venture.
    async fn list_ventures(&self, is_active: Option<bool>) -> AppResult<Vec<Venture>>;

    /// The venture followed by all of its descendants, whatever their own `is_active` flag.
    async fn venture_with_descendants(&self, venture_id: i32) -> AppResult<Vec<Venture>>;

    async fn usage_types(&self) -> AppResult<Vec<UsageType>>;

    async fn usage_type_by_symbol(&self, symbol: &str) -> AppResult<Option<UsageType>>;

    /// Warehouses flagged `show_in_report`, ordered by id.
    async fn warehouses(&self) -> AppResult<Vec<Warehouse>>;

    async fn daily_usages(&self, filter: &UsageFilter<'_>) -> AppResult<Vec<DailyUsage>>;

    async fn usage_prices(&self, usage_type_id: i32) -> AppResult<Vec<UsagePrice>>;

    async fn daily_deprecation(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        venture_ids: &[i32],
    ) -> AppResult<Vec<DailyDeprecation>>;
}

/// Desired state of one CMDB service. Owners are CMDB ids; ids without a local owner record are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub ci_uid: String,
    pub name: String,
    pub profit_center_id: i32,
    pub owners: Vec<(OwnershipType, BTreeSet<i32>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceChange {
    pub service: Service,
    pub created: bool,
    pub owners_added: usize,
    pub owners_removed: usize,
}

/// key: sync-store -> idempotent upserts for sync jobs
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn venture_by_symbol(&self, symbol: &str) -> AppResult<Option<Venture>>;

    async fn get_or_create_usage_type(&self, name: &str) -> AppResult<UsageType>;

    /// Upserts the usage of a venture on one day; the stored value is replaced.
    async fn set_daily_usage(
        &self,
        date: NaiveDate,
        usage_type_id: i32,
        venture_id: i32,
        value: Decimal,
    ) -> AppResult<DailyUsage>;

    async fn profit_center(&self, id: i32) -> AppResult<Option<ProfitCenter>>;

    async fn profit_center_by_ci_uid(&self, ci_uid: &str) -> AppResult<Option<ProfitCenter>>;

    /// Creates or updates the service and reconciles its owners. Applied all-or-nothing.
    async fn apply_service_update(&self, update: &ServiceUpdate) -> AppResult<ServiceChange>;
}

/// Splits an ownership change into `(to_add, to_delete)`, both sorted.
pub fn diff_owners(previous: &BTreeSet<i32>, current: &BTreeSet<i32>) -> (Vec<i32>, Vec<i32>) {
    let to_add = current.difference(previous).copied().collect();
    let to_delete = previous.difference(current).copied().collect();
    (to_add, to_delete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_owners_splits_added_and_removed() {
        let previous = BTreeSet::from([1, 2, 3]);
        let current = BTreeSet::from([3, 4]);
        let (to_add, to_delete) = diff_owners(&previous, &current);
        assert_eq!(to_add, vec![4]);
        assert_eq!(to_delete, vec![1, 2]);
    }

    #[test]
    fn usage_filter_honours_range_and_warehouse() {
        let date = NaiveDate::from_ymd_opt(2013, 4, 25).unwrap();
        let usage = DailyUsage {
            id: 1,
            date,
            usage_type_id: 7,
            venture_id: 3,
            warehouse_id: Some(2),
            value: Decimal::ONE,
        };
        let ventures = [3];
        let mut filter = UsageFilter {
            usage_type_id: 7,
            start: date,
            end: date,
            venture_ids: &ventures,
            warehouse_id: None,
        };
        assert!(filter.matches(&usage));
        filter.warehouse_id = Some(1);
        assert!(!filter.matches(&usage));
        filter.warehouse_id = Some(2);
        filter.start = date.succ_opt().unwrap();
        filter.end = filter.start;
        assert!(!filter.matches(&usage));
    }
}
