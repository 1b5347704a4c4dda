use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{diff_owners, PricingStore, ServiceChange, ServiceUpdate, SyncStore, UsageFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    symbol_from_name, DailyDeprecation, DailyUsage, Owner, OwnershipType, ProfitCenter, Service,
    UsagePrice, UsageType, Venture, Warehouse,
};

#[derive(Debug, Default)]
struct Tables {
    ventures: Vec<Venture>,
    usage_types: Vec<UsageType>,
    warehouses: Vec<Warehouse>,
    daily_usages: Vec<DailyUsage>,
    prices: Vec<UsagePrice>,
    deprecation: Vec<DailyDeprecation>,
    profit_centers: Vec<ProfitCenter>,
    owners: Vec<Owner>,
    services: Vec<Service>,
    /// `(service_id, ownership type, owner cmdb id)`
    ownerships: Vec<(i32, OwnershipType, i32)>,
}

/// key: memory-store -> in-process pricing data
///
/// Same contract as [`super::PgStore`], kept in memory. Used for local runs without Postgres
/// and by the test suites.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_venture(&self, venture: Venture) {
        self.tables.write().await.ventures.push(venture);
    }

    pub async fn insert_usage_type(&self, usage_type: UsageType) {
        self.tables.write().await.usage_types.push(usage_type);
    }

    pub async fn insert_warehouse(&self, warehouse: Warehouse) {
        self.tables.write().await.warehouses.push(warehouse);
    }

    pub async fn insert_price(&self, price: UsagePrice) {
        self.tables.write().await.prices.push(price);
    }

    pub async fn insert_profit_center(&self, profit_center: ProfitCenter) {
        self.tables.write().await.profit_centers.push(profit_center);
    }

    pub async fn insert_owner(&self, owner: Owner) {
        self.tables.write().await.owners.push(owner);
    }

    pub async fn record_usage(
        &self,
        date: NaiveDate,
        usage_type_id: i32,
        venture_id: i32,
        warehouse_id: Option<i32>,
        value: Decimal,
    ) {
        let mut tables = self.tables.write().await;
        let id = tables.daily_usages.len() as i64 + 1;
        tables.daily_usages.push(DailyUsage {
            id,
            date,
            usage_type_id,
            venture_id,
            warehouse_id,
            value,
        });
    }

    pub async fn record_deprecation(
        &self,
        date: NaiveDate,
        venture_id: i32,
        asset_id: i32,
        cost: Decimal,
    ) {
        let mut tables = self.tables.write().await;
        let id = tables.deprecation.len() as i64 + 1;
        tables.deprecation.push(DailyDeprecation {
            id,
            date,
            venture_id,
            asset_id,
            cost,
        });
    }

    pub async fn all_daily_usages(&self) -> Vec<DailyUsage> {
        self.tables.read().await.daily_usages.clone()
    }

    pub async fn all_usage_types(&self) -> Vec<UsageType> {
        self.tables.read().await.usage_types.clone()
    }

    pub async fn services(&self) -> Vec<Service> {
        self.tables.read().await.services.clone()
    }

    /// CMDB ids of the owners of a service for one ownership type.
    pub async fn service_owners(&self, service_id: i32, kind: OwnershipType) -> BTreeSet<i32> {
        self.tables
            .read()
            .await
            .ownerships
            .iter()
            .filter(|(service, owner_kind, _)| *service == service_id && *owner_kind == kind)
            .map(|(_, _, cmdb_id)| *cmdb_id)
            .collect()
    }
}

fn sorted_by_name(mut ventures: Vec<Venture>) -> Vec<Venture> {
    ventures.sort_by_key(Venture::sort_key);
    ventures
}

#[async_trait]
impl PricingStore for MemoryStore {
    async fn list_ventures(&self, is_active: Option<bool>) -> AppResult<Vec<Venture>> {
        let tables = self.tables.read().await;
        let ventures = tables
            .ventures
            .iter()
            .filter(|venture| is_active.map_or(true, |flag| venture.is_active == flag))
            .cloned()
            .collect();
        Ok(sorted_by_name(ventures))
    }

    async fn venture_with_descendants(&self, venture_id: i32) -> AppResult<Vec<Venture>> {
        let tables = self.tables.read().await;
        let root = tables
            .ventures
            .iter()
            .find(|venture| venture.id == venture_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("venture", venture_id))?;

        let mut seen = HashSet::from([root.id]);
        let mut frontier = vec![root.id];
        let mut descendants = Vec::new();
        while let Some(parent) = frontier.pop() {
            for child in tables
                .ventures
                .iter()
                .filter(|venture| venture.parent_id == Some(parent))
            {
                if seen.insert(child.id) {
                    frontier.push(child.id);
                    descendants.push(child.clone());
                }
            }
        }

        let mut result = vec![root];
        result.extend(sorted_by_name(descendants));
        Ok(result)
    }

    async fn usage_types(&self) -> AppResult<Vec<UsageType>> {
        Ok(self.tables.read().await.usage_types.clone())
    }

    async fn usage_type_by_symbol(&self, symbol: &str) -> AppResult<Option<UsageType>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usage_types
            .iter()
            .find(|usage_type| usage_type.symbol == symbol)
            .cloned())
    }

    async fn warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let tables = self.tables.read().await;
        let mut warehouses: Vec<Warehouse> = tables
            .warehouses
            .iter()
            .filter(|warehouse| warehouse.show_in_report)
            .cloned()
            .collect();
        warehouses.sort_by_key(|warehouse| warehouse.id);
        Ok(warehouses)
    }

    async fn daily_usages(&self, filter: &UsageFilter<'_>) -> AppResult<Vec<DailyUsage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .daily_usages
            .iter()
            .filter(|usage| filter.matches(usage))
            .cloned()
            .collect())
    }

    async fn usage_prices(&self, usage_type_id: i32) -> AppResult<Vec<UsagePrice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prices
            .iter()
            .filter(|price| price.usage_type_id == usage_type_id)
            .cloned()
            .collect())
    }

    async fn daily_deprecation(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        venture_ids: &[i32],
    ) -> AppResult<Vec<DailyDeprecation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .deprecation
            .iter()
            .filter(|row| {
                start <= row.date && row.date <= end && venture_ids.contains(&row.venture_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn venture_by_symbol(&self, symbol: &str) -> AppResult<Option<Venture>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ventures
            .iter()
            .find(|venture| venture.symbol == symbol)
            .cloned())
    }

    async fn get_or_create_usage_type(&self, name: &str) -> AppResult<UsageType> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.usage_types.iter().find(|ut| ut.name == name) {
            return Ok(existing.clone());
        }
        let id = tables.usage_types.iter().map(|ut| ut.id).max().unwrap_or(0) + 1;
        let usage_type = UsageType::new(id, name, &symbol_from_name(name));
        tables.usage_types.push(usage_type.clone());
        Ok(usage_type)
    }

    async fn set_daily_usage(
        &self,
        date: NaiveDate,
        usage_type_id: i32,
        venture_id: i32,
        value: Decimal,
    ) -> AppResult<DailyUsage> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.daily_usages.iter_mut().find(|usage| {
            usage.date == date
                && usage.usage_type_id == usage_type_id
                && usage.venture_id == venture_id
                && usage.warehouse_id.is_none()
        }) {
            existing.value = value;
            return Ok(existing.clone());
        }
        let usage = DailyUsage {
            id: tables.daily_usages.len() as i64 + 1,
            date,
            usage_type_id,
            venture_id,
            warehouse_id: None,
            value,
        };
        tables.daily_usages.push(usage.clone());
        Ok(usage)
    }

    async fn profit_center(&self, id: i32) -> AppResult<Option<ProfitCenter>> {
        let tables = self.tables.read().await;
        Ok(tables.profit_centers.iter().find(|pc| pc.id == id).cloned())
    }

    async fn profit_center_by_ci_uid(&self, ci_uid: &str) -> AppResult<Option<ProfitCenter>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profit_centers
            .iter()
            .find(|pc| pc.ci_uid == ci_uid)
            .cloned())
    }

    async fn apply_service_update(&self, update: &ServiceUpdate) -> AppResult<ServiceChange> {
        // One write guard for the whole update keeps it all-or-nothing for readers.
        let mut tables = self.tables.write().await;
        let (service, created) = match tables
            .services
            .iter_mut()
            .find(|service| service.ci_uid == update.ci_uid)
        {
            Some(existing) => {
                existing.name = update.name.clone();
                existing.profit_center_id = update.profit_center_id;
                (existing.clone(), false)
            }
            None => {
                let service = Service {
                    id: tables.services.iter().map(|s| s.id).max().unwrap_or(0) + 1,
                    ci_uid: update.ci_uid.clone(),
                    name: update.name.clone(),
                    profit_center_id: update.profit_center_id,
                };
                tables.services.push(service.clone());
                (service, true)
            }
        };

        let known_owners: HashSet<i32> = tables.owners.iter().map(|owner| owner.cmdb_id).collect();
        let mut owners_added = 0;
        let mut owners_removed = 0;
        for (kind, current) in &update.owners {
            let previous: BTreeSet<i32> = tables
                .ownerships
                .iter()
                .filter(|(service_id, owner_kind, _)| {
                    *service_id == service.id && owner_kind == kind
                })
                .map(|(_, _, cmdb_id)| *cmdb_id)
                .collect();
            let (to_add, to_delete) = diff_owners(&previous, current);

            let before = tables.ownerships.len();
            tables.ownerships.retain(|(service_id, owner_kind, cmdb_id)| {
                !(*service_id == service.id && owner_kind == kind && to_delete.contains(cmdb_id))
            });
            owners_removed += before - tables.ownerships.len();

            for cmdb_id in to_add.into_iter().filter(|id| known_owners.contains(id)) {
                tables.ownerships.push((service.id, *kind, cmdb_id));
                owners_added += 1;
            }
        }

        Ok(ServiceChange {
            service,
            created,
            owners_added,
            owners_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn descendants_include_inactive_children() {
        let store = MemoryStore::new();
        store.insert_venture(Venture::new(1, "b", true)).await;
        store
            .insert_venture(Venture::new(2, "bb", false).with_parent(1))
            .await;
        store
            .insert_venture(Venture::new(4, "bbb", false).with_parent(2))
            .await;
        store.insert_venture(Venture::new(3, "a", true)).await;

        let ids: Vec<i32> = store
            .venture_with_descendants(1)
            .await
            .unwrap()
            .iter()
            .map(|venture| venture.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn unknown_root_venture_is_reported() {
        let store = MemoryStore::new();
        let err = store.venture_with_descendants(9).await.unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound { kind: "venture", .. }));
    }

    #[tokio::test]
    async fn set_daily_usage_replaces_previous_value() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2013, 4, 20).unwrap();
        store.set_daily_usage(date, 1, 1, Decimal::ONE).await.unwrap();
        store.set_daily_usage(date, 1, 1, Decimal::TEN).await.unwrap();

        let usages = store.all_daily_usages().await;
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].value, Decimal::TEN);
    }
}
