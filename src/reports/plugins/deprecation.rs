use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::db::PricingStore;
use crate::error::AppResult;
use crate::reports::registry::{UsagePlugin, UsageQuery};
use crate::reports::schema::{FieldRule, Schema};
use crate::reports::value::{FieldValues, UsageData, UsageValue};

/// Number of deprecated assets and their deprecation cost per venture.
pub struct DeprecationPlugin;

#[async_trait]
impl UsagePlugin for DeprecationPlugin {
    async fn schema(&self, _store: &dyn PricingStore) -> AppResult<Schema> {
        Ok(Schema::new()
            .field("assets_count", FieldRule::new("Assets count"))
            .field(
                "assets_cost",
                FieldRule::new("Assets cost").currency().total_cost(),
            ))
    }

    async fn usages(&self, store: &dyn PricingStore, query: &UsageQuery) -> AppResult<UsageData> {
        debug!("get deprecation usage");
        let rows = store
            .daily_deprecation(query.start, query.end, &query.venture_ids())
            .await?;

        let mut per_venture: HashMap<i32, (HashSet<i32>, Decimal)> = HashMap::new();
        for row in rows {
            let (assets, cost) = per_venture.entry(row.venture_id).or_default();
            assets.insert(row.asset_id);
            *cost += row.cost;
        }

        Ok(per_venture
            .into_iter()
            .map(|(venture_id, (assets, cost))| {
                let fields = FieldValues::from([
                    ("assets_count".to_string(), UsageValue::from(assets.len())),
                    ("assets_cost".to_string(), UsageValue::Numeric(cost)),
                ]);
                (venture_id, fields)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::Venture;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn counts_distinct_assets_and_sums_cost() {
        let store = MemoryStore::new();
        let day = |d| NaiveDate::from_ymd_opt(2013, 4, d).unwrap();
        store.record_deprecation(day(20), 1, 10, dec!(1.5)).await;
        store.record_deprecation(day(21), 1, 10, dec!(1.5)).await;
        store.record_deprecation(day(21), 1, 11, dec!(2)).await;
        store.record_deprecation(day(19), 1, 12, dec!(100)).await;

        let query = UsageQuery {
            start: day(20),
            end: day(30),
            ventures: vec![Venture::new(1, "b", true), Venture::new(3, "a", true)],
            forecast: false,
        };
        let data = DeprecationPlugin.usages(&store, &query).await.unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(data[&1]["assets_count"], UsageValue::from(2));
        assert_eq!(data[&1]["assets_cost"], UsageValue::Numeric(dec!(5)));
    }
}
