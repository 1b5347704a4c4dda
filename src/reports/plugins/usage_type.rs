use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use super::usages_and_costs;
use crate::db::PricingStore;
use crate::error::AppResult;
use crate::models::UsageType;
use crate::reports::registry::{UsagePlugin, UsageQuery};
use crate::reports::schema::{FieldRule, Schema};
use crate::reports::value::{UsageData, UsageValue};

/// key: usage-type-plugin -> count + cost columns of one usage type
///
/// Used for every reportable usage type that has no dedicated plugin. Types priced per
/// warehouse get one count and one cost column per warehouse and a summed total cost.
pub struct UsageTypePlugin {
    usage_type: UsageType,
}

impl UsageTypePlugin {
    pub fn new(usage_type: UsageType) -> Self {
        Self { usage_type }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.usage_type.symbol)
    }
}

#[async_trait]
impl UsagePlugin for UsageTypePlugin {
    async fn schema(&self, store: &dyn PricingStore) -> AppResult<Schema> {
        let name = &self.usage_type.name;
        if !self.usage_type.by_warehouse {
            return Ok(Schema::new()
                .field(self.key("count"), FieldRule::new(format!("{name} count")))
                .field(
                    self.key("cost"),
                    FieldRule::new(format!("{name} cost")).currency().total_cost(),
                ));
        }

        let warehouses = store.warehouses().await?;
        let mut schema = Schema::new();
        for warehouse in &warehouses {
            schema.insert(
                self.key(&format!("count_warehouse_{}", warehouse.id)),
                FieldRule::new(format!("{name} count ({})", warehouse.name)),
            );
        }
        for warehouse in &warehouses {
            schema.insert(
                self.key(&format!("cost_warehouse_{}", warehouse.id)),
                FieldRule::new(format!("{name} cost ({})", warehouse.name)).currency(),
            );
        }
        schema.insert(
            self.key("cost_total"),
            FieldRule::new(format!("{name} total cost"))
                .currency()
                .total_cost(),
        );
        Ok(schema)
    }

    async fn usages(&self, store: &dyn PricingStore, query: &UsageQuery) -> AppResult<UsageData> {
        debug!(usage_type = %self.usage_type.symbol, "get usage type usages");
        let mut data = UsageData::new();

        if !self.usage_type.by_warehouse {
            let usages = usages_and_costs(store, query, &self.usage_type, None).await?;
            for (venture_id, usage) in usages {
                let fields = data.entry(venture_id).or_default();
                fields.insert(self.key("count"), UsageValue::Numeric(usage.value));
                fields.insert(self.key("cost"), usage.cost);
            }
            return Ok(data);
        }

        let total_key = self.key("cost_total");
        for warehouse in store.warehouses().await? {
            let costs =
                usages_and_costs(store, query, &self.usage_type, Some(warehouse.id)).await?;
            for (venture_id, usage) in costs {
                let fields = data.entry(venture_id).or_default();
                fields.insert(
                    self.key(&format!("count_warehouse_{}", warehouse.id)),
                    UsageValue::Numeric(usage.value),
                );
                let total = fields
                    .get(&total_key)
                    .and_then(UsageValue::as_decimal)
                    .unwrap_or(Decimal::ZERO);
                let cost = usage.cost.as_decimal().unwrap_or(Decimal::ZERO);
                fields.insert(total_key.clone(), UsageValue::Numeric(total + cost));
                fields.insert(
                    self.key(&format!("cost_warehouse_{}", warehouse.id)),
                    usage.cost,
                );
            }
        }
        Ok(data)
    }
}
