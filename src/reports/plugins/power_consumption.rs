use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use super::usages_and_costs;
use crate::db::PricingStore;
use crate::error::{AppError, AppResult};
use crate::models::Warehouse;
use crate::reports::registry::{UsagePlugin, UsageQuery};
use crate::reports::schema::{FieldRule, Schema};
use crate::reports::value::{UsageData, UsageValue};

/// Power consumption per warehouse, with interleaved count and cost columns.
pub struct PowerConsumptionPlugin;

impl PowerConsumptionPlugin {
    pub const SYMBOL: &'static str = "power_consumption";
    const TOTAL_KEY: &'static str = "power_consumption_total_cost";
}

/// `"Warehouse 1"` -> `"warehouse1"`
fn warehouse_key(warehouse: &Warehouse) -> String {
    warehouse
        .name
        .split_whitespace()
        .collect::<String>()
        .to_lowercase()
}

#[async_trait]
impl UsagePlugin for PowerConsumptionPlugin {
    async fn schema(&self, store: &dyn PricingStore) -> AppResult<Schema> {
        debug!("get power consumption schema");
        let mut schema = Schema::new();
        for warehouse in store.warehouses().await? {
            let key = warehouse_key(&warehouse);
            schema.insert(
                format!("power_consumption_count_{key}"),
                FieldRule::new(format!("Power consumption count ({key})")),
            );
            schema.insert(
                format!("power_consumption_cost_{key}"),
                FieldRule::new(format!("Power consumption cost ({key})")).currency(),
            );
        }
        schema.insert(
            Self::TOTAL_KEY,
            FieldRule::new("Power consumption total cost")
                .currency()
                .total_cost(),
        );
        Ok(schema)
    }

    async fn usages(&self, store: &dyn PricingStore, query: &UsageQuery) -> AppResult<UsageData> {
        debug!("get power consumption usage");
        let usage_type = store
            .usage_type_by_symbol(Self::SYMBOL)
            .await?
            .ok_or_else(|| AppError::not_found("usage type", Self::SYMBOL))?;

        let mut data = UsageData::new();
        for warehouse in store.warehouses().await? {
            let key = warehouse_key(&warehouse);
            let costs = usages_and_costs(store, query, &usage_type, Some(warehouse.id)).await?;
            for (venture_id, usage) in costs {
                let fields = data.entry(venture_id).or_default();
                fields.insert(
                    format!("power_consumption_count_{key}"),
                    UsageValue::Numeric(usage.value),
                );
                if let Some(cost) = usage.cost.as_decimal() {
                    let total = fields
                        .get(Self::TOTAL_KEY)
                        .and_then(UsageValue::as_decimal)
                        .unwrap_or(Decimal::ZERO);
                    fields.insert(Self::TOTAL_KEY.to_string(), UsageValue::Numeric(total + cost));
                }
                fields.insert(format!("power_consumption_cost_{key}"), usage.cost);
            }
        }
        Ok(data)
    }
}
