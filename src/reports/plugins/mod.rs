//! Built-in usage plugins of the ventures report.

mod deprecation;
mod information;
mod power_consumption;
mod usage_type;

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::registry::UsageQuery;
use super::value::UsageValue;
use crate::db::{PricingStore, UsageFilter};
use crate::error::AppResult;
use crate::models::UsageType;

pub use deprecation::DeprecationPlugin;
pub use information::InformationPlugin;
pub use power_consumption::PowerConsumptionPlugin;
pub use usage_type::UsageTypePlugin;

/// Shown instead of a cost when some usage in the range has no price.
pub const INCOMPLETE_PRICE: &str = "Incomplete price";

/// Summed usage of one venture and its priced cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCost {
    pub value: Decimal,
    pub cost: UsageValue,
}

/// Sums the usages of `usage_type` per venture over the query range and prices every day with
/// the price valid on that day (forecast price for forecast reports). A venture with any
/// unpriced usage gets [`INCOMPLETE_PRICE`] as its cost.
pub async fn usages_and_costs(
    store: &dyn PricingStore,
    query: &UsageQuery,
    usage_type: &UsageType,
    warehouse_id: Option<i32>,
) -> AppResult<HashMap<i32, UsageCost>> {
    let venture_ids = query.venture_ids();
    let usages = store
        .daily_usages(&UsageFilter {
            usage_type_id: usage_type.id,
            start: query.start,
            end: query.end,
            venture_ids: &venture_ids,
            warehouse_id,
        })
        .await?;
    let prices = store.usage_prices(usage_type.id).await?;

    let mut totals: HashMap<i32, (Decimal, Option<Decimal>)> = HashMap::new();
    for usage in usages {
        let price_warehouse = if usage_type.by_warehouse {
            usage.warehouse_id
        } else {
            None
        };
        let price = prices
            .iter()
            .find(|price| price.covers(usage.date, price_warehouse));

        let (value, cost) = totals
            .entry(usage.venture_id)
            .or_insert((Decimal::ZERO, Some(Decimal::ZERO)));
        *value += usage.value;
        *cost = match (*cost, price) {
            (Some(sum), Some(price)) => Some(sum + usage.value * price.unit_price(query.forecast)),
            _ => None,
        };
    }

    Ok(totals
        .into_iter()
        .map(|(venture_id, (value, cost))| {
            let cost = match cost {
                Some(cost) => UsageValue::Numeric(cost),
                None => UsageValue::from(INCOMPLETE_PRICE),
            };
            (venture_id, UsageCost { value, cost })
        })
        .collect())
}
