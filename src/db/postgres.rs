use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::{diff_owners, PricingStore, ServiceChange, ServiceUpdate, SyncStore, UsageFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    symbol_from_name, DailyDeprecation, DailyUsage, ProfitCenter, Service, UsagePrice, UsageType,
    Venture, Warehouse,
};

const VENTURE_COLUMNS: &str = "id, symbol, name, department, is_active, parent_id";
const USAGE_TYPE_COLUMNS: &str = "id, name, symbol, by_warehouse, display_order, show_in_report";

/// key: pg-store -> pricing tables
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PricingStore for PgStore {
    async fn list_ventures(&self, is_active: Option<bool>) -> AppResult<Vec<Venture>> {
        let ventures = sqlx::query_as::<_, Venture>(&format!(
            r#"
            SELECT {VENTURE_COLUMNS}
            FROM ventures
            WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
            ORDER BY LOWER(name), id
            "#
        ))
        .bind(is_active)
        .fetch_all(&self.pool)
        .await?;
        Ok(ventures)
    }

    async fn venture_with_descendants(&self, venture_id: i32) -> AppResult<Vec<Venture>> {
        let ventures = sqlx::query_as::<_, Venture>(&format!(
            r#"
            WITH RECURSIVE tree AS (
                SELECT {VENTURE_COLUMNS} FROM ventures WHERE id = $1
                UNION
                SELECT c.id, c.symbol, c.name, c.department, c.is_active, c.parent_id
                FROM ventures c
                JOIN tree ON c.parent_id = tree.id
            )
            SELECT {VENTURE_COLUMNS}
            FROM tree
            ORDER BY (id = $1) DESC, LOWER(name), id
            "#
        ))
        .bind(venture_id)
        .fetch_all(&self.pool)
        .await?;

        if ventures.is_empty() {
            return Err(AppError::not_found("venture", venture_id));
        }
        Ok(ventures)
    }

    async fn usage_types(&self) -> AppResult<Vec<UsageType>> {
        let usage_types = sqlx::query_as::<_, UsageType>(&format!(
            "SELECT {USAGE_TYPE_COLUMNS} FROM usage_types ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(usage_types)
    }

    async fn usage_type_by_symbol(&self, symbol: &str) -> AppResult<Option<UsageType>> {
        let usage_type = sqlx::query_as::<_, UsageType>(&format!(
            "SELECT {USAGE_TYPE_COLUMNS} FROM usage_types WHERE symbol = $1"
        ))
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(usage_type)
    }

    async fn warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let warehouses = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, show_in_report FROM warehouses \
             WHERE show_in_report = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(warehouses)
    }

    async fn daily_usages(&self, filter: &UsageFilter<'_>) -> AppResult<Vec<DailyUsage>> {
        let usages = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT id, date, usage_type_id, venture_id, warehouse_id, value
            FROM daily_usages
            WHERE usage_type_id = $1
              AND date BETWEEN $2 AND $3
              AND venture_id = ANY($4)
              AND ($5::INTEGER IS NULL OR warehouse_id = $5)
            ORDER BY date, id
            "#,
        )
        .bind(filter.usage_type_id)
        .bind(filter.start)
        .bind(filter.end)
        .bind(filter.venture_ids)
        .bind(filter.warehouse_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(usages)
    }

    async fn usage_prices(&self, usage_type_id: i32) -> AppResult<Vec<UsagePrice>> {
        let prices = sqlx::query_as::<_, UsagePrice>(
            r#"
            SELECT id, usage_type_id, warehouse_id, start_date, end_date, price, forecast_price
            FROM usage_prices
            WHERE usage_type_id = $1
            ORDER BY start_date, id
            "#,
        )
        .bind(usage_type_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    async fn daily_deprecation(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        venture_ids: &[i32],
    ) -> AppResult<Vec<DailyDeprecation>> {
        let rows = sqlx::query_as::<_, DailyDeprecation>(
            r#"
            SELECT id, date, venture_id, asset_id, cost
            FROM daily_deprecations
            WHERE date BETWEEN $1 AND $2
              AND venture_id = ANY($3)
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(venture_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn venture_by_symbol(&self, symbol: &str) -> AppResult<Option<Venture>> {
        let venture = sqlx::query_as::<_, Venture>(&format!(
            "SELECT {VENTURE_COLUMNS} FROM ventures WHERE symbol = $1"
        ))
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(venture)
    }

    async fn get_or_create_usage_type(&self, name: &str) -> AppResult<UsageType> {
        let usage_type = sqlx::query_as::<_, UsageType>(&format!(
            r#"
            INSERT INTO usage_types (name, symbol)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING {USAGE_TYPE_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(symbol_from_name(name))
        .fetch_one(&self.pool)
        .await?;
        Ok(usage_type)
    }

    async fn set_daily_usage(
        &self,
        date: NaiveDate,
        usage_type_id: i32,
        venture_id: i32,
        value: Decimal,
    ) -> AppResult<DailyUsage> {
        let usage = sqlx::query_as::<_, DailyUsage>(
            r#"
            INSERT INTO daily_usages (date, usage_type_id, venture_id, warehouse_id, value)
            VALUES ($1, $2, $3, NULL, $4)
            ON CONFLICT (date, usage_type_id, venture_id, (COALESCE(warehouse_id, 0)))
            DO UPDATE SET value = EXCLUDED.value
            RETURNING id, date, usage_type_id, venture_id, warehouse_id, value
            "#,
        )
        .bind(date)
        .bind(usage_type_id)
        .bind(venture_id)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(usage)
    }

    async fn profit_center(&self, id: i32) -> AppResult<Option<ProfitCenter>> {
        let profit_center = sqlx::query_as::<_, ProfitCenter>(
            "SELECT id, ci_uid, name FROM profit_centers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profit_center)
    }

    async fn profit_center_by_ci_uid(&self, ci_uid: &str) -> AppResult<Option<ProfitCenter>> {
        let profit_center = sqlx::query_as::<_, ProfitCenter>(
            "SELECT id, ci_uid, name FROM profit_centers WHERE ci_uid = $1",
        )
        .bind(ci_uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profit_center)
    }

    async fn apply_service_update(&self, update: &ServiceUpdate) -> AppResult<ServiceChange> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i32> =
            sqlx::query_scalar("SELECT id FROM services WHERE ci_uid = $1 FOR UPDATE")
                .bind(&update.ci_uid)
                .fetch_optional(&mut tx)
                .await?;

        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (ci_uid, name, profit_center_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (ci_uid) DO UPDATE
            SET name = EXCLUDED.name,
                profit_center_id = EXCLUDED.profit_center_id
            RETURNING id, ci_uid, name, profit_center_id
            "#,
        )
        .bind(&update.ci_uid)
        .bind(&update.name)
        .bind(update.profit_center_id)
        .fetch_one(&mut tx)
        .await?;

        let mut owners_added = 0;
        let mut owners_removed = 0;
        for (kind, current) in &update.owners {
            let previous: Vec<i32> = sqlx::query_scalar(
                r#"
                SELECT o.cmdb_id
                FROM service_ownerships so
                JOIN owners o ON o.id = so.owner_id
                WHERE so.service_id = $1 AND so.ownership_type = $2
                "#,
            )
            .bind(service.id)
            .bind(kind.as_str())
            .fetch_all(&mut tx)
            .await?;
            let (to_add, to_delete) = diff_owners(&previous.into_iter().collect(), current);

            if !to_delete.is_empty() {
                let deleted = sqlx::query(
                    r#"
                    DELETE FROM service_ownerships so
                    USING owners o
                    WHERE so.owner_id = o.id
                      AND so.service_id = $1
                      AND so.ownership_type = $2
                      AND o.cmdb_id = ANY($3)
                    "#,
                )
                .bind(service.id)
                .bind(kind.as_str())
                .bind(&to_delete[..])
                .execute(&mut tx)
                .await?;
                owners_removed += deleted.rows_affected() as usize;
            }

            if !to_add.is_empty() {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO service_ownerships (service_id, owner_id, ownership_type)
                    SELECT $1, o.id, $2 FROM owners o WHERE o.cmdb_id = ANY($3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(service.id)
                .bind(kind.as_str())
                .bind(&to_add[..])
                .execute(&mut tx)
                .await?;
                owners_added += inserted.rows_affected() as usize;
            }
        }

        tx.commit().await?;

        Ok(ServiceChange {
            service,
            created: existing.is_none(),
            owners_added,
            owners_removed,
        })
    }
}
