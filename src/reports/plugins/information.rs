use async_trait::async_trait;
use tracing::debug;

use crate::db::PricingStore;
use crate::error::AppResult;
use crate::reports::registry::{UsagePlugin, UsageQuery};
use crate::reports::schema::{FieldRule, Schema};
use crate::reports::value::{FieldValues, UsageData, UsageValue};

/// Identifying columns of each venture.
pub struct InformationPlugin;

#[async_trait]
impl UsagePlugin for InformationPlugin {
    async fn schema(&self, _store: &dyn PricingStore) -> AppResult<Schema> {
        Ok(Schema::new()
            .field("venture_id", FieldRule::new("ID"))
            .field("venture", FieldRule::new("Venture"))
            .field("department", FieldRule::new("Department").with_default("")))
    }

    async fn usages(&self, _store: &dyn PricingStore, query: &UsageQuery) -> AppResult<UsageData> {
        debug!(ventures = query.ventures.len(), "get ventures information");
        Ok(query
            .ventures
            .iter()
            .map(|venture| {
                let mut fields = FieldValues::from([
                    ("venture_id".to_string(), UsageValue::from(venture.id)),
                    ("venture".to_string(), UsageValue::from(venture.name.as_str())),
                ]);
                if let Some(department) = &venture.department {
                    fields.insert("department".to_string(), UsageValue::from(department.as_str()));
                }
                (venture.id, fields)
            })
            .collect())
    }
}
