use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{SyncContext, SyncJob, SyncOutcome};
use crate::config::{self, CmdbSettings};
use crate::db::{ServiceUpdate, SyncStore};
use crate::error::{AppError, AppResult};
use crate::models::{OwnershipType, ProfitCenter};

/// Service as exported by the CMDB.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CmdbService {
    pub ci_uid: String,
    pub name: String,
    /// CI uid of the profit center; `None` assigns the default profit center.
    #[serde(default)]
    pub profit_center: Option<String>,
    #[serde(default)]
    pub technical_owners: Vec<i32>,
    #[serde(default)]
    pub business_owners: Vec<i32>,
}

/// key: cmdb-api -> service catalogue
#[async_trait]
pub trait CmdbApi: Send + Sync {
    async fn services(&self) -> AppResult<Vec<CmdbService>>;
}

#[derive(Clone)]
pub struct CmdbHttpClient {
    client: reqwest::Client,
    settings: CmdbSettings,
}

impl CmdbHttpClient {
    pub fn new(settings: CmdbSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, settings })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.settings.token {
            request.bearer_auth(token)
        } else {
            request
        }
    }
}

#[async_trait]
impl CmdbApi for CmdbHttpClient {
    async fn services(&self) -> AppResult<Vec<CmdbService>> {
        let url = format!("{}/services", self.settings.url.trim_end_matches('/'));
        let services = self
            .auth(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(services)
    }
}

/// Creates or updates one service and reconciles its technical and business owners. Returns
/// whether the service was created.
pub async fn update_service(
    store: &dyn SyncStore,
    data: &CmdbService,
    default_profit_center: &ProfitCenter,
) -> AppResult<bool> {
    let profit_center_id = match &data.profit_center {
        Some(ci_uid) => {
            store
                .profit_center_by_ci_uid(ci_uid)
                .await?
                .ok_or_else(|| AppError::not_found("profit center", ci_uid))?
                .id
        }
        None => default_profit_center.id,
    };

    let update = ServiceUpdate {
        ci_uid: data.ci_uid.clone(),
        name: data.name.clone(),
        profit_center_id,
        owners: vec![
            (
                OwnershipType::Technical,
                data.technical_owners.iter().copied().collect::<BTreeSet<_>>(),
            ),
            (
                OwnershipType::Business,
                data.business_owners.iter().copied().collect::<BTreeSet<_>>(),
            ),
        ],
    };
    let change = store.apply_service_update(&update).await?;
    debug!(
        ci_uid = %data.ci_uid,
        created = change.created,
        owners_added = change.owners_added,
        owners_removed = change.owners_removed,
        "service synced"
    );
    Ok(change.created)
}

/// key: service-sync -> services + owners from the CMDB
pub struct ServiceSync {
    store: Arc<dyn SyncStore>,
    api: Option<Arc<dyn CmdbApi>>,
    default_profit_center_id: i32,
}

impl ServiceSync {
    pub const NAME: &'static str = "service";

    pub fn new(store: Arc<dyn SyncStore>, api: Option<Arc<dyn CmdbApi>>) -> Self {
        Self {
            store,
            api,
            default_profit_center_id: *config::DEFAULT_PROFIT_CENTER_ID,
        }
    }

    pub fn with_default_profit_center(mut self, id: i32) -> Self {
        self.default_profit_center_id = id;
        self
    }

    /// Reads `CMDB_API_*` settings; unset `CMDB_API_URL` yields a job that always skips.
    pub fn from_env(store: Arc<dyn SyncStore>) -> AppResult<Self> {
        let api = match config::cmdb_settings_from_env() {
            Some(settings) => Some(Arc::new(CmdbHttpClient::new(settings)?) as Arc<dyn CmdbApi>),
            None => None,
        };
        Ok(Self::new(store, api))
    }
}

#[async_trait]
impl SyncJob for ServiceSync {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &["business_line", "owner"]
    }

    async fn run(&self, ctx: &SyncContext) -> AppResult<SyncOutcome> {
        let Some(api) = &self.api else {
            return Ok(SyncOutcome::skipped("not configured."));
        };
        let default_profit_center = self
            .store
            .profit_center(self.default_profit_center_id)
            .await?
            .ok_or_else(|| AppError::not_found("profit center", self.default_profit_center_id))?;

        let mut new_services = 0;
        let mut total = 0;
        for data in api.services().await? {
            if update_service(self.store.as_ref(), &data, &default_profit_center).await? {
                new_services += 1;
            }
            total += 1;
        }

        info!(date = %ctx.today, new_services, total, "services synced");
        Ok(SyncOutcome::completed(format!(
            "{} new service(s), {} updated, {} total",
            new_services,
            total - new_services,
            total
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::Owner;
    use crate::sync::SyncStatus;
    use chrono::NaiveDate;

    struct FixedCmdb(Vec<CmdbService>);

    #[async_trait]
    impl CmdbApi for FixedCmdb {
        async fn services(&self) -> AppResult<Vec<CmdbService>> {
            Ok(self.0.clone())
        }
    }

    fn cmdb_service(ci_uid: &str, technical: Vec<i32>, business: Vec<i32>) -> CmdbService {
        CmdbService {
            ci_uid: ci_uid.to_string(),
            name: format!("Service {ci_uid}"),
            profit_center: None,
            technical_owners: technical,
            business_owners: business,
        }
    }

    async fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert_profit_center(ProfitCenter {
                id: 1,
                ci_uid: "pc-1".to_string(),
                name: "Default".to_string(),
            })
            .await;
        for cmdb_id in 1..=3 {
            store
                .insert_owner(Owner {
                    id: cmdb_id,
                    cmdb_id,
                    name: format!("owner {cmdb_id}"),
                })
                .await;
        }
        Arc::new(store)
    }

    fn ctx() -> SyncContext {
        SyncContext {
            today: NaiveDate::from_ymd_opt(2014, 3, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn sync_counts_new_and_updated_services() {
        let store = store().await;
        let first = ServiceSync::new(
            store.clone(),
            Some(Arc::new(FixedCmdb(vec![cmdb_service("s-1", vec![1, 2], vec![3])]))),
        )
        .with_default_profit_center(1);
        let outcome = first.run(&ctx()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::completed("1 new service(s), 0 updated, 1 total"));

        let second = ServiceSync::new(
            store.clone(),
            Some(Arc::new(FixedCmdb(vec![
                cmdb_service("s-1", vec![2], vec![3]),
                cmdb_service("s-2", vec![], vec![]),
            ]))),
        )
        .with_default_profit_center(1);
        let outcome = second.run(&ctx()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::completed("1 new service(s), 1 updated, 2 total"));

        let services = store.services().await;
        let s1 = services.iter().find(|s| s.ci_uid == "s-1").unwrap();
        assert_eq!(
            store.service_owners(s1.id, OwnershipType::Technical).await,
            BTreeSet::from([2])
        );
        assert_eq!(
            store.service_owners(s1.id, OwnershipType::Business).await,
            BTreeSet::from([3])
        );
    }

    #[tokio::test]
    async fn unknown_profit_center_fails_the_update() {
        let store = store().await;
        let default = ProfitCenter {
            id: 1,
            ci_uid: "pc-1".to_string(),
            name: "Default".to_string(),
        };
        let data = CmdbService {
            profit_center: Some("pc-404".to_string()),
            ..cmdb_service("s-1", vec![], vec![])
        };
        let err = update_service(store.as_ref(), &data, &default)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound { kind: "profit center", .. }));
    }

    #[tokio::test]
    async fn missing_cmdb_configuration_skips() {
        let job = ServiceSync::new(store().await, None);
        let outcome = job.run(&ctx()).await.unwrap();
        assert_eq!(outcome.status, SyncStatus::Skipped);
    }
}
