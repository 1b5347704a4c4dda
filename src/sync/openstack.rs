use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{SyncContext, SyncJob, SyncOutcome};
use crate::config::{self, OpenStackSettings};
use crate::db::SyncStore;
use crate::error::{AppError, AppResult};

/// Tenant usage record as returned by OpenStack, keyed by metric name.
pub type TenantUsage = Map<String, Value>;

static VENTURE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^venture:(?P<venture>[^;]*);").expect("invalid regex"));

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Usage type name, metric key and divisor of every imported OpenStack metric.
const METRICS: [(&str, &str, i64); 5] = [
    ("OpenStack 10000 Memory GiB Hours", "total_memory_mb_usage", 1024),
    ("OpenStack 10000 CPU Hours", "total_vcpus_usage", 1),
    ("OpenStack 10000 Disk GiB Hours", "total_local_gb_usage", 1),
    ("OpenStack 10000 Volume GiB Hours", "total_volume_gb_usage", 1),
    ("OpenStack 10000 Images GiB Hours", "total_images_gb_usage", 1),
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Tenant {
    /// Venture symbol tagged in the description as `venture:<symbol>;`.
    pub fn venture_symbol(&self) -> Option<String> {
        let description = self.description.as_deref()?;
        let captures = VENTURE_TAG.captures(description)?;
        Some(captures["venture"].to_string())
    }
}

/// key: openstack-api -> tenant usage source
#[async_trait]
pub trait OpenStackApi: Send + Sync {
    async fn simple_tenant_usage(
        &self,
        region: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<TenantUsage>>;

    /// Custom usage endpoint returning tenant usage records.
    async fn query(
        &self,
        url: &str,
        query: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<TenantUsage>>;

    async fn tenants(&self) -> AppResult<Vec<Tenant>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(default, rename = "serviceCatalog")]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct TenantUsagesResponse {
    #[serde(default)]
    tenant_usages: Vec<TenantUsage>,
}

#[derive(Debug, Deserialize)]
struct TenantsResponse {
    #[serde(default)]
    tenants: Vec<Tenant>,
}

struct Session {
    token: String,
    compute_url: Option<String>,
}

/// Keystone v2 authenticated client. Every call authenticates anew.
#[derive(Clone)]
pub struct OpenStackHttpClient {
    client: reqwest::Client,
    settings: OpenStackSettings,
}

impl OpenStackHttpClient {
    pub fn new(settings: OpenStackSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, settings })
    }

    fn endpoint(base: &str, path: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn authenticate(&self, region: &str) -> AppResult<Session> {
        let response: TokenResponse = self
            .client
            .post(Self::endpoint(&self.settings.url, "tokens"))
            .json(&json!({
                "auth": {
                    "passwordCredentials": {
                        "username": self.settings.user,
                        "password": self.settings.password,
                    }
                }
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let compute_url = response
            .access
            .service_catalog
            .into_iter()
            .filter(|entry| entry.kind == "compute")
            .flat_map(|entry| entry.endpoints)
            .find(|endpoint| region.is_empty() || endpoint.region.as_deref() == Some(region))
            .map(|endpoint| endpoint.public_url);

        Ok(Session {
            token: response.access.token.id,
            compute_url,
        })
    }

    /// Region used for calls that are not per-region.
    fn default_region(&self) -> &str {
        self.settings
            .regions
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[async_trait]
impl OpenStackApi for OpenStackHttpClient {
    async fn simple_tenant_usage(
        &self,
        region: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<TenantUsage>> {
        let session = self.authenticate(region).await?;
        let compute_url = session.compute_url.ok_or_else(|| {
            AppError::BadGateway(format!("no compute endpoint for region `{region}`"))
        })?;
        let response: TenantUsagesResponse = self
            .client
            .get(Self::endpoint(&compute_url, "os-simple-tenant-usage"))
            .header("X-Auth-Token", &session.token)
            .query(&[
                ("start", start.format(TIMESTAMP_FORMAT).to_string()),
                ("end", end.format(TIMESTAMP_FORMAT).to_string()),
                ("detailed", "1".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.tenant_usages)
    }

    async fn query(
        &self,
        url: &str,
        query: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<TenantUsage>> {
        let session = self.authenticate(self.default_region()).await?;
        let body: Value = self
            .client
            .get(Self::endpoint(url, query))
            .header("X-Auth-Token", &session.token)
            .query(&[
                ("start", start.format(TIMESTAMP_FORMAT).to_string()),
                ("end", end.format(TIMESTAMP_FORMAT).to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove(query) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn tenants(&self) -> AppResult<Vec<Tenant>> {
        let session = self.authenticate(self.default_region()).await?;
        let base = self
            .settings
            .tenants_url
            .as_deref()
            .unwrap_or(&self.settings.url);
        let response: TenantsResponse = self
            .client
            .get(Self::endpoint(base, "tenants"))
            .header("X-Auth-Token", &session.token)
            .query(&[("limit", 1000)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.tenants)
    }
}

/// key: openstack-sync -> daily tenant usages per venture
pub struct OpenStackSync {
    store: Arc<dyn SyncStore>,
    upstream: Option<(OpenStackSettings, Arc<dyn OpenStackApi>)>,
}

impl OpenStackSync {
    pub const NAME: &'static str = "openstack";

    pub fn new(
        store: Arc<dyn SyncStore>,
        settings: OpenStackSettings,
        api: Arc<dyn OpenStackApi>,
    ) -> Self {
        Self {
            store,
            upstream: Some((settings, api)),
        }
    }

    pub fn not_configured(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            upstream: None,
        }
    }

    /// Reads `OPENSTACK_*` settings; unset `OPENSTACK_URL` yields a job that always skips.
    pub fn from_env(store: Arc<dyn SyncStore>) -> AppResult<Self> {
        match config::openstack_settings_from_env() {
            Some(settings) => {
                let api = Arc::new(OpenStackHttpClient::new(settings.clone())?);
                Ok(Self::new(store, settings, api))
            }
            None => Ok(Self::not_configured(store)),
        }
    }

    /// Enabled tenants mapped to the venture symbol from their description.
    async fn tenant_ventures(api: &dyn OpenStackApi) -> AppResult<HashMap<String, String>> {
        let tenants = api.tenants().await?;
        Ok(tenants
            .into_iter()
            .filter(|tenant| tenant.enabled)
            .filter_map(|tenant| {
                let symbol = tenant.venture_symbol()?;
                Some((tenant.id, symbol))
            })
            .collect())
    }
}

#[async_trait]
impl SyncJob for OpenStackSync {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ventures"]
    }

    async fn run(&self, ctx: &SyncContext) -> AppResult<SyncOutcome> {
        let Some((settings, api)) = &self.upstream else {
            return Ok(SyncOutcome::skipped("not configured."));
        };

        let end = ctx
            .today
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::Message(format!("invalid sync date {}", ctx.today)))?;
        let start = end - ChronoDuration::days(1);

        // tenant id -> source (region or query url) -> merged usage record
        let mut tenants: BTreeMap<String, BTreeMap<String, TenantUsage>> = BTreeMap::new();
        let mut merge = |usage: TenantUsage, source: &str| {
            let Some(tenant_id) = usage.get("tenant_id").and_then(Value::as_str) else {
                return;
            };
            tenants
                .entry(tenant_id.to_string())
                .or_default()
                .entry(source.to_string())
                .or_default()
                .extend(usage);
        };

        for region in &settings.regions {
            let usages = api.simple_tenant_usage(region, start, end).await?;
            debug!(region = %region, tenants = usages.len(), "fetched openstack tenant usage");
            for usage in usages {
                merge(usage, region.as_str());
            }
        }
        for (url, query) in &settings.extra_queries {
            for usage in api.query(url, query, start, end).await? {
                merge(usage, url.as_str());
            }
        }

        let ventures = Self::tenant_ventures(api.as_ref()).await?;
        for (tenant_id, sources) in &tenants {
            let Some(symbol) = ventures.get(tenant_id) else {
                continue;
            };
            for usage in sources.values() {
                set_usages(self.store.as_ref(), symbol, usage, ctx.today).await?;
            }
        }

        info!(tenants = tenants.len(), date = %ctx.today, "openstack usages saved");
        Ok(SyncOutcome::completed("Openstack usages were saved"))
    }
}

fn metric_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(int) => Some(Decimal::from(int)),
            None => number.as_f64().and_then(Decimal::from_f64),
        },
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Stores every known metric of `usage` as the venture's daily usage on `date`. Metrics
/// missing from the record are left untouched.
pub async fn set_usages(
    store: &dyn SyncStore,
    venture_symbol: &str,
    usage: &TenantUsage,
    date: NaiveDate,
) -> AppResult<()> {
    let venture = store
        .venture_by_symbol(venture_symbol)
        .await?
        .ok_or_else(|| AppError::not_found("venture", venture_symbol))?;

    for (name, key, divisor) in METRICS {
        let Some(value) = usage.get(key).and_then(metric_value) else {
            continue;
        };
        let usage_type = store.get_or_create_usage_type(name).await?;
        store
            .set_daily_usage(date, usage_type.id, venture.id, value / Decimal::from(divisor))
            .await?;
    }
    Ok(())
}
