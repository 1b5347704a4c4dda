use once_cell::sync::Lazy;
use std::fs;

use serde_json::Value;

/// Currency code appended to every money cell. Defaults to `PLN`.
pub static CURRENCY: Lazy<String> = Lazy::new(|| {
    read_optional_env("CURRENCY").unwrap_or_else(|| "PLN".to_string())
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Plugins placed in front of the usage type columns of the ventures report, in column order.
/// Provide a comma-separated list of plugin symbols via `REPORT_BASE_PLUGINS`.
pub static REPORT_BASE_PLUGINS: Lazy<Vec<String>> = Lazy::new(|| {
    read_optional_env("REPORT_BASE_PLUGINS")
        .map(|value| split_list(&value))
        .filter(|symbols| !symbols.is_empty())
        .unwrap_or_else(|| vec!["information".to_string(), "deprecation".to_string()])
});

/// key: sync-config -> pipeline cadence
pub static SYNC_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(86_400)
});

/// key: sync-config -> profit center assigned to services without one
pub static DEFAULT_PROFIT_CENTER_ID: Lazy<i32> = Lazy::new(|| {
    std::env::var("DEFAULT_PROFIT_CENTER_ID")
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(1)
});

/// Connection settings for the OpenStack usage sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStackSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub regions: Vec<String>,
    pub tenants_url: Option<String>,
    pub extra_queries: Vec<(String, String)>,
}

/// Connection settings for the CMDB service sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdbSettings {
    pub url: String,
    pub token: Option<String>,
}

/// Returns `None` when `OPENSTACK_URL` is unset, which marks the sync as not configured.
pub fn openstack_settings_from_env() -> Option<OpenStackSettings> {
    let url = read_url_env("OPENSTACK_URL")?;
    let regions = read_optional_env("OPENSTACK_REGIONS")
        .map(|value| split_list(&value))
        .filter(|regions| !regions.is_empty())
        .unwrap_or_else(|| vec![String::new()]);

    let extra_queries = match json_from_env("OPENSTACK_EXTRA_QUERIES") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let pair = item.as_array()?;
                let url = pair.first()?.as_str()?;
                let query = pair.get(1)?.as_str()?;
                Some((url.to_string(), query.to_string()))
            })
            .collect(),
        Some(other) => {
            tracing::warn!(%other, "OPENSTACK_EXTRA_QUERIES must be a list of [url, query] pairs");
            Vec::new()
        }
        None => Vec::new(),
    };

    Some(OpenStackSettings {
        url,
        user: read_optional_env("OPENSTACK_USER").unwrap_or_default(),
        password: read_secret_env("OPENSTACK_PASS", "OPENSTACK_PASS_FILE").unwrap_or_default(),
        regions,
        tenants_url: read_optional_env("OPENSTACK_TENANTS_URL"),
        extra_queries,
    })
}

/// Returns `None` when `CMDB_API_URL` is unset.
pub fn cmdb_settings_from_env() -> Option<CmdbSettings> {
    let url = read_url_env("CMDB_API_URL")?;
    Some(CmdbSettings {
        url,
        token: read_secret_env("CMDB_API_TOKEN", "CMDB_API_TOKEN_FILE"),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Unset or unparsable URLs both leave the integration unconfigured.
fn read_url_env(key: &str) -> Option<String> {
    let raw = read_optional_env(key)?;
    match parse_base_url(&raw) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(%err, %raw, "ignoring invalid {key}");
            None
        }
    }
}

fn parse_base_url(raw: &str) -> Result<String, url::ParseError> {
    let url = url::Url::parse(raw)?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn read_secret_env(value_key: &str, file_key: &str) -> Option<String> {
    if let Some(path) = read_optional_env(file_key) {
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.trim().to_string();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
            Err(err) => tracing::warn!(%err, %path, "failed to read {file_key}"),
        }
    }

    read_optional_env(value_key)
}

fn json_from_env(var: &str) -> Option<Value> {
    let raw = read_optional_env(var)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(%err, "failed to parse {var} as JSON");
            None
        }
    }
}
