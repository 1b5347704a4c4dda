use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::plugins::{DeprecationPlugin, InformationPlugin, PowerConsumptionPlugin};
use super::schema::Schema;
use super::value::UsageData;
use crate::db::PricingStore;
use crate::error::{AppError, AppResult};
use crate::models::Venture;

/// Chain holding the ventures report plugins.
pub const REPORTS_CHAIN: &str = "reports";

/// Arguments handed to every plugin of one report run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub ventures: Vec<Venture>,
    pub forecast: bool,
}

impl UsageQuery {
    pub fn venture_ids(&self) -> Vec<i32> {
        self.ventures.iter().map(|venture| venture.id).collect()
    }
}

/// key: usage-plugin -> one schema + one data block of the report
///
/// `schema` must not change during one report run. `usages` returns entries for a subset of
/// the queried ventures; missing ventures render with defaults.
#[async_trait]
pub trait UsagePlugin: Send + Sync {
    async fn schema(&self, store: &dyn PricingStore) -> AppResult<Schema>;

    async fn usages(&self, store: &dyn PricingStore, query: &UsageQuery) -> AppResult<UsageData>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub symbol: String,
    pub order: i32,
}

impl PluginDescriptor {
    pub fn new(name: &str, symbol: &str, order: i32) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            order,
        }
    }

    /// Higher `order` first, then by name.
    pub fn chain_order(&self, other: &Self) -> Ordering {
        other
            .order
            .cmp(&self.order)
            .then_with(|| self.name.cmp(&other.name))
    }
}

#[derive(Clone)]
pub struct RegisteredPlugin {
    pub descriptor: PluginDescriptor,
    pub plugin: Arc<dyn UsagePlugin>,
}

/// key: plugin-registry -> chain name -> plugins
///
/// Populated once at start-up and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    chains: HashMap<String, Vec<RegisteredPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in report plugins on [`REPORTS_CHAIN`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(
                REPORTS_CHAIN,
                PluginDescriptor::new("Information", "information", 20),
                Arc::new(InformationPlugin),
            )
            .register(
                REPORTS_CHAIN,
                PluginDescriptor::new("Deprecation", "deprecation", 10),
                Arc::new(DeprecationPlugin),
            )
            .register(
                REPORTS_CHAIN,
                PluginDescriptor::new("Power consumption", PowerConsumptionPlugin::SYMBOL, 0),
                Arc::new(PowerConsumptionPlugin),
            );
        registry
    }

    /// Registering a symbol twice in one chain replaces the earlier plugin.
    pub fn register(
        &mut self,
        chain: &str,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn UsagePlugin>,
    ) -> &mut Self {
        let plugins = self.chains.entry(chain.to_string()).or_default();
        let entry = RegisteredPlugin { descriptor, plugin };
        match plugins
            .iter_mut()
            .find(|existing| existing.descriptor.symbol == entry.descriptor.symbol)
        {
            Some(slot) => *slot = entry,
            None => plugins.push(entry),
        }
        self
    }

    pub fn find(&self, chain: &str, symbol: &str) -> Option<&RegisteredPlugin> {
        self.chains
            .get(chain)?
            .iter()
            .find(|registered| registered.descriptor.symbol == symbol)
    }

    pub fn lookup(&self, chain: &str, symbol: &str) -> AppResult<&RegisteredPlugin> {
        self.find(chain, symbol).ok_or_else(|| AppError::PluginLookup {
            chain: chain.to_string(),
            symbol: symbol.to_string(),
        })
    }

    /// Descriptors of a chain in invocation order.
    pub fn descriptors(&self, chain: &str) -> Vec<PluginDescriptor> {
        let mut descriptors: Vec<PluginDescriptor> = self
            .chains
            .get(chain)
            .map(|plugins| {
                plugins
                    .iter()
                    .map(|registered| registered.descriptor.clone())
                    .collect()
            })
            .unwrap_or_default();
        descriptors.sort_by(PluginDescriptor::chain_order);
        descriptors
    }
}
