use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use super::formatter::ValueFormatter;
use super::plugins::UsageTypePlugin;
use super::registry::{
    PluginDescriptor, PluginRegistry, RegisteredPlugin, UsageQuery, REPORTS_CHAIN,
};
use super::row::assemble_row;
use super::schema::Schema;
use super::value::{Cell, FieldValues};
use crate::config;
use crate::db::PricingStore;
use crate::error::{AppError, AppResult};
use crate::models::Venture;

const TOTAL_COST_HEADER: &str = "Total cost";

/// Query parameters of one ventures report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Only active ventures; `false` lists every venture.
    #[serde(default)]
    pub is_active: bool,
    /// Restricts the report to this venture and its descendants.
    #[serde(default)]
    pub venture: Option<i32>,
    #[serde(default)]
    pub forecast: bool,
}

impl ReportRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            is_active: false,
            venture: None,
            forecast: false,
        }
    }
}

/// One rendered venture; serialized as the bare list of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub venture_id: i32,
    pub venture_name: String,
    pub cells: Vec<Cell>,
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cells.serialize(serializer)
    }
}

/// One step of a report run. `rows` is only set on the final step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportProgress {
    pub percent: u8,
    pub rows: Option<Vec<ReportRow>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportResult {
    pub header: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// key: ventures-report -> plugin chain -> sorted rows
///
/// Holds no per-run state; every call to [`VenturesReport::get_data`] starts a fresh run.
#[derive(Clone)]
pub struct VenturesReport {
    store: Arc<dyn PricingStore>,
    registry: Arc<PluginRegistry>,
    formatter: ValueFormatter,
    base_plugins: Vec<String>,
}

impl VenturesReport {
    /// Uses the configured currency and base plugins.
    pub fn new(store: Arc<dyn PricingStore>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            store,
            registry,
            formatter: ValueFormatter::new(config::CURRENCY.as_str()),
            base_plugins: config::REPORT_BASE_PLUGINS.clone(),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.formatter = ValueFormatter::new(currency);
        self
    }

    pub fn with_base_plugins<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_plugins = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Plugins of one run in column order: the base plugins, then one plugin per reportable
    /// usage type (higher `order` first, then by name). A usage type uses the plugin
    /// registered under its symbol when there is one, the generic usage type plugin otherwise.
    pub async fn plugins(&self) -> AppResult<Vec<RegisteredPlugin>> {
        let mut plan = Vec::new();
        for symbol in &self.base_plugins {
            plan.push(self.registry.lookup(REPORTS_CHAIN, symbol)?.clone());
        }

        let mut usage_types: Vec<_> = self
            .store
            .usage_types()
            .await?
            .into_iter()
            .filter(|usage_type| usage_type.show_in_report)
            .filter(|usage_type| !self.base_plugins.contains(&usage_type.symbol))
            .collect();
        usage_types.sort_by(|a, b| b.order.cmp(&a.order).then_with(|| a.name.cmp(&b.name)));

        for usage_type in usage_types {
            let registered = match self.registry.find(REPORTS_CHAIN, &usage_type.symbol) {
                Some(registered) => registered.clone(),
                None => RegisteredPlugin {
                    descriptor: PluginDescriptor::new(
                        &usage_type.name,
                        &usage_type.symbol,
                        usage_type.order,
                    ),
                    plugin: Arc::new(UsageTypePlugin::new(usage_type)),
                },
            };
            plan.push(registered);
        }
        Ok(plan)
    }

    pub async fn ventures(&self, request: &ReportRequest) -> AppResult<Vec<Venture>> {
        match request.venture {
            Some(venture_id) => self.store.venture_with_descendants(venture_id).await,
            None if request.is_active => self.store.list_ventures(Some(true)).await,
            None => self.store.list_ventures(None).await,
        }
    }

    /// Display names of every column, ending with the total cost.
    pub async fn header(&self) -> AppResult<Vec<String>> {
        let mut schemas = Vec::new();
        for registered in self.plugins().await? {
            schemas.push(registered.plugin.schema(self.store.as_ref()).await?);
        }
        Ok(header_of(&schemas))
    }

    /// Lazily runs the report, one plugin per step. Dropping the stream stops the run.
    pub fn get_data(
        &self,
        request: ReportRequest,
    ) -> BoxStream<'static, AppResult<ReportProgress>> {
        let run = ReportRun::new(self.clone(), request);
        stream::try_unfold(run, |mut run| async move {
            let progress = run.step().await?;
            Ok::<_, AppError>(progress.map(|progress| (progress, run)))
        })
        .boxed()
    }

    /// Runs the report to completion.
    pub async fn collect(&self, request: ReportRequest) -> AppResult<ReportResult> {
        let mut run = ReportRun::new(self.clone(), request);
        let mut rows = Vec::new();
        while let Some(progress) = run.step().await? {
            if let Some(done) = progress.rows {
                rows = done;
            }
        }
        Ok(ReportResult {
            header: header_of(&run.schemas),
            rows,
        })
    }
}

fn header_of(schemas: &[Schema]) -> Vec<String> {
    schemas
        .iter()
        .flat_map(|schema| schema.names().map(str::to_string))
        .chain(std::iter::once(TOTAL_COST_HEADER.to_string()))
        .collect()
}

enum Phase {
    Running,
    Done,
}

struct Plan {
    query: UsageQuery,
    plugins: Vec<RegisteredPlugin>,
}

struct ReportRun {
    report: VenturesReport,
    request: ReportRequest,
    phase: Phase,
    plan: Option<Plan>,
    next: usize,
    schemas: Vec<Schema>,
    data: HashMap<i32, FieldValues>,
}

impl ReportRun {
    fn new(report: VenturesReport, request: ReportRequest) -> Self {
        Self {
            report,
            request,
            phase: Phase::Running,
            plan: None,
            next: 0,
            schemas: Vec::new(),
            data: HashMap::new(),
        }
    }

    async fn prepare(&self) -> AppResult<Plan> {
        if self.request.start > self.request.end {
            return Err(AppError::BadRequest(format!(
                "start date {} is after end date {}",
                self.request.start, self.request.end
            )));
        }
        let ventures = self.report.ventures(&self.request).await?;
        let plugins = self.report.plugins().await?;
        info!(
            start = %self.request.start,
            end = %self.request.end,
            ventures = ventures.len(),
            plugins = plugins.len(),
            "starting ventures report"
        );
        Ok(Plan {
            query: UsageQuery {
                start: self.request.start,
                end: self.request.end,
                ventures,
                forecast: self.request.forecast,
            },
            plugins,
        })
    }

    /// Runs the next plugin, or assembles the rows once every plugin ran. `None` after the
    /// final step.
    async fn step(&mut self) -> AppResult<Option<ReportProgress>> {
        if let Phase::Done = self.phase {
            return Ok(None);
        }
        if self.plan.is_none() {
            self.plan = Some(self.prepare().await?);
        }
        let Some(plan) = self.plan.as_ref() else {
            return Ok(None);
        };

        let total = plan.plugins.len();
        if self.next < total {
            let registered = &plan.plugins[self.next];
            let store = self.report.store.as_ref();
            debug!(plugin = %registered.descriptor.symbol, "running report plugin");
            let schema = registered.plugin.schema(store).await?;
            let usages = registered.plugin.usages(store, &plan.query).await?;
            for (venture_id, fields) in usages {
                self.data.entry(venture_id).or_default().extend(fields);
            }
            self.schemas.push(schema);
            self.next += 1;
            let percent = self.next * 100 / (total + 1);
            return Ok(Some(ReportProgress {
                percent: percent as u8,
                rows: None,
            }));
        }

        let mut ventures: Vec<&Venture> = plan.query.ventures.iter().collect();
        ventures.sort_by_key(|venture| venture.sort_key());
        let rows = ventures
            .into_iter()
            .map(|venture| ReportRow {
                venture_id: venture.id,
                venture_name: venture.name.clone(),
                cells: assemble_row(
                    &self.report.formatter,
                    self.data.get(&venture.id),
                    &self.schemas,
                )
                .cells,
            })
            .collect::<Vec<_>>();
        info!(rows = rows.len(), "ventures report finished");
        self.phase = Phase::Done;
        Ok(Some(ReportProgress {
            percent: 100,
            rows: Some(rows),
        }))
    }
}
