//! Ventures cost report: a chain of usage plugins whose schemas and data are merged into one
//! formatted row per venture.

pub mod api;
pub mod driver;
pub mod formatter;
pub mod plugins;
pub mod registry;
pub mod row;
pub mod schema;
pub mod value;

pub use driver::{ReportProgress, ReportRequest, ReportResult, ReportRow, VenturesReport};
pub use registry::{PluginDescriptor, PluginRegistry, UsagePlugin, UsageQuery, REPORTS_CHAIN};
pub use schema::{FieldRule, Schema};
pub use value::{Cell, UsageValue};
