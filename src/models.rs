use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// key: pricing-models -> ventures,usage types,prices
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Venture {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub parent_id: Option<i32>,
}

impl Venture {
    pub fn new(id: i32, name: &str, is_active: bool) -> Self {
        Self {
            id,
            symbol: name.to_string(),
            name: name.to_string(),
            department: None,
            is_active,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i32) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_string());
        self
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.to_string();
        self
    }

    /// Case-folded name used to order ventures in listings and reports.
    pub fn sort_key(&self) -> (String, i32) {
        (self.name.to_lowercase(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UsageType {
    pub id: i32,
    pub name: String,
    pub symbol: String,
    pub by_warehouse: bool,
    #[sqlx(rename = "display_order")]
    pub order: i32,
    pub show_in_report: bool,
}

impl UsageType {
    pub fn new(id: i32, name: &str, symbol: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            symbol: symbol.to_string(),
            by_warehouse: false,
            order: 0,
            show_in_report: true,
        }
    }
}

/// Symbol derived from a usage type name, e.g. `OpenStack 10000 CPU Hours` ->
/// `openstack_10000_cpu_hours`.
pub fn symbol_from_name(name: &str) -> String {
    let mut symbol = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            symbol.push(ch.to_ascii_lowercase());
        } else if !symbol.ends_with('_') {
            symbol.push('_');
        }
    }
    symbol.trim_matches('_').to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i32,
    pub name: String,
    pub show_in_report: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DailyUsage {
    pub id: i64,
    pub date: NaiveDate,
    pub usage_type_id: i32,
    pub venture_id: i32,
    pub warehouse_id: Option<i32>,
    pub value: Decimal,
}

/// Price of one unit of a usage type, valid from `start` through `end` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UsagePrice {
    pub id: i32,
    pub usage_type_id: i32,
    pub warehouse_id: Option<i32>,
    #[sqlx(rename = "start_date")]
    pub start: NaiveDate,
    #[sqlx(rename = "end_date")]
    pub end: NaiveDate,
    pub price: Decimal,
    pub forecast_price: Decimal,
}

impl UsagePrice {
    pub fn covers(&self, date: NaiveDate, warehouse_id: Option<i32>) -> bool {
        self.start <= date && date <= self.end && self.warehouse_id == warehouse_id
    }

    pub fn unit_price(&self, forecast: bool) -> Decimal {
        if forecast {
            self.forecast_price
        } else {
            self.price
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DailyDeprecation {
    pub id: i64,
    pub date: NaiveDate,
    pub venture_id: i32,
    pub asset_id: i32,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProfitCenter {
    pub id: i32,
    pub ci_uid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub id: i32,
    pub cmdb_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: i32,
    pub ci_uid: String,
    pub name: String,
    pub profit_center_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipType {
    Technical,
    Business,
}

impl OwnershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipType::Technical => "technical",
            OwnershipType::Business => "business",
        }
    }
}
