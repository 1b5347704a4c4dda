use rust_decimal::{Decimal, RoundingStrategy};

use super::schema::FieldRule;
use super::value::{Cell, UsageValue};

/// A field ready for display together with what it adds to the row's total cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedField {
    pub cell: Cell,
    pub total_contribution: Decimal,
}

/// key: value-formatter -> currency cells,total contributions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormatter {
    currency: String,
}

impl ValueFormatter {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Renders `value` with two decimal places and the currency code. The second element is
    /// `value` when it counts towards the total cost, zero otherwise.
    pub fn as_currency(&self, value: Decimal, total_cost: bool) -> (String, Decimal) {
        let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        rounded.rescale(2);
        let contribution = if total_cost { value } else { Decimal::ZERO };
        (format!("{rounded} {}", self.currency), contribution)
    }

    /// Missing values fall back to the rule's default, then to zero. Opaque strings are shown
    /// as they are and never count towards the total, currency rule or not.
    pub fn format_field(&self, raw: Option<&UsageValue>, rule: &FieldRule) -> FormattedField {
        let value = raw
            .or(rule.default.as_ref())
            .cloned()
            .unwrap_or(UsageValue::Numeric(Decimal::ZERO));

        match value {
            UsageValue::Numeric(number) if rule.currency => {
                let (text, total_contribution) = self.as_currency(number, rule.total_cost);
                FormattedField {
                    cell: Cell::Text(text),
                    total_contribution,
                }
            }
            UsageValue::Numeric(number) => FormattedField {
                cell: Cell::Number(number),
                total_contribution: if rule.total_cost {
                    number
                } else {
                    Decimal::ZERO
                },
            },
            UsageValue::Opaque(text) => FormattedField {
                cell: Cell::Text(text),
                total_contribution: Decimal::ZERO,
            },
        }
    }
}
