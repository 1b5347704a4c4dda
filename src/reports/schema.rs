use serde::Serialize;

use super::value::UsageValue;

/// Display rules for one report field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRule {
    pub name: String,
    pub currency: bool,
    pub total_cost: bool,
    pub default: Option<UsageValue>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            currency: false,
            total_cost: false,
            default: None,
        }
    }

    /// Render numeric values as money.
    pub fn currency(mut self) -> Self {
        self.currency = true;
        self
    }

    /// Add numeric values to the row's total cost.
    pub fn total_cost(mut self) -> Self {
        self.total_cost = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<UsageValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered field key -> rule mapping contributed by one plugin. Keys are unique: inserting an
/// existing key replaces its rule and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, rule: FieldRule) -> Self {
        self.insert(key, rule);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: FieldRule) {
        let key = key.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = rule,
            None => self.fields.push((key, rule)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, rule)| rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(key, rule)| (key.as_str(), rule))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    /// Display names in field order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, rule)| rule.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
