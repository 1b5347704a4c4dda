use rust_decimal::Decimal;

use super::formatter::ValueFormatter;
use super::schema::Schema;
use super::value::{Cell, FieldValues};

/// Cells of one venture in header order; the last cell is the formatted total cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledRow {
    pub cells: Vec<Cell>,
    pub total_cost: Decimal,
}

/// key: row-assembler -> flatten plugin schemas into one row
///
/// `data` is `None` for a venture no plugin reported on; every field then renders from its
/// default. The row always has one cell per schema field plus the total.
pub fn assemble_row(
    formatter: &ValueFormatter,
    data: Option<&FieldValues>,
    schemas: &[Schema],
) -> AssembledRow {
    let width = schemas.iter().map(Schema::len).sum::<usize>() + 1;
    let mut cells = Vec::with_capacity(width);
    let mut total_cost = Decimal::ZERO;

    for schema in schemas {
        for (key, rule) in schema.iter() {
            let field = formatter.format_field(data.and_then(|values| values.get(key)), rule);
            total_cost = total_cost.saturating_add(field.total_contribution);
            cells.push(field.cell);
        }
    }

    let (total, _) = formatter.as_currency(total_cost, true);
    cells.push(Cell::Text(total));

    AssembledRow { cells, total_cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::schema::FieldRule;
    use crate::reports::value::UsageValue;
    use rust_decimal_macros::dec;

    fn sample_schemas() -> Vec<Schema> {
        vec![
            Schema::new()
                .field("field1", FieldRule::new("Field1"))
                .field("field2", FieldRule::new("Field2").currency().total_cost()),
            Schema::new()
                .field("field3", FieldRule::new("Field3"))
                .field("field4", FieldRule::new("Field4").currency().total_cost()),
        ]
    }

    #[test]
    fn row_merges_all_schemas_and_appends_total() {
        let data = FieldValues::from([
            ("field1".to_string(), UsageValue::from(123)),
            ("field2".to_string(), UsageValue::from(dec!(3))),
            ("field3".to_string(), UsageValue::from(3123)),
            ("field4".to_string(), UsageValue::from(33)),
        ]);

        let row = assemble_row(&ValueFormatter::new("PLN"), Some(&data), &sample_schemas());

        assert_eq!(
            row.cells,
            vec![
                Cell::from(123),
                Cell::from("3.00 PLN"),
                Cell::from(3123),
                Cell::from("33.00 PLN"),
                Cell::from("36.00 PLN"),
            ]
        );
        assert_eq!(row.total_cost, dec!(36));
    }

    #[test]
    fn venture_without_data_renders_defaults() {
        let schemas = sample_schemas();
        let row = assemble_row(&ValueFormatter::new("PLN"), None, &schemas);

        let width: usize = schemas.iter().map(Schema::len).sum();
        assert_eq!(row.cells.len(), width + 1);
        assert_eq!(row.cells[1], Cell::from("0.00 PLN"));
        assert_eq!(row.cells.last(), Some(&Cell::from("0.00 PLN")));
    }

    #[test]
    fn assembling_twice_is_stable() {
        let data =
            FieldValues::from([("field2".to_string(), UsageValue::from("Incomplete price"))]);
        let formatter = ValueFormatter::new("PLN");
        let first = assemble_row(&formatter, Some(&data), &sample_schemas());
        let second = assemble_row(&formatter, Some(&data), &sample_schemas());
        assert_eq!(first, second);
        assert_eq!(first.total_cost, Decimal::ZERO);
    }

    #[test]
    fn total_saturates_instead_of_overflowing() {
        let data = FieldValues::from([
            ("field2".to_string(), UsageValue::from(Decimal::MAX)),
            ("field4".to_string(), UsageValue::from(Decimal::MAX)),
        ]);
        let row = assemble_row(&ValueFormatter::new("PLN"), Some(&data), &sample_schemas());
        assert_eq!(row.total_cost, Decimal::MAX);
        assert_eq!(row.cells.len(), 5);
    }
}
