//! Console preview and summary statistics

use super::{Column, ColumnType, Table, Value};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell};

/// Render a table as a bordered grid, index columns in bold.
pub fn render(table: &Table) -> String {
    let mut grid = comfy_table::Table::new();
    grid.load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(table.columns().iter().enumerate().map(|(i, c)| {
            let cell = Cell::new(c.name());
            if i < table.index_len() {
                cell.add_attribute(Attribute::Bold)
            } else {
                cell
            }
        }));

    for row in table.rows() {
        grid.add_row(row.into_iter().map(Value::to_string));
    }

    format!("{}\n{} rows x {} columns\n", grid, table.num_rows(), table.num_columns())
}

const STATISTICS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Summary statistics for every numeric data column.
///
/// The result has a `statistic` index column followed by one float column
/// per numeric column of `table`. Nulls are skipped; `std` is the sample
/// standard deviation and is null with fewer than two values. Percentiles
/// interpolate linearly between the closest ranks.
pub fn describe(table: &Table) -> Table {
    let mut columns = vec![Column {
        name: "statistic".to_string(),
        column_type: ColumnType::Text,
        values: STATISTICS.iter().map(|s| Value::Text(s.to_string())).collect(),
    }];

    for column in table.data_columns().iter().filter(|c| c.column_type().is_numeric()) {
        let mut samples: Vec<f64> = column.values().iter().filter_map(Value::as_f64).collect();
        samples.sort_by(f64::total_cmp);

        columns.push(Column {
            name: column.name().to_string(),
            column_type: ColumnType::Float,
            values: summarize(&samples).into_iter().map(float_or_null).collect(),
        });
    }

    Table {
        columns,
        index_len: 1,
    }
}

fn float_or_null(value: Option<f64>) -> Value {
    value.filter(|v| v.is_finite()).map_or(Value::Null, Value::Float)
}

/// `sorted` must be in ascending order.
fn summarize(sorted: &[f64]) -> [Option<f64>; 8] {
    let count = sorted.len();
    if count == 0 {
        return [Some(0.0), None, None, None, None, None, None, None];
    }

    let n = count as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = (count > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    [
        Some(n),
        Some(mean),
        std,
        sorted.first().copied(),
        Some(percentile(sorted, 0.25)),
        Some(percentile(sorted, 0.50)),
        Some(percentile(sorted, 0.75)),
        sorted.last().copied(),
    ]
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
