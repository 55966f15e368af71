use super::{Table, Value};
use crate::error::Result;
use std::path::Path;

impl Table {
    /// Write the table, index included, as CSV with a header row.
    ///
    /// Nulls become empty fields.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.column_names())?;

        for row in self.rows() {
            writer.write_record(row.into_iter().map(|value| match value {
                Value::Null => String::new(),
                other => other.to_string(),
            }))?;
        }

        writer.flush()?;
        Ok(())
    }
}
