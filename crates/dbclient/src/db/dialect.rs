//! SQL text for writing tables, per database engine

use super::DatabaseKind;
use crate::table::ColumnType;
use crate::wire_types::{ColumnMapping, WireType};

impl DatabaseKind {
    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            DatabaseKind::MySql => format!("`{}`", ident.replace('`', "``")),
            DatabaseKind::Postgres | DatabaseKind::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Bind parameter `n` (1-based)
    pub fn placeholder(self, n: usize) -> String {
        match self {
            DatabaseKind::Postgres => format!("${}", n),
            DatabaseKind::MySql | DatabaseKind::Sqlite => "?".to_string(),
        }
    }

    /// Most bind parameters one statement may carry
    pub fn max_bind_params(self) -> usize {
        match self {
            DatabaseKind::MySql | DatabaseKind::Postgres => 65_535,
            DatabaseKind::Sqlite => 999,
        }
    }

    /// Column type for an explicitly mapped wire type
    pub fn wire_type_sql(self, wire_type: WireType) -> String {
        match (self, wire_type) {
            (_, WireType::Varchar(width)) => format!("VARCHAR({})", width),
            (DatabaseKind::Postgres, WireType::Timestamp) => "TIMESTAMP".to_string(),
            (DatabaseKind::MySql | DatabaseKind::Sqlite, WireType::Timestamp) => "DATETIME".to_string(),
            (DatabaseKind::Sqlite, WireType::Float(_)) => "FLOAT".to_string(),
            (DatabaseKind::MySql | DatabaseKind::Postgres, WireType::Float(precision)) => {
                format!("FLOAT({})", precision)
            },
            (_, WireType::Integer) => "INTEGER".to_string(),
        }
    }

    /// The engine's own choice for a column without an explicit wire type
    pub fn default_type_sql(self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Boolean) => "BOOLEAN",
            (DatabaseKind::MySql, ColumnType::Integer) => "BIGINT",
            (_, ColumnType::Integer) => "BIGINT",
            (DatabaseKind::MySql, ColumnType::Float) => "DOUBLE",
            (DatabaseKind::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (DatabaseKind::Sqlite, ColumnType::Float) => "REAL",
            (_, ColumnType::Text) => "TEXT",
            (DatabaseKind::Postgres, ColumnType::Timestamp) => "TIMESTAMP",
            (_, ColumnType::Timestamp) => "DATETIME",
            (_, ColumnType::Date) => "DATE",
            (DatabaseKind::Postgres, ColumnType::Binary) => "BYTEA",
            (_, ColumnType::Binary) => "BLOB",
        }
    }

    pub fn column_type_sql(self, mapping: &ColumnMapping) -> String {
        match mapping.wire_type {
            Some(wire_type) => self.wire_type_sql(wire_type),
            None => self.default_type_sql(mapping.column_type).to_string(),
        }
    }

    pub fn create_table_sql(self, table_name: &str, columns: &[ColumnMapping]) -> String {
        let definitions: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", self.quote_ident(&c.name), self.column_type_sql(c)))
            .collect();
        format!("CREATE TABLE {} ({})", self.quote_ident(table_name), definitions.join(", "))
    }

    pub fn drop_table_sql(self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table_name))
    }

    /// Counts tables named by the single bound parameter
    pub fn table_exists_sql(self) -> &'static str {
        match self {
            DatabaseKind::MySql => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            },
            DatabaseKind::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            },
            DatabaseKind::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        }
    }

    /// Multi-row `INSERT` for `rows` rows of `columns`
    pub fn insert_sql(self, table_name: &str, columns: &[&str], rows: usize) -> String {
        let column_list: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let mut param = 0;
        let tuples: Vec<String> = (0..rows)
            .map(|_| {
                let params: Vec<String> = columns
                    .iter()
                    .map(|_| {
                        param += 1;
                        self.placeholder(param)
                    })
                    .collect();
                format!("({})", params.join(", "))
            })
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_ident(table_name),
            column_list.join(", "),
            tuples.join(", ")
        )
    }

    /// Rows per `INSERT` so that one statement stays under the bind limit
    pub fn rows_per_insert(self, columns: usize) -> usize {
        (self.max_bind_params() / columns.max(1)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(name: &str, column_type: ColumnType) -> ColumnMapping {
        ColumnMapping {
            name: name.to_string(),
            column_type,
            wire_type: crate::wire_types::wire_type_for(column_type),
        }
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(DatabaseKind::MySql.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(DatabaseKind::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_create_table_per_engine() {
        let columns = vec![
            mapping("id", ColumnType::Integer),
            mapping("name", ColumnType::Text),
            mapping("price", ColumnType::Float),
            mapping("seen_at", ColumnType::Timestamp),
            mapping("active", ColumnType::Boolean),
            mapping("payload", ColumnType::Binary),
        ];

        assert_eq!(
            DatabaseKind::MySql.create_table_sql("items", &columns),
            "CREATE TABLE `items` (`id` INTEGER, `name` VARCHAR(12), `price` FLOAT(12), \
             `seen_at` DATETIME, `active` BOOLEAN, `payload` BLOB)"
        );
        assert_eq!(
            DatabaseKind::Postgres.create_table_sql("items", &columns),
            "CREATE TABLE \"items\" (\"id\" INTEGER, \"name\" VARCHAR(12), \"price\" FLOAT(12), \
             \"seen_at\" TIMESTAMP, \"active\" BOOLEAN, \"payload\" BYTEA)"
        );
        assert_eq!(
            DatabaseKind::Sqlite.create_table_sql("items", &columns),
            "CREATE TABLE \"items\" (\"id\" INTEGER, \"name\" VARCHAR(12), \"price\" FLOAT, \
             \"seen_at\" DATETIME, \"active\" BOOLEAN, \"payload\" BLOB)"
        );
    }

    #[test]
    fn test_insert_numbers_postgres_params() {
        assert_eq!(
            DatabaseKind::Postgres.insert_sql("t", &["a", "b"], 2),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(
            DatabaseKind::MySql.insert_sql("t", &["a"], 2),
            "INSERT INTO `t` (`a`) VALUES (?), (?)"
        );
    }

    #[test]
    fn test_rows_per_insert_respects_limit() {
        assert_eq!(DatabaseKind::Sqlite.rows_per_insert(10), 99);
        assert_eq!(DatabaseKind::Sqlite.rows_per_insert(5_000), 1);
        assert_eq!(DatabaseKind::Postgres.rows_per_insert(0), 65_535);
    }
}
