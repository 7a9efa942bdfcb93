use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::model::MigrationLogEntry;
use crate::storage::Row;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "#")]
    id: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Applied at")]
    applied_at: String,
    #[tabled(rename = "Result")]
    result: &'static str,
}

/// Migration log as a table, oldest attempt first
pub fn log_table(entries: &[MigrationLogEntry]) -> String {
    if entries.is_empty() {
        return "(no migration attempts)".to_string();
    }

    let rows: Vec<LogRow> = entries
        .iter()
        .map(|e| LogRow {
            id: e.id.map(|id| id.to_string()).unwrap_or_default(),
            version: e.version,
            applied_at: e.applied_at.clone(),
            result: if e.success { "success" } else { "failed" },
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Query rows as a table. Columns are the union of row keys, in first-seen order.
pub fn rows_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(0 rows)".to_string();
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut builder = Builder::new();
    builder.push_record(columns.iter().map(|c| c.to_string()));
    for row in rows {
        builder.push_record(
            columns
                .iter()
                .map(|c| row.get(*c).map(ToString::to_string).unwrap_or_else(|| "NULL".to_string())),
        );
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{}\n({} rows)", table, rows.len())
}
