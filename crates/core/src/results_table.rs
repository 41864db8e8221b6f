use std::collections::HashSet;

use serde_json::{Map, Value};

pub type RowObject = Map<String, Value>;

pub const INDEX_HEADER: &str = "S.No.";
pub const NULL_PLACEHOLDER: &str = "-";
pub const EMPTY_STATE_MESSAGE: &str = "No data to display";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub index: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultGrid {
    columns: Vec<String>,
    rows: Vec<GridRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableView {
    Empty,
    Grid(ResultGrid),
}

impl TableView {
    /// Lays out `rows` for display. Columns come from the first row; keys that
    /// only show up in later rows are appended in the order first seen.
    #[must_use]
    pub fn from_rows(rows: Option<&[RowObject]>) -> Self {
        let Some(rows) = rows.filter(|rows| !rows.is_empty()) else {
            return Self::Empty;
        };

        let mut seen = HashSet::new();
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = rows
            .iter()
            .enumerate()
            .map(|(offset, row)| GridRow {
                index: offset + 1,
                cells: columns
                    .iter()
                    .map(|column| render_cell(row.get(column)))
                    .collect(),
            })
            .collect();

        Self::Grid(ResultGrid { columns, rows })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl ResultGrid {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn headers(&self) -> Vec<&str> {
        std::iter::once(INDEX_HEADER)
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    #[must_use]
    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn visible_rows(&self, start: usize, limit: usize) -> &[GridRow] {
        if limit == 0 || start >= self.rows.len() {
            return &[];
        }

        let end = (start + limit).min(self.rows.len());
        &self.rows[start..end]
    }
}

#[must_use]
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NULL_PLACEHOLDER.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
