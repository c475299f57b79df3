//! A small row-oriented table with named, nullable string columns.
//!
//! Source exports are read into a `Table`, renamed onto the canonical keys in
//! [`crate::keys`], harmonised column-wise, and finally projected into graph
//! entities. Cells are `Option<String>`; `None` is a missing value.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{IggytopError, Result};

pub type Cell = Option<String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    /// Value of `column` in this row; `None` when the cell is null or the
    /// column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        self.table.rows[self.index][idx].as_deref()
    }
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from raw rows; short rows are padded with nulls and long
    /// rows truncated to the header width.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Cell>>,
    ) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column the caller cannot do without.
    pub fn require(&self, source_name: &str, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| IggytopError::SchemaDrift {
            source_name: source_name.to_string(),
            column: name.to_string(),
        })
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn row(&self, index: usize) -> Row<'_> {
        Row { table: self, index }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(move |index| Row { table: self, index })
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        self.row(row).get(column)
    }

    /// Add an all-null column if it does not exist yet. Returns its index.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub fn set(&mut self, row: usize, column: &str, value: Cell) {
        let idx = self.ensure_column(column);
        self.rows[row][idx] = value;
    }

    /// Set every cell of `column` to `value`, creating the column if needed.
    pub fn set_constant(&mut self, column: &str, value: Option<&str>) {
        let idx = self.ensure_column(column);
        for row in &mut self.rows {
            row[idx] = value.map(str::to_string);
        }
    }

    /// Overwrite (or create) `to` with the values of `from`.
    pub fn copy_column(&mut self, from: &str, to: &str) {
        let Some(src) = self.column_index(from) else {
            return;
        };
        let dst = self.ensure_column(to);
        for row in &mut self.rows {
            row[dst] = row[src].clone();
        }
    }

    /// Rename columns present in `renames`; absent source columns are ignored.
    pub fn rename(&mut self, renames: &[(&str, &str)]) {
        for (from, to) in renames {
            if let Some(idx) = self.column_index(from) {
                self.columns[idx] = to.to_string();
            }
        }
    }

    /// Project onto `columns` in the given order. Any missing column is schema drift.
    pub fn select(&self, source_name: &str, columns: &[&str]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.require(source_name, c))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Replace every cell equal to one of `tokens` (after trimming) with null.
    pub fn replace_nulls(&mut self, tokens: &[&str]) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                let is_null = cell
                    .as_deref()
                    .map(|v| {
                        let v = v.trim();
                        v.is_empty() || tokens.contains(&v)
                    })
                    .unwrap_or(false);
                if is_null {
                    *cell = None;
                }
            }
        }
    }

    /// Rewrite a column in place. Returns `false` if the column is absent.
    pub fn map_column<F>(&mut self, column: &str, mut f: F) -> bool
    where
        F: FnMut(Option<&str>) -> Cell,
    {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(row[idx].as_deref());
        }
        true
    }

    /// Compute `column` from whole rows (creating it if needed).
    pub fn derive_column<F>(&mut self, column: &str, f: F)
    where
        F: Fn(Row<'_>) -> Cell,
    {
        let values: Vec<Cell> = self.rows().map(f).collect();
        let idx = self.ensure_column(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
    }

    /// Distinct non-null values of `column`, in order of first appearance.
    pub fn distinct(&self, column: &str) -> Vec<String> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|row| row[idx].as_deref())
            .filter(|v| seen.insert(*v))
            .map(str::to_string)
            .collect()
    }

    /// Replace each value of `column` by its entry in `mapping`; values with
    /// no entry become null.
    pub fn apply_mapping(&mut self, column: &str, mapping: &HashMap<String, Cell>) -> bool {
        self.map_column(column, |value| {
            value.and_then(|v| mapping.get(v).cloned().flatten())
        })
    }

    /// Split `column` on `separator` and emit one row per piece.
    pub fn explode(&mut self, column: &str, separator: char) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        let mut exploded = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            match row[idx].as_deref() {
                Some(value) if value.contains(separator) => {
                    for piece in value.split(separator) {
                        let mut copy = row.clone();
                        copy[idx] = Some(piece.to_string());
                        exploded.push(copy);
                    }
                }
                _ => exploded.push(row),
            }
        }
        self.rows = exploded;
    }

    /// Deterministic random subset of `fraction` of the rows, original order kept.
    pub fn sample(&self, fraction: f64, seed: u64) -> Table {
        let fraction = fraction.clamp(0.0, 1.0);
        let amount = ((self.rows.len() as f64) * fraction).round() as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, self.rows.len(), amount).into_vec();
        picked.sort_unstable();
        Table {
            columns: self.columns.clone(),
            rows: picked.into_iter().map(|i| self.rows[i].clone()).collect(),
        }
    }

    /// Stack tables vertically; the result has the union of all columns.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut out = Table::default();
        for table in &tables {
            for column in &table.columns {
                out.ensure_column(column);
            }
        }
        for table in tables {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .filter_map(|c| out.column_index(c))
                .collect();
            for row in table.rows {
                let mut full = vec![None; out.columns.len()];
                for (value, &pos) in row.into_iter().zip(&positions) {
                    full[pos] = value;
                }
                out.rows.push(full);
            }
        }
        out
    }
}
