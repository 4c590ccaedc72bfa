//! A minimal column-oriented table with a labelled row index.

use thiserror::Error;

/// Row labels of a [`Table`], with an optional dimension name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    name: Option<String>,
    labels: Vec<String>,
}

impl Index {
    /// An unnamed index.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: None, labels: labels.into_iter().map(Into::into).collect() }
    }

    /// An index with the given name.
    pub fn named<I, S>(name: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels).with_name(Some(name))
    }

    /// Replaces the name, builder style.
    pub fn with_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    /// The index name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Row labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the index has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Cells of one column.
///
/// Missing floats are NaN and missing text is `None`; integers are never
/// missing.
#[derive(Clone, Debug)]
pub enum ColumnData {
    /// Real values.
    Float(Vec<f64>),
    /// Integer values.
    Int(Vec<i64>),
    /// Text values.
    Text(Vec<Option<String>>),
}

impl ColumnData {
    /// Number of cells.
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Whether the column has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the cell at `row` is missing.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Float(v) => v[row].is_nan(),
            Self::Int(_) => false,
            Self::Text(v) => v[row].is_none(),
        }
    }

    /// Row of the first missing cell, if any.
    pub fn first_missing(&self) -> Option<usize> {
        match self {
            Self::Float(v) => v.iter().position(|x| x.is_nan()),
            Self::Int(_) => None,
            Self::Text(v) => v.iter().position(Option::is_none),
        }
    }
}

/// NaN cells compare equal to each other.
impl PartialEq for ColumnData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
            }
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Vec<f64>> for ColumnData {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<i64>> for ColumnData {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<Option<String>>> for ColumnData {
    fn from(v: Vec<Option<String>>) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for ColumnData {
    fn from(v: Vec<String>) -> Self {
        Self::Text(v.into_iter().map(Some).collect())
    }
}

impl From<Vec<&str>> for ColumnData {
    fn from(v: Vec<&str>) -> Self {
        Self::Text(v.into_iter().map(|s| Some(s.to_string())).collect())
    }
}

/// A named column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column cells, one per index label.
    pub data: ColumnData,
}

/// An error building a [`Table`].
#[derive(Debug, Error)]
pub enum TableError {
    /// The column does not have one cell per index label.
    #[error("column {column:?} has {found} cells but the index has {expected} rows")]
    LengthMismatch {
        /// Column name.
        column: String,
        /// Number of index labels.
        expected: usize,
        /// Number of cells supplied.
        found: usize,
    },
    /// A column with this name already exists.
    #[error("duplicate column: {0:?}")]
    DuplicateColumn(String),
}

/// An ordered collection of rows keyed by an [`Index`], stored by column.
///
/// # Example
///
/// ```
/// use cdf_table::{Index, Table};
///
/// let table = Table::new(Index::named("date", ["2000-01-01", "2000-01-02"]))
///     .with_column("value", vec![1.0, f64::NAN])?
///     .with_column("count", vec![3i64, 4])?;
/// assert_eq!(table.num_rows(), 2);
/// assert!(table.has_missing());
/// # Ok::<_, cdf_table::TableError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    index: Index,
    columns: Vec<Column>,
}

impl Table {
    /// A table without columns.
    pub fn new(index: Index) -> Self {
        Self { index, columns: Vec::new() }
    }

    /// Appends a column, builder style.
    pub fn with_column(
        mut self,
        name: &str,
        data: impl Into<ColumnData>,
    ) -> Result<Self, TableError> {
        self.push_column(name, data)?;
        Ok(self)
    }

    /// Appends a column.
    pub fn push_column(&mut self, name: &str, data: impl Into<ColumnData>) -> Result<(), TableError> {
        let data = data.into();
        if data.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.index.len(),
                found: data.len(),
            });
        }
        if self.column(name).is_some() {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        self.columns.push(Column { name: name.to_string(), data });
        Ok(())
    }

    /// The row index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Renames the row index.
    pub fn set_index_name(&mut self, name: Option<&str>) {
        self.index.name = name.map(str::to_string);
    }

    /// Columns in insertion order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether any cell is missing.
    pub fn has_missing(&self) -> bool {
        self.columns.iter().any(|c| c.data.first_missing().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Index {
        Index::named("date", ["2000-01-01", "2000-01-02", "2000-01-03"])
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Table::new(index()).with_column("v", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { expected: 3, found: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_column() {
        let err = Table::new(index())
            .with_column("v", vec![1i64, 2, 3])
            .unwrap()
            .with_column("v", vec![1i64, 2, 3])
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn(name) if name == "v"));
    }

    #[test]
    fn nan_cells_compare_equal() {
        let a = ColumnData::from(vec![1.0, f64::NAN]);
        let b = ColumnData::from(vec![1.0, f64::NAN]);
        assert_eq!(a, b);
        assert_ne!(a, ColumnData::from(vec![1.0, 2.0]));
        assert_ne!(a, ColumnData::from(vec![1i64, 2]));
    }

    #[test]
    #[should_panic]
    fn is_missing_out_of_bounds() {
        ColumnData::from(vec![1.0]).is_missing(1);
    }

    #[test]
    fn missing_cells() {
        let text = ColumnData::from(vec![Some("a".to_string()), None]);
        assert_eq!(text.first_missing(), Some(1));
        assert!(text.is_missing(1) && !text.is_missing(0));
        assert_eq!(ColumnData::from(vec![1i64]).first_missing(), None);

        let table = Table::new(index())
            .with_column("v", vec![1.0, f64::NAN, 3.0])
            .unwrap();
        assert!(table.has_missing());
        assert_eq!(table.column("v").map(ColumnData::len), Some(3));
        assert_eq!(table.index().name(), Some("date"));
    }
}
