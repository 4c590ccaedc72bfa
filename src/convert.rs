//! Conversion between date-indexed [`Table`]s and NetCDF classic files.
//!
//! [`export`] runs in three steps, each usable on its own:
//!
//! 1. [`validate`] checks the table without touching the filesystem and
//!    returns the parsed dates,
//! 2. [`to_dataset`] maps the table onto a [`Dataset`] with a `date`
//!    coordinate axis,
//! 3. [`write_cdf`](crate::write_cdf) persists it.
//!
//! [`import`] reverses the last two steps through [`from_dataset`].

use crate::{
    cdf::{read_cdf, write_cdf, EncodeError, FormatError, ReadCdfError, WriteCdfError},
    dataset::{check_name, Attribute, Dataset, Dimension, Values, Variable},
    dates::{format_label, has_sub_micros, parse_label, TimeEncoding},
    table::{Column, ColumnData, Index, Table},
};
use chrono::NaiveDateTime;
use log::{debug, trace};
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Required name of the row index, and of the coordinate axis in the file.
pub const INDEX_NAME: &str = "date";

/// Extension of exported files.
pub const FILE_EXTENSION: &str = "nc";

/// Calendar written to the date axis; also the accepted calendar names.
const CALENDAR: &str = "proleptic_gregorian";
const GREGORIAN_CALENDARS: &[&str] = &["proleptic_gregorian", "gregorian", "standard"];

/// First byte of a missing text cell. Never occurs in UTF-8.
const TEXT_FILL: u8 = 0xFF;

/// What to do with missing cells on export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail if any cell is missing.
    #[default]
    Strict,
    /// Keep missing cells; floats are written as NaN.
    Permissive,
}

/// A table that cannot be exported.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The index is not named `date`.
    #[error("index must be named 'date' (found {found:?})")]
    IndexName {
        /// Actual index name.
        found: Option<String>,
    },
    /// An index label is not a calendar date.
    #[error("index must contain valid dates ({label:?} at row {row})")]
    InvalidDate {
        /// Row of the offending label.
        row: usize,
        /// The offending label.
        label: String,
    },
    /// A cell is missing under [`MissingPolicy::Strict`].
    #[error("data contains missing values (column {column:?}, row {row})")]
    MissingValues {
        /// Column of the first missing cell.
        column: String,
        /// Row of the first missing cell.
        row: usize,
    },
    /// Two index labels denote the same date.
    #[error("index must contain unique dates ({label:?} at row {row})")]
    DuplicateDate {
        /// Row of the repeated label.
        row: usize,
        /// The repeated label.
        label: String,
    },
    /// A column name cannot be stored as a variable name.
    #[error("invalid column name: {0:?}")]
    ColumnName(String),
}

/// An error exporting a table.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The table failed validation; nothing was written.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The table cannot be encoded in any supported file version.
    #[error("error encoding table: {0}")]
    Encode(#[from] EncodeError),
}

impl From<WriteCdfError> for ExportError {
    fn from(err: WriteCdfError) -> Self {
        match err {
            WriteCdfError::Io(err) => Self::Io(err),
            WriteCdfError::Encode(err) => Self::Encode(err),
        }
    }
}

/// An error importing a table.
#[derive(Debug, Error)]
pub enum ImportError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// The file is not a NetCDF classic file with a `date` axis.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

impl From<ReadCdfError> for ImportError {
    fn from(err: ReadCdfError) -> Self {
        match err {
            ReadCdfError::Io(err) => Self::Io(err),
            ReadCdfError::Format(err) => Self::Format(err),
        }
    }
}

/// The path [`export`] writes to: `<dir>/<name>.nc`.
pub fn output_path<P: AsRef<Path>>(dir: P, name: &str) -> PathBuf {
    dir.as_ref().join(format!("{name}.{FILE_EXTENSION}"))
}

/// Checks that `table` can be exported and returns its parsed dates.
///
/// Checks run in order and the first failure is returned:
///
/// 1. the index is named `date`,
/// 2. every label parses as a date with at most microsecond precision,
/// 3. under [`MissingPolicy::Strict`], no cell is missing,
/// 4. no two labels denote the same date,
/// 5. every column name is a valid variable name other than `date`.
pub fn validate(
    table: &Table,
    policy: MissingPolicy,
) -> Result<Vec<NaiveDateTime>, ValidationError> {
    let index = table.index();
    if index.name() != Some(INDEX_NAME) {
        return Err(ValidationError::IndexName { found: index.name().map(str::to_string) });
    }

    let dates = (index.labels().iter().enumerate())
        .map(|(row, label)| {
            parse_label(label)
                .filter(|date| !has_sub_micros(date))
                .ok_or_else(|| ValidationError::InvalidDate { row, label: label.clone() })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if policy == MissingPolicy::Strict {
        for column in table.columns() {
            if let Some(row) = column.data.first_missing() {
                return Err(ValidationError::MissingValues { column: column.name.clone(), row });
            }
        }
    }

    let mut seen = HashSet::with_capacity(dates.len());
    for (row, date) in dates.iter().enumerate() {
        if !seen.insert(date) {
            let label = index.labels()[row].clone();
            return Err(ValidationError::DuplicateDate { row, label });
        }
    }

    for Column { name, .. } in table.columns() {
        if name == INDEX_NAME || check_name(name).is_err() {
            return Err(ValidationError::ColumnName(name.clone()));
        }
    }

    Ok(dates)
}

/// Maps a validated table onto a dataset.
///
/// The file holds a `date` dimension and coordinate variable, plus one
/// variable per column along it:
///
/// - floats become `NC_DOUBLE` with `_FillValue = NaN`,
/// - integers become `NC_INT`, or `NC_INT64` when a value needs 64 bits,
/// - text becomes `NC_CHAR` along `(date, string<N>)`, NUL padded. When the
///   column has missing cells, the variable gets a `_FillValue` of `0xFF`
///   and missing rows hold that byte followed by NULs, so they stay distinct
///   from empty strings.
///
/// An empty table is written with `date` as the unlimited dimension, since a
/// fixed dimension cannot have length zero.
pub fn to_dataset(table: &Table, dates: &[NaiveDateTime]) -> Result<Dataset, EncodeError> {
    let mut dataset = Dataset::new();
    dataset.set_attribute(Attribute::text("Conventions", "CF-1.8"))?;

    let rows = dates.len();
    let date_dim = dataset.add_dimension(if rows == 0 {
        Dimension::unlimited(INDEX_NAME, 0)
    } else {
        Dimension::new(INDEX_NAME, rows)
    })?;

    let encoding = TimeEncoding::for_dates(dates);
    let offsets = dates.iter().map(|d| encoding.encode(d)).collect();
    dataset.add_variable(
        Variable::new(INDEX_NAME, vec![date_dim], Values::Double(offsets))
            .with_attribute(Attribute::text("units", &encoding.to_string()))
            .with_attribute(Attribute::text("calendar", CALENDAR)),
    )?;

    for column in table.columns() {
        let var = match &column.data {
            ColumnData::Float(v) => Variable::new(&column.name, vec![date_dim], Values::Double(v.clone()))
                .with_attribute(Attribute::new("_FillValue", Values::Double(vec![f64::NAN]))),
            ColumnData::Int(v) => {
                let values = match v.iter().map(|&x| i32::try_from(x)).collect::<Result<_, _>>() {
                    Ok(narrow) => Values::Int(narrow),
                    Err(_) => Values::Int64(v.clone()),
                };
                Variable::new(&column.name, vec![date_dim], values)
            }
            ColumnData::Text(v) => {
                let width = (v.iter().flatten()).map(String::len).max().unwrap_or(0).max(1);
                // Columns of equal width share the dimension.
                let strlen_name = format!("string{width}");
                let strlen = match dataset.dimension(&strlen_name) {
                    Some((id, _)) => id,
                    None => dataset.add_dimension(Dimension::new(strlen_name, width))?,
                };
                let mut chars = vec![0u8; rows * width];
                for (cell, s) in chars.chunks_exact_mut(width).zip(v) {
                    match s {
                        Some(s) => cell[..s.len()].copy_from_slice(s.as_bytes()),
                        None => cell[0] = TEXT_FILL,
                    }
                }
                let mut var = Variable::new(&column.name, vec![date_dim, strlen], Values::Char(chars))
                    .with_attribute(Attribute::text("_Encoding", "utf-8"));
                if column.data.first_missing().is_some() {
                    let fill = Attribute::new("_FillValue", Values::Char(vec![TEXT_FILL]));
                    var = var.with_attribute(fill);
                }
                var
            }
        };
        dataset.add_variable(var)?;
    }
    Ok(dataset)
}

/// Rebuilds a table from a dataset with a `date` coordinate axis.
///
/// Every other variable must be laid out along `date` alone (or
/// `(date, string<N>)` for text). `_FillValue` and `missing_value` cells of
/// numeric variables become NaN; `scale_factor` and `add_offset` are applied.
pub fn from_dataset(dataset: &Dataset) -> Result<Table, FormatError> {
    let (date_dim, _) = dataset.dimension(INDEX_NAME).ok_or(FormatError::MissingDateAxis)?;
    let date_var = dataset
        .variable(INDEX_NAME)
        .filter(|v| v.dims == [date_dim])
        .ok_or(FormatError::MissingDateAxis)?;

    if let Some(calendar) = date_var.attribute("calendar") {
        let calendar = calendar.as_text().unwrap_or_default().to_ascii_lowercase();
        if !GREGORIAN_CALENDARS.contains(&calendar.as_str()) {
            return Err(FormatError::Calendar(calendar));
        }
    }
    let units = date_var.attribute("units").and_then(Values::as_text).unwrap_or_default();
    let encoding = TimeEncoding::parse(units).ok_or_else(|| FormatError::DateUnits(units.into()))?;
    let offsets = (date_var.values.to_f64_vec())
        .ok_or_else(|| FormatError::UnsupportedVariable(INDEX_NAME.to_string()))?;
    let labels = offsets
        .iter()
        .map(|&x| encoding.decode(x).map(|d| format_label(&d)).ok_or(FormatError::DateRange(x)))
        .collect::<Result<Vec<_>, _>>()?;
    trace!("decoded {} dates with units {encoding}", labels.len());

    let rows = labels.len();
    let mut table = Table::new(Index::named(INDEX_NAME, labels));
    for var in dataset.variables().iter().filter(|v| v.name != INDEX_NAME) {
        let data = match (var.dims.as_slice(), &var.values) {
            ([d], values) if *d == date_dim && !matches!(values, Values::Char(_)) => {
                numeric_column(var)?
            }
            ([d, s], Values::Char(bytes)) if *d == date_dim && *s != date_dim => {
                let width = dataset.dimensions()[*s].len;
                text_column(var, bytes, rows, width)?
            }
            _ => return Err(FormatError::UnsupportedVariable(var.name.clone())),
        };
        // Names are unique in a dataset and every column spans `rows`.
        if table.push_column(&var.name, data).is_err() {
            return Err(FormatError::UnsupportedVariable(var.name.clone()));
        }
    }
    Ok(table)
}

fn numeric_column(var: &Variable) -> Result<ColumnData, FormatError> {
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| var.attribute(name)?.first_f64())
        .filter(|x| !x.is_nan())
        .collect();
    let scale = var.attribute("scale_factor").and_then(Values::first_f64);
    let offset = var.attribute("add_offset").and_then(Values::first_f64);
    let is_float = matches!(var.values, Values::Float(_) | Values::Double(_));

    if !is_float && scale.is_none() && offset.is_none() {
        if let Some(ints) = var.values.to_i64_vec() {
            let masked = ints.iter().any(|&x| fills.contains(&(x as f64)));
            if !masked {
                return Ok(ColumnData::Int(ints));
            }
        }
    }
    let values = (var.values.to_f64_vec())
        .ok_or_else(|| FormatError::UnsupportedVariable(var.name.clone()))?;
    Ok(ColumnData::Float(
        values
            .into_iter()
            .map(|x| {
                if fills.contains(&x) {
                    return f64::NAN;
                }
                let x = scale.map_or(x, |s| x * s);
                offset.map_or(x, |o| x + o)
            })
            .collect(),
    ))
}

fn text_column(
    var: &Variable,
    bytes: &[u8],
    rows: usize,
    width: usize,
) -> Result<ColumnData, FormatError> {
    // Other writers use a NUL fill, which makes all-NUL rows missing.
    let fill = match var.attribute("_FillValue") {
        Some(Values::Char(fill)) => fill.first().copied(),
        _ => None,
    };
    let mut cells = Vec::with_capacity(rows);
    for row in 0..rows {
        let cell = &bytes[row * width..(row + 1) * width];
        if fill.is_some_and(|f| cell[0] == f && cell[1..].iter().all(|&b| b == 0)) {
            cells.push(None);
            continue;
        }
        let end = cell.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let text = std::str::from_utf8(&cell[..end])
            .map_err(|_| FormatError::TextUtf8 { variable: var.name.clone(), row })?;
        cells.push(Some(text.to_string()));
    }
    Ok(ColumnData::Text(cells))
}

/// Exports `table` to `<output_dir>/<output_name>.nc`.
///
/// The table is validated (see [`validate`]) before anything touches the
/// filesystem. `output_dir` is created with its parents if needed, and an
/// existing file at the target path is overwritten.
///
/// # Example
///
/// ```no_run
/// use cdf_table::{export, Index, MissingPolicy, Table};
///
/// let table = Table::new(Index::named("date", ["2000-01-01", "2000-01-02", "2000-01-03"]))
///     .with_column("value", vec![1.0, f64::NAN, 3.0])?;
/// assert!(export(&table, "out", "prices", MissingPolicy::Strict).is_err());
/// export(&table, "out", "prices", MissingPolicy::Permissive)?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub fn export<P: AsRef<Path>>(
    table: &Table,
    output_dir: P,
    output_name: &str,
    policy: MissingPolicy,
) -> Result<(), ExportError> {
    let dates = validate(table, policy)?;
    let dataset = to_dataset(table, &dates)?;
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, output_name);
    debug!(
        "exporting {} rows x {} columns to {}",
        table.num_rows(),
        table.num_columns(),
        path.display()
    );
    write_cdf(&path, &dataset)?;
    Ok(())
}

/// Imports a table previously written by [`export`].
///
/// The index of the returned table is named `date` and holds canonical date
/// labels; columns follow the variable order of the file.
///
/// # Example
///
/// ```no_run
/// use cdf_table::import;
///
/// let table = import("out/prices.nc")?;
/// println!("{} rows", table.num_rows());
/// # Ok::<_, cdf_table::ImportError>(())
/// ```
pub fn import<P: AsRef<Path>>(file_path: P) -> Result<Table, ImportError> {
    let file_path = file_path.as_ref();
    debug!("importing {}", file_path.display());
    let dataset = read_cdf(file_path)?;
    Ok(from_dataset(&dataset)?)
}
