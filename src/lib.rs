#![doc = include_str!("../README.md")]
//! ## Convert Tables
//!
//! - [`export`] a date-indexed [`Table`] to `<dir>/<name>.nc`, choosing a
//!   [`MissingPolicy`] for missing cells
//! - [`import`] it back
//! - The steps on their own: [`validate`], [`to_dataset`], [`from_dataset`]
//!   and [`output_path`]
//!
//! ## Operate NetCDF Classic Files
//!
//! - Reading
//!   - [`Dataset::read_cdf`] from any seekable reader
//!   - [`read_cdf`] convenience function
//! - Writing
//!   - [`Dataset::write_cdf`] to any writer
//!   - [`write_cdf`] convenience function
//!
//! The file version is chosen on write: CDF-1 when everything fits, CDF-2 for
//! 64-bit offsets and CDF-5 for 64-bit counts or extended types such as
//! `NC_INT64`. All three are accepted on read.
//!
//! ## Limitations
//!
//! - The date axis is written in the proleptic Gregorian calendar, and only
//!   Gregorian calendars are accepted on import.
//!
//! - Imported variables must be laid out along the `date` dimension alone
//!   (or `date` and a string-length dimension for text).
//!
//! - Files are read whole. NetCDF-4 (HDF5-based) files are not supported.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs)]

mod cdf;
mod convert;
mod dataset;
mod dates;
mod table;

#[cfg(feature = "ndarray")]
mod impl_ndarray;

pub use crate::{
    cdf::{read_cdf, write_cdf, Element, EncodeError, FormatError, ReadCdfError, WriteCdfError},
    convert::{
        export, from_dataset, import, output_path, to_dataset, validate, ExportError, ImportError,
        MissingPolicy, ValidationError, FILE_EXTENSION, INDEX_NAME,
    },
    dataset::{Attribute, Dataset, Dimension, NcType, Values, Variable},
    dates::{format_label, parse_label, TimeEncoding, TimeUnit},
    table::{Column, ColumnData, Index, Table, TableError},
};
