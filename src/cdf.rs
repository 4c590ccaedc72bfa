mod elements;
pub mod header;

pub use self::{elements::Element, header::FormatError};
use self::{
    elements::write_padding,
    header::{Header, VarHeader},
};
use crate::dataset::{Dataset, Dimension, Values, Variable};
use log::{debug, trace};
use num_traits::ToPrimitive;
use std::{fs, io, path::Path};
use thiserror::Error;

/// Read a NetCDF classic file located at the specified path.
///
/// This is a convenience function for `BufReader::new(File::open(path)?)`
/// followed by [`Dataset::read_cdf`].
///
/// # Example
///
/// ```no_run
/// use cdf_table::read_cdf;
/// # use cdf_table::ReadCdfError;
///
/// let dataset = read_cdf("prices.nc")?;
/// for var in dataset.variables() {
///     println!("{}: {} values", var.name, var.values.len());
/// }
/// # Ok::<_, ReadCdfError>(())
/// ```
pub fn read_cdf<P: AsRef<Path>>(path: P) -> Result<Dataset, ReadCdfError> {
    Dataset::read_cdf(io::BufReader::new(fs::File::open(path)?))
}

/// Writes a dataset to a NetCDF classic file at the specified path.
///
/// This function will create the file if it does not exist, or overwrite it if
/// it does. The layout is computed before the file is touched, so a dataset
/// that cannot be encoded leaves no file behind.
///
/// # Example
///
/// ```no_run
/// use cdf_table::{write_cdf, Dataset, Dimension, Values, Variable};
///
/// let mut dataset = Dataset::new();
/// let x = dataset.add_dimension(Dimension::new("x", 3))?;
/// dataset.add_variable(Variable::new("v", vec![x], Values::Double(vec![1., 2., 3.])))?;
/// write_cdf("v.nc", &dataset)?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub fn write_cdf<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<(), WriteCdfError> {
    let header = Header::layout(dataset)?;
    let file = fs::File::create(path)?;
    dataset.write_with_header(&header, io::BufWriter::new(file))
}

impl Dataset {
    /// Writes the dataset to `writer` in NetCDF classic format.
    ///
    /// The smallest file version able to hold the dataset is used: CDF-1
    /// unless offsets need 64 bits (CDF-2) or an extended type such as
    /// `NC_INT64` is present (CDF-5). For the sake of convenience, this
    /// method calls [`io::Write::flush()`] on the writer before returning.
    pub fn write_cdf<W: io::Write>(&self, writer: W) -> Result<(), WriteCdfError> {
        let header = Header::layout(self)?;
        self.write_with_header(&header, writer)
    }

    fn write_with_header<W: io::Write>(
        &self,
        header: &Header,
        mut writer: W,
    ) -> Result<(), WriteCdfError> {
        debug!(
            "writing CDF-{} with {} dimensions and {} variables",
            header.version.byte(),
            header.dims.len(),
            header.vars.len()
        );
        header.write(&mut writer)?;
        let (records, fixed): (Vec<_>, Vec<_>) = (self.variables().iter())
            .zip(&header.vars)
            .partition(|(var, _)| self.is_record_variable(var));
        for (var, _) in &fixed {
            var.values.write_padded(&mut writer)?;
        }
        let numrecs = header.numrecs.unwrap_or(0);
        for rec in 0..numrecs {
            for (var, _) in &records {
                let per_record = var.values.len() / numrecs;
                let start = rec * per_record;
                var.values.write_range(start..start + per_record, &mut writer)?;
                // A lone record variable is stored without per-record padding.
                if records.len() > 1 {
                    write_padding(&mut writer, per_record * var.values.nc_type().size())?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a dataset from `reader` in NetCDF classic format (CDF-1, CDF-2
    /// or CDF-5).
    ///
    /// The reader needs to seek because variable data is located through the
    /// offsets stored in the header.
    pub fn read_cdf<R: io::Read + io::Seek>(mut reader: R) -> Result<Self, ReadCdfError> {
        let header = Header::from_reader(&mut reader)?;
        let file_len = reader.seek(io::SeekFrom::End(0))?;
        let Header { version, numrecs, mut dims, attrs, vars } = header;
        trace!("read CDF-{} header with {} variables", version.byte(), vars.len());

        let shapes = (vars.iter())
            .map(|var| RecordShape::new(var, &dims))
            .collect::<Result<Vec<_>, _>>()?;
        let record_shapes: Vec<&RecordShape> = shapes.iter().filter(|s| s.record).collect();
        let recsize: u64 = match record_shapes.as_slice() {
            [only] => only.bytes,
            many => many.iter().map(|s| s.padded_bytes()).sum(),
        };
        let numrecs = match numrecs {
            Some(n) => n,
            None => {
                let first = (vars.iter().zip(&shapes))
                    .filter(|(_, s)| s.record)
                    .map(|(v, _)| v.begin)
                    .min();
                match first {
                    Some(begin) if recsize > 0 => {
                        let available = file_len.saturating_sub(begin);
                        (available / recsize).to_usize().ok_or(FormatError::LengthOverflow)?
                    }
                    _ => 0,
                }
            }
        };
        for dim in dims.iter_mut().filter(|d| d.unlimited) {
            dim.len = numrecs;
        }

        let mut variables = Vec::with_capacity(vars.len());
        for (var, shape) in vars.into_iter().zip(&shapes) {
            let values = if shape.record {
                read_record_values(&mut reader, &var, shape, numrecs, recsize, file_len)?
            } else {
                check_extent(var.begin, shape.bytes, file_len)?;
                reader.seek(io::SeekFrom::Start(var.begin))?;
                Values::read(var.nc_type, shape.elems, &mut reader)?
            };
            variables.push(Variable {
                name: var.name,
                dims: var.dim_ids,
                attrs: var.attrs,
                values,
            });
        }
        Ok(Self::from_parts(dims, attrs, variables))
    }
}

/// Size of a variable, per record for record variables.
struct RecordShape {
    record: bool,
    elems: usize,
    bytes: u64,
}

impl RecordShape {
    fn new(var: &VarHeader, dims: &[Dimension]) -> Result<Self, FormatError> {
        let record = var.dim_ids.first().is_some_and(|&id| dims[id].unlimited);
        let inner = if record { &var.dim_ids[1..] } else { &var.dim_ids[..] };
        let elems = (inner.iter())
            .try_fold(1usize, |acc, &id| acc.checked_mul(dims[id].len))
            .ok_or(FormatError::LengthOverflow)?;
        let bytes = (elems.checked_mul(var.nc_type.size()))
            .and_then(|b| b.to_u64())
            .ok_or(FormatError::LengthOverflow)?;
        Ok(Self { record, elems, bytes })
    }

    fn padded_bytes(&self) -> u64 {
        (self.bytes + 3) & !3
    }
}

fn check_extent(begin: u64, bytes: u64, file_len: u64) -> Result<(), FormatError> {
    match begin.checked_add(bytes) {
        Some(end) if end <= file_len => Ok(()),
        _ => Err(FormatError::MissingData),
    }
}

fn read_record_values<R: io::Read + io::Seek>(
    mut reader: R,
    var: &VarHeader,
    shape: &RecordShape,
    numrecs: usize,
    recsize: u64,
    file_len: u64,
) -> Result<Values, ReadCdfError> {
    let total = (shape.elems.checked_mul(numrecs)).ok_or(FormatError::LengthOverflow)?;
    if numrecs > 0 {
        let last = (numrecs as u64 - 1)
            .checked_mul(recsize)
            .and_then(|off| off.checked_add(var.begin))
            .ok_or(FormatError::LengthOverflow)?;
        check_extent(last, shape.bytes, file_len)?;
    }
    let chunk = shape.bytes as usize;
    let mut buf = vec![0; chunk * numrecs];
    for (rec, dst) in buf.chunks_exact_mut(chunk.max(1)).enumerate() {
        reader.seek(io::SeekFrom::Start(var.begin + rec as u64 * recsize))?;
        reader.read_exact(dst)?;
    }
    Ok(Values::read(var.nc_type, total, buf.as_slice())?)
}

/// An error creating or encoding a dataset.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The name is empty or contains `/` or control characters.
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    /// A dimension or variable with this name already exists.
    #[error("duplicate name: {0:?}")]
    DuplicateName(String),
    /// Only one dimension may be unlimited.
    #[error("second unlimited dimension: {0:?}")]
    MultipleUnlimited(String),
    /// The variable refers to a dimension that does not exist.
    #[error("variable {variable:?} refers to unknown dimension id {id}")]
    DimensionId {
        /// Variable name.
        variable: String,
        /// Offending dimension id.
        id: usize,
    },
    /// The unlimited dimension must be the first dimension of a variable.
    #[error("variable {0:?} uses the unlimited dimension after the first position")]
    UnlimitedNotFirst(String),
    /// The number of values does not match the variable's shape.
    #[error("variable {variable:?} has {found} values but its shape holds {expected}")]
    ShapeMismatch {
        /// Variable name.
        variable: String,
        /// Number of elements implied by the dimensions.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// A size or offset does not fit in any supported file version.
    #[error("{what} of {value} does not fit in any supported file version")]
    TooLarge {
        /// What overflowed.
        what: &'static str,
        /// The offending value.
        value: u64,
    },
}

/// An error writing a NetCDF classic file.
#[derive(Debug, Error)]
pub enum WriteCdfError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The dataset cannot be encoded.
    #[error("error encoding dataset: {0}")]
    Encode(#[from] EncodeError),
}

/// An error reading a NetCDF classic file.
#[derive(Debug, Error)]
pub enum ReadCdfError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// The file content is not a valid NetCDF classic file.
    #[error("error parsing file: {0}")]
    Format(#[from] FormatError),
}

impl From<io::Error> for ReadCdfError {
    /// Performs the conversion.
    ///
    /// If the error kind is `UnexpectedEof`, the `Format(MissingData)` variant
    /// is returned. Otherwise, the `Io` variant is returned.
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::Format(FormatError::MissingData),
            _ => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Attribute;
    use std::io::Cursor;

    fn round_trip(dataset: &Dataset) -> Dataset {
        let mut buf = Vec::new();
        dataset.write_cdf(&mut buf).unwrap();
        Dataset::read_cdf(Cursor::new(buf)).unwrap()
    }

    #[test]
    fn fixed_variables_round_trip() {
        let mut ds = Dataset::new();
        ds.set_attribute(Attribute::text("title", "test")).unwrap();
        let x = ds.add_dimension(Dimension::new("x", 3)).unwrap();
        let n = ds.add_dimension(Dimension::new("n", 2)).unwrap();
        ds.add_variable(Variable::new("a", vec![x], Values::Short(vec![1, -2, 3])))
            .unwrap();
        ds.add_variable(
            Variable::new("b", vec![x, n], Values::Char(b"abcdef".to_vec()))
                .with_attribute(Attribute::text("_Encoding", "utf-8")),
        )
        .unwrap();
        ds.add_variable(Variable::new("c", vec![], Values::Double(vec![f64::NAN])))
            .unwrap();
        let read = round_trip(&ds);
        assert_eq!(read.dimensions(), ds.dimensions());
        assert_eq!(read.attributes(), ds.attributes());
        assert_eq!(read.variable("a"), ds.variable("a"));
        assert_eq!(read.variable("b"), ds.variable("b"));
        let Values::Double(c) = &read.variable("c").unwrap().values else {
            panic!("wrong type");
        };
        assert!(c[0].is_nan());
    }

    #[test]
    fn record_variables_are_interleaved() {
        let mut ds = Dataset::new();
        let t = ds.add_dimension(Dimension::unlimited("t", 3)).unwrap();
        ds.add_variable(Variable::new("s", vec![t], Values::Short(vec![1, 2, 3])))
            .unwrap();
        ds.add_variable(Variable::new("d", vec![t], Values::Double(vec![1.5, 2.5, 3.5])))
            .unwrap();
        let mut buf = Vec::new();
        ds.write_cdf(&mut buf).unwrap();
        let header = Header::layout(&ds).unwrap();
        let data_start = header.vars[0].begin as usize;
        // Record 0: short (2 bytes + 2 padding), then double.
        assert_eq!(&buf[data_start..data_start + 4], [0, 1, 0, 0]);
        assert_eq!(&buf[data_start + 4..data_start + 12], 1.5f64.to_be_bytes());
        assert_eq!(buf.len(), data_start + 3 * 12);

        let read = Dataset::read_cdf(Cursor::new(buf)).unwrap();
        assert_eq!(read, ds);
    }

    #[test]
    fn lone_record_variable_is_unpadded() {
        let mut ds = Dataset::new();
        let t = ds.add_dimension(Dimension::unlimited("t", 3)).unwrap();
        ds.add_variable(Variable::new("s", vec![t], Values::Short(vec![7, 8, 9])))
            .unwrap();
        let mut buf = Vec::new();
        ds.write_cdf(&mut buf).unwrap();
        let begin = Header::layout(&ds).unwrap().vars[0].begin as usize;
        assert_eq!(&buf[begin..], [0, 7, 0, 8, 0, 9]);
        assert_eq!(round_trip(&ds), ds);
    }

    #[test]
    fn streaming_numrecs_is_derived_from_length() {
        let mut ds = Dataset::new();
        let t = ds.add_dimension(Dimension::unlimited("t", 2)).unwrap();
        ds.add_variable(Variable::new("v", vec![t], Values::Int(vec![10, 20])))
            .unwrap();
        let mut buf = Vec::new();
        ds.write_cdf(&mut buf).unwrap();
        buf[4..8].copy_from_slice(&[0xFF; 4]);
        let read = Dataset::read_cdf(Cursor::new(buf)).unwrap();
        assert_eq!(read.num_records(), Some(2));
        assert_eq!(read.variable("v").unwrap().values, Values::Int(vec![10, 20]));
    }

    #[test]
    fn truncated_data_is_a_format_error() {
        let mut ds = Dataset::new();
        let x = ds.add_dimension(Dimension::new("x", 4)).unwrap();
        ds.add_variable(Variable::new("v", vec![x], Values::Double(vec![0.0; 4])))
            .unwrap();
        let mut buf = Vec::new();
        ds.write_cdf(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            Dataset::read_cdf(Cursor::new(buf)),
            Err(ReadCdfError::Format(FormatError::MissingData))
        ));
    }

    #[test]
    fn int64_uses_cdf5() {
        let mut ds = Dataset::new();
        let x = ds.add_dimension(Dimension::new("x", 2)).unwrap();
        ds.add_variable(Variable::new("v", vec![x], Values::Int64(vec![i64::MIN, i64::MAX])))
            .unwrap();
        let mut buf = Vec::new();
        ds.write_cdf(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"CDF\x05");
        assert_eq!(round_trip(&ds), ds);
    }
}
