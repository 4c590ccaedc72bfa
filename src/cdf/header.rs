use super::{
    elements::{padding, skip_padding, write_padding},
    EncodeError, ReadCdfError, WriteCdfError,
};
use crate::dataset::{Attribute, Dataset, Dimension, NcType, Values};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::ToPrimitive;
use std::{
    error::Error,
    fmt,
    io::{self, Read},
};

/// Magic string to indicate the classic format; followed by a version byte.
const MAGIC_STRING: &[u8] = b"CDF";

/// List tags.
const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;

/// An error parsing a NetCDF classic file, or mapping its contents to a
/// table.
#[derive(Debug)]
pub enum FormatError {
    /// The start of the file does not match the magic string.
    MagicString,
    /// The version byte is not 1, 2 or 5.
    Version(u8),
    /// A list started with an unexpected tag.
    UnexpectedTag {
        /// Tag of the expected list.
        expected: u32,
        /// Tag found in the file.
        found: u32,
    },
    /// Unknown (or, outside CDF-5, unsupported) external type.
    UnknownType(u32),
    /// A name is not valid UTF-8.
    NameUtf8(std::str::Utf8Error),
    /// A variable refers to a dimension that does not exist.
    DimensionId {
        /// Variable name.
        variable: String,
        /// Offending dimension id.
        id: usize,
    },
    /// The unlimited dimension is used at a position other than the first.
    UnlimitedNotFirst(String),
    /// A count, offset or size does not fit in `usize`.
    LengthOverflow,
    /// The file ends before all data described in the header.
    MissingData,
    /// There is no `date` dimension with a matching coordinate variable.
    MissingDateAxis,
    /// The `units` attribute of the date axis is absent or not a CF time unit.
    DateUnits(String),
    /// The date axis uses a calendar other than the Gregorian one.
    Calendar(String),
    /// A date value is not finite or outside the representable range.
    DateRange(f64),
    /// A variable is not laid out along the date axis only.
    UnsupportedVariable(String),
    /// A text variable holds invalid UTF-8.
    TextUtf8 {
        /// Variable name.
        variable: String,
        /// Row of the offending cell.
        row: usize,
    },
}

impl Error for FormatError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NameUtf8(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MagicString => write!(f, "start does not match magic string"),
            Self::Version(version) => write!(f, "unknown version number: {version}"),
            Self::UnexpectedTag { expected, found } => {
                write!(f, "expected list tag {expected:#04x}, found {found:#x}")
            }
            Self::UnknownType(code) => write!(f, "unknown external type: {code}"),
            Self::NameUtf8(err) => write!(f, "error parsing name as UTF-8: {err}"),
            Self::DimensionId { variable, id } => {
                write!(f, "variable {variable:?} refers to unknown dimension id {id}")
            }
            Self::UnlimitedNotFirst(name) => {
                write!(f, "variable {name:?} uses the unlimited dimension after the first position")
            }
            Self::LengthOverflow => write!(f, "overflow computing length"),
            Self::MissingData => write!(f, "reached EOF before reading all data"),
            Self::MissingDateAxis => write!(f, "file has no 'date' coordinate axis"),
            Self::DateUnits(units) => write!(f, "unsupported date units: {units:?}"),
            Self::Calendar(calendar) => write!(f, "unsupported calendar: {calendar:?}"),
            Self::DateRange(value) => write!(f, "date value {value} is out of range"),
            Self::UnsupportedVariable(name) => {
                write!(f, "variable {name:?} is not laid out along the date axis")
            }
            Self::TextUtf8 { variable, row } => {
                write!(f, "variable {variable:?} holds invalid UTF-8 at row {row}")
            }
        }
    }
}

impl From<std::str::Utf8Error> for FormatError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::NameUtf8(err)
    }
}

/// Variants of the classic format, identified by the byte after the magic
/// string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    /// CDF-1: 32-bit offsets.
    Classic,
    /// CDF-2: 64-bit offsets.
    Offset64,
    /// CDF-5: 64-bit counts and the extended integer types.
    Data64,
}

impl Version {
    fn from_byte(byte: u8) -> Result<Self, FormatError> {
        match byte {
            1 => Ok(Self::Classic),
            2 => Ok(Self::Offset64),
            5 => Ok(Self::Data64),
            other => Err(FormatError::Version(other)),
        }
    }

    /// The version byte.
    pub const fn byte(self) -> u8 {
        match self {
            Self::Classic => 1,
            Self::Offset64 => 2,
            Self::Data64 => 5,
        }
    }

    /// Largest count (`nelems`, dimension length) this version can hold.
    const fn max_count(self) -> u64 {
        match self {
            Self::Classic | Self::Offset64 => i32::MAX as u64,
            Self::Data64 => i64::MAX as u64,
        }
    }

    /// `numrecs` value of a file still being written.
    const fn streaming(self) -> u64 {
        match self {
            Self::Classic | Self::Offset64 => 0xFFFF_FFFF,
            Self::Data64 => u64::MAX,
        }
    }

    /// Largest variable offset this version can hold.
    const fn max_offset(self) -> u64 {
        match self {
            Self::Classic => i32::MAX as u64,
            Self::Offset64 | Self::Data64 => i64::MAX as u64,
        }
    }

    fn read_count<R: io::Read>(self, mut reader: R) -> Result<u64, ReadCdfError> {
        Ok(match self {
            Self::Classic | Self::Offset64 => u64::from(reader.read_u32::<BigEndian>()?),
            Self::Data64 => reader.read_u64::<BigEndian>()?,
        })
    }

    fn read_len<R: io::Read>(self, reader: R) -> Result<usize, ReadCdfError> {
        let count = self.read_count(reader)?;
        Ok(count.to_usize().ok_or(FormatError::LengthOverflow)?)
    }

    fn write_count<W: io::Write>(self, mut writer: W, count: u64) -> Result<(), WriteCdfError> {
        if count > self.max_count() {
            return Err(EncodeError::TooLarge { what: "count", value: count }.into());
        }
        match self {
            Self::Classic | Self::Offset64 => writer.write_u32::<BigEndian>(count as u32)?,
            Self::Data64 => writer.write_u64::<BigEndian>(count)?,
        }
        Ok(())
    }

    fn read_offset<R: io::Read>(self, mut reader: R) -> Result<u64, ReadCdfError> {
        Ok(match self {
            Self::Classic => reader.read_u32::<BigEndian>()?.into(),
            Self::Offset64 | Self::Data64 => reader.read_u64::<BigEndian>()?,
        })
    }

    fn write_offset<W: io::Write>(self, mut writer: W, offset: u64) -> io::Result<()> {
        match self {
            Self::Classic => writer.write_u32::<BigEndian>(offset as u32),
            Self::Offset64 | Self::Data64 => writer.write_u64::<BigEndian>(offset),
        }
    }

    /// Reads `vsize`, which is only advisory; readers recompute sizes.
    fn read_vsize<R: io::Read>(self, mut reader: R) -> Result<u64, ReadCdfError> {
        Ok(match self {
            Self::Classic | Self::Offset64 => reader.read_u32::<BigEndian>()?.into(),
            Self::Data64 => reader.read_u64::<BigEndian>()?,
        })
    }

    /// Writes `vsize`, saturating where the version cannot hold it.
    fn write_vsize<W: io::Write>(self, mut writer: W, vsize: u64) -> io::Result<()> {
        match self {
            Self::Classic | Self::Offset64 => {
                writer.write_u32::<BigEndian>(vsize.min(u64::from(u32::MAX)) as u32)
            }
            Self::Data64 => writer.write_u64::<BigEndian>(vsize),
        }
    }
}

/// Per-variable header entry.
#[derive(Clone, Debug)]
pub(crate) struct VarHeader {
    pub name: String,
    pub dim_ids: Vec<usize>,
    pub attrs: Vec<Attribute>,
    pub nc_type: NcType,
    /// Bytes per variable (per record for record variables), padded.
    pub vsize: u64,
    pub begin: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct Header {
    pub version: Version,
    /// `None` for a streaming file whose record count is not yet known.
    pub numrecs: Option<usize>,
    pub dims: Vec<Dimension>,
    pub attrs: Vec<Attribute>,
    pub vars: Vec<VarHeader>,
}

impl Header {
    pub(crate) fn from_reader<R: io::Read>(mut reader: R) -> Result<Self, ReadCdfError> {
        // Check for magic string
        {
            let mut buf = [0; MAGIC_STRING.len()];
            reader.read_exact(&mut buf)?;
            if buf != MAGIC_STRING {
                Err(FormatError::MagicString)?;
            }
        }
        let version = Version::from_byte(reader.read_u8()?)?;

        let numrecs = match version.read_count(&mut reader)? {
            n if n == version.streaming() => None,
            n => Some(n.to_usize().ok_or(FormatError::LengthOverflow)?),
        };

        let mut dims = Vec::new();
        for _ in 0..read_list_len(version, NC_DIMENSION, &mut reader)? {
            let name = read_name(version, &mut reader)?;
            let len = version.read_len(&mut reader)?;
            dims.push(if len == 0 {
                Dimension::unlimited(name, numrecs.unwrap_or(0))
            } else {
                Dimension::new(name, len)
            });
        }

        let attrs = read_attributes(version, &mut reader)?;

        let mut vars = Vec::new();
        for _ in 0..read_list_len(version, NC_VARIABLE, &mut reader)? {
            let name = read_name(version, &mut reader)?;
            let ndims = version.read_len(&mut reader)?;
            let mut dim_ids = Vec::with_capacity(ndims.min(dims.len()));
            for pos in 0..ndims {
                let id = version.read_len(&mut reader)?;
                let Some(dim) = dims.get(id) else {
                    return Err(FormatError::DimensionId { variable: name, id }.into());
                };
                if dim.unlimited && pos != 0 {
                    Err(FormatError::UnlimitedNotFirst(name.clone()))?;
                }
                dim_ids.push(id);
            }
            let attrs = read_attributes(version, &mut reader)?;
            let nc_type = read_type(version, &mut reader)?;
            let vsize = version.read_vsize(&mut reader)?;
            let begin = version.read_offset(&mut reader)?;
            vars.push(VarHeader { name, dim_ids, attrs, nc_type, vsize, begin });
        }

        Ok(Self { version, numrecs, dims, attrs, vars })
    }

    /// Lays out `dataset` in the smallest version able to hold it.
    ///
    /// Variable data follows the header directly: fixed-size variables in
    /// order, then the interleaved records.
    pub(crate) fn layout(dataset: &Dataset) -> Result<Self, WriteCdfError> {
        let extended = dataset.variables().iter().any(|v| v.values.nc_type().is_extended())
            || dataset.attributes().iter().any(|a| a.value.nc_type().is_extended())
            || (dataset.variables().iter())
                .flat_map(|v| &v.attrs)
                .any(|a| a.value.nc_type().is_extended());
        let candidates: &[Version] = if extended {
            &[Version::Data64]
        } else {
            &[Version::Classic, Version::Offset64, Version::Data64]
        };
        let mut last_err = None;
        for &version in candidates {
            match Self::layout_as(dataset, version) {
                Ok(header) => return Ok(header),
                Err(WriteCdfError::Encode(err @ EncodeError::TooLarge { .. })) => {
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        let err = last_err.unwrap_or(EncodeError::TooLarge { what: "dataset", value: u64::MAX });
        Err(err.into())
    }

    fn layout_as(dataset: &Dataset, version: Version) -> Result<Self, WriteCdfError> {
        let too_large = || EncodeError::TooLarge { what: "variable size", value: u64::MAX };
        let mut vars = Vec::with_capacity(dataset.variables().len());
        for var in dataset.variables() {
            let record = dataset.is_record_variable(var);
            let dims = if record { &var.dims[1..] } else { &var.dims[..] };
            let elems = dims
                .iter()
                .try_fold(1u64, |acc, &id| acc.checked_mul(dataset.dimensions()[id].len as u64))
                .ok_or_else(too_large)?;
            let bytes = elems
                .checked_mul(var.values.nc_type().size() as u64)
                .ok_or_else(too_large)?;
            vars.push(VarHeader {
                name: var.name.clone(),
                dim_ids: var.dims.clone(),
                attrs: var.attrs.clone(),
                nc_type: var.values.nc_type(),
                vsize: bytes + padding(bytes as usize) as u64,
                begin: 0,
            });
        }
        let mut header = Self {
            version,
            numrecs: Some(dataset.num_records().unwrap_or(0)),
            dims: dataset.dimensions().to_vec(),
            attrs: dataset.attributes().to_vec(),
            vars,
        };

        // The header length does not depend on the `begin` values.
        let mut offset = header.to_bytes()?.len() as u64;
        let is_record: Vec<bool> = (dataset.variables().iter())
            .map(|v| dataset.is_record_variable(v))
            .collect();
        // Fixed-size variables first, then the record variables, each placed
        // at its offset within the first record.
        for record in [false, true] {
            for (var, _) in (header.vars.iter_mut().zip(&is_record)).filter(|(_, &r)| r == record) {
                var.begin = offset;
                offset = offset.checked_add(var.vsize).ok_or_else(too_large)?;
            }
        }
        if let Some(var) = header.vars.iter().find(|v| v.begin > version.max_offset()) {
            return Err(EncodeError::TooLarge { what: "offset", value: var.begin }.into());
        }
        Ok(header)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, WriteCdfError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    pub(crate) fn write<W: io::Write>(&self, mut writer: W) -> Result<(), WriteCdfError> {
        let version = self.version;
        writer.write_all(MAGIC_STRING)?;
        writer.write_u8(version.byte())?;
        version.write_count(&mut writer, self.numrecs.unwrap_or(0) as u64)?;

        write_list_len(version, NC_DIMENSION, self.dims.len(), &mut writer)?;
        for dim in &self.dims {
            write_name(version, &dim.name, &mut writer)?;
            let len = if dim.unlimited { 0 } else { dim.len as u64 };
            version.write_count(&mut writer, len)?;
        }

        write_attributes(version, &self.attrs, &mut writer)?;

        write_list_len(version, NC_VARIABLE, self.vars.len(), &mut writer)?;
        for var in &self.vars {
            write_name(version, &var.name, &mut writer)?;
            version.write_count(&mut writer, var.dim_ids.len() as u64)?;
            for &id in &var.dim_ids {
                version.write_count(&mut writer, id as u64)?;
            }
            write_attributes(version, &var.attrs, &mut writer)?;
            writer.write_u32::<BigEndian>(var.nc_type.code())?;
            version.write_vsize(&mut writer, var.vsize)?;
            version.write_offset(&mut writer, var.begin)?;
        }
        Ok(())
    }
}

/// Reads a list tag and its element count. `ABSENT` (two zeros) yields 0.
fn read_list_len<R: io::Read>(
    version: Version,
    expected: u32,
    mut reader: R,
) -> Result<usize, ReadCdfError> {
    let tag = reader.read_u32::<BigEndian>()?;
    let len = version.read_len(&mut reader)?;
    match tag {
        0 if len == 0 => Ok(0),
        tag if tag == expected => Ok(len),
        found => Err(FormatError::UnexpectedTag { expected, found }.into()),
    }
}

fn write_list_len<W: io::Write>(
    version: Version,
    tag: u32,
    len: usize,
    mut writer: W,
) -> Result<(), WriteCdfError> {
    writer.write_u32::<BigEndian>(if len == 0 { 0 } else { tag })?;
    version.write_count(writer, len as u64)
}

/// Reads `len` bytes without trusting `len` for the allocation, so a corrupt
/// count hits EOF instead.
fn read_exact_vec<R: io::Read>(reader: R, len: usize) -> Result<Vec<u8>, ReadCdfError> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        Err(FormatError::MissingData)?;
    }
    Ok(buf)
}

fn read_name<R: io::Read>(version: Version, mut reader: R) -> Result<String, ReadCdfError> {
    let len = version.read_len(&mut reader)?;
    let buf = read_exact_vec(&mut reader, len)?;
    skip_padding(&mut reader, len)?;
    let name = std::str::from_utf8(&buf).map_err(FormatError::from)?;
    Ok(name.to_string())
}

fn write_name<W: io::Write>(
    version: Version,
    name: &str,
    mut writer: W,
) -> Result<(), WriteCdfError> {
    version.write_count(&mut writer, name.len() as u64)?;
    writer.write_all(name.as_bytes())?;
    write_padding(writer, name.len())?;
    Ok(())
}

fn read_type<R: io::Read>(version: Version, mut reader: R) -> Result<NcType, ReadCdfError> {
    let code = reader.read_u32::<BigEndian>()?;
    match NcType::from_code(code) {
        Some(ty) if !ty.is_extended() || version == Version::Data64 => Ok(ty),
        _ => Err(FormatError::UnknownType(code).into()),
    }
}

fn read_attributes<R: io::Read>(
    version: Version,
    mut reader: R,
) -> Result<Vec<Attribute>, ReadCdfError> {
    let len = read_list_len(version, NC_ATTRIBUTE, &mut reader)?;
    let mut attrs = Vec::new();
    for _ in 0..len {
        let name = read_name(version, &mut reader)?;
        let nc_type = read_type(version, &mut reader)?;
        let nelems = version.read_len(&mut reader)?;
        let nbytes = (nelems.checked_mul(nc_type.size())).ok_or(FormatError::LengthOverflow)?;
        let payload = read_exact_vec(&mut reader, nbytes)?;
        let value = Values::read(nc_type, nelems, payload.as_slice())?;
        skip_padding(&mut reader, payload.len())?;
        attrs.push(Attribute { name, value });
    }
    Ok(attrs)
}

fn write_attributes<W: io::Write>(
    version: Version,
    attrs: &[Attribute],
    mut writer: W,
) -> Result<(), WriteCdfError> {
    write_list_len(version, NC_ATTRIBUTE, attrs.len(), &mut writer)?;
    for attr in attrs {
        write_name(version, &attr.name, &mut writer)?;
        writer.write_u32::<BigEndian>(attr.value.nc_type().code())?;
        version.write_count(&mut writer, attr.value.len() as u64)?;
        attr.value.write_padded(&mut writer)?;
    }
    Ok(())
}
