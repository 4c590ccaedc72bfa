use crate::dataset::{each_values, NcType, Values};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Values, attribute payloads and header fields are aligned to this many
/// bytes.
pub(crate) const ALIGN: usize = 4;

/// Number of zero bytes needed to pad `len` bytes to [`ALIGN`].
pub(crate) const fn padding(len: usize) -> usize {
    (ALIGN - len % ALIGN) % ALIGN
}

/// A primitive element type that can be stored in a NetCDF classic file.
///
/// All multi-byte values are big-endian on disk. `u8` maps to `NC_UBYTE`;
/// text (`NC_CHAR`) is handled by [`Values::Char`] directly.
pub trait Element: Sized + Copy {
    /// The external type used for this element.
    const NC_TYPE: NcType;

    /// Reads exactly `len` elements.
    fn read_vec<R: io::Read>(reader: R, len: usize) -> io::Result<Vec<Self>>;

    /// Writes all elements of `slice`.
    fn write_slice<W: io::Write>(slice: &[Self], writer: W) -> io::Result<()>;

    /// Borrows the elements if `values` holds this type.
    fn from_values(values: &Values) -> Option<&[Self]>;

    /// Wraps a vector of elements.
    fn into_values(vec: Vec<Self>) -> Values;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $read_into:ident, $write:ident) => {
        impl Element for $ty {
            const NC_TYPE: NcType = NcType::$variant;

            fn read_vec<R: io::Read>(mut reader: R, len: usize) -> io::Result<Vec<Self>> {
                let mut out = vec![<$ty>::default(); len];
                reader.$read_into::<BigEndian>(&mut out)?;
                Ok(out)
            }

            fn write_slice<W: io::Write>(slice: &[Self], mut writer: W) -> io::Result<()> {
                for &elem in slice {
                    writer.$write::<BigEndian>(elem)?;
                }
                Ok(())
            }

            fn from_values(values: &Values) -> Option<&[Self]> {
                match values {
                    Values::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn into_values(vec: Vec<Self>) -> Values {
                Values::$variant(vec)
            }
        }
    };
}

impl_element!(i16, Short, read_i16_into, write_i16);
impl_element!(i32, Int, read_i32_into, write_i32);
impl_element!(f32, Float, read_f32_into, write_f32);
impl_element!(f64, Double, read_f64_into, write_f64);
impl_element!(u16, UShort, read_u16_into, write_u16);
impl_element!(u32, UInt, read_u32_into, write_u32);
impl_element!(i64, Int64, read_i64_into, write_i64);
impl_element!(u64, UInt64, read_u64_into, write_u64);

impl Element for i8 {
    const NC_TYPE: NcType = NcType::Byte;

    fn read_vec<R: io::Read>(mut reader: R, len: usize) -> io::Result<Vec<Self>> {
        let mut out = vec![0; len];
        reader.read_i8_into(&mut out)?;
        Ok(out)
    }

    fn write_slice<W: io::Write>(slice: &[Self], mut writer: W) -> io::Result<()> {
        for &elem in slice {
            writer.write_i8(elem)?;
        }
        Ok(())
    }

    fn from_values(values: &Values) -> Option<&[Self]> {
        match values {
            Values::Byte(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn into_values(vec: Vec<Self>) -> Values {
        Values::Byte(vec)
    }
}

impl Element for u8 {
    const NC_TYPE: NcType = NcType::UByte;

    fn read_vec<R: io::Read>(reader: R, len: usize) -> io::Result<Vec<Self>> {
        read_bytes(reader, len)
    }

    fn write_slice<W: io::Write>(slice: &[Self], mut writer: W) -> io::Result<()> {
        writer.write_all(slice)
    }

    fn from_values(values: &Values) -> Option<&[Self]> {
        match values {
            Values::UByte(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn into_values(vec: Vec<Self>) -> Values {
        Values::UByte(vec)
    }
}

fn read_bytes<R: io::Read>(mut reader: R, len: usize) -> io::Result<Vec<u8>> {
    let mut out = vec![0; len];
    reader.read_exact(&mut out)?;
    Ok(out)
}

impl Values {
    /// Reads `len` elements of type `nc_type`, without trailing padding.
    pub(crate) fn read<R: io::Read>(nc_type: NcType, len: usize, reader: R) -> io::Result<Self> {
        Ok(match nc_type {
            NcType::Byte => Values::Byte(i8::read_vec(reader, len)?),
            NcType::Char => Values::Char(read_bytes(reader, len)?),
            NcType::Short => Values::Short(i16::read_vec(reader, len)?),
            NcType::Int => Values::Int(i32::read_vec(reader, len)?),
            NcType::Float => Values::Float(f32::read_vec(reader, len)?),
            NcType::Double => Values::Double(f64::read_vec(reader, len)?),
            NcType::UByte => Values::UByte(u8::read_vec(reader, len)?),
            NcType::UShort => Values::UShort(u16::read_vec(reader, len)?),
            NcType::UInt => Values::UInt(u32::read_vec(reader, len)?),
            NcType::Int64 => Values::Int64(i64::read_vec(reader, len)?),
            NcType::UInt64 => Values::UInt64(u64::read_vec(reader, len)?),
        })
    }

    /// Writes the elements in `range`, without padding.
    pub(crate) fn write_range<W: io::Write>(
        &self,
        range: std::ops::Range<usize>,
        mut writer: W,
    ) -> io::Result<()> {
        match self {
            Values::Char(v) => writer.write_all(&v[range]),
            Values::Byte(v) => i8::write_slice(&v[range], writer),
            Values::Short(v) => i16::write_slice(&v[range], writer),
            Values::Int(v) => i32::write_slice(&v[range], writer),
            Values::Float(v) => f32::write_slice(&v[range], writer),
            Values::Double(v) => f64::write_slice(&v[range], writer),
            Values::UByte(v) => u8::write_slice(&v[range], writer),
            Values::UShort(v) => u16::write_slice(&v[range], writer),
            Values::UInt(v) => u32::write_slice(&v[range], writer),
            Values::Int64(v) => i64::write_slice(&v[range], writer),
            Values::UInt64(v) => u64::write_slice(&v[range], writer),
        }
    }

    /// Writes all elements followed by zero padding to [`ALIGN`].
    pub(crate) fn write_padded<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        let len = each_values!(self, v => v.len());
        self.write_range(0..len, &mut writer)?;
        write_padding(writer, len * self.nc_type().size())
    }
}

/// Writes the zero padding that follows `len` bytes of payload.
pub(crate) fn write_padding<W: io::Write>(mut writer: W, len: usize) -> io::Result<()> {
    const ZEROS: [u8; ALIGN] = [0; ALIGN];
    writer.write_all(&ZEROS[..padding(len)])
}

/// Skips the padding that follows `len` bytes of payload.
pub(crate) fn skip_padding<R: io::Read>(mut reader: R, len: usize) -> io::Result<()> {
    let mut buf = [0; ALIGN];
    reader.read_exact(&mut buf[..padding(len)])
}
