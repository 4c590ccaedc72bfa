//! In-memory model of a NetCDF classic dataset: named dimensions, attributes
//! and variables holding flat, row-major value buffers.

use crate::cdf::EncodeError;
use num_traits::ToPrimitive;

/// External data types of the NetCDF classic family.
///
/// The last five types are only representable in the 64-bit data (CDF-5)
/// variant of the format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NcType {
    /// 8-bit signed integer.
    Byte,
    /// 8-bit character (text is stored as arrays of these).
    Char,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Int,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// 8-bit unsigned integer.
    UByte,
    /// 16-bit unsigned integer.
    UShort,
    /// 32-bit unsigned integer.
    UInt,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit unsigned integer.
    UInt64,
}

impl NcType {
    /// Returns the type tag stored in the file header.
    pub const fn code(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Char => 2,
            Self::Short => 3,
            Self::Int => 4,
            Self::Float => 5,
            Self::Double => 6,
            Self::UByte => 7,
            Self::UShort => 8,
            Self::UInt => 9,
            Self::Int64 => 10,
            Self::UInt64 => 11,
        }
    }

    /// Looks up the type for a header tag.
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Byte,
            2 => Self::Char,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Float,
            6 => Self::Double,
            7 => Self::UByte,
            8 => Self::UShort,
            9 => Self::UInt,
            10 => Self::Int64,
            11 => Self::UInt64,
            _ => return None,
        })
    }

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Byte | Self::Char | Self::UByte => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::Float | Self::UInt => 4,
            Self::Double | Self::Int64 | Self::UInt64 => 8,
        }
    }

    /// Whether the type requires the CDF-5 file version.
    pub const fn is_extended(self) -> bool {
        matches!(
            self,
            Self::UByte | Self::UShort | Self::UInt | Self::Int64 | Self::UInt64
        )
    }
}

/// A typed, flat buffer of values, used for both attribute values and
/// variable data.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    /// `NC_BYTE` values.
    Byte(Vec<i8>),
    /// `NC_CHAR` values.
    Char(Vec<u8>),
    /// `NC_SHORT` values.
    Short(Vec<i16>),
    /// `NC_INT` values.
    Int(Vec<i32>),
    /// `NC_FLOAT` values.
    Float(Vec<f32>),
    /// `NC_DOUBLE` values.
    Double(Vec<f64>),
    /// `NC_UBYTE` values.
    UByte(Vec<u8>),
    /// `NC_USHORT` values.
    UShort(Vec<u16>),
    /// `NC_UINT` values.
    UInt(Vec<u32>),
    /// `NC_INT64` values.
    Int64(Vec<i64>),
    /// `NC_UINT64` values.
    UInt64(Vec<u64>),
}

/// Applies `$body` to the inner vector of every variant, binding it to `$v`.
macro_rules! each_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::Byte($v) => $body,
            Values::Char($v) => $body,
            Values::Short($v) => $body,
            Values::Int($v) => $body,
            Values::Float($v) => $body,
            Values::Double($v) => $body,
            Values::UByte($v) => $body,
            Values::UShort($v) => $body,
            Values::UInt($v) => $body,
            Values::Int64($v) => $body,
            Values::UInt64($v) => $body,
        }
    };
}
pub(crate) use each_values;

/// Same as [`each_values!`] but skips `Char`, which has no numeric meaning.
macro_rules! each_numeric {
    ($values:expr, $v:ident => $body:expr, Char => $char:expr) => {
        match $values {
            Values::Char(_) => $char,
            Values::Byte($v) => $body,
            Values::Short($v) => $body,
            Values::Int($v) => $body,
            Values::Float($v) => $body,
            Values::Double($v) => $body,
            Values::UByte($v) => $body,
            Values::UShort($v) => $body,
            Values::UInt($v) => $body,
            Values::Int64($v) => $body,
            Values::UInt64($v) => $body,
        }
    };
}

impl Values {
    /// Creates `NC_CHAR` values from a string.
    pub fn text(s: &str) -> Self {
        Self::Char(s.as_bytes().to_vec())
    }

    /// The external type of these values.
    pub fn nc_type(&self) -> NcType {
        match self {
            Self::Byte(_) => NcType::Byte,
            Self::Char(_) => NcType::Char,
            Self::Short(_) => NcType::Short,
            Self::Int(_) => NcType::Int,
            Self::Float(_) => NcType::Float,
            Self::Double(_) => NcType::Double,
            Self::UByte(_) => NcType::UByte,
            Self::UShort(_) => NcType::UShort,
            Self::UInt(_) => NcType::UInt,
            Self::Int64(_) => NcType::Int64,
            Self::UInt64(_) => NcType::UInt64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_values!(self, v => v.len())
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interprets `NC_CHAR` values as text, dropping trailing NUL padding.
    ///
    /// Returns `None` for other types or invalid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        let Self::Char(bytes) = self else {
            return None;
        };
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// Converts numeric values to `f64`. Returns `None` for `NC_CHAR`.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        each_numeric!(self, v => v.iter().map(|x| x.to_f64()).collect(), Char => None)
    }

    /// Converts numeric values to `i64`.
    ///
    /// Returns `None` for `NC_CHAR`, for non-integral floats and for values
    /// outside the `i64` range.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            Self::Float(v) => v.iter().map(|&x| integral(f64::from(x))).collect(),
            Self::Double(v) => v.iter().map(|&x| integral(x)).collect(),
            _ => each_numeric!(self, v => v.iter().map(|x| x.to_i64()).collect(), Char => None),
        }
    }

    /// Returns the first value as `f64`, if numeric and non-empty.
    pub fn first_f64(&self) -> Option<f64> {
        each_numeric!(self, v => v.first().and_then(|x| x.to_f64()), Char => None)
    }
}

fn integral(x: f64) -> Option<i64> {
    if x.fract() == 0.0 {
        x.to_i64()
    } else {
        None
    }
}

/// A named dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    /// Dimension name.
    pub name: String,
    /// Current length (the number of records for the unlimited dimension).
    pub len: usize,
    /// Whether this is the unlimited (record) dimension.
    pub unlimited: bool,
}

impl Dimension {
    /// A fixed-size dimension.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self { name: name.into(), len, unlimited: false }
    }

    /// The unlimited (record) dimension, currently holding `len` records.
    pub fn unlimited(name: impl Into<String>, len: usize) -> Self {
        Self { name: name.into(), len, unlimited: true }
    }
}

/// A named attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: Values,
}

impl Attribute {
    /// Creates an attribute.
    pub fn new(name: impl Into<String>, value: Values) -> Self {
        Self { name: name.into(), value }
    }

    /// Creates a text attribute.
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, Values::text(value))
    }
}

/// A variable: a typed array laid out along a list of dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Dimension ids (indices into [`Dataset::dimensions`]), slowest varying
    /// first.
    pub dims: Vec<usize>,
    /// Variable attributes.
    pub attrs: Vec<Attribute>,
    /// Row-major data.
    pub values: Values,
}

impl Variable {
    /// Creates a variable without attributes.
    pub fn new(name: impl Into<String>, dims: Vec<usize>, values: Values) -> Self {
        Self { name: name.into(), dims, attrs: Vec::new(), values }
    }

    /// Adds an attribute, builder style.
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Looks up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&Values> {
        find_attribute(&self.attrs, name)
    }
}

fn find_attribute<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Values> {
    attrs.iter().find(|a| a.name == name).map(|a| &a.value)
}

/// A NetCDF classic dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    dims: Vec<Dimension>,
    attrs: Vec<Attribute>,
    vars: Vec<Variable>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles a dataset decoded from a file without re-validating it.
    pub(crate) fn from_parts(
        dims: Vec<Dimension>,
        attrs: Vec<Attribute>,
        vars: Vec<Variable>,
    ) -> Self {
        Self { dims, attrs, vars }
    }

    /// Adds a dimension and returns its id.
    ///
    /// Fails if the name is taken, or if a second unlimited dimension is
    /// added.
    pub fn add_dimension(&mut self, dim: Dimension) -> Result<usize, EncodeError> {
        check_name(&dim.name)?;
        if self.dimension(&dim.name).is_some() {
            return Err(EncodeError::DuplicateName(dim.name));
        }
        if dim.unlimited && self.dims.iter().any(|d| d.unlimited) {
            return Err(EncodeError::MultipleUnlimited(dim.name));
        }
        self.dims.push(dim);
        Ok(self.dims.len() - 1)
    }

    /// Adds (or replaces) a global attribute.
    pub fn set_attribute(&mut self, attr: Attribute) -> Result<(), EncodeError> {
        check_name(&attr.name)?;
        match self.attrs.iter_mut().find(|a| a.name == attr.name) {
            Some(slot) => *slot = attr,
            None => self.attrs.push(attr),
        }
        Ok(())
    }

    /// Adds a variable.
    ///
    /// The variable's dimension ids must exist, the unlimited dimension may
    /// only appear first, and the number of values must match the shape.
    pub fn add_variable(&mut self, var: Variable) -> Result<(), EncodeError> {
        check_name(&var.name)?;
        if self.variable(&var.name).is_some() {
            return Err(EncodeError::DuplicateName(var.name));
        }
        for (pos, &id) in var.dims.iter().enumerate() {
            let dim = self.dims.get(id).ok_or_else(|| EncodeError::DimensionId {
                variable: var.name.clone(),
                id,
            })?;
            if dim.unlimited && pos != 0 {
                return Err(EncodeError::UnlimitedNotFirst(var.name));
            }
        }
        for attr in &var.attrs {
            check_name(&attr.name)?;
        }
        let expected = self
            .element_count(&var.dims)
            .ok_or_else(|| EncodeError::TooLarge { what: "variable length", value: u64::MAX })?;
        if expected != var.values.len() {
            return Err(EncodeError::ShapeMismatch {
                variable: var.name,
                expected,
                found: var.values.len(),
            });
        }
        self.vars.push(var);
        Ok(())
    }

    /// All dimensions, in id order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// Global attributes.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Variables, in file order.
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// Looks up a dimension by name, returning its id.
    pub fn dimension(&self, name: &str) -> Option<(usize, &Dimension)> {
        self.dims.iter().enumerate().find(|(_, d)| d.name == name)
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Looks up a global attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&Values> {
        find_attribute(&self.attrs, name)
    }

    /// The shape of `var`, using the current record count for the unlimited
    /// dimension.
    pub fn shape(&self, var: &Variable) -> Vec<usize> {
        var.dims.iter().map(|&id| self.dims[id].len).collect()
    }

    /// Whether `var` is laid out along the unlimited dimension.
    pub fn is_record_variable(&self, var: &Variable) -> bool {
        var.dims.first().is_some_and(|&id| self.dims[id].unlimited)
    }

    /// Number of records along the unlimited dimension, if there is one.
    pub fn num_records(&self) -> Option<usize> {
        self.dims.iter().find(|d| d.unlimited).map(|d| d.len)
    }

    fn element_count(&self, dims: &[usize]) -> Option<usize> {
        dims.iter()
            .try_fold(1usize, |acc, &id| acc.checked_mul(self.dims[id].len))
    }
}

/// Rejects names the file format cannot hold.
pub(crate) fn check_name(name: &str) -> Result<(), EncodeError> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_control) {
        return Err(EncodeError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for code in 1..=11 {
            let ty = NcType::from_code(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert_eq!(NcType::from_code(0), None);
        assert_eq!(NcType::from_code(12), None);
        assert!(NcType::Int64.is_extended());
        assert!(!NcType::Double.is_extended());
    }

    #[test]
    fn text_drops_nul_padding() {
        let values = Values::Char(b"abc\0\0".to_vec());
        assert_eq!(values.as_text(), Some("abc"));
        assert_eq!(Values::Char(vec![0, 0]).as_text(), Some(""));
        assert_eq!(Values::Int(vec![1]).as_text(), None);
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(Values::Short(vec![1, -2]).to_f64_vec(), Some(vec![1.0, -2.0]));
        assert_eq!(Values::Double(vec![3.0, 4.0]).to_i64_vec(), Some(vec![3, 4]));
        assert_eq!(Values::Double(vec![3.5]).to_i64_vec(), None);
        assert_eq!(Values::UInt64(vec![u64::MAX]).to_i64_vec(), None);
        assert_eq!(Values::text("x").to_f64_vec(), None);
    }

    #[test]
    fn add_variable_checks_shape() {
        let mut ds = Dataset::new();
        let x = ds.add_dimension(Dimension::new("x", 3)).unwrap();
        let err = ds
            .add_variable(Variable::new("v", vec![x], Values::Int(vec![1, 2])))
            .unwrap_err();
        assert!(matches!(err, EncodeError::ShapeMismatch { expected: 3, found: 2, .. }));
        ds.add_variable(Variable::new("v", vec![x], Values::Int(vec![1, 2, 3])))
            .unwrap();
        assert_eq!(ds.shape(ds.variable("v").unwrap()), vec![3]);
    }

    #[test]
    fn unlimited_dimension_rules() {
        let mut ds = Dataset::new();
        let t = ds.add_dimension(Dimension::unlimited("t", 2)).unwrap();
        let x = ds.add_dimension(Dimension::new("x", 1)).unwrap();
        assert!(matches!(
            ds.add_dimension(Dimension::unlimited("u", 0)),
            Err(EncodeError::MultipleUnlimited(_))
        ));
        assert!(matches!(
            ds.add_variable(Variable::new("bad", vec![x, t], Values::Byte(vec![0, 0]))),
            Err(EncodeError::UnlimitedNotFirst(_))
        ));
        ds.add_variable(Variable::new("ok", vec![t, x], Values::Byte(vec![0, 0])))
            .unwrap();
        assert!(ds.is_record_variable(ds.variable("ok").unwrap()));
        assert_eq!(ds.num_records(), Some(2));
    }

    #[test]
    fn rejects_bad_names() {
        let mut ds = Dataset::new();
        assert!(matches!(
            ds.add_dimension(Dimension::new("a/b", 1)),
            Err(EncodeError::InvalidName(_))
        ));
        assert!(matches!(
            ds.add_dimension(Dimension::new("", 1)),
            Err(EncodeError::InvalidName(_))
        ));
        ds.add_dimension(Dimension::new("x", 1)).unwrap();
        assert!(matches!(
            ds.add_dimension(Dimension::new("x", 2)),
            Err(EncodeError::DuplicateName(_))
        ));
    }
}
