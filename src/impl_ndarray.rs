use crate::{ColumnData, Dataset, Element, Variable};
use ndarray::{prelude::*, Data};

impl Dataset {
    /// Copies a variable into an array shaped by its dimensions.
    ///
    /// Returns `None` if there is no variable called `name` or if it does not
    /// hold elements of type `A`.
    pub fn array<A: Element>(&self, name: &str) -> Option<ArrayD<A>> {
        let var = self.variable(name)?;
        let data = A::from_values(&var.values)?.to_vec();
        ArrayD::from_shape_vec(IxDyn(&self.shape(var)), data).ok()
    }
}

impl Variable {
    /// Creates a variable from an array, in logical (row-major) order.
    ///
    /// `dims` must name one dimension id per array axis; this is checked when
    /// the variable is added to a [`Dataset`].
    pub fn from_array<A, S, D>(
        name: impl Into<String>,
        dims: Vec<usize>,
        array: &ArrayBase<S, D>,
    ) -> Self
    where
        A: Element,
        S: Data<Elem = A>,
        D: Dimension,
    {
        let data = match array.as_slice() {
            Some(slice) => slice.to_vec(),
            None => array.iter().copied().collect(),
        };
        Self::new(name, dims, A::into_values(data))
    }
}

impl ColumnData {
    /// Numeric cells as an array; missing floats stay NaN.
    ///
    /// Returns `None` for text columns.
    pub fn to_array1(&self) -> Option<Array1<f64>> {
        match self {
            Self::Float(v) => Some(Array1::from(v.clone())),
            Self::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Self::Text(_) => None,
        }
    }
}
