use cdf_table::{
    export, import, output_path, read_cdf, Dataset, Dimension, Index, MissingPolicy, Table,
    Variable,
};
use ndarray::{array, Array2, ShapeBuilder};
use std::io::Cursor;

#[test]
fn variables_as_arrays() {
    let mut dataset = Dataset::new();
    let x = dataset.add_dimension(Dimension::new("x", 2)).unwrap();
    let y = dataset.add_dimension(Dimension::new("y", 3)).unwrap();
    let grid = array![[1i32, 2, 3], [4, 5, 6]];
    dataset.add_variable(Variable::from_array("grid", vec![x, y], &grid)).unwrap();

    // Column-major input is stored in logical order.
    let fortran = Array2::from_shape_vec((2, 3).f(), vec![1.5f64, 4.5, 2.5, 5.5, 3.5, 6.5]).unwrap();
    dataset.add_variable(Variable::from_array("halves", vec![x, y], &fortran)).unwrap();

    let mut buf = Vec::new();
    dataset.write_cdf(&mut buf).unwrap();
    let read = Dataset::read_cdf(Cursor::new(buf)).unwrap();

    assert_eq!(read.array::<i32>("grid"), Some(grid.into_dyn()));
    assert_eq!(read.array::<f64>("halves"), Some(fortran.into_dyn()));
    assert_eq!(read.array::<f64>("grid"), None);
    assert_eq!(read.array::<i32>("missing"), None);
}

#[test]
fn columns_as_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(Index::named("date", ["2000-01-01", "2000-01-02"]))
        .with_column("value", vec![0.5, 1.5])
        .unwrap()
        .with_column("count", vec![3i64, 4])
        .unwrap()
        .with_column("label", vec!["a", "b"])
        .unwrap();
    export(&table, dir.path(), "arrays", MissingPolicy::Strict).unwrap();
    let back = import(output_path(dir.path(), "arrays")).unwrap();

    assert_eq!(back.column("value").and_then(|c| c.to_array1()), Some(array![0.5, 1.5]));
    assert_eq!(back.column("count").and_then(|c| c.to_array1()), Some(array![3.0, 4.0]));
    assert_eq!(back.column("label").and_then(|c| c.to_array1()), None);

    let dataset = read_cdf(output_path(dir.path(), "arrays")).unwrap();
    // Text is stored as `NC_CHAR`, which has no element type.
    assert_eq!(dataset.array::<u8>("label"), None);
    assert_eq!(dataset.array::<f64>("value"), Some(array![0.5, 1.5].into_dyn()));
}
