use cdf_table::{
    export, import, output_path, write_cdf, ColumnData, Dataset, Dimension, ExportError,
    FormatError, ImportError, Index, MissingPolicy, Table, ValidationError, Values, Variable,
};
use std::{fs, io};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dates(labels: &[&str]) -> Index {
    Index::named("date", labels.iter().copied())
}

fn sample() -> Table {
    Table::new(dates(&["2000-01-01", "2000-01-02", "2000-01-03"]))
        .with_column("value", vec![1.0, 2.5, -3.0])
        .unwrap()
        .with_column("count", vec![10i64, 20, 30])
        .unwrap()
        .with_column("label", vec!["a", "bb", "ccc"])
        .unwrap()
}

#[test]
fn round_trip_strict() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = sample();
    export(&table, dir.path(), "sample", MissingPolicy::Strict).unwrap();
    let path = output_path(dir.path(), "sample");
    assert_eq!(path, dir.path().join("sample.nc"));
    assert_eq!(&fs::read(&path).unwrap()[..4], b"CDF\x01");
    assert_eq!(import(&path).unwrap(), table);
}

#[test]
fn round_trip_permissive_keeps_missing_cells() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000-01-01", "2000-01-02", "2000-01-03"]))
        .with_column("value", vec![1.0, f64::NAN, 3.0])
        .unwrap()
        .with_column("note", vec![Some("x".to_string()), None, Some("zz".to_string())])
        .unwrap();
    export(&table, dir.path(), "gaps", MissingPolicy::Permissive).unwrap();
    let back = import(output_path(dir.path(), "gaps")).unwrap();
    assert_eq!(back, table);
    let Some(ColumnData::Float(values)) = back.column("value") else {
        panic!("wrong column type");
    };
    assert!(values[1].is_nan());
}

#[test]
fn empty_strings_are_not_missing() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000-01-01", "2000-01-02", "2000-01-03"]))
        .with_column("note", vec![Some(String::new()), None, Some("x".to_string())])
        .unwrap();
    export(&table, dir.path(), "notes", MissingPolicy::Permissive).unwrap();
    let back = import(output_path(dir.path(), "notes")).unwrap();
    assert_eq!(
        back.column("note"),
        Some(&ColumnData::Text(vec![Some(String::new()), None, Some("x".to_string())]))
    );
}

#[test]
fn microsecond_labels_round_trip() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000-01-01 00:00:00.000001", "2000-01-01 00:00:00.000002"]))
        .with_column("value", vec![1.0, 2.0])
        .unwrap();
    export(&table, dir.path(), "micros", MissingPolicy::Strict).unwrap();
    let back = import(output_path(dir.path(), "micros")).unwrap();
    assert_eq!(
        back.index().labels(),
        ["2000-01-01 00:00:00.000001", "2000-01-01 00:00:00.000002"]
    );
    assert_eq!(back, table);

    let finer = Table::new(dates(&["2000-01-01 00:00:00.000000001"]));
    let err = export(&finer, dir.path(), "nanos", MissingPolicy::Strict).unwrap_err();
    assert!(matches!(
        err,
        ExportError::Validation(ValidationError::InvalidDate { row: 0, .. })
    ));
    assert!(!output_path(dir.path(), "nanos").exists());
}

#[test]
fn strict_rejects_missing_values_without_writing() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never");
    let table = Table::new(dates(&["2000-01-01", "2000-01-02", "2000-01-03"]))
        .with_column("value", vec![1.0, f64::NAN, 3.0])
        .unwrap();
    let err = export(&table, &out, "gaps", MissingPolicy::Strict).unwrap_err();
    assert!(matches!(
        err,
        ExportError::Validation(ValidationError::MissingValues { row: 1, .. })
    ));
    assert!(!out.exists());
}

#[test]
fn rejects_wrong_index_name() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(Index::named("time", ["2000-01-01"]))
        .with_column("value", vec![1.0])
        .unwrap();
    let err = export(&table, dir.path(), "t", MissingPolicy::Permissive).unwrap_err();
    let ExportError::Validation(err) = err else {
        panic!("expected a validation error");
    };
    assert!(err.to_string().starts_with("index must be named 'date'"));
    assert!(!output_path(dir.path(), "t").exists());
}

#[test]
fn rejects_invalid_dates_in_either_mode() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000-01-01", "not-a-date"]))
        .with_column("value", vec![1.0, 2.0])
        .unwrap();
    for policy in [MissingPolicy::Strict, MissingPolicy::Permissive] {
        let err = export(&table, dir.path(), "t", policy).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Validation(ValidationError::InvalidDate { row: 1, .. })
        ));
    }
}

#[test]
fn export_twice_into_same_directory() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("out");
    export(&sample(), &out, "first", MissingPolicy::Strict).unwrap();

    let replacement = Table::new(dates(&["2001-06-01"]))
        .with_column("value", vec![42.0])
        .unwrap();
    export(&replacement, &out, "second", MissingPolicy::Strict).unwrap();
    export(&replacement, &out, "first", MissingPolicy::Strict).unwrap();

    assert_eq!(import(output_path(&out, "first")).unwrap(), replacement);
    assert_eq!(import(output_path(&out, "second")).unwrap(), replacement);
}

#[test]
fn labels_come_back_canonical() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000/01/05", "2000-01-05T12:00:00", "2000-01-06 00:00:01.25"]))
        .with_column("value", vec![1.0, 2.0, 3.0])
        .unwrap();
    export(&table, dir.path(), "times", MissingPolicy::Strict).unwrap();
    let back = import(output_path(dir.path(), "times")).unwrap();
    assert_eq!(back.index().name(), Some("date"));
    assert_eq!(
        back.index().labels(),
        ["2000-01-05", "2000-01-05 12:00:00", "2000-01-06 00:00:01.250"]
    );
}

#[test]
fn empty_table_round_trip() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&[]))
        .with_column("value", Vec::<f64>::new())
        .unwrap()
        .with_column("label", Vec::<String>::new())
        .unwrap();
    export(&table, dir.path(), "empty", MissingPolicy::Strict).unwrap();
    assert_eq!(import(output_path(dir.path(), "empty")).unwrap(), table);
}

#[test]
fn wide_integers_use_cdf5() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let table = Table::new(dates(&["2000-01-01", "2000-01-02"]))
        .with_column("big", vec![i64::MIN, i64::MAX])
        .unwrap();
    export(&table, dir.path(), "big", MissingPolicy::Strict).unwrap();
    let path = output_path(dir.path(), "big");
    assert_eq!(&fs::read(&path).unwrap()[..4], b"CDF\x05");
    assert_eq!(import(&path).unwrap(), table);
}

#[test]
fn import_requires_date_axis() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.nc");
    let mut dataset = Dataset::new();
    let time = dataset.add_dimension(Dimension::new("time", 2)).unwrap();
    dataset
        .add_variable(Variable::new("value", vec![time], Values::Double(vec![1.0, 2.0])))
        .unwrap();
    write_cdf(&path, &dataset).unwrap();
    assert!(matches!(
        import(&path),
        Err(ImportError::Format(FormatError::MissingDateAxis))
    ));
}

#[test]
fn import_rejects_other_files() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.nc");
    fs::write(&path, "date,value\n2000-01-01,1.0\n").unwrap();
    assert!(matches!(
        import(&path),
        Err(ImportError::Format(FormatError::MagicString))
    ));

    let err = import(dir.path().join("missing.nc")).unwrap_err();
    assert!(matches!(err, ImportError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
}
