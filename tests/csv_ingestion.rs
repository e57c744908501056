use csv_table_sync::ingestion::csv::{ingest_csv_from_path, ingest_csv_from_reader};
use csv_table_sync::ingestion::{read_csv_bytes, read_csv_path};
use csv_table_sync::types::{DataType, Field, Schema, Value};

fn people_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("name", DataType::Utf8),
        Field::new("score", DataType::Float64),
        Field::new("active", DataType::Bool),
    ])
}

#[test]
fn ingest_csv_from_path_happy_path() {
    let schema = people_schema();
    let ds = ingest_csv_from_path("tests/fixtures/people.csv", &schema).unwrap();

    assert_eq!(ds.row_count(), 2);
    assert_eq!(
        ds.rows[0],
        vec![
            Value::Int64(1),
            Value::Utf8("Ada".to_string()),
            Value::Float64(98.5),
            Value::Bool(true),
        ]
    );
}

#[test]
fn ingest_csv_allows_reordered_columns() {
    let schema = people_schema();
    let input = "name,id,active,score\nAda,1,true,98.5\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let ds = ingest_csv_from_reader(&mut rdr, &schema).unwrap();
    assert_eq!(ds.row_count(), 1);
    assert_eq!(ds.rows[0][0], Value::Int64(1));
    assert_eq!(ds.rows[0][1], Value::Utf8("Ada".to_string()));
}

#[test]
fn ingest_csv_errors_on_missing_required_column() {
    let schema = people_schema();
    let input = "id,name,score\n1,Ada,98.5\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let err = ingest_csv_from_reader(&mut rdr, &schema).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("missing required column 'active'"));
}

#[test]
fn ingest_csv_errors_on_type_parse() {
    let schema = people_schema();
    let input = "id,name,score,active\nnot_an_int,Ada,98.5,true\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let err = ingest_csv_from_reader(&mut rdr, &schema).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("failed to parse value"));
    assert!(msg.contains("column 'id'"));
}

#[test]
fn read_csv_path_infers_the_fixture_schema() {
    let ds = read_csv_path("tests/fixtures/people.csv").unwrap();
    assert_eq!(ds.schema, people_schema());
    assert_eq!(ds.rows[1][1], Value::text("Grace"));
}

#[test]
fn inferred_orders_amount_is_float_even_with_integral_cells() {
    let ds = read_csv_path("tests/fixtures/orders.csv").unwrap();
    let types: Vec<DataType> = ds.schema.fields.iter().map(|f| f.data_type.clone()).collect();
    assert_eq!(types, vec![DataType::Utf8, DataType::Utf8, DataType::Float64]);
    assert_eq!(ds.value(2, "amount"), Some(&Value::Float64(12.0)));
}

#[test]
fn blank_trailing_cell_reads_as_null() {
    let ds = read_csv_path("tests/fixtures/customers.csv").unwrap();
    assert_eq!(ds.row_count(), 4);
    assert_eq!(ds.value(2, "signup_year"), Some(&Value::Null));
    assert_eq!(ds.value(0, "signup_year"), Some(&Value::Int64(2019)));
}

#[test]
fn ragged_rows_are_a_csv_error() {
    let err = read_csv_bytes(b"a,b\n1,2\n3,4,5\n").unwrap_err();
    assert!(err.to_string().starts_with("csv error"));
}
