//! Record sink and flat-file export against real files.

use case_harvest::sink::export::write_csv;
use case_harvest::sink::{PersistSchema, RecordSink, SqliteSink, UpsertOutcome};
use case_harvest::storage::CaseStorage;
use case_harvest::CaseRecord;

fn record(cnr: &str, stage: &str) -> CaseRecord {
    [
        ("Filing Number", "FN123"),
        ("CNR Number", cnr),
        ("Status_Case Stage", stage),
        ("Petitioner_Advocate_1", "A. Kumar"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn test_first_write_wins_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db").join("cases.db");
    let schema = PersistSchema::ecourts("ecourts_district_courts");

    let sink = SqliteSink::open(&path, schema.clone()).unwrap();
    assert_eq!(
        sink.upsert(&record("MHAU010012342023", "Evidence")).unwrap(),
        UpsertOutcome::Inserted
    );
    drop(sink);

    let sink = SqliteSink::open(&path, schema).unwrap();
    assert_eq!(
        sink.upsert(&record("MHAU010012342023", "Arguments")).unwrap(),
        UpsertOutcome::Duplicate
    );
    assert_eq!(sink.count().unwrap(), 1);
    let row = sink.fetch("MHAU010012342023").unwrap().unwrap();
    assert!(row.contains(&("status_case_stage".to_string(), "Evidence".to_string())));
}

#[test]
fn test_export_keeps_fields_the_schema_drops() {
    let root = tempfile::tempdir().unwrap();
    let storage = CaseStorage::new(root.path(), "MHAU010012342023");
    storage.create().unwrap();
    let rec = record("MHAU010012342023", "Evidence");
    write_csv(&rec, &storage.csv_path()).unwrap();

    let mut reader = csv::Reader::from_path(storage.csv_path()).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert!(headers.contains(&"Petitioner_Advocate_1".to_string()));
    let translated = PersistSchema::ecourts("t").translate(&rec);
    assert!(translated.iter().all(|(col, _)| col != "Petitioner_Advocate_1"));
}

#[test]
fn test_record_without_identifier_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let sink = SqliteSink::open(
        &dir.path().join("cases.db"),
        PersistSchema::supreme_court(),
    )
    .unwrap();
    let rec: CaseRecord = [("Title", "A vs B"), ("CNR Number", "   ")].into_iter().collect();
    assert_eq!(sink.upsert(&rec).unwrap(), UpsertOutcome::Skipped);
    assert_eq!(sink.count().unwrap(), 0);
}
