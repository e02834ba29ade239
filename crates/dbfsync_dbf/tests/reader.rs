use dbfsync_dbf::{DbfReader, LenientDecoder, StrictDecoder, TableDecoder};
use dbfsync_protocol::{FieldType, NullProgress, RecordingProgress, Value};
use dbfsync_test_utils::DbfFixture;
use tempfile::TempDir;

fn customer_fixture() -> DbfFixture {
    DbfFixture::new()
        .character("CUSTNO", 8)
        .numeric("BALANCE", 10, 2)
        .date("DATE")
}

#[test]
fn deleted_records_never_materialize() {
    let dir = TempDir::new().unwrap();
    let mut fixture = customer_fixture();
    for i in 0..10 {
        let custno = format!("C{i:03}");
        let cells = [custno.as_str(), "1.00", "20251212"];
        fixture = if i % 3 == 0 {
            fixture.deleted(cells)
        } else {
            fixture.record(cells)
        };
    }
    let path = fixture.write_to(dir.path().join("arcust.dbf")).unwrap();

    let dataset = DbfReader::default().read(&path, &NullProgress);
    // 0, 3, 6, 9 are deleted
    assert_eq!(dataset.rows.len(), 6);
    assert!(dataset
        .rows
        .iter()
        .all(|r| r.get(0) != Some(&Value::from("C000"))));
}

#[test]
fn three_records_one_deleted() {
    let dir = TempDir::new().unwrap();
    let path = customer_fixture()
        .record(["A001", "12.50", "20251212"])
        .deleted(["A002", "3.00", "20251201"])
        .record(["A003", "", "00000000"])
        .write_to(dir.path().join("arcust.dbf"))
        .unwrap();

    let dataset = DbfReader::default().read(&path, &NullProgress);
    let names: Vec<_> = dataset.structure.names().collect();
    assert_eq!(names, vec!["CUSTNO", "BALANCE", "DATE"]);
    assert_eq!(dataset.rows.len(), 2);
    assert_eq!(
        dataset.rows[0].values(),
        &[Value::from("A001"), Value::Float(12.5), Value::from("2025-12-12")]
    );
    assert_eq!(
        dataset.rows[1].values(),
        &[Value::from("A003"), Value::Null, Value::Null]
    );
}

#[test]
fn truncated_tail_is_padded_not_aborted() {
    let dir = TempDir::new().unwrap();
    // Drop the EOF marker and the last 10 bytes of the final record, which
    // removes the whole DATE field and part of BALANCE.
    let path = customer_fixture()
        .record(["A001", "12.50", "20251212"])
        .record(["A002", "     99.00", "20251212"])
        .truncate_tail(1 + 10)
        .write_to(dir.path().join("arcust.dbf"))
        .unwrap();

    assert!(StrictDecoder.decode(&path, &NullProgress).is_err());

    let dataset = DbfReader::default().read(&path, &NullProgress);
    assert_eq!(dataset.rows.len(), 2);
    let last = &dataset.rows[1];
    assert_eq!(last.get(0), Some(&Value::from("A002")));
    assert_eq!(last.get(2), Some(&Value::Null));
}

#[test]
fn record_length_mismatch_falls_back_to_lenient() {
    let dir = TempDir::new().unwrap();
    let fixture = customer_fixture().record(["A001", "1", "20251212"]);
    let declared = fixture.record_length();
    let path = fixture
        .declare_record_length(declared + 2)
        .write_to(dir.path().join("arcust.dbf"))
        .unwrap();

    let err = StrictDecoder.decode(&path, &NullProgress).unwrap_err();
    assert!(err.to_string().contains("record length mismatch"));

    let table = LenientDecoder.decode(&path, &NullProgress).unwrap();
    assert_eq!(table.records.len(), 1);
}

#[test]
fn invalid_type_byte_is_recovered_by_fallback() {
    let dir = TempDir::new().unwrap();
    let path = DbfFixture::new()
        .character("NAME", 6)
        .field("JUNK", 0x00, 3, 0)
        .record(["Acme", "xyz"])
        .write_to(dir.path().join("icitem.dbf"))
        .unwrap();

    assert!(StrictDecoder.decode(&path, &NullProgress).is_err());

    let dataset = DbfReader::default().read(&path, &NullProgress);
    assert_eq!(dataset.structure.fields()[1].field_type, FieldType::Other(0));
    assert_eq!(
        dataset.rows[0].values(),
        &[Value::from("Acme"), Value::from("xyz")]
    );
}

#[test]
fn unreadable_file_yields_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.dbf");
    std::fs::write(&path, b"not a table").unwrap();

    let dataset = DbfReader::default().read(&path, &NullProgress);
    assert!(dataset.structure.is_empty());
    assert!(dataset.rows.is_empty());

    let missing = DbfReader::default().read(&dir.path().join("missing.dbf"), &NullProgress);
    assert!(missing.is_empty());
}

#[test]
fn header_count_beyond_eof_stops_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = customer_fixture()
        .record(["A001", "1", "20251212"])
        .declare_records(50)
        .write_to(dir.path().join("arcust.dbf"))
        .unwrap();

    let dataset = DbfReader::default().read(&path, &NullProgress);
    assert_eq!(dataset.rows.len(), 1);
}

#[test]
fn reports_read_progress() {
    let dir = TempDir::new().unwrap();
    let mut fixture = DbfFixture::new().numeric("N", 6, 0);
    for i in 0..10_001 {
        fixture = fixture.record([i.to_string()]);
    }
    let path = fixture.write_to(dir.path().join("big.dbf")).unwrap();

    let progress = RecordingProgress::new();
    let dataset = DbfReader::default().read(&path, &progress);
    assert_eq!(dataset.rows.len(), 10_001);
    assert!(progress.contains("Reading records: 10,000 read ("));
    assert!(progress.contains("Read 10,001 records in "));
}
