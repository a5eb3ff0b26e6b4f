use annograph_core::{
  Classify as _, ErrorKind,
  record::{ColumnMapping, RecordMetadataUpdate},
  store::AnnotationStore,
};
use serde_json::{Map, json};
use uuid::Uuid;

use super::{all_records, label, rows, seed, store};

#[tokio::test]
async fn import_assigns_ordinals() {
  let s = store().await;
  let mut input = rows(&["a", "b", "c"]);
  // String ordinals are accepted.
  input[2].insert("id".into(), json!("3"));

  let written = s
    .import_records("d".into(), input, ColumnMapping::new("id", "text"))
    .await
    .unwrap();
  assert_eq!(written, 3);
  assert_eq!(s.record_count().await.unwrap(), 3);

  let uuids = all_records(&s).await;
  let records = s.record_contents(uuids).await.unwrap();
  let ids: Vec<i64> = records.iter().map(|r| r.record_id).collect();
  assert_eq!(ids, vec![1, 2, 3]);
  assert_eq!(records[1].content, "b");
}

#[tokio::test]
async fn reimport_keeps_the_uuid() {
  let s = store().await;
  let before = seed(&s, &["old"]).await;
  let after = seed(&s, &["new"]).await;
  assert_eq!(before, after);
  assert_eq!(s.get_record(after[0]).await.unwrap().content, "new");
  assert_eq!(s.record_count().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_rows_write_nothing() {
  let s = store().await;
  let mut input = rows(&["a", "b"]);
  input[1].remove("text");
  input.push(Map::from_iter([("id".to_string(), json!("x")), ("text".to_string(), json!("c"))]));

  let err = s
    .import_records("d".into(), input, ColumnMapping::new("id", "text"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  let message = err.to_string();
  assert!(message.contains("rows[1].text"));
  assert!(message.contains("rows[2].id"));
  assert_eq!(s.record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn mapped_metadata_column() {
  let s = store().await;
  let mut input = rows(&["a"]);
  input[0].insert("source".into(), json!("web"));
  s.import_records("d".into(), input, ColumnMapping::new("id", "text").with_metadata("source"))
    .await
    .unwrap();

  let uuids = all_records(&s).await;
  let view = s
    .record_view(uuids, Default::default())
    .await
    .unwrap();
  assert_eq!(view[0].record_metadata.len(), 1);
  assert_eq!(view[0].record_metadata[0].value, json!("web"));
}

#[tokio::test]
async fn record_metadata_skips_unknown_records() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  let written = s
    .set_record_metadata("len".into(), vec![
      RecordMetadataUpdate { uuid: uuids[0], value: json!(1) },
      RecordMetadataUpdate { uuid: Uuid::new_v4(), value: json!(2) },
      RecordMetadataUpdate { uuid: uuids[1], value: json!(3) },
    ])
    .await
    .unwrap();
  assert_eq!(written, 2);
}

#[tokio::test]
async fn missing_record_is_not_found() {
  let s = store().await;
  let err = s.get_record(Uuid::new_v4()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn export_flattens_linked_labels() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  label(&s, uuids[0], "u1", "sentiment", json!(["pos"])).await;
  label(&s, uuids[1], "u2", "sentiment", json!(["neg"])).await;

  let rows = s.export().await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].record_id, 1);
  assert_eq!(rows[0].annotator, "u1");
  assert_eq!(rows[1].label_value, json!(["neg"]));
}

#[tokio::test]
async fn reset_keeps_the_project() {
  let s = store().await;
  let project = s.project().await.unwrap();
  let uuids = seed(&s, &["a"]).await;
  label(&s, uuids[0], "u1", "sentiment", json!(["pos"])).await;

  s.reset_project().await.unwrap();
  assert_eq!(s.record_count().await.unwrap(), 0);
  assert_eq!(s.project().await.unwrap(), project);
  // The store is still usable.
  assert_eq!(seed(&s, &["b"]).await.len(), 1);
}
