use annograph_core::{
  Classify as _, ErrorKind,
  annotation::{BatchItem, BatchOutcome},
  label::{LabelEdit, LabelEditOutcome, LabelInput, LabelKey, LabelLevel, LabelsByLevel, NewLabel, Span},
  record::Metadata,
  store::AnnotationStore,
};
use serde_json::json;
use uuid::Uuid;

use super::{label, record_labels, seed, store};

// ─── Labels ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_label_is_idempotent_per_key() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let key = LabelKey::record(r, "u1", "sentiment");

  let first = s.upsert_label(NewLabel::new(key.clone(), json!(["pos"]))).await.unwrap();
  let second = s.upsert_label(NewLabel::new(key.clone(), json!(["neg"]))).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(s.get_label(first).await.unwrap().value, json!(["neg"]));

  // A span key is a different label.
  let span = LabelKey::span(r, "u1", "sentiment", Span::new(0, 1));
  let third = s.upsert_label(NewLabel::new(span, json!(["pos"]))).await.unwrap();
  assert_ne!(first, third);
}

#[tokio::test]
async fn metadata_conflict_keeps_the_label_write_and_the_first_entry() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let key = LabelKey::record(r, "u1", "sentiment");

  let uuid = s
    .upsert_label(
      NewLabel::new(key.clone(), json!(["pos"])).with_metadata(vec![Metadata::new("len", json!(1))]),
    )
    .await
    .unwrap();
  let err = s
    .upsert_label(
      NewLabel::new(key, json!(["neg"])).with_metadata(vec![
        Metadata::new("note", json!("x")),
        Metadata::new("len", json!(2)),
      ]),
    )
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  // The label write stands; only the metadata batch is rejected.
  let label = s.get_label(uuid).await.unwrap();
  assert_eq!(label.value, json!(["neg"]));
  assert_eq!(label.metadata, vec![Metadata::new("len", json!(1))]);
}

#[tokio::test]
async fn add_label_metadata_is_all_or_nothing() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let uuid = s
    .upsert_label(NewLabel::new(LabelKey::record(r, "u1", "topic"), json!("x")))
    .await
    .unwrap();

  s.add_label_metadata(uuid, vec![Metadata::new("a", json!(1))]).await.unwrap();
  let err = s
    .add_label_metadata(uuid, vec![Metadata::new("b", json!(2)), Metadata::new("b", json!(3))])
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert_eq!(s.get_label(uuid).await.unwrap().metadata.len(), 1);

  let err = s.add_label_metadata(Uuid::new_v4(), vec![]).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn label_for_unknown_record_is_not_found() {
  let s = store().await;
  let err = s
    .upsert_label(NewLabel::new(LabelKey::record(Uuid::new_v4(), "u1", "x"), json!(1)))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn remove_label_by_exact_key() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let key = LabelKey::record(r, "u1", "topic");
  s.upsert_label(NewLabel::new(key.clone(), json!("x"))).await.unwrap();

  assert_eq!(s.remove_label(LabelKey::record(r, "u2", "topic")).await.unwrap(), 0);
  assert_eq!(s.remove_label(key.clone()).await.unwrap(), 1);
  assert_eq!(s.remove_label(key).await.unwrap(), 0);
}

// ─── Annotations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn annotate_replaces_the_annotators_labels() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];

  let first = s
    .annotate(r, "u1".into(), record_labels(&[("a", json!(1)), ("b", json!(2))]))
    .await
    .unwrap();
  let annotation = s.get_annotation(r, "u1".into()).await.unwrap();
  assert_eq!(annotation.label_uuids.len(), 2);
  let dropped = annotation.label_uuids[1];

  let second = s.annotate(r, "u1".into(), record_labels(&[("a", json!(1))])).await.unwrap();
  assert_eq!(first, second);
  let annotation = s.get_annotation(r, "u1".into()).await.unwrap();
  assert_eq!(annotation.label_uuids.len(), 1);
  assert_eq!(s.get_label(dropped).await.unwrap_err().kind(), ErrorKind::NotFound);

  s.annotate(r, "u1".into(), LabelsByLevel::default()).await.unwrap();
  let annotation = s.get_annotation(r, "u1".into()).await.unwrap();
  assert!(annotation.label_uuids.is_empty());
}

#[tokio::test]
async fn annotate_leaves_other_annotators_alone() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  label(&s, r, "u1", "topic", json!("x")).await;
  label(&s, r, "u2", "topic", json!("y")).await;
  s.annotate(r, "u1".into(), LabelsByLevel::default()).await.unwrap();

  let other = s.get_annotation(r, "u2".into()).await.unwrap();
  assert_eq!(other.label_uuids.len(), 1);
}

#[tokio::test]
async fn merge_without_overwrite_accumulates() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let a = s.upsert_label(NewLabel::new(LabelKey::record(r, "u1", "a"), json!(1))).await.unwrap();
  let b = s.upsert_label(NewLabel::new(LabelKey::record(r, "u1", "b"), json!(2))).await.unwrap();

  let ann = s.merge_annotation_labels(r, "u1".into(), vec![a], false).await.unwrap();
  let again = s.merge_annotation_labels(r, "u1".into(), vec![b], false).await.unwrap();
  assert_eq!(ann, again);
  assert_eq!(s.get_annotation(r, "u1".into()).await.unwrap().label_uuids.len(), 2);

  s.merge_annotation_labels(r, "u1".into(), vec![b], true).await.unwrap();
  let annotation = s.get_annotation(r, "u1".into()).await.unwrap();
  assert_eq!(annotation.label_uuids, vec![b]);
}

#[tokio::test]
async fn merge_rejects_labels_of_other_records() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  let foreign = s
    .upsert_label(NewLabel::new(LabelKey::record(uuids[1], "u1", "a"), json!(1)))
    .await
    .unwrap();
  let err = s
    .merge_annotation_labels(uuids[0], "u1".into(), vec![foreign], false)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn merge_rejects_labels_of_other_annotators() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  label(&s, r, "u1", "topic", json!("x")).await;
  let theirs = s.get_annotation(r, "u1".into()).await.unwrap().label_uuids;
  assert_eq!(theirs.len(), 1);

  let err = s
    .merge_annotation_labels(r, "u2".into(), theirs.clone(), false)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  // u2 clearing its own annotation leaves u1's label alone.
  s.annotate(r, "u2".into(), LabelsByLevel::default()).await.unwrap();
  assert_eq!(s.get_label(theirs[0]).await.unwrap().annotator, "u1");
  assert_eq!(s.get_annotation(r, "u1".into()).await.unwrap().label_uuids, theirs);
}

#[tokio::test]
async fn annotate_metadata_conflict_fails_the_call() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let key = LabelKey::record(r, "u1", "topic");
  s.upsert_label(NewLabel::new(key, json!("x")).with_metadata(vec![Metadata::new("m", json!(1))]))
    .await
    .unwrap();

  let mut input = LabelInput::record("topic", json!("y"));
  input.metadata_list = vec![annograph_core::label::MetadataInput {
    metadata_name:  "m".into(),
    metadata_value: json!(2),
  }];
  let labels = LabelsByLevel { labels_record: vec![input], ..Default::default() };
  let err = s.annotate(r, "u1".into(), labels).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  // Nothing from the failed call is visible.
  let err = s.get_annotation(r, "u1".into()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn batch_items_fail_independently() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let missing = Uuid::new_v4();
  let results = s
    .annotate_batch("u1".into(), vec![
      BatchItem { record_uuid: r, labels: record_labels(&[("topic", json!("x"))]) },
      BatchItem { record_uuid: missing, labels: record_labels(&[("topic", json!("x"))]) },
    ])
    .await
    .unwrap();

  assert_eq!(results.len(), 2);
  assert!(results[0].annotation_uuid().is_some());
  assert_eq!(results[1].uuid, missing);
  assert!(matches!(results[1].outcome, BatchOutcome::Failed { kind: ErrorKind::NotFound, .. }));
}

#[tokio::test]
async fn apply_label_sets_then_removes() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  label(&s, r, "u1", "other", json!(1)).await;

  let edit = LabelEdit {
    label_name:    "topic".into(),
    label_level:   LabelLevel::Span,
    label_value:   Some(json!("x")),
    start_idx:     Some(0),
    end_idx:       Some(1),
    metadata_list: Vec::new(),
  };
  let LabelEditOutcome::Set { label_uuid, .. } =
    s.apply_label(r, "u1".into(), edit.clone()).await.unwrap()
  else {
    panic!("expected a set");
  };
  let annotation = s.get_annotation(r, "u1".into()).await.unwrap();
  assert_eq!(annotation.label_uuids.len(), 2);
  assert!(annotation.label_uuids.contains(&label_uuid));

  let removed = s
    .apply_label(r, "u1".into(), LabelEdit { label_value: None, ..edit })
    .await
    .unwrap();
  assert_eq!(removed, LabelEditOutcome::Removed { count: 1 });
  assert_eq!(s.get_annotation(r, "u1".into()).await.unwrap().label_uuids.len(), 1);
}

#[tokio::test]
async fn inverted_span_is_invalid() {
  let s = store().await;
  let r = seed(&s, &["abc"]).await[0];
  let labels = LabelsByLevel {
    labels_span: vec![LabelInput::span("topic", json!("x"), 2, 1)],
    ..Default::default()
  };
  let err = s.annotate(r, "u1".into(), labels).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}
