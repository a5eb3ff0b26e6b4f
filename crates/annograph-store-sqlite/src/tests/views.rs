use annograph_core::{
  Classify as _, ErrorKind,
  label::{LabelInput, LabelLevel, LabelsByLevel, MetadataInput},
  record::RecordMetadataUpdate,
  store::AnnotationStore,
  verification::{StatusFilter, VerificationStatus, VerifyLabel, VerifyRequest},
  view::{AnnotationViewFilter, RecordViewOptions, VerificationViewFilter},
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{label, seed, store};

#[tokio::test]
async fn record_view_options() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  for name in ["len", "src"] {
    s.set_record_metadata(name.into(), vec![RecordMetadataUpdate { uuid: uuids[0], value: json!(1) }])
      .await
      .unwrap();
  }

  let bare = s
    .record_view(vec![uuids[1], uuids[0], Uuid::new_v4()], RecordViewOptions::default())
    .await
    .unwrap();
  assert_eq!(bare.len(), 2);
  assert_eq!(bare[0].uuid, uuids[0]);
  assert!(bare[0].record_id.is_none() && bare[0].content.is_none());
  assert_eq!(bare[0].record_metadata.len(), 2);

  let full = s
    .record_view(vec![uuids[0]], RecordViewOptions {
      include_id:      true,
      include_content: true,
      meta_names:      Some(vec!["len".into()]),
    })
    .await
    .unwrap();
  assert_eq!(full[0].record_id, Some(1));
  assert_eq!(full[0].content.as_deref(), Some("a"));
  assert_eq!(full[0].record_metadata.len(), 1);
}

#[tokio::test]
async fn annotation_view_groups_by_annotator_and_level() {
  let s = store().await;
  let r = seed(&s, &["some text"]).await[0];
  let mut span = LabelInput::span("entity", json!("ORG"), 0, 4);
  span.metadata_list = vec![
    MetadataInput { metadata_name: "score".into(), metadata_value: json!(0.8) },
    MetadataInput { metadata_name: "model".into(), metadata_value: json!("m1") },
  ];
  s.annotate(r, "u1".into(), LabelsByLevel {
    labels_record: vec![LabelInput::record("sentiment", json!(["pos"]))],
    labels_span:   vec![span],
  })
  .await
  .unwrap();
  label(&s, r, "u2", "sentiment", json!(["neg"])).await;

  let view = s
    .annotation_view(vec![r], AnnotationViewFilter::default())
    .await
    .unwrap();
  let list = &view[0].annotation_list;
  assert_eq!(list.len(), 2);
  assert_eq!(list[0].annotator, "u1");
  assert_eq!(list[0].labels_record.len(), 1);
  assert_eq!(list[0].labels_span.len(), 1);
  assert_eq!(list[0].labels_span[0].start_idx, Some(0));
  assert_eq!(list[0].labels_span[0].metadata_list.len(), 2);

  let narrowed = s
    .annotation_view(vec![r], AnnotationViewFilter {
      annotators:       Some(vec!["u1".into()]),
      label_names:      Some(vec!["entity".into()]),
      label_meta_names: Some(vec!["score".into()]),
    })
    .await
    .unwrap();
  let list = &narrowed[0].annotation_list;
  assert_eq!(list.len(), 1);
  assert!(list[0].labels_record.is_empty());
  assert_eq!(list[0].labels_span[0].metadata_list.len(), 1);
  assert_eq!(list[0].labels_span[0].metadata_list[0].name, "score");
}

fn verify_request(record_uuid: Uuid, verifier: &str, value: Value) -> VerifyRequest {
  VerifyRequest {
    record_uuid,
    annotator: "u1".into(),
    verifier: verifier.into(),
    label_name: "sentiment".into(),
    label_level: LabelLevel::Record,
    labels: vec![VerifyLabel {
      label_name:  "sentiment".into(),
      label_level: LabelLevel::Record,
      label_value: value,
    }],
  }
}

fn filter(status: StatusFilter) -> VerificationViewFilter {
  VerificationViewFilter {
    label_name: "sentiment".into(),
    label_level: LabelLevel::Record,
    annotator: "u1".into(),
    verifiers: None,
    status,
  }
}

#[tokio::test]
async fn verification_view_lists_newest_first() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  label(&s, r, "u1", "sentiment", json!(["pos"])).await;
  s.verify(verify_request(r, "v1", json!(["pos"]))).await.unwrap();
  s.verify(verify_request(r, "v2", json!(["neg"]))).await.unwrap();

  let view = s.verification_view(vec![r], filter(StatusFilter::All)).await.unwrap();
  let list = &view[0].verification_list;
  assert_eq!(list.len(), 2);
  assert_eq!(list[0].verifier, "v2");
  assert_eq!(list[0].status, VerificationStatus::Corrects);
  assert_eq!(list[0].labels[0].label_value, json!(["neg"]));
  assert!(list[0].last_timestamp >= list[1].last_timestamp);

  let confirms = s.verification_view(vec![r], filter(StatusFilter::Confirms)).await.unwrap();
  assert_eq!(confirms[0].verification_list.len(), 1);
  assert_eq!(confirms[0].verification_list[0].verifier, "v1");

  let only_v1 = s
    .verification_view(vec![r], VerificationViewFilter {
      verifiers: Some(vec!["v1".into()]),
      ..filter(StatusFilter::Corrects)
    })
    .await
    .unwrap();
  assert!(only_v1[0].verification_list.is_empty());
}

#[tokio::test]
async fn span_verification_view_is_unsupported() {
  let s = store().await;
  let r = seed(&s, &["a"]).await[0];
  let err = s
    .verification_view(vec![r], VerificationViewFilter {
      label_level: LabelLevel::Span,
      ..filter(StatusFilter::All)
    })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unsupported);
}
