use annograph_core::{
  Classify as _, ErrorKind,
  label::{LabelKey, NewLabel},
  query::{
    Condition, LabelMetadataCondition, Operator, SearchQuery, VerificationCondition,
    VerificationMode,
  },
  record::{Metadata, RecordMetadataUpdate},
  store::AnnotationStore,
  verification::{VerifyLabel, VerifyRequest},
};
use serde_json::json;

use super::{label, seed, store};

fn query() -> SearchQuery { SearchQuery { limit: 100, ..Default::default() } }

#[tokio::test]
async fn unfiltered_search_pages_in_record_order() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b", "c", "d"]).await;

  let page = s.search(&SearchQuery { skip: 1, limit: 2, ..Default::default() }).await.unwrap();
  assert_eq!(page, uuids[1..3].to_vec());

  // Identical calls return identical results.
  assert_eq!(s.search(&query()).await.unwrap(), s.search(&query()).await.unwrap());
}

#[tokio::test]
async fn default_limit_is_ten() {
  let s = store().await;
  let contents: Vec<String> = (0..12).map(|i| format!("r{i}")).collect();
  let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
  seed(&s, &refs).await;
  assert_eq!(s.search(&SearchQuery::default()).await.unwrap().len(), 10);
}

#[tokio::test]
async fn limit_above_the_cap_is_invalid() {
  let s = store().await;
  let err = s.search(&SearchQuery { limit: 1001, ..Default::default() }).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn keyword_and_full_regex() {
  let s = store().await;
  let uuids = seed(&s, &["good movie", "bad movie", "movie"]).await;

  let hits = s.search(&SearchQuery { keyword: Some("bad".into()), ..query() }).await.unwrap();
  assert_eq!(hits, vec![uuids[1]]);

  // Full-content match: "movie" alone does not match "good movie".
  let hits = s.search(&SearchQuery { regex: Some("movie".into()), ..query() }).await.unwrap();
  assert_eq!(hits, vec![uuids[2]]);
  let hits = s.search(&SearchQuery { regex: Some(".*movie".into()), ..query() }).await.unwrap();
  assert_eq!(hits.len(), 3);

  let err = s.search(&SearchQuery { regex: Some("(".into()), ..query() }).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn record_metadata_ranges_coerce_numbers() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b", "c"]).await;
  s.set_record_metadata("len".into(), vec![
    RecordMetadataUpdate { uuid: uuids[0], value: json!(3) },
    RecordMetadataUpdate { uuid: uuids[1], value: json!("12") },
    RecordMetadataUpdate { uuid: uuids[2], value: json!("n/a") },
  ])
  .await
  .unwrap();

  let cond = Condition::new("len", Operator::Ge, Some(json!("10")));
  let hits = s
    .search(&SearchQuery { record_metadata_condition: Some(cond), ..query() })
    .await
    .unwrap();
  assert_eq!(hits, vec![uuids[1]]);

  let cond = Condition::new("len", Operator::Exists, None);
  let hits = s
    .search(&SearchQuery { record_metadata_condition: Some(cond), ..query() })
    .await
    .unwrap();
  assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn label_equality_and_annotators() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  label(&s, uuids[0], "u1", "sentiment", json!(["pos"])).await;
  label(&s, uuids[1], "u2", "sentiment", json!(["pos"])).await;

  let cond = Condition::new("sentiment", Operator::Eq, Some(json!(["pos"])));
  let hits = s
    .search(&SearchQuery { label_condition: Some(cond.clone()), ..query() })
    .await
    .unwrap();
  assert_eq!(hits, uuids);

  let hits = s
    .search(&SearchQuery {
      label_condition: Some(cond),
      annotator_list: Some(vec!["u2".into()]),
      ..query()
    })
    .await
    .unwrap();
  assert_eq!(hits, vec![uuids[1]]);
}

#[tokio::test]
async fn integral_floats_match_integers() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  label(&s, uuids[0], "u1", "stars", json!(1.0)).await;
  label(&s, uuids[0], "u2", "stars", json!(1)).await;
  label(&s, uuids[1], "u1", "stars", json!(1.5)).await;

  let cond = Condition::new("stars", Operator::Eq, Some(json!(1)));
  let hits = s.search(&SearchQuery { label_condition: Some(cond), ..query() }).await.unwrap();
  assert_eq!(hits, vec![uuids[0]]);

  // `1.0` and `1` are one value, not a disagreement.
  let cond = Condition::new("stars", Operator::Conflicts, None);
  let hits = s.search(&SearchQuery { label_condition: Some(cond), ..query() }).await.unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn conflicts_within_the_annotator_scope() {
  let s = store().await;
  let uuids = seed(&s, &["r1", "r2"]).await;
  let (r1, r2) = (uuids[0], uuids[1]);
  label(&s, r1, "U1", "sentiment", json!(["a"])).await;
  label(&s, r1, "U2", "sentiment", json!(["b"])).await;
  label(&s, r2, "U1", "sentiment", json!(["a"])).await;
  label(&s, r2, "U3", "sentiment", json!(["a"])).await;

  let conflicts = Condition::new("sentiment", Operator::Conflicts, None);
  let hits = s
    .search(&SearchQuery { label_condition: Some(conflicts.clone()), ..query() })
    .await
    .unwrap();
  assert_eq!(hits, vec![r1]);

  let hits = s
    .search(&SearchQuery {
      label_condition: Some(conflicts),
      annotator_list: Some(vec!["U1".into(), "U3".into()]),
      ..query()
    })
    .await
    .unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn conflicts_operator_elsewhere_is_invalid() {
  let s = store().await;
  let cond = Condition::new("len", Operator::Conflicts, None);
  let err = s
    .search(&SearchQuery { record_metadata_condition: Some(cond), ..query() })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn label_metadata_condition() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  for (r, confidence) in [(uuids[0], 0.9), (uuids[1], 0.2)] {
    let uuid = s
      .upsert_label(
        NewLabel::new(LabelKey::record(r, "u1", "sentiment"), json!(["pos"]))
          .with_metadata(vec![Metadata::new("confidence", json!(confidence))]),
      )
      .await
      .unwrap();
    s.merge_annotation_labels(r, "u1".into(), vec![uuid], false).await.unwrap();
  }

  let cond = LabelMetadataCondition {
    label_name: "sentiment".into(),
    condition:  Condition::new("confidence", Operator::Gt, Some(json!(0.5))),
  };
  let hits = s
    .search(&SearchQuery { label_metadata_condition: Some(cond), ..query() })
    .await
    .unwrap();
  assert_eq!(hits, vec![uuids[0]]);
}

#[tokio::test]
async fn verified_and_unverified() {
  let s = store().await;
  let uuids = seed(&s, &["a", "b"]).await;
  label(&s, uuids[0], "u1", "sentiment", json!(["pos"])).await;
  label(&s, uuids[1], "u1", "sentiment", json!(["pos"])).await;
  s.verify(VerifyRequest {
    record_uuid: uuids[0],
    annotator:   "u1".into(),
    verifier:    "boss".into(),
    label_name:  "sentiment".into(),
    label_level: annograph_core::label::LabelLevel::Record,
    labels:      vec![VerifyLabel {
      label_name:  "sentiment".into(),
      label_level: annograph_core::label::LabelLevel::Record,
      label_value: json!(["pos"]),
    }],
  })
  .await
  .unwrap();

  let mode = |search_mode| {
    Some(VerificationCondition { label_name: "sentiment".into(), search_mode })
  };
  let verified = s
    .search(&SearchQuery { verification_condition: mode(VerificationMode::Verified), ..query() })
    .await
    .unwrap();
  assert_eq!(verified, vec![uuids[0]]);
  let unverified = s
    .search(&SearchQuery { verification_condition: mode(VerificationMode::Unverified), ..query() })
    .await
    .unwrap();
  assert_eq!(unverified, vec![uuids[1]]);
  let all = s
    .search(&SearchQuery { verification_condition: mode(VerificationMode::All), ..query() })
    .await
    .unwrap();
  assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn invalid_names_are_rejected() {
  let s = store().await;
  let cond = Condition::new("len; DROP TABLE records", Operator::Exists, None);
  let err = s
    .search(&SearchQuery { record_metadata_condition: Some(cond), ..query() })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert!(err.to_string().contains("record_metadata_condition.name"));
}
