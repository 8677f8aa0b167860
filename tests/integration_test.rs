//! Integration tests for the discovery pipeline.
//!
//! These tests exercise response normalization across the envelope shapes
//! the serving endpoint is known to produce, plus the session-store flow,
//! without requiring a live endpoint.

use serde_json::{json, Value};
use uuid::Uuid;

use data_discovery::config::Config;
use data_discovery::models::ParsedResult;
use data_discovery::normalize::normalize;
use data_discovery::state::AppState;

/// Helper: the structured payload the RAG agent produces for a loan query.
fn sample_payload() -> String {
    json!({
        "query_understanding": "Data products related to borrower loan history",
        "results": [
            {
                "data_product_name": "Borrower Profile",
                "full_identifier": "lending.core.borrower_profile",
                "description": "Borrower demographics and history",
                "completeness_score": 0.92,
                "health_status": "Active",
                "table_names": ["borrowers", "borrower_addresses"]
            },
            {
                "data_product_name": "Loan Book",
                "full_identifier": "lending.core.loan_book",
                "description": "Active and closed loan records",
                "completeness_score": 87,
                "table_names": [{"table_name": "loans"}]
            },
            {"data_product_name": "Risk Scores"},
            {"data_product_name": "Should Be Truncated"}
        ],
        "recommended_action": "Request access to Borrower Profile to begin analysis"
    })
    .to_string()
}

fn assert_sample(result: &ParsedResult) {
    assert_eq!(
        result.query_understanding,
        "Data products related to borrower loan history"
    );
    assert_eq!(result.results.len(), 3, "display cap is top 3");
    assert_eq!(result.results[0].name, "Borrower Profile");
    assert_eq!(result.results[0].completeness_score, Some(0.92));
    assert_eq!(
        result.results[0].table_names,
        vec!["borrowers", "borrower_addresses"]
    );
    // Percentage input converted to a fraction
    assert_eq!(result.results[1].completeness_score, Some(0.87));
    assert_eq!(result.results[1].table_names, vec!["loans"]);
    // Sparse entry defaulted, not dropped
    assert_eq!(result.results[2].name, "Risk Scores");
    assert_eq!(result.results[2].completeness_score, None);
    assert_eq!(
        result.recommended_action,
        "Request access to Borrower Profile to begin analysis"
    );
}

#[test]
fn test_normalize_agent_output_envelope() {
    let raw = json!({
        "output": [
            {"type": "message", "role": "assistant",
             "content": [{"type": "output_text", "text": "Let me search the catalog."}]},
            {"type": "message", "role": "assistant",
             "content": [{"type": "output_text", "text": sample_payload()}]}
        ]
    });
    let result = normalize(&raw);
    assert_sample(&result);
    assert_eq!(result.raw_response, raw);
}

#[test]
fn test_normalize_canonical_object_direct() {
    let raw: Value = serde_json::from_str(&sample_payload()).unwrap();
    assert_sample(&normalize(&raw));
}

#[test]
fn test_normalize_client_wrapper_envelope() {
    // Shape produced when an intermediate client wraps the agent response
    let raw = json!({
        "role": "assistant",
        "content": sample_payload(),
        "raw_response": {"output": "opaque"}
    });
    assert_sample(&normalize(&raw));
}

#[test]
fn test_normalize_code_fenced_streamed_text() {
    // What the streaming path accumulates: fenced JSON wrapped in prose
    let text = format!(
        "Here is what I found:\n```json\n{}\n```\nLet me know if you need more.",
        sample_payload()
    );
    assert_sample(&normalize(&Value::String(text)));
}

#[test]
fn test_normalize_refusal_text_degrades_to_placeholder() {
    let raw = Value::String("Sorry, I couldn't find anything.".to_string());
    let result = normalize(&raw);
    assert!(result.is_empty());
    assert_eq!(result.raw_response, raw);
}

#[test]
fn test_normalize_is_idempotent_across_shapes() {
    let shapes = vec![
        Value::Null,
        Value::String("no json here".to_string()),
        serde_json::from_str(&sample_payload()).unwrap(),
        json!({"output": [{"role": "assistant", "content": [{"text": sample_payload()}]}]}),
        json!({"error_code": "TEMPORARILY_UNAVAILABLE"}),
    ];
    for raw in shapes {
        assert_eq!(normalize(&raw), normalize(&raw), "shape: {raw}");
    }
}

#[test]
fn test_query_result_lifecycle_in_session_store() {
    let state = AppState::new(Config::default()).unwrap();
    let session_id = Uuid::new_v4();

    // First query stores its result
    let first: Value = serde_json::from_str(&sample_payload()).unwrap();
    state.store_result(session_id, "loan history", normalize(&first));
    let (query, result) = state.session_snapshot(session_id).unwrap();
    assert_eq!(query, "loan history");
    assert_sample(&result);

    // The next query replaces it, even when uninterpretable
    let second = Value::String("upstream had a bad day".to_string());
    state.store_result(session_id, "customer churn", normalize(&second));
    let (query, result) = state.session_snapshot(session_id).unwrap();
    assert_eq!(query, "customer churn");
    assert!(result.is_empty());
    assert_eq!(result.raw_response, second);
}

#[test]
fn test_access_request_dedup_per_session() {
    let state = AppState::new(Config::default()).unwrap();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(state.mark_access_requested(a, "Borrower Profile"));
    assert!(!state.mark_access_requested(a, "Borrower Profile"));
    // Sessions are independent
    assert!(state.mark_access_requested(b, "Borrower Profile"));
}
