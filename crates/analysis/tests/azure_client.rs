//! `AzureDocumentClient` against a wiremock stand-in for Document Intelligence.

use receiptly_analysis::AzureDocumentClient;
use receiptly_core::config::DocumentServiceConfig;
use receiptly_core::{DocumentService, LayoutService, ServiceError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, max_polls: usize) -> AzureDocumentClient {
    let config = DocumentServiceConfig {
        endpoint: Some(format!("{}/", server.uri())),
        api_key: Some("test-key".into()),
        poll_interval_ms: 0,
        max_polls,
        ..Default::default()
    };
    AzureDocumentClient::new(config).expect("client should build")
}

async fn mount_submit(server: &MockServer, model: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/formrecognizer/documentModels/{model}:analyze")))
        .and(query_param("api-version", "2023-07-31"))
        .and(header("Ocp-Apim-Subscription-Key", "test-key"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Operation-Location", format!("{}/operations/op-1", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn receipt_analysis_polls_until_succeeded() {
    let server = MockServer::start().await;
    mount_submit(&server, "prebuilt-receipt").await;

    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "analyzeResult": {
                "pages": [{ "width": 1000, "height": 2000, "lines": [] }],
                "documents": [{
                    "docType": "receipt.retail",
                    "confidence": 0.95,
                    "fields": {
                        "MerchantName": { "type": "string", "valueString": "Corner Deli", "confidence": 0.88 },
                        "Total": { "type": "currency", "valueCurrency": { "amount": 9.5 }, "confidence": 0.97 }
                    }
                }]
            }
        })))
        .mount(&server)
        .await;

    let receipt = client(&server, 5)
        .analyze_receipt(b"jpeg bytes")
        .await
        .expect("analysis should succeed")
        .expect("a document should be found");

    assert_eq!(receipt.doc_type, "receipt.retail");
    assert_eq!(receipt.merchant_name.unwrap().value, "Corner Deli");
    assert_eq!(receipt.total.unwrap().value.to_string(), "9.50");
    assert_eq!(receipt.page_count, 1);
}

#[tokio::test]
async fn empty_documents_means_no_receipt() {
    let server = MockServer::start().await;
    mount_submit(&server, "prebuilt-receipt").await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "analyzeResult": { "pages": [], "documents": [] }
        })))
        .mount(&server)
        .await;

    let result = client(&server, 5).analyze_receipt(b"jpeg bytes").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn layout_analysis_uses_layout_model() {
    let server = MockServer::start().await;
    mount_submit(&server, "prebuilt-layout").await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "analyzeResult": {
                "pages": [{
                    "width": 400, "height": 500,
                    "lines": [{ "content": "ACME", "polygon": [100, 80, 300, 80, 300, 120, 100, 120] }]
                }]
            }
        })))
        .mount(&server)
        .await;

    let layout = client(&server, 5).analyze_layout(b"jpeg bytes").await.unwrap();
    assert_eq!(layout.pages.len(), 1);
    assert_eq!(layout.pages[0].lines[0].content, "ACME");
}

#[tokio::test]
async fn failed_operation_surfaces_service_message() {
    let server = MockServer::start().await;
    mount_submit(&server, "prebuilt-receipt").await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": { "code": "InvalidContent", "message": "The file is corrupted" }
        })))
        .mount(&server)
        .await;

    let err = client(&server, 5).analyze_receipt(b"jpeg bytes").await.unwrap_err();
    assert!(matches!(err, ServiceError::Failed(m) if m == "InvalidContent: The file is corrupted"));
}

#[tokio::test]
async fn poll_budget_is_bounded() {
    let server = MockServer::start().await;
    mount_submit(&server, "prebuilt-receipt").await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, 3).analyze_receipt(b"jpeg bytes").await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout(3)));
}

#[tokio::test]
async fn rejected_submission_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Access denied"))
        .mount(&server)
        .await;

    let err = client(&server, 3).analyze_receipt(b"jpeg bytes").await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 401, ref body } if body == "Access denied"));
}

#[tokio::test]
async fn missing_operation_header_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let err = client(&server, 3).analyze_receipt(b"jpeg bytes").await.unwrap_err();
    assert!(matches!(err, ServiceError::Protocol(_)));
}
