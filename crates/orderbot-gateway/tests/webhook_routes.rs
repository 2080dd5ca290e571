//! HTTP-level tests driving the router with in-memory collaborators

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use orderbot_core::{replies, CustomerId, Decimal, Menu, MenuHandle};
use orderbot_gateway::{
    Dispatcher, Gateway, GatewayConfig, GatewayState, MessageSender, PaymentLinkProvider, Result,
    Senders,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn messages_for(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| c == to)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Dispatch runs in the background; wait until `count` messages landed.
    async fn wait_for(&self, count: usize) {
        for _ in 0..100 {
            if self.sent.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &CustomerId, body: &str) -> Result<()> {
        self.sent.lock().push((to.to_string(), body.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct FixedLinkProvider;

#[async_trait]
impl PaymentLinkProvider for FixedLinkProvider {
    async fn create_link(&self, _customer: &CustomerId, amount: Decimal) -> Result<String> {
        Ok(format!("https://pay.example.com/checkout?amount={}", amount))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

fn harness(menu: Menu) -> (Gateway, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let config = GatewayConfig::default().with_verify_token("hub-token");
    let state = GatewayState::new(config, MenuHandle::new(menu))
        .with_senders(Senders::single(sender.clone()))
        .with_dispatcher(Dispatcher::new(
            Arc::new(FixedLinkProvider),
            Duration::from_secs(1),
        ));
    (Gateway::from_state(state), sender)
}

fn flat_menu() -> Menu {
    Menu::from_json_str(r#"{"naan": 2, "coke": 3}"#).unwrap()
}

fn meta_body(from: &str, id: &str, text: &str) -> String {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": from,
                        "id": id,
                        "type": "text",
                        "text": { "body": text }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

fn meta_post(body: String) -> Request<Body> {
    Request::post("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn verification_handshake() {
    let (gateway, _) = harness(flat_menu());

    let ok = gateway
        .build_router()
        .oneshot(
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=hub-token&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_string(ok).await, "42");

    let denied = gateway
        .build_router()
        .oneshot(
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn meta_order_to_payment_link() {
    let (gateway, sender) = harness(flat_menu());
    let customer = "15550001";

    let response = gateway
        .build_router()
        .oneshot(meta_post(meta_body(customer, "wamid.1", "2 naan and 1 coke")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    sender.wait_for(2).await;

    gateway
        .build_router()
        .oneshot(meta_post(meta_body(customer, "wamid.2", "yes")))
        .await
        .unwrap();
    sender.wait_for(4).await;

    let messages = sender.messages_for(customer);
    assert_eq!(messages.len(), 4);
    assert!(messages[1].contains("💰 Total: $7.00"));
    assert!(messages[2].contains("confirmed"));
    assert!(messages[3].contains("https://pay.example.com/checkout?amount=7"));

    let state = gateway.state();
    assert!(state.engine.store().peek(&CustomerId::new(customer)).is_none());
}

#[tokio::test]
async fn duplicate_delivery_is_applied_once() {
    let (gateway, sender) = harness(flat_menu());
    let customer = "15550002";

    for _ in 0..3 {
        let response = gateway
            .build_router()
            .oneshot(meta_post(meta_body(customer, "wamid.dup", "1 coke")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    sender.wait_for(2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let session = gateway
        .state()
        .engine
        .store()
        .peek(&CustomerId::new(customer))
        .unwrap();
    assert_eq!(session.cart.quantity("coke"), 1);
    assert_eq!(sender.messages_for(customer).len(), 2);
}

#[tokio::test]
async fn malformed_and_status_payloads_are_acknowledged() {
    let (gateway, sender) = harness(flat_menu());

    let garbage = gateway
        .build_router()
        .oneshot(meta_post("{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::OK);

    let status_only = serde_json::json!({
        "entry": [{"changes": [{"value": {"statuses": [{"id": "wamid.1", "status": "delivered"}]}}]}]
    });
    let response = gateway
        .build_router()
        .oneshot(meta_post(status_only.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(sender.sent.lock().is_empty());
    assert_eq!(gateway.state().engine.store().session_count(), 0);
}

#[tokio::test]
async fn twilio_media_message_gets_text_only_notice() {
    let (gateway, sender) = harness(flat_menu());

    let response = gateway
        .build_router()
        .oneshot(
            Request::post("/webhook/twilio")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "From=whatsapp%3A%2B15550003&Body=&NumMedia=1&MessageSid=MM1",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    sender.wait_for(1).await;

    assert_eq!(
        sender.messages_for("whatsapp:+15550003"),
        vec![replies::TEXT_ONLY.to_string()]
    );
    assert_eq!(gateway.state().engine.store().session_count(), 0);
}

#[tokio::test]
async fn malformed_twilio_payloads_are_acknowledged() {
    let (gateway, sender) = harness(flat_menu());

    let wrong_type = gateway
        .build_router()
        .oneshot(
            Request::post("/webhook/twilio")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"From": "whatsapp:+15550006"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_type.status(), StatusCode::OK);

    let duplicate_field = gateway
        .build_router()
        .oneshot(
            Request::post("/webhook/twilio")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("From=whatsapp%3A%2B15550006&Body=hi&Body=2+naan"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(duplicate_field.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(sender.sent.lock().is_empty());
    assert_eq!(gateway.state().engine.store().session_count(), 0);
}

#[tokio::test]
async fn twilio_text_message_reaches_engine() {
    let (gateway, sender) = harness(flat_menu());

    gateway
        .build_router()
        .oneshot(
            Request::post("/webhook/twilio")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("From=whatsapp%3A%2B15550004&Body=3+naan&MessageSid=SM1"))
                .unwrap(),
        )
        .await
        .unwrap();
    sender.wait_for(2).await;

    let session = gateway
        .state()
        .engine
        .store()
        .peek(&CustomerId::new("whatsapp:+15550004"))
        .unwrap();
    assert_eq!(session.cart.quantity("naan"), 3);
}

#[tokio::test]
async fn empty_menu_answers_unavailable() {
    let (gateway, sender) = harness(Menu::empty());

    gateway
        .build_router()
        .oneshot(meta_post(meta_body("15550005", "wamid.9", "hi")))
        .await
        .unwrap();
    sender.wait_for(1).await;

    assert_eq!(
        sender.messages_for("15550005"),
        vec![replies::MENU_UNAVAILABLE.to_string()]
    );
    assert_eq!(gateway.state().engine.store().session_count(), 0);
}

#[tokio::test]
async fn health_and_status() {
    let (gateway, _) = harness(
        Menu::from_json_str(r#"{"Restaurant": "Spice Route", "indian": {"naan": 2}, "italian": {"pizza": 10}}"#)
            .unwrap(),
    );

    let health = gateway
        .build_router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_string(health).await).unwrap();
    assert_eq!(health["status"], "healthy");

    let status = gateway
        .build_router()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_str(&body_string(status).await).unwrap();
    assert_eq!(status["sessions"], 0);
    assert_eq!(status["menu"]["items"], 2);
    assert_eq!(status["menu"]["business_name"], "Spice Route");
    assert_eq!(status["menu"]["sections"], serde_json::json!(["indian", "italian"]));
    assert_eq!(status["payment_provider"], "fixed");
}
