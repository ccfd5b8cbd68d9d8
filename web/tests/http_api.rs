//! HTTP API tests over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use timebank_core::booking::{Booking, BookingStatus};
use timebank_core::hours::Hours;
use timebank_core::ids::{BookingId, UserId};
use timebank_core::notification::Notification;
use timebank_core::service::wallet::WalletBalance;
use timebank_core::transaction::{Transaction, TransactionType};
use timebank_testing::{fixtures, init_test_tracing, test_clock, InMemoryStore};
use timebank_web::mail::LogMailer;
use timebank_web::rate_limit::{RateLimitConfig, RateLimiter};
use timebank_web::realtime::RoomHub;
use timebank_web::{build_router, AppState, JwtKeys};

struct Harness {
    server: TestServer,
    store: InMemoryStore,
    keys: JwtKeys,
}

impl Harness {
    fn new() -> Self {
        Self::with_limit(RateLimitConfig::default())
    }

    fn with_limit(config: RateLimitConfig) -> Self {
        init_test_tracing();
        let store = InMemoryStore::new();
        let keys = JwtKeys::from_secret(b"http-api-tests-secret");
        let state = AppState {
            store: Arc::new(store.clone()),
            clock: Arc::new(test_clock()),
            hub: RoomHub::new(),
            mailer: Arc::new(LogMailer),
            jwt: keys.clone(),
            limiter: RateLimiter::new(config),
        };
        let server = TestServer::new(build_router(state, "http://localhost:3000")).unwrap();
        Self { server, store, keys }
    }

    fn env(&self) -> timebank_core::service::ServiceEnvironment {
        timebank_core::service::ServiceEnvironment::new(
            Arc::new(self.store.clone()),
            Arc::new(test_clock()),
        )
    }

    fn token(&self, user: UserId) -> String {
        let now = Utc::now();
        self.keys.issue(user, now, now + Duration::hours(1)).unwrap()
    }

    async fn create_booking(&self, receiver: UserId, provider: UserId, hours: i64) -> Booking {
        self.server
            .post("/api/booking")
            .authorization_bearer(self.token(receiver))
            .json(&json!({ "provider_id": provider, "hours": hours, "category": "gardening" }))
            .await
            .json()
    }

    async fn balance(&self, user: UserId) -> WalletBalance {
        self.server
            .get("/api/wallet/balance")
            .authorization_bearer(self.token(user))
            .await
            .json()
    }
}

#[tokio::test]
async fn health_is_public_and_api_requires_a_token() {
    let h = Harness::new();

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));

    let response = h.server.get("/api/wallet/balance").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");

    let response = h
        .server
        .get("/api/wallet/balance")
        .authorization_bearer("not-a-jwt")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_lifecycle_settles_hours() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::funded_user(&env, "alice", 10).await;
    let b = fixtures::user(&env, "bob").await;

    let response = h
        .server
        .post("/api/booking")
        .authorization_bearer(h.token(a.id))
        .json(&json!({ "provider_id": b.id, "hours": 5, "category": "gardening", "note": "Hedges" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let booking: Booking = response.json();
    assert_eq!(booking.status, BookingStatus::Pending);

    let accepted: Booking = h
        .server
        .patch(&format!("/api/booking/{}/accept", booking.id))
        .authorization_bearer(h.token(b.id))
        .json(&json!({ "slot": "2025-02-01T10:00:00Z" }))
        .await
        .json();
    assert_eq!(accepted.status, BookingStatus::Accepted);
    assert!(accepted.start_at.is_some());

    let response = h
        .server
        .post(&format!("/api/booking/{}/complete-confirm", booking.id))
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Booking>().status, BookingStatus::Completed);

    assert_eq!(h.balance(a.id).await.balance, Hours::whole(5));
    let bob = h.balance(b.id).await;
    assert_eq!((bob.balance, bob.earned, bob.spent), (Hours::whole(5), Hours::whole(5), Hours::ZERO));

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.ledger.iter().filter(|e| e.ref_booking_id == Some(booking.id)).count(), 2);
}

#[tokio::test]
async fn completion_without_enough_hours_is_rejected() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::funded_user(&env, "alice", 2).await;
    let b = fixtures::user(&env, "bob").await;
    let booking = fixtures::accepted_booking(&env, a.id, b.id, 5).await;
    let ledger_before = h.store.snapshot().await.ledger.len();

    let response = h
        .server
        .post(&format!("/booking/{}/complete-confirm", booking.id))
        .authorization_bearer(h.token(b.id))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(body["message"], "Insufficient balance");
    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.ledger.len(), ledger_before);
    assert_eq!(
        snapshot.bookings.iter().find(|x| x.id == booking.id).unwrap().status,
        BookingStatus::Accepted
    );
}

#[tokio::test]
async fn only_the_provider_answers_and_terminal_bookings_stay_put() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    let booking = h.create_booking(a.id, b.id, 1).await;

    let response = h
        .server
        .patch(&format!("/api/booking/{}/accept", booking.id))
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    h.server
        .patch(&format!("/api/booking/{}/cancel", booking.id))
        .authorization_bearer(h.token(a.id))
        .await
        .assert_status_ok();

    let response = h
        .server
        .patch(&format!("/api/booking/{}/accept", booking.id))
        .authorization_bearer(h.token(b.id))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn decline_notifies_the_receiver_without_ledger_rows() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    let booking = h.create_booking(a.id, b.id, 3).await;

    let declined: Booking = h
        .server
        .patch(&format!("/api/booking/{}/decline", booking.id))
        .authorization_bearer(h.token(b.id))
        .await
        .json();
    assert_eq!(declined.status, BookingStatus::Declined);

    let inbox: Vec<Notification> = h
        .server
        .get("/api/notifications")
        .add_query_param("unread", "true")
        .authorization_bearer(h.token(a.id))
        .await
        .json();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].payload.kind(), "BOOKING_DECLINED");
    assert!(h.store.snapshot().await.ledger.is_empty());

    let read: Notification = h
        .server
        .patch(&format!("/api/notifications/{}/read", inbox[0].id))
        .authorization_bearer(h.token(a.id))
        .await
        .json();
    assert!(read.read_at.is_some());
    let response = h
        .server
        .post("/api/notifications/read-all")
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_json(&json!({ "updated": 0 }));
}

#[tokio::test]
async fn listing_filters_by_role_and_status() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    h.create_booking(a.id, b.id, 1).await;
    h.create_booking(b.id, a.id, 2).await;

    let as_receiver: Vec<Booking> = h
        .server
        .get("/api/booking")
        .add_query_param("role", "receiver")
        .add_query_param("status", "pending")
        .authorization_bearer(h.token(a.id))
        .await
        .json();
    assert_eq!(as_receiver.len(), 1);
    assert_eq!(as_receiver[0].provider_id, b.id);

    let response = h
        .server
        .get("/api/booking")
        .add_query_param("role", "spectator")
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["details"][0]["field"], "role");
}

#[tokio::test]
async fn invalid_input_reports_field_details() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;

    let response = h
        .server
        .post("/api/booking")
        .authorization_bearer(h.token(a.id))
        .json(&json!({ "provider_id": b.id, "hours": 0, "category": "" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["details"].as_array().unwrap().len() >= 2);

    let response = h
        .server
        .post("/api/booking")
        .authorization_bearer(h.token(a.id))
        .text("{not json")
        .content_type("application/json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    let response = h
        .server
        .get("/api/booking/not-a-uuid")
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = h
        .server
        .get(&format!("/api/booking/{}", BookingId::new()))
        .authorization_bearer(h.token(a.id))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transfers_move_hours_and_show_in_history() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::funded_user(&env, "alice", 6).await;
    let b = fixtures::user(&env, "bob").await;

    let response = h
        .server
        .post("/transactions/transfer")
        .authorization_bearer(h.token(a.id))
        .json(&json!({ "receiver_id": b.id, "amount": "2.5", "description": "Thanks" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Transaction>().tx_type, TransactionType::Transfer);

    assert_eq!(h.balance(b.id).await.balance, "2.5".parse::<Hours>().unwrap());
    let history: Vec<Transaction> = h
        .server
        .get("/transactions")
        .authorization_bearer(h.token(b.id))
        .await
        .json();
    assert_eq!(history.len(), 1);

    let response = h
        .server
        .post("/api/transactions/transfer")
        .authorization_bearer(h.token(b.id))
        .json(&json!({ "receiver_id": a.id, "amount": 100 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Insufficient balance");
}

#[tokio::test]
async fn messages_and_ratings_round_out_a_booking() {
    let h = Harness::new();
    let env = h.env();
    let a = fixtures::funded_user(&env, "alice", 3).await;
    let b = fixtures::provider(&env, "bob", &["pruning"], &["gardening"]).await;
    let booking = fixtures::completed_booking(&env, a.id, b.id, 2).await;

    h.server
        .post("/api/messages")
        .authorization_bearer(h.token(b.id))
        .json(&json!({ "booking_id": booking.id, "body": "Thanks for having me" }))
        .await
        .assert_status(StatusCode::CREATED);
    let thread: Vec<Value> = h
        .server
        .get(&format!("/api/messages/booking/{}", booking.id))
        .authorization_bearer(h.token(a.id))
        .await
        .json();
    assert!(thread.iter().any(|m| m["body"] == "Thanks for having me"));

    let response = h
        .server
        .post("/api/ratings")
        .authorization_bearer(h.token(a.id))
        .json(&json!({ "booking_id": booking.id, "score": 5, "comment": "Great" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let again = h
        .server
        .post("/api/ratings")
        .authorization_bearer(h.token(a.id))
        .json(&json!({ "booking_id": booking.id, "score": 4 }))
        .await;
    again.assert_status(StatusCode::BAD_REQUEST);

    let received: Vec<Value> = h
        .server
        .get(&format!("/api/ratings/user/{}", b.id))
        .authorization_bearer(h.token(a.id))
        .await
        .json();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["score"], 5);
}

#[tokio::test]
async fn matching_ranks_providers() {
    let h = Harness::new();
    let env = h.env();
    let me = fixtures::user(&env, "me").await;
    let rustacean = fixtures::provider(&env, "ferris", &["rust", "sql"], &["tech"]).await;
    fixtures::provider(&env, "knitter", &["knitting"], &["crafts"]).await;

    let ranked: Vec<Value> = h
        .server
        .get("/api/matching")
        .add_query_param("skills", "rust,sql")
        .add_query_param("categories", "tech")
        .add_query_param("limit", "1")
        .authorization_bearer(h.token(me.id))
        .await
        .json();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["user_id"], json!(rustacean.id));
}

#[tokio::test]
async fn exhausted_clients_are_rate_limited() {
    let h = Harness::with_limit(RateLimitConfig {
        max_requests: 2,
        window: std::time::Duration::from_secs(900),
        ..RateLimitConfig::default()
    });

    h.server.get("/health").await.assert_status_ok();
    h.server.get("/health").await.assert_status_ok();
    let response = h.server.get("/health").await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>()["code"], "RATE_LIMITED");
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_budget() {
    let h = Harness::with_limit(RateLimitConfig {
        max_requests: 2,
        ..RateLimitConfig::default()
    });
    let forwarded = HeaderName::from_static("x-forwarded-for");

    for n in 1..=2 {
        h.server
            .get("/health")
            .add_header(forwarded.clone(), HeaderValue::from_str(&format!("203.0.113.{n}")).unwrap())
            .await
            .assert_status_ok();
    }
    h.server
        .get("/health")
        .add_header(forwarded, HeaderValue::from_static("203.0.113.99"))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}
