use alumni_shared::auth::create_test_request;
use alumni_shared::models::{AttendanceStatus, PaymentStatus};
use alumni_shared::test_utils::http_test_utils::response_to_json;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;

use super::simulated_gateway::{DECLINED_TOKEN, UNREACHABLE_TOKEN};
use super::{create_test_app, test_event, with_capacity, with_deadline, with_fee, TestStore};

fn register_request(event_id: &str, user_id: &str) -> Request<Body> {
    create_test_request("POST", &format!("/events/{}/register", event_id), user_id, None)
}

fn cancel_request(event_id: &str, user_id: &str) -> Request<Body> {
    create_test_request("DELETE", &format!("/events/{}/register", event_id), user_id, None)
}

fn pay_request(event_id: &str, user_id: &str, token: &str) -> Request<Body> {
    create_test_request(
        "POST",
        &format!("/events/{}/register/payment", event_id),
        user_id,
        Some(serde_json::json!({ "paymentToken": token })),
    )
}

#[tokio::test]
async fn test_register_success() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["event"]["attendeeCount"], 1);
    assert_eq!(json["attendance"]["userId"], "user-a");
    assert_eq!(json["attendance"]["status"], "registered");
    // Free events need no payment step
    assert_eq!(json["attendance"]["paymentStatus"], "paid");

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.active_count(), 1);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_register_unknown_event() {
    let t = create_test_app().await;

    let response = t
        .app
        .clone()
        .oneshot(register_request("missing-event", "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_to_json(response).await;
    assert_eq!(json["error"], "event_not_found");
}

#[tokio::test]
async fn test_register_when_registration_not_required() {
    let t = create_test_app().await;
    let mut event = test_event("organizer");
    event.registration.is_required = false;
    let event = t.store.create_event(event).await;

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_to_json(response).await;
    assert_eq!(json["error"], "registration_not_required");
}

#[tokio::test]
async fn test_register_after_deadline_fails_with_capacity_left() {
    let t = create_test_app().await;
    let event = with_deadline(
        with_capacity(test_event("organizer"), 100),
        Utc::now() - Duration::days(1),
    );
    let event = t.store.create_event(event).await;

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    let json = response_to_json(response).await;
    assert_eq!(json["error"], "deadline_passed");
    assert!(json["message"].is_string());

    let stored = t.store.get_event(&event.id).await;
    assert!(stored.attendees.is_empty());
}

#[tokio::test]
async fn test_capacity_one_second_user_rejected() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_capacity(test_event("organizer"), 1))
        .await;

    let first = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(response_to_json(first).await["event"]["attendeeCount"], 1);

    let second = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-b"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(response_to_json(second).await["error"], "capacity_exceeded");
}

#[tokio::test]
async fn test_concurrent_registrations_for_last_seat() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_capacity(test_event("organizer"), 1))
        .await;

    let app1 = t.app.clone();
    let app2 = t.app.clone();
    let request1 = register_request(&event.id, "user-a");
    let request2 = register_request(&event.id, "user-b");

    let task1 = tokio::spawn(async move { app1.oneshot(request1).await });
    let task2 = tokio::spawn(async move { app2.oneshot(request2).await });

    let (result1, result2) = tokio::join!(task1, task2);
    let response1 = result1.unwrap().unwrap();
    let response2 = result2.unwrap().unwrap();

    let statuses = vec![response1.status(), response2.status()];
    assert!(statuses.contains(&StatusCode::OK), "One request should succeed");
    assert!(
        statuses.contains(&StatusCode::CONFLICT),
        "One request should fail with CONFLICT"
    );

    let loser = if response1.status() == StatusCode::CONFLICT {
        response1
    } else {
        response2
    };
    assert_eq!(response_to_json(loser).await["error"], "capacity_exceeded");

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.active_count(), 1);
}

#[tokio::test]
async fn test_concurrent_registrations_never_exceed_capacity() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_capacity(test_event("organizer"), 3))
        .await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let app = t.app.clone();
        let request = register_request(&event.id, &format!("user-{}", i));
        tasks.push(tokio::spawn(async move { app.oneshot(request).await }));
    }

    let mut accepted = 0;
    let mut full = 0;
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        match response.status() {
            StatusCode::OK => accepted += 1,
            StatusCode::CONFLICT => full += 1,
            // Heavy contention may exhaust the retry budget; that is a
            // transient failure, never an over-commit.
            StatusCode::SERVICE_UNAVAILABLE => {}
            other => panic!("Unexpected status {}", other),
        }
    }

    let stored = t.store.get_event(&event.id).await;
    assert!(accepted <= 3);
    assert_eq!(stored.active_count(), accepted);
    assert!(accepted + full <= 10);
}

#[tokio::test]
async fn test_register_twice_is_rejected() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    let first = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(response_to_json(second).await["error"], "already_registered");

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.attendees.len(), 1);
}

#[tokio::test]
async fn test_cancel_registration() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(cancel_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["event"]["attendeeCount"], 0);
    assert_eq!(json["attendance"]["status"], "cancelled");
    assert!(json["attendance"]["cancelledAt"].is_string());
    assert_eq!(json["refundPending"], false);

    // The record stays as history
    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.attendees.len(), 1);
    assert_eq!(stored.attendees[0].status, AttendanceStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_without_registration() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    let response = t
        .app
        .clone()
        .oneshot(cancel_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response_to_json(response).await["error"], "not_registered");
}

#[tokio::test]
async fn test_register_cancel_register_leaves_one_active_record() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_capacity(test_event("organizer"), 1))
        .await;

    for request in [
        register_request(&event.id, "user-a"),
        cancel_request(&event.id, "user-a"),
        register_request(&event.id, "user-a"),
    ] {
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stored = t.store.get_event(&event.id).await;
    let statuses: Vec<_> = stored.attendees.iter().map(|a| a.status).collect();
    assert_eq!(
        statuses,
        vec![AttendanceStatus::Cancelled, AttendanceStatus::Registered]
    );
    assert_eq!(stored.active_count(), 1);
}

#[tokio::test]
async fn test_register_retries_after_version_conflict() {
    let t = create_test_app().await;
    let TestStore::Mock(mock) = &t.store else {
        return;
    };
    let event = t.store.create_event(test_event("organizer")).await;
    mock.inject_conflicts(2);

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(mock.update_calls(), 3);
}

#[tokio::test]
async fn test_register_gives_up_after_repeated_conflicts() {
    let t = create_test_app().await;
    let TestStore::Mock(mock) = &t.store else {
        return;
    };
    let event = t.store.create_event(test_event("organizer")).await;
    mock.inject_conflicts(100);

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response_to_json(response).await["error"], "conflict");
    assert_eq!(mock.update_calls(), 5);
    assert!(t.store.get_event(&event.id).await.attendees.is_empty());
}

#[tokio::test]
async fn test_paid_event_payment_and_refund() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    let response = t
        .app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["attendance"]["paymentStatus"], "pending");
    assert_eq!(json["event"]["registration"]["fee"]["amount"], 2500);

    let response = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response_to_json(response).await["attendance"]["paymentStatus"],
        "paid"
    );
    assert_eq!(t.payments.charges(), 1);

    let response = t
        .app
        .clone()
        .oneshot(cancel_request(&event.id, "user-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["attendance"]["paymentStatus"], "refunded");
    assert_eq!(json["refundPending"], false);
    assert_eq!(t.payments.refunds(), 1);

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.attendees[0].payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_failed_refund_is_reported() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    t.app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();
    t.payments.fail_refunds(true);

    let response = t
        .app
        .clone()
        .oneshot(cancel_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["attendance"]["status"], "cancelled");
    assert_eq!(json["attendance"]["paymentStatus"], "paid");
    assert_eq!(json["refundPending"], true);
}

#[tokio::test]
async fn test_cancel_succeeds_when_refund_cannot_be_recorded() {
    let t = create_test_app().await;
    let TestStore::Mock(mock) = &t.store else {
        return;
    };
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    t.app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();

    // Every write after the refund loses its race
    t.payments.contend_after_refund(mock.clone(), 100);

    let response = t
        .app
        .clone()
        .oneshot(cancel_request(&event.id, "user-a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_to_json(response).await;
    assert_eq!(json["attendance"]["status"], "cancelled");
    assert_eq!(json["event"]["attendeeCount"], 0);
    assert_eq!(json["refundPending"], false);
    assert_eq!(json["refundUnrecorded"], true);
    assert_eq!(t.payments.refunds(), 1);

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.attendees[0].status, AttendanceStatus::Cancelled);
    assert_eq!(stored.active_count(), 0);
}

#[tokio::test]
async fn test_payment_declined() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", DECLINED_TOKEN))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response_to_json(response).await["error"], "payment_declined");

    let stored = t.store.get_event(&event.id).await;
    assert_eq!(stored.attendees[0].payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_payment_gateway_unreachable() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", UNREACHABLE_TOKEN))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response_to_json(response).await["error"],
        "payment_gateway_error"
    );
}

#[tokio::test]
async fn test_pay_free_event() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_to_json(response).await["error"],
        "payment_not_required"
    );
    assert_eq!(t.payments.charges(), 0);
}

#[tokio::test]
async fn test_pay_twice() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    t.app
        .clone()
        .oneshot(register_request(&event.id, "user-a"))
        .await
        .unwrap();
    let first = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(response_to_json(second).await["error"], "already_paid");
    assert_eq!(t.payments.charges(), 1);
}

#[tokio::test]
async fn test_pay_requires_registration() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    let response = t
        .app
        .clone()
        .oneshot(pay_request(&event.id, "user-a", "tok_visa"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response_to_json(response).await["error"], "not_registered");
}

#[tokio::test]
async fn test_pay_with_malformed_body() {
    let t = create_test_app().await;
    let event = t
        .store
        .create_event(with_fee(test_event("organizer"), 2500))
        .await;

    let response = t
        .app
        .clone()
        .oneshot(create_test_request(
            "POST",
            &format!("/events/{}/register/payment", event.id),
            "user-a",
            Some(serde_json::json!({ "token": 42 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_to_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_register_requires_auth() {
    let t = create_test_app().await;
    let event = t.store.create_event(test_event("organizer")).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/events/{}/register", event.id))
        .body(Body::empty())
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_to_json(response).await["error"], "unauthorized");
}
