//! Integration tests for the Pxls API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Time is driven by a `ManualClock` so cooldown
//! boundaries are exact.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pxls_api::router::build_router;
use pxls_api::state::AppState;
use pxls_core::{
    Board, BoardEvent, BoardStorage, BroadcastHub, Clock, CooldownTracker, ManualClock, Palette,
    PersistHandle, Persister, PlacementService, StorageError,
};
use serde_json::Value;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "s3cret";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
}

/// 3x3 board, palette of two colors, five second cooldown.
fn make_app(admin_token: Option<&str>) -> TestApp {
    make_app_sized(3, 3, admin_token)
}

fn make_app_sized(width: u32, height: u32, admin_token: Option<&str>) -> TestApp {
    let palette = Palette::new(vec!["#FFFFFF".to_owned(), "#000000".to_owned()]).unwrap();
    let board = Arc::new(Board::new(width, height, palette).unwrap());
    let cooldowns = Arc::new(CooldownTracker::new(Duration::from_secs(5)));
    let hub = Arc::new(BroadcastHub::default());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let placement = Arc::new(PlacementService::new(
        board,
        cooldowns,
        hub,
        PersistHandle::detached(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));

    let mut state = AppState::new(placement);
    if let Some(token) = admin_token {
        state = state.with_admin_token(token);
    }
    let state = Arc::new(state);

    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        clock,
    }
}

fn place_form(identity: &str, body: &str) -> Request<Body> {
    Request::post("/place")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-forwarded-for", identity)
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =========================================================================
// Board reads
// =========================================================================

#[tokio::test]
async fn test_board_info() {
    let app = make_app(None);

    let response = app.router.oneshot(get("/boardinfo")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["width"], 3);
    assert_eq!(json["height"], 3);
    assert_eq!(json["palette"], serde_json::json!(["#FFFFFF", "#000000"]));
}

#[tokio::test]
async fn test_board_data_is_raw_bytes() {
    let app = make_app(None);
    app.state.board().set_cell(2, 1, 1).unwrap();

    let response = app.router.oneshot(get("/boarddata")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), &[0, 0, 0, 0, 0, 1, 0, 0, 0]);
}

#[tokio::test]
async fn test_cooldown_for_new_client_is_zero() {
    let app = make_app(None);

    let response = app.router.oneshot(get("/cooldown")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, 0.0);
}

// =========================================================================
// Placement
// =========================================================================

#[tokio::test]
async fn test_place_success_returns_cooldown() {
    let app = make_app(None);

    let response = app
        .router
        .clone()
        .oneshot(place_form("10.0.0.1", "x=1&y=1&color=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["wait"], 5.0);
    assert_eq!(app.state.board().get_cell(1, 1).unwrap(), 1);

    let response = app
        .router
        .oneshot(
            Request::get("/cooldown")
                .header("x-forwarded-for", "10.0.0.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, 5.0);
}

#[tokio::test]
async fn test_cooldown_walkthrough() {
    let app = make_app(None);

    let response = app
        .router
        .clone()
        .oneshot(place_form("A", "x=1&y=1&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.clock.advance_millis(3_000);
    let response = app
        .router
        .clone()
        .oneshot(place_form("A", "x=0&y=0&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["wait"], 2.0);
    assert!(json["error"].is_string());
    assert_eq!(app.state.board().get_cell(0, 0).unwrap(), 0);

    app.clock.advance_millis(3_000);
    let response = app
        .router
        .oneshot(place_form("A", "x=0&y=0&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.board().get_cell(0, 0).unwrap(), 1);
}

#[tokio::test]
async fn test_place_accepts_json_body() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(
            Request::post("/place")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "json-client")
                .body(Body::from(r#"{"x":2,"y":2,"color":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.board().get_cell(2, 2).unwrap(), 1);
}

#[tokio::test]
async fn test_place_invalid_coordinates() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(place_form("A", "x=3&y=0&color=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Invalid coordinates");
    assert_eq!(app.state.board().snapshot(), vec![0; 9]);
    assert!(app.state.cooldowns().last_placement(&"A".into()).is_none());
}

#[tokio::test]
async fn test_place_negative_coordinates() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(place_form("A", "x=-1&y=0&color=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Invalid coordinates");
}

#[tokio::test]
async fn test_place_invalid_color() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(place_form("A", "x=0&y=0&color=5"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Invalid color");
    assert_eq!(app.state.board().snapshot(), vec![0; 9]);
}

#[tokio::test]
async fn test_place_malformed_body_is_bad_request() {
    let app = make_app(None);

    for body in ["x=one&y=0&color=1", "y=0&color=1", ""] {
        let response = app
            .router
            .clone()
            .oneshot(place_form("A", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        let json = body_to_json(response.into_body()).await;
        assert!(json["error"].is_string());
    }
    assert_eq!(app.state.board().snapshot(), vec![0; 9]);
}

#[tokio::test]
async fn test_identities_cool_down_independently() {
    let app = make_app(None);

    for (identity, x) in [("A", 0), ("B", 1), ("C", 2)] {
        let response = app
            .router
            .clone()
            .oneshot(place_form(identity, &format!("x={x}&y=0&color=1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "identity {identity}");
    }

    let response = app
        .router
        .oneshot(place_form("A", "x=0&y=1&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn test_place_is_broadcast_to_subscribers() {
    let app = make_app(None);
    let mut requester = app.state.hub().subscribe();
    let mut other = app.state.hub().subscribe();

    let response = app
        .router
        .oneshot(place_form("A", "x=2&y=0&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected = BoardEvent::Pixel {
        x: 2,
        y: 0,
        color: 1,
    };
    assert_eq!(requester.try_recv(), Some(expected.clone()));
    assert_eq!(other.try_recv(), Some(expected));
}

#[tokio::test]
async fn test_rejected_place_is_not_broadcast() {
    let app = make_app(None);
    let mut sub = app.state.hub().subscribe();

    let response = app
        .router
        .oneshot(place_form("A", "x=9&y=9&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(sub.try_recv(), None);
}

#[tokio::test]
async fn test_concurrent_placements_on_distinct_cells() {
    let app = make_app_sized(16, 16, None);

    let mut tasks = Vec::new();
    for i in 0..256u32 {
        let router = app.router.clone();
        tasks.push(tokio::spawn(async move {
            let body = format!("x={}&y={}&color=1", i % 16, i / 16);
            router
                .oneshot(place_form(&format!("client-{i}"), &body))
                .await
                .unwrap()
                .status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.state.board().snapshot(), vec![1; 256]);
    assert_eq!(app.state.cooldowns().tracked_identities(), 256);
}

#[tokio::test]
async fn test_place_reads_query_parameters() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(
            Request::post("/place?x=1&y=2&color=1")
                .header("x-forwarded-for", "query-client")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.board().get_cell(1, 2).unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_placements_on_one_cell() {
    let app = make_app(None);
    let mut sub = app.state.hub().subscribe();

    let mut tasks = Vec::new();
    for i in 0..64u32 {
        let router = app.router.clone();
        tasks.push(tokio::spawn(async move {
            let body = format!("x=1&y=1&color={}", i % 2);
            router
                .oneshot(place_form(&format!("client-{i}"), &body))
                .await
                .unwrap()
                .status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let cell = app.state.board().get_cell(1, 1).unwrap();
    assert!(cell < 2);
    let mut last = None;
    let mut received = 0;
    while let Some(event) = sub.try_recv() {
        last = Some(event);
        received += 1;
    }
    assert_eq!(received, 64);
    assert_eq!(
        last,
        Some(BoardEvent::Pixel {
            x: 1,
            y: 1,
            color: cell
        })
    );
}

struct ReadOnlyStorage;

impl BoardStorage for ReadOnlyStorage {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }

    fn save(&self, _data: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("read-only volume".to_owned()))
    }
}

#[tokio::test]
async fn test_place_succeeds_when_saving_fails() {
    let palette = Palette::new(vec!["#FFFFFF".to_owned(), "#000000".to_owned()]).unwrap();
    let board = Arc::new(Board::new(3, 3, palette).unwrap());
    let persister = Persister::new(Arc::clone(&board), Arc::new(ReadOnlyStorage));
    let persist = persister.handle();
    let persist_task = persister.spawn();
    let hub = Arc::new(BroadcastHub::default());
    let mut sub = hub.subscribe();
    let placement = Arc::new(PlacementService::new(
        board,
        Arc::new(CooldownTracker::new(Duration::from_secs(5))),
        hub,
        persist.clone(),
        Arc::new(ManualClock::new(0)) as Arc<dyn Clock>,
    ));
    let state = Arc::new(AppState::new(placement));
    let router = build_router(Arc::clone(&state));

    let response = router
        .oneshot(place_form("A", "x=2&y=2&color=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["wait"], 5.0);
    assert_eq!(state.board().get_cell(2, 2).unwrap(), 1);
    assert_eq!(
        sub.try_recv(),
        Some(BoardEvent::Pixel {
            x: 2,
            y: 2,
            color: 1
        })
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while persist.failed_saves() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(state.board().get_cell(2, 2).unwrap(), 1);

    persist.shutdown();
    persist_task.await.unwrap();
}

// =========================================================================
// Operator
// =========================================================================

#[tokio::test]
async fn test_admin_hidden_without_configured_token() {
    let app = make_app(None);

    let response = app
        .router
        .oneshot(get("/admin/changeCooldown?token=anything&cooldown=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.state.cooldowns().cooldown(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_admin_rejects_missing_or_wrong_token() {
    let app = make_app(Some(ADMIN_TOKEN));

    for uri in [
        "/admin/changeCooldown?cooldown=1",
        "/admin/changeCooldown?token=wrong&cooldown=1",
        "/admin/alert?token=s3cre&message=hi",
    ] {
        let response = app.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {uri}");
    }
    assert_eq!(app.state.cooldowns().cooldown(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_admin_change_cooldown() {
    let app = make_app(Some(ADMIN_TOKEN));

    let response = app
        .router
        .clone()
        .oneshot(place_form("A", "x=0&y=0&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(get("/admin/changeCooldown?token=s3cret&cooldown=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_to_string(response.into_body()).await,
        "Cooldown changed to 0"
    );
    assert_eq!(app.state.cooldowns().cooldown(), Duration::ZERO);

    // The shorter cooldown frees the client straight away.
    let response = app
        .router
        .oneshot(place_form("A", "x=1&y=0&color=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["wait"], 0.0);
}

#[tokio::test]
async fn test_admin_change_cooldown_rejects_garbage() {
    let app = make_app(Some(ADMIN_TOKEN));

    for uri in [
        "/admin/changeCooldown?token=s3cret&cooldown=-3",
        "/admin/changeCooldown?token=s3cret&cooldown=soon",
        "/admin/changeCooldown?token=s3cret",
    ] {
        let response = app.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
    }
    assert_eq!(app.state.cooldowns().cooldown(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_admin_alert_reaches_subscribers() {
    let app = make_app(Some(ADMIN_TOKEN));
    let mut sub = app.state.hub().subscribe();

    let response = app
        .router
        .oneshot(get("/admin/alert?token=s3cret&message=reset%20at%20noon"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_to_string(response.into_body()).await,
        "Alerted reset at noon"
    );
    assert_eq!(
        sub.try_recv(),
        Some(BoardEvent::Alert {
            message: "reset at noon".to_owned()
        })
    );
}

#[tokio::test]
async fn test_admin_alert_requires_message() {
    let app = make_app(Some(ADMIN_TOKEN));

    let response = app
        .router
        .oneshot(get("/admin/alert?token=s3cret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let app = make_app(Some(ADMIN_TOKEN));

    let response = app
        .router
        .clone()
        .oneshot(get("/api/nonexistent"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(get("/admin/nope?token=s3cret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
