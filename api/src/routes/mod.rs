pub mod actions;
pub mod client;
pub mod progress;
pub mod users;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(actions::routes())
        .merge(progress::routes())
        .merge(users::routes())
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_app;
    use crate::config::Rules;
    use crate::services::rate_limit::RateLimitConfig;
    use crate::store::memory::MemoryStore;
    use crate::models::{ActionTargets, NewActionRecord, RawAction};
    use crate::services::anti_cheat::parse_action;
    use axum::{
        body::{Body, to_bytes},
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const PEER: &str = "203.0.113.50";

    fn app(store: Arc<MemoryStore>, ping_burst: u32) -> Router {
        let state = AppState::new(
            store,
            Rules::default(),
            RateLimitConfig {
                max_tokens: ping_burst,
                refill_rate: 0.0,
            },
        );
        build_app(Arc::new(state), None)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send_from(app, PEER, None, method, uri, body).await
    }

    /// Send with a socket peer and an optional X-Forwarded-For header
    async fn send_from(
        app: &Router,
        peer: &str,
        forwarded_for: Option<&str>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(chain) = forwarded_for {
            builder = builder.header("x-forwarded-for", chain);
        }
        let mut request = builder
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let addr = SocketAddr::new(peer.parse().unwrap(), 40000);
        request.extensions_mut().insert(ConnectInfo(addr));

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(Arc::new(MemoryStore::new()), 5);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn second_like_within_cooldown_is_429() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(1);
        let app = app(store.clone(), 5);
        let body = json!({
            "userId": 1,
            "action": "video_like",
            "videoId": "v1",
            "timestamp": Utc::now().timestamp_millis(),
        });

        let (status, first) = send(&app, "POST", "/actions/track", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        assert_eq!(first["xpAwarded"], 40);
        assert_eq!(first["totalXP"], 40);
        assert_eq!(first["level"], 1);

        let (status, second) = send(&app, "POST", "/actions/track", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second["valid"], false);
        assert!(second["cooldownRemaining"].as_i64().unwrap() > 0);

        let log = store.actions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].ip_address.as_deref(), Some(PEER));
    }

    /// 100 actions from `ip` by other users over the last four minutes
    fn saturate_network(store: &MemoryStore, ip: &str) {
        let now = Utc::now();
        for i in 0..100 {
            let created_at = now - Duration::milliseconds(2_400 * i);
            let raw = RawAction {
                user_id: Some(1000 + i),
                action_type: Some("video_watch".into()),
                targets: ActionTargets {
                    video_id: Some(format!("v{i}")),
                    ..Default::default()
                },
                timestamp: Some(created_at.timestamp_millis()),
                metadata: None,
            };
            store.push_record(NewActionRecord {
                action: parse_action(&raw, None).unwrap(),
                ip_address: Some(ip.to_string()),
                user_agent: None,
                xp_awarded: 25,
                created_at,
            });
        }
    }

    fn watch(user_id: i64) -> Value {
        json!({
            "userId": user_id,
            "action": "video_watch",
            "videoId": "fresh",
            "timestamp": Utc::now().timestamp_millis(),
        })
    }

    #[tokio::test]
    async fn spoofed_forwarding_header_does_not_bypass_network_limit() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(11);
        saturate_network(&store, "203.0.113.7");
        let app = app(store.clone(), 5);

        for forwarded_for in [None, Some("127.0.0.1"), Some("198.51.100.77")] {
            let (status, body) = send_from(
                &app,
                "203.0.113.7",
                forwarded_for,
                "POST",
                "/actions/track",
                Some(watch(11)),
            )
            .await;
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{forwarded_for:?}");
            assert_eq!(body["reason"], "too many actions from this network");
        }
        assert_eq!(store.user(11).map(|u| u.total_xp), Some(0));
    }

    #[tokio::test]
    async fn trusted_proxy_reports_the_client_address() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(12);
        saturate_network(&store, "203.0.113.7");
        let state = AppState::new(
            store.clone(),
            Rules::default(),
            RateLimitConfig {
                max_tokens: 5,
                refill_rate: 0.0,
            },
        )
        .with_trusted_proxies(vec!["10.0.0.2".parse().unwrap()]);
        let app = build_app(Arc::new(state), None);

        // A loopback claim from the client is left of the hop the proxy added
        let (status, _) = send_from(
            &app,
            "10.0.0.2",
            Some("127.0.0.1, 203.0.113.7"),
            "POST",
            "/actions/track",
            Some(watch(12)),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send_from(
            &app,
            "10.0.0.2",
            Some("198.51.100.8"),
            "POST",
            "/actions/track",
            Some(watch(12)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let log = store.actions();
        assert_eq!(log.last().and_then(|r| r.ip_address.as_deref()), Some("198.51.100.8"));
    }

    #[tokio::test]
    async fn validate_reports_validity_without_recording() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone(), 5);

        let (status, body) = send(
            &app,
            "POST",
            "/actions/validate",
            Some(json!({
                "userId": 3,
                "action": "quiz_complete",
                "quizId": "q1",
                "timestamp": Utc::now().timestamp_millis(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert!(store.actions().is_empty());

        let (status, body) = send(
            &app,
            "POST",
            "/actions/validate",
            Some(json!({ "userId": 3, "action": "quiz_complete" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["reason"], "missing timestamp");
    }

    #[tokio::test]
    async fn track_advanced_returns_breakdown() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(2);
        let app = app(store, 5);

        let (status, body) = send(
            &app,
            "POST",
            "/progress/track-advanced",
            Some(json!({
                "userId": 2,
                "activityType": "video_watch",
                "videoId": "intro",
                "metadata": { "engagementScore": 80 },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["xp"]["baseXP"], 25);
        assert_eq!(body["xp"]["totalXP"], 60);
        assert_eq!(body["user"]["totalXP"], 60);
        assert_eq!(body["currentStreak"], 1);
        assert!(body["newAchievements"].as_array().unwrap().is_empty());
        assert!(body.get("levelUp").is_none());
    }

    #[tokio::test]
    async fn track_for_unknown_user_is_404() {
        let app = app(Arc::new(MemoryStore::new()), 5);
        let (status, body) = send(
            &app,
            "POST",
            "/progress/track-advanced",
            Some(json!({ "userId": 77, "activityType": "video_watch", "videoId": "v" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user not found");
    }

    #[tokio::test]
    async fn bad_engagement_score_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(4);
        let app = app(store, 5);

        let (status, body) = send(
            &app,
            "POST",
            "/progress/engagement-bonus",
            Some(json!({ "userId": 4, "videoId": "v", "engagementScore": 140 })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["reason"], "invalid engagementScore");
    }

    #[tokio::test]
    async fn completion_bonus_is_granted_once() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(5);
        let app = app(store.clone(), 5);
        let body = json!({
            "userId": 5,
            "videoId": "v1",
            "completionPercentage": 80,
            "engagementScore": 65,
        });

        let (status, first) =
            send(&app, "POST", "/progress/video-complete", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        assert_eq!(first["xpAwarded"], 52);
        assert_eq!(first["alreadyClaimed"], false);

        let (status, second) = send(&app, "POST", "/progress/video-complete", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["xpAwarded"], 0);
        assert_eq!(second["alreadyClaimed"], true);
        assert_eq!(store.user(5).map(|u| u.total_xp), Some(52));
    }

    #[tokio::test]
    async fn bonus_pings_are_throttled_per_user() {
        let store = Arc::new(MemoryStore::new());
        store.add_user(6);
        let app = app(store, 2);
        let body = json!({
            "userId": 6,
            "videoId": "v1",
            "watchTimeMinutes": 1,
            "engagementScore": 75,
        });

        for _ in 0..2 {
            let (status, grant) =
                send(&app, "POST", "/progress/watch-bonus", Some(body.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(grant["multiplier"], 10);
            assert_eq!(grant["xpAwarded"], 10);
        }

        let (status, _) = send(&app, "POST", "/progress/watch-bonus", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn progress_view_and_catalog() {
        let store = Arc::new(MemoryStore::new());
        store.put_user(crate::models::UserState {
            id: 8,
            total_xp: 450,
            level: 3,
            unlocked_achievements: vec!["streak_3".into()],
            ..Default::default()
        });
        let app = app(store, 5);

        let (status, view) = send(&app, "GET", "/users/8/progress", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["level"], 3);
        assert_eq!(view["xpToNextLevel"], 450);
        assert_eq!(view["achievements"][0]["id"], "streak_3");

        let (status, _) = send(&app, "GET", "/users/9/progress", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, catalog) = send(&app, "GET", "/achievements", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            catalog
                .as_array()
                .unwrap()
                .iter()
                .any(|a| a["id"] == "video_explorer" && a["xpReward"] == 100)
        );
    }
}
