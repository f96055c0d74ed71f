//! Router tests: requests go through the real middleware and handlers, with
//! the hosted backend, assistant and geocoder replaced by a mock server.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use agora_ai::{GeminiClient, Geocoder};
use agora_api::{AppStateInner, router};
use agora_db::Database;
use agora_gateway::realtime::RealtimeClient;
use agora_types::api::Claims;

const SECRET: &str = "test-secret-with-enough-entropy";
const KEY: &str = "service-key";

fn app(server: &MockServer, ai_key: Option<&str>) -> Router {
    let base = server.base_url();
    let state = Arc::new(AppStateInner {
        db: Database::new(&base, KEY),
        realtime: RealtimeClient::new(&base, KEY),
        ai: GeminiClient::new(ai_key.map(str::to_string), "gemini-1.5-flash".into(), base.clone()),
        live_model: "gemini-2.0-flash-exp".into(),
        geocoder: Geocoder::new(base, "agora-tests".into()),
        jwt_secret: SECRET.into(),
    });
    router(state)
}

fn token_for(user_id: Uuid, audience: &str) -> String {
    let claims = Claims {
        sub: user_id,
        email: Some("student@example.edu".into()),
        role: "authenticated".into(),
        aud: audience.into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn request(method: &str, uri: &str, user_id: Uuid, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id, "authenticated")));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_row(id: Uuid, user_id: Uuid) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "content": "study group at six",
        "image_url": null,
        "group_id": null,
        "created_at": "2024-05-01T10:00:00Z"
    })
}

#[tokio::test]
async fn health_needs_no_token() {
    let server = MockServer::start_async().await;
    let resp = app(&server, None)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");
}

#[tokio::test]
async fn missing_or_foreign_token_is_rejected() {
    let server = MockServer::start_async().await;

    let resp = app(&server, None)
        .oneshot(Request::get("/posts").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(resp).await["error"].is_string());

    let wrong_audience = Request::get("/posts")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", token_for(Uuid::new_v4(), "anon")),
        )
        .body(Body::empty())
        .unwrap();
    let resp = app(&server, None).oneshot(wrong_audience).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blank_post_is_a_bad_request() {
    let server = MockServer::start_async().await;
    let resp = app(&server, None)
        .oneshot(request("POST", "/posts", Uuid::new_v4(), Some(json!({ "content": "   " }))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "content must not be empty");
}

#[tokio::test]
async fn create_post_returns_hydrated_post() {
    let server = MockServer::start_async().await;
    let user = Uuid::new_v4();
    let post_id = Uuid::new_v4();

    let insert = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/posts")
                .json_body_partial(json!({ "user_id": user, "content": "study group at six" }).to_string());
            then.status(201).json_body(json!([post_row(post_id, user)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/profiles");
            then.status(200).json_body(json!([{
                "id": user,
                "username": "ada",
                "full_name": "Ada L.",
                "avatar_url": null,
                "bio": null,
                "university": null,
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": null
            }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/comments");
            then.status(200).json_body(json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/reactions");
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            "/posts",
            user,
            Some(json!({ "content": "  study group at six " })),
        ))
        .await
        .unwrap();

    insert.assert_async().await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["id"], post_id.to_string());
    assert_eq!(body["author"]["username"], "ada");
    assert_eq!(body["comment_count"], 0);
}

#[tokio::test]
async fn deleting_someone_elses_post_is_forbidden() {
    let server = MockServer::start_async().await;
    let post_id = Uuid::new_v4();
    let author = Uuid::new_v4();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/posts")
                .query_param("id", format!("eq.{}", post_id));
            then.status(200).json_body(json!([post_row(post_id, author)]));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/rest/v1/posts");
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("DELETE", &format!("/posts/{}", post_id), Uuid::new_v4(), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(delete.hits_async().await, 0);
}

#[tokio::test]
async fn chat_with_yourself_is_rejected() {
    let server = MockServer::start_async().await;
    let me = Uuid::new_v4();
    let resp = app(&server, None)
        .oneshot(request("POST", "/chats", me, Some(json!({ "peer_id": me }))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn channel_history_requires_membership() {
    let server = MockServer::start_async().await;
    let channel_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/channels");
            then.status(200).json_body(json!([{
                "id": channel_id,
                "group_id": group_id,
                "name": "general",
                "description": null,
                "created_at": "2024-01-01T00:00:00Z"
            }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/group_members")
                .query_param("group_id", format!("eq.{}", group_id));
            then.status(200).json_body(json!([]));
        })
        .await;
    let messages = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/messages");
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "GET",
            &format!("/channels/{}/messages", channel_id),
            Uuid::new_v4(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(messages.hits_async().await, 0);
}

#[tokio::test]
async fn matching_your_own_rides_is_rejected() {
    let server = MockServer::start_async().await;
    let me = Uuid::new_v4();
    let (request_id, offer_id) = (Uuid::new_v4(), Uuid::new_v4());

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/ride_requests");
            then.status(200).json_body(json!([{
                "id": request_id,
                "user_id": me,
                "origin": "Campus",
                "destination": "Airport",
                "departure_time": "2099-01-01T08:00:00Z",
                "seats_needed": 1,
                "status": "open",
                "notes": null,
                "created_at": "2024-01-01T00:00:00Z"
            }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/ride_offers");
            then.status(200).json_body(json!([{
                "id": offer_id,
                "user_id": me,
                "origin": "Campus",
                "destination": "Airport",
                "departure_time": "2099-01-01T08:00:00Z",
                "seats_available": 3,
                "price": 5.0,
                "status": "open",
                "notes": null,
                "created_at": "2024-01-01T00:00:00Z"
            }]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            "/rides/matches",
            me,
            Some(json!({ "request_id": request_id, "offer_id": offer_id })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assistant_without_key_is_unavailable() {
    let server = MockServer::start_async().await;
    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            "/ai/chat",
            Uuid::new_v4(),
            Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn assistant_reply_is_relayed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-1.5-flash:generateContent")
                .query_param("key", "ai-key");
            then.status(200).json_body(json!({
                "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Hello!" }] } }]
            }));
        })
        .await;

    let resp = app(&server, Some("ai-key"))
        .oneshot(request(
            "POST",
            "/ai/chat",
            Uuid::new_v4(),
            Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["reply"], "Hello!");
}

#[tokio::test]
async fn vision_rejects_garbage_base64() {
    let server = MockServer::start_async().await;
    let resp = app(&server, Some("ai-key"))
        .oneshot(request(
            "POST",
            "/ai/vision",
            Uuid::new_v4(),
            Some(json!({ "prompt": "what is this?", "image_base64": "@@not base64@@", "mime_type": "image/png" })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn database_failure_hides_details() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/groups");
            then.status(500).body("permission denied for table groups");
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("GET", "/groups", Uuid::new_v4(), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"], "internal server error");
}

#[tokio::test]
async fn reverse_geocode_passes_through() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/reverse")
                .query_param("format", "json")
                .header("user-agent", "agora-tests");
            then.status(200).json_body(json!({
                "display_name": "Main Library, College Road",
                "address": { "road": "College Road" }
            }));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("GET", "/geocode/reverse?lat=51.5&lon=-0.12", Uuid::new_v4(), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["display_name"], "Main Library, College Road");
    assert_eq!(body["address"]["road"], "College Road");
}

fn group_row(id: Uuid, is_private: bool) -> Value {
    json!({
        "id": id,
        "name": "Robotics club",
        "description": null,
        "avatar_url": null,
        "created_by": Uuid::new_v4(),
        "is_private": is_private,
        "created_at": "2024-01-01T00:00:00Z"
    })
}

fn ride_request_row(id: Uuid, user_id: Uuid, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "origin": "Campus",
        "destination": "Airport",
        "departure_time": "2099-01-01T08:00:00Z",
        "seats_needed": 1,
        "status": status,
        "notes": null,
        "created_at": "2024-01-01T00:00:00Z"
    })
}

fn ride_offer_row(id: Uuid, user_id: Uuid, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "origin": "Campus",
        "destination": "Airport",
        "departure_time": "2099-01-01T08:00:00Z",
        "seats_available": 3,
        "price": null,
        "status": status,
        "notes": null,
        "created_at": "2024-01-01T00:00:00Z"
    })
}

fn match_row(id: Uuid, request_id: Uuid, offer_id: Uuid, status: &str) -> Value {
    json!({
        "id": id,
        "request_id": request_id,
        "offer_id": offer_id,
        "status": status,
        "created_at": "2024-01-01T00:00:00Z"
    })
}

/// A post in a private group the caller has not joined.
async fn mock_private_group_post(server: &MockServer, post_id: Uuid) {
    let group_id = Uuid::new_v4();
    let mut post = post_row(post_id, Uuid::new_v4());
    post["group_id"] = json!(group_id);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/posts");
            then.status(200).json_body(json!([post]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/groups")
                .query_param("id", format!("eq.{}", group_id));
            then.status(200).json_body(json!([group_row(group_id, true)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/group_members");
            then.status(200).json_body(json!([]));
        })
        .await;
}

#[tokio::test]
async fn user_posts_leave_out_private_groups_of_strangers() {
    let server = MockServer::start_async().await;
    let (viewer, author) = (Uuid::new_v4(), Uuid::new_v4());
    let public_group = Uuid::new_v4();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/group_members")
                .query_param("user_id", format!("eq.{}", viewer));
            then.status(200).json_body(json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/groups")
                .query_param("is_private", "eq.false");
            then.status(200).json_body(json!([{ "id": public_group }]));
        })
        .await;
    let posts = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/posts")
                .query_param("user_id", format!("eq.{}", author))
                .query_param("or", format!("(group_id.is.null,group_id.in.({}))", public_group));
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("GET", &format!("/users/{}/posts", author), viewer, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    posts.assert_async().await;
    assert_eq!(body_json(resp).await, json!([]));
}

#[tokio::test]
async fn private_group_posts_take_no_comments_or_reactions_from_outsiders() {
    let server = MockServer::start_async().await;
    let post_id = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    mock_private_group_post(&server, post_id).await;

    let comments = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/comments");
            then.status(200).json_body(json!([]));
        })
        .await;
    let writes = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(201).json_body(json!([]));
        })
        .await;

    let uri = format!("/posts/{}/comments", post_id);
    let resp = app(&server, None)
        .oneshot(request("GET", &uri, stranger, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app(&server, None)
        .oneshot(request("POST", &uri, stranger, Some(json!({ "content": "count me in" }))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            &format!("/posts/{}/reactions", post_id),
            stranger,
            Some(json!({ "reaction_type": "like" })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert_eq!(comments.hits_async().await, 0);
    assert_eq!(writes.hits_async().await, 0);
}

#[tokio::test]
async fn private_groups_are_closed_to_outsiders() {
    let server = MockServer::start_async().await;
    let group_id = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/groups");
            then.status(200).json_body(json!([group_row(group_id, true)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/group_members");
            then.status(200).json_body(json!([]));
        })
        .await;
    let join = server
        .mock_async(|when, then| {
            when.method(POST).path("/rest/v1/group_members");
            then.status(201).json_body(json!([]));
        })
        .await;
    let feed = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/posts");
            then.status(200).json_body(json!([]));
        })
        .await;

    for (method, uri) in [
        ("POST", format!("/groups/{}/join", group_id)),
        ("GET", format!("/groups/{}/members", group_id)),
        ("GET", format!("/posts?group_id={}", group_id)),
    ] {
        let resp = app(&server, None)
            .oneshot(request(method, &uri, stranger, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
    }

    assert_eq!(join.hits_async().await, 0);
    assert_eq!(feed.hits_async().await, 0);
}

#[tokio::test]
async fn first_profile_save_needs_a_free_username() {
    let server = MockServer::start_async().await;
    let me = Uuid::new_v4();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/profiles")
                .query_param("id", format!("eq.{}", me));
            then.status(200).json_body(json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/profiles")
                .query_param("username", "eq.ada");
            then.status(200).json_body(json!([{
                "id": Uuid::new_v4(),
                "username": "ada",
                "full_name": null,
                "avatar_url": null,
                "bio": null,
                "university": null,
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": null
            }]));
        })
        .await;
    let upsert = server
        .mock_async(|when, then| {
            when.method(POST).path("/rest/v1/profiles");
            then.status(201).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("PUT", "/profiles/me", me, Some(json!({ "bio": "hi" }))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app(&server, None)
        .oneshot(request("PUT", "/profiles/me", me, Some(json!({ "username": "ada" }))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    assert_eq!(upsert.hits_async().await, 0);
}

#[tokio::test]
async fn deleting_a_missing_comment_is_not_found() {
    let server = MockServer::start_async().await;
    let comment_id = Uuid::new_v4();
    let me = Uuid::new_v4();
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/rest/v1/comments")
                .query_param("id", format!("eq.{}", comment_id))
                .query_param("user_id", format!("eq.{}", me));
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request("DELETE", &format!("/comments/{}", comment_id), me, None))
        .await
        .unwrap();

    delete.assert_async().await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

struct RideFixture {
    match_id: Uuid,
    request_id: Uuid,
    driver: Uuid,
}

/// A pending match between a rider's request and a driver's offer, with the
/// given request and offer statuses.
async fn mock_pending_match(server: &MockServer, request_status: &str, offer_status: &str) -> RideFixture {
    let (match_id, request_id, offer_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (rider, driver) = (Uuid::new_v4(), Uuid::new_v4());

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/ride_matches");
            then.status(200)
                .json_body(json!([match_row(match_id, request_id, offer_id, "pending")]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/ride_offers");
            then.status(200)
                .json_body(json!([ride_offer_row(offer_id, driver, offer_status)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/ride_requests");
            then.status(200)
                .json_body(json!([ride_request_row(request_id, rider, request_status)]));
        })
        .await;

    RideFixture {
        match_id,
        request_id,
        driver,
    }
}

#[tokio::test]
async fn driver_accepting_marks_the_request_matched() {
    let server = MockServer::start_async().await;
    let ride = mock_pending_match(&server, "open", "open").await;

    let answer = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/ride_matches")
                .query_param("id", format!("eq.{}", ride.match_id))
                .query_param("status", "eq.pending")
                .json_body(json!({ "status": "accepted" }));
            then.status(200).json_body(json!([match_row(
                ride.match_id,
                ride.request_id,
                Uuid::new_v4(),
                "accepted"
            )]));
        })
        .await;
    let matched = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/ride_requests")
                .query_param("id", format!("eq.{}", ride.request_id))
                .json_body(json!({ "status": "matched" }));
            then.status(200)
                .json_body(json!([ride_request_row(ride.request_id, Uuid::new_v4(), "matched")]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            &format!("/rides/matches/{}/accept", ride.match_id),
            ride.driver,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "accepted");
    answer.assert_async().await;
    matched.assert_async().await;
}

#[tokio::test]
async fn only_the_driver_answers_a_match() {
    let server = MockServer::start_async().await;
    let ride = mock_pending_match(&server, "open", "open").await;
    let patches = server
        .mock_async(|when, then| {
            when.method(PATCH);
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            &format!("/rides/matches/{}/reject", ride.match_id),
            Uuid::new_v4(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(patches.hits_async().await, 0);
}

#[tokio::test]
async fn accepting_a_closed_ride_conflicts() {
    let server = MockServer::start_async().await;
    let ride = mock_pending_match(&server, "matched", "cancelled").await;
    let patches = server
        .mock_async(|when, then| {
            when.method(PATCH);
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            &format!("/rides/matches/{}/accept", ride.match_id),
            ride.driver,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(patches.hits_async().await, 0);
}

#[tokio::test]
async fn match_answered_in_the_meantime_conflicts() {
    let server = MockServer::start_async().await;
    let ride = mock_pending_match(&server, "open", "open").await;
    // The pending filter matched nothing: someone else answered first.
    server
        .mock_async(|when, then| {
            when.method(PATCH).path("/rest/v1/ride_matches");
            then.status(200).json_body(json!([]));
        })
        .await;
    let matched = server
        .mock_async(|when, then| {
            when.method(PATCH).path("/rest/v1/ride_requests");
            then.status(200).json_body(json!([]));
        })
        .await;

    let resp = app(&server, None)
        .oneshot(request(
            "POST",
            &format!("/rides/matches/{}/accept", ride.match_id),
            ride.driver,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(matched.hits_async().await, 0);
}
