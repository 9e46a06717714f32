//! In-process tests of the HTTP boundary

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use evo_core::EvoConfig;
use evo_engine::EvolutionEngine;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let engine = EvolutionEngine::open(dir.path(), EvoConfig::default())
        .await
        .unwrap();
    (dir, evo_server::router(engine))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn quality_analysis() -> Value {
    json!({
        "applicationId": "app-1",
        "languages": ["typescript"],
        "suggestedAgents": [
            {
                "name": "Quality",
                "role": "quality",
                "purpose": "Keep code clean",
                "triggers": ["*.ts"],
                "capabilities": ["refactoring"],
                "priority": "important",
                "tier": 1
            }
        ]
    })
}

#[tokio::test]
async fn health() {
    let (_dir, app) = app().await;
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn analyze_then_track_then_apply() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, Method::POST, "/api/agents/analyze", Some(quality_analysis())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["createdCount"], 1);
    let agent_id = body["created"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, "/api/agents/analyze", Some(quality_analysis())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["createdCount"], 0);

    let (status, evolution) = send(
        &app,
        Method::POST,
        "/api/evolution/track",
        Some(json!({
            "applicationId": "app-1",
            "filePath": "/x.ts",
            "changeType": "file-modify",
            "metadata": "opaque string"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(evolution["responses"][0]["agentId"], agent_id.as_str());
    assert_eq!(evolution["responses"][0]["confidence"], 0.5);
    assert!(evolution["responses"][0].get("coordination").is_none());
    assert_eq!(evolution["event"]["metadata"], "opaque string");

    let (status, suggestions) =
        send(&app, Method::GET, "/api/applications/app-1/suggestions?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let suggestion_id = suggestions[0]["id"].as_str().unwrap().to_string();

    let (status, result) = send(
        &app,
        Method::POST,
        "/api/evolution/apply",
        Some(json!({
            "suggestionId": suggestion_id,
            "applicationId": "app-1",
            "outcome": {"success": true, "appliedTypes": ["refactoring"]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["result"], "recorded");
    assert_eq!(result["suggestionsAccepted"], 1);

    let (status, history) =
        send(&app, Method::GET, "/api/applications/app-1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, memory) =
        send(&app, Method::GET, &format!("/api/agents/{}/memory", agent_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(memory["patterns"][0]["pattern"], "file-modify_ts");
    assert_eq!(memory["successes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn track_validation_errors() {
    let (_dir, app) = app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolution/track",
        Some(json!({"filePath": "/x.ts"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("applicationId"));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolution/track",
        Some(json!({"applicationId": "app-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("filePath"));

    // Not JSON at all
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/evolution/track")
        .header("content-type", "application/json")
        .body(Body::from("{oops"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let (_dir, app) = app().await;

    for (method, uri) in [
        (Method::GET, "/api/agents/agent-missing"),
        (Method::DELETE, "/api/agents/agent-missing"),
        (Method::GET, "/api/agents/agent-missing/memory"),
        (Method::POST, "/api/agents/agent-missing/reset"),
    ] {
        let (status, body) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"]["category"], "not_found");
    }
}

#[tokio::test]
async fn operator_agent_management() {
    let (_dir, app) = app().await;
    let (_, body) = send(&app, Method::POST, "/api/agents/analyze", Some(quality_analysis())).await;
    let agent_id = body["created"][0]["id"].as_str().unwrap().to_string();
    let agent_uri = format!("/api/agents/{}", agent_id);

    let (status, agent) = send(
        &app,
        Method::PATCH,
        &agent_uri,
        Some(json!({"status": "inactive", "triggers": ["*.tsx"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["status"], "inactive");
    assert_eq!(agent["triggers"], json!(["*.tsx"]));

    let (_, active) = send(&app, Method::GET, "/api/applications/app-1/agents", None).await;
    assert!(active.as_array().unwrap().is_empty());
    let (_, all) = send(
        &app,
        Method::GET,
        "/api/applications/app-1/agents?include_inactive=true",
        None,
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    // inactive -> active skips learning
    let (status, body) = send(&app, Method::PATCH, &agent_uri, Some(json!({"status": "active"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");

    let (status, agent) = send(&app, Method::POST, &format!("{}/reset", agent_uri), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["status"], "learning");

    let (_, ecosystem) = send(&app, Method::GET, "/api/applications/app-1/ecosystem", None).await;
    assert_eq!(ecosystem["agentCount"], 1);
    assert_eq!(ecosystem["agentTypes"]["quality"], 1);

    let (status, _) = send(&app, Method::DELETE, &agent_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, ecosystem) = send(&app, Method::GET, "/api/applications/app-1/ecosystem", None).await;
    assert_eq!(ecosystem["agentCount"], 0);
}

#[tokio::test]
async fn apply_unknown_suggestion_is_tolerated() {
    let (_dir, app) = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolution/apply",
        Some(json!({
            "suggestionId": "gone",
            "applicationId": "app-1",
            "outcome": {"success": true}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "unknown_suggestion");
}

#[tokio::test]
async fn reset_population() {
    let (_dir, app) = app().await;
    send(&app, Method::POST, "/api/agents/analyze", Some(quality_analysis())).await;

    let mut replacement = quality_analysis();
    replacement["suggestedAgents"][0]["name"] = json!("Security");
    replacement["suggestedAgents"][0]["role"] = json!("security");

    let (status, body) = send(&app, Method::POST, "/api/agents/reset", Some(replacement)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["createdCount"], 1);

    let (_, agents) = send(&app, Method::GET, "/api/applications/app-1/agents", None).await;
    let names: Vec<_> = agents
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Security"]);
}
