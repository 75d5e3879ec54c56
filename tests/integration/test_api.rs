//! Integration tests for the HTTP API against a live server.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use classroom_engine::{create_router, AppState, Classroom, Config, MemoryStore};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns a server over an empty store and returns its base URL.
async fn spawn_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let config = Config::default();
    let classroom = Classroom::new(Arc::new(MemoryStore::new()), config.clone());
    let router = create_router(AppState::new(config, classroom));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}/api"), handle)
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client.post(url).json(&body).send().await.expect("request failed");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn put(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client.put(url).json(&body).send().await.expect("request failed");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let response = client.get(url).send().await.expect("request failed");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

fn ids(nodes: &Value) -> Vec<String> {
    nodes
        .as_array()
        .expect("expected an array")
        .iter()
        .map(|n| n["id"].as_str().expect("id").to_string())
        .collect()
}

/// Tests authoring, enrollment, grading and max-score sync over HTTP.
#[tokio::test]
async fn test_course_lifecycle_over_http() {
    let (base, handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let (status, module) = post(
        &client,
        format!("{base}/scopes/c1/modules"),
        json!({"tier": "course", "title": "Unit 1", "type": "progress"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let module_id = module["id"].as_str().expect("module id").to_string();

    for title in ["A", "B", "C"] {
        let (status, _) = post(
            &client,
            format!("{base}/modules/{module_id}/exercises"),
            json!({"title": title, "maxScore": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, course_exercises) = get(&client, format!("{base}/modules/{module_id}/exercises")).await;
    let course_ids = ids(&course_exercises);

    let (status, report) = post(
        &client,
        format!("{base}/courses/c1/students/s1/enroll"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["enrollment"]["scopeId"], "c1/students/s1");

    let (_, modules) = get(&client, format!("{base}/courses/c1/students/s1/modules")).await;
    let student_module = ids(&modules)[0].clone();
    let (_, exercises) = get(&client, format!("{base}/modules/{student_module}/exercises")).await;
    let student_ids = ids(&exercises);
    let statuses: Vec<&str> = exercises
        .as_array()
        .expect("array")
        .iter()
        .map(|e| e["progress"]["status"].as_str().expect("status"))
        .collect();
    assert_eq!(statuses, ["ready", "pending", "pending"]);
    assert_eq!(exercises[0]["courseExerciseRef"], course_ids[0].as_str());

    let (status, update) = put(
        &client,
        format!("{base}/exercises/{}/score", student_ids[0]),
        json!({"score": 8}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["unlocked"], json!([student_ids[1]]));

    let (status, _) = put(
        &client,
        format!("{base}/exercises/{}/max-score", course_ids[0]),
        json!({"maxScore": 20}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, exercises) = get(&client, format!("{base}/modules/{student_module}/exercises")).await;
    assert_eq!(exercises[0]["maxScore"], 20);
    assert_eq!(exercises[0]["progress"]["score"], 16);
    assert_eq!(exercises[1]["progress"]["status"], "ready");

    let (status, summary) = get(&client, format!("{base}/courses/c1/students/s1/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["completedExercises"], 1);
    assert_eq!(summary["totalPoints"], 30);
    assert_eq!(summary["averageScore"], 80.0);
    assert_eq!(summary["earnedPoints"], 24);

    let (_, stats) = get(&client, format!("{base}/status")).await;
    assert_eq!(stats["stats"]["enrollments"], 1);
    assert_eq!(stats["stats"]["exercises"], 6);

    handle.abort();
}

/// Tests that engine errors come back with their mapped status and body.
#[tokio::test]
async fn test_error_responses() {
    let (base, handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, format!("{base}/courses/c1/students/ghost/summary")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().expect("error").contains("enrollment"));

    let (status, _) = post(
        &client,
        format!("{base}/scopes/c1/modules"),
        json!({"tier": "student", "title": "Sneaky"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &client,
        format!("{base}/courses/empty/students/s1/enroll"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    handle.abort();
}

/// Tests that concurrent module moves over HTTP leave a whole chain.
#[tokio::test]
async fn test_concurrent_module_moves() {
    let (base, handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    for title in ["One", "Two", "Three", "Four"] {
        post(
            &client,
            format!("{base}/scopes/c1/modules"),
            json!({"tier": "course", "title": title}),
        )
        .await;
    }
    let (_, modules) = get(&client, format!("{base}/scopes/c1/modules")).await;
    let mut original = ids(&modules);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let client = client.clone();
            let url = format!("{base}/scopes/c1/modules/{}/move", original[i % 4]);
            tokio::spawn(async move {
                let (status, _) = post(&client, url, json!({"targetIndex": (i * 3) % 4})).await;
                assert_eq!(status, StatusCode::OK);
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("move task panicked");
    }

    let (_, modules) = get(&client, format!("{base}/scopes/c1/modules")).await;
    let mut after = ids(&modules);
    assert!(modules[0]["previous"].is_null());
    assert!(modules[3]["next"].is_null());

    after.sort();
    original.sort();
    assert_eq!(after, original);

    handle.abort();
}
