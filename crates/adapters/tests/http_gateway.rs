use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use nlq_adapters::http::HttpGateway;
use nlq_core::chart::ChartKind;
use nlq_core::connection_session::{ConnectionCredentials, ConnectionSession, ConnectionState};
use nlq_core::gateway::{BackendReply, ChartRequest, QueryGateway};
use nlq_core::results_table::{TableView, NULL_PLACEHOLDER};
use nlq_core::session::QuerySession;
use serde_json::{json, Value};

const NOT_CONNECTED: &str = "Database not connected. Please connect to database first.";

fn tiny_png_base64() -> String {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&13_u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&320_u32.to_be_bytes());
    png.extend_from_slice(&200_u32.to_be_bytes());
    base64::engine::general_purpose::STANDARD.encode(png)
}

async fn database_status() -> Json<Value> {
    Json(json!({"connected": false}))
}

async fn connect_database(Json(body): Json<Value>) -> Json<Value> {
    if body["password"] == "secret" && body["port"] == 3306 {
        Json(json!({"message": "Successfully connected to database", "status": "success"}))
    } else {
        Json(json!({"error": "Connection error: access denied", "status": "error"}))
    }
}

async fn generate_sql(Json(body): Json<Value>) -> Response {
    match body["query"].as_str() {
        Some("offline") => {
            (StatusCode::BAD_REQUEST, Json(json!({"detail": NOT_CONNECTED}))).into_response()
        }
        Some("nonsense") => Json(json!({"error": "Failed to generate SQL query."})).into_response(),
        _ => Json(json!({"sql_query": "SELECT name, age FROM users"})).into_response(),
    }
}

async fn execute_sql(Json(body): Json<Value>) -> Json<Value> {
    match body["query"].as_str() {
        Some("SELECT name, age FROM users") => Json(json!({
            "results": [
                {"name": "Alice", "age": 30},
                {"name": "Bob", "age": null}
            ],
            "optimization_tips": ""
        })),
        Some("SELECT nothing") => Json(json!({"results": []})),
        _ => Json(json!({
            "error": "Error executing the SQL query. Check backend logs for details."
        })),
    }
}

async fn download_csv(Json(body): Json<Value>) -> Response {
    if body["query"] == "SELECT name, age FROM users" {
        "name,age\nAlice,30\nBob,\n".into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"detail": "No data to download."}))).into_response()
    }
}

async fn generate_graph(Json(body): Json<Value>) -> Json<Value> {
    if body["chart_type"] == "pie" {
        return Json(json!({"error": "no numeric column"}));
    }
    assert!(body.get("chart_name").is_none());
    Json(json!({
        "image_base64": tiny_png_base64(),
        "insights": "Alice is the only user with a known age."
    }))
}

async fn spawn_backend() -> HttpGateway {
    let app = Router::new()
        .route("/database_status", get(database_status))
        .route("/connect_database", post(connect_database))
        .route("/generate_sql", post(generate_sql))
        .route("/execute_sql", post(execute_sql))
        .route("/download_csv", post(download_csv))
        .route("/generate_graph", post(generate_graph));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fake backend should bind");
    let addr = listener
        .local_addr()
        .expect("fake backend should have an address");
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("fake backend should serve");
    });

    HttpGateway::new(format!("http://{addr}/"))
}

#[tokio::test]
async fn connection_gate_follows_backend_replies() {
    let gateway = spawn_backend().await;
    let mut connection = ConnectionSession::new();

    assert_eq!(
        connection.check_status(&gateway).await,
        ConnectionState::Disconnected
    );

    let wrong = ConnectionCredentials::new("localhost", "root", "nope", "shop");
    let err = connection
        .connect(&gateway, &wrong)
        .await
        .expect_err("wrong password should be rejected");
    assert_eq!(err.to_string(), "Connection error: access denied");
    assert!(connection.is_gated());

    let right = ConnectionCredentials::new("localhost", "root", "secret", "shop");
    connection
        .connect(&gateway, &right)
        .await
        .expect("connect should succeed");
    assert!(connection.is_connected());
}

#[tokio::test]
async fn query_workflow_round_trip_over_http() {
    let gateway = spawn_backend().await;
    let mut session = QuerySession::new(None);

    session
        .generate(&gateway, "names and ages of users")
        .await
        .expect("generate should succeed");
    assert_eq!(session.workflow().sql(), "SELECT name, age FROM users");

    session
        .execute(&gateway)
        .await
        .expect("execute should succeed");
    assert!(session.workflow().has_results());
    assert!(session.workflow().optimization_tips().is_none());

    let TableView::Grid(grid) = session.workflow().table() else {
        panic!("expected a populated grid");
    };
    assert_eq!(grid.columns(), ["name", "age"]);
    assert_eq!(grid.rows()[1].index, 2);
    assert_eq!(grid.rows()[1].cells, vec!["Bob", NULL_PLACEHOLDER]);

    let csv = session
        .download_csv(&gateway)
        .await
        .expect("download should succeed")
        .expect("download should not be skipped");
    assert_eq!(csv, b"name,age\nAlice,30\nBob,\n");

    session
        .generate_chart(&gateway)
        .await
        .expect("chart should succeed");
    let image = session.chart().image().expect("image should be stored");
    assert_eq!(image.dimensions(), (320, 200));
    assert_eq!(
        session.chart().insights(),
        Some("Alice is the only user with a known age.")
    );

    session.set_chart_type(ChartKind::Pie);
    let err = session
        .generate_chart(&gateway)
        .await
        .expect_err("pie chart should be refused by the backend");
    assert_eq!(err.to_string(), "no numeric column");
    assert!(session.chart().image().is_none());
}

#[tokio::test]
async fn error_details_and_error_fields_are_surfaced() {
    let gateway = spawn_backend().await;
    let mut session = QuerySession::new(None);

    let err = session
        .generate(&gateway, "offline")
        .await
        .expect_err("generation should fail");
    assert_eq!(err.to_string(), NOT_CONNECTED);

    let err = session
        .generate(&gateway, "nonsense")
        .await
        .expect_err("generation should fail");
    assert_eq!(err.to_string(), "Failed to generate SQL query.");

    session.edit_sql("SELECT broken");
    let err = session
        .execute(&gateway)
        .await
        .expect_err("execution should fail");
    assert_eq!(
        err.to_string(),
        "Error executing the SQL query. Check backend logs for details."
    );

    session.edit_sql("SELECT nothing");
    session.execute(&gateway).await.expect("empty execution");
    assert!(!session.workflow().has_results());
    let err = session
        .download_csv(&gateway)
        .await
        .expect_err("download should fail");
    assert_eq!(err.to_string(), "No data to download.");
}

#[tokio::test]
async fn gateway_replies_are_tagged() {
    let gateway = spawn_backend().await;

    let reply = gateway
        .generate_sql("nonsense")
        .await
        .expect("transport should succeed");
    assert_eq!(
        reply,
        BackendReply::Failure("Failed to generate SQL query.".to_string())
    );

    let reply = gateway
        .generate_graph(&ChartRequest {
            sql: "SELECT name, age FROM users".to_string(),
            chart_type: ChartKind::Bar,
            chart_name: None,
        })
        .await
        .expect("transport should succeed");
    assert!(matches!(reply, BackendReply::Success(_)));
}

#[tokio::test]
async fn unreachable_backend_uses_fallback_messages() {
    let gateway = HttpGateway::new("http://127.0.0.1:9");
    let mut connection = ConnectionSession::new();
    assert_eq!(
        connection.check_status(&gateway).await,
        ConnectionState::Disconnected
    );

    let mut session = QuerySession::new(None);
    let err = session
        .generate(&gateway, "anything")
        .await
        .expect_err("generation should fail");
    assert_eq!(err.to_string(), "Failed to generate query. Please try again.");
}
