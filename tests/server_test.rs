//! Integration tests for the knee telemetry HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use axum::{extract::State, routing::post, Json, Router};
    use knee_telemetry::classifier::{Classifier, DenseModel};
    use knee_telemetry::dialogue::{DialogueComposer, NO_DATA_REPLY};
    use knee_telemetry::generation::{GeminiClient, GenerationConfig};
    use knee_telemetry::server::{run, ServerConfig, ServerState};
    use knee_telemetry::store::TelemetryStore;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Abnormal when |gx| is large.
    const GYRO_MODEL: &str = r#"{
        "labels": ["normal", "abnormal"],
        "layers": [{
            "weights": [
                [0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]
            ],
            "bias": [1.0, -1.0],
            "activation": "softmax"
        }]
    }"#;

    #[derive(Clone, Copy)]
    enum Upstream {
        Reply,
        Fail,
        Hang,
    }

    #[derive(Clone)]
    struct MockGemini {
        mode: Upstream,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    async fn generate_content(
        State(mock): State<MockGemini>,
        Json(body): Json<Value>,
    ) -> (axum::http::StatusCode, Json<Value>) {
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        mock.prompts.lock().unwrap().push(prompt);

        match mock.mode {
            Upstream::Reply => (
                axum::http::StatusCode::OK,
                Json(json!({
                    "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Keep stretching daily!" }] } }]
                })),
            ),
            Upstream::Fail => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "message": "secret upstream detail" } })),
            ),
            Upstream::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                (axum::http::StatusCode::OK, Json(json!({})))
            }
        }
    }

    async fn start_mock_gemini(mode: Upstream) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let mock = MockGemini {
            mode,
            prompts: Arc::clone(&prompts),
        };
        let app = Router::new()
            .route("/v1/models/:model", post(generate_content))
            .with_state(mock);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, prompts)
    }

    struct TestServer {
        addr: SocketAddr,
        prompts: Arc<Mutex<Vec<String>>>,
        shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn upstream_calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
        }
    }

    async fn start_server(store: TelemetryStore, upstream: Upstream) -> TestServer {
        let (mock_addr, prompts) = start_mock_gemini(upstream).await;

        let classifier = Classifier::new(Box::new(DenseModel::from_json(GYRO_MODEL).unwrap()));
        let dialogue = DialogueComposer::new(store.clone(), 20, chrono_tz::Tz::UTC);
        let generator = GeminiClient::new(
            GenerationConfig::new(format!("http://{mock_addr}"), "gemini-1.5-pro", "test-key")
                .with_timeout(Duration::from_millis(300)),
        )
        .unwrap();

        let state = ServerState::new(classifier, store, dialogue, generator);
        let (addr, shutdown_tx) = run(ServerConfig::local(0), state)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestServer {
            addr,
            prompts,
            shutdown: Some(shutdown_tx),
        }
    }

    fn sample(user_id: &str, gx: f64) -> Value {
        json!({
            "user_id": user_id,
            "x": 0.25, "y": -9.75, "z": 1.5,
            "gx": gx, "gy": -0.5, "gz": 0.12,
            "knee_angle": 42.0
        })
    }

    async fn record(client: &reqwest::Client, server: &TestServer, body: &Value) -> reqwest::Response {
        client
            .post(server.url("/record"))
            .json(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;

        let response = reqwest::get(server.url("/health")).await.unwrap();
        assert!(response.status().is_success());

        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "OK");
        assert!(body["version"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_predict() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let response = client
            .post(server.url("/predict"))
            .json(&json!({"x": 0.1, "y": 9.8, "z": 0.0, "gx": 0.1, "gy": 0.0, "gz": 0.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["prediction_class"], "normal");

        let response = client
            .post(server.url("/predict"))
            .json(&json!({"x": 0.1, "y": 9.8, "z": 0.0, "gx": 6.0, "gy": 0.0, "gz": 0.0, "knee_angle": 80}))
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["prediction_class"], "abnormal");
    }

    #[tokio::test]
    async fn test_predict_validation_errors() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let response = client
            .post(server.url("/predict"))
            .json(&json!({"x": 0.1, "y": 9.8, "z": 0.0, "gy": 0.0, "gz": 0.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("'gx'"));
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let response = client
            .post(server.url("/predict"))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_record_and_history_round_trip() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let response = record(&client, &server, &sample("alice", 0.5)).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "saved");
        assert_eq!(body["prediction_class"], "normal");

        record(&client, &server, &sample("bob", 0.5)).await;

        let history: Vec<Value> = client
            .get(server.url("/history?user_id=alice"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        let entry = &history[0];
        assert_eq!(entry["user_id"], "alice");
        assert_eq!(entry["x"], 0.25);
        assert_eq!(entry["y"], -9.75);
        assert_eq!(entry["z"], 1.5);
        assert_eq!(entry["gx"], 0.5);
        assert_eq!(entry["gy"], -0.5);
        assert_eq!(entry["gz"], 0.12);
        assert_eq!(entry["knee_angle"], 42.0);
        assert_eq!(entry["prediction"], "normal");
        assert!(entry["timestamp"].as_str().is_some());
        assert!(entry.get("id").is_none());
        assert!(entry.get("_id").is_none());
    }

    #[tokio::test]
    async fn test_history_empty_is_not_an_error() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;

        let response = reqwest::get(server.url("/history?user_id=nobody")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Vec<Value> = response.json().await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_id() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let mut body = sample("x", 0.5);
        body.as_object_mut().unwrap().remove("user_id");
        let response = record(&client, &server, &body).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        for path in ["/history", "/history?user_id=", "/assessment"] {
            let response = client.get(server.url(path)).send().await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST, "{path}");
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["error"], "user_id is required");
        }
    }

    #[tokio::test]
    async fn test_record_non_string_user_id_is_validation_error() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let mut body = sample("x", 0.5);
        body["user_id"] = json!(42);
        let response = record(&client, &server, &body).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["code"], "VALIDATION_ERROR");
        assert_eq!(error["error"], "user_id must be a string");

        body["user_id"] = Value::Null;
        let response = record(&client, &server, &body).await;
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["code"], "MISSING_USER_ID");
    }

    #[tokio::test]
    async fn test_record_invalid_reading_is_not_persisted() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let mut body = sample("alice", 0.5);
        body.as_object_mut().unwrap().remove("z");
        let response = record(&client, &server, &body).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let history: Vec<Value> = reqwest::get(server.url("/history?user_id=alice"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_assessment() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let response = client
            .get(server.url("/assessment?user_id=alice"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        for gx in [0.1, 0.2, 0.3, 7.5] {
            let body = json!({
                "user_id": "alice",
                "x": 0.0, "y": 3.0, "z": 4.0,
                "gx": gx, "gy": 0.0, "gz": 0.0
            });
            record(&client, &server, &body).await;
        }

        let body: Value = client
            .get(server.url("/assessment?user_id=alice"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total_readings"], 4);
        assert_eq!(body["abnormal_percentage"], 25.0);
        assert_eq!(body["average_acceleration_magnitude"], 5.0);
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let server = start_server(TelemetryStore::offline("connection refused"), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let response = record(&client, &server, &sample("alice", 0.5)).await;
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "STORE_UNAVAILABLE");

        for path in ["/history?user_id=alice", "/assessment?user_id=alice"] {
            let response = client.get(server.url(path)).send().await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        }

        let response = client
            .post(server.url("/chatbot"))
            .json(&json!({"user_id": "alice", "message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(server.upstream_calls(), 0);

        // Classification does not depend on the store.
        let response = client
            .post(server.url("/predict"))
            .json(&sample("alice", 0.5))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chatbot_without_data_skips_upstream() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(server.url("/chatbot"))
            .json(&json!({"user_id": "ghost", "message": "How is my knee?"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["response"], NO_DATA_REPLY);
        assert_eq!(server.upstream_calls(), 0);
    }

    #[tokio::test]
    async fn test_chatbot_grounds_prompt_in_readings() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        record(&client, &server, &sample("alice", 0.5)).await;
        record(&client, &server, &sample("alice", 6.0)).await;

        let response = client
            .post(server.url("/chatbot"))
            .json(&json!({"user_id": "alice", "message": "Was today better?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["response"], "Keep stretching daily!");

        let prompts = server.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("user 'alice'"));
        assert!(prompt.contains("The user says: \"Was today better?\""));
        assert!(prompt.contains(
            "Prediction: abnormal, Accel: (0.25,-9.75,1.50), Gyro: (6.00,-0.50,0.12)"
        ));
        assert!(prompt.contains(
            "Prediction: normal, Accel: (0.25,-9.75,1.50), Gyro: (0.50,-0.50,0.12)"
        ));
    }

    #[tokio::test]
    async fn test_chatbot_missing_fields() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;
        let client = reqwest::Client::new();

        for body in [json!({"user_id": "alice"}), json!({"message": "hi"}), json!({"user_id": "", "message": "hi"})] {
            let response = client
                .post(server.url("/chatbot"))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        }
        assert_eq!(server.upstream_calls(), 0);
    }

    #[tokio::test]
    async fn test_chatbot_upstream_error_is_generic() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Fail).await;
        let client = reqwest::Client::new();
        record(&client, &server, &sample("alice", 0.5)).await;

        let response = client
            .post(server.url("/chatbot"))
            .json(&json!({"user_id": "alice", "message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        let text = response.text().await.unwrap();
        assert!(!text.contains("secret upstream detail"));
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["code"], "UPSTREAM_ERROR");
        assert_eq!(server.upstream_calls(), 1);
    }

    #[tokio::test]
    async fn test_chatbot_upstream_timeout() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Hang).await;
        let client = reqwest::Client::new();
        record(&client, &server, &sample("alice", 0.5)).await;

        let response = client
            .post(server.url("/chatbot"))
            .json(&json!({"user_id": "alice", "message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "UPSTREAM_TIMEOUT");
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let server = start_server(TelemetryStore::in_memory(), Upstream::Reply).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, server.url("/record"))
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );
    }
}
