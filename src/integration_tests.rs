// ABOUTME: Integration tests for API endpoints
// ABOUTME: Drives the full router with a real SQLite database, a fake payment processor, and signed session tokens

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::payments::{PaymentError, PaymentSheetParams};
    use crate::types::PaymentSheetResponse;
    use async_trait::async_trait;
    use axum::http::{header, HeaderName, HeaderValue, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use identity::JwtVerifier;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const JWT_SECRET: &[u8] = b"integration-secret";
    const HOST: &str = "shop.test";

    #[derive(Default)]
    struct RecordingPayments {
        calls: Mutex<Vec<PaymentSheetParams>>,
    }

    #[async_trait]
    impl PaymentProcessor for RecordingPayments {
        async fn create_payment_sheet(
            &self,
            params: &PaymentSheetParams,
        ) -> std::result::Result<PaymentSheetResponse, PaymentError> {
            self.calls.lock().unwrap().push(params.clone());
            Ok(PaymentSheetResponse {
                payment_intent: "pi_secret_test".to_string(),
                ephemeral_key: "ek_secret_test".to_string(),
                customer: "cus_test".to_string(),
                publishable_key: "pk_test".to_string(),
            })
        }
    }

    struct TestApp {
        server: TestServer,
        payments: Arc<RecordingPayments>,
        storage: Arc<Storage>,
        assets_dir: TempDir,
        _data_dir: TempDir,
    }

    async fn create_test_app() -> TestApp {
        let data_dir = TempDir::new().unwrap();
        let assets_dir = TempDir::new().unwrap();

        let db_url = format!("sqlite:{}?mode=rwc", data_dir.path().join("test.db").display());
        let storage = Arc::new(Storage::connect(&db_url).await.unwrap());
        let assets = Arc::new(AssetStore::new(
            assets_dir.path().to_path_buf(),
            data_dir.path().join("uploads"),
            1024 * 1024,
        ));
        let payments = Arc::new(RecordingPayments::default());

        let state = AppState {
            storage: storage.clone(),
            assets,
            payments: payments.clone(),
            identity: Arc::new(JwtVerifier::from_secret(JWT_SECRET)),
        };

        TestApp {
            server: TestServer::new(app(state)).unwrap(),
            payments,
            storage,
            assets_dir,
            _data_dir: data_dir,
        }
    }

    fn session_token(sub: &str) -> String {
        #[derive(serde::Serialize)]
        struct Claims<'a> {
            sub: &'a str,
            exp: i64,
        }

        encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub,
                exp: chrono::Utc::now().timestamp() + 600,
            },
            &EncodingKey::from_secret(JWT_SECRET),
        )
        .unwrap()
    }

    fn bearer(sub: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", session_token(sub))).unwrap()
    }

    fn host() -> (HeaderName, HeaderValue) {
        (header::HOST, HeaderValue::from_static(HOST))
    }

    async fn provision(server: &TestServer, external_id: &str, email: &str) {
        server
            .post("/webhooks/clerk")
            .json(&json!({
                "type": "user.created",
                "data": {
                    "id": external_id,
                    "primary_email_address_id": "idn_1",
                    "email_addresses": [{ "id": "idn_1", "email_address": email }]
                }
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    async fn create_article(server: &TestServer, title: &str, price: &str, image: &str) -> Value {
        let form = MultipartForm::new()
            .add_text("title", title)
            .add_text("description", format!("A fine {title}"))
            .add_text("price", price)
            .add_text("imageUrl", image);

        let response = server.post("/articles").multipart(form).await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app().await;

        let response = app.server.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
        assert_eq!(
            response.header(header::X_CONTENT_TYPE_OPTIONS),
            HeaderValue::from_static("nosniff")
        );
    }

    #[tokio::test]
    async fn test_article_crud_flow() {
        let app = create_test_app().await;

        let created = create_article(&app.server, "Chair", "4999.6", "red chair.png").await;
        assert_eq!(created["title"], "Chair");
        assert_eq!(created["price"], 5000);
        // Creation echoes the stored filename.
        assert_eq!(created["imageUrl"], "red chair.png");
        assert_eq!(created["glbUrl"], Value::Null);
        let id = created["id"].as_i64().unwrap();

        let (name, value) = host();
        let listed = app.server.get("/articles").add_header(name, value).await;
        listed.assert_status_ok();
        let listed = listed.json::<Vec<Value>>();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0]["imageUrl"],
            format!("http://{HOST}/articles/image/red%20chair.png")
        );

        let (name, value) = host();
        let fetched = app
            .server
            .get(&format!("/articles/{id}"))
            .add_header(name, value)
            .add_header(
                HeaderName::from_static("x-forwarded-proto"),
                HeaderValue::from_static("https"),
            )
            .await;
        fetched.assert_status_ok();
        assert_eq!(
            fetched.json::<Value>()["imageUrl"],
            format!("https://{HOST}/articles/image/red%20chair.png")
        );

        let updated = app
            .server
            .patch(&format!("/articles/{id}"))
            .json(&json!({ "title": "Armchair", "description": null, "price": 10.4 }))
            .await;
        updated.assert_status_ok();
        let updated = updated.json::<Value>();
        assert_eq!(updated["title"], "Armchair");
        assert_eq!(updated["description"], Value::Null);
        assert_eq!(updated["price"], 10);
        assert_eq!(updated["imageUrl"], "red chair.png");

        let deleted = app.server.delete(&format!("/articles/{id}")).await;
        deleted.assert_status_ok();
        deleted.assert_json(&json!({ "success": true }));

        app.server
            .get(&format!("/articles/{id}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .delete(&format!("/articles/{id}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_article_validation_errors() {
        let app = create_test_app().await;

        let form = MultipartForm::new().add_text("description", "no title or price");
        let response = app.server.post("/articles").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "Missing required fields", "status": 400 }));

        let form = MultipartForm::new()
            .add_text("title", "Chair")
            .add_text("price", "cheap");
        app.server
            .post("/articles")
            .multipart(form)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.server
            .get("/articles/not-a-number")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let chair = create_article(&app.server, "Chair", "100", "chair.png").await;
        let chair_id = chair["id"].as_i64().unwrap();
        app.server
            .get(&format!("/articles/{chair_id}"))
            .await
            .assert_status_ok();
        app.server
            .get(&format!("/articles/{chair_id}.0"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .patch("/articles/not-a-number")
            .json(&json!({ "title": "x" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        app.server
            .patch("/articles/999")
            .json(&json!({ "title": "x" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_uploaded_image_is_stored_and_served() {
        let app = create_test_app().await;

        let form = MultipartForm::new()
            .add_text("title", "Lamp")
            .add_text("price", "1200")
            .add_part(
                "image",
                Part::bytes(b"png-bytes".to_vec())
                    .file_name("lamp.PNG")
                    .mime_type("image/png"),
            );
        let response = app.server.post("/articles").multipart(form).await;
        response.assert_status(StatusCode::CREATED);

        let stored = response.json::<Value>()["imageUrl"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(stored.starts_with("/uploads/"));
        assert!(stored.ends_with(".png"));

        let direct = app.server.get(&stored).await;
        direct.assert_status_ok();
        assert_eq!(&direct.as_bytes()[..], b"png-bytes");

        // Listed articles link uploads through the encoded image route.
        let (name, value) = host();
        let listed = app.server.get("/articles").add_header(name, value).await;
        listed.assert_status_ok();
        let link = listed.json::<Vec<Value>>()[0]["imageUrl"]
            .as_str()
            .unwrap()
            .to_string();
        let encoded = urlencoding::encode(&stored).into_owned();
        assert_eq!(link, format!("http://{HOST}/articles/image/{encoded}"));

        let path = link.trim_start_matches(&format!("http://{HOST}"));
        let via_link = app.server.get(path).await;
        via_link.assert_status_ok();
        assert_eq!(&via_link.as_bytes()[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_asset_files_are_served_from_assets_dir() {
        let app = create_test_app().await;
        std::fs::write(app.assets_dir.path().join("sofa.glb"), b"glTF").unwrap();

        let response = app.server.get("/articles/glb/sofa.glb").await;
        response.assert_status_ok();
        assert_eq!(&response.as_bytes()[..], b"glTF");

        let missing = app.server.get("/articles/image/missing.png").await;
        missing.assert_status(StatusCode::NOT_FOUND);
        missing.assert_json(&json!({ "error": "Image file not found", "status": 404 }));

        app.server
            .get("/articles/glb/missing.glb")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_orders_require_identity() {
        let app = create_test_app().await;

        let response = app.server.get("/orders").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({ "error": "Could not find user", "status": 401 }));

        app.server
            .get("/orders")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer garbage"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // Valid session, but the webhook never provisioned this identity.
        let response = app
            .server
            .post("/orders")
            .add_header(header::AUTHORIZATION, bearer("user_ghost"))
            .json(&json!({ "items": [{ "articleId": 1, "quantity": 1 }] }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({ "error": "User not found", "status": 404 }));
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let app = create_test_app().await;
        provision(&app.server, "user_ada", "ada@example.com").await;

        let chair = create_article(&app.server, "Chair", "100", "chair.png").await;
        let lamp = create_article(&app.server, "Lamp", "200", "lamp.png").await;
        let chair_id = chair["id"].as_i64().unwrap();
        let lamp_id = lamp["id"].as_i64().unwrap();

        let created = app
            .server
            .post("/orders")
            .add_header(header::AUTHORIZATION, bearer("user_ada"))
            .json(&json!({ "items": [{ "articleId": chair_id, "quantity": 2 }] }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created = created.json::<Value>();
        let order_id = created["id"].as_i64().unwrap();
        assert_eq!(created["status"], "pending");
        assert_eq!(
            created["items"],
            json!([{ "orderId": order_id, "articleId": chair_id, "quantity": 2 }])
        );

        let (name, value) = host();
        let fetched = app
            .server
            .get(&format!("/orders/{order_id}"))
            .add_header(name, value)
            .await;
        fetched.assert_status_ok();
        let fetched = fetched.json::<Value>();
        assert_eq!(fetched["items"][0]["quantity"], 2);
        assert_eq!(fetched["items"][0]["article"]["title"], "Chair");
        assert_eq!(
            fetched["items"][0]["article"]["imageUrl"],
            format!("http://{HOST}/articles/image/chair.png")
        );

        let patched = app
            .server
            .patch(&format!("/orders/{order_id}"))
            .json(&json!({
                "items": [{ "articleId": lamp_id, "quantity": 3 }],
                "status": "paid"
            }))
            .await;
        patched.assert_status_ok();
        let patched = patched.json::<Value>();
        assert_eq!(patched["status"], "paid");
        assert_eq!(patched["items"].as_array().unwrap().len(), 1);
        assert_eq!(patched["items"][0]["articleId"], lamp_id);
        assert_eq!(patched["items"][0]["quantity"], 3);

        let own = app
            .server
            .get("/orders")
            .add_header(header::AUTHORIZATION, bearer("user_ada"))
            .await;
        own.assert_status_ok();
        let own = own.json::<Vec<Value>>();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0]["items"][0]["article"]["title"], "Lamp");

        let all = app.server.get("/orders/all").await;
        all.assert_status_ok();
        let all = all.json::<Vec<Value>>();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["items"][0]["quantity"], 3);
        assert!(all[0]["items"][0].get("article").is_none());

        // Referenced articles cannot be removed.
        app.server
            .delete(&format!("/articles/{lamp_id}"))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_order_input_validation() {
        let app = create_test_app().await;
        provision(&app.server, "user_bob", "bob@example.com").await;
        let chair = create_article(&app.server, "Chair", "100", "chair.png").await;
        let chair_id = chair["id"].as_i64().unwrap();

        for body in [
            json!({}),
            json!({ "items": [] }),
            json!({ "items": [{ "articleId": chair_id, "quantity": 0 }] }),
            json!({ "items": [{ "articleId": 9999, "quantity": 1 }] }),
        ] {
            app.server
                .post("/orders")
                .add_header(header::AUTHORIZATION, bearer("user_bob"))
                .json(&body)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }

        app.server
            .get("/orders/abc")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        app.server
            .get("/orders/4242")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .patch("/orders/4242")
            .json(&json!({ "status": "paid" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_cookie_identifies_caller() {
        let app = create_test_app().await;
        provision(&app.server, "user_cookie", "cookie@example.com").await;

        let cookie = format!("__session={}", session_token("user_cookie"));
        let response = app
            .server
            .get("/orders")
            .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Vec<Value>>().len(), 0);
    }

    #[tokio::test]
    async fn test_clerk_webhook_provisioning() {
        let app = create_test_app().await;

        let incomplete = [
            json!({ "type": "user.created", "data": { "email_addresses": [] } }),
            json!({ "type": "user.created", "data": { "id": "user_no_email", "email_addresses": [] } }),
            json!({
                "type": "user.created",
                "data": { "email_addresses": [{ "id": "idn_1", "email_address": "anon@example.com" }] }
            }),
            json!({ "type": "user.created" }),
        ];
        for payload in incomplete {
            app.server
                .post("/webhooks/clerk")
                .json(&payload)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
        assert!(app
            .storage
            .find_user_by_external_id("user_no_email")
            .await
            .unwrap()
            .is_none());

        // The identity rejected above is created once its email arrives.
        let late = json!({
            "type": "user.created",
            "data": {
                "id": "user_no_email",
                "email_addresses": [{ "id": "idn_2", "email_address": "late@example.com" }]
            }
        });
        let response = app.server.post("/webhooks/clerk").json(&late).await;
        response.assert_status(StatusCode::CREATED);
        response.assert_json(&json!({ "created": true }));

        let event = json!({
            "type": "user.created",
            "data": {
                "id": "user_new",
                "email_addresses": [{ "id": "idn_9", "email_address": "new@example.com" }]
            }
        });

        let first = app.server.post("/webhooks/clerk").json(&event).await;
        first.assert_status(StatusCode::CREATED);
        first.assert_json(&json!({ "created": true }));

        let replay = app.server.post("/webhooks/clerk").json(&event).await;
        replay.assert_status_ok();
        replay.assert_json(&json!({ "created": false }));

        let user = app
            .storage
            .find_user_by_external_id("user_new")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.email, "new@example.com");
    }
}
