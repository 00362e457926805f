use backoffice_api::app::build_app;
use backoffice_auth::{JwtClaims, Role};
use backoffice_core::UserId;
use backoffice_infra::AppConfig;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory storage, on an ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let app = build_app(&config).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, body)
}

fn mint_jwt(roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(vec![Role::new("admin")])
}

fn invoice(customer: &str, debt: Option<&str>, receivable: Option<&str>) -> Value {
    json!({
        "customer": customer,
        "type": "invoice",
        "material": "Nervürlü demir",
        "debt": debt,
        "receivable": receivable,
        "date": "2024-05-01T09:00:00Z",
    })
}

async fn create_customer(srv: &TestServer, token: &str, name: &str) -> String {
    let (status, body) = srv.post(token, "/customers", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED, "create customer: {body}");
    assert_eq!(body["balance"], "0");
    assert_eq!(body["balance_status"], "0");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = srv.get("not-a-jwt", "/customers").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get(&admin(), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
    assert!(body["user_id"].as_str().is_some());
}

#[tokio::test]
async fn balance_follows_entry_create_update_delete() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Akdeniz Yapı").await;

    // debt=100, receivable=30 -> 70 'B'
    let (status, body) = srv
        .post(&token, "/entries", invoice(&customer, Some("100"), Some("30")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["customer"]["balance"], "70");
    assert_eq!(body["customer"]["balance_status"], "B");
    assert_eq!(body["entry"]["version"], 1);
    let first = body["entry"]["id"].as_str().unwrap().to_string();

    // same entry -> debt=40, receivable=10 -> 30 'B'
    let (status, body) = srv
        .put(
            &token,
            &format!("/entries/{first}?expected_version=1"),
            invoice(&customer, Some("40"), Some("10")),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["customer"]["balance"], "30");
    assert_eq!(body["customer"]["balance_status"], "B");
    assert_eq!(body["entry"]["version"], 2);

    // add a 50/0 entry and move the first to 0/20: still 30 overall
    let (_, body) = srv
        .post(&token, "/entries", invoice(&customer, Some("50"), None))
        .await;
    let fifty = body["entry"]["id"].as_str().unwrap().to_string();
    let (status, body) = srv
        .put(&token, &format!("/entries/{first}"), invoice(&customer, None, Some("20")))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["customer"]["balance"], "30");

    // delete the 50/0 entry -> -20 'A'
    let (status, body) = srv.delete(&token, &format!("/entries/{fifty}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["customer"]["balance"], "-20");
    assert_eq!(body["customer"]["balance_status"], "A");

    let (status, body) = srv.get(&token, &format!("/customers/{customer}/audit")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);

    let (_, body) = srv.get(&token, &format!("/customers/{customer}/entries")).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_entry_creates_sum_exactly() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Ege Beton").await;

    let (a, b) = tokio::join!(
        srv.post(&token, "/entries", invoice(&customer, Some("10"), None)),
        srv.post(&token, "/entries", invoice(&customer, Some("20"), None)),
    );
    assert_eq!(a.0, StatusCode::CREATED);
    assert_eq!(b.0, StatusCode::CREATED);

    let (_, body) = srv.get(&token, &format!("/customers/{customer}")).await;
    assert_eq!(body["balance"], "30");
    assert_eq!(body["balance_status"], "B");
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Marmara İnşaat").await;

    let (_, body) = srv
        .post(&token, "/entries", invoice(&customer, Some("5"), None))
        .await;
    let id = body["entry"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .put(
            &token,
            &format!("/entries/{id}?expected_version=9"),
            invoice(&customer, Some("7"), None),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "concurrent_modification");

    let (_, body) = srv.get(&token, &format!("/customers/{customer}")).await;
    assert_eq!(body["balance"], "5");
}

#[tokio::test]
async fn rejected_entries_leave_the_balance_alone() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Karadeniz Hafriyat").await;

    // unknown customer
    let ghost = UserId::new().to_string();
    let (status, body) = srv
        .post(&token, "/entries", invoice(&ghost, Some("10"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // neither side set
    let (status, body) = srv.post(&token, "/entries", invoice(&customer, None, None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_amount");

    // negative amounts never deserialize
    let (status, _) = srv
        .post(&token, "/entries", invoice(&customer, Some("-5"), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // missing entry
    let missing = UserId::new().to_string();
    let (status, _) = srv
        .put(&token, &format!("/entries/{missing}"), invoice(&customer, Some("1"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = srv.get(&token, "/entries/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (_, body) = srv.get(&token, &format!("/customers/{customer}")).await;
    assert_eq!(body["balance"], "0");
    let (_, body) = srv.get(&token, "/audit/balances").await;
    assert_eq!(body["consistent"], true);
}

#[tokio::test]
async fn balance_overflow_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Marmara Vinç").await;
    let max = "79228162514264337593543950335";

    let (status, body) = srv
        .post(&token, "/entries", invoice(&customer, Some(max), None))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = srv
        .post(&token, "/entries", invoice(&customer, Some("1"), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_amount");

    let (_, body) = srv.get(&token, &format!("/customers/{customer}")).await;
    assert_eq!(body["balance"], max);
    assert_eq!(body["balance_status"], "B");
    let (_, body) = srv.get(&token, "/audit/balances").await;
    assert_eq!(body["consistent"], true);
}

#[tokio::test]
async fn writes_require_permissions_reads_do_not() {
    let srv = TestServer::spawn().await;
    let viewer = mint_jwt(vec![Role::new("viewer")]);

    let (status, body) = srv.post(&viewer, "/customers", json!({ "name": "X" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = srv.post(&viewer, "/worksites", json!({ "name": "Y" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get(&viewer, "/customers").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn referenced_records_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let customer = create_customer(&srv, &token, "Trakya Çelik").await;

    let (status, site) = srv
        .post(&token, "/worksites", json!({ "name": "Beylikdüzü Konutları" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let site_id = site["id"].as_str().unwrap().to_string();

    // unknown worksite reference is refused
    let mut entry = invoice(&customer, Some("15"), None);
    entry["worksite"] = json!(UserId::new().to_string());
    let (status, body) = srv.post(&token, "/entries", entry.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    entry["worksite"] = json!(site_id);
    let (status, body) = srv.post(&token, "/entries", entry).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let entry_id = body["entry"]["id"].as_str().unwrap().to_string();

    let (_, body) = srv.get(&token, &format!("/entries?worksite={site_id}")).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, body) = srv.delete(&token, &format!("/customers/{customer}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    let (status, _) = srv.delete(&token, &format!("/worksites/{site_id}")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = srv.delete(&token, &format!("/entries/{entry_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv.delete(&token, &format!("/worksites/{site_id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = srv.delete(&token, &format!("/customers/{customer}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = srv.get(&token, &format!("/customers/{customer}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn personnel_crud_round_trip() {
    let srv = TestServer::spawn().await;
    let token = admin();

    let (status, body) = srv
        .post(
            &token,
            "/personnel",
            json!({ "name": "Ayşe Demir", "identity_number": "12A", "entry": null, "exit": null, "worksite": null }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = srv
        .post(
            &token,
            "/personnel",
            json!({ "name": "Ayşe Demir", "identity_number": "10987654321", "entry": "2024-03-01", "exit": null, "worksite": null }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .put(
            &token,
            &format!("/personnel/{id}"),
            json!({ "name": "Ayşe Demir", "identity_number": "10987654321", "entry": "2024-03-01", "exit": "2024-09-30", "worksite": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["exit"], "2024-09-30");

    let (_, body) = srv.get(&token, "/personnel").await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = srv.delete(&token, &format!("/personnel/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = srv.get(&token, &format!("/personnel/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
