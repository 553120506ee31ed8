//! Integration tests for the school registry backend.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::{create_router, AppState};

const ADMIN_KEY: &str = "test-admin-key";
const PASSWORD: &str = "correct-horse";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some(ADMIN_KEY.to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Create config
        let config = Config {
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            jwt_secret: "test-token-secret".to_string(),
            jwt_secret_generated: false,
            token_ttl_secs: 3600,
            admin_psk: psk,
        };

        let state = AppState {
            repo,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sign up a user of the given type and return its id.
    async fn signup(&self, user_type: &str, fiscal_code: &str, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/signup"))
            .header("x-api-key", ADMIN_KEY)
            .json(&json!({
                "fiscalCode": fiscal_code,
                "name": "Test",
                "surname": user_type,
                "type": user_type,
                "email": email,
                "password": PASSWORD
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Log in and return the bearer token.
    async fn login(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Sign up and log in a user, returning `(id, token)`.
    async fn account(&self, user_type: &str, fiscal_code: &str, email: &str) -> (String, String) {
        let id = self.signup(user_type, fiscal_code, email).await;
        let token = self.login(email).await;
        (id, token)
    }

    async fn admin(&self) -> (String, String) {
        self.account("admin", "ADMNAA80A01H501A", "admin@school.test")
            .await
    }

    fn get(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    fn post(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    fn put(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token)
    }

    fn delete(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }
}

async fn data(resp: Response) -> Value {
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    body["data"].clone()
}

async fn error_code(resp: Response) -> String {
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    body["error"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_missing_token() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/subjects"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_invalid_token() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .get("/subjects", "not-a-real-token")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let fixture = TestFixture::new().await;
    fixture
        .signup("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "student@school.test", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Unknown e-mail gets the same answer
    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "nobody@school.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_login_response_shape() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .signup("teacher", "TCHRAA70A01H501C", "teacher@school.test")
        .await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "Teacher@School.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let login = data(resp).await;
    assert!(login["token"].as_str().unwrap().len() > 20);
    assert_eq!(login["expiresIn"], 3600);
    assert_eq!(login["id"], id.as_str());
}

#[tokio::test]
async fn test_admin_signup_requires_key() {
    let fixture = TestFixture::new().await;

    let body = json!({
        "fiscalCode": "ADMNAA80A01H501A",
        "name": "Eve",
        "surname": "Mallory",
        "type": "admin",
        "email": "eve@school.test",
        "password": PASSWORD
    });

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(error_code(resp).await, "FORBIDDEN");

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .header("x-api-key", "wrong-key")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_admin_signup_disabled_without_key() {
    let fixture = TestFixture::with_psk(None).await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .header("x-api-key", ADMIN_KEY)
        .json(&json!({
            "fiscalCode": "ADMNAA80A01H501A",
            "name": "Ada",
            "surname": "Admin",
            "type": "admin",
            "email": "ada@school.test",
            "password": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let fixture = TestFixture::new().await;
    fixture
        .signup("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .json(&json!({
            "fiscalCode": "STDNBB90A01H501B",
            "name": "Other",
            "surname": "Student",
            "type": "student",
            "email": "student@school.test",
            "password": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_signup_short_password() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .json(&json!({
            "fiscalCode": "STDNAA90A01H501B",
            "name": "Short",
            "surname": "Password",
            "type": "student",
            "email": "short@school.test",
            "password": "abc"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_non_admin_forbidden() {
    let fixture = TestFixture::new().await;
    let (_, token) = fixture
        .account("teacher", "TCHRAA70A01H501C", "teacher@school.test")
        .await;

    let resp = fixture.get("/users", &token).send().await.unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(error_code(resp).await, "FORBIDDEN");

    let resp = fixture
        .post("/subjects", &token)
        .json(&json!({ "name": "Math", "hours": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_student_cannot_list_students() {
    let fixture = TestFixture::new().await;
    let (_, student) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;
    let (_, teacher) = fixture
        .account("teacher", "TCHRAA70A01H501C", "teacher@school.test")
        .await;

    let resp = fixture.get("/students", &student).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture.get("/students", &teacher).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture.get("/grades", &student).send().await.unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_current_user_access() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let (alice_id, alice) = fixture
        .account("student", "ALCEAA90A01H501D", "alice@school.test")
        .await;
    let (bob_id, _) = fixture
        .account("student", "BOBBAA90A01H501E", "bob@school.test")
        .await;

    let resp = fixture
        .get(&format!("/users/{}", alice_id), &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user = data(resp).await;
    assert_eq!(user["fiscalCode"], "ALCEAA90A01H501D");
    assert_eq!(user["type"], "student");
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());

    let resp = fixture
        .get(&format!("/users/{}", bob_id), &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Admins pass the ownership check
    let resp = fixture
        .get(&format!("/users/{}", bob_id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_user_cannot_change_own_type() {
    let fixture = TestFixture::new().await;
    let (id, token) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .put(&format!("/users/{}", id), &token)
        .json(&json!({ "type": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .put(&format!("/users/{}", id), &token)
        .json(&json!({ "name": "Renamed", "surname": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user = data(resp).await;
    assert_eq!(user["name"], "Renamed");
    assert_eq!(user["surname"], "student");
    assert_eq!(user["type"], "student");
}

#[tokio::test]
async fn test_user_password_change() {
    let fixture = TestFixture::new().await;
    let (id, token) = fixture
        .account("parent", "PRNTAA60A01H501F", "parent@school.test")
        .await;

    let resp = fixture
        .put(&format!("/users/{}", id), &token)
        .json(&json!({ "password": "a-brand-new-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "parent@school.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "parent@school.test", "password": "a-brand-new-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_user_type_filter() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    fixture
        .signup("student", "STDNAA90A01H501B", "s1@school.test")
        .await;
    fixture
        .signup("student", "STDNBB90A01H501B", "s2@school.test")
        .await;
    fixture
        .signup("teacher", "TCHRAA70A01H501C", "t1@school.test")
        .await;

    let resp = fixture.get("/users", &admin).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await.as_array().unwrap().len(), 4);

    let resp = fixture
        .get("/users?type=student", &admin)
        .send()
        .await
        .unwrap();
    let users = data(resp).await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u["type"] == "student"));

    let resp = fixture
        .get("/users?type=janitor", &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_delete_user() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let id = fixture
        .signup("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .delete(&format!("/users/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await["id"], id.as_str());

    let resp = fixture
        .get(&format!("/users/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "NOT_FOUND");
}

#[tokio::test]
async fn test_student_crud() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    // Create student
    let resp = fixture
        .post("/students", &admin)
        .json(&json!({
            "fiscalCode": "HTGIII05N67B342G",
            "name": "Pippo",
            "surname": "Franco",
            "dateOfBirth": "2005-12-27"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let student = data(resp).await;
    let id = student["id"].as_str().unwrap().to_string();

    // Get student
    let resp = fixture
        .get(&format!("/students/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let student = data(resp).await;
    assert_eq!(student["fiscalCode"], "HTGIII05N67B342G");
    assert_eq!(student["name"], "Pippo");
    assert_eq!(student["surname"], "Franco");
    assert_eq!(student["dateOfBirth"], "2005-12-27");
    assert_eq!(student["subjects"], json!([]));

    // Unknown id
    let resp = fixture
        .get("/students/hello", &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Update keeps omitted and falsy fields
    let resp = fixture
        .put(&format!("/students/{}", id), &admin)
        .json(&json!({ "name": "Pippone", "surname": null, "dateOfBirth": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let student = data(resp).await;
    assert_eq!(student["name"], "Pippone");
    assert_eq!(student["surname"], "Franco");
    assert_eq!(student["dateOfBirth"], "2005-12-27");

    // List
    let resp = fixture.get("/students", &admin).send().await.unwrap();
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    // Delete
    let resp = fixture
        .delete(&format!("/students/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .get(&format!("/students/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .delete(&format!("/students/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_student_duplicate_fiscal_code() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let body = json!({
        "fiscalCode": "HTGIII05N67B342G",
        "name": "Pippo",
        "surname": "Franco"
    });

    let resp = fixture
        .post("/students", &admin)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Lower-case input normalizes to the same code
    let resp = fixture
        .post("/students", &admin)
        .json(&json!({
            "fiscalCode": "htgiii05n67b342g",
            "name": "Other",
            "surname": "Person"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    // The same code is free in the teachers table
    let resp = fixture
        .post("/teachers", &admin)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_signup_duplicate_fiscal_code() {
    let fixture = TestFixture::new().await;
    fixture
        .signup("student", "STDNAA90A01H501B", "first@school.test")
        .await;

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .json(&json!({
            "fiscalCode": "stdnaa90a01h501b",
            "name": "Second",
            "surname": "Student",
            "type": "student",
            "email": "second@school.test",
            "password": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    // The rejected signup left no account behind
    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "second@school.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_edit_to_taken_fiscal_code() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    fixture
        .signup("teacher", "TCHRAA70A01H501C", "taken@school.test")
        .await;
    let (id, token) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .put(&format!("/users/{}", id), &token)
        .json(&json!({ "fiscalCode": "TCHRAA70A01H501C" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    let resp = fixture
        .get(&format!("/users/{}", id), &token)
        .send()
        .await
        .unwrap();
    assert_eq!(data(resp).await["fiscalCode"], "STDNAA90A01H501B");

    // Same rule for the students table
    let mut student_ids = Vec::new();
    for (code, name) in [("HTGIII05N67B342G", "Pippo"), ("FRNCAA80A01H501Z", "Franco")] {
        let resp = fixture
            .post("/students", &admin)
            .json(&json!({ "fiscalCode": code, "name": name, "surname": "Rossi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        student_ids.push(data(resp).await["id"].as_str().unwrap().to_string());
    }

    let resp = fixture
        .put(&format!("/students/{}", student_ids[1]), &admin)
        .json(&json!({ "fiscalCode": "htgiii05n67b342g" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_missing_field() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/students", &admin)
        .json(&json!({ "fiscalCode": "HTGIII05N67B342G", "surname": "Franco" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    // Wrong type for a field
    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Math", "hours": "four" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_malformed_json() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/students", &admin)
        .header("content-type", "application/json")
        .body("{\"fiscalCode\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "BAD_REQUEST");

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .body("email=a@b.c")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "BAD_REQUEST");
}

#[tokio::test]
async fn test_birth_date_from_browser() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    // Angular serializes a Date as an ISO timestamp
    let resp = fixture
        .post("/students", &admin)
        .json(&json!({
            "fiscalCode": "HTGIII05N67B342G",
            "name": "Pippo",
            "surname": "Franco",
            "dateOfBirth": "1995-05-20T00:00:00.000Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let student = data(resp).await;
    assert_eq!(student["dateOfBirth"], "1995-05-20");
    let id = student["id"].as_str().unwrap().to_string();

    let resp = fixture
        .put(&format!("/students/{}", id), &admin)
        .json(&json!({ "dateOfBirth": "Sun Jun 18 1995" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await["dateOfBirth"], "1995-06-18");

    let resp = fixture
        .client
        .post(fixture.url("/auth/signup"))
        .json(&json!({
            "fiscalCode": "STDNAA90A01H501B",
            "name": "Luigi",
            "surname": "Verdi",
            "dateOfBirth": "2001-03-04T09:30:00.000+01:00",
            "type": "student",
            "email": "luigi@school.test",
            "password": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(data(resp).await["dateOfBirth"], "2001-03-04");

    let resp = fixture
        .post("/students", &admin)
        .json(&json!({
            "fiscalCode": "FRNCAA80A01H501Z",
            "name": "Mario",
            "surname": "Rossi",
            "dateOfBirth": "last tuesday"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attach_subject() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Shared", "hours": 1 }))
        .send()
        .await
        .unwrap();
    let shared_id = data(resp).await["id"].as_str().unwrap().to_string();

    let mut student_ids = Vec::new();
    for i in 0..16 {
        let resp = fixture
            .post("/students", &admin)
            .json(&json!({
                "fiscalCode": format!("CNCRAA90A01H{:04}", i),
                "name": format!("Student{}", i),
                "surname": "Concurrent"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        student_ids.push(data(resp).await["id"].as_str().unwrap().to_string());
    }

    const ROUNDS: usize = 3;
    for _ in 0..ROUNDS {
        let mut handles = Vec::new();
        for id in &student_ids {
            let url = fixture.url(&format!("/students/{}/subjects", id));
            for body in [
                json!({ "name": "Math", "hours": 2 }),
                json!({ "_id": shared_id }),
            ] {
                let request = fixture
                    .client
                    .post(url.clone())
                    .bearer_auth(&admin)
                    .json(&body);
                handles.push(tokio::spawn(async move {
                    let resp = request.send().await.unwrap();
                    let status = resp.status();
                    (status, resp.text().await.unwrap())
                }));
            }
        }

        for handle in handles {
            let (status, body) = handle.await.unwrap();
            assert_eq!(status, 201, "attach failed: {}", body);
        }
    }

    // One new subject per round plus a single link to the shared one
    for id in &student_ids {
        let resp = fixture
            .get(&format!("/students/{}/subjects", id), &admin)
            .send()
            .await
            .unwrap();
        let subjects = data(resp).await;
        let subjects = subjects.as_array().unwrap();
        assert_eq!(subjects.len(), ROUNDS + 1);
        assert_eq!(
            subjects.iter().filter(|s| s["id"] == shared_id.as_str()).count(),
            1
        );
    }
}

#[tokio::test]
async fn test_student_invalid_fiscal_code() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/students", &admin)
        .json(&json!({ "fiscalCode": "TOO-SHORT", "name": "A", "surname": "B" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_subject_crud() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let (_, student) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Math", "hours": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let subject = data(resp).await;
    let id = subject["id"].as_str().unwrap().to_string();

    // Any authenticated user can read subjects
    let resp = fixture
        .get(&format!("/subjects/{}", id), &student)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await["hours"], 4);

    // A zero is falsy and leaves the stored value alone
    let resp = fixture
        .put(&format!("/subjects/{}", id), &admin)
        .json(&json!({ "name": "Mathematics", "hours": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let subject = data(resp).await;
    assert_eq!(subject["name"], "Mathematics");
    assert_eq!(subject["hours"], 4);

    let resp = fixture
        .put(&format!("/subjects/{}", id), &admin)
        .json(&json!({ "hours": -3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .put("/subjects/missing", &admin)
        .json(&json!({ "hours": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture.get("/subjects", &student).send().await.unwrap();
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    let resp = fixture
        .delete(&format!("/subjects/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .get(&format!("/subjects/{}", id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_attach_and_detach_subject() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/teachers", &admin)
        .json(&json!({
            "fiscalCode": "TCHRAA70A01H501C",
            "name": "Grace",
            "surname": "Hopper"
        }))
        .send()
        .await
        .unwrap();
    let teacher_id = data(resp).await["id"].as_str().unwrap().to_string();
    let path = format!("/teachers/{}/subjects", teacher_id);

    // Attaching an unknown subject creates it
    let resp = fixture
        .post(&path, &admin)
        .json(&json!({ "name": "Compilers", "hours": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let teacher = data(resp).await;
    let subjects = teacher["subjects"].as_array().unwrap();
    assert_eq!(subjects.len(), 1);
    let subject_id = subjects[0]["id"].as_str().unwrap().to_string();

    // Attaching it again by id keeps a single link
    let resp = fixture
        .post(&path, &admin)
        .json(&json!({ "_id": subject_id, "name": "Compilers" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(data(resp).await["subjects"].as_array().unwrap().len(), 1);

    let resp = fixture.get(&path, &admin).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let subjects = data(resp).await;
    assert_eq!(subjects[0]["name"], "Compilers");
    assert_eq!(subjects[0]["hours"], 3);

    // Detach twice; the second is a no-op
    let detach = format!("{}/{}", path, subject_id);
    let resp = fixture.delete(&detach, &admin).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await, json!([]));

    let resp = fixture.delete(&detach, &admin).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    // The subject itself survives
    let resp = fixture
        .get(&format!("/subjects/{}", subject_id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Unknown owner
    let resp = fixture
        .post("/teachers/missing/subjects", &admin)
        .json(&json!({ "name": "Art" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Neither id nor name
    let resp = fixture
        .post(&path, &admin)
        .json(&json!({ "hours": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_user_subjects() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let (id, token) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .post(&format!("/users/{}/subjects", id), &token)
        .json(&json!({ "name": "History", "hours": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let user = data(resp).await;
    let subject_id = user["subjects"][0]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .get(&format!("/users/{}/subjects", id), &token)
        .send()
        .await
        .unwrap();
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    // Only admins detach
    let detach = format!("/users/{}/subjects/{}", id, subject_id);
    let resp = fixture.delete(&detach, &token).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture.delete(&detach, &admin).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await, json!([]));

    // Deleting a subject drops its links
    let resp = fixture
        .post(&format!("/users/{}/subjects", id), &token)
        .json(&json!({ "_id": subject_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    fixture
        .delete(&format!("/subjects/{}", subject_id), &admin)
        .send()
        .await
        .unwrap();
    let resp = fixture
        .get(&format!("/users/{}/subjects", id), &token)
        .send()
        .await
        .unwrap();
    assert_eq!(data(resp).await, json!([]));
}

#[tokio::test]
async fn test_grade_crud() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let (_, teacher) = fixture
        .account("teacher", "TCHRAA70A01H501C", "teacher@school.test")
        .await;
    let (student_id, student) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;

    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Physics", "hours": 3 }))
        .send()
        .await
        .unwrap();
    let subject_id = data(resp).await["id"].as_str().unwrap().to_string();
    let grades_path = format!("/users/{}/grades", student_id);

    // Out of range
    let resp = fixture
        .post(&grades_path, &admin)
        .json(&json!({ "subject": subject_id, "grade": 11 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown subject
    let resp = fixture
        .post(&grades_path, &admin)
        .json(&json!({ "subject": "missing", "grade": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Only admins record grades
    let resp = fixture
        .post(&grades_path, &teacher)
        .json(&json!({ "subject": subject_id, "grade": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .post(&grades_path, &admin)
        .json(&json!({ "subject": subject_id, "grade": 7.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let grade = data(resp).await;
    let grade_id = grade["id"].as_str().unwrap().to_string();
    assert_eq!(grade["grade"], 7.5);
    assert_eq!(grade["subject"]["name"], "Physics");
    assert_eq!(grade["user"]["id"], student_id.as_str());

    // The student reads their own grades
    let resp = fixture.get(&grades_path, &student).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    // Teachers read every grade
    let resp = fixture
        .get(&format!("/grades/{}", grade_id), &teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture.get("/grades", &teacher).send().await.unwrap();
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    // A zero grade is falsy and ignored on edit
    let grade_path = format!("{}/{}", grades_path, grade_id);
    let resp = fixture
        .put(&grade_path, &teacher)
        .json(&json!({ "grade": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(data(resp).await["grade"], 7.5);

    let resp = fixture
        .put(&grade_path, &teacher)
        .json(&json!({ "grade": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(data(resp).await["grade"], 9.0);

    // Editing through another user's path misses
    let resp = fixture
        .put(&format!("/users/nobody/grades/{}", grade_id), &teacher)
        .json(&json!({ "grade": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Students cannot delete grades
    let resp = fixture.delete(&grade_path, &student).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture.delete(&grade_path, &teacher).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .get(&format!("/grades/{}", grade_id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_course_crud() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;
    let (student_id, student) = fixture
        .account("student", "STDNAA90A01H501B", "student@school.test")
        .await;
    let teacher_id = fixture
        .signup("teacher", "TCHRAA70A01H501C", "teacher@school.test")
        .await;

    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Chemistry", "hours": 2 }))
        .send()
        .await
        .unwrap();
    let subject_id = data(resp).await["id"].as_str().unwrap().to_string();

    // A teacher id in the student list is rejected
    let resp = fixture
        .post("/courses", &admin)
        .json(&json!({ "name": "5A", "year": 2024, "students": [teacher_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .post("/courses", &admin)
        .json(&json!({
            "name": "5A",
            "year": 2024,
            "students": [student_id, student_id],
            "teachers": [teacher_id],
            "subjects": [subject_id]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let course = data(resp).await;
    let course_id = course["id"].as_str().unwrap().to_string();
    assert_eq!(course["status"], "active");
    assert_eq!(course["students"].as_array().unwrap().len(), 1);
    assert_eq!(course["teachers"][0]["id"], teacher_id.as_str());
    assert_eq!(course["subjects"][0]["name"], "Chemistry");

    // Any authenticated user can read courses
    let resp = fixture
        .get(&format!("/courses/{}", course_id), &student)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // An empty list is kept and clears the members
    let resp = fixture
        .put(&format!("/courses/{}", course_id), &admin)
        .json(&json!({ "name": "", "year": 2025, "students": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let course = data(resp).await;
    assert_eq!(course["name"], "5A");
    assert_eq!(course["year"], 2025);
    assert_eq!(course["students"], json!([]));
    assert_eq!(course["teachers"].as_array().unwrap().len(), 1);

    let resp = fixture
        .put(&format!("/courses/{}", course_id), &student)
        .json(&json!({ "name": "Hacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture.get("/courses", &student).send().await.unwrap();
    assert_eq!(data(resp).await.as_array().unwrap().len(), 1);

    let resp = fixture
        .delete(&format!("/courses/{}", course_id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .get(&format!("/courses/{}", course_id), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_malformed_update_body() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.admin().await;

    let resp = fixture
        .post("/subjects", &admin)
        .json(&json!({ "name": "Latin", "hours": 1 }))
        .send()
        .await
        .unwrap();
    let id = data(resp).await["id"].as_str().unwrap().to_string();

    let resp = fixture
        .put(&format!("/subjects/{}", id), &admin)
        .json(&json!(["not", "an", "object"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "BAD_REQUEST");
}
