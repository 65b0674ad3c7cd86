//! Integration tests for the photoshare backend.

use std::path::PathBuf;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::{create_router, AppState};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot really an image";
const MAX_UPLOAD: usize = 4096;

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        // Bind first so media URLs can point at the real port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        let config = Config {
            db_path: temp_dir.path().join("test.sqlite"),
            index_path: temp_dir.path().join("index"),
            media_path: temp_dir.path().join("media"),
            public_url: base_url.clone(),
            bind_addr: addr,
            log_level: "warn".to_string(),
            jwt_secret: "test-jwt-secret".to_string(),
            ephemeral_jwt_secret: false,
            access_token_minutes: 15,
            refresh_token_days: 7,
            bcrypt_cost: 4,
            max_upload_bytes: MAX_UPLOAD,
            cloudinary: None,
        };

        let state = AppState::build(config).await.expect("Failed to build state");
        let app = create_router(state);

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

    async fn signup(&self, username: &str, email: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({
                "username": username,
                "email": email,
                "password": "password123"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    /// Log in and return `(access_token, refresh_token)`.
    async fn login(&self, email: &str) -> (String, String) {
        let resp = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        (
            body["data"]["accessToken"].as_str().unwrap().to_string(),
            body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Sign up and log in, returning the user and an access token.
    async fn register(&self, username: &str, email: &str) -> (Value, String) {
        let user = self.signup(username, email).await;
        let (access, _) = self.login(email).await;
        (user, access)
    }

    async fn upload_photo(&self, token: &str, description: &str, tags: &str) -> reqwest::Response {
        let form = Form::new()
            .part(
                "file",
                Part::bytes(PNG_BYTES.to_vec())
                    .file_name("photo.png")
                    .mime_str("image/png")
                    .unwrap(),
            )
            .text("description", description.to_string())
            .text("tags", tags.to_string());

        self.client
            .post(self.url("/api/photos"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
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
async fn test_signup_first_user_is_admin() {
    let fixture = TestFixture::new().await;

    let first = fixture.signup("alice", "alice@example.com").await;
    let second = fixture.signup("bob", "Bob@Example.com").await;

    assert_eq!(first["role"], "admin");
    assert_eq!(second["role"], "user");
    assert_eq!(second["email"], "bob@example.com");
    assert!(first.get("passwordHash").is_none());
    assert!(first.get("refreshToken").is_none());
}

#[tokio::test]
async fn test_signup_rejects_duplicates_and_invalid_input() {
    let fixture = TestFixture::new().await;
    fixture.signup("alice", "alice@example.com").await;

    let dup = fixture
        .client
        .post(fixture.url("/api/auth/signup"))
        .json(&json!({
            "username": "alice2",
            "email": "ALICE@example.com",
            "password": "password123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);
    let body: Value = dup.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let invalid = fixture
        .client
        .post(fixture.url("/api/auth/signup"))
        .json(&json!({
            "username": "carol",
            "email": "not-an-email",
            "password": "password123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 422);
    let body: Value = invalid.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_and_me() {
    let fixture = TestFixture::new().await;
    fixture.signup("alice", "alice@example.com").await;

    let wrong = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "email": "alice@example.com", "password": "nope-nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let unknown = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "email": "ghost@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 401);

    let (access, _) = fixture.login("alice@example.com").await;

    let me = fixture
        .client
        .get(fixture.url("/api/users/me"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 200);
    let body: Value = me.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "alice");

    let anonymous = fixture
        .client
        .get(fixture.url("/api/users/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
    let body: Value = anonymous.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let count = fixture
        .client
        .get(fixture.url("/api/users/count"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let body: Value = count.json().await.unwrap();
    assert_eq!(body["data"], 1);
}

#[tokio::test]
async fn test_refresh_token_rotation_and_reuse_detection() {
    let fixture = TestFixture::new().await;
    fixture.signup("alice", "alice@example.com").await;
    let (access, refresh) = fixture.login("alice@example.com").await;

    // An access token is not accepted as a refresh token
    let wrong_scope = fixture
        .client
        .get(fixture.url("/api/auth/refresh_token"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_scope.status(), 401);

    let rotated = fixture
        .client
        .get(fixture.url("/api/auth/refresh_token"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(rotated.status(), 200);
    let body: Value = rotated.json().await.unwrap();
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["tokenType"], "bearer");
    assert_ne!(new_refresh, refresh);

    // Replaying the old refresh token fails and revokes the current one
    let replay = fixture
        .client
        .get(fixture.url("/api/auth/refresh_token"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);

    let revoked = fixture
        .client
        .get(fixture.url("/api/auth/refresh_token"))
        .bearer_auth(&new_refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(revoked.status(), 401);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let fixture = TestFixture::new().await;
    fixture.signup("alice", "alice@example.com").await;
    let (access, refresh) = fixture.login("alice@example.com").await;

    let logout = fixture
        .client
        .post(fixture.url("/api/auth/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 200);

    let refreshed = fixture
        .client
        .get(fixture.url("/api/auth/refresh_token"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(refreshed.status(), 401);
}

#[tokio::test]
async fn test_avatar_upload() {
    let fixture = TestFixture::new().await;
    let (user, access) = fixture.register("alice", "alice@example.com").await;

    let form = Form::new().part(
        "file",
        Part::bytes(PNG_BYTES.to_vec())
            .file_name("me.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = fixture
        .client
        .patch(fixture.url("/api/users/avatar"))
        .bearer_auth(&access)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let avatar = body["data"]["avatar"].as_str().unwrap().to_string();
    let user_id = user["id"].as_str().unwrap();
    assert_eq!(
        avatar,
        fixture.url(&format!("/media/photoshare/avatars/avatar_{}.png", user_id))
    );

    let served = fixture.client.get(&avatar).send().await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn test_photo_upload_rejections() {
    let fixture = TestFixture::new().await;
    let (_, access) = fixture.register("alice", "alice@example.com").await;

    let text_file = Form::new().part(
        "file",
        Part::bytes(b"hello".to_vec())
            .file_name("notes.txt")
            .mime_str("text/plain")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/api/photos"))
        .bearer_auth(&access)
        .multipart(text_file)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);

    let too_big = Form::new().part(
        "file",
        Part::bytes(vec![0u8; MAX_UPLOAD * 2])
            .file_name("big.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/api/photos"))
        .bearer_auth(&access)
        .multipart(too_big)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    let resp = fixture
        .upload_photo(&access, "too many tags", "a,b,c,d,e,f")
        .await;
    assert_eq!(resp.status(), 422);

    let no_file = Form::new().text("description", "nothing attached");
    let resp = fixture
        .client
        .post(fixture.url("/api/photos"))
        .bearer_auth(&access)
        .multipart(no_file)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    let list = fixture
        .client
        .get(fixture.url("/api/photos"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let body: Value = list.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_photo_crud_and_permissions() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.register("admin", "admin@example.com").await;
    let (bob, bob_token) = fixture.register("bob", "bob@example.com").await;
    let (carol, carol_token) = fixture.register("carol", "carol@example.com").await;

    let resp = fixture
        .upload_photo(&bob_token, "Harbour at dusk", "Sea, boats, sea")
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let photo = body["data"].clone();
    let photo_id = photo["id"].as_str().unwrap().to_string();
    assert_eq!(photo["ownerId"], bob["id"]);
    assert_eq!(photo["ownerUsername"], "bob");
    assert_eq!(photo["tags"], json!(["sea", "boats"]));
    assert_eq!(photo["version"], 1);

    let served = fixture
        .client
        .get(photo["url"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(served.status(), 200);

    // A plain user cannot edit or delete someone else's photo
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&carol_token)
        .json(&json!({ "description": "mine now" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Only admins may promote
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/users/{}/role", carol["id"].as_str().unwrap())))
        .bearer_auth(&bob_token)
        .json(&json!({ "role": "moderator" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/users/{}/role", carol["id"].as_str().unwrap())))
        .bearer_auth(&admin)
        .json(&json!({ "role": "moderator" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "moderator");

    // Moderators can edit but not delete
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&carol_token)
        .json(&json!({ "description": "Harbour at dusk, cropped", "expectedVersion": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["tags"], json!(["sea", "boats"]));

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Stale version from the owner
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&bob_token)
        .json(&json!({ "tags": ["night"], "expectedVersion": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 2);

    // Owner deletes
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let served = fixture
        .client
        .get(photo["url"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(served.status(), 404);
}

#[tokio::test]
async fn test_admin_can_delete_any_photo() {
    let fixture = TestFixture::new().await;
    let (_, admin) = fixture.register("admin", "admin@example.com").await;
    let (_, bob_token) = fixture.register("bob", "bob@example.com").await;

    let resp = fixture.upload_photo(&bob_token, "Bridge", "city").await;
    let body: Value = resp.json().await.unwrap();
    let photo_id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_list_and_search_photos() {
    let fixture = TestFixture::new().await;
    let (alice, alice_token) = fixture.register("alice", "alice@example.com").await;
    let (_, bob_token) = fixture.register("bob", "bob@example.com").await;

    for (token, description, tags) in [
        (&alice_token, "Lighthouse in the fog", "sea,coast"),
        (&alice_token, "Market stalls", "city"),
        (&bob_token, "Rooftops after rain", "city,rain"),
    ] {
        let resp = fixture.upload_photo(token, description, tags).await;
        assert_eq!(resp.status(), 201);
    }

    let resp = fixture
        .client
        .get(fixture.url("/api/photos?tag=city"))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/photos?ownerId={}",
            alice["id"].as_str().unwrap()
        )))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resp = fixture
        .client
        .get(fixture.url("/api/search?q=lighthouse"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["results"][0]["photo"]["description"],
        "Lighthouse in the fog"
    );

    let resp = fixture
        .client
        .get(fixture.url("/api/search?q=rain"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["results"][0]["photo"]["ownerUsername"], "bob");
}

#[tokio::test]
async fn test_state_rebuilds_search_index_on_start() {
    let temp_dir = TempDir::new().unwrap();
    let config = |index: PathBuf| Config {
        db_path: temp_dir.path().join("test.sqlite"),
        index_path: index,
        media_path: temp_dir.path().join("media"),
        public_url: "http://127.0.0.1:0".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        jwt_secret: "test-jwt-secret".to_string(),
        ephemeral_jwt_secret: false,
        access_token_minutes: 15,
        refresh_token_days: 7,
        bcrypt_cost: 4,
        max_upload_bytes: MAX_UPLOAD,
        cloudinary: None,
    };

    {
        let state = AppState::build(config(temp_dir.path().join("index-a")))
            .await
            .unwrap();
        let user = state
            .repo
            .create_user(
                &crate::models::UserSchema {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password: "password123".to_string(),
                },
                "hash",
            )
            .await
            .unwrap();
        state
            .repo
            .create_photo(&user.id, "u", "p", Some("Glacier lagoon"), &[])
            .await
            .unwrap();
    }

    // A fresh index directory is populated from the database
    let state = AppState::build(config(temp_dir.path().join("index-b")))
        .await
        .unwrap();
    let page = state.search.search("glacier", 10, 0).unwrap();
    assert_eq!(page.hits.len(), 1);
}

#[tokio::test]
async fn test_search_paging_bounds() {
    let fixture = TestFixture::new().await;
    let (_, token) = fixture.register("alice", "alice@example.com").await;

    for i in 0..3 {
        let resp = fixture
            .upload_photo(&token, &format!("Harbour view {}", i), "sea")
            .await;
        assert_eq!(resp.status(), 201);
    }

    let search = |query: &str| {
        fixture
            .client
            .get(fixture.url(&format!("/api/search?{}", query)))
            .bearer_auth(&token)
            .send()
    };

    // A zero limit is raised to one result
    let resp = search("q=harbour&limit=0").await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["limit"], 1);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["total"], 3);

    let resp = search("q=harbour&limit=500").await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["limit"], 100);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 3);

    // Past the end: empty page, full count
    let resp = search("q=harbour&offset=10").await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["results"].as_array().unwrap().is_empty());
    assert_eq!(body["data"]["total"], 3);

    let resp = search("q=harbour&offset=18446744073709551615").await.unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_blank_description_clears_it() {
    let fixture = TestFixture::new().await;
    let (_, token) = fixture.register("alice", "alice@example.com").await;

    let resp = fixture.upload_photo(&token, "Old pier", "sea").await;
    let body: Value = resp.json().await.unwrap();
    let photo_id = body["data"]["id"].as_str().unwrap().to_string();

    // Omitting the field keeps the description
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&token)
        .json(&json!({ "tags": ["pier"] }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["description"], "Old pier");

    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/photos/{}", photo_id)))
        .bearer_auth(&token)
        .json(&json!({ "description": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["description"].is_null());
    assert_eq!(body["data"]["tags"], json!(["pier"]));
}

#[tokio::test]
async fn test_replacing_avatar_removes_previous_file() {
    let fixture = TestFixture::new().await;
    let (_, token) = fixture.register("alice", "alice@example.com").await;

    let upload = |file_name: &'static str, mime: &'static str| {
        let form = Form::new().part(
            "file",
            Part::bytes(PNG_BYTES.to_vec())
                .file_name(file_name)
                .mime_str(mime)
                .unwrap(),
        );
        fixture
            .client
            .patch(fixture.url("/api/users/avatar"))
            .bearer_auth(&token)
            .multipart(form)
            .send()
    };

    let body: Value = upload("me.png", "image/png")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let png_url = body["data"]["avatar"].as_str().unwrap().to_string();

    let body: Value = upload("me.jpg", "image/jpeg")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jpg_url = body["data"]["avatar"].as_str().unwrap().to_string();
    assert!(jpg_url.ends_with(".jpg"));

    let old = fixture.client.get(&png_url).send().await.unwrap();
    assert_eq!(old.status(), 404);
    let new = fixture.client.get(&jpg_url).send().await.unwrap();
    assert_eq!(new.status(), 200);
}
