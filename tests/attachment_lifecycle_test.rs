use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use image::{ImageFormat, Rgba, RgbaImage};
use image_attachments::{
    db, routes, services::entity_registry::EntityRegistry, services::storage_paths::StoragePaths,
    state::AppState,
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::Cursor, path::PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "attachment-test-boundary";

struct TestApp {
    dir: TempDir,
    app: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::apply_sql(&pool, include_str!("../migrations/0001_init.sql"))
            .await
            .unwrap();

        let registry = EntityRegistry::from_json(
            r#"[
                {"name": "posts", "form_name": "Post", "escaped": ["title"],
                 "variants": [{"name": "full"}, {"name": "small", "size": [50, 50]}]},
                {"name": "banners", "form_name": "Banner", "variants": []}
            ]"#,
        )
        .unwrap()
        .introspect(&pool)
        .await
        .unwrap();

        let state = AppState::new(
            pool,
            registry,
            StoragePaths::new(dir.path().join("images"), "/images"),
            dir.path().join("tmp"),
            64 * 1024,
        );
        let app = routes::routes::routes(64 * 1024).with_state(state);
        Self { dir, app }
    }

    fn image_path(&self, parts: &[&str]) -> PathBuf {
        parts
            .iter()
            .fold(self.dir.path().join("images"), |path, part| path.join(part))
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(method: &str, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn stored_name(json: &Value) -> String {
    json["attributes"]["image"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_update_delete_keeps_files_in_step() {
    let app = TestApp::new().await;
    let original = png(120, 80);

    let (status, created) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "<b>First</b>"),
                Part::Text("Post[sort_order]", ""),
                Part::File("Post[image]", "Summer Trip.PNG", &original),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["attributes"]["title"], "&lt;b&gt;First&lt;/b&gt;");
    assert_eq!(created["attributes"]["sort_order"], 5);

    let first = stored_name(&created);
    assert!(first.ends_with("_summer_trip.png"), "unexpected name {first}");
    assert_eq!(
        created["images"]["image"]["small"],
        format!("/images/posts/small/{first}")
    );
    assert_eq!(
        std::fs::read(app.image_path(&["posts", "full", first.as_str()])).unwrap(),
        original
    );
    let small = image::open(app.image_path(&["posts", "small", first.as_str()])).unwrap();
    assert!(small.width() <= 50 && small.height() <= 50);

    let id = created["id"].as_i64().unwrap();
    let (status, served) = app.send(get(&format!("/images/posts/full/{first}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, original);

    let (status, updated) = app
        .send_json(multipart(
            "POST",
            &format!("/posts/{id}"),
            &[Part::File("Post[image]", "winter.png", &png(60, 60))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = stored_name(&updated);
    assert_ne!(first, second);
    for variant in ["full", "small"] {
        assert!(!app.image_path(&["posts", variant, first.as_str()]).exists());
        assert!(app.image_path(&["posts", variant, second.as_str()]).exists());
    }

    let (status, _) = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/posts/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    for variant in ["full", "small"] {
        assert!(!app.image_path(&["posts", variant, second.as_str()]).exists());
    }

    let (status, _) = app.send(get(&format!("/posts/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_without_file_keeps_image() {
    let app = TestApp::new().await;
    let (_, created) = app
        .send_json(multipart(
            "POST",
            "/banners",
            &[Part::File("Banner[image]", "wide.png", &png(20, 10))],
        ))
        .await;
    let id = created["id"].as_i64().unwrap();
    let stored = stored_name(&created);
    assert_eq!(
        created["images"]["image"],
        format!("/images/banners/{stored}")
    );

    let (status, updated) = app
        .send_json(multipart(
            "POST",
            &format!("/banners/{id}"),
            &[
                Part::Text("Banner[caption]", "hello"),
                Part::File("Banner[image]", "", b""),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["attributes"]["caption"], "hello");
    assert_eq!(stored_name(&updated), stored);
    assert!(app.image_path(&["banners", stored.as_str()]).exists());

    let (status, _) = app.send(get(&format!("/images/banners/{stored}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_insert_with_empty_file_part_stores_nothing() {
    let app = TestApp::new().await;
    let (status, created) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "No picture"),
                Part::File("Post[image]", "", b""),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["attributes"]["image"].is_null());
    assert!(created["images"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_upload_is_ignored() {
    let app = TestApp::new().await;
    let big = vec![7u8; 100 * 1024];
    let (status, created) = app
        .send_json(multipart(
            "POST",
            "/banners",
            &[Part::File("Banner[image]", "huge.png", &big)],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["attributes"]["image"].is_null());
}

#[tokio::test]
async fn test_undecodable_image_is_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "Broken"),
                Part::File("Post[image]", "broken.png", b"not an image"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "failed to process attachment");
    assert_eq!(body["status"], 422);
}

#[tokio::test]
async fn test_errors_map_to_statuses() {
    let app = TestApp::new().await;

    let (status, _) = app.send(get("/ghosts/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send_json(multipart("POST", "/posts", &[Part::Text("Post[body]", "text")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "attribute `title` is required");

    let (status, _) = app.send(get("/images/posts/huge/missing.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(get("/images/posts/full/missing.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;
    std::fs::create_dir_all(app.dir.path().join("images")).unwrap();

    let (status, body) = app.send_json(get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send_json(get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["storage"]["ok"], true);
}

#[tokio::test]
async fn test_plain_image_value_is_ignored() {
    let app = TestApp::new().await;
    let (_, first) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "A"),
                Part::File("Post[image]", "a.png", &png(30, 30)),
            ],
        ))
        .await;
    let first_name = stored_name(&first);

    let (status, second) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "B"),
                Part::Text("Post[image]", &first_name),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(second["attributes"]["image"].is_null());

    let second_id = second["id"].as_i64().unwrap();
    let (status, _) = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/posts/{second_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.image_path(&["posts", "full", first_name.as_str()]).exists());

    let first_id = first["id"].as_i64().unwrap();
    let (status, updated) = app
        .send_json(multipart(
            "POST",
            &format!("/posts/{first_id}"),
            &[Part::Text("Post[image]", "")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored_name(&updated), first_name);
}

#[tokio::test]
async fn test_repeated_file_field_leaves_no_temp_files() {
    let app = TestApp::new().await;
    let (status, created) = app
        .send_json(multipart(
            "POST",
            "/posts",
            &[
                Part::Text("Post[title]", "Twice"),
                Part::File("Post[image]", "one.png", &png(20, 20)),
                Part::File("Post[image]", "two.png", &png(20, 20)),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(stored_name(&created).ends_with("_two.png"));

    let leftovers: Vec<_> = std::fs::read_dir(app.dir.path().join("tmp"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}
