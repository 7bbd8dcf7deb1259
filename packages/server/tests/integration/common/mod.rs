use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use serde_json::Value;
use tempfile::TempDir;

use ::common::MediaStore;
use ::common::catalog::MemoryCatalog;
use ::common::config::{DatabaseConfig, MqAppConfig, StorageConfig};
use ::common::storage::FilesystemBlobStore;
use mq::MemoryJobQueue;
use server::config::{AppConfig, CorsConfig, ServerConfig};
use server::state::AppState;

pub const JOBS: &str = "images";
pub const MAX_UPLOAD: u64 = 4 * 1024 * 1024;

pub mod routes {
    pub const IMAGES: &str = "/api/v1/images";
    pub const DLQ: &str = "/api/v1/dlq";

    pub fn image(id: &str) -> String {
        format!("/api/v1/images/{id}")
    }

    pub fn media(filename: &str) -> String {
        format!("/api/v1/media/images/{filename}")
    }

    pub fn dlq_message(id: i32) -> String {
        format!("/api/v1/dlq/{id}")
    }

    pub fn dlq_retry(id: i32) -> String {
        format!("/api/v1/dlq/{id}/retry")
    }
}

/// A running test server over in-memory catalog and queue.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub media: MediaStore,
    pub catalog: Arc<MemoryCatalog>,
    pub queue: MemoryJobQueue,
    blob_dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_db(MockDatabase::new(DatabaseBackend::Postgres).into_connection()).await
    }

    /// Spawn with a prepared connection for the dead-letter tables.
    pub async fn spawn_with_db(db: DatabaseConnection) -> Self {
        let blob_dir = tempfile::tempdir().expect("Failed to create blob dir");
        let blobs = FilesystemBlobStore::new(blob_dir.path(), MAX_UPLOAD)
            .await
            .expect("Failed to open blob store");
        let catalog = Arc::new(MemoryCatalog::new());
        let media = MediaStore::new(Arc::new(blobs), catalog.clone());
        let queue = MemoryJobQueue::new();

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database: DatabaseConfig {
                url: "postgres://unused".to_string(),
                max_connections: 1,
            },
            storage: StorageConfig {
                blob_dir: blob_dir.path().to_path_buf(),
                max_blob_size: MAX_UPLOAD,
            },
            mq: MqAppConfig::default(),
        };

        let state = AppState {
            media: media.clone(),
            queue: Arc::new(queue.clone()),
            db,
            config,
        };
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            media,
            catalog,
            queue,
            blob_dir,
        }
    }

    /// Every file under the blob root, staging area included.
    pub fn blob_files(&self) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        let mut dirs = vec![self.blob_dir.path().to_path_buf()];
        while let Some(dir) = dirs.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    dirs.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    /// GET without consuming the body, for header and byte assertions.
    pub async fn get_raw(&self, path: &str, if_none_match: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(tag) = if_none_match {
            req = req.header("If-None-Match", tag);
        }
        req.send().await.expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Upload an `image` part. `mime` of `None` leaves the part untyped.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime: Option<&str>,
        user_id: Option<&str>,
    ) -> TestResponse {
        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(mime) = mime {
            part = part.mime_str(mime).expect("Failed to set MIME type");
        }
        let mut form = Form::new().part("image", part);
        if let Some(user_id) = user_id {
            form = form.text("userId", user_id.to_string());
        }

        let res = self
            .client
            .post(self.url(routes::IMAGES))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Upload a PNG of the given size and return its id.
    pub async fn upload_png(&self, width: u32, height: u32) -> String {
        let res = self
            .upload(png(width, height), "photo.png", Some("image/png"), Some("user-1"))
            .await;
        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        res.id()
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn id(&self) -> String {
        self.body["id"]
            .as_str()
            .expect("response body should contain 'id'")
            .to_string()
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}
