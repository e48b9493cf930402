#![allow(dead_code)]

use async_trait::async_trait;
use markitdown_service::config::ServiceConfig;
use markitdown_service::services::{ConversionError, Converter};
use markitdown_service::startup::{build_router, AppState, Application};
use axum::extract::ConnectInfo;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BOUNDARY: &str = "X-MARKITDOWN-TEST-BOUNDARY";

/// What the fake converter saw for one call.
#[derive(Debug, Clone)]
pub struct SeenFile {
    pub path: PathBuf,
    pub existed: bool,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// `# Converted` heading followed by the file's text.
    Echo,
    Fail,
    Panic,
}

/// Stand-in for the external converter that records every call.
#[derive(Debug)]
pub struct FakeConverter {
    behavior: Behavior,
    seen: Mutex<Vec<SeenFile>>,
}

impl FakeConverter {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<SeenFile> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        let content = std::fs::read(path).unwrap_or_default();
        self.seen.lock().unwrap().push(SeenFile {
            path: path.to_path_buf(),
            existed: path.exists(),
            content: content.clone(),
        });

        match self.behavior {
            Behavior::Echo => Ok(format!(
                "# Converted\n\n{}",
                String::from_utf8_lossy(&content)
            )),
            Behavior::Fail => Err(anyhow::anyhow!("corrupt document").into()),
            Behavior::Panic => panic!("converter crashed"),
        }
    }
}

pub fn test_config(temp_dir: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.common.port = 0; // Random port for testing
    config.upload.temp_dir = Some(temp_dir.to_path_buf());
    config
}

/// Files currently present in a temp directory.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub temp_dir: TempDir,
    pub converter: Arc<FakeConverter>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Behavior::Echo, |_| {}).await
    }

    pub async fn spawn_with(behavior: Behavior, configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = test_config(temp_dir.path());
        configure(&mut config);

        let converter = FakeConverter::new(behavior);
        let app = Application::build_with_converter(config, converter.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            temp_dir,
            converter,
            client,
        }
    }

    pub async fn upload(&self, filename: Option<&str>, content: Vec<u8>) -> reqwest::Response {
        let mut part = reqwest::multipart::Part::bytes(content);
        if let Some(name) = filename {
            part = part.file_name(name.to_string());
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        self.client
            .post(format!("{}/process_file", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub fn leftover_files(&self) -> Vec<PathBuf> {
        files_in(self.temp_dir.path())
    }
}

/// Router plus the fake converter, for in-process `oneshot` tests.
pub fn test_router(
    behavior: Behavior,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (axum::Router, Arc<FakeConverter>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let converter = FakeConverter::new(behavior);
    let router = build_router(AppState::new(config, converter.clone()));
    (router, converter, temp_dir)
}

/// Hand-built `multipart/form-data` body with a single `file` part.
pub fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(filename: &str, content: &[u8]) -> axum::http::Request<axum::body::Body> {
    multipart_request_from([198, 51, 100, 7], filename, content)
}

/// Multipart upload as if accepted from `peer`, the way
/// `into_make_service_with_connect_info` records it.
pub fn multipart_request_from(
    peer: [u8; 4],
    filename: &str,
    content: &[u8],
) -> axum::http::Request<axum::body::Body> {
    let mut request = axum::http::Request::builder()
        .method("POST")
        .uri("/process_file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(axum::body::Body::from(multipart_body(filename, content)))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}
