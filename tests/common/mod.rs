//! In-process registry speaking just enough of the `/v2/` API for tests.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use registry_admin::client::{CONTENT_DIGEST_HEADER, MANIFEST_V2};
use registry_admin::{AdminConfig, HttpRegistryClient};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

const LAYER_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

#[derive(Default)]
struct Repository {
    tags: BTreeMap<String, String>,
    manifests: HashMap<String, Vec<u8>>,
}

impl Repository {
    fn resolve(&self, reference: &str) -> Option<(String, Vec<u8>)> {
        let digest = if reference.starts_with("sha256:") {
            reference.to_string()
        } else {
            self.tags.get(reference)?.clone()
        };
        let body = self.manifests.get(&digest)?.clone();
        Some((digest, body))
    }
}

#[derive(Default)]
struct RegistryState {
    repositories: BTreeMap<String, Repository>,
    rejected_deletes: HashSet<String>,
}

type SharedState = Arc<RwLock<RegistryState>>;

pub struct MockRegistry {
    addr: SocketAddr,
    state: SharedState,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockRegistry {
    pub async fn start() -> Self {
        let state = SharedState::default();

        // Repository names may contain slashes, so one catch-all route
        // dispatches on the path suffix.
        let app = Router::new()
            .route(
                "/v2/{*rest}",
                get(dispatch_get)
                    .head(dispatch_head)
                    .delete(dispatch_delete),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> AdminConfig {
        AdminConfig::new(self.url())
    }

    pub fn client(&self) -> HttpRegistryClient {
        HttpRegistryClient::new(&self.config())
    }

    /// Stores a manifest with the given layers under `tag` and returns its digest.
    pub async fn push(&self, repository: &str, tag: &str, layers: &[(&str, u64)]) -> String {
        let layers: Vec<_> = layers
            .iter()
            .map(|(digest, size)| {
                json!({ "mediaType": LAYER_MEDIA_TYPE, "digest": digest, "size": size })
            })
            .collect();
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_V2,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 1,
                "digest": "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            },
            "layers": layers,
        });
        let body = serde_json::to_vec(&manifest).unwrap();
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&body)));

        let mut state = self.state.write().await;
        let repo = state.repositories.entry(repository.to_string()).or_default();
        repo.manifests.insert(digest.clone(), body);
        repo.tags.insert(tag.to_string(), digest.clone());
        digest
    }

    /// Adds a repository to the catalog without any tags.
    pub async fn create_repository(&self, repository: &str) {
        self.state
            .write()
            .await
            .repositories
            .entry(repository.to_string())
            .or_default();
    }

    /// Makes every DELETE of `digest` fail with 405.
    pub async fn reject_deletes(&self, digest: &str) {
        self.state
            .write()
            .await
            .rejected_deletes
            .insert(digest.to_string());
    }

    pub async fn tags(&self, repository: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .repositories
            .get(repository)
            .map(|r| r.tags.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn strip_leading_slash(s: &str) -> &str {
    s.strip_prefix('/').unwrap_or(s)
}

enum Endpoint {
    Catalog,
    Tags(String),
    Manifest(String, String),
}

impl Endpoint {
    fn parse(rest: &str) -> Option<Self> {
        let rest = strip_leading_slash(rest);
        if rest == "_catalog" {
            return Some(Endpoint::Catalog);
        }
        if let Some(name) = rest.strip_suffix("/tags/list") {
            return Some(Endpoint::Tags(name.to_string()));
        }
        let (name, reference) = rest.rsplit_once("/manifests/")?;
        Some(Endpoint::Manifest(name.to_string(), reference.to_string()))
    }
}

async fn dispatch_get(State(state): State<SharedState>, Path(rest): Path<String>) -> Response {
    match Endpoint::parse(&rest) {
        Some(Endpoint::Catalog) => catalog(state).await,
        Some(Endpoint::Tags(name)) => list_tags(state, name).await,
        Some(Endpoint::Manifest(name, reference)) => get_manifest(state, name, reference).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn dispatch_head(State(state): State<SharedState>, Path(rest): Path<String>) -> Response {
    match Endpoint::parse(&rest) {
        Some(Endpoint::Manifest(name, reference)) => check_manifest(state, name, reference).await,
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn dispatch_delete(State(state): State<SharedState>, Path(rest): Path<String>) -> Response {
    match Endpoint::parse(&rest) {
        Some(Endpoint::Manifest(name, reference)) => delete_manifest(state, name, reference).await,
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn registry_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "errors": [{ "code": code, "message": message }] })),
    )
        .into_response()
}

async fn catalog(state: SharedState) -> Response {
    let state = state.read().await;
    let names: Vec<_> = state.repositories.keys().cloned().collect();
    Json(json!({ "repositories": names })).into_response()
}

async fn list_tags(state: SharedState, name: String) -> Response {
    let state = state.read().await;
    match state.repositories.get(&name) {
        Some(repo) if repo.tags.is_empty() => Json(json!({ "name": name, "tags": null })).into_response(),
        Some(repo) => {
            let tags: Vec<_> = repo.tags.keys().cloned().collect();
            Json(json!({ "name": name, "tags": tags })).into_response()
        }
        None => registry_error(StatusCode::NOT_FOUND, "NAME_UNKNOWN", "repository name not known to registry"),
    }
}

async fn get_manifest(state: SharedState, name: String, reference: String) -> Response {
    info!("Getting manifest: {}/{}", name, reference);
    let state = state.read().await;
    match state.repositories.get(&name).and_then(|r| r.resolve(&reference)) {
        Some((digest, body)) => (
            StatusCode::OK,
            [(CONTENT_TYPE.as_str(), MANIFEST_V2.to_string()), (CONTENT_DIGEST_HEADER, digest)],
            body,
        )
            .into_response(),
        None => registry_error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN", "manifest unknown"),
    }
}

async fn check_manifest(state: SharedState, name: String, reference: String) -> Response {
    info!("Checking manifest: {}/{}", name, reference);
    let state = state.read().await;
    match state.repositories.get(&name).and_then(|r| r.resolve(&reference)) {
        Some((digest, _)) => (
            StatusCode::OK,
            [(CONTENT_TYPE.as_str(), MANIFEST_V2.to_string()), (CONTENT_DIGEST_HEADER, digest)],
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_manifest(state: SharedState, name: String, reference: String) -> Response {
    info!("Deleting manifest: {}/{}", name, reference);
    let mut state = state.write().await;

    if !reference.starts_with("sha256:") {
        return registry_error(StatusCode::BAD_REQUEST, "DIGEST_INVALID", "provided digest did not match");
    }
    if state.rejected_deletes.contains(&reference) {
        return registry_error(StatusCode::METHOD_NOT_ALLOWED, "UNSUPPORTED", "The operation is unsupported.");
    }

    let Some(repo) = state.repositories.get_mut(&name) else {
        return registry_error(StatusCode::NOT_FOUND, "NAME_UNKNOWN", "repository name not known to registry");
    };
    if repo.manifests.remove(&reference).is_none() {
        return registry_error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN", "manifest unknown");
    }
    repo.tags.retain(|_, digest| *digest != reference);

    StatusCode::ACCEPTED.into_response()
}
