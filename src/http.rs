//! HTTP API for the reputation, directory, and irreparable-segment services
//!
//! JSON over HTTP/1. Every route except `/health` requires the shared API
//! key in the `x-api-key` header. Node ids are 64-char hex; segment paths
//! are hex of the raw path bytes.
//!
//! ## Reputation
//! - `POST /reputation/nodes` - Create a node (409 if it exists)
//! - `GET  /reputation/nodes?limit=&offset=` - List stats
//! - `GET  /reputation/nodes/{id}` - Get stats
//! - `POST /reputation/nodes/{id}/ensure` - Get or create zeroed stats
//! - `POST /reputation/nodes/{id}/update` - Record audit and/or uptime outcome
//! - `POST /reputation/nodes/{id}/uptime` - Record an uptime check
//! - `POST /reputation/nodes/{id}/audit` - Record an audit
//! - `POST /reputation/batch` - Batch update with per-node failures
//! - `POST /reputation/find-valid` - Filter candidates by thresholds
//!
//! ## Directory
//! - `GET  /directory/nodes?limit=` - List cached descriptors
//! - `GET  /directory/nodes/{id}` - Get a cached descriptor
//! - `PUT  /directory/nodes/{id}` - Cache a descriptor
//! - `POST /directory/lookup` - Bulk lookup, one slot per id
//! - `POST /directory/bootstrap`, `POST /directory/walk` - Crawl hooks (501)
//!
//! ## Irreparable segments
//! - `POST   /irreparable/segments` - Record a repair attempt
//! - `GET    /irreparable/segments?limit=&offset=` - List segments
//! - `GET    /irreparable/segments/{path}` - Get a segment
//! - `DELETE /irreparable/segments/{path}` - Delete a segment
//!
//! ## Example Usage
//!
//! ```bash
//! curl -H "x-api-key: $KEY" -X POST \
//!      -d '{"update_audit":true,"audit_success":true}' \
//!      http://localhost:7778/reputation/nodes/<64 hex chars>/update
//! ```

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::directory::NodeDescriptor;
use crate::error::StoreError;
use crate::identity::NodeId;
use crate::irreparable::IrreparableSegment;
use crate::reputation::{InitialStats, NodeUpdate, NodeUpdateRequest, SelectionCriteria};
use crate::services::response::{
    error_response, from_create_result, from_option, from_result, from_unit_result,
    method_not_allowed, not_found, ok, HttpResponse,
};
use crate::services::Services;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

const DEFAULT_LIST_LIMIT: usize = 100;

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateNodeBody {
    node_id: NodeId,
    #[serde(default)]
    stats: Option<InitialStats>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateBody {
    #[serde(default)]
    update_audit: bool,
    #[serde(default)]
    audit_success: bool,
    #[serde(default)]
    update_uptime: bool,
    #[serde(default)]
    is_up: bool,
}

#[derive(Debug, Deserialize)]
struct UptimeBody {
    is_up: bool,
}

#[derive(Debug, Deserialize)]
struct AuditBody {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    nodes: Vec<NodeUpdateRequest>,
}

#[derive(Debug, Deserialize)]
struct FindValidBody {
    candidates: Vec<NodeId>,
    #[serde(default)]
    criteria: SelectionCriteria,
}

#[derive(Debug, Deserialize)]
struct LookupBody {
    ids: Vec<NodeId>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl ListQuery {
    fn parse(query: Option<&str>) -> Result<Self, StoreError> {
        match query {
            Some(q) => serde_urlencoded::from_str(q)
                .map_err(|e| StoreError::Validation(format!("Invalid query: {}", e))),
            None => Ok(Self::default()),
        }
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(body).map_err(|e| StoreError::Validation(format!("Invalid JSON: {}", e)))
}

fn parse_segment_path(raw: &str) -> Result<Vec<u8>, StoreError> {
    hex::decode(raw).map_err(|e| StoreError::Validation(format!("Invalid segment path: {}", e)))
}

// ============================================================================
// Routing
// ============================================================================

/// Dispatch one request. Kept free of I/O so it can be driven directly.
pub fn route(
    services: &Services,
    method: &Method,
    path: &str,
    query: Option<&str>,
    credential: Option<&[u8]>,
    body: &[u8],
) -> HttpResponse {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    // Store routes check the key before looking at the body
    let authenticated = || services.authenticate(credential);

    let result = match segments.as_slice() {
        ["health"] => Ok(ok(&serde_json::json!({ "status": "ok" }))),
        ["reputation", rest @ ..] => authenticated()
            .and_then(|()| reputation_routes(services, method, rest, query, credential, body)),
        ["directory", rest @ ..] => authenticated()
            .and_then(|()| directory_routes(services, method, rest, query, credential, body)),
        ["irreparable", rest @ ..] => authenticated()
            .and_then(|()| irreparable_routes(services, method, rest, query, credential, body)),
        _ => Ok(not_found("Not Found")),
    };

    result.unwrap_or_else(error_response)
}

fn reputation_routes(
    services: &Services,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    credential: Option<&[u8]>,
    body: &[u8],
) -> Result<HttpResponse, StoreError> {
    let svc = &services.reputation;

    let response = match (method, segments) {
        (&Method::POST, ["nodes"]) => {
            let req: CreateNodeBody = parse_body(body)?;
            from_create_result(svc.create(credential, req.node_id, req.stats))
        }
        (&Method::GET, ["nodes"]) => {
            let q = ListQuery::parse(query)?;
            from_result(svc.list(credential, q.limit(), q.offset()))
        }
        (&Method::GET, ["nodes", id]) => from_result(svc.get(credential, &id.parse()?)),
        (&Method::POST, ["nodes", id, "ensure"]) => {
            from_result(svc.create_entry_if_not_exists(credential, &id.parse()?))
        }
        (&Method::POST, ["nodes", id, "update"]) => {
            let req: UpdateBody = parse_body(body)?;
            let update = NodeUpdate {
                id: id.parse()?,
                update_audit: req.update_audit,
                audit_success: req.audit_success,
                update_uptime: req.update_uptime,
                is_up: req.is_up,
            };
            from_result(svc.update(credential, &update))
        }
        (&Method::POST, ["nodes", id, "uptime"]) => {
            let req: UptimeBody = parse_body(body)?;
            from_result(svc.update_uptime(credential, &id.parse()?, req.is_up))
        }
        (&Method::POST, ["nodes", id, "audit"]) => {
            let req: AuditBody = parse_body(body)?;
            from_result(svc.update_audit_success(credential, &id.parse()?, req.success))
        }
        (&Method::POST, ["batch"]) => {
            let req: BatchBody = parse_body(body)?;
            from_result(svc.update_batch(credential, &req.nodes))
        }
        (&Method::POST, ["find-valid"]) => {
            let req: FindValidBody = parse_body(body)?;
            from_result(
                svc.find_valid_nodes(credential, &req.candidates, &req.criteria)
                    .map(|ids| serde_json::json!({ "nodes": ids })),
            )
        }
        (_, ["nodes"]) | (_, ["nodes", ..]) | (_, ["batch"]) | (_, ["find-valid"]) => {
            method_not_allowed()
        }
        _ => not_found("Not Found"),
    };

    Ok(response)
}

fn directory_routes(
    services: &Services,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    credential: Option<&[u8]>,
    body: &[u8],
) -> Result<HttpResponse, StoreError> {
    let svc = &services.directory;

    let response = match (method, segments) {
        (&Method::GET, ["nodes"]) => {
            let q = ListQuery::parse(query)?;
            from_result(svc.list(credential, q.limit()))
        }
        (&Method::GET, ["nodes", id]) => {
            from_option(svc.get(credential, &id.parse()?), "Node not cached")
        }
        (&Method::PUT, ["nodes", id]) => {
            let descriptor: NodeDescriptor = parse_body(body)?;
            from_unit_result(svc.put(credential, &id.parse()?, &descriptor))
        }
        (&Method::POST, ["lookup"]) => {
            let req: LookupBody = parse_body(body)?;
            from_result(svc.get_all(credential, &req.ids))
        }
        (&Method::POST, ["bootstrap"]) => from_unit_result(svc.bootstrap(credential)),
        (&Method::POST, ["walk"]) => from_unit_result(svc.walk(credential)),
        (_, ["nodes"]) | (_, ["nodes", _]) | (_, ["lookup"]) | (_, ["bootstrap"]) | (_, ["walk"]) => {
            method_not_allowed()
        }
        _ => not_found("Not Found"),
    };

    Ok(response)
}

fn irreparable_routes(
    services: &Services,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    credential: Option<&[u8]>,
    body: &[u8],
) -> Result<HttpResponse, StoreError> {
    let svc = &services.irreparable;

    let response = match (method, segments) {
        (&Method::POST, ["segments"]) => {
            let segment: IrreparableSegment = parse_body(body)?;
            from_result(svc.increment_repair_attempts(credential, &segment))
        }
        (&Method::GET, ["segments"]) => {
            let q = ListQuery::parse(query)?;
            from_result(svc.list(credential, q.limit(), q.offset()))
        }
        (&Method::GET, ["segments", path]) => {
            from_result(svc.get(credential, &parse_segment_path(path)?))
        }
        (&Method::DELETE, ["segments", path]) => from_result(
            svc.delete(credential, &parse_segment_path(path)?)
                .map(|removed| serde_json::json!({ "removed": removed })),
        ),
        (_, ["segments"]) | (_, ["segments", _]) => method_not_allowed(),
        _ => not_found("Not Found"),
    };

    Ok(response)
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Accept connections until the task is dropped
    pub async fn run(self: Arc<Self>) -> Result<(), StoreError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        debug!(method = %parts.method, path = %parts.uri.path(), "Incoming request");

        let body = body.collect().await?.to_bytes();
        let credential = parts
            .headers
            .get(API_KEY_HEADER)
            .map(|value| value.as_bytes());

        let response = route(
            &self.services,
            &parts.method,
            parts.uri.path(),
            parts.uri.query(),
            credential,
            &body,
        );

        if response.status().is_server_error() {
            warn!(method = %parts.method, path = %parts.uri.path(), status = %response.status(), "Request failed");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyValidator;
    use crate::config::Backend;
    use crate::stores::Stores;
    use hyper::StatusCode;

    const KEY: &[u8] = b"test-key";

    fn services() -> Services {
        let stores = Stores::temporary(Backend::Sqlite).unwrap();
        Services::new(&stores, Arc::new(ApiKeyValidator::new(KEY)))
    }

    fn hex_id(byte: u8) -> String {
        NodeId::new([byte; 32]).to_hex()
    }

    #[test]
    fn test_health_needs_no_key() {
        let resp = route(&services(), &Method::GET, "/health", None, None, b"");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_missing_key_is_401() {
        let path = format!("/reputation/nodes/{}", hex_id(1));
        let resp = route(&services(), &Method::GET, &path, None, None, b"");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_malformed_body_without_key_is_401() {
        let services = services();
        for (method, path) in [
            (Method::POST, "/reputation/nodes".to_string()),
            (Method::POST, "/reputation/find-valid".to_string()),
            (Method::PUT, format!("/directory/nodes/{}", hex_id(4))),
            (Method::POST, "/irreparable/segments".to_string()),
        ] {
            let resp = route(&services, &method, &path, None, None, b"{not json");
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);

            let resp = route(&services, &method, &path, None, Some(&b"wrong"[..]), b"{not json");
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);
        }

        // With the key the same body is a plain validation failure
        let resp = route(&services, &Method::POST, "/reputation/nodes", None, Some(KEY), b"{not json");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_create_then_conflict() {
        let services = services();
        let body = format!(r#"{{"node_id":"{}"}}"#, hex_id(2));
        let first = route(&services, &Method::POST, "/reputation/nodes", None, Some(KEY), body.as_bytes());
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = route(&services, &Method::POST, "/reputation/nodes", None, Some(KEY), body.as_bytes());
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_bad_node_id_is_400() {
        let resp = route(&services(), &Method::GET, "/reputation/nodes/xyz", None, Some(KEY), b"");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_uncached_descriptor_is_404() {
        let path = format!("/directory/nodes/{}", hex_id(3));
        let resp = route(&services(), &Method::GET, &path, None, Some(KEY), b"");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_crawl_hooks_are_501() {
        let services = services();
        for path in ["/directory/bootstrap", "/directory/walk"] {
            let resp = route(&services, &Method::POST, path, None, Some(KEY), b"");
            assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED, "{}", path);
        }
    }

    #[test]
    fn test_wrong_method() {
        let resp = route(&services(), &Method::DELETE, "/reputation/batch", None, Some(KEY), b"");
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_list_query_parsing() {
        let q = ListQuery::parse(Some("limit=5&offset=10")).unwrap();
        assert_eq!((q.limit(), q.offset()), (5, 10));
        assert_eq!(ListQuery::parse(None).unwrap().limit(), DEFAULT_LIST_LIMIT);
        assert!(ListQuery::parse(Some("limit=abc")).is_err());
    }
}
