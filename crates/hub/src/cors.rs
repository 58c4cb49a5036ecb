// Browser clients load the editor from a separate dev server, so the
// hub's HTTP surface needs CORS. Origins come from
// `COEDIT_HUB_CORS_ORIGINS` (comma-separated, or `*`), defaulting to the
// local editor dev servers.

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const CORS_ORIGINS_ENV: &str = "COEDIT_HUB_CORS_ORIGINS";

const DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn cors_layer() -> CorsLayer {
    cors_layer_for(std::env::var(CORS_ORIGINS_ENV).ok())
}

fn cors_layer_for(configured: Option<String>) -> CorsLayer {
    // The hub only serves GET/PUT/POST; OPTIONS covers preflight.
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, REQUEST_ID_HEADER])
        .expose_headers([REQUEST_ID_HEADER])
        .max_age(std::time::Duration::from_secs(3600));

    match configured.as_deref() {
        // Wildcard origins cannot be combined with credentials.
        Some("*") => base.allow_origin(AllowOrigin::any()),
        Some(origins) => base.allow_origin(parse_origins(origins)).allow_credentials(true),
        None => base.allow_origin(parse_origins(&DEV_ORIGINS.join(","))).allow_credentials(true),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}
