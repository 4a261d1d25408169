mod health;
mod migrate;
mod schemas;

pub use health::health_check;
pub use migrate::migrate_schemas;
pub use schemas::{
    create_schema, drop_schema, export_schema, get_schema, initialize_schema, list_schemas,
};

use crate::service::TenantService;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TenantService>,
    pub start_time: Instant,
}

/// Caller identity forwarded by the authenticating proxy.
pub const ACTOR_HEADER: &str = "x-actor-id";

pub(crate) fn actor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_id_from_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_id(&headers), None);

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  admin-7 "));
        assert_eq!(actor_id(&headers).as_deref(), Some("admin-7"));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static(""));
        assert_eq!(actor_id(&headers), None);
    }
}
