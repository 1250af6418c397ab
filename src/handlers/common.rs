use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, errors::ServiceError, ApiResponse};

/// `201 Created` with the standard envelope.
pub type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

pub fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Resolves missing or out-of-range values against the configured page sizes.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        (page, limit)
    }
}

/// Pagination plus an optional `status` filter, used by order and
/// verification listings.
#[derive(Debug, Default, Deserialize)]
pub struct StatusListQuery {
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl StatusListQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "pagination_test_secret_that_is_long_enough".into(),
            "test".into(),
        )
    }

    #[test]
    fn missing_values_use_configured_defaults() {
        let cfg = config();
        let (page, limit) = PaginationParams::default().resolve(&cfg);
        assert_eq!(page, 1);
        assert_eq!(limit, cfg.default_page_size);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = config();
        let params = PaginationParams {
            page: Some(0),
            limit: Some(10_000),
        };
        assert_eq!(params.resolve(&cfg), (1, cfg.max_page_size));

        let params = PaginationParams {
            page: Some(3),
            limit: Some(0),
        };
        assert_eq!(params.resolve(&cfg), (3, 1));
    }
}
