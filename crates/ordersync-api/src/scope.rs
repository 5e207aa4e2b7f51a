use axum::http::HeaderMap;
use ordersync_core::sync::SyncScope;

use crate::error::AppError;

pub const BUSINESS_HEADER: &str = "x-business-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Business scope and actor established by the upstream authentication layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope(pub SyncScope);

impl RequestScope {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let business_id = header_value(headers, BUSINESS_HEADER)?;
        let actor = header_value(headers, ACTOR_HEADER)?;
        SyncScope::new(business_id, actor)
            .map(Self)
            .map_err(|error| AppError::unauthorized(error.to_string()))
    }

    pub fn business_id(&self) -> &str {
        &self.0.business_id
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    let value = headers
        .get(name)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {name} header")))?
        .to_str()
        .map_err(|_| AppError::unauthorized(format!("{name} header is not valid UTF-8")))?
        .trim();
    if value.is_empty() {
        return Err(AppError::unauthorized(format!("{name} header is empty")));
    }
    Ok(value)
}
