//! Request authentication.
//!
//! Every route except `/health` needs the shared `x-api-key` and an `x-principal-id` naming
//! the acting principal. Whether that principal exists and is active is checked by the core
//! services on each call.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use casebook_uuid::RecordId;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PRINCIPAL_HEADER: &str = "x-principal-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The acting principal and the client address, if the proxy supplied one.
#[derive(Clone, Debug)]
pub struct Caller {
    pub id: RecordId,
    pub ip: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        authenticate(&parts.headers, &state.api_key)
    }
}

pub(crate) fn authenticate(headers: &HeaderMap, api_key: &str) -> Result<Caller, ApiError> {
    let presented = header(headers, API_KEY_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing x-api-key header"))?;
    if presented != api_key {
        return Err(ApiError::unauthorized("invalid API key"));
    }

    let principal = header(headers, PRINCIPAL_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing x-principal-id header"))?;
    let id = RecordId::parse(principal)
        .map_err(|_| ApiError::unauthorized("malformed x-principal-id header"))?;

    let ip = header(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());

    Ok(Caller { id, ip })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn accepts_key_and_principal() {
        let id = RecordId::new();
        let caller = authenticate(
            &headers(&[
                (API_KEY_HEADER, "secret"),
                (PRINCIPAL_HEADER, &id.to_string()),
                (FORWARDED_FOR_HEADER, "10.0.0.7, 192.168.1.1"),
            ]),
            "secret",
        )
        .unwrap();
        assert_eq!(caller.id, id);
        assert_eq!(caller.ip.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn rejects_wrong_key() {
        let err = authenticate(
            &headers(&[
                (API_KEY_HEADER, "guess"),
                (PRINCIPAL_HEADER, &RecordId::new().to_string()),
            ]),
            "secret",
        )
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rejects_missing_or_malformed_principal() {
        let missing = authenticate(&headers(&[(API_KEY_HEADER, "secret")]), "secret");
        assert!(missing.is_err());

        let malformed = authenticate(
            &headers(&[(API_KEY_HEADER, "secret"), (PRINCIPAL_HEADER, "not-an-id")]),
            "secret",
        );
        assert_eq!(malformed.unwrap_err().status, StatusCode::UNAUTHORIZED);
    }
}
