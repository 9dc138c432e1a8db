use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use tradelane_auth::AuthzError;
use tradelane_core::DomainError;
use tradelane_infra::command_dispatcher::DispatchError;

/// `{ "success": true, "data": ... }`
pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, data)
}

fn envelope<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

/// `{ "success": false, "message": ... }`
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn forbidden(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, err.to_string())
}

pub fn bad_request(err: DomainError) -> Response {
    json_error(StatusCode::BAD_REQUEST, err.to_string())
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Concurrency(msg) => {
            tracing::warn!(%msg, "request lost repeated write conflicts");
            json_error(StatusCode::CONFLICT, "the resource changed concurrently, please retry")
        }
        DispatchError::Unavailable(msg) => {
            tracing::error!(%msg, "collaborator unavailable");
            internal()
        }
        DispatchError::Deserialize(msg) => {
            tracing::error!(%msg, "stored event no longer deserializes");
            internal()
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            internal()
        }
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::Validation(_)
        | DomainError::InvalidId(_)
        | DomainError::InvalidAmount(_)
        | DomainError::InvalidPayee(_)
        | DomainError::InsufficientStock { .. }
        | DomainError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
        DomainError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::InvariantViolation(_) => StatusCode::CONFLICT,
    };
    json_error(status, err.to_string())
}

fn internal() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (
                DomainError::InsufficientStock { requested: 10, available: 5 },
                StatusCode::BAD_REQUEST,
            ),
            (DomainError::not_authorized("x"), StatusCode::FORBIDDEN),
            (DomainError::not_found("order"), StatusCode::NOT_FOUND),
            (DomainError::invariant("x"), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err.into()).status(), status);
        }
    }

    #[test]
    fn infrastructure_failures_are_opaque_500s() {
        let res = dispatch_error_to_response(DispatchError::Deserialize("bad payload".into()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            dispatch_error_to_response(DispatchError::Concurrency("lost".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
