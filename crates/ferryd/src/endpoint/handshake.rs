//! Validation of the WebSocket upgrade request.

use ferry_config::DaemonDescriptor;
use tungstenite::handshake::server::{ErrorResponse, Request};
use tungstenite::http::StatusCode;
use tungstenite::http::header::{AUTHORIZATION, ORIGIN};

/// Path clients upgrade on.
pub(super) const WEBSOCKET_PATH: &str = "/api/ws";

/// Why an upgrade was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Rejection {
    pub(super) status: StatusCode,
    pub(super) reason: &'static str,
}

impl Rejection {
    const fn new(status: StatusCode, reason: &'static str) -> Self {
        Self { status, reason }
    }

    pub(super) fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.reason.to_owned()));
        *response.status_mut() = self.status;
        response
    }
}

/// Returns the authenticated user name, or why the upgrade is refused.
///
/// A missing `Origin` header is accepted; native clients do not send one.
pub(super) fn authorise(
    descriptor: &DaemonDescriptor,
    request: &Request,
) -> Result<String, Rejection> {
    if request.uri().path() != WEBSOCKET_PATH {
        return Err(Rejection::new(StatusCode::NOT_FOUND, "unknown path"));
    }
    let user = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| descriptor.authenticate(value))
        .ok_or(Rejection::new(StatusCode::UNAUTHORIZED, "invalid credentials"))?;
    if let Some(origin) = request.headers().get(ORIGIN) {
        let accepted = origin
            .to_str()
            .is_ok_and(|origin| descriptor.accepts_origin(origin));
        if !accepted {
            return Err(Rejection::new(StatusCode::FORBIDDEN, "origin not allowed"));
        }
    }
    Ok(user.username.clone())
}

#[cfg(test)]
mod tests {
    use ferry_config::DaemonUser;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn descriptor() -> DaemonDescriptor {
        DaemonDescriptor {
            users: vec![DaemonUser::new("gui", "secret")],
            ..DaemonDescriptor::default()
        }
    }

    fn upgrade(path: &str, authorization: Option<String>, origin: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(format!("ws://127.0.0.1:8443{path}"));
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(origin) = origin {
            builder = builder.header(ORIGIN, origin);
        }
        builder.body(()).expect("upgrade request")
    }

    fn valid_credentials() -> Option<String> {
        Some(DaemonUser::new("gui", "secret").basic_authorization())
    }

    #[rstest]
    fn matching_credentials_and_origin_are_accepted(descriptor: DaemonDescriptor) {
        let request = upgrade("/api/ws", valid_credentials(), Some("http://127.0.0.1:8443"));
        assert_eq!(authorise(&descriptor, &request), Ok("gui".to_owned()));
    }

    #[rstest]
    fn a_missing_origin_is_accepted(descriptor: DaemonDescriptor) {
        let request = upgrade("/api/ws", valid_credentials(), None);
        assert!(authorise(&descriptor, &request).is_ok());
    }

    #[rstest]
    #[case::wrong_password(
        "/api/ws",
        Some(DaemonUser::new("gui", "guess").basic_authorization()),
        None,
        StatusCode::UNAUTHORIZED
    )]
    #[case::no_credentials("/api/ws", None, None, StatusCode::UNAUTHORIZED)]
    #[case::foreign_origin(
        "/api/ws",
        valid_credentials(),
        Some("http://evil.example:8443"),
        StatusCode::FORBIDDEN
    )]
    #[case::other_path("/metrics", valid_credentials(), None, StatusCode::NOT_FOUND)]
    fn invalid_upgrades_are_refused(
        descriptor: DaemonDescriptor,
        #[case] path: &str,
        #[case] authorization: Option<String>,
        #[case] origin: Option<&str>,
        #[case] status: StatusCode,
    ) {
        let request = upgrade(path, authorization, origin);
        let rejection = authorise(&descriptor, &request).expect_err("upgrade should be refused");
        assert_eq!(rejection.status, status);
        assert_eq!(rejection.into_response().status(), status);
    }
}
