//! Security checks for inbound channel requests

use crate::error::AuthError;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::error;

pub const USER_HEADER: &str = "X_ZATO_USER";
pub const PASSWORD_HEADER: &str = "X_ZATO_PASSWORD";

/// Technical account credentials; `password` is the hex digest of `password:salt`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TechAccount {
    pub name: String,
    pub password: String,
    pub salt: String,
}

impl TechAccount {
    /// Build an account from a clear-text password
    pub fn with_password(name: impl Into<String>, password: &str, salt: impl Into<String>) -> Self {
        let salt = salt.into();
        Self {
            name: name.into(),
            password: hash_password(password, &salt),
            salt,
        }
    }
}

/// Security definition attached to a URL, tagged by its `type`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityDefinition {
    TechAcc(TechAccount),
}

impl SecurityDefinition {
    pub fn type_name(&self) -> &'static str {
        match self {
            SecurityDefinition::TechAcc(_) => "tech_acc",
        }
    }
}

/// Security configuration of one URL; `None` means the URL is open
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UrlSecurity {
    pub sec_def: Option<SecurityDefinition>,
}

impl UrlSecurity {
    pub fn open() -> Self {
        Self { sec_def: None }
    }

    pub fn secured(sec_def: SecurityDefinition) -> Self {
        Self {
            sec_def: Some(sec_def),
        }
    }
}

/// The parts of the request the checks report on
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub uri: String,
}

/// `hex(sha256(password + ":" + salt))`
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHandler;

impl SecurityHandler {
    pub fn new() -> Self {
        Self
    }

    /// Run the check configured for the URL
    ///
    /// Returns `Ok(true)` when the request may proceed.
    pub fn check(
        &self,
        request_id: &str,
        url_security: &UrlSecurity,
        request: &RequestMetadata,
        _body: &[u8],
        headers: &HeaderMap,
    ) -> Result<bool, AuthError> {
        match &url_security.sec_def {
            None => Ok(true),
            Some(SecurityDefinition::TechAcc(account)) => {
                self.check_tech_acc(request_id, account, request, headers)
            }
        }
    }

    fn check_tech_acc(
        &self,
        request_id: &str,
        account: &TechAccount,
        request: &RequestMetadata,
        headers: &HeaderMap,
    ) -> Result<bool, AuthError> {
        let user = required_header(request_id, request, headers, USER_HEADER)?;
        let password = required_header(request_id, request, headers, PASSWORD_HEADER)?;

        // The client is told only that the credentials are wrong, the log says which part
        let mismatch = |what: &str| {
            format!(
                "[{}] The {} is incorrect, URI:[{}], {}:[{}]",
                request_id, what, request.uri, USER_HEADER, user
            )
        };

        if user != account.name {
            let detail = mismatch("username");
            error!("{}", detail);
            return Err(AuthError::forbidden(mismatch("username or password"), detail));
        }

        let incoming = hash_password(password, &account.salt);
        if !constant_time_eq(incoming.as_bytes(), account.password.as_bytes()) {
            let detail = mismatch("password");
            error!("{}", detail);
            return Err(AuthError::forbidden(mismatch("username or password"), detail));
        }

        Ok(true)
    }
}

fn required_header<'a>(
    request_id: &str,
    request: &RequestMetadata,
    headers: &'a HeaderMap,
    name: &str,
) -> Result<&'a str, AuthError> {
    let value = headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    match value {
        Some(value) => Ok(value),
        None => {
            let present: Vec<&str> = headers.keys().map(|key| key.as_str()).collect();
            let detail = format!(
                "[{}] The header [{}] doesn't exist or is empty, URI=[{}], headers=[{:?}]",
                request_id, name, request.uri, present
            );
            error!("{}", detail);
            Err(AuthError::forbidden(
                format!(
                    "[{}] The header [{}] doesn't exist or is empty, URI=[{}]",
                    request_id, name, request.uri
                ),
                detail,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};
    use tracing_test::traced_test;

    fn svc_security() -> UrlSecurity {
        UrlSecurity::secured(SecurityDefinition::TechAcc(TechAccount {
            name: "svc".to_string(),
            password: hash_password("secret", "saltA"),
            salt: "saltA".to_string(),
        }))
    }

    fn request() -> RequestMetadata {
        RequestMetadata {
            uri: "/orders/create".to_string(),
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_hash_matches_salted_sha256() {
        assert_eq!(
            hash_password("secret", "saltA"),
            hex::encode(Sha256::digest(b"secret:saltA"))
        );
        assert_eq!(
            TechAccount::with_password("svc", "secret", "saltA").password,
            hash_password("secret", "saltA")
        );
    }

    #[test]
    fn test_open_url_always_passes() {
        let handler = SecurityHandler::new();
        let result = handler.check("rid-1", &UrlSecurity::open(), &request(), b"", &HeaderMap::new());
        assert!(result.unwrap());
    }

    #[test]
    fn test_valid_credentials() {
        let handler = SecurityHandler::new();
        let headers = headers(&[("x_zato_user", "svc"), ("x_zato_password", "secret")]);

        let result = handler.check("rid-2", &svc_security(), &request(), b"{}", &headers);
        assert!(result.unwrap());
    }

    #[traced_test]
    #[test]
    fn test_wrong_password() {
        let handler = SecurityHandler::new();
        let headers = headers(&[("x_zato_user", "svc"), ("x_zato_password", "wrong")]);

        let err = handler
            .check("rid-3", &svc_security(), &request(), b"", &headers)
            .unwrap_err();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("username or password"));
        assert!(err.detail().contains("The password is incorrect"));
        assert!(logs_contain("The password is incorrect"));
    }

    #[traced_test]
    #[test]
    fn test_wrong_username() {
        let handler = SecurityHandler::new();
        let headers = headers(&[("x_zato_user", "intruder"), ("x_zato_password", "secret")]);

        let err = handler
            .check("rid-4", &svc_security(), &request(), b"", &headers)
            .unwrap_err();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("The username or password is incorrect"));
        assert!(!err.message.contains("The username is incorrect"));
        assert!(logs_contain("The username is incorrect"));
    }

    #[traced_test]
    #[test]
    fn test_missing_password_header() {
        let handler = SecurityHandler::new();
        let headers = headers(&[("x_zato_user", "svc")]);

        let err = handler
            .check("rid-5", &svc_security(), &request(), b"", &headers)
            .unwrap_err();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.detail().contains("The header [X_ZATO_PASSWORD] doesn't exist or is empty"));
        assert!(logs_contain("[X_ZATO_PASSWORD]"));
    }

    #[test]
    fn test_empty_user_header_rejected() {
        let handler = SecurityHandler::new();
        let headers = headers(&[("x_zato_user", ""), ("x_zato_password", "secret")]);

        let err = handler
            .check("rid-6", &svc_security(), &request(), b"", &headers)
            .unwrap_err();
        assert!(err.message.contains("[X_ZATO_USER]"));
    }

    #[test]
    fn test_definition_deserialize_by_type() {
        let json = r#"{"sec_def":{"type":"tech_acc","name":"svc","password":"ab","salt":"s"}}"#;
        let url: UrlSecurity = serde_json::from_str(json).unwrap();

        let sec_def = url.sec_def.unwrap();
        assert_eq!(sec_def.type_name(), "tech_acc");
        assert!(matches!(sec_def, SecurityDefinition::TechAcc(ref acc) if acc.name == "svc"));
    }
}
