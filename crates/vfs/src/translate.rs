//! Translation of storage failures into `FsError`.
//!
//! Cloud Storage reports API failures as JSON:
//!
//! ```text
//! {"error": {"code": 403, "message": "...",
//!            "errors": [{"reason": "forbidden", "message": "..."}]}}
//! ```
//!
//! Structured detail becomes `FsError::Remote`. Everything else passes through
//! as `FsError::Storage`.

use serde::Deserialize;

use gcsfs_storage::StorageError;

use crate::error::FsError;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a storage failure to a domain error.
///
/// # Arguments
/// * `err` - Failure reported by the storage client
pub fn translate(err: StorageError) -> FsError {
    match err {
        StorageError::Api {
            status,
            code,
            message,
            body,
        } => {
            if let Some(remote) = parse_error_body(&body) {
                return remote;
            }
            FsError::Remote {
                reason: code.unwrap_or_else(|| status.to_string()),
                message: message
                    .unwrap_or_else(|| format!("HTTP Status: {}\nBody:\n{}", status, body)),
            }
        }
        other => FsError::Storage(other),
    }
}

/// Absorb "not found" from an existence probe.
///
/// # Arguments
/// * `result` - Probe outcome
/// * `missing` - Value to report when the resource is absent
pub(crate) fn absorb_not_found<T>(
    result: Result<T, StorageError>,
    missing: T,
) -> crate::error::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_not_found() => Ok(missing),
        Err(err) => Err(translate(err)),
    }
}

fn parse_error_body(body: &str) -> Option<FsError> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let detail: ErrorDetail = parsed.error;

    if detail.errors.is_empty() {
        return detail.message.map(|message| FsError::Remote {
            reason: String::new(),
            message,
        });
    }

    let reason: String = detail
        .errors
        .iter()
        .filter_map(|e| e.reason.as_deref())
        .collect::<Vec<_>>()
        .join(",");
    let message: String = detail
        .errors
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    Some(FsError::Remote { reason, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, body: &str) -> StorageError {
        StorageError::Api {
            status,
            code: None,
            message: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_structured_body_joins_reasons_and_messages() {
        let body = r#"{"error":{"code":403,"message":"denied","errors":[
            {"domain":"global","reason":"forbidden","message":"no access"},
            {"domain":"global","reason":"userRateLimitExceeded","message":"slow down"}]}}"#;
        match translate(api(403, body)) {
            FsError::Remote { reason, message } => {
                assert_eq!(reason, "forbidden,userRateLimitExceeded");
                assert_eq!(message, "no access\nslow down");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_body_uses_status() {
        match translate(api(502, "<html>bad gateway</html>")) {
            FsError::Remote { reason, message } => {
                assert_eq!(reason, "502");
                assert_eq!(message, "HTTP Status: 502\nBody:\n<html>bad gateway</html>");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_backend_code_and_message_preferred() {
        let err = StorageError::Api {
            status: 409,
            code: Some("BucketNotEmpty".into()),
            message: Some("The bucket you tried to delete is not empty.".into()),
            body: "<Error/>".into(),
        };
        match translate(err) {
            FsError::Remote { reason, message } => {
                assert_eq!(reason, "BucketNotEmpty");
                assert!(message.starts_with("The bucket"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = translate(StorageError::Other {
            message: "boom".into(),
        });
        assert!(matches!(err, FsError::Storage(StorageError::Other { .. })));
    }

    #[test]
    fn test_absorb_not_found() {
        let missing: Result<bool, StorageError> = Err(api(404, "{}"));
        assert!(!absorb_not_found(missing, false).unwrap());

        let other: Result<bool, StorageError> = Err(api(500, "oops"));
        assert!(absorb_not_found(other, false).is_err());
    }
}
