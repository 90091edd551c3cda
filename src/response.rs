use actix_web::http::StatusCode;
use serde::Serialize;

/// JSON envelope shared by every endpoint: `{code, message, errors, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub errors: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(status: StatusCode, message: &str, data: T) -> Self {
        Self {
            code: status.as_u16(),
            message: message.to_string(),
            errors: None,
            data: Some(data),
        }
    }

    pub fn error(status: StatusCode, message: &str, errors: String) -> Self {
        Self {
            code: status.as_u16(),
            message: message.to_string(),
            errors: Some(errors),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload, serialized with `"data": null`.
    pub fn message(status: StatusCode, message: &str) -> Self {
        Self {
            code: status.as_u16(),
            message: message.to_string(),
            errors: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::success(
            StatusCode::OK,
            "Refresh token successfully",
            serde_json::json!({ "token": "abc" }),
        ))
        .unwrap();

        assert_eq!(body["code"], 200);
        assert_eq!(body["message"], "Refresh token successfully");
        assert!(body["errors"].is_null());
        assert_eq!(body["data"]["token"], "abc");
    }

    #[test]
    fn test_message_envelope_has_null_data() {
        let body = serde_json::to_value(ApiResponse::message(StatusCode::OK, "Successfully logged out")).unwrap();
        assert!(body["data"].is_null());
        assert!(body.get("data").is_some());
    }
}
