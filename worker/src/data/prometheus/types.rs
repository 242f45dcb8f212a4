//! Prometheus HTTP API response shapes and their parsing

use serde::Deserialize;
use serde_json::Value;

use super::error::{LookupError, PrometheusError};

const STATUS_SUCCESS: &str = "success";

/// Envelope shared by every Prometheus API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    fn query_error(&self) -> PrometheusError {
        PrometheusError::Query {
            error_type: self
                .error_type
                .clone()
                .unwrap_or_else(|| self.status.clone()),
            message: self.error.clone().unwrap_or_default(),
        }
    }
}

/// `data` of an instant query with an instant-vector result
#[derive(Debug, Default, Deserialize)]
pub struct VectorData {
    #[serde(default)]
    pub result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
pub struct VectorSample {
    /// `[unix_time, "value"]`
    #[serde(default)]
    pub value: Vec<Value>,
}

/// Parse a `/api/v1/label/__name__/values` body into metric names
pub fn parse_label_values(body: &str) -> Result<Vec<String>, PrometheusError> {
    let response: ApiResponse<Vec<String>> =
        serde_json::from_str(body).map_err(|e| PrometheusError::Malformed(e.to_string()))?;

    if !response.is_success() {
        return Err(response.query_error());
    }

    Ok(response.data.unwrap_or_default())
}

/// Parse the body of a `count by (__name__)` instant query.
///
/// Reads `data.result[0].value[1]`, a stringified non-negative integer.
pub fn parse_instant_count(name: &str, body: &str) -> Result<u64, LookupError> {
    let response: ApiResponse<VectorData> =
        serde_json::from_str(body).map_err(|e| LookupError::malformed(name, e.to_string()))?;

    if !response.is_success() {
        return Err(LookupError::Backend {
            name: name.to_string(),
            source: response.query_error(),
        });
    }

    let sample = response
        .data
        .and_then(|data| data.result.into_iter().next())
        .ok_or_else(|| LookupError::NoData {
            name: name.to_string(),
        })?;

    let raw = sample.value.get(1).ok_or_else(|| LookupError::NoData {
        name: name.to_string(),
    })?;

    parse_count_value(raw)
        .ok_or_else(|| LookupError::malformed(name, format!("invalid count {raw}")))
}

fn parse_count_value(raw: &Value) -> Option<u64> {
    match raw {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_label_values() {
        let body = json!({"status": "success", "data": ["up", "http_requests_total"]}).to_string();
        assert_eq!(
            parse_label_values(&body).unwrap(),
            vec!["up".to_string(), "http_requests_total".to_string()]
        );
    }

    #[test]
    fn test_parse_label_values_empty() {
        let body = json!({"status": "success", "data": []}).to_string();
        assert!(parse_label_values(&body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_label_values_error_status() {
        let body = json!({"status": "error", "errorType": "bad_data", "error": "boom"}).to_string();
        match parse_label_values(&body) {
            Err(PrometheusError::Query {
                error_type,
                message,
            }) => {
                assert_eq!(error_type, "bad_data");
                assert_eq!(message, "boom");
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_label_values_not_json() {
        assert!(matches!(
            parse_label_values("<html>"),
            Err(PrometheusError::Malformed(_))
        ));
    }

    fn vector(value: Value) -> String {
        json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {"__name__": "up"}, "value": [1704067200.0, value]}]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_instant_count() {
        assert_eq!(parse_instant_count("up", &vector(json!("1234"))).unwrap(), 1234);
    }

    #[test]
    fn test_parse_instant_count_numeric_value() {
        assert_eq!(parse_instant_count("up", &vector(json!(7))).unwrap(), 7);
    }

    #[test]
    fn test_parse_instant_count_empty_result() {
        let body = json!({"status": "success", "data": {"resultType": "vector", "result": []}})
            .to_string();
        assert!(matches!(
            parse_instant_count("up", &body),
            Err(LookupError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_instant_count_short_value() {
        let body = json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [{"metric": {}, "value": [1704067200.0]}]}
        })
        .to_string();
        assert!(matches!(
            parse_instant_count("up", &body),
            Err(LookupError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_instant_count_not_integer() {
        for value in [json!("12.5"), json!("-3"), json!("NaN"), json!(null)] {
            let err = parse_instant_count("up", &vector(value)).unwrap_err();
            assert_eq!(err.kind(), "malformed_response");
        }
    }

    #[test]
    fn test_parse_instant_count_wrong_shape() {
        let body = json!({"status": "success", "data": {"result": "nope"}}).to_string();
        assert!(matches!(
            parse_instant_count("up", &body),
            Err(LookupError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_instant_count_error_status() {
        let body = json!({"status": "error", "errorType": "timeout", "error": "query timed out"})
            .to_string();
        assert!(matches!(
            parse_instant_count("up", &body),
            Err(LookupError::Backend { .. })
        ));
    }
}
