use axum::response::Response;
use http_body_util::BodyExt;

/// Collects a response body and parses it as JSON. Empty bodies become `Null`.
pub async fn response_to_json(response: Response) -> serde_json::Value {
    let bytes = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => panic!("Failed to read response body: {}", e),
    };

    if bytes.is_empty() {
        return serde_json::Value::Null;
    }

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "Response body is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&bytes)
        )
    })
}
