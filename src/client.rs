use crate::feature::{GenerationFeature, ResultStore};
use crate::types::ClientConfig;
use crate::{Error, Response};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

/// HTTP client for the generation API: opens streams, downloads artifacts and
/// saves completed results.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    config: ClientConfig,
}

/// Body of a save response.
#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<SavedRecord>,
}

#[derive(Debug, Deserialize)]
struct SavedRecord {
    #[serde(alias = "rubricId", alias = "quizId", alias = "lessonPlanId", alias = "_id")]
    id: Option<Value>,
}

fn default_success() -> bool {
    true
}

impl GenerationClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POST the feature's form to its streaming endpoint.
    ///
    /// Non-2xx responses become [`Error::Connection`] carrying the body text.
    pub async fn open_stream<F: GenerationFeature>(&self, request: &F) -> Result<Response, Error> {
        let url = self.config.url(&request.stream_path());
        tracing::debug!(url = %url, resource = F::RESOURCE, "opening generation stream");

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .multipart(request.multipart()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::connection(status.as_u16(), error_text));
        }

        Ok(Response::from_http(response))
    }

    /// Fetch a generated document by its artifact token.
    pub async fn download(&self, resource: &str, token: &str) -> Result<Bytes, Error> {
        let url = self.config.url(&format!("{resource}/download/{token}"));
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::connection(status.as_u16(), error_text));
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ResultStore for GenerationClient {
    async fn save(&self, resource: &str, record: &Value) -> Result<Option<String>, Error> {
        let url = self.config.url(&format!("{resource}/save"));
        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::persistence(format!("{status}: {error_text}")));
        }

        let body: SaveResponse = response
            .json()
            .await
            .map_err(|e| Error::persistence(format!("unreadable save response: {e}")))?;
        if !body.success {
            return Err(Error::persistence(
                body.message.unwrap_or_else(|| "save rejected".to_string()),
            ));
        }

        Ok(body.data.and_then(|data| data.id).and_then(|id| match id {
            Value::String(id) => Some(id),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_response_id_aliases() {
        for key in ["id", "rubricId", "quizId", "lessonPlanId", "_id"] {
            let body = format!(r#"{{"success":true,"data":{{"{key}":"abc"}}}}"#);
            let parsed: SaveResponse = serde_json::from_str(&body).unwrap();
            assert!(parsed.success);
            assert_eq!(parsed.data.unwrap().id, Some(Value::String("abc".into())));
        }
    }

    #[test]
    fn test_save_response_defaults() {
        let parsed: SaveResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.success);
        assert!(parsed.data.is_none());
    }
}
