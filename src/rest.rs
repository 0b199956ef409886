use crate::error::FetchError;
use crate::types::account::AccountSummary;
use crate::types::conversation::Conversation;
use crate::types::message::Message;
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}

/// The REST contract this crate consumes. Implemented over HTTP in
/// production and by in-memory doubles in tests.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn load_conversations(&self, is_admin: bool) -> Result<Vec<Conversation>, FetchError>;
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, FetchError>;
    /// `Ok(None)` when the account does not exist (404).
    async fn fetch_account(&self, id: &str) -> Result<Option<AccountSummary>, FetchError>;
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadResponse, FetchError>;
}

/// REST implementation over blocking `ureq`. Since `ureq` is blocking, every
/// request is wrapped in `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct HttpRestClient {
    base_url: String,
}

impl HttpRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    async fn get_json<T>(&self, path: String) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let url = format!("{}{}", self.base_url, path);
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<T> {
            let response = ureq::get(&url).call()?;
            let status = response.status().as_u16();
            if status >= 400 {
                return Err(anyhow!("status {status}"));
            }
            let body = response.into_body().read_to_vec()?;
            Ok(serde_json::from_slice(&body)?)
        })
        .await
        .map_err(|e| FetchError::new(path.clone(), anyhow!(e)))?;

        result.map_err(|source| FetchError::new(path, source))
    }
}

#[async_trait]
impl RestClient for HttpRestClient {
    async fn load_conversations(&self, is_admin: bool) -> Result<Vec<Conversation>, FetchError> {
        self.get_json(format!("/conversations?isAdmin={is_admin}"))
            .await
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, FetchError> {
        self.get_json(format!(
            "/messages/{}/messages",
            urlencoding::encode(conversation_id)
        ))
        .await
    }

    async fn fetch_account(&self, id: &str) -> Result<Option<AccountSummary>, FetchError> {
        let path = format!("/accounts/{}", urlencoding::encode(id));
        let url = format!("{}{}", self.base_url, path);
        let result =
            tokio::task::spawn_blocking(move || -> anyhow::Result<Option<AccountSummary>> {
                let response = match ureq::get(&url).call() {
                    Ok(response) => response,
                    Err(ureq::Error::StatusCode(404)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let body = response.into_body().read_to_vec()?;
                Ok(Some(serde_json::from_slice(&body)?))
            })
            .await
            .map_err(|e| FetchError::new(path.clone(), anyhow!(e)))?;

        result.map_err(|source| FetchError::new(path, source))
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadResponse, FetchError> {
        let path = format!("/upload?filename={}", urlencoding::encode(filename));
        let url = format!("{}{}", self.base_url, path);
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<UploadResponse> {
            let response = ureq::post(&url)
                .header("Content-Type", "application/octet-stream")
                .send(&bytes[..])?;
            let status = response.status().as_u16();
            if status >= 400 {
                return Err(anyhow!("status {status}"));
            }
            let body = response.into_body().read_to_vec()?;
            Ok(serde_json::from_slice(&body)?)
        })
        .await
        .map_err(|e| FetchError::new(path.clone(), anyhow!(e)))?;

        result.map_err(|source| FetchError::new(path, source))
    }
}
