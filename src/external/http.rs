use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// JSON-over-HTTP endpoint shared by the Auth, Broker and ledger clients.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    base_url: String,
    service: &'static str,
}

impl JsonEndpoint {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::collaborator(service, "connect", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<R: DeserializeOwned>(&self, operation: &'static str, path: &str) -> HarnessResult<R> {
        let resp = self
            .client
            .get(&self.url(path))
            .send()
            .await
            .map_err(|e| HarnessError::collaborator(self.service, operation, e))?;
        self.decode(operation, resp).await
    }

    pub async fn post<P, R>(&self, operation: &'static str, path: &str, payload: &P) -> HarnessResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.send(operation, path, payload).await?;
        self.decode(operation, resp).await
    }

    /// Posts and only checks the status; the body is ignored.
    pub async fn post_status<P>(&self, operation: &'static str, path: &str, payload: &P) -> HarnessResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.send(operation, path, payload).await.map(|_| ())
    }

    async fn send<P>(&self, operation: &'static str, path: &str, payload: &P) -> HarnessResult<reqwest::Response>
    where
        P: Serialize + ?Sized,
    {
        let resp = self
            .client
            .post(&self.url(path))
            .json(payload)
            .send()
            .await
            .map_err(|e| HarnessError::collaborator(self.service, operation, e))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(HarnessError::Rejected {
                service: self.service,
                operation,
                status: resp.status().as_u16(),
            })
        }
    }

    async fn decode<R: DeserializeOwned>(&self, operation: &'static str, resp: reqwest::Response) -> HarnessResult<R> {
        if !resp.status().is_success() {
            return Err(HarnessError::Rejected {
                service: self.service,
                operation,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<R>()
            .await
            .map_err(|e| HarnessError::collaborator(self.service, operation, format!("malformed response: {}", e)))
    }
}
