//! Data-plane client: sends read queries and write statements to one
//! miner, carrying the signed peer-set credential built by the peer
//! directory.

use std::time::Duration;

use serde::de::DeserializeOwned;

use dsql_proto::rpc::{ExecResponse, QueryRequest, QueryResponse};

use crate::error::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MinerClient {
    http: reqwest::Client,
}

impl MinerClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("build http client: {}", e)))?;
        Ok(MinerClient { http })
    }

    async fn post<Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
        req: &QueryRequest,
    ) -> Result<Res> {
        let url = format!("{}/v1/{}", endpoint.trim_end_matches('/'), path);
        let resp = self.http.post(&url).json(req).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::from_remote(status, &body));
        }
        resp.json::<Res>().await.map_err(Error::from)
    }

    /// Execute a read query.
    pub async fn query(&self, endpoint: &str, req: &QueryRequest) -> Result<QueryResponse> {
        self.post(endpoint, "query", req).await
    }

    /// Execute a write statement or batch.
    pub async fn exec(&self, endpoint: &str, req: &QueryRequest) -> Result<ExecResponse> {
        self.post(endpoint, "exec", req).await
    }
}

impl std::fmt::Debug for MinerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinerClient").finish()
    }
}
