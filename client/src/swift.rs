/*
 * Copyright 2024 Oxide Computer Company
 */

use reqwest::header::CONTENT_TYPE;
use reqwest::Response;

use super::keystone::{Session, TokenRequest, TokenResponse};
use super::{Credentials, ObjectStore, StoreError, StoreResult};

const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";
const HEADER_ZEROVM_EXECUTE: &str = "X-Zerovm-Execute";
const ZEROVM_EXECUTE_VERSION: &str = "1.0";

/**
 * A client for OpenStack Swift, with the ZeroVM middleware installed so that
 * job descriptions POSTed to the account can be executed in place.
 */
pub struct SwiftClient {
    client: reqwest::Client,
    session: Option<Session>,
}

impl SwiftClient {
    pub fn new_with_client(client: reqwest::Client) -> SwiftClient {
        SwiftClient { client, session: None }
    }

    fn session(&self) -> StoreResult<&Session> {
        self.session.as_ref().ok_or(StoreError::NotAuthenticated)
    }

    fn object_url(&self, path: &str) -> StoreResult<String> {
        let s = self.session()?;
        Ok(format!("{}/{}", s.storage_url, path.trim_start_matches('/')))
    }
}

/**
 * Turn any non-success response into an error that carries the body, as the
 * object store tends to explain itself there.
 */
async fn check(res: Response) -> StoreResult<Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let url = res.url().to_string();
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    Err(StoreError::Status { url, status, body: body.trim().to_string() })
}

impl ObjectStore for SwiftClient {
    async fn authenticate(&mut self, creds: &Credentials) -> StoreResult<()> {
        let url = format!("{}/tokens", creds.auth_url.trim_end_matches('/'));

        let res = self
            .client
            .post(&url)
            .json(&TokenRequest::new(creds))
            .send()
            .await?;

        let tr: TokenResponse = check(res).await?.json().await?;
        self.session = Some(tr.into_session()?);
        Ok(())
    }

    fn base_url(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.storage_url.as_str())
    }

    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> StoreResult<()> {
        let url = self.object_url(path)?;

        let res = self
            .client
            .put(&url)
            .header(HEADER_AUTH_TOKEN, &self.session()?.token)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        check(res).await?;
        Ok(())
    }

    async fn submit_job(&self, job: Vec<u8>) -> StoreResult<String> {
        let s = self.session()?;

        let res = self
            .client
            .post(&s.storage_url)
            .header(HEADER_AUTH_TOKEN, &s.token)
            .header(HEADER_ZEROVM_EXECUTE, ZEROVM_EXECUTE_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .body(job)
            .send()
            .await?;

        Ok(check(res).await?.text().await?)
    }
}
