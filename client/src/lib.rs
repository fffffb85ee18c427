/*
 * Copyright 2024 Oxide Computer Company
 */

use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

mod keystone;
mod swift;

pub use swift::SwiftClient;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("{url}: unexpected status {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("authentication response: {0}")]
    BadAuthResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/**
 * The details we need to obtain a token from the identity service.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub auth_url: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
}

/**
 * The capabilities the deployment pipeline requires of a remote object store
 * that can also execute jobs.  Implementations need not be thread-safe: a
 * deployment uses one store from one task, one call at a time.
 */
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /**
     * Log in.  After success, base_url() must return the root URL of the
     * account under which uploads are stored.
     */
    async fn authenticate(&mut self, creds: &Credentials) -> StoreResult<()>;

    fn base_url(&self) -> Option<&str>;

    /**
     * Store "body" at "path", relative to the base URL.
     */
    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> StoreResult<()>;

    /**
     * Submit a serialised job description for execution, returning whatever
     * the job wrote as its output.
     */
    async fn submit_job(&self, job: Vec<u8>) -> StoreResult<String>;
}

pub struct ClientBuilder {
    timeout: Duration,
    connect_timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            timeout: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(&mut self) -> Result<SwiftClient> {
        let client = reqwest::ClientBuilder::new()
            .timeout(self.timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(self.connect_timeout)
            .build()?;

        Ok(SwiftClient::new_with_client(client))
    }
}
