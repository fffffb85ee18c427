/*
 * Copyright 2024 Oxide Computer Company
 */

use std::cell::RefCell;

use anyhow::anyhow;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use zpm_client::{Credentials, ObjectStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct Upload {
    pub path: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/**
 * An in-memory object store that records every call made against it, and
 * can be told to fail particular calls.
 */
pub struct FakeStore {
    storage_url: String,
    reject_auth: bool,
    fail_upload: Option<String>,
    fail_execute: bool,
    authenticated: Option<Credentials>,
    uploads: RefCell<Vec<Upload>>,
    jobs: RefCell<Vec<Vec<u8>>>,
}

impl FakeStore {
    pub fn new(storage_url: &str) -> FakeStore {
        FakeStore {
            storage_url: storage_url.to_string(),
            reject_auth: false,
            fail_upload: None,
            fail_execute: false,
            authenticated: None,
            uploads: Default::default(),
            jobs: Default::default(),
        }
    }

    /**
     * Start out as if authenticate() had already succeeded.
     */
    pub fn logged_in(mut self) -> FakeStore {
        self.authenticated = Some(Credentials {
            auth_url: "http://keystone/v2.0".into(),
            tenant: "demo".into(),
            username: "alice".into(),
            password: "secret".into(),
        });
        self
    }

    pub fn reject_auth(mut self) -> FakeStore {
        self.reject_auth = true;
        self
    }

    pub fn fail_upload(mut self, path: &str) -> FakeStore {
        self.fail_upload = Some(path.to_string());
        self
    }

    pub fn fail_execute(mut self) -> FakeStore {
        self.fail_execute = true;
        self
    }

    pub fn authenticated_as(&self) -> Option<&Credentials> {
        self.authenticated.as_ref()
    }

    pub fn upload_paths(&self) -> Vec<String> {
        self.uploads.borrow().iter().map(|u| u.path.to_string()).collect()
    }

    fn find(&self, path: &str) -> Option<Upload> {
        self.uploads.borrow().iter().rev().find(|u| u.path == path).cloned()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.find(path).map(|u| u.body)
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.find(path).map(|u| u.content_type)
    }

    pub fn jobs(&self) -> Vec<Vec<u8>> {
        self.jobs.borrow().clone()
    }
}

impl ObjectStore for FakeStore {
    async fn authenticate(&mut self, creds: &Credentials) -> StoreResult<()> {
        if self.reject_auth {
            return Err(StoreError::Status {
                url: format!("{}/tokens", creds.auth_url),
                status: 401,
                body: "Unauthorized".into(),
            });
        }

        self.authenticated = Some(creds.clone());
        Ok(())
    }

    fn base_url(&self) -> Option<&str> {
        self.authenticated.as_ref().map(|_| self.storage_url.as_str())
    }

    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> StoreResult<()> {
        if self.authenticated.is_none() {
            return Err(StoreError::NotAuthenticated);
        }

        if self.fail_upload.as_deref() == Some(path) {
            return Err(StoreError::Other(anyhow!("disk full")));
        }

        self.uploads.borrow_mut().push(Upload {
            path: path.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        Ok(())
    }

    async fn submit_job(&self, job: Vec<u8>) -> StoreResult<String> {
        if self.authenticated.is_none() {
            return Err(StoreError::NotAuthenticated);
        }

        self.jobs.borrow_mut().push(job);

        if self.fail_execute {
            return Err(StoreError::Status {
                url: self.storage_url.to_string(),
                status: 500,
                body: "execution failed".into(),
            });
        }

        Ok("hello from the sandbox\n".to_string())
    }
}

/**
 * Listen on an ephemeral loopback port.  Returns the listener and its base
 * URL.
 */
pub async fn bind() -> std::io::Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    Ok((listener, url))
}

/**
 * Read one request, body included, and return its head.
 */
async fn read_request(sock: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            while buf.len() < end + 4 + len {
                let n = sock.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Ok(head);
        }

        let n = sock.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::from_utf8_lossy(&buf).to_string());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/**
 * Answer one connection per canned response, in order, closing each
 * connection after the response.  The task yields the request line of each
 * request it answered.
 */
pub fn serve(
    listener: TcpListener,
    responses: Vec<(u16, String)>,
) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();

        for (status, body) in responses {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let Ok(head) = read_request(&mut sock).await else {
                break;
            };
            seen.push(head.lines().next().unwrap_or_default().to_string());

            let res = format!(
                "HTTP/1.1 {status} Canned\r\n\
                content-type: application/json\r\n\
                content-length: {}\r\n\
                connection: close\r\n\r\n{body}",
                body.len()
            );
            if sock.write_all(res.as_bytes()).await.is_err() {
                break;
            }
            let _ = sock.shutdown().await;
        }

        seen
    })
}
