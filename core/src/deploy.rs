/*
 * Copyright 2024 Oxide Computer Company
 */

use std::path::Path;

use serde::Deserialize;
use slog::{info, o, warn, Logger};
use zpm_client::{Credentials, ObjectStore, StoreError};
use zpm_common::guess_mime_type;

use crate::archive::Zar;
use crate::error::{DeployError, DeployResult};
use crate::job::{Device, JobDescription};
use crate::publish::{object_path, publish_ui};
use crate::render::{DeploymentContext, JinjaRenderer, TemplateRenderer};

/**
 * How the location of the account in the store is derived from the storage
 * URL handed out at authentication time, and how objects in the account are
 * referred to from within a job description.
 */
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /**
     * Leading path components that identify the API version rather than the
     * account.  The first prefix that matches is removed.
     */
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,
}

fn default_scheme() -> String {
    "swift".to_string()
}

fn default_strip_prefixes() -> Vec<String> {
    vec!["/v1/".to_string()]
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            scheme: default_scheme(),
            strip_prefixes: default_strip_prefixes(),
        }
    }
}

impl StoreConfig {
    /**
     * Determine the store path for an account from its storage URL; e.g.,
     * "http://swift:8080/v1/AUTH_x" has the store path "AUTH_x".  A path
     * without a recognised version prefix is used as-is.
     */
    pub fn store_path(&self, base_url: &str) -> Result<String, StoreError> {
        let url = url::Url::parse(base_url).map_err(|e| {
            StoreError::BadAuthResponse(format!(
                "invalid storage URL {base_url:?}: {e}"
            ))
        })?;
        let path = url.path();

        Ok(self
            .strip_prefixes
            .iter()
            .find_map(|pfx| path.strip_prefix(pfx.as_str()))
            .unwrap_or(path)
            .to_string())
    }

    /**
     * The URI by which a job refers to an object in the store.
     */
    pub fn object_uri(&self, store_path: &str, object: &str) -> String {
        format!("{}://{}/{}", self.scheme, store_path, object)
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    /**
     * The directory in the store, relative to the account, into which the
     * application is deployed.
     */
    pub target: String,
    pub credentials: Credentials,
    pub execute: bool,
}

#[derive(Debug)]
pub struct Deployment {
    /**
     * The public address of the deployed application.
     */
    pub location: String,
    /**
     * The job description as uploaded, with the ZAR attached.
     */
    pub job: JobDescription,
    /**
     * Every object written to the store, in the order it was written.
     */
    pub uploaded: Vec<String>,
    /**
     * If execution was requested, the output of the job or the reason it
     * could not be run.  An execution failure does not undo the deployment.
     */
    pub execution: Option<DeployResult<String>>,
}

impl Deployment {
    pub fn execution_failed(&self) -> bool {
        matches!(self.execution, Some(Err(_)))
    }
}

pub struct Deployer<R: TemplateRenderer = JinjaRenderer> {
    log: Logger,
    config: StoreConfig,
    renderer: R,
}

impl Deployer<JinjaRenderer> {
    pub fn new(log: &Logger, config: StoreConfig) -> Deployer<JinjaRenderer> {
        Deployer::with_renderer(log, config, JinjaRenderer::new())
    }
}

impl<R: TemplateRenderer> Deployer<R> {
    pub fn with_renderer(
        log: &Logger,
        config: StoreConfig,
        renderer: R,
    ) -> Deployer<R> {
        Deployer { log: log.new(o!("component" => "deploy")), config, renderer }
    }

    /**
     * Deploy the ZAR at the given local path.
     */
    pub async fn deploy_path<S: ObjectStore>(
        &self,
        store: &mut S,
        archive: &Path,
        req: &DeployRequest,
    ) -> DeployResult<Deployment> {
        let name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DeployError::malformed(
                    archive.display().to_string(),
                    "not a file name",
                )
            })?
            .to_string();

        let buf = std::fs::read(archive).map_err(|e| {
            DeployError::malformed(archive.display().to_string(), e)
        })?;

        self.deploy(store, &name, buf, req).await
    }

    /**
     * Deploy a ZAR that has already been read into memory.  The steps run
     * strictly in order and the first failure aborts the rest, with the
     * exception of job execution: by the time we get there, the application
     * has been published and an execution failure is merely reported.
     */
    pub async fn deploy<S: ObjectStore>(
        &self,
        store: &mut S,
        archive_name: &str,
        archive: Vec<u8>,
        req: &DeployRequest,
    ) -> DeployResult<Deployment> {
        let target = req.target.trim_matches('/');
        let log = self.log.new(o!(
            "archive" => archive_name.to_string(),
            "target" => target.to_string()
        ));
        let mut uploaded = Vec::new();

        let zar = Zar::from_bytes(&archive)?;
        let manifest = zar.manifest();
        let mut job = JobDescription::from_value(zar.job().clone())?;
        info!(log, "opened archive"; "name" => manifest.name());

        store
            .authenticate(&req.credentials)
            .await
            .map_err(DeployError::Authentication)?;
        let base_url = store
            .base_url()
            .ok_or(DeployError::Authentication(StoreError::NotAuthenticated))?
            .to_string();
        let store_path = self
            .config
            .store_path(&base_url)
            .map_err(DeployError::Authentication)?;
        info!(log, "authenticated";
            "base_url" => &base_url, "store_path" => &store_path);

        /*
         * Upload the archive itself, so that the job can use it as an image.
         */
        let zar_path = object_path(target, archive_name);
        let size = archive.len();
        store
            .upload(&zar_path, &guess_mime_type(archive_name), archive)
            .await
            .map_err(|source| DeployError::Upload {
                path: zar_path.to_string(),
                source,
            })?;
        info!(log, "uploaded archive"; "path" => &zar_path, "bytes" => size);
        uploaded.push(zar_path.to_string());

        let device =
            Device::image(self.config.object_uri(&store_path, &zar_path));

        job.attach_device(&device)?;
        let job_json = job.to_json()?;

        let job_path = object_path(target, &manifest.job_file_name());
        store
            .upload(&job_path, "application/json", job_json.clone())
            .await
            .map_err(|source| DeployError::Upload {
                path: job_path.to_string(),
                source,
            })?;
        info!(log, "uploaded job description";
            "path" => &job_path, "store_path" => &store_path);
        uploaded.push(job_path);

        let ctx = DeploymentContext::from_credentials(&req.credentials);
        uploaded.extend(
            publish_ui(&log, &*store, &self.renderer, &zar, target, &ctx)
                .await?,
        );
        info!(log, "published UI"; "files" => manifest.ui_files().len());

        let execution = if req.execute {
            info!(log, "submitting job for execution");
            let res = store
                .submit_job(job_json)
                .await
                .map_err(DeployError::Execution);
            if let Err(e) = &res {
                warn!(log, "execution failed: {}", e);
            }
            Some(res)
        } else {
            None
        };

        let location = if target.is_empty() {
            format!("{base_url}/")
        } else {
            format!("{base_url}/{target}/")
        };

        Ok(Deployment {
            location,
            job,
            uploaded,
            execution,
        })
    }
}
