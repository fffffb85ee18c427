/*
 * Copyright 2024 Oxide Computer Company
 */

/*
 * Packaging and deployment of ZeroVM applications.  A project directory is
 * bundled into a ZAR; deploying a ZAR uploads it to Swift along with its job
 * description (rewritten to use the uploaded ZAR as an image) and its UI
 * files (rendered with the deployment parameters).
 */

mod archive;
pub mod bundle;
mod deploy;
mod error;
pub mod job;
pub mod manifest;
pub mod project;
mod publish;
mod render;

#[cfg(test)]
mod testutil;

pub use archive::{pack, Zar};
pub use deploy::{DeployRequest, Deployer, Deployment, StoreConfig};
pub use error::{DeployError, DeployResult};
pub use publish::publish_ui;
pub use render::{DeploymentContext, JinjaRenderer, TemplateRenderer};
