/*
 * Copyright 2024 Oxide Computer Company
 */

use std::collections::BTreeMap;

use minijinja::{context, AutoEscape, Environment};
use serde::Serialize;
use zpm_client::Credentials;

use crate::error::{DeployError, DeployResult};

/**
 * The deployment parameters made available to UI templates as the "deploy"
 * object; e.g., "{{ deploy.auth_url }}".
 *
 * XXX Handing the password to the UI makes a deployed application usable
 * without a login page, but it means the password is stored in the clear in
 * every rendered file.  A login form in the default UI would remove the need.
 */
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct DeploymentContext(BTreeMap<String, String>);

impl DeploymentContext {
    pub fn new() -> DeploymentContext {
        Default::default()
    }

    pub fn from_credentials(creds: &Credentials) -> DeploymentContext {
        let mut dc = DeploymentContext::new();
        dc.insert("auth_url", &creds.auth_url);
        dc.insert("tenant", &creds.tenant);
        dc.insert("username", &creds.username);
        dc.insert("password", &creds.password);
        dc
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, k: K, v: V) {
        self.0.insert(k.into(), v.into());
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.0.get(k).map(String::as_str)
    }
}

pub trait TemplateRenderer {
    /**
     * Expand the template "body" against the context.  The path is used only
     * to identify the template in error messages.
     */
    fn render(
        &self,
        path: &str,
        body: &[u8],
        ctx: &DeploymentContext,
    ) -> DeployResult<Vec<u8>>;
}

/**
 * Jinja-compatible rendering.  Output is not escaped for any particular file
 * type, and a trailing newline in the template is preserved; a template
 * without any directives renders as itself.
 */
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        JinjaRenderer::new()
    }
}

impl JinjaRenderer {
    pub fn new() -> JinjaRenderer {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        JinjaRenderer { env }
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(
        &self,
        path: &str,
        body: &[u8],
        ctx: &DeploymentContext,
    ) -> DeployResult<Vec<u8>> {
        let src = std::str::from_utf8(body).map_err(|e| DeployError::Render {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let out = self
            .env
            .render_named_str(path, src, context! { deploy => ctx })
            .map_err(|e| DeployError::Render {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(out.into_bytes())
    }
}
