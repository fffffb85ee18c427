/*
 * Copyright 2024 Oxide Computer Company
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use zpm_client::Credentials;
use zpm_core::StoreConfig;

use crate::registry::{Arg, Args};

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profile: HashMap<String, Profile>,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(skip)]
    pub name: Option<String>,
    pub auth_url: Option<String>,
    pub tenant: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/**
 * The options through which credentials may be provided, along with the
 * environment variable that each falls back to.
 */
pub struct CredentialOpt {
    pub long: &'static str,
    pub env: &'static str,
    pub hint: &'static str,
    pub help: &'static str,
    field: fn(&Profile) -> Option<&str>,
}

pub const CREDENTIAL_OPTS: &[CredentialOpt] = &[
    CredentialOpt {
        long: "os-auth-url",
        env: "OS_AUTH_URL",
        hint: "URL",
        help: "OpenStack auth URL",
        field: |p| p.auth_url.as_deref(),
    },
    CredentialOpt {
        long: "os-tenant-name",
        env: "OS_TENANT_NAME",
        hint: "TENANT",
        help: "OpenStack tenant",
        field: |p| p.tenant.as_deref(),
    },
    CredentialOpt {
        long: "os-username",
        env: "OS_USERNAME",
        hint: "USER",
        help: "OpenStack username",
        field: |p| p.username.as_deref(),
    },
    CredentialOpt {
        long: "os-password",
        env: "OS_PASSWORD",
        hint: "PASSWORD",
        help: "OpenStack password",
        field: |p| p.password.as_deref(),
    },
];

pub fn credential_args() -> Vec<Arg> {
    CREDENTIAL_OPTS
        .iter()
        .map(|o| Arg::Opt {
            long: o.long,
            hint: o.hint,
            help: o.help,
            env: Some(o.env),
        })
        .collect()
}

/**
 * Combine credentials from the command line (or environment) with those in
 * the selected profile.  Each value is taken from the first place it appears.
 */
pub fn credentials(a: &Args, profile: Option<&Profile>) -> Result<Credentials> {
    let resolve = |long: &str| -> Result<String> {
        let Some(o) = CREDENTIAL_OPTS.iter().find(|o| o.long == long) else {
            bail!("no credential option --{long}");
        };

        match a.opt(o.long).or_else(|| profile.and_then(|p| (o.field)(p))) {
            Some(v) => Ok(v.to_string()),
            None => bail!(
                "usage: no value for --{}; use the option or set ${}",
                o.long,
                o.env
            ),
        }
    };

    Ok(Credentials {
        auth_url: resolve("os-auth-url")?,
        tenant: resolve("os-tenant-name")?,
        username: resolve("os-username")?,
        password: resolve("os-password")?,
    })
}

pub fn config_path() -> Result<PathBuf> {
    let mut path = dirs_next::config_dir()
        .ok_or_else(|| anyhow!("could not find config directory"))?;
    path.push("zpm");
    path.push("config.toml");
    Ok(path)
}

/**
 * The outcome of loading the configuration file: the profile to use for
 * credentials, if any, and the store settings.
 */
#[derive(Debug, Default)]
pub struct Loaded {
    pub profile: Option<Profile>,
    pub store: StoreConfig,
}

pub fn load(profile_name: Option<&str>) -> Result<Loaded> {
    let env_profile = std::env::var("ZPM_PROFILE").ok();
    load_from(&config_path()?, profile_name, env_profile.as_deref())
}

pub fn load_from(
    path: &Path,
    profile_name: Option<&str>,
    env_profile: Option<&str>,
) -> Result<Loaded> {
    /*
     * The configuration file is optional; everything it can provide can also
     * be provided on the command line or in the environment.
     */
    let c: Config = if path.exists() {
        zpm_common::read_toml(path)
            .with_context(|| anyhow!("reading file {:?}", path))?
    } else {
        Config::default()
    };

    let (profile_name, src, explicit) = if let Some(profile) = profile_name {
        (profile, "--profile argument", true)
    } else if let Some(profile) = env_profile.filter(|p| !p.is_empty()) {
        (profile, "ZPM_PROFILE environment variable", true)
    } else if let Some(profile) = c.default_profile.as_deref() {
        (profile, "\"default_profile\" in config.toml", true)
    } else {
        ("default", "fallback default", false)
    };

    let profile = if let Some(profile) = c.profile.get(profile_name) {
        let mut profile = profile.clone();
        profile.name = Some(profile_name.to_string());
        Some(profile)
    } else if explicit {
        bail!(
            "profile \"{}\" (from {}) not found in configuration file {:?}",
            profile_name,
            src,
            path
        );
    } else {
        None
    };

    Ok(Loaded { profile, store: c.store })
}
