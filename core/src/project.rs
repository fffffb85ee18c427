/*
 * Copyright 2024 Oxide Computer Company
 */

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};

use crate::manifest::{Manifest, Meta, DEFAULT_UI, MANIFEST_NAME};

/**
 * The built-in UI, used for any UI file that a project does not provide
 * itself.
 */
pub const TEMPLATES: &[(&str, &str)] = &[
    ("index.html", include_str!("../templates/index.html")),
    ("style.css", include_str!("../templates/style.css")),
    ("zebra.js", include_str!("../templates/zebra.js")),
];

pub fn template(name: &str) -> Option<&'static str> {
    TEMPLATES.iter().find(|(n, _)| *n == name).map(|(_, body)| *body)
}

pub fn default_manifest(name: &str) -> Manifest {
    let mut extra = Map::new();
    extra.insert("Version".into(), Value::from("0.1"));
    extra.insert("Summary".into(), Value::from(""));
    extra.insert("Author-email".into(), Value::from(""));

    Manifest {
        meta: Meta { name: name.to_string(), extra },
        bundling: vec!["*.py".to_string()],
        ui: Some(DEFAULT_UI.iter().map(|s| s.to_string()).collect()),
        extra: Map::new(),
    }
}

/**
 * A job description that runs "main.py" from the bundle under Python, with
 * its output attached to stdout.
 */
pub fn starter_job() -> Value {
    json!([
        {
            "name": "main",
            "exec": {
                "path": "file://python2.7:python",
                "args": "main.py"
            },
            "file_list": [
                {"device": "python2.7"},
                {"device": "stdout"}
            ]
        }
    ])
}

fn write_json(path: &Path, v: &impl serde::Serialize) -> Result<()> {
    let mut buf = serde_json::to_vec_pretty(v)?;
    buf.push(b'\n');
    std::fs::write(path, buf).with_context(|| anyhow!("writing {path:?}"))
}

/**
 * Create a new project in "dir", which need not exist yet.  The project is
 * named for the directory.  Returns the path of the new manifest.
 */
pub fn create_project(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| anyhow!("creating {dir:?}"))?;
    let dir = dir.canonicalize()?;

    let manifest = dir.join(MANIFEST_NAME);
    if manifest.exists() {
        bail!("{manifest:?} already exists");
    }

    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        bail!("cannot derive a project name from {dir:?}");
    };

    let m = default_manifest(name);
    write_json(&manifest, &m)?;

    let job = dir.join(m.job_file_name());
    if !job.exists() {
        write_json(&job, &starter_job())?;
    }

    Ok(manifest)
}

/**
 * Walk up from "start" until we find a directory with a manifest in it.
 */
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let start = start.canonicalize()?;

    start
        .ancestors()
        .find(|p| p.join(MANIFEST_NAME).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            anyhow!("no {MANIFEST_NAME} found in {start:?} or any parent")
        })
}
