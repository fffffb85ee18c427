/*
 * Copyright 2024 Oxide Computer Company
 */

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use slog::{debug, info, Logger};

use crate::archive::pack;
use crate::manifest::{Manifest, MANIFEST_NAME};
use crate::project::template;

/**
 * Files to go into a bundle, in the order in which they will be written.
 * Each name is only ever added once.
 */
#[derive(Default)]
struct Contents {
    names: BTreeSet<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl Contents {
    fn add(&mut self, name: String, data: Vec<u8>) -> bool {
        if !self.names.insert(name.clone()) {
            return false;
        }
        self.files.push((name, data));
        true
    }
}

/**
 * Convert a path beneath the project root into an archive entry name, which
 * always uses forward slashes.
 */
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| anyhow!("{path:?} is outside {root:?}"))?;

    let parts = rel
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| anyhow!("path {rel:?} is not valid UTF-8"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.join("/"))
}

/**
 * Build "<name>.zar" in the project root from the manifest found there.
 * Returns the path of the new archive.
 */
pub fn bundle_project(log: &Logger, root: &Path) -> Result<PathBuf> {
    let root = root.canonicalize()?;

    let mpath = root.join(MANIFEST_NAME);
    let mbuf =
        std::fs::read(&mpath).with_context(|| anyhow!("reading {mpath:?}"))?;
    let manifest: Manifest = serde_json::from_slice(&mbuf)
        .with_context(|| anyhow!("parsing {mpath:?}"))?;
    if manifest.name().is_empty() {
        bail!("{mpath:?}: \"meta.name\" must not be empty");
    }

    let zarname = format!("{}.zar", manifest.name());
    let output = root.join(&zarname);

    let mut c = Contents::default();
    c.add(MANIFEST_NAME.to_string(), mbuf);

    let jobname = manifest.job_file_name();
    let jpath = root.join(&jobname);
    let jbuf = std::fs::read(&jpath)
        .with_context(|| anyhow!("reading job description {jpath:?}"))?;
    serde_json::from_slice::<serde_json::Value>(&jbuf)
        .with_context(|| anyhow!("parsing {jpath:?}"))?;
    c.add(jobname, jbuf);

    for pattern in manifest.bundling.iter() {
        let full = root.join(pattern);
        let Some(full) = full.to_str() else {
            bail!("pattern {pattern:?} is not valid UTF-8");
        };

        let mut matched = 0;
        for path in glob::glob(full)
            .with_context(|| anyhow!("bundling pattern {pattern:?}"))?
        {
            let path = path?;
            if !path.is_file() || path == output {
                continue;
            }

            let name = entry_name(&root, &path)?;
            let data = std::fs::read(&path)
                .with_context(|| anyhow!("reading {path:?}"))?;
            if c.add(name, data) {
                matched += 1;
            }
        }

        if matched == 0 {
            debug!(log, "bundling pattern matched no files";
                "pattern" => pattern);
        }
    }

    for name in manifest.ui_files() {
        let path = root.join(&name);
        let data = if path.is_file() {
            std::fs::read(&path).with_context(|| anyhow!("reading {path:?}"))?
        } else if let Some(body) = template(&name) {
            debug!(log, "using built-in UI file"; "name" => &name);
            body.as_bytes().to_vec()
        } else {
            bail!("UI file {name:?} not found in {root:?}");
        };
        c.add(name, data);
    }

    let buf = pack(c.files.iter().map(|(n, d)| (n.as_str(), d.as_slice())))?;
    std::fs::write(&output, &buf)
        .with_context(|| anyhow!("writing {output:?}"))?;

    info!(log, "created bundle";
        "path" => output.display().to_string(),
        "files" => c.files.len(),
        "bytes" => buf.len());

    Ok(output)
}
