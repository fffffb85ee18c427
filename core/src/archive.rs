/*
 * Copyright 2024 Oxide Computer Company
 */

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{DeployError, DeployResult};
use crate::manifest::{Manifest, MANIFEST_NAME};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/**
 * A ZAR, read entirely into memory.  Archives are small (a manifest, a job
 * description, some UI files and the application itself) and we need random
 * access to entries by name, which a tar stream does not give us.
 */
#[derive(Debug)]
pub struct Zar {
    manifest: Manifest,
    job: Value,
    entries: BTreeMap<String, Vec<u8>>,
}

fn entry_name(raw: &str) -> String {
    raw.trim_start_matches("./").to_string()
}

impl Zar {
    /**
     * Open an archive, which may be gzip-compressed or a bare tar stream, and
     * pull out the package manifest and the job description it names.
     */
    pub fn from_bytes(buf: &[u8]) -> DeployResult<Zar> {
        let r: Box<dyn Read + '_> = if buf.starts_with(GZIP_MAGIC) {
            Box::new(GzDecoder::new(buf))
        } else {
            Box::new(buf)
        };

        let mut entries = BTreeMap::new();
        let mut ar = tar::Archive::new(r);
        for ent in ar
            .entries()
            .map_err(|e| DeployError::malformed("reading archive", e))?
        {
            let mut ent =
                ent.map_err(|e| DeployError::malformed("reading archive", e))?;

            if !ent.header().entry_type().is_file() {
                continue;
            }

            let name = entry_name(
                &ent.path()
                    .map_err(|e| DeployError::malformed("entry name", e))?
                    .to_string_lossy(),
            );

            let mut data = Vec::new();
            ent.read_to_end(&mut data)
                .map_err(|e| DeployError::malformed(&name, e))?;
            entries.insert(name, data);
        }

        let Some(data) = entries.get(MANIFEST_NAME) else {
            return Err(DeployError::malformed(MANIFEST_NAME, "not present"));
        };
        let manifest: Manifest = serde_json::from_slice(data)
            .map_err(|e| DeployError::malformed(MANIFEST_NAME, e))?;
        if manifest.name().is_empty() {
            return Err(DeployError::malformed(
                MANIFEST_NAME,
                "\"meta.name\" is empty",
            ));
        }

        let jobname = manifest.job_file_name();
        let Some(data) = entries.get(&jobname) else {
            return Err(DeployError::malformed(&jobname, "not present"));
        };
        let job: Value = serde_json::from_slice(data)
            .map_err(|e| DeployError::malformed(&jobname, e))?;

        Ok(Zar { manifest, job, entries })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /**
     * The job description, exactly as it was decoded from the archive.
     */
    pub fn job(&self) -> &Value {
        &self.job
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(&entry_name(name)).map(Vec::as_slice)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/**
 * Write a gzip-compressed tar stream containing the provided files, in the
 * order provided.  Headers carry no timestamps or ownership, so the same
 * input always produces the same archive.
 */
pub fn pack<'a, I>(files: I) -> std::io::Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut b =
        tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for (name, data) in files {
        let mut h = tar::Header::new_gnu();
        h.set_entry_type(tar::EntryType::Regular);
        h.set_size(data.len() as u64);
        h.set_mode(0o644);
        h.set_mtime(0);
        h.set_cksum();
        b.append_data(&mut h, name, data)?;
    }

    b.into_inner()?.finish()
}
