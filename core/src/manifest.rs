/*
 * Copyright 2024 Oxide Computer Company
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/**
 * The name of the package manifest, both in a project directory and at the
 * root of a ZAR.
 */
pub const MANIFEST_NAME: &str = "zar.json";

/**
 * UI files published when the manifest does not list any.
 */
pub const DEFAULT_UI: &[&str] = &["index.html", "style.css", "zebra.js"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    pub meta: Meta,
    /**
     * Glob patterns, relative to the project root, naming the files to
     * include in the bundle.
     */
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundling: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meta {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /**
     * The archive entry that holds the job description.
     */
    pub fn job_file_name(&self) -> String {
        format!("{}.json", self.meta.name)
    }

    pub fn ui_files(&self) -> Vec<String> {
        match &self.ui {
            Some(ui) => ui.clone(),
            None => DEFAULT_UI.iter().map(|s| s.to_string()).collect(),
        }
    }
}
