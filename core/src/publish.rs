/*
 * Copyright 2024 Oxide Computer Company
 */

use slog::{debug, Logger};
use zpm_client::ObjectStore;
use zpm_common::guess_mime_type;

use crate::archive::Zar;
use crate::error::{DeployError, DeployResult};
use crate::render::{DeploymentContext, TemplateRenderer};

/**
 * Object paths are always relative to the target directory in the store.
 */
pub(crate) fn object_path(target: &str, name: &str) -> String {
    if target.is_empty() {
        name.to_string()
    } else {
        format!("{target}/{name}")
    }
}

/**
 * Render and upload each UI file named by the manifest, in the order the
 * manifest lists them.  The first failure, whether a missing file, a broken
 * template or a failed upload, ends the process; files already uploaded stay
 * where they are.  Returns the store path of each uploaded file.
 */
pub async fn publish_ui<S, R>(
    log: &Logger,
    store: &S,
    renderer: &R,
    zar: &Zar,
    target: &str,
    ctx: &DeploymentContext,
) -> DeployResult<Vec<String>>
where
    S: ObjectStore,
    R: TemplateRenderer,
{
    let mut uploaded = Vec::new();

    for name in zar.manifest().ui_files() {
        let Some(body) = zar.file(&name) else {
            return Err(DeployError::MissingUiAsset(name));
        };

        let output = renderer.render(&name, body, ctx)?;

        let path = object_path(target, &name);
        debug!(log, "uploading UI file";
            "path" => &path, "bytes" => output.len());
        store
            .upload(&path, &guess_mime_type(&name), output)
            .await
            .map_err(|source| DeployError::Upload {
                path: path.to_string(),
                source,
            })?;
        uploaded.push(path);
    }

    Ok(uploaded)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::pack;
    use crate::render::JinjaRenderer;
    use crate::testutil::FakeStore;
    use anyhow::Result;
    use zpm_common::discard_log;

    fn zar(manifest: &str, files: &[(&str, &str)]) -> Result<Zar> {
        let mut all = vec![
            ("zar.json", manifest.as_bytes()),
            ("demo.json", b"[]".as_slice()),
        ];
        all.extend(files.iter().map(|(n, d)| (*n, d.as_bytes())));
        Ok(Zar::from_bytes(&pack(all)?)?)
    }

    #[tokio::test]
    async fn default_ui_files() -> Result<()> {
        let zar = zar(
            r#"{"meta": {"name": "demo"}}"#,
            &[
                ("zebra.js", "var x;"),
                ("style.css", "p {}"),
                ("index.html", "<p>{{ deploy.tenant }}</p>"),
                ("extra.html", "not published"),
            ],
        )?;
        let store = FakeStore::new("http://swift/v1/AUTH_x").logged_in();
        let mut ctx = DeploymentContext::new();
        ctx.insert("tenant", "demo");

        let uploaded = publish_ui(
            &discard_log(),
            &store,
            &JinjaRenderer::new(),
            &zar,
            "myapp",
            &ctx,
        )
        .await?;

        let expect = ["myapp/index.html", "myapp/style.css", "myapp/zebra.js"];
        assert_eq!(uploaded, expect);
        assert_eq!(store.upload_paths(), expect);
        assert_eq!(store.object("myapp/index.html").unwrap(), b"<p>demo</p>");
        assert_eq!(store.content_type("myapp/style.css").unwrap(), "text/css");
        Ok(())
    }

    #[tokio::test]
    async fn stops_at_missing_file() -> Result<()> {
        let zar = zar(
            r#"{"meta": {"name": "demo"}, "ui": ["a.html", "b.html", "c.html"]}"#,
            &[("a.html", "a"), ("c.html", "c")],
        )?;
        let store = FakeStore::new("http://swift/v1/AUTH_x").logged_in();

        let res = publish_ui(
            &discard_log(),
            &store,
            &JinjaRenderer::new(),
            &zar,
            "myapp",
            &DeploymentContext::new(),
        )
        .await;

        match res {
            Err(DeployError::MissingUiAsset(name)) => {
                assert_eq!(name, "b.html")
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(store.upload_paths(), vec!["myapp/a.html"]);
        Ok(())
    }

    #[tokio::test]
    async fn upload_failure_names_path() -> Result<()> {
        let zar = zar(
            r#"{"meta": {"name": "demo"}, "ui": ["a.html", "b.html"]}"#,
            &[("a.html", "a"), ("b.html", "b")],
        )?;
        let store = FakeStore::new("http://swift/v1/AUTH_x")
            .logged_in()
            .fail_upload("myapp/a.html");

        let res = publish_ui(
            &discard_log(),
            &store,
            &JinjaRenderer::new(),
            &zar,
            "myapp",
            &DeploymentContext::new(),
        )
        .await;

        match res {
            Err(DeployError::Upload { path, .. }) => {
                assert_eq!(path, "myapp/a.html")
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(store.upload_paths().is_empty());
        Ok(())
    }
}
