/*
 * Copyright 2024 Oxide Computer Company
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use slog::{debug, info, Logger};
use zpm_client::ClientBuilder;
use zpm_common::make_log;
use zpm_core::{bundle, project, DeployRequest, Deployer};

mod config;
mod registry;

use registry::{cmd, Arg, Args, Registry};

#[derive(Clone)]
struct Stuff {
    log: Logger,
}

async fn do_new(s: Stuff, a: Args) -> Result<()> {
    let dir = match a.positional("dir") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };

    let manifest = project::create_project(&dir)?;
    debug!(s.log, "created project";
        "manifest" => manifest.display().to_string());
    println!("Created '{}'", manifest.display());
    Ok(())
}

async fn do_bundle(s: Stuff, _: Args) -> Result<()> {
    let root = project::find_project_root(&std::env::current_dir()?)?;
    let zar = bundle::bundle_project(&s.log, &root)?;
    println!("Created {}", zar.display());
    Ok(())
}

async fn do_deploy(s: Stuff, a: Args) -> Result<()> {
    let zar = PathBuf::from(a.required("zar")?);
    let target = a.required("target")?.to_string();

    let loaded = config::load(a.opt("profile"))?;
    if let Some(name) = loaded.profile.as_ref().and_then(|p| p.name.as_deref())
    {
        debug!(s.log, "using profile"; "profile" => name);
    }
    let credentials = config::credentials(&a, loaded.profile.as_ref())?;

    let mut store = ClientBuilder::new()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(15))
        .build()?;
    let deployer = Deployer::new(&s.log, loaded.store);

    let req = DeployRequest { target, credentials, execute: a.flag("execute") };
    info!(s.log, "deploying";
        "archive" => zar.display().to_string(),
        "target" => &req.target);
    let dep = deployer.deploy_path(&mut store, &zar, &req).await?;

    if let Some(res) = &dep.execution {
        println!("job template:");
        println!("{}", serde_json::to_string_pretty(&dep.job)?);
        if let Ok(output) = res {
            println!("job output:");
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
        }
    }

    println!("app deployed to\n  {}", dep.location);

    if let Some(Err(e)) = &dep.execution {
        bail!("job execution failed: {e}");
    }
    Ok(())
}

async fn do_version(_: Stuff, _: Args) -> Result<()> {
    println!("zpm {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn commands() -> Result<Registry<Stuff>> {
    let mut r = Registry::new("zpm");

    r.add(
        "new",
        "create a new ZeroVM application project",
        vec![Arg::Positional {
            name: "dir",
            help: "project directory (default: current directory)",
            required: false,
        }],
        cmd!(do_new),
    )?;
    r.add(
        "bundle",
        "bundle the project containing the current directory into a ZAR",
        vec![],
        cmd!(do_bundle),
    )?;

    let mut deploy = vec![
        Arg::Positional {
            name: "zar",
            help: "the ZAR to deploy",
            required: true,
        },
        Arg::Positional {
            name: "target",
            help: "container and directory in which to deploy",
            required: true,
        },
        Arg::Flag { long: "execute", help: "run the job after deploying" },
        Arg::Opt {
            long: "profile",
            hint: "PROFILE",
            help: "credentials profile from the configuration file",
            env: None,
        },
    ];
    deploy.extend(config::credential_args());
    r.add(
        "deploy",
        "deploy a ZAR to Swift and publish its UI",
        deploy,
        cmd!(do_deploy),
    )?;

    r.add("version", "print the zpm version", vec![], cmd!(do_version))?;

    Ok(r)
}

#[tokio::main]
async fn main() -> Result<()> {
    sigpipe::reset();

    let s = Stuff { log: make_log("zpm") };
    let argv = std::env::args().skip(1).collect::<Vec<_>>();

    commands()?.run(s, &argv).await
}

#[cfg(test)]
mod test {
    use super::*;
    use registry::Parsed;

    fn argv(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_table() -> Result<()> {
        let r = commands()?;

        let names = r.commands().iter().map(|c| c.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["bundle", "deploy", "new", "version"]);
        Ok(())
    }

    #[test]
    fn deploy_arguments() -> Result<()> {
        let r = commands()?;

        let Parsed::Run(c, a) = r.parse(
            &argv(&["deploy", "--execute", "app.zar", "c/d"]),
            |n| (n == "OS_USERNAME").then(|| "alice".to_string()),
        )?
        else {
            bail!("expected a command");
        };
        assert_eq!(c.name, "deploy");
        assert_eq!(a.required("zar")?, "app.zar");
        assert_eq!(a.required("target")?, "c/d");
        assert!(a.flag("execute"));
        assert_eq!(a.opt("os-username"), Some("alice"));
        assert_eq!(a.opt("os-password"), None);
        assert_eq!(a.opt("profile"), None);

        assert!(r.parse(&argv(&["deploy", "app.zar"]), |_| None).is_err());
        Ok(())
    }

    #[test]
    fn new_takes_optional_directory() -> Result<()> {
        let r = commands()?;

        for (args, dir) in [
            (&["new"][..], None),
            (&["new", "proj"][..], Some("proj")),
        ] {
            let Parsed::Run(_, a) = r.parse(&argv(args), |_| None)? else {
                bail!("expected a command");
            };
            assert_eq!(a.positional("dir"), dir);
        }
        Ok(())
    }

    #[tokio::test]
    async fn new_then_bundle() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("app");
        let s = Stuff { log: zpm_common::discard_log() };

        commands()?
            .run(s.clone(), &argv(&["new", dir.to_str().unwrap()]))
            .await?;
        assert!(dir.join("zar.json").is_file());
        assert!(dir.join("app.json").is_file());

        /*
         * The bundle command works from the current directory, so drive the
         * library directly rather than changing directory under other tests.
         */
        let zar = bundle::bundle_project(&s.log, &dir)?;
        assert!(zar.ends_with("app.zar"));
        Ok(())
    }
}
