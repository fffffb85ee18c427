/*
 * Copyright 2024 Oxide Computer Company
 */

/*
 * The job description is the execution plan consumed by the
 * sandbox runtime: a list of groups, each of which binds a set of devices.
 * We model only the parts we need to touch and carry everything else through
 * untouched in the flattened "extra" maps.
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DeployError, DeployResult};

/**
 * The device tag under which an uploaded ZAR is made available to a job.
 */
pub const IMAGE_DEVICE: &str = "image";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct JobDescription {
    groups: Vec<JobGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_list: Option<Vec<Device>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/**
 * One entry in a group's file list.  Entries already present in a job are
 * carried through exactly as written, whatever keys they have; only the
 * image device is constructed here.
 */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct Device(Map<String, Value>);

impl Device {
    pub fn image<S: Into<String>>(uri: S) -> Device {
        let mut m = Map::new();
        m.insert("device".to_string(), Value::from(IMAGE_DEVICE));
        m.insert("path".to_string(), Value::String(uri.into()));
        Device(m)
    }

    pub fn device(&self) -> Option<&str> {
        self.0.get("device").and_then(Value::as_str)
    }

    pub fn path(&self) -> Option<&str> {
        self.0.get("path").and_then(Value::as_str)
    }
}

impl JobDescription {
    pub fn new(groups: Vec<JobGroup>) -> JobDescription {
        JobDescription { groups }
    }

    /**
     * Decode a job description that has already been parsed as JSON.  The
     * input must be a list of objects; anything else is not something the
     * runtime would accept either.
     */
    pub fn from_value(v: Value) -> DeployResult<JobDescription> {
        serde_json::from_value(v)
            .map_err(|e| DeployError::InvalidJobDescription(e.to_string()))
    }

    pub fn groups(&self) -> &[JobGroup] {
        &self.groups
    }

    /**
     * Append the device to the end of the file list of every group.  Either
     * every group gets the device or, if any group has no file list, none of
     * them do.
     */
    pub fn attach_device(&mut self, device: &Device) -> DeployResult<()> {
        if let Some(i) = self.groups.iter().position(|g| g.file_list.is_none())
        {
            let name = self.groups[i]
                .extra
                .get("name")
                .and_then(Value::as_str)
                .map(|n| format!(" ({n:?})"))
                .unwrap_or_default();
            return Err(DeployError::InvalidJobDescription(format!(
                "group {i}{name} has no \"file_list\""
            )));
        }

        for fl in self.groups.iter_mut().filter_map(|g| g.file_list.as_mut()) {
            fl.push(device.clone());
        }

        Ok(())
    }

    pub fn to_json(&self) -> DeployResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DeployError::InvalidJobDescription(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    fn two_groups() -> Result<JobDescription> {
        Ok(JobDescription::from_value(json!([
            {
                "name": "map",
                "exec": {"path": "file://python2.7:python"},
                "file_list": [
                    {"device": "python2.7"},
                    {"device": "stdout", "content_type": "text/plain"}
                ]
            },
            {
                "name": "reduce",
                "file_list": []
            }
        ]))?)
    }

    #[test]
    fn attach_to_every_group() -> Result<()> {
        let mut job = two_groups()?;
        let before = job
            .groups()
            .iter()
            .map(|g| g.file_list.as_ref().map(Vec::len))
            .collect::<Vec<_>>();

        let dev = Device::image("swift://AUTH_x/myapp/app.zar");
        job.attach_device(&dev)?;

        for (g, n) in job.groups().iter().zip(before) {
            let fl = g.file_list.as_ref().unwrap();
            assert_eq!(Some(fl.len() - 1), n);
            assert_eq!(fl.last(), Some(&dev));
        }
        Ok(())
    }

    #[test]
    fn unknown_keys_survive() -> Result<()> {
        let mut job = two_groups()?;
        job.attach_device(&Device::image("swift://a/b.zar"))?;

        let out: Value = serde_json::from_slice(&job.to_json()?)?;
        assert_eq!(
            out,
            json!([
                {
                    "name": "map",
                    "exec": {"path": "file://python2.7:python"},
                    "file_list": [
                        {"device": "python2.7"},
                        {"device": "stdout", "content_type": "text/plain"},
                        {"device": "image", "path": "swift://a/b.zar"}
                    ]
                },
                {
                    "name": "reduce",
                    "file_list": [
                        {"device": "image", "path": "swift://a/b.zar"}
                    ]
                }
            ])
        );
        Ok(())
    }

    #[test]
    fn existing_entries_are_untouched() -> Result<()> {
        let mut job = JobDescription::from_value(json!([
            {
                "file_list": [
                    {"device": "stdout", "path": null},
                    {"path": "swift://AUTH_x/data/input.txt"},
                    {"device": "stdin", "path": "x", "mode": 3}
                ]
            }
        ]))?;

        let fl = job.groups()[0].file_list.as_ref().unwrap();
        assert_eq!(fl[0].device(), Some("stdout"));
        assert_eq!(fl[0].path(), None);
        assert_eq!(fl[1].device(), None);

        let dev = Device::image("swift://a/b.zar");
        assert_eq!(dev.device(), Some("image"));
        assert_eq!(dev.path(), Some("swift://a/b.zar"));
        job.attach_device(&dev)?;

        let out: Value = serde_json::from_slice(&job.to_json()?)?;
        assert_eq!(
            out,
            json!([
                {
                    "file_list": [
                        {"device": "stdout", "path": null},
                        {"path": "swift://AUTH_x/data/input.txt"},
                        {"device": "stdin", "path": "x", "mode": 3},
                        {"device": "image", "path": "swift://a/b.zar"}
                    ]
                }
            ])
        );
        Ok(())
    }

    #[test]
    fn missing_file_list() -> Result<()> {
        let mut job = JobDescription::from_value(json!([
            {"name": "first", "file_list": []},
            {"name": "second"}
        ]))?;
        let orig = job.clone();

        match job.attach_device(&Device::image("swift://a/b.zar")) {
            Err(DeployError::InvalidJobDescription(msg)) => {
                assert!(msg.contains("group 1"), "{msg}");
                assert!(msg.contains("second"), "{msg}");
            }
            other => panic!("unexpected result {other:?}"),
        }

        /*
         * The first group must not have been modified.
         */
        assert_eq!(job, orig);
        Ok(())
    }

    #[test]
    fn not_a_list() {
        for v in [
            json!({"file_list": []}),
            json!("job"),
            json!([1, 2]),
            json!([{"file_list": ["stdout"]}]),
        ] {
            assert!(matches!(
                JobDescription::from_value(v),
                Err(DeployError::InvalidJobDescription(_))
            ));
        }
    }
}
