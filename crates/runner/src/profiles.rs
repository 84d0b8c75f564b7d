use crate::executors::{DockerExecutor, Executor, HostExecutor};
use runway::{Error, Result, DEFAULT_RUNS_ON};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

/// Where the steps of a job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum Profile {
  Host,
  Docker {
    image: String,
    #[serde(default, rename = "security-opts")]
    security_opts: Vec<String>,
  },
}

impl Profile {
  pub fn executor(&self) -> Arc<dyn Executor> {
    match self {
      Profile::Host => Arc::new(HostExecutor),
      Profile::Docker {
        image,
        security_opts,
      } => Arc::new(DockerExecutor {
        image: image.clone(),
        security_opts: security_opts.clone(),
      }),
    }
  }
}

/// Maps `runs-on` values to profiles.
///
/// Registered profiles win. Otherwise `host`, `host/<os>` and
/// `host/<os>-<arch>` of this machine run on the host, and anything else
/// is taken as a docker image.
///
/// ```yaml
/// ubuntu:
///   executor: docker
///   image: ubuntu:22.04
/// local:
///   executor: host
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RunnerProfiles {
  profiles: HashMap<String, Profile>,
}

impl RunnerProfiles {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_yaml(yaml: &str) -> Result<Self> {
    serde_yaml::from_str(yaml)
      .map_err(|err| Error::init_error(format!("Invalid runner profiles: {}", err)))
  }

  pub fn insert(&mut self, runs_on: impl Into<String>, profile: Profile) {
    self.profiles.insert(runs_on.into(), profile);
  }

  pub fn resolve(&self, runs_on: &str) -> Profile {
    let runs_on = runs_on.trim();

    if let Some(profile) = self.profiles.get(runs_on) {
      return profile.clone();
    }

    if runs_on.is_empty() || is_this_host(runs_on) {
      return Profile::Host;
    }

    Profile::Docker {
      image: runs_on.to_string(),
      security_opts: vec![],
    }
  }
}

fn is_this_host(runs_on: &str) -> bool {
  let os = std::env::consts::OS;
  let arch = std::env::consts::ARCH;

  runs_on == DEFAULT_RUNS_ON
    || runs_on == format!("{}/{}", DEFAULT_RUNS_ON, os)
    || runs_on == format!("{}/{}-{}", DEFAULT_RUNS_ON, os, arch)
}
