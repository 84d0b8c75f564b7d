use crate::command::Command;
use std::collections::BTreeMap;

/// A `docker run` invocation.
#[derive(Debug, Clone)]
pub struct Docker {
  pub image: String,
  pub name: Option<String>,
  pub environments: BTreeMap<String, String>,
  pub working_dir: Option<String>,
  pub entrypoint: Option<String>,
  pub volumes: Vec<String>,
  pub auto_remove: bool,
  pub security_opts: Vec<String>,
}

impl Docker {
  pub fn new(image: impl Into<String>) -> Self {
    Self {
      image: image.into(),
      name: None,
      environments: BTreeMap::new(),
      working_dir: None,
      entrypoint: None,
      volumes: Vec::new(),
      security_opts: Vec::new(),
      auto_remove: true,
    }
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn auto_remove(mut self, auto_remove: bool) -> Self {
    self.auto_remove = auto_remove;
    self
  }

  pub fn environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.environments.insert(key.into(), value.into());
    self
  }

  pub fn working_dir(mut self, working_dir: impl Into<String>) -> Self {
    self.working_dir = Some(working_dir.into());
    self
  }

  pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
    self.entrypoint = Some(entrypoint.into());
    self
  }

  pub fn security_opt(mut self, security_opt: impl Into<String>) -> Self {
    self.security_opts.push(security_opt.into());
    self
  }

  pub fn volume(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.volumes.push(format!("{}:{}", from.into(), to.into()));
    self
  }

  /// Arguments after `docker`. Environment variables are passed by name
  /// only; their values travel in the docker client's environment so they
  /// never show up in a process listing.
  pub fn args(&self) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".to_string()];

    if self.auto_remove {
      args.push("--rm".to_string());
    }

    for security_opt in &self.security_opts {
      args.push("--security-opt".to_string());
      args.push(security_opt.to_string());
    }

    for volume in &self.volumes {
      args.push("-v".to_string());
      args.push(volume.to_string());
    }

    for key in self.environments.keys() {
      args.push("-e".to_string());
      args.push(key.to_string());
    }

    if let Some(working_dir) = &self.working_dir {
      args.push("-w".to_string());
      args.push(working_dir.to_string());
    }

    if let Some(entrypoint) = &self.entrypoint {
      args.push("--entrypoint".to_string());
      args.push(entrypoint.to_string());
    }

    if let Some(name) = &self.name {
      args.push("--name".to_string());
      args.push(name.to_string());
    }

    args.push(self.image.clone());

    args
  }
}

impl From<Docker> for Command {
  fn from(docker: Docker) -> Self {
    let mut command = Command::program("docker");
    command.args(docker.args());

    for (key, value) in &docker.environments {
      command.env(key, value);
    }

    command
  }
}
