use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A value under `env:` in a workflow document. YAML scalars keep their type
/// until they are handed to a process.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum EnvironmentVariable {
  String(String),
  Number(f64),
  Boolean(bool),
}

impl std::fmt::Display for EnvironmentVariable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EnvironmentVariable::String(s) => write!(f, "{}", s),
      EnvironmentVariable::Number(n) => write!(f, "{}", n),
      EnvironmentVariable::Boolean(b) => write!(f, "{}", b),
    }
  }
}

impl From<String> for EnvironmentVariable {
  fn from(s: String) -> Self {
    EnvironmentVariable::String(s)
  }
}

impl From<&str> for EnvironmentVariable {
  fn from(s: &str) -> Self {
    EnvironmentVariable::String(s.to_string())
  }
}

impl From<f64> for EnvironmentVariable {
  fn from(n: f64) -> Self {
    EnvironmentVariable::Number(n)
  }
}

impl From<bool> for EnvironmentVariable {
  fn from(b: bool) -> Self {
    EnvironmentVariable::Boolean(b)
  }
}

pub type EnvironmentVariables = IndexMap<String, EnvironmentVariable>;

/// Flattens env layers into process variables. Later layers override earlier ones.
pub fn merge_environments<'a>(
  layers: impl IntoIterator<Item = &'a EnvironmentVariables>,
) -> HashMap<String, String> {
  let mut merged = HashMap::new();

  for layer in layers {
    for (key, value) in layer {
      merged.insert(key.clone(), value.to_string());
    }
  }

  merged
}

/// Turns `build` + `image_digest` into `RUNWAY_STEPS_BUILD_IMAGE_DIGEST`.
pub fn output_env_name(step_id: &str, key: &str) -> String {
  let sanitize = |value: &str| {
    value
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() {
          c.to_ascii_uppercase()
        } else {
          '_'
        }
      })
      .collect::<String>()
  };

  format!("RUNWAY_STEPS_{}_{}", sanitize(step_id), sanitize(key))
}
