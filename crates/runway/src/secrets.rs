use crate::{Error, Result};
use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};

/// Placeholder written in place of secret values.
pub const SECRET_MASK: &str = "***";

/// A secret value. It prints as `***` and cannot be serialized, so it
/// cannot end up in logs or results by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(Arc<str>);

impl SecretValue {
  pub fn new(value: impl AsRef<str>) -> Self {
    SecretValue(Arc::from(value.as_ref()))
  }

  /// The raw value, for injection into a step only.
  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for SecretValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", SECRET_MASK)
  }
}

impl fmt::Display for SecretValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", SECRET_MASK)
  }
}

/// Secrets grouped by scope (usually `owner/repo`).
///
/// The store can tell whether a secret exists and hand out values for
/// injection. It has no way to list values.
#[derive(Clone, Default)]
pub struct SecretStore {
  scopes: Arc<RwLock<HashMap<String, HashMap<String, SecretValue>>>>,
}

impl SecretStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, scope: impl Into<String>, name: impl Into<String>, value: impl AsRef<str>) {
    self
      .scopes
      .write()
      .entry(scope.into())
      .or_default()
      .insert(name.into(), SecretValue::new(value));
  }

  pub fn remove(&self, scope: &str, name: &str) -> bool {
    self
      .scopes
      .write()
      .get_mut(scope)
      .map(|secrets| secrets.remove(name).is_some())
      .unwrap_or(false)
  }

  pub fn contains(&self, scope: &str, name: &str) -> bool {
    self
      .scopes
      .read()
      .get(scope)
      .map(|secrets| secrets.contains_key(name))
      .unwrap_or(false)
  }

  /// Resolves every name or fails on the first missing one.
  pub fn resolve<S: AsRef<str>>(&self, scope: &str, names: &[S]) -> Result<ResolvedSecrets> {
    let scopes = self.scopes.read();
    let secrets = scopes.get(scope);

    let mut values = HashMap::new();
    for name in names {
      let name = name.as_ref();
      let value = secrets
        .and_then(|secrets| secrets.get(name))
        .ok_or_else(|| Error::secret_not_found(name))?;

      values.insert(name.to_string(), value.clone());
    }

    Ok(ResolvedSecrets { values })
  }

  /// Masker over every secret in the scope, so output is filtered even when
  /// a step reads a secret it did not declare.
  pub fn masker(&self, scope: &str) -> Masker {
    let scopes = self.scopes.read();

    match scopes.get(scope) {
      Some(secrets) => Masker::new(secrets.values()),
      None => Masker::default(),
    }
  }
}

/// Secrets resolved for one step.
#[derive(Clone, Default, Debug)]
pub struct ResolvedSecrets {
  values: HashMap<String, SecretValue>,
}

impl ResolvedSecrets {
  pub fn get(&self, name: &str) -> Option<&SecretValue> {
    self.values.get(name)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Environment variables named after the secrets.
  pub fn environments(&self) -> HashMap<String, String> {
    self
      .values
      .iter()
      .map(|(name, value)| (name.clone(), value.expose().to_string()))
      .collect()
  }
}

/// Replaces known secret values with [`SECRET_MASK`].
#[derive(Clone, Default)]
pub struct Masker {
  // Longest first so a secret containing another is masked whole
  patterns: Arc<Vec<String>>,
}

impl Masker {
  pub fn new<'a>(values: impl IntoIterator<Item = &'a SecretValue>) -> Self {
    let mut patterns = vec![];

    for value in values {
      let raw = value.expose();
      if raw.is_empty() {
        continue;
      }

      patterns.push(raw.to_string());

      // Output is captured line by line, so each line of a multi-line
      // secret has to be masked on its own as well
      if raw.contains('\n') {
        for line in raw.lines() {
          let line = line.trim_end_matches('\r');
          if !line.is_empty() {
            patterns.push(line.to_string());
          }
        }
      }
    }

    patterns.sort_by(|a, b| b.len().cmp(&a.len()));
    patterns.dedup();

    Masker {
      patterns: Arc::new(patterns),
    }
  }

  pub fn mask(&self, text: &str) -> String {
    let mut masked = text.to_string();

    for pattern in self.patterns.iter() {
      if masked.contains(pattern.as_str()) {
        masked = masked.replace(pattern.as_str(), SECRET_MASK);
      }
    }

    masked
  }

  pub fn is_empty(&self) -> bool {
    self.patterns.is_empty()
  }
}

impl fmt::Debug for Masker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Masker")
      .field("patterns", &self.patterns.len())
      .finish()
  }
}
