#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Malformed workflow document. The run never starts.
  #[error("Invalid workflow definition: {0}")]
  DefinitionError(String),

  #[error("Secret `{0}` not found")]
  SecretNotFound(String),

  #[error("Unresolved output reference `{0}`")]
  UnresolvedOutput(String),

  #[error("Timed out after {0}")]
  Timeout(String),

  #[error("Cancelled: {0}")]
  Cancelled(String),

  #[error("Error while running workflow: {0}")]
  InternalRuntimeError(String),

  #[error("Collaborator error: {0}")]
  CollaboratorError(String),

  #[error("Error: {0}")]
  Error(String),

  #[error("IO error: {0}")]
  IOError(#[from] std::io::Error),

  #[error("Failed to initialize: {0}")]
  InitError(String),

  #[error("Unsupported feature: {0}")]
  UnsupportedFeature(String),
}

impl Error {
  pub fn definition_error<T: ToString>(message: T) -> Self {
    Self::DefinitionError(message.to_string())
  }

  pub fn secret_not_found<T: ToString>(name: T) -> Self {
    Self::SecretNotFound(name.to_string())
  }

  pub fn unresolved_output<T: ToString>(reference: T) -> Self {
    Self::UnresolvedOutput(reference.to_string())
  }

  pub fn timeout(duration: std::time::Duration) -> Self {
    Self::Timeout(humantime::format_duration(duration).to_string())
  }

  pub fn cancelled<T: ToString>(message: T) -> Self {
    Self::Cancelled(message.to_string())
  }

  pub fn internal_runtime_error<T: ToString>(message: T) -> Self {
    Self::InternalRuntimeError(message.to_string())
  }

  pub fn collaborator_error<T: ToString>(message: T) -> Self {
    Self::CollaboratorError(message.to_string())
  }

  pub fn io_error(source: std::io::Error) -> Self {
    Self::IOError(source)
  }

  pub fn unsupported_feature<T: ToString>(message: T) -> Self {
    Self::UnsupportedFeature(message.to_string())
  }

  pub fn init_error<T: ToString>(message: T) -> Self {
    Self::InitError(message.to_string())
  }

  pub fn error<T: ToString>(message: T) -> Self {
    Self::Error(message.to_string())
  }

  pub fn is_definition_error(&self) -> bool {
    matches!(self, Self::DefinitionError(_))
  }
}

// Compare errors in tests
impl PartialEq for Error {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::DefinitionError(a), Self::DefinitionError(b)) => a == b,
      (Self::SecretNotFound(a), Self::SecretNotFound(b)) => a == b,
      (Self::UnresolvedOutput(a), Self::UnresolvedOutput(b)) => a == b,
      (Self::Timeout(a), Self::Timeout(b)) => a == b,
      (Self::Cancelled(a), Self::Cancelled(b)) => a == b,
      (Self::InternalRuntimeError(a), Self::InternalRuntimeError(b)) => a == b,
      (Self::CollaboratorError(a), Self::CollaboratorError(b)) => a == b,
      (Self::Error(a), Self::Error(b)) => a == b,
      (Self::IOError(a), Self::IOError(b)) => a.kind() == b.kind(),
      (Self::InitError(a), Self::InitError(b)) => a == b,
      (Self::UnsupportedFeature(a), Self::UnsupportedFeature(b)) => a == b,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn test_eq() {
    assert_eq!(
      Error::definition_error("hello"),
      Error::definition_error("hello")
    );
    assert_eq!(
      Error::secret_not_found("TOKEN"),
      Error::secret_not_found("TOKEN")
    );
    assert_eq!(
      Error::io_error(std::io::Error::new(std::io::ErrorKind::Other, "hello")),
      Error::io_error(std::io::Error::new(std::io::ErrorKind::Other, "world"))
    );
    assert_eq!(
      Error::timeout(Duration::from_secs(90)),
      Error::timeout(Duration::from_secs(90))
    );
  }

  #[test]
  fn test_ne() {
    assert_ne!(
      Error::definition_error("hello"),
      Error::definition_error("world")
    );
    assert_ne!(
      Error::unresolved_output("build.digest"),
      Error::secret_not_found("build.digest")
    );
    assert_ne!(Error::error("hello"), Error::init_error("hello"));
  }

  #[test]
  fn test_messages() {
    assert_eq!(
      Error::secret_not_found("REGISTRY_TOKEN").to_string(),
      "Secret `REGISTRY_TOKEN` not found"
    );
    assert_eq!(
      Error::timeout(Duration::from_secs(90)).to_string(),
      "Timed out after 1m 30s"
    );
    assert!(Error::definition_error("x").is_definition_error());
    assert!(!Error::error("x").is_definition_error());
  }
}
