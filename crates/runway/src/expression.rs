use crate::{output_env_name, Error, ResolvedSecrets, Result};
use indexmap::IndexMap;
use std::{collections::HashMap, fmt};

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// What a `${{ ... }}` expression points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
  /// `steps.<step>.outputs.<key>` or the short form `<step>.<key>`
  StepOutput { step: String, key: String },
  /// `secrets.<NAME>`
  Secret(String),
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Reference::StepOutput { step, key } => write!(f, "{}.{}", step, key),
      Reference::Secret(name) => write!(f, "secrets.{}", name),
    }
  }
}

impl TryFrom<&str> for Reference {
  type Error = Error;

  fn try_from(expression: &str) -> Result<Self> {
    let parts: Vec<&str> = expression.trim().split('.').map(str::trim).collect();

    let reference = match parts[..] {
      ["secrets", name] if is_identifier(name) => Reference::Secret(name.to_string()),
      ["steps", step, "outputs", key] if is_identifier(step) && is_identifier(key) => {
        Reference::StepOutput {
          step: step.to_string(),
          key: key.to_string(),
        }
      }
      [step, key] if step != "secrets" && is_identifier(step) && is_identifier(key) => {
        Reference::StepOutput {
          step: step.to_string(),
          key: key.to_string(),
        }
      }
      _ => {
        return Err(Error::definition_error(format!(
          "Unsupported expression `{}`",
          expression.trim()
        )))
      }
    };

    Ok(reference)
  }
}

fn is_identifier(value: &str) -> bool {
  !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

enum Segment<'a> {
  Text(&'a str),
  Expression(Reference),
}

fn segments(text: &str) -> Result<Vec<Segment<'_>>> {
  let mut segments = vec![];
  let mut rest = text;

  while let Some(start) = rest.find(OPEN) {
    if start > 0 {
      segments.push(Segment::Text(&rest[..start]));
    }

    let after_open = &rest[start + OPEN.len()..];
    let end = after_open.find(CLOSE).ok_or_else(|| {
      Error::definition_error(format!("Unterminated expression in `{}`", text))
    })?;

    segments.push(Segment::Expression(Reference::try_from(
      &after_open[..end],
    )?));
    rest = &after_open[end + CLOSE.len()..];
  }

  if !rest.is_empty() {
    segments.push(Segment::Text(rest));
  }

  Ok(segments)
}

/// Every reference in `text`, in order of appearance.
pub fn references(text: &str) -> Result<Vec<Reference>> {
  Ok(
    segments(text)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Expression(reference) => Some(reference),
        Segment::Text(_) => None,
      })
      .collect(),
  )
}

/// Replaces every expression in `text`. A step output that was never
/// produced fails with [`Error::UnresolvedOutput`].
pub fn interpolate(text: &str, outputs: &JobOutputs, secrets: &ResolvedSecrets) -> Result<String> {
  let mut interpolated = String::with_capacity(text.len());

  for segment in segments(text)? {
    match segment {
      Segment::Text(text) => interpolated.push_str(text),
      Segment::Expression(reference) => {
        let value = match &reference {
          Reference::StepOutput { step, key } => outputs.get(step, key),
          Reference::Secret(name) => secrets.get(name).map(|value| value.expose()),
        };

        match (value, &reference) {
          (Some(value), _) => interpolated.push_str(value),
          (None, Reference::Secret(name)) => return Err(Error::secret_not_found(name)),
          (None, reference) => return Err(Error::unresolved_output(reference)),
        }
      }
    }
  }

  Ok(interpolated)
}

/// Outputs produced so far in one job, keyed by step id.
#[derive(Debug, Clone, Default)]
pub struct JobOutputs {
  steps: IndexMap<String, HashMap<String, String>>,
}

impl JobOutputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, step: impl Into<String>, outputs: HashMap<String, String>) {
    self.steps.insert(step.into(), outputs);
  }

  pub fn get(&self, step: &str, key: &str) -> Option<&str> {
    self
      .steps
      .get(step)
      .and_then(|outputs| outputs.get(key))
      .map(|value| value.as_str())
  }

  pub fn contains_step(&self, step: &str) -> bool {
    self.steps.contains_key(step)
  }

  /// `RUNWAY_STEPS_<ID>_<KEY>` variables for every output.
  pub fn environments(&self) -> HashMap<String, String> {
    self
      .steps
      .iter()
      .flat_map(|(step, outputs)| {
        outputs
          .iter()
          .map(move |(key, value)| (output_env_name(step, key), value.clone()))
      })
      .collect()
  }
}
