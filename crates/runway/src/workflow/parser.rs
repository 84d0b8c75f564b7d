use super::{
  definition::{JobDefinition, Permissions, StepDefinition, StepKind, StepPredicate, WorkflowDefinition},
  user_config::{UserJob, UserStep, UserTriggerFilter, UserTriggers, UserWorkflow},
};
use crate::{
  parse_duration, references, Actions, EventKind, Error, PermissionMode, Reference, Result,
  Trigger, DEFAULT_RUNS_ON,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

const DEFAULT_WORKFLOW_NAME: &str = "workflow";

/// Turns a workflow document into a validated [`WorkflowDefinition`].
/// Every problem is reported as [`Error::DefinitionError`].
pub struct WorkflowParser {
  pub source: String,
  /// When set, `uses` must name a registered action
  pub actions: Option<Actions>,
}

impl WorkflowParser {
  pub fn new(source: impl Into<String>) -> Self {
    WorkflowParser {
      source: source.into(),
      actions: None,
    }
  }

  pub fn actions(mut self, actions: Actions) -> Self {
    self.actions = Some(actions);
    self
  }

  pub fn parse(self) -> Result<WorkflowDefinition> {
    let source_hash = WorkflowDefinition::source_hash(&self.source);
    let user_workflow = UserWorkflow::try_from(self.source.as_str())?;

    let triggers = parse_triggers(user_workflow.on)?;
    let permissions = parse_permissions(user_workflow.permissions.unwrap_or_default())?;

    let user_jobs = user_workflow.jobs.unwrap_or_default();
    if user_jobs.is_empty() {
      return Err(Error::definition_error(
        "Workflow must have at least one job",
      ));
    }

    let mut jobs = IndexMap::new();
    for (key, job) in user_jobs {
      let job = self.parse_job(&key, job)?;
      jobs.insert(key, job);
    }

    validate_needs(&jobs)?;

    Ok(WorkflowDefinition {
      name: user_workflow
        .name
        .unwrap_or_else(|| DEFAULT_WORKFLOW_NAME.to_string()),
      triggers,
      permissions,
      environments: user_workflow.env.unwrap_or_default(),
      jobs,
      source_hash,
    })
  }

  fn parse_job(&self, key: &str, job: UserJob) -> Result<JobDefinition> {
    let user_steps = job.steps.unwrap_or_default();
    if user_steps.is_empty() {
      return Err(Error::definition_error(format!(
        "Job `{}` must have at least one step",
        key
      )));
    }

    let timeout = job.timeout.as_deref().map(parse_duration).transpose()?;

    // Step ids declared so far, for output references
    let mut declared = HashSet::new();
    let mut steps = vec![];

    for (index, user_step) in user_steps.into_iter().enumerate() {
      let step = self.parse_step(key, index, user_step)?;

      for source in step.expression_sources() {
        for reference in references(source)? {
          if let Reference::StepOutput { step: step_id, .. } = &reference {
            if !declared.contains(step_id) {
              return Err(Error::definition_error(format!(
                "Step {} of job `{}` references `{}`, but no earlier step has id `{}`",
                index + 1,
                key,
                reference,
                step_id
              )));
            }
          }
        }
      }

      if let Some(id) = &step.id {
        if !declared.insert(id.clone()) {
          return Err(Error::definition_error(format!(
            "Duplicate step id `{}` in job `{}`",
            id, key
          )));
        }
      }

      steps.push(step);
    }

    Ok(JobDefinition {
      name: job.name,
      runs_on: job.runs_on.unwrap_or_else(|| DEFAULT_RUNS_ON.to_string()),
      needs: job.needs.map(|needs| needs.into_vec()).unwrap_or_default(),
      environments: job.env.unwrap_or_default(),
      timeout,
      steps,
    })
  }

  fn parse_step(&self, job_key: &str, index: usize, step: UserStep) -> Result<StepDefinition> {
    let position = || format!("Step {} of job `{}`", index + 1, job_key);

    if let Some(id) = &step.id {
      let valid = !id.is_empty()
        && id
          .chars()
          .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
      if !valid {
        return Err(Error::definition_error(format!(
          "{} has an invalid id `{}`",
          position(),
          id
        )));
      }
    }

    let kind = match (step.run, step.uses) {
      (Some(run), None) => StepKind::Command { run },
      (None, Some(uses)) => {
        if let Some(actions) = &self.actions {
          if !actions.contains(&uses) {
            return Err(Error::definition_error(format!(
              "Unknown action `{}` in job `{}`",
              uses, job_key
            )));
          }
        }

        let mut with = IndexMap::new();
        for (name, value) in step.with.unwrap_or_default() {
          let value = scalar_to_string(&value).ok_or_else(|| {
            Error::definition_error(format!(
              "{} input `{}` must be a string, number or boolean",
              position(),
              name
            ))
          })?;
          with.insert(name, value);
        }

        StepKind::Action { uses, with }
      }
      _ => {
        return Err(Error::definition_error(format!(
          "{} must set exactly one of `run` or `uses`",
          position()
        )))
      }
    };

    let predicate = step
      .condition
      .as_deref()
      .map(StepPredicate::try_from)
      .transpose()?
      .unwrap_or_default();

    let timeout = step.timeout.as_deref().map(parse_duration).transpose()?;

    let mut definition = StepDefinition {
      id: step.id,
      name: step.name,
      kind,
      predicate,
      environments: step.env.unwrap_or_default(),
      secrets: step.secrets.unwrap_or_default(),
      timeout,
      continue_on_error: step.continue_on_error.unwrap_or(false),
    };

    // Secrets used in expressions are resolved up front like declared ones
    let mut secrets: IndexSet<String> = definition.secrets.drain(..).collect();
    for source in definition.expression_sources() {
      for reference in references(source)? {
        if let Reference::Secret(name) = reference {
          secrets.insert(name);
        }
      }
    }
    definition.secrets = secrets.into_iter().collect();

    Ok(definition)
  }
}

fn parse_triggers(on: Option<UserTriggers>) -> Result<Vec<Trigger>> {
  let filters: Vec<(String, Option<UserTriggerFilter>)> = match on {
    Some(UserTriggers::Event(event)) => vec![(event, None)],
    Some(UserTriggers::Events(events)) => events.into_iter().map(|event| (event, None)).collect(),
    Some(UserTriggers::Config(config)) => config.into_iter().collect(),
    None => vec![],
  };

  if filters.is_empty() {
    return Err(Error::definition_error(
      "Workflow must declare at least one trigger in `on`",
    ));
  }

  let mut triggers = vec![];
  for (event, filter) in filters {
    let kind = EventKind::try_from(event.as_str())
      .map_err(|_| Error::definition_error(format!("Unknown event `{}` in `on`", event)))?;

    let filter = filter.unwrap_or_default();
    if filter.paths.is_some() {
      return Err(Error::definition_error(format!(
        "Path filters are not supported (`on.{}.paths`)",
        kind
      )));
    }

    let trigger = Trigger {
      kind,
      branches: filter.branches,
    };
    trigger.validate()?;

    triggers.push(trigger);
  }

  Ok(triggers)
}

fn parse_permissions(permissions: IndexMap<String, String>) -> Result<Permissions> {
  permissions
    .into_iter()
    .map(|(scope, mode)| {
      let mode = PermissionMode::try_from(mode.as_str()).map_err(|_| {
        Error::definition_error(format!(
          "Unknown permission mode `{}` for `{}`. Use `read`, `write` or `none`.",
          mode, scope
        ))
      })?;

      Ok((scope, mode))
    })
    .collect()
}

/// Unknown `needs` and cycles. Kahn's algorithm in declaration order.
fn validate_needs(jobs: &IndexMap<String, JobDefinition>) -> Result<()> {
  for (key, job) in jobs {
    for need in &job.needs {
      if !jobs.contains_key(need) {
        return Err(Error::definition_error(format!(
          "Job `{}` needs job `{}`, but job `{}` is not defined",
          key, need, need
        )));
      }
    }
  }

  let mut resolved: HashSet<&str> = HashSet::new();
  loop {
    let ready: Vec<&str> = jobs
      .iter()
      .filter(|(key, job)| {
        !resolved.contains(key.as_str())
          && job
            .needs
            .iter()
            .all(|need| resolved.contains(need.as_str()))
      })
      .map(|(key, _)| key.as_str())
      .collect();

    if ready.is_empty() {
      break;
    }

    resolved.extend(ready);
  }

  if resolved.len() < jobs.len() {
    let cycle: Vec<String> = jobs
      .keys()
      .filter(|key| !resolved.contains(key.as_str()))
      .map(|key| format!("`{}`", key))
      .collect();

    return Err(Error::definition_error(format!(
      "Jobs {} form a dependency cycle",
      cycle.join(", ")
    )));
  }

  Ok(())
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
  match value {
    serde_yaml::Value::String(value) => Some(value.clone()),
    serde_yaml::Value::Number(value) => Some(value.to_string()),
    serde_yaml::Value::Bool(value) => Some(value.to_string()),
    serde_yaml::Value::Null => Some(String::new()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{EnvironmentVariable, Event};
  use std::time::Duration;

  #[test]
  fn test_parse() {
    let yaml = r#"
name: CI
on:
  pull_request:
    branches: [main]
permissions:
  contents: read
  pull-requests: write
jobs:
  test:
    name: Test
    timeout: 1h
    steps:
      - uses: checkout
      - id: unit
        name: Unit tests
        timeout: 10m
        continue-on-error: true
        env:
          TEST_ENV: test
        run: cargo test
      - name: Report
        if: always()
        run: echo ${{ unit.exit_code }} ${{ secrets.SLACK_TOKEN }}
        secrets: [SLACK_TOKEN, SLACK_CHANNEL]
"#;

    let workflow = WorkflowParser::new(yaml).parse().unwrap();

    assert_eq!(workflow.name, "CI");
    assert_eq!(workflow.source_hash, WorkflowDefinition::source_hash(yaml));
    assert_eq!(
      workflow.triggers,
      vec![Trigger::new(EventKind::PullRequest).branches(vec!["main".to_string()])]
    );
    assert_eq!(
      workflow.permissions.get("pull-requests"),
      Some(&PermissionMode::Write)
    );

    let job = workflow.jobs.get("test").unwrap();
    assert_eq!(job.name.as_deref(), Some("Test"));
    assert_eq!(job.runs_on, "host");
    assert_eq!(job.timeout, Some(Duration::from_secs(3600)));
    assert_eq!(job.steps.len(), 3);

    let step = &job.steps[1];
    assert_eq!(step.id.as_deref(), Some("unit"));
    assert!(step.continue_on_error);
    assert_eq!(step.timeout, Some(Duration::from_secs(600)));
    assert_eq!(
      step.environments.get("TEST_ENV").unwrap(),
      &EnvironmentVariable::String("test".to_string())
    );
    assert_eq!(
      step.kind,
      StepKind::Command {
        run: "cargo test".to_string()
      }
    );

    let step = &job.steps[2];
    assert_eq!(step.predicate, StepPredicate::Always);
    assert_eq!(step.secrets, vec!["SLACK_TOKEN", "SLACK_CHANNEL"]);
  }

  #[test]
  fn test_secrets_from_expressions() {
    let yaml = r#"
on: push
jobs:
  deploy:
    steps:
      - uses: build-image
        with:
          token: ${{ secrets.REGISTRY_TOKEN }}
          retries: 3
"#;

    let workflow = WorkflowDefinition::parse(yaml).unwrap();
    let step = &workflow.jobs["deploy"].steps[0];

    assert_eq!(step.secrets, vec!["REGISTRY_TOKEN"]);
    let StepKind::Action { with, .. } = &step.kind else {
      panic!("Step should be an action");
    };
    assert_eq!(with.get("retries").unwrap(), "3");
    assert!(workflow.is_match(&Event::push("anything", "abc")));
  }

  fn parse_error(yaml: &str) -> Error {
    WorkflowParser::new(yaml).parse().unwrap_err()
  }

  #[test]
  fn test_missing_trigger() {
    assert_eq!(
      parse_error("jobs:\n  a:\n    steps:\n      - run: echo"),
      Error::definition_error("Workflow must declare at least one trigger in `on`")
    );
  }

  #[test]
  fn test_unknown_event() {
    assert_eq!(
      parse_error("on: release\njobs:\n  a:\n    steps:\n      - run: echo"),
      Error::definition_error("Unknown event `release` in `on`")
    );
  }

  #[test]
  fn test_path_filters_rejected() {
    let yaml = r#"
on:
  push:
    paths: ["src/**"]
jobs:
  a:
    steps:
      - run: echo
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Path filters are not supported (`on.push.paths`)")
    );
  }

  #[test]
  fn test_empty_jobs() {
    assert_eq!(
      parse_error("on: push\njobs:"),
      Error::definition_error("Workflow must have at least one job")
    );
  }

  #[test]
  fn test_empty_steps() {
    assert_eq!(
      parse_error("on: push\njobs:\n  job1:\n    name: Test Job\n    steps:"),
      Error::definition_error("Job `job1` must have at least one step")
    );
  }

  #[test]
  fn test_run_and_uses() {
    let yaml = r#"
on: push
jobs:
  a:
    steps:
      - run: echo
        uses: checkout
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Step 1 of job `a` must set exactly one of `run` or `uses`")
    );
  }

  #[test]
  fn test_job_need_not_exist() {
    let yaml = r#"
on: push
jobs:
  job1:
    needs: job2
    steps:
      - run: echo "Hello World"
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Job `job1` needs job `job2`, but job `job2` is not defined")
    );
  }

  #[test]
  fn test_dependency_cycle() {
    let yaml = r#"
on: push
jobs:
  lint:
    steps:
      - run: echo
  job1:
    needs: [lint, job2]
    steps:
      - run: echo
  job2:
    needs: [job1]
    steps:
      - run: echo
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Jobs `job1`, `job2` form a dependency cycle")
    );
  }

  #[test]
  fn test_forward_output_reference() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: docker push ${{ build.image_digest }}
      - id: build
        uses: build-image
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error(
        "Step 1 of job `build` references `build.image_digest`, but no earlier step has id `build`"
      )
    );
  }

  #[test]
  fn test_duplicate_step_id() {
    let yaml = r#"
on: push
jobs:
  a:
    steps:
      - id: same
        run: echo
      - id: same
        run: echo
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Duplicate step id `same` in job `a`")
    );
  }

  #[test]
  fn test_invalid_time_format() {
    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - timeout: 1ss
        run: Hello World
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error("Invalid timeout format `1ss`. The format should be like `60m` or `1h`.")
    );
  }

  #[test]
  fn test_unknown_predicate() {
    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - if: failure()
        run: echo
"#;

    assert!(parse_error(yaml).is_definition_error());
  }

  #[test]
  fn test_unknown_action() {
    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - uses: not-exists-action
"#;

    // Without a registry any action name is accepted
    assert!(WorkflowParser::new(yaml).parse().is_ok());

    let err = WorkflowParser::new(yaml)
      .actions(Actions::new())
      .parse()
      .unwrap_err();

    assert_eq!(
      err,
      Error::definition_error("Unknown action `not-exists-action` in job `test`")
    );
  }

  #[test]
  fn test_invalid_permission() {
    let yaml = r#"
on: push
permissions:
  contents: admin
jobs:
  a:
    steps:
      - run: echo
"#;

    assert_eq!(
      parse_error(yaml),
      Error::definition_error(
        "Unknown permission mode `admin` for `contents`. Use `read`, `write` or `none`."
      )
    );
  }
}
