use colored::Colorize;
use runway::{RunwayPlugin, WorkflowLogType, WorkflowState};

/// Streams step output and step results to the terminal.
pub fn console_plugin() -> RunwayPlugin {
  RunwayPlugin::builder("console")
    .on_run_step(|event| {
      println!("{} {}", "▶".cyan(), event.name.bold());
      Ok(())
    })
    .on_log(|log| {
      let prefix = format!("[{}]", log.step_id).dimmed();
      match log.log_type {
        WorkflowLogType::Log => println!("{} {}", prefix, log.message),
        WorkflowLogType::Error => println!("{} {}", prefix, log.message.red()),
      }
      Ok(())
    })
    .on_step_completed(|result| {
      let name = result.display_name();
      let line = match &result.failure {
        Some(failure) => format!("{}: {}", name, failure),
        None => name,
      };
      println!("{} {}", state_icon(result.state), line);
      Ok(())
    })
    .on_workflow_completed(|result| {
      let state = result.state.to_string();
      let state = match result.state {
        WorkflowState::Succeeded => state.green(),
        WorkflowState::Cancelled => state.yellow(),
        _ => state.red(),
      };
      println!("{} {} {}", "■".cyan(), result.workflow.bold(), state);
      Ok(())
    })
    .build()
}

fn state_icon(state: WorkflowState) -> colored::ColoredString {
  match state {
    WorkflowState::Succeeded => "✔".green(),
    WorkflowState::Failed => "✘".red(),
    WorkflowState::Cancelled => "⊘".yellow(),
    WorkflowState::Skipped => "↷".dimmed(),
    _ => "•".normal(),
  }
}
