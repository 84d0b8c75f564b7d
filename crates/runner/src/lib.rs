mod command;
mod docker;
mod executors;
mod profiles;
mod registry;
mod runway_runner;
mod source_control;
mod utils;

pub use command::{Command, ExitStatus, Receiver};
pub use docker::Docker;
pub use executors::{DockerExecutor, Executor, HostExecutor};
pub use profiles::{Profile, RunnerProfiles};
pub use registry::DockerRegistry;
pub use runway_runner::{RunwayRunner, RunwayRunnerBuilder};
pub use source_control::GitSourceControl;
