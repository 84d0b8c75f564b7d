mod cli;
mod console;
mod exit_code;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
  let cli = Cli::parse();

  let level = match runway_logger::parse_level(&cli.log_level) {
    Some(level) => level,
    None => {
      eprintln!("Unknown log level `{}`", cli.log_level);
      std::process::exit(exit_code::ExitCode::Other.code());
    }
  };
  runway_logger::init_logger_with_level(level);

  let code = cli.execute().await;

  std::process::exit(code.code());
}
