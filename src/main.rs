use clap::Parser;
use differ::driver;
use std::path::PathBuf;
use std::process::ExitCode;

/// Source-to-source symbolic differentiator: for each input file, emits a
/// sibling `d_<name>` file containing the derivative of every function with
/// respect to each of its parameters.
#[derive(Parser, Debug)]
#[command(name = "differ")]
#[command(version)]
#[command(about = "Source-to-source symbolic differentiator for a restricted C-like language")]
struct CliArgs {
    /// Source files to differentiate.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let code = driver::run(&args.paths);
    ExitCode::from(code as u8)
}
