use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_support::split_global_options;

pub mod runs;
pub mod workflows;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let (options, args) = split_global_options(args)?;
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Start => runs::cmd_start(&options, &args[1..]),
        CliVerb::Advance => runs::cmd_advance(&options, &args[1..]),
        CliVerb::Status => runs::cmd_status(&options, &args[1..]),
        CliVerb::Resume => runs::cmd_resume(&options, &args[1..]),
        CliVerb::Runs => runs::cmd_runs(&options, &args[1..]),
        CliVerb::Clear => runs::cmd_clear(&options, &args[1..]),
        CliVerb::Workflows => workflows::cmd_workflows(&options, &args[1..]),
        CliVerb::Coverage => workflows::cmd_coverage(&options, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
