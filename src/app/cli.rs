#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Start,
    Advance,
    Status,
    Resume,
    Runs,
    Clear,
    Workflows,
    Coverage,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "start" => CliVerb::Start,
        "advance" => CliVerb::Advance,
        "status" => CliVerb::Status,
        "resume" => CliVerb::Resume,
        "runs" => CliVerb::Runs,
        "clear" => CliVerb::Clear,
        "workflows" => CliVerb::Workflows,
        "coverage" => CliVerb::Coverage,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Usage: waypoint [--state-root <path>] <command> ...".to_string(),
        String::new(),
        "Commands:".to_string(),
        "  start <workflow> <discriminator> [--payload-file <path>]".to_string(),
        "                                       Start a run or return the live one".to_string(),
        "  advance <run_id>                     Move a run forward by at most one step"
            .to_string(),
        "  status <run_id>                      Show a run without changing it".to_string(),
        "  resume <run_id>                      Relaunch a step that is awaiting input"
            .to_string(),
        "  runs [workflow]                      List runs, optionally for one workflow"
            .to_string(),
        "  clear <run_id>                       Delete a run record".to_string(),
        "  workflows                            List registered workflows".to_string(),
        "  coverage [namespace]                 Print transitions and expected definition names"
            .to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
