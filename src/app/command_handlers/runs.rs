use crate::app::command_support::{
    now_secs, open_controller, render_run, render_run_summary, GlobalOptions,
};
use std::fs;

const PAYLOAD_FILE_FLAG: &str = "--payload-file";

pub fn cmd_start(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let usage = "usage: start <workflow> <discriminator> [--payload-file <path>]";
    let (positional, payload_file) = parse_payload_flag(args, usage)?;
    if positional.len() != 2 {
        return Err(usage.to_string());
    }
    let payload = match payload_file {
        Some(path) => {
            Some(fs::read(&path).map_err(|e| format!("failed to read payload {path}: {e}"))?)
        }
        None => None,
    };

    let controller = open_controller(options)?;
    let run_id = controller
        .start(positional[0], positional[1], payload.as_deref(), now_secs())
        .map_err(|e| e.to_string())?;
    let run = controller.status(&run_id).map_err(|e| e.to_string())?;
    Ok(format!("workflow run started\n{}", render_run(&run)))
}

fn parse_payload_flag<'a>(
    args: &'a [String],
    usage: &str,
) -> Result<(Vec<&'a str>, Option<String>), String> {
    let mut positional = Vec::new();
    let mut payload_file = None;
    let mut i = 0usize;
    while i < args.len() {
        if args[i] == PAYLOAD_FILE_FLAG {
            let path = args
                .get(i + 1)
                .ok_or_else(|| format!("{PAYLOAD_FILE_FLAG} requires a path\n{usage}"))?;
            payload_file = Some(path.clone());
            i += 2;
            continue;
        }
        if args[i].starts_with("--") {
            return Err(format!("unexpected argument `{}`\n{usage}", args[i]));
        }
        positional.push(args[i].as_str());
        i += 1;
    }
    Ok((positional, payload_file))
}

fn single_run_id<'a>(args: &'a [String], verb: &str) -> Result<&'a str, String> {
    match args {
        [run_id] => Ok(run_id.as_str()),
        _ => Err(format!("usage: {verb} <run_id>")),
    }
}

pub fn cmd_advance(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "advance")?;
    let controller = open_controller(options)?;
    let run = controller
        .advance(run_id, now_secs())
        .map_err(|e| e.to_string())?;
    Ok(render_run(&run))
}

pub fn cmd_status(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "status")?;
    let controller = open_controller(options)?;
    let run = controller.status(run_id).map_err(|e| e.to_string())?;
    Ok(render_run(&run))
}

pub fn cmd_resume(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "resume")?;
    let controller = open_controller(options)?;
    let run = controller
        .resume(run_id, now_secs())
        .map_err(|e| e.to_string())?;
    Ok(render_run(&run))
}

pub fn cmd_runs(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    if args.len() > 1 {
        return Err("usage: runs [workflow]".to_string());
    }
    let controller = open_controller(options)?;
    let runs = controller
        .list(args.first().map(String::as_str))
        .map_err(|e| e.to_string())?;
    let mut lines = vec![format!("run_count={}", runs.len())];
    lines.extend(runs.iter().map(render_run_summary));
    Ok(lines.join("\n"))
}

pub fn cmd_clear(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "clear")?;
    let controller = open_controller(options)?;
    let run = controller.clear(run_id).map_err(|e| e.to_string())?;
    Ok(format!(
        "workflow run cleared\nrun_id={}\nstatus={}",
        run.run_id, run.status
    ))
}
