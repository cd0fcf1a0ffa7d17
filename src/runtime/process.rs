/// Reports whether `pid` names a live, non-zombie process.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        match read_proc_stat(pid) {
            Some(stat) => !matches!(stat.state, 'Z' | 'X' | 'x'),
            None => false,
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Kernel start time of `pid` in clock ticks since boot, where the platform
/// exposes it. Used to tell a live step process from a reused pid.
pub fn process_start_ticks(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        read_proc_stat(pid).map(|stat| stat.start_ticks)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        None
    }
}

#[cfg(target_os = "linux")]
struct ProcStat {
    state: char,
    start_ticks: u64,
}

#[cfg(target_os = "linux")]
fn read_proc_stat(pid: u32) -> Option<ProcStat> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_proc_stat(&raw)
}

// The command name is parenthesized and may itself contain spaces or parens, so
// fields are counted from the last `)`.
#[cfg(any(target_os = "linux", test))]
fn parse_proc_stat(raw: &str) -> Option<ProcStat> {
    let rest = &raw[raw.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // starttime is field 22 overall; `state` was field 3.
    let start_ticks = fields.nth(18)?.parse().ok()?;
    Some(ProcStat { state, start_ticks })
}

#[cfg(all(test, not(target_os = "linux")))]
struct ProcStat {
    state: char,
    start_ticks: u64,
}
