//! Process Launcher
//!
//! Turns a string of user-supplied source code into a running interpreter
//! process whose interactive-input primitive has been redirected into the
//! Marker Protocol.
//!
//! The launcher wraps the user code with a bootstrap preamble executed in
//! the same interpreter instance, ahead of the user code. The preamble
//! line-buffers stdout (so the pump observes output as it is produced) and
//! rebinds the interpreter's `input` builtin to write one marker line,
//! flush, and then block on a readline from the process's own stdin.
//!
//! Stdout and stderr are merged into one pipe at spawn time, so relative
//! ordering between normal output and error output is exactly what the
//! child produced — including interpreter startup errors such as syntax
//! errors in the submitted code.

use log::debug;
use std::io;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, Command};

use crate::config::BridgeConfig;
use crate::protocol::STDIN_MARKER;

/// A freshly spawned interpreter run. Ownership transfers to the session
/// immediately; the launcher does not manage process lifetime.
#[derive(Debug)]
pub struct LaunchedProcess {
    /// The child process handle.
    pub child: Child,
    /// Writable end of the child's stdin.
    pub stdin: ChildStdin,
    /// Read end of the combined stdout/stderr pipe. Blocking; the output
    /// pump is its sole reader.
    pub output: os_pipe::PipeReader,
    /// OS process id, if the platform reports one.
    pub pid: Option<u32>,
}

/// Build the bootstrap program: preamble plus the user code, which is
/// normalized to end with exactly one trailing newline.
pub fn bootstrap(code: &str) -> String {
    let user_code = code.trim_end_matches('\n');

    // The marker line keeps its '\n' so a line-oriented reader returns it.
    format!(
        concat!(
            "import sys, builtins\n",
            "sys.stdout.reconfigure(line_buffering=True)\n",
            "MARKER={marker:?}\n",
            "def _photon_input(prompt=''):\n",
            "    sys.stdout.write(MARKER + str(prompt) + ' ')\n",
            "    sys.stdout.write('\\n')\n",
            "    sys.stdout.flush()\n",
            "    line = sys.stdin.readline()\n",
            "    if not line:\n",
            "        return ''\n",
            "    return line.rstrip('\\n')\n",
            "builtins.input = _photon_input\n",
            "{code}\n",
        ),
        marker = STDIN_MARKER,
        code = user_code,
    )
}

/// Spawn a fresh interpreter running `code` with the bootstrap applied.
///
/// Returns the live process with its stdin pipe and the single combined
/// output pipe. Any spawn failure (missing interpreter, exhausted process
/// table) is returned to the caller; no process is left behind.
pub fn spawn_interpreter(config: &BridgeConfig, code: &str) -> io::Result<LaunchedProcess> {
    let program = bootstrap(code);

    let (reader, writer) = os_pipe::pipe()?;
    let stderr_writer = writer.try_clone()?;

    let mut child = Command::new(&config.interpreter)
        .arg("-u")
        .arg("-c")
        .arg(program)
        .stdin(Stdio::piped())
        .stdout(writer)
        .stderr(stderr_writer)
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child.stdin.take().ok_or_else(|| {
        io::Error::new(io::ErrorKind::BrokenPipe, "child stdin pipe was not captured")
    })?;
    let pid = child.id();

    debug!(
        "Spawned interpreter {} (pid {:?})",
        config.interpreter, pid
    );

    Ok(LaunchedProcess {
        child,
        stdin,
        output: reader,
        pid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_embeds_marker() {
        let program = bootstrap("print('hi')");
        assert!(program.contains(&format!("MARKER={:?}", STDIN_MARKER)));
        assert!(program.contains("builtins.input = _photon_input"));
    }

    #[test]
    fn test_bootstrap_normalizes_trailing_newline() {
        let program = bootstrap("print('hi')");
        assert!(program.ends_with("print('hi')\n"));

        let program = bootstrap("print('hi')\n\n\n");
        assert!(program.ends_with("print('hi')\n"));
        assert!(!program.ends_with("print('hi')\n\n"));
    }

    #[test]
    fn test_bootstrap_runs_user_code_after_preamble() {
        let program = bootstrap("x = 1");
        let preamble_end = program.find("builtins.input = _photon_input").unwrap();
        let user_start = program.find("x = 1").unwrap();
        assert!(user_start > preamble_end);
    }

    #[tokio::test]
    async fn test_spawn_missing_interpreter_fails() {
        let config = BridgeConfig {
            interpreter: "definitely-not-an-interpreter-7f3a".to_string(),
            ..BridgeConfig::default()
        };
        assert!(spawn_interpreter(&config, "print('hi')").is_err());
    }
}
