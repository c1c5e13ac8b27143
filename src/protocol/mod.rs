//! Marker Protocol
//!
//! Line-based convention that multiplexes ordinary program output and
//! "the program wants input now" signals over a single byte stream.
//!
//! A child that wants one line of interactive input emits a single line of
//! the form `MARKER + prompt + " "` (newline-terminated) and then blocks on
//! its own stdin. Every other line is ordinary output. The marker string is
//! a reserved namespace chosen to be implausible in real program output; a
//! program that deliberately prints it will be misclassified. That is a
//! documented limitation of the prefix framing, not a bug.

/// Reserved prefix for interactive-input request lines.
pub const STDIN_MARKER: &str = "__PHOTON_STDIN__:";

/// Prompt used when a marker line carries no prompt text of its own.
pub const DEFAULT_PROMPT: &str = "Input:";

/// Classification of one complete output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Ordinary output, forwarded verbatim (trailing newline included).
    Stdout(String),
    /// The child is blocked waiting for one line of input.
    StdinRequest(String),
    /// Interactive-shell prompt artifact; dropped, never forwarded.
    Suppressed,
}

/// Classify one complete line read from the child's combined output stream.
///
/// `line` must be a full line including its trailing `\n` (classification is
/// only defined on complete lines; callers buffer partial reads).
///
/// Lines starting with `>>>` or `...` are suppressed: they are artifacts of
/// an interactive interpreter leaking its own prompts into the stream. The
/// heuristic can falsely suppress legitimate output that happens to start
/// with those tokens.
pub fn classify_line(line: &str) -> OutputLine {
    if let Some(rest) = line.strip_prefix(STDIN_MARKER) {
        // The bootstrap appends a trailing space before the newline; strip
        // both so `input('Name:')` surfaces the prompt as written.
        let prompt = rest.trim_end();
        if prompt.is_empty() {
            OutputLine::StdinRequest(DEFAULT_PROMPT.to_string())
        } else {
            OutputLine::StdinRequest(prompt.to_string())
        }
    } else if line.starts_with(">>>") || line.starts_with("...") {
        OutputLine::Suppressed
    } else {
        OutputLine::Stdout(line.to_string())
    }
}
