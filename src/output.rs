/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// command output stays separate from tracing logs on stderr.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Starting 3 service(s)...")
    fn status(&self, message: &str);

    /// Success message (e.g., "All services started")
    fn success(&self, message: &str);

    /// Warning message
    fn warning(&self, message: &str);

    /// Error message (e.g., "Failed to start 'db'")
    fn error(&self, message: &str);
}

/// Standard CLI output, writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }
}
