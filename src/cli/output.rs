//! Colored terminal output for push runs
//!
//! Banner, progress and summary lines go to stdout and are silenced by
//! `--quiet`; errors always go to stderr.

use std::io::{self, Write};
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            verbose,
            quiet,
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) -> io::Result<()> {
        self.emit(|buffer| marked(buffer, "✓", Color::Green, message, false))
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) -> io::Result<()> {
        self.emit(|buffer| marked(buffer, "⚠", Color::Yellow, message, true))
    }

    /// Print a section header
    pub fn section(&self, title: &str) -> io::Result<()> {
        self.emit(|buffer| {
            writeln!(buffer)?;
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
            writeln!(buffer, "═══ {} ═══", title)?;
            buffer.reset()
        })
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.emit(|buffer| writeln!(buffer, "    {}", message))
    }

    /// Print indented text only with `--verbose`
    pub fn detail(&self, message: &str) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.emit(|buffer| {
            buffer.set_color(ColorSpec::new().set_dimmed(true))?;
            writeln!(buffer, "      {}", message)?;
            buffer.reset()
        })
    }

    /// Print a plain message
    pub fn println(&self, message: &str) -> io::Result<()> {
        self.emit(|buffer| writeln!(buffer, "{}", message))
    }

    /// Print an error message to stderr, regardless of `--quiet`
    pub fn error(&self, message: &str) {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();
        let printed = marked(&mut buffer, "✗", Color::Red, message, true)
            .and_then(|()| stderr.print(&buffer));
        if printed.is_err() {
            // stderr unavailable
            println!("[STDERR ERROR] ✗ {}", message);
        }
    }

    fn emit<F>(&self, render: F) -> io::Result<()>
    where
        F: FnOnce(&mut Buffer) -> io::Result<()>,
    {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        render(&mut buffer)?;
        self.stdout.print(&buffer)
    }
}

/// Write `marker` in bold `color` followed by `message`, optionally tinted too
fn marked(
    buffer: &mut Buffer,
    marker: &str,
    color: Color,
    message: &str,
    tint_message: bool,
) -> io::Result<()> {
    buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(buffer, "{}", marker)?;
    buffer.reset()?;
    if tint_message {
        buffer.set_color(ColorSpec::new().set_fg(Some(color)))?;
    }
    writeln!(buffer, " {}", message)?;
    buffer.reset()
}
