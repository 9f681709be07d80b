//! Shell selection and quoting.
//!
//! Step commands are shell snippets. On Unix they run through
//! `sh -o errexit -c`, on Windows through `cmd.exe /c`.

use std::path::Path;

use shell_quote::QuoteInto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// POSIX sh
    Sh,
    /// Windows Command Prompt
    Cmd,
}

impl Shell {
    pub fn detect() -> Self {
        if cfg!(windows) { Shell::Cmd } else { Shell::Sh }
    }

    /// Program and leading arguments; the command string is appended last.
    pub fn argv(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Sh => ("sh", &["-o", "errexit", "-c"]),
            Shell::Cmd => ("cmd.exe", &["/c"]),
        }
    }

    /// Quote a string so the shell passes it through as a single word.
    pub fn quote(&self, s: &str) -> String {
        match self {
            Shell::Sh => {
                let mut o = vec![];
                shell_quote::Sh::quote_into(s, &mut o);
                String::from_utf8(o).unwrap_or_default()
            }
            Shell::Cmd => {
                if s.contains([' ', '&', '(', ')', '^', '|', '<', '>']) {
                    format!("\"{}\"", s.replace('"', "\"\""))
                } else {
                    s.to_string()
                }
            }
        }
    }

    /// Command that loads a virtualenv activation script into the current shell.
    pub fn source(&self, script: &Path) -> String {
        let script = self.quote(&script.to_string_lossy());
        match self {
            Shell::Sh => format!(". {script}"),
            Shell::Cmd => format!("call {script}"),
        }
    }
}
