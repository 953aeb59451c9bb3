//! Stage executable abstraction
//!
//! Every external tool the pipeline touches (the native build, the
//! synthesis and driver-correction binaries, sox, amixer, aplay) is run
//! through [`StageExecutable`], so tests can substitute a deterministic
//! stand-in for real processes.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::debug;
use serde::{Deserialize, Serialize};

/// A fully resolved command: program, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Final path component of the program, e.g. `revolve` for `./build/revolve`
    pub fn program_name(&self) -> &str {
        self.program
            .rsplit(std::path::MAIN_SEPARATOR)
            .next()
            .unwrap_or(&self.program)
    }
}

impl fmt::Display for CommandLine {
    /// Shell-like rendering for logs and error reports
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cwd) = &self.cwd {
            write!(f, "(cd {}; ", quote(&cwd.to_string_lossy()))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        if self.cwd.is_some() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=,:+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Exit status of a finished process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    code: Option<i32>,
}

impl ProcessExit {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Terminated without an exit code (killed by a signal)
    pub fn signalled() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Capability to run one command to completion.
///
/// `Err` means the process could not be launched at all; a launched process
/// always yields `Ok` with its exit status, successful or not.
pub trait StageExecutable {
    fn execute(&mut self, command: &CommandLine) -> std::io::Result<ProcessExit>;
}

impl<E: StageExecutable + ?Sized> StageExecutable for &mut E {
    fn execute(&mut self, command: &CommandLine) -> std::io::Result<ProcessExit> {
        (**self).execute(command)
    }
}

/// Runs commands as real child processes, blocking until each exits.
///
/// Output streams are inherited so the tools' own diagnostics reach the
/// operator's terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutable;

impl StageExecutable for SystemExecutable {
    fn execute(&mut self, command: &CommandLine) -> std::io::Result<ProcessExit> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &command.cwd {
            process.current_dir(cwd);
        }

        debug!("spawning {}", command);
        let status = process.status()?;
        Ok(status.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_only_when_needed() {
        let command = CommandLine::new("amixer")
            .args(["--card", "3", "cset"])
            .arg("numid=3,iface=MIXER,name='UMC1820 Output Playback Volume'");

        assert_eq!(
            command.to_string(),
            r"amixer --card 3 cset 'numid=3,iface=MIXER,name='\''UMC1820 Output Playback Volume'\'''"
        );
    }

    #[test]
    fn test_display_with_working_directory() {
        let command = CommandLine::new("make").arg("-j8").current_dir("build");
        assert_eq!(command.to_string(), "(cd build; make -j8)");
    }

    #[test]
    fn test_program_name() {
        let command = CommandLine::new(format!(
            "build{}revolve",
            std::path::MAIN_SEPARATOR
        ));
        assert_eq!(command.program_name(), "revolve");
        assert_eq!(CommandLine::new("sox").program_name(), "sox");
    }

    #[test]
    fn test_process_exit() {
        assert!(ProcessExit::success().is_success());
        assert!(!ProcessExit::from_code(2).is_success());
        assert_eq!(ProcessExit::signalled().code(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executable_reports_status() {
        let mut executable = SystemExecutable;

        let ok = executable.execute(&CommandLine::new("true")).unwrap();
        assert!(ok.is_success());

        let failed = executable.execute(&CommandLine::new("false")).unwrap();
        assert_eq!(failed.code(), Some(1));

        let missing = executable.execute(&CommandLine::new("/nonexistent/upmix-tool"));
        assert!(missing.is_err());
    }
}
