use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use super::model::HtsError;

/// Number of trailing stderr lines kept in an [`HtsError::ExternalTool`].
const STDERR_TAIL_LINES: usize = 20;

/// Where the standard output of a tool goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Left to the runner: [`ProcessRunner`] streams it to the console in
    /// verbose mode and discards it otherwise.
    Capture,
    /// Redirected into a file, truncating it first.
    File(PathBuf),
}

/// A single external program invocation.
///
/// Arguments are kept as a list and handed to the OS as-is, never joined
/// into a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    stdin: Option<PathBuf>,
    stdout: OutputTarget,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: OutputTarget::Capture,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Feed the content of `path` to the program's standard input.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Redirect the program's standard output into `path`.
    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = OutputTarget::File(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments as UTF-8 (lossy), mostly useful for inspection and tests.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Value following the first occurrence of `flag`, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }

    pub fn stdin(&self) -> Option<&Path> {
        self.stdin.as_deref()
    }

    pub fn stdout(&self) -> &OutputTarget {
        &self.stdout
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        if let OutputTarget::File(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Structured result of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// A successful, silent result.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            success: true,
            ..Default::default()
        }
    }

    /// A failed result with the given exit code and stderr text.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
        }
    }
}

/// Executes [`ToolCommand`]s.
///
/// The pipeline only talks to external programs through this trait, which
/// lets tests substitute a fake that fabricates the expected artifacts.
pub trait ToolRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput, HtsError>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for Arc<T> {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput, HtsError> {
        (**self).run(command)
    }
}

impl<T: ToolRunner + ?Sized> ToolRunner for Box<T> {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput, HtsError> {
        (**self).run(command)
    }
}

/// Runs commands as blocking child processes.
///
/// In verbose mode the tool output is inherited from the parent and shows
/// up on the console. Otherwise stdout is discarded and stderr is captured
/// so that it can surface through [`HtsError::ExternalTool`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    verbose: bool,
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Console output, discarded unless verbose.
    fn stdout(&self) -> Stdio {
        if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }

    /// Diagnostics, captured for the error tail unless verbose.
    fn stderr(&self) -> Stdio {
        if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::piped()
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput, HtsError> {
        log::debug!("Running: {command}");

        let stdin = match command.stdin() {
            Some(path) => Stdio::from(File::open(path).map_err(|e| HtsError::fs(path, e))?),
            None => Stdio::null(),
        };
        let stdout = match command.stdout() {
            OutputTarget::Capture => self.stdout(),
            OutputTarget::File(path) => {
                Stdio::from(File::create(path).map_err(|e| HtsError::fs(path, e))?)
            }
        };

        let child = Command::new(command.program())
            .args(command.get_args())
            .stdin(stdin)
            .stdout(stdout)
            .stderr(self.stderr())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    HtsError::ToolNotFound(command.program().to_string())
                } else {
                    HtsError::Io(e)
                }
            })?;

        let output = child.wait_with_output()?;

        Ok(ToolOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run `command` and turn a nonzero exit into [`HtsError::ExternalTool`].
pub fn run_checked(runner: &dyn ToolRunner, command: &ToolCommand) -> Result<ToolOutput, HtsError> {
    let output = runner.run(command)?;
    if !output.success {
        return Err(HtsError::ExternalTool {
            tool: command.program().to_string(),
            code: output.code,
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
