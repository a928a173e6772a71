//! External tool process management.
//!
//! Every external program this crate drives (ffprobe, ffmpeg, the transition
//! renderer) is spawned through [`ToolProcess`], which collects its output on
//! background threads and makes sure the child never outlives its handle.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 12;

/// Errors that can occur while running an external tool
#[derive(Debug)]
pub enum ProcessError {
    /// Executable not found on PATH
    NotFound { program: String },
    /// Failed to spawn the process
    SpawnFailed { program: String, source: std::io::Error },
    /// I/O error while waiting on the process
    IoError(std::io::Error),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::NotFound { program } => {
                write!(
                    f,
                    "'{}' not found. Make sure it is installed and on your PATH",
                    program
                )
            }
            ProcessError::SpawnFailed { program, source } => {
                write!(f, "Failed to spawn '{}': {}", program, source)
            }
            ProcessError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::SpawnFailed { source, .. } => Some(source),
            ProcessError::IoError(e) => Some(e),
            ProcessError::NotFound { .. } => None,
        }
    }
}

/// Output of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: Vec<String>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last few stderr lines joined for inclusion in error messages.
    pub fn stderr_tail(&self) -> String {
        let start = self.stderr.len().saturating_sub(STDERR_TAIL_LINES);
        self.stderr[start..].join("\n")
    }
}

/// A running external tool
pub struct ToolProcess {
    /// Short name used as the log prefix
    label: String,
    child: Child,
    stdout_thread: Option<JoinHandle<String>>,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl ToolProcess {
    /// Spawn `program` with `args`, optionally inside `cwd`.
    ///
    /// stdin is closed; stdout is buffered in full and stderr is logged line by
    /// line at debug level.
    pub fn spawn<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: program.to_string(),
                }
            } else {
                ProcessError::SpawnFailed {
                    program: program.to_string(),
                    source: e,
                }
            }
        })?;

        let label = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());

        let stdout_thread = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let stderr_label = label.clone();
        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                // Drain to EOF; a closed pipe would kill the tool with SIGPIPE
                let mut reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf)
                                .trim_end_matches(['\n', '\r'])
                                .to_string();
                            log::debug!("[{}] {}", stderr_label, line);
                            lines.push(line);
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(ToolProcess {
            label,
            child,
            stdout_thread,
            stderr_thread,
        })
    }

    /// Spawn and block until the tool exits.
    pub fn run<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<ToolOutput, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::spawn(program, args, cwd)?.wait_output()
    }

    /// Wait for the process to exit and collect everything it printed.
    pub fn wait_output(mut self) -> Result<ToolOutput, ProcessError> {
        let status = self.child.wait().map_err(ProcessError::IoError)?;
        let stdout = self
            .stdout_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = self
            .stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        log::debug!("[{}] exited with {}", self.label, status);
        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the process.
    ///
    /// Sends SIGINT and gives the tool two seconds to finish before killing it.
    pub fn shutdown(&mut self) -> Result<ExitStatus, ProcessError> {
        #[cfg(unix)]
        {
            unsafe {
                let pid = self.child.id() as i32;
                libc::kill(pid, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        let timeout = Duration::from_secs(2);

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = self.child.kill();
                        return self.child.wait().map_err(ProcessError::IoError);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(ProcessError::IoError(e)),
            }
        }
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if self.is_running() {
            log::warn!("[{}] still running on drop, terminating", self.label);
            let _ = self.shutdown();
        }
    }
}

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup. The chain checks the flag
/// between steps; the foreground tool receives the signal itself.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, stopping after the current step...");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_not_found() {
        let result = ToolProcess::run("definitely-not-a-real-tool-xyz", ["--help"], None);
        match result {
            Err(ProcessError::NotFound { program }) => {
                assert_eq!(program, "definitely-not-a-real-tool-xyz")
            }
            other => panic!("expected NotFound, got {:?}", other.map(|o| o.status)),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_collects_stdout_and_stderr() {
        let output = ToolProcess::run("sh", ["-c", "echo out; echo err 1>&2; exit 3"], None)
            .expect("sh should spawn");
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr, vec!["err".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_stderr_is_drained_to_eof() {
        let script = "printf 'Input #0 from \\377.mp4\\n' >&2; sleep 0.2; \
                      i=0; while [ $i -lt 100 ]; do echo \"frame $i\" >&2; i=$((i+1)); done; \
                      exit 0";
        let output = ToolProcess::run("sh", ["-c", script], None).unwrap();
        assert!(output.success(), "status: {}", output.status);
        assert_eq!(output.stderr.len(), 101);
        assert!(output.stderr[0].starts_with("Input #0 from"));
        assert!(output.stderr[0].contains('\u{FFFD}'));
        assert_eq!(output.stderr[100], "frame 99");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let output = ToolProcess::run("sh", ["-c", "pwd"], Some(dir.path())).unwrap();
        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_terminates_running_child() {
        let mut process = ToolProcess::spawn("sleep", ["30"], None).unwrap();
        assert!(process.is_running());
        let start = Instant::now();
        drop(process);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let lines: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
        #[cfg(unix)]
        let status = {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::from_raw(0)
        };
        #[cfg(windows)]
        let status = {
            use std::os::windows::process::ExitStatusExt;
            ExitStatus::from_raw(0)
        };
        let output = ToolOutput {
            status,
            stdout: String::new(),
            stderr: lines,
        };
        let tail = output.stderr_tail();
        assert!(tail.starts_with("line 8"));
        assert!(tail.ends_with("line 19"));
    }

    #[test]
    fn test_process_error_display() {
        let err = ProcessError::NotFound {
            program: "ffmpeg".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("'ffmpeg' not found"));
        assert!(msg.contains("PATH"));
    }
}
