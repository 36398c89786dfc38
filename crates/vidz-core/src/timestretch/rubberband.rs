//! External `rubberband` command-line backend
//!
//! Runs `rubberband -q -t <1/ratio> <in> <out>` as a child process. The
//! worker polls the child so an interrupt request can kill it. Stderr is
//! drained on a helper thread so a chatty tool never blocks on a full pipe;
//! only its tail is kept for the error message.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{StretchBackend, StretchError};

const PROGRAM_NAME: &str = "rubberband";

/// Child process poll interval (also the cancellation checkpoint)
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bytes of stderr kept for error reports
const STDERR_TAIL: usize = 4096;

/// Handle to the rubberband executable
#[derive(Debug, Clone)]
pub struct RubberbandCli {
    program: PathBuf,
}

impl RubberbandCli {
    /// Find `rubberband` on PATH
    pub fn locate() -> Option<Self> {
        let path = std::env::var_os("PATH")?;
        find_in_dirs(std::env::split_paths(&path), PROGRAM_NAME).map(|program| Self { program })
    }

    /// Use an explicit binary. Returns `None` if it doesn't exist.
    pub fn with_program(program: PathBuf) -> Option<Self> {
        program.is_file().then_some(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Search directories for an executable, in order
fn find_in_dirs<I>(dirs: I, name: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter().find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = dir.join(format!("{}.exe", name));
        exe.is_file().then_some(exe)
    })
}

impl StretchBackend for RubberbandCli {
    fn name(&self) -> &'static str {
        "rubberband"
    }

    fn render(
        &self,
        input: &Path,
        ratio: f64,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<(), StretchError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(StretchError::InvalidRatio(ratio));
        }

        let mut child = Command::new(&self.program)
            .arg("-q")
            .arg("-t")
            .arg(format!("{:.6}", 1.0 / ratio))
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(StretchError::Spawn)?;

        let stderr = child.stderr.take().map(|pipe| {
            std::thread::Builder::new()
                .name("vidz-rubberband-stderr".to_string())
                .spawn(move || read_tail(pipe, STDERR_TAIL))
        });
        let stderr = match stderr.transpose() {
            Ok(stderr) => stderr,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StretchError::Spawn(e));
            }
        };

        let status = loop {
            if cancel.load(Ordering::Relaxed) {
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(output);
                // Not joined: grandchildren may still hold the pipe open
                return Err(StretchError::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        if status.success() {
            return Ok(());
        }

        let stderr = stderr
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let _ = std::fs::remove_file(output);
        Err(StretchError::ToolFailed {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Read `reader` to the end, keeping the last `limit` bytes
fn read_tail(mut reader: impl Read, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    tail.drain(..tail.len() - limit);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let empty = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rubberband"), b"#!/bin/sh\n").unwrap();

        let found = find_in_dirs(
            vec![empty.path().to_path_buf(), dir.path().to_path_buf()],
            "rubberband",
        );
        assert_eq!(found, Some(dir.path().join("rubberband")));
        assert_eq!(find_in_dirs(vec![empty.path().to_path_buf()], "rubberband"), None);
    }

    #[test]
    fn test_missing_program() {
        assert!(RubberbandCli::with_program(PathBuf::from("/nonexistent/rubberband")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("rubberband");
        std::fs::write(&script, "#!/bin/sh\necho 'bad input' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = RubberbandCli::with_program(script).unwrap();
        let result = cli.render(
            &dir.path().join("in.wav"),
            1.2,
            &dir.path().join("out.wav"),
            &AtomicBool::new(false),
        );
        match result {
            Err(StretchError::ToolFailed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("rubberband");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = RubberbandCli::with_program(script).unwrap();
        let started = std::time::Instant::now();
        let result = cli.render(
            &dir.path().join("in.wav"),
            1.2,
            &dir.path().join("out.wav"),
            &AtomicBool::new(true),
        );
        assert!(matches!(result, Err(StretchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_read_tail_keeps_the_end() {
        let text = "x".repeat(10_000) + "last words";
        assert_eq!(read_tail(text.as_bytes(), 10), "last words");
        assert_eq!(read_tail("short".as_bytes(), 10), "short");
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_tool_does_not_block() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("rubberband");
        // Far more than a pipe buffer of diagnostics before exiting
        std::fs::write(
            &script,
            "#!/bin/sh\nyes 'warning: block' | head -n 50000 >&2\necho 'bad input' >&2\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = RubberbandCli::with_program(script).unwrap();
        let started = std::time::Instant::now();
        let result = cli.render(
            &dir.path().join("in.wav"),
            1.2,
            &dir.path().join("out.wav"),
            &AtomicBool::new(false),
        );
        assert!(started.elapsed() < Duration::from_secs(10));
        match result {
            Err(StretchError::ToolFailed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.ends_with("bad input"));
                assert!(stderr.len() <= STDERR_TAIL);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_ratio() {
        let cli = RubberbandCli {
            program: PathBuf::from("rubberband"),
        };
        let result = cli.render(
            Path::new("in.wav"),
            0.0,
            Path::new("out.wav"),
            &AtomicBool::new(false),
        );
        assert!(matches!(result, Err(StretchError::InvalidRatio(_))));
    }
}
