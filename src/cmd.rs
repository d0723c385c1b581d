use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const CANCEL_POLL_INTERVAL_MS: u64 = 200;
const STDERR_TAIL_LINES: usize = 20;

pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Prevent console windows from stealing focus on Windows while running tools.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

#[derive(Debug)]
pub enum CommandRunError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    Canceled,
}

#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    /// Last non-empty stderr lines, oldest first.
    pub stderr_tail: Vec<String>,
}

impl StreamedOutput {
    /// Error lines if the tool printed any, otherwise the whole stderr tail.
    pub fn diagnostic(&self) -> String {
        let errors: Vec<&str> = self
            .stderr_tail
            .iter()
            .map(String::as_str)
            .filter(|line| line.starts_with("ERROR"))
            .collect();
        if errors.is_empty() {
            self.stderr_tail.join("\n")
        } else {
            errors.join("\n")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

pub fn kill_child_process_tree(child: &mut Child) {
    #[cfg(windows)]
    {
        let pid = child.id().to_string();
        let _ = command("taskkill").args(["/PID", &pid, "/T", "/F"]).status();
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Kills the process tree on drop unless the child was waited on first.
struct KillOnDrop {
    child: Child,
    armed: bool,
}

impl KillOnDrop {
    fn kill(&mut self) {
        self.armed = false;
        kill_child_process_tree(&mut self.child);
    }

    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.armed = false;
        Ok(status)
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if self.armed {
            kill_child_process_tree(&mut self.child);
        }
    }
}

/// Runs `cmd` to completion, handing every non-empty stdout/stderr line to
/// `on_line` on the calling thread. Lines are split on `\n` and `\r` so
/// carriage-return progress updates arrive one by one.
///
/// `cancel` is polled between lines and at least every 200ms; once set the
/// process tree is killed and `CommandRunError::Canceled` is returned. The
/// process is also killed if `on_line` panics.
pub fn run_streaming(
    cmd: &mut Command,
    cancel: &AtomicBool,
    on_line: &mut dyn FnMut(OutputStream, &str),
) -> Result<StreamedOutput, CommandRunError> {
    use std::io::ErrorKind;

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = KillOnDrop {
        child: cmd.spawn().map_err(CommandRunError::Spawn)?,
        armed: true,
    };

    let stdout = child.child.stdout.take().ok_or_else(|| {
        CommandRunError::Wait(std::io::Error::new(ErrorKind::Other, "stdout pipe missing"))
    })?;
    let stderr = child.child.stderr.take().ok_or_else(|| {
        CommandRunError::Wait(std::io::Error::new(ErrorKind::Other, "stderr pipe missing"))
    })?;

    let (tx, rx) = mpsc::channel::<(OutputStream, String)>();
    let stdout_handle = spawn_line_reader(stdout, OutputStream::Stdout, tx.clone());
    let stderr_handle = spawn_line_reader(stderr, OutputStream::Stderr, tx);

    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        if cancel.load(Ordering::SeqCst) {
            // Readers are left behind: grandchildren may still hold the pipes.
            child.kill();
            return Err(CommandRunError::Canceled);
        }

        match rx.recv_timeout(Duration::from_millis(CANCEL_POLL_INTERVAL_MS)) {
            Ok((stream, line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if stream == OutputStream::Stderr {
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line.trim().to_string());
                }
                on_line(stream, &line);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait().map_err(CommandRunError::Wait)?;
    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    Ok(StreamedOutput {
        status,
        stderr_tail: stderr_tail.into_iter().collect(),
    })
}

fn spawn_line_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        while let Ok(Some(line)) = read_segment(&mut reader, &mut buf) {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    })
}

fn read_segment<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            return Ok(Some(String::from_utf8_lossy(buf).into_owned()));
        }
        if let Some(pos) = available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            buf.extend_from_slice(&available[..pos]);
            reader.consume(pos + 1);
            return Ok(Some(String::from_utf8_lossy(buf).into_owned()));
        }
        let len = available.len();
        buf.extend_from_slice(available);
        reader.consume(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_on_carriage_returns_and_newlines() {
        let data: &[u8] = b"frame=1 time=00:00:01.00\rframe=2 time=00:00:02.00\nlast";
        let mut reader = BufReader::with_capacity(4, data);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        while let Some(line) = read_segment(&mut reader, &mut buf).expect("read") {
            out.push(line);
        }
        assert_eq!(
            out,
            vec![
                "frame=1 time=00:00:01.00".to_string(),
                "frame=2 time=00:00:02.00".to_string(),
                "last".to_string(),
            ]
        );
    }

    #[test]
    fn diagnostic_prefers_error_lines() {
        let output = StreamedOutput {
            status: exit_status_ok(),
            stderr_tail: vec![
                "WARNING: something".to_string(),
                "ERROR: Unsupported URL: https://example.com".to_string(),
            ],
        };
        assert_eq!(output.diagnostic(), "ERROR: Unsupported URL: https://example.com");
    }

    #[cfg(unix)]
    fn exit_status_ok() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }

    #[cfg(windows)]
    fn exit_status_ok() -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }

    #[cfg(unix)]
    #[test]
    fn streams_lines_from_a_real_process() {
        let cancel = AtomicBool::new(false);
        let mut stdout_lines = Vec::new();
        let mut stderr_lines = Vec::new();
        let mut cmd = command("sh");
        cmd.args(["-c", "echo one; echo two; echo oops 1>&2; exit 3"]);
        let output = run_streaming(&mut cmd, &cancel, &mut |stream, line| match stream {
            OutputStream::Stdout => stdout_lines.push(line.to_string()),
            OutputStream::Stderr => stderr_lines.push(line.to_string()),
        })
        .expect("run");
        assert_eq!(stdout_lines, vec!["one", "two"]);
        assert_eq!(stderr_lines, vec!["oops"]);
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.diagnostic(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn cancel_flag_kills_the_process() {
        let cancel = AtomicBool::new(true);
        let mut cmd = command("sh");
        cmd.args(["-c", "exec sleep 30"]);
        let res = run_streaming(&mut cmd, &cancel, &mut |_, _| {});
        assert!(matches!(res, Err(CommandRunError::Canceled)));
    }

    #[cfg(unix)]
    #[test]
    fn panicking_line_handler_kills_the_process() {
        let cancel = AtomicBool::new(false);
        let mut pid: Option<u32> = None;
        let mut cmd = command("sh");
        cmd.args(["-c", "echo $$; exec sleep 30"]);

        let started = std::time::Instant::now();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_streaming(&mut cmd, &cancel, &mut |_, line| {
                pid = line.trim().parse().ok();
                panic!("line handler bug");
            })
        }));
        assert!(outcome.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = pid.expect("pid line").to_string();
        let alive = command("kill")
            .args(["-0", &pid])
            .stderr(Stdio::null())
            .status()
            .expect("kill -0");
        assert!(!alive.success(), "process {pid} outlived the panic");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cancel = AtomicBool::new(false);
        let mut cmd = command("mediafetch-definitely-not-a-real-binary");
        let res = run_streaming(&mut cmd, &cancel, &mut |_, _| {});
        match res {
            Err(CommandRunError::Spawn(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
