use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use elmos_core::build::{BuildBackend, LogStream, MakeInvocation, OutputLine, ProcessExit};
use elmos_core::error::BuildError;

/// How long a build gets to exit after SIGTERM before SIGKILL
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Runs `make` as a child process in its own process group.
///
/// One Ctrl-C listener lives as long as the runner, so an interrupt that lands
/// between two invocations of a batch still stops the next one.
pub struct MakeRunner {
    interrupt: watch::Receiver<bool>,
    listener: Option<JoinHandle<()>>,
}

impl MakeRunner {
    /// Must be called inside a tokio runtime
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received");
                let _ = tx.send(true);
            }
        });
        Self {
            interrupt: rx,
            listener: Some(listener),
        }
    }

    #[cfg(test)]
    fn with_interrupt(interrupt: watch::Receiver<bool>) -> Self {
        Self {
            interrupt,
            listener: None,
        }
    }
}

impl Default for MakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MakeRunner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[async_trait]
impl BuildBackend for MakeRunner {
    async fn invoke(
        &self,
        invocation: &MakeInvocation,
        on_line: &(dyn for<'l> Fn(&'l OutputLine) + Send + Sync),
    ) -> Result<ProcessExit, BuildError> {
        let spawn_err = |source: std::io::Error| BuildError::Spawn {
            label: invocation.label.clone(),
            program: invocation.program.clone(),
            source,
        };

        let mut interrupt = self.interrupt.clone();
        if *interrupt.borrow_and_update() {
            return Err(BuildError::Interrupted {
                label: invocation.label.clone(),
            });
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(&invocation.env);

        // New process group so an interrupt can take down make and its children
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let mut child = cmd.spawn().map_err(spawn_err)?;
        let pgid = child.id().map(|pid| pid as i32).unwrap_or(-1);
        tracing::debug!(label = %invocation.label, pid = ?child.id(), "spawned make");

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<OutputLine>();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, LogStream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, LogStream::Stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut output = Vec::new();

        let status = loop {
            tokio::select! {
                Some(line) = line_rx.recv() => {
                    on_line(&line);
                    output.push(line);
                }
                status = child.wait() => break status.map_err(spawn_err)?,
                // A closed channel means no listener; that branch then stays disabled
                Ok(()) = interrupt.changed() => {
                    if !*interrupt.borrow_and_update() {
                        continue;
                    }
                    tracing::warn!(label = %invocation.label, "interrupted, stopping make");
                    kill_group(&mut child, pgid).await;
                    return Err(BuildError::Interrupted {
                        label: invocation.label.clone(),
                    });
                }
            }
        };

        // Readers finish once the pipes close
        while let Some(line) = line_rx.recv().await {
            on_line(&line);
            output.push(line);
        }

        tracing::debug!(label = %invocation.label, code = ?status.code(), "make exited");
        Ok(ProcessExit {
            code: status.code(),
            output,
        })
    }
}

fn spawn_reader<R>(reader: R, stream: LogStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            if tx.send(OutputLine { stream, text }).is_err() {
                break;
            }
        }
    });
}

async fn kill_group(child: &mut Child, pgid: i32) {
    if pgid > 0 {
        #[cfg(unix)]
        unsafe {
            // Try graceful shutdown first
            libc::killpg(pgid, libc::SIGTERM);
        }

        tokio::time::sleep(KILL_GRACE).await;

        if child.try_wait().ok().flatten().is_none() {
            #[cfg(unix)]
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    } else {
        let _ = child.kill().await;
    }
    let _ = child.wait().await;
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    fn sh(script: &str) -> MakeInvocation {
        MakeInvocation {
            label: "test".into(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::from([("ELMOS_TEST_VAR".to_string(), "set".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let seen = Mutex::new(Vec::new());
        let on_line = |line: &OutputLine| seen.lock().unwrap().push(line.text.clone());

        let exit = MakeRunner::new()
            .invoke(&sh("echo out; echo err 1>&2; echo $ELMOS_TEST_VAR; exit 3"), &on_line)
            .await
            .unwrap();

        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        let texts: Vec<_> = exit.output.iter().map(|l| l.text.as_str()).collect();
        assert!(texts.contains(&"out"));
        assert!(texts.contains(&"err"));
        assert!(texts.contains(&"set"));
        assert!(exit
            .output
            .iter()
            .any(|l| l.stream == LogStream::Stderr && l.text == "err"));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_pending_interrupt_skips_next_invocation() {
        let (tx, rx) = watch::channel(false);
        let runner = MakeRunner::with_interrupt(rx);
        tx.send(true).unwrap();

        // Would leave a marker behind if it were spawned
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());

        let err = runner.invoke(&sh(&script), &|_: &OutputLine| {}).await.unwrap_err();
        assert!(matches!(err, BuildError::Interrupted { .. }));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_interrupt_stops_running_make() {
        let (tx, rx) = watch::channel(false);
        let runner = MakeRunner::with_interrupt(rx);

        let invocation = sh("sleep 30");
        let on_line = |_: &OutputLine| {};
        let started = std::time::Instant::now();
        let (result, _) = tokio::join!(
            runner.invoke(&invocation, &on_line),
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                tx.send(true).unwrap();
            }
        );

        assert!(matches!(result, Err(BuildError::Interrupted { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let invocation = MakeInvocation {
            label: "x".into(),
            program: "/nonexistent/elmos-make".into(),
            args: vec![],
            env: BTreeMap::new(),
        };
        let err = MakeRunner::new().invoke(&invocation, &|_: &OutputLine| {}).await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
