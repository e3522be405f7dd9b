use super::{
    CellSource, LocationSource, Measurement, MessageTransport, ProbeBackends,
    types::{CommandReply, LatencyOut, MeasureRequest, RateOut, SendReply, SendRequest},
};
use crate::{
    config::Config,
    correlation::DeliveryEvent,
    probe::{Location, ProbeFailure, ProbeName, ProbeValue},
    radio::RadioCellRecord,
};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Output, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandRunner {
    env: BTreeMap<String, String>,
    timeout: Duration,
    keep_stderr: bool,
}

impl CommandRunner {
    pub fn new(cfg: &Config) -> Self {
        Self {
            env: cfg.collaborators.env.clone(),
            timeout: cfg.collaborators.timeout(),
            keep_stderr: cfg.debug.keep_collaborator_stderr,
        }
    }

    fn command(&self, argv: &[String], what: &str) -> Result<Command> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ProbeFailure::Unavailable(format!("no command configured for {what}")).into());
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        Ok(cmd)
    }

    pub fn run_json<I: Serialize, O: DeserializeOwned>(
        &self,
        argv: &[String],
        what: &str,
        input: &I,
    ) -> Result<O> {
        let mut cmd = self.command(argv, what)?;
        debug!("collaborator run {what} argv={argv:?} timeout={:?}", self.timeout);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {what} collaborator: {}", argv[0]))?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
            let bytes = serde_json::to_vec(input)?;
            stdin.write_all(&bytes)?;
            stdin.flush().ok();
        }

        let output = wait_with_timeout(&mut child, self.timeout)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{what} collaborator exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        if self.keep_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{what} stderr: {}", stderr.trim());
        }

        let out: O = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing {what} collaborator JSON output"))?;
        Ok(out)
    }

    fn call<T: DeserializeOwned>(&self, argv: &[String], what: &str) -> Result<T> {
        let req = MeasureRequest {
            probe: what.to_string(),
            timeout_seconds: self.timeout.as_secs(),
        };
        let reply: CommandReply<T> = self.run_json(argv, what, &req)?;
        reply.into_result(what)
    }
}

pub struct CommandLocation {
    runner: Arc<CommandRunner>,
    argv: Vec<String>,
}

impl LocationSource for CommandLocation {
    fn read(&self) -> Result<Location> {
        self.runner.call(&self.argv, "location")
    }
}

pub struct CommandCell {
    runner: Arc<CommandRunner>,
    argv: Vec<String>,
}

impl CellSource for CommandCell {
    fn read(&self) -> Result<RadioCellRecord> {
        self.runner.call(&self.argv, "cell")
    }
}

pub struct CommandMeasurement {
    runner: Arc<CommandRunner>,
    argv: Vec<String>,
    probe: ProbeName,
}

impl Measurement for CommandMeasurement {
    fn run(&self) -> Result<ProbeValue> {
        let what = self.probe.label();
        match self.probe {
            ProbeName::Download | ProbeName::Upload => {
                let out: RateOut = self.runner.call(&self.argv, what)?;
                Ok(ProbeValue::Throughput { kbps: out.kbps })
            }
            _ => {
                let out: LatencyOut = self.runner.call(&self.argv, what)?;
                Ok(ProbeValue::Latency { millis: out.millis })
            }
        }
    }
}

pub struct CommandTransport {
    runner: Arc<CommandRunner>,
    argv: Vec<String>,
}

impl MessageTransport for CommandTransport {
    fn send(&self, payload: &str) -> Result<String> {
        let req = SendRequest {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            payload: payload.to_string(),
        };
        let reply: CommandReply<SendReply> = self.runner.run_json(&self.argv, "message send", &req)?;
        let reply = reply.into_result("message send")?;
        Ok(reply.correlation_id.unwrap_or(req.correlation_id))
    }
}

/// Long-running watch program feeding the completion channel. The child is
/// killed on drop.
pub struct DeliveryWatch {
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl Drop for DeliveryWatch {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

pub fn spawn_delivery_watch(
    runner: &CommandRunner,
    argv: &[String],
    tx: Sender<DeliveryEvent>,
) -> Result<DeliveryWatch> {
    let mut cmd = runner.command(argv, "message watch")?;
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning message watch: {}", argv[0]))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

    let reader = std::thread::Builder::new()
        .name("delivery-watch".into())
        .spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("delivery watch read failed: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DeliveryEvent>(&line) {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("ignoring malformed delivery event {line:?}: {e}"),
                }
            }
            debug!("delivery watch stream closed");
        })
        .with_context(|| "spawning delivery watch reader")?;

    Ok(DeliveryWatch {
        child,
        reader: Some(reader),
    })
}

/// Builds every collaborator from `[collaborators]`. The watch handle, if any,
/// must outlive the session.
pub fn backends_from_config(
    cfg: &Config,
) -> Result<(ProbeBackends, Receiver<DeliveryEvent>, Option<DeliveryWatch>)> {
    let runner = Arc::new(CommandRunner::new(cfg));
    let c = &cfg.collaborators;
    let measure = |argv: &Vec<String>, probe| -> Arc<dyn Measurement> {
        Arc::new(CommandMeasurement {
            runner: runner.clone(),
            argv: argv.clone(),
            probe,
        })
    };

    let backends = ProbeBackends {
        location: Arc::new(CommandLocation {
            runner: runner.clone(),
            argv: c.location.clone(),
        }),
        cell: Arc::new(CommandCell {
            runner: runner.clone(),
            argv: c.cell.clone(),
        }),
        download: measure(&c.download, ProbeName::Download),
        upload: measure(&c.upload, ProbeName::Upload),
        ping: measure(&c.ping, ProbeName::Ping),
        dns: measure(&c.dns, ProbeName::Dns),
        transport: Arc::new(CommandTransport {
            runner: runner.clone(),
            argv: c.message_send.clone(),
        }),
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let watch = if c.message_watch.is_empty() {
        None
    } else {
        Some(spawn_delivery_watch(&runner, &c.message_watch, tx)?)
    };
    Ok((backends, rx, watch))
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty collaborator can't block on a full
    // stdout/stderr buffer. Readers are never joined: a grandchild holding a
    // pipe open would otherwise stall us past the timeout.
    let stdout_rx = drain(child.stdout.take(), "stdout");
    let stderr_rx = drain(child.stderr.take(), "stderr");

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = collect(&stdout_rx, deadline, timeout)?;
            let stderr = collect(&stderr_rx, deadline, timeout)?;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if Instant::now() >= deadline {
            warn!("collaborator timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            return Err(ProbeFailure::Transport(format!("timed out after {timeout:?}")).into());
        }

        std::thread::sleep(Duration::from_millis(20));
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>, what: &'static str) -> Receiver<Result<Vec<u8>>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let res = match reader {
            Some(mut r) => r
                .read_to_end(&mut buf)
                .map(|_| buf)
                .with_context(|| format!("read {what}")),
            None => Ok(buf),
        };
        let _ = tx.send(res);
    });
    rx
}

/// Waits for a reader until `deadline`, allowing a short tail for output
/// already in flight when the child exited.
fn collect(rx: &Receiver<Result<Vec<u8>>>, deadline: Instant, timeout: Duration) -> Result<Vec<u8>> {
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(100));
    match rx.recv_timeout(wait) {
        Ok(res) => res,
        Err(RecvTimeoutError::Timeout) => Err(ProbeFailure::Transport(format!(
            "output still open after {timeout:?}"
        ))
        .into()),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_collaborator_is_unavailable() {
        let cfg = Config::default();
        let (backends, _rx, watch) = backends_from_config(&cfg).unwrap();
        assert!(watch.is_none());
        let err = backends.download.run().unwrap_err();
        assert!(matches!(
            ProbeFailure::from_error(&err),
            ProbeFailure::Unavailable(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn reads_json_reply_from_program() {
        let mut cfg = Config::default();
        cfg.collaborators.ping = vec![
            "sh".into(),
            "-c".into(),
            r#"cat >/dev/null; echo '{"value":{"millis":12.5}}'"#.into(),
        ];
        let (backends, _rx, _watch) = backends_from_config(&cfg).unwrap();
        assert_eq!(
            backends.ping.run().unwrap(),
            ProbeValue::Latency { millis: 12.5 }
        );
    }

    #[cfg(unix)]
    #[test]
    fn reply_error_maps_to_transport_failure() {
        let mut cfg = Config::default();
        cfg.collaborators.dns = vec![
            "sh".into(),
            "-c".into(),
            r#"cat >/dev/null; echo '{"error":"NXDOMAIN"}'"#.into(),
        ];
        let (backends, _rx, _watch) = backends_from_config(&cfg).unwrap();
        let err = backends.dns.run().unwrap_err();
        assert_eq!(
            ProbeFailure::from_error(&err),
            ProbeFailure::Transport("NXDOMAIN".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn timeout_holds_when_grandchild_keeps_pipe_open() {
        let mut cfg = Config::default();
        cfg.collaborators.timeout_seconds = 1;
        cfg.collaborators.ping = vec![
            "sh".into(),
            "-c".into(),
            r#"cat >/dev/null; sleep 6; echo '{"value":{"millis":1.0}}'"#.into(),
        ];
        let (backends, _rx, _watch) = backends_from_config(&cfg).unwrap();
        let started = Instant::now();
        let err = backends.ping.run().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert!(matches!(
            ProbeFailure::from_error(&err),
            ProbeFailure::Transport(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn delivery_watch_forwards_valid_lines_only() {
        let runner = CommandRunner::new(&Config::default());
        let argv: Vec<String> = vec![
            "sh".into(),
            "-c".into(),
            r#"printf '{"correlation_id":"m-1","delivered":true}\n\nnot json\n'"#.into(),
        ];
        let (tx, rx) = crossbeam_channel::unbounded();
        let _watch = spawn_delivery_watch(&runner, &argv, tx).unwrap();

        let ev = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            ev,
            DeliveryEvent {
                correlation_id: "m-1".into(),
                delivered: true,
                reason: None,
            }
        );
        // The reader drops its sender once the program closes stdout.
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
