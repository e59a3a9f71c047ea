//! Control socket: served by the dsup process that owns the job store (`dsup run`
//! or a foreground `start`/`resume`), and the client the other commands use.
//!
//! Protocol: one request per line (`start <url>`, `pause <id>`, `resume <id>`,
//! `clear`), answered by one line: `ok`, `ok <id>` or `err <message>`.

use anyhow::{Context, Result};
use dsup_core::control::CLEAR_FAILED;
use dsup_core::DownloadManager;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Start(String),
    Pause(String),
    Resume(String),
    Clear,
}

impl ControlRequest {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };
        let need_arg = |what: &str| {
            if arg.is_empty() {
                Err(format!("{verb} needs {what}"))
            } else {
                Ok(arg.to_string())
            }
        };
        match verb {
            "start" => need_arg("a url").map(ControlRequest::Start),
            "pause" => need_arg("a job id").map(ControlRequest::Pause),
            "resume" => need_arg("a job id").map(ControlRequest::Resume),
            "clear" if arg.is_empty() => Ok(ControlRequest::Clear),
            "clear" => Err("clear takes no argument".to_string()),
            "" => Err("empty request".to_string()),
            other => Err(format!("unknown request: {other}")),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            ControlRequest::Start(url) => format!("start {url}\n"),
            ControlRequest::Pause(id) => format!("pause {id}\n"),
            ControlRequest::Resume(id) => format!("resume {id}\n"),
            ControlRequest::Clear => "clear\n".to_string(),
        }
    }
}

/// Carry out one request and build the reply line (without newline).
async fn handle(mgr: &DownloadManager, req: ControlRequest) -> String {
    tracing::debug!(?req, "control request");
    match req {
        ControlRequest::Start(url) => match mgr.start(&url).await {
            Some(id) => format!("ok {id}"),
            None => format!(
                "err {}",
                mgr.last_error().unwrap_or_else(|| "nothing to start".to_string())
            ),
        },
        ControlRequest::Pause(id) => {
            mgr.pause(&id).await;
            "ok".to_string()
        }
        ControlRequest::Resume(id) => {
            mgr.resume(&id).await;
            "ok".to_string()
        }
        ControlRequest::Clear => {
            mgr.clear_all().await;
            match mgr.last_error() {
                Some(e) if e == CLEAR_FAILED => format!("err {e}"),
                _ => "ok".to_string(),
            }
        }
    }
}

async fn serve_connection(mgr: Arc<DownloadManager>, stream: UnixStream) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match ControlRequest::parse(&line) {
            Ok(req) => handle(&mgr, req).await,
            Err(e) => format!("err {e}"),
        };
        if let Err(e) = write.write_all(format!("{reply}\n").as_bytes()).await {
            tracing::debug!("control socket reply: {}", e);
            return;
        }
    }
}

/// Bind `path` and serve requests against `mgr` until the task is aborted.
pub fn spawn_control_listener(
    mgr: Arc<DownloadManager>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    // A stale socket from a crashed run would make bind fail.
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(serve_connection(Arc::clone(&mgr), stream));
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Send one request to a running supervisor and return its reply line.
/// Returns None when no supervisor is listening on `socket_path`.
pub async fn send_request(socket_path: &Path, req: &ControlRequest) -> Result<Option<String>> {
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("connect {}", socket_path.display()));
        }
    };
    let (read, mut write) = stream.into_split();
    write.write_all(req.to_line().as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("supervisor closed the connection without a reply")?;
    Ok(Some(reply))
}

/// Interpret a reply line: the payload after `ok`, or an error.
pub fn parse_reply(reply: &str) -> Result<Option<String>> {
    let reply = reply.trim();
    if reply == "ok" {
        return Ok(None);
    }
    if let Some(rest) = reply.strip_prefix("ok ") {
        return Ok(Some(rest.trim().to_string()));
    }
    match reply.strip_prefix("err ") {
        Some(msg) => anyhow::bail!("{}", msg.trim()),
        None => anyhow::bail!("unexpected reply from supervisor: {reply}"),
    }
}
