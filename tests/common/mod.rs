#![allow(dead_code)]

use std::io::Write;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(10);

/// One status post as seen by the collector.
#[derive(Debug)]
pub struct Posted {
    pub path: String,
    pub uuid: Option<String>,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

/// Stand-in for the status collector: records each POST and answers with a
/// fixed status.
pub struct MockCollector {
    pub port: u16,
    posts: mpsc::UnboundedReceiver<Posted>,
}

impl MockCollector {
    pub async fn start() -> Self {
        Self::start_with_status(200).await
    }

    pub async fn start_with_status(status: u16) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, posts) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(posted) = handle_request(stream, status).await {
                        let _ = tx.send(posted);
                    }
                });
            }
        });
        Self { port, posts }
    }

    pub async fn next_post(&mut self) -> Posted {
        timeout(WAIT, self.posts.recv())
            .await
            .expect("no status posted")
            .expect("collector stopped")
    }

    /// Asserts nothing further arrives within a short grace period.
    pub async fn assert_no_more_posts(&mut self) {
        let extra = timeout(Duration::from_millis(300), self.posts.recv()).await;
        assert!(matches!(extra, Err(_) | Ok(None)), "second status posted: {:?}", extra);
    }

    /// Config file pointing the checker at this collector and at localhost.
    pub fn config_file(&self) -> NamedTempFile {
        config_for_collector(self.port)
    }
}

pub fn config_for_collector(port: u16) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"collector": {{"host": "127.0.0.1", "port": {}, "timeout_ms": 2000}}, "bind_address": "127.0.0.1"}}"#,
        port
    )
    .unwrap();
    file
}

async fn handle_request(mut stream: TcpStream, status: u16) -> Option<Posted> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let path = request_line.split_whitespace().nth(1)?.to_string();

    let mut uuid = None;
    let mut content_type = None;
    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim().to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "uuid" => uuid = Some(value),
            "content-type" => content_type = Some(value),
            "content-length" => content_length = value.parse().ok()?,
            _ => {}
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        status, reason
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    let body = serde_json::from_slice(&body).ok()?;
    Some(Posted { path, uuid, content_type, body })
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

pub fn checker() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_port-checker"));
    cmd.env_remove("RUST_LOG").kill_on_drop(true);
    cmd
}

/// Starts the checker with stdout captured for progress lines.
pub fn spawn_checker(config: &NamedTempFile, args: &[String]) -> (Child, Lines<BufReader<ChildStdout>>) {
    let mut child = checker()
        .arg("--config")
        .arg(config.path())
        .args(args)
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    (child, BufReader::new(stdout).lines())
}

pub async fn wait_for_line(lines: &mut Lines<BufReader<ChildStdout>>, matches: impl Fn(&str) -> bool) -> String {
    timeout(WAIT, async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if matches(&line) {
                return line;
            }
        }
        panic!("checker stdout closed before the expected line");
    })
    .await
    .expect("expected line not logged")
}

pub async fn exit_code(child: &mut Child) -> i32 {
    timeout(WAIT, child.wait())
        .await
        .expect("checker did not exit")
        .unwrap()
        .code()
        .expect("checker killed by signal")
}
