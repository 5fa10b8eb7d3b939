//! Runs the daemon binary against a throwaway `HOME` and talks to it over
//! its socket.

#![allow(dead_code)]

use cnc_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};
use serde_json::Value;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub struct TestDaemon {
    child: Child,
    socket: PathBuf,
    _home: TempDir,
}

impl TestDaemon {
    /// Starts the daemon with shifts evaluated in UTC and waits until it
    /// accepts connections.
    pub fn start(prefix: &str) -> Self {
        let home = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in("/tmp")
            .expect("temp HOME");
        let socket = home.path().join(".cnc-monitor").join("daemon.sock");
        let child = Command::new(env!("CARGO_BIN_EXE_cnc-monitor-daemon"))
            .env("HOME", home.path())
            .env_remove("CNC_MONITOR_SOCKET")
            .env("CNC_MONITOR_TZ_UTC", "1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn cnc-monitor-daemon");

        let daemon = Self {
            child,
            socket,
            _home: home,
        };
        daemon.wait_until_listening(Duration::from_secs(5));
        daemon
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn wait_until_listening(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if UnixStream::connect(&self.socket).is_ok() {
                return;
            }
            sleep(Duration::from_millis(25));
        }
        panic!("daemon never listened on {}", self.socket.display());
    }

    pub fn call(&self, method: Method, id: &str, params: Option<Value>) -> Response {
        let request = Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: Some(id.to_string()),
            params,
        };
        let mut line = serde_json::to_vec(&request).expect("encode request");
        line.push(b'\n');
        self.send_raw(&line)
    }

    pub fn send_raw(&self, payload: &[u8]) -> Response {
        let mut stream = UnixStream::connect(&self.socket).expect("connect to daemon");
        stream.write_all(payload).expect("write request");
        read_response(&mut stream)
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reads one newline-terminated response.
pub fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buffer.contains(&b'\n') {
        let n = stream.read(&mut chunk).expect("read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let line = buffer.split(|b| *b == b'\n').next().unwrap_or_default();
    serde_json::from_slice(line).expect("response is JSON")
}

pub fn error_code(response: &Response) -> Option<&str> {
    response.error.as_ref().map(|err| err.code.as_str())
}
