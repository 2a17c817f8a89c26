//! Common test utilities for doppler integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never read or
//! write the user's real `~/.doppler.yaml`.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
pub use tempfile::TempDir;

/// A test environment with an isolated home and working directory.
///
/// The `doppler()` method returns a `Command` that sets `HOME` per
/// invocation, making tests parallel-safe.
pub struct TestEnv {
    pub home_dir: TempDir,
    pub work_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            home_dir: TempDir::new().unwrap(),
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the doppler binary running in `work_dir`.
    pub fn doppler(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_doppler"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("HOME", self.home_dir.path());
        cmd.env_remove("DOPPLER_CONFIG_FILE");
        cmd.env_remove("DOPPLER_API_HOST");
        cmd.env_remove("DOPPLER_LOG");
        cmd
    }

    /// A plain `std::process::Command` for the doppler binary, set up like
    /// [`TestEnv::doppler`], for tests that signal a running process.
    pub fn doppler_process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_doppler"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("HOME", self.home_dir.path());
        cmd.env_remove("DOPPLER_CONFIG_FILE");
        cmd.env_remove("DOPPLER_API_HOST");
        cmd.env_remove("DOPPLER_LOG");
        cmd
    }

    pub fn home(&self) -> &Path {
        self.home_dir.path()
    }

    /// The working directory as a scope argument.
    pub fn work_scope(&self) -> String {
        self.work_dir.path().to_string_lossy().into_owned()
    }

    pub fn config_path(&self) -> PathBuf {
        self.home().join(".doppler.yaml")
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.home().join(".doppler.json")
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.config_path(), content).unwrap();
    }

    pub fn write_legacy(&self, content: &str) {
        fs::write(self.legacy_path(), content).unwrap();
    }

    pub fn read_config(&self) -> String {
        fs::read_to_string(self.config_path()).unwrap_or_default()
    }

    /// Parse the stored document as YAML.
    pub fn config_yaml(&self) -> serde_yaml::Value {
        let content = self.read_config();
        if content.trim().is_empty() {
            return serde_yaml::Value::Mapping(Default::default());
        }
        serde_yaml::from_str(&content).unwrap()
    }
}

/// Whether `pid` names a running process. Zombies count as gone.
pub fn process_alive(pid: i32) -> bool {
    if let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // State is the first field after the parenthesised command name
        return match stat.rsplit_once(')') {
            Some((_, rest)) => !rest.trim_start().starts_with('Z'),
            None => true,
        };
    }
    if Path::new("/proc/self").exists() {
        return false;
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Poll `condition` every 20ms for up to `timeout`.
pub fn wait_until(timeout: std::time::Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    condition()
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A one-shot HTTP server standing in for the Doppler API.
pub struct MockApi {
    pub host: String,
    requests: mpsc::Receiver<Vec<String>>,
}

impl MockApi {
    /// Serve a single canned response with the given status line and body.
    pub fn serve_once(status: &str, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                lines.push(line.trim_end().to_string());
            }
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(lines);
        });
        Self {
            host: format!("http://{}", addr),
            requests: rx,
        }
    }

    /// Request line and headers of the request that was served.
    pub fn request(&self) -> Vec<String> {
        self.requests
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
    }
}
