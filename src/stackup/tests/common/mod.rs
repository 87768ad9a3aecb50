//! Shared fixtures: a scripted command runner and project-root helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use stackup::{BootstrapError, CommandOutput, CommandRunner, CommandSpec, ProjectRoot, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Effect = Arc<dyn Fn() + Send + Sync>;

struct Scripted {
    output: CommandOutput,
    effect: Option<Effect>,
}

/// In-memory `CommandRunner`.
///
/// Commands are matched by their rendered command line: an exact match wins,
/// otherwise the longest scripted prefix. Unscripted commands of known tools
/// succeed with empty output; unknown tools fail with `MissingTool`.
#[derive(Default)]
pub struct FakeRunner {
    tools: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: &[&str]) -> Self {
        let runner = Self::new();
        for tool in tools {
            runner.add_tool(tool);
        }
        runner
    }

    pub fn add_tool(&self, tool: &str) {
        self.tools.lock().unwrap().insert(tool.to_string());
    }

    pub fn respond(&self, command: &str, exit_code: i32, stdout: &str) {
        self.script(command, exit_code, stdout, "", None);
    }

    pub fn fail(&self, command: &str, stderr: &str) {
        self.script(command, 1, "", stderr, None);
    }

    /// Succeed and run `effect`, e.g. to create files the real tool would.
    pub fn on_success(&self, command: &str, effect: impl Fn() + Send + Sync + 'static) {
        self.script(command, 0, "", "", Some(Arc::new(effect)));
    }

    fn script(&self, command: &str, exit_code: i32, stdout: &str, stderr: &str, effect: Option<Effect>) {
        self.scripts.lock().unwrap().insert(
            command.to_string(),
            Scripted {
                output: CommandOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                effect,
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    fn knows(&self, program: &str) -> bool {
        if program.contains('/') {
            return Path::new(program).exists();
        }
        self.tools.lock().unwrap().contains(program)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let found = {
            let scripts = self.scripts.lock().unwrap();
            let best = scripts
                .iter()
                .filter(|(key, _)| line.starts_with(key.as_str()))
                .max_by_key(|(key, _)| key.len())
                .map(|(_, s)| (s.output.clone(), s.effect.clone()));
            best
        };

        match found {
            Some((output, effect)) => {
                if let Some(effect) = effect {
                    effect();
                }
                Ok(output)
            }
            None if self.knows(&spec.program) => Ok(CommandOutput::default()),
            None => Err(BootstrapError::missing_tool(&spec.program, "not found on PATH")),
        }
    }

    async fn has_tool(&self, program: &str) -> bool {
        self.knows(program)
    }
}

/// A temporary project root. Keep the `TempDir` alive for the test.
pub fn temp_project() -> (TempDir, ProjectRoot) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let root = ProjectRoot::new(dir.path()).expect("Failed to open project root");
    (dir, root)
}

pub fn write(root: &ProjectRoot, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// A port nothing listens on: bind, read the port, release it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Accept connections in the background until the listener is dropped with
/// the task.
pub async fn open_port() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    (port, handle)
}

/// Minimal HTTP server answering every request with `status`.
pub async fn http_server(status: u16) -> (u16, tokio::task::JoinHandle<()>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (port, handle)
}
