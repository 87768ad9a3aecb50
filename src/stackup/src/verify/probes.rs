//! Probe execution. Every probe yields a tri-state [`Verdict`]; none of them
//! mutate the deployment.
use crate::command::{CommandRunner, CommandSpec};
use crate::poll::{poll_until, tcp_reachable, PollPolicy};
use crate::report::{Probe, Verdict};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct ProbeContext {
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    timeout: Duration,
    /// Network checks are retried under this policy until healthy
    retry: PollPolicy,
}

impl ProbeContext {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            runner,
            http,
            timeout,
            retry: PollPolicy::new(timeout, Duration::ZERO),
        }
    }

    /// Keep retrying HTTP and TCP checks for up to `window`, one attempt per
    /// probe timeout. A zero window checks once.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry = PollPolicy::new(self.timeout, window);
        self
    }

    pub async fn evaluate(&self, probe: &Probe) -> Verdict {
        match probe {
            Probe::Http { url } => self.until_healthy(|| self.http_get(url)).await,
            Probe::Tcp { host, port } => {
                self.until_healthy(|| async move {
                    if tcp_reachable(host, *port, self.timeout).await {
                        Verdict::Healthy(format!("{}:{} accepting connections", host, port))
                    } else {
                        Verdict::Unhealthy(format!("{}:{} not accepting connections", host, port))
                    }
                })
                .await
            }
            Probe::Tool {
                program,
                args,
                expect,
            } => self.tool(program, args, expect.as_deref()).await,
            Probe::File { path } => {
                if path.is_file() {
                    Verdict::Healthy(format!("{} present", path.display()))
                } else {
                    Verdict::Unhealthy(format!("{} not found", path.display()))
                }
            }
            Probe::ContainerHealth { engine } => self.container_health(engine).await,
        }
    }

    /// Re-run `attempt` under the retry policy and keep its last verdict.
    async fn until_healthy<F, Fut>(&self, mut attempt: F) -> Verdict
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Verdict>,
    {
        let last: Mutex<Option<Verdict>> = Mutex::new(None);
        let slot = &last;
        let outcome = poll_until(&self.retry, move || {
            let next = attempt();
            async move {
                let verdict = next.await;
                let healthy = matches!(verdict, Verdict::Healthy(_));
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(verdict);
                }
                healthy
            }
        })
        .await;

        let verdict = last.into_inner().ok().flatten();
        match verdict {
            Some(Verdict::Unhealthy(detail)) if outcome.attempts() > 1 => Verdict::Unhealthy(
                format!("{} (after {} attempts)", detail, outcome.attempts()),
            ),
            Some(verdict) => verdict,
            None => Verdict::Unhealthy(format!("no answer within {:?}", self.timeout)),
        }
    }

    async fn http_get(&self, url: &str) -> Verdict {
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                Verdict::Healthy(format!("{} -> HTTP {}", url, response.status().as_u16()))
            }
            Ok(response) => {
                Verdict::Unhealthy(format!("{} -> HTTP {}", url, response.status().as_u16()))
            }
            Err(e) => Verdict::Unhealthy(format!("{} unreachable: {}", url, e)),
        }
    }

    async fn tool(&self, program: &str, args: &[String], expect: Option<&str>) -> Verdict {
        if !self.runner.has_tool(program).await {
            return Verdict::Unavailable(format!("{} not installed", program));
        }

        let spec = CommandSpec::new(program).args(args.iter().cloned());
        let output = match tokio::time::timeout(self.timeout, self.runner.run(&spec)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Verdict::Unavailable(format!("{} could not run: {}", program, e)),
            Err(_) => {
                return Verdict::Unhealthy(format!(
                    "'{}' did not answer within {:?}",
                    spec, self.timeout
                ))
            }
        };

        let stdout = output.stdout.trim();
        let matched = expect.map_or(true, |needle| stdout.contains(needle));
        if output.success() && matched {
            let first = stdout.lines().next().unwrap_or("ok");
            Verdict::Healthy(first.to_string())
        } else {
            Verdict::Unhealthy(format!(
                "'{}' exit {}: {}",
                spec,
                output.exit_code,
                output.last_line()
            ))
        }
    }

    async fn container_health(&self, engine: &str) -> Verdict {
        if !self.runner.has_tool(engine).await {
            return Verdict::Unavailable(format!("{} not installed", engine));
        }

        let spec = CommandSpec::new(engine).args(["ps", "--format", "{{.Names}}\t{{.Status}}"]);
        let output = match tokio::time::timeout(self.timeout, self.runner.run(&spec)).await {
            Ok(Ok(output)) if output.success() => output,
            Ok(Ok(output)) => {
                return Verdict::Unavailable(format!(
                    "{} daemon unreachable: {}",
                    engine,
                    output.last_line()
                ))
            }
            Ok(Err(e)) => return Verdict::Unavailable(format!("{} could not run: {}", engine, e)),
            Err(_) => {
                return Verdict::Unavailable(format!(
                    "{} did not answer within {:?}",
                    engine, self.timeout
                ))
            }
        };

        let containers = parse_container_listing(&output.stdout);
        let unhealthy: Vec<&str> = containers
            .iter()
            .filter(|(_, status)| status.contains("(unhealthy)"))
            .map(|(name, _)| *name)
            .collect();

        if unhealthy.is_empty() {
            Verdict::Healthy(format!(
                "{} running container(s), none unhealthy",
                containers.len()
            ))
        } else {
            Verdict::Unhealthy(format!("unhealthy: {}", unhealthy.join(", ")))
        }
    }
}

/// `name<TAB>status` lines from `ps --format`.
pub fn parse_container_listing(stdout: &str) -> Vec<(&str, &str)> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| match l.split_once('\t') {
            Some((name, status)) => (name.trim(), status.trim()),
            None => (l.trim(), ""),
        })
        .collect()
}
