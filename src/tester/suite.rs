//! Test routines run against a ready application.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::tester::error::{Result, TesterError};

/// Lines of test output kept in a failure message.
const FAILURE_TAIL_LINES: usize = 20;

/// A test routine. The lifecycle treats it as a black box.
#[async_trait]
pub trait TestSuite: Send + Sync {
    /// Short description for logs.
    fn name(&self) -> &str;

    /// Run the tests against `base_url`; any failure is a `TestExecution` error.
    async fn execute(&self, base_url: &str) -> Result<()>;
}

/// Runs an external test command, passing it the base URL.
///
/// The URL is exported in `base_url_env` (default `BASE_URL`) and replaces
/// `{base_url}` in the arguments, so a browser test runner can be pointed at
/// the application with e.g. `-Dselenide.baseUrl={base_url}`.
#[derive(Debug, Clone)]
pub struct CommandSuite {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    base_url_env: String,
    timeout: Duration,
    show_output: bool,
}

impl CommandSuite {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            base_url_env: "BASE_URL".to_string(),
            timeout: Duration::from_secs(600),
            show_output: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Environment variable that receives the base URL.
    pub fn with_base_url_env(mut self, name: impl Into<String>) -> Self {
        self.base_url_env = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stream the command's output to the console instead of capturing it.
    pub fn with_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    fn command(&self, base_url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace("{base_url}", base_url)))
            .env(&self.base_url_env, base_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value.replace("{base_url}", base_url));
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl TestSuite for CommandSuite {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(&self, base_url: &str) -> Result<()> {
        let mut cmd = self.command(base_url);
        tracing::info!(
            program = %self.program,
            "Running tests: {} {}",
            self.program,
            self.args.join(" ")
        );

        let (status, output) = if self.show_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            let status = tokio::time::timeout(self.timeout, cmd.status())
                .await
                .map_err(|_| self.timed_out(base_url))?
                .map_err(|e| self.spawn_failed(base_url, e))?;
            (status, String::new())
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            let out = tokio::time::timeout(self.timeout, cmd.output())
                .await
                .map_err(|_| self.timed_out(base_url))?
                .map_err(|e| self.spawn_failed(base_url, e))?;
            (out.status, combine_output(&out.stdout, &out.stderr))
        };

        if status.success() {
            tracing::debug!(program = %self.program, "Tests passed");
            if !output.is_empty() {
                tracing::trace!("Test output:\n{}", output);
            }
            return Ok(());
        }

        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let tail = tail_lines(&output, FAILURE_TAIL_LINES);
        let reason = if tail.is_empty() {
            format!("'{}' exited with {}", self.program, code)
        } else {
            format!("'{}' exited with {}:\n{}", self.program, code, tail)
        };
        Err(TesterError::test_execution(base_url, reason))
    }
}

impl CommandSuite {
    fn timed_out(&self, base_url: &str) -> TesterError {
        TesterError::test_execution(
            base_url,
            format!("'{}' did not finish within {:?}", self.program, self.timeout),
        )
    }

    fn spawn_failed(&self, base_url: &str, e: std::io::Error) -> TesterError {
        TesterError::test_execution(base_url, format!("could not run '{}': {}", self.program, e))
    }
}

/// GETs each path and requires a 2xx answer.
pub struct HttpSmokeSuite {
    paths: Vec<String>,
    client: reqwest::Client,
}

impl HttpSmokeSuite {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let mut paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            paths.push("/".to_string());
        }
        Self { paths, client }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

#[async_trait]
impl TestSuite for HttpSmokeSuite {
    fn name(&self) -> &str {
        "http-smoke"
    }

    async fn execute(&self, base_url: &str) -> Result<()> {
        let mut failures = Vec::new();

        for path in &self.paths {
            let url = format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            );
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(%url, status = %resp.status(), "Smoke check passed");
                }
                Ok(resp) => failures.push(format!("GET {} -> {}", path, resp.status())),
                Err(e) => failures.push(format!("GET {} -> {}", path, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TesterError::test_execution(
                base_url,
                format!(
                    "{} of {} checks failed: {}",
                    failures.len(),
                    self.paths.len(),
                    failures.join("; ")
                ),
            ))
        }
    }
}

/// Wraps an async closure as a suite.
pub struct FnSuite<F> {
    name: String,
    f: F,
}

impl<F> FnSuite<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> TestSuite for FnSuite<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), String>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, base_url: &str) -> Result<()> {
        (self.f)(base_url.to_string())
            .await
            .map_err(|reason| TesterError::test_execution(base_url, reason))
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    if stderr.is_empty() {
        stdout.into_owned()
    } else if stdout.is_empty() {
        stderr.into_owned()
    } else {
        format!("{}\n--- stderr ---\n{}", stdout, stderr)
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::error::FailureKind;

    #[test]
    fn test_tail_lines() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "28\n29\n30");
        assert_eq!(tail_lines("", 3), "");
        assert_eq!(tail_lines("one\n", 3), "one");
    }

    #[test]
    fn test_combine_output() {
        assert_eq!(combine_output(b"out", b""), "out");
        assert_eq!(combine_output(b"", b"err"), "err");
        assert!(combine_output(b"out", b"err").contains("--- stderr ---"));
    }

    #[test]
    fn test_smoke_defaults_to_root() {
        let suite = HttpSmokeSuite::new(Vec::<String>::new());
        assert_eq!(suite.paths(), &["/".to_string()]);
    }

    #[tokio::test]
    async fn test_fn_suite_maps_failure() {
        let suite = FnSuite::new("always-fails", |_url: String| async {
            Err::<(), _>("assertion failed".to_string())
        });

        let err = suite.execute("http://127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TestExecutionFailure);
        assert!(err.to_string().contains("assertion failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_suite_receives_base_url() {
        let suite = CommandSuite::new("sh").with_args([
            "-c",
            "test \"$BASE_URL\" = \"$1\" && test \"$1\" = http://127.0.0.1:9", "sh", "{base_url}",
        ]);

        suite.execute("http://127.0.0.1:9").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_suite_failure_keeps_output_tail() {
        let suite = CommandSuite::new("sh")
            .with_args(["-c", "echo 'Tests run: 4, Failures: 1'; exit 2"])
            .with_base_url_env("SELENIDE_BASE_URL");

        let err = suite.execute("http://127.0.0.1:9").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with 2"), "{msg}");
        assert!(msg.contains("Failures: 1"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_suite_timeout() {
        let suite = CommandSuite::new("sleep")
            .with_args(["5"])
            .with_timeout(Duration::from_millis(100));

        let err = suite.execute("http://127.0.0.1:9").await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_command_suite_missing_program() {
        let suite = CommandSuite::new("definitely-not-a-test-runner-91c2");
        let err = suite.execute("http://127.0.0.1:9").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TestExecutionFailure);
        assert!(err.to_string().contains("could not run"));
    }
}
