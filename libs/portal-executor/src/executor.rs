//! The secure CLI executor: validate → admit → spawn → collect → audit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use portal_security::Role;

use crate::audit::{AuditRecord, AuditSink};
use crate::config::ExecutorConfig;
use crate::error::{ExecError, ExecErrorKind};
use crate::process;
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::validator;
use crate::whitelist::{CommandIntent, Whitelist, WhitelistEntry};

/// One execution request. `intent` plus validated `args` fully determine
/// the child argv; nothing else from the request reaches the command line.
#[derive(Clone, Debug)]
pub struct ExecRequest {
    pub intent: CommandIntent,
    pub args: Vec<String>,
    pub user_id: Uuid,
    pub user_role: Role,
    pub tenant_id: Uuid,
    pub request_id: String,
    pub timeout: Option<Duration>,
    /// Merged atop the minimal base environment.
    pub environment: HashMap<String, String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    /// Ask the tool for machine-readable output.
    pub json_output: bool,
}

impl ExecRequest {
    #[must_use]
    pub fn new(
        intent: CommandIntent,
        user_id: Uuid,
        user_role: Role,
        tenant_id: Uuid,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            intent,
            args: Vec::new(),
            user_id,
            user_role,
            tenant_id,
            request_id: request_id.into(),
            timeout: None,
            environment: HashMap::new(),
            remote_addr: None,
            user_agent: None,
            json_output: false,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result envelope. `success` is the single source of truth; spawn failures
/// and non-zero exits are captured here rather than raised.
#[derive(Clone, Debug, Serialize)]
pub struct ExecResult {
    pub request_id: String,
    pub intent: CommandIntent,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub error_type: Option<ExecErrorKind>,
}

enum Outcome {
    Done {
        stdout: String,
        stderr: String,
        wait: std::io::Result<std::process::ExitStatus>,
    },
    TimedOut,
    Cancelled,
}

/// Orchestrates whitelist validation, rate limiting, process execution and
/// audit logging for every external-tool call.
pub struct CliExecutor {
    config: ExecutorConfig,
    whitelist: Arc<Whitelist>,
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
}

impl CliExecutor {
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        whitelist: Arc<Whitelist>,
        limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            whitelist,
            limiter,
            audit,
        }
    }

    #[must_use]
    pub fn whitelist(&self) -> &Arc<Whitelist> {
        &self.whitelist
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Validate a request without executing it. Returns all findings.
    #[must_use]
    pub fn validate(&self, req: &ExecRequest) -> Vec<crate::ValidationFinding> {
        validator::validate(&self.whitelist, req.intent, &req.args, req.user_role)
    }

    /// Remaining admissions and reset time for `(user, intent)`.
    #[must_use]
    pub fn rate_limit_remaining(
        &self,
        user: Uuid,
        intent: CommandIntent,
    ) -> (u32, DateTime<Utc>) {
        let spec = self
            .whitelist
            .get(intent)
            .map_or_else(Default::default, |e| e.rate);
        self.limiter.remaining(user, intent, spec)
    }

    #[must_use]
    pub fn rate_limit_status(&self, user: Uuid) -> RateLimitStatus {
        self.limiter.status(user)
    }

    /// Execute one whitelisted command to completion.
    ///
    /// # Errors
    /// - [`ExecError::Validation`]: the first finding, before any child
    ///   starts; a validation-failure audit record is written.
    /// - [`ExecError::RateLimited`]: the request was not admitted.
    /// - [`ExecError::Timeout`] / [`ExecError::Cancelled`]: the child was
    ///   killed; a partial execution record is still written.
    ///
    /// Spawn failures and non-zero exits are reported through the returned
    /// envelope (`success == false`), not as errors.
    #[tracing::instrument(skip_all, fields(intent = %req.intent, request_id = %req.request_id))]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        req: ExecRequest,
    ) -> Result<ExecResult, ExecError> {
        let entry = self.admit(&req)?;
        let timeout = self.effective_timeout(&req, &entry);
        let argv = self.build_argv(&req);
        let env = self.build_env(&req);

        let start_time = Utc::now();
        let started = Instant::now();

        let mut handle = match process::start_process(&self.config.program, &argv, &env) {
            Ok(handle) => handle,
            Err(spawn) => {
                let result = self.finish(
                    &req,
                    start_time,
                    started.elapsed(),
                    String::new(),
                    String::new(),
                    None,
                    Some(spawn.to_string()),
                    Some(ExecErrorKind::SpawnFailed),
                );
                return Ok(result);
            }
        };

        let cap = self.config.max_output_bytes;
        let outcome = {
            let stdout = handle.take_stdout();
            let stderr = handle.take_stderr();
            let work = async {
                let out_fut = async {
                    match stdout {
                        Some(pipe) => process::read_capped(pipe, cap).await.0,
                        None => String::new(),
                    }
                };
                let err_fut = async {
                    match stderr {
                        Some(pipe) => process::read_capped(pipe, cap).await.0,
                        None => String::new(),
                    }
                };
                let (out, err, wait) = tokio::join!(out_fut, err_fut, handle.wait());
                (out, err, wait)
            };
            tokio::pin!(work);

            tokio::select! {
                () = cancel.cancelled() => Outcome::Cancelled,
                res = tokio::time::timeout(timeout, &mut work) => match res {
                    Ok((stdout, stderr, wait)) => Outcome::Done { stdout, stderr, wait },
                    Err(_) => Outcome::TimedOut,
                },
            }
        };

        match outcome {
            Outcome::Done {
                stdout,
                stderr,
                wait,
            } => {
                let (exit_code, error, error_type) = match wait {
                    Ok(status) if status.success() => (status.code(), None, None),
                    Ok(status) => (
                        status.code(),
                        Some(format!("command exited with status {status}")),
                        Some(ExecErrorKind::NonZeroExit),
                    ),
                    Err(e) => (
                        None,
                        Some(format!("failed to await child: {e}")),
                        Some(ExecErrorKind::Internal),
                    ),
                };
                Ok(self.finish(
                    &req,
                    start_time,
                    started.elapsed(),
                    stdout,
                    stderr,
                    exit_code,
                    error,
                    error_type,
                ))
            }
            Outcome::TimedOut => {
                handle.kill().await;
                let elapsed = started.elapsed();
                let _ = self.finish(
                    &req,
                    start_time,
                    elapsed,
                    String::new(),
                    String::new(),
                    None,
                    Some(format!("timed out after {elapsed:?}")),
                    Some(ExecErrorKind::Timeout),
                );
                Err(ExecError::Timeout {
                    configured: timeout,
                    elapsed,
                })
            }
            Outcome::Cancelled => {
                handle.kill().await;
                let _ = self.finish(
                    &req,
                    start_time,
                    started.elapsed(),
                    String::new(),
                    String::new(),
                    None,
                    Some("cancelled by caller".to_owned()),
                    Some(ExecErrorKind::Cancelled),
                );
                Err(ExecError::Cancelled)
            }
        }
    }

    /// Streaming variant: stdout lines are forwarded into `tx` as they
    /// arrive, stderr and a capped stdout transcript are still accumulated
    /// into the result. The channel completes when the child exits.
    ///
    /// # Errors
    /// Same contract as [`CliExecutor::execute`].
    #[tracing::instrument(skip_all, fields(intent = %req.intent, request_id = %req.request_id))]
    pub async fn execute_stream(
        &self,
        cancel: &CancellationToken,
        req: ExecRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<ExecResult, ExecError> {
        let entry = self.admit(&req)?;
        let timeout = self.effective_timeout(&req, &entry);
        let argv = self.build_argv(&req);
        let env = self.build_env(&req);

        let start_time = Utc::now();
        let started = Instant::now();

        let mut handle = match process::start_process(&self.config.program, &argv, &env) {
            Ok(handle) => handle,
            Err(spawn) => {
                let result = self.finish(
                    &req,
                    start_time,
                    started.elapsed(),
                    String::new(),
                    String::new(),
                    None,
                    Some(spawn.to_string()),
                    Some(ExecErrorKind::SpawnFailed),
                );
                return Ok(result);
            }
        };

        let cap = self.config.max_output_bytes;
        let forwarder_cancel = CancellationToken::new();
        let forwarder = handle
            .take_stdout()
            .map(|pipe| process::spawn_line_forwarder(pipe, tx, cap, forwarder_cancel.clone()));

        let outcome = {
            let stderr = handle.take_stderr();
            let work = async {
                let err_fut = async {
                    match stderr {
                        Some(pipe) => process::read_capped(pipe, cap).await.0,
                        None => String::new(),
                    }
                };
                let (err, wait) = tokio::join!(err_fut, handle.wait());
                (err, wait)
            };
            tokio::pin!(work);

            tokio::select! {
                () = cancel.cancelled() => Outcome::Cancelled,
                res = tokio::time::timeout(timeout, &mut work) => match res {
                    Ok((stderr, wait)) => Outcome::Done { stdout: String::new(), stderr, wait },
                    Err(_) => Outcome::TimedOut,
                },
            }
        };

        // The forwarder drains until the pipe closes; after kill/exit it
        // finishes on its own, the token is a backstop.
        let collect_stdout = |fwd: Option<tokio::task::JoinHandle<(String, bool)>>| async {
            match fwd {
                Some(task) => task.await.map(|(s, _)| s).unwrap_or_default(),
                None => String::new(),
            }
        };

        match outcome {
            Outcome::Done { stderr, wait, .. } => {
                let stdout = collect_stdout(forwarder).await;
                let (exit_code, error, error_type) = match wait {
                    Ok(status) if status.success() => (status.code(), None, None),
                    Ok(status) => (
                        status.code(),
                        Some(format!("command exited with status {status}")),
                        Some(ExecErrorKind::NonZeroExit),
                    ),
                    Err(e) => (
                        None,
                        Some(format!("failed to await child: {e}")),
                        Some(ExecErrorKind::Internal),
                    ),
                };
                Ok(self.finish(
                    &req, start_time, started.elapsed(), stdout, stderr, exit_code, error,
                    error_type,
                ))
            }
            Outcome::TimedOut => {
                handle.kill().await;
                forwarder_cancel.cancel();
                let stdout = collect_stdout(forwarder).await;
                let elapsed = started.elapsed();
                let _ = self.finish(
                    &req,
                    start_time,
                    elapsed,
                    stdout,
                    String::new(),
                    None,
                    Some(format!("timed out after {elapsed:?}")),
                    Some(ExecErrorKind::Timeout),
                );
                Err(ExecError::Timeout {
                    configured: timeout,
                    elapsed,
                })
            }
            Outcome::Cancelled => {
                handle.kill().await;
                forwarder_cancel.cancel();
                let stdout = collect_stdout(forwarder).await;
                let _ = self.finish(
                    &req,
                    start_time,
                    started.elapsed(),
                    stdout,
                    String::new(),
                    None,
                    Some("cancelled by caller".to_owned()),
                    Some(ExecErrorKind::Cancelled),
                );
                Err(ExecError::Cancelled)
            }
        }
    }

    /// Liveness probe: runs the tool's version command with a short
    /// timeout, bypassing rate limiting and audit.
    ///
    /// # Errors
    /// Returns [`ExecError::Internal`] when the tool cannot be spawned or
    /// exits unsuccessfully.
    pub async fn health(&self) -> Result<(), ExecError> {
        let mut argv = self.config.base_args.clone();
        argv.push("version".to_owned());
        let mut handle = process::start_process(&self.config.program, &argv, &Self::minimal_env())
            .map_err(|e| ExecError::Internal(e.to_string()))?;

        match tokio::time::timeout(Duration::from_secs(5), handle.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ExecError::Internal(format!(
                "health probe exited with {status}"
            ))),
            Ok(Err(e)) => Err(ExecError::Internal(e.to_string())),
            Err(_) => {
                handle.kill().await;
                Err(ExecError::Internal("health probe timed out".to_owned()))
            }
        }
    }

    /// Validation + rate limiting; audits and fails before any child
    /// process exists.
    fn admit(&self, req: &ExecRequest) -> Result<Arc<WhitelistEntry>, ExecError> {
        let mut findings = self.validate(req);
        if !findings.is_empty() {
            self.audit.record(
                AuditRecord::validation_failure(
                    req.user_id,
                    req.tenant_id,
                    req.request_id.clone(),
                    req.intent,
                    &findings,
                )
                .with_client(req.remote_addr.clone(), req.user_agent.clone()),
            );
            return Err(ExecError::Validation(findings.remove(0)));
        }

        let entry = self
            .whitelist
            .get(req.intent)
            .cloned()
            .ok_or_else(|| ExecError::Internal("whitelist entry vanished".to_owned()))?;

        if let Err(detail) = self.limiter.check(req.user_id, req.intent, entry.rate) {
            self.audit.record(
                AuditRecord::rate_limited(
                    req.user_id,
                    req.tenant_id,
                    req.request_id.clone(),
                    req.intent,
                    &detail,
                )
                .with_client(req.remote_addr.clone(), req.user_agent.clone()),
            );
            return Err(ExecError::RateLimited(detail));
        }

        Ok(entry)
    }

    fn effective_timeout(&self, req: &ExecRequest, entry: &WhitelistEntry) -> Duration {
        req.timeout
            .unwrap_or(self.config.default_timeout)
            .min(entry.max_timeout)
            .min(self.config.timeout_ceiling)
    }

    /// Child argv after the program name: base args, intent fragment,
    /// optional format flag, validated request arguments. In that order,
    /// nothing else.
    fn build_argv(&self, req: &ExecRequest) -> Vec<String> {
        let mut argv = self.config.base_args.clone();
        argv.extend(req.intent.argv_prefix().iter().map(|s| (*s).to_owned()));
        if req.json_output {
            argv.push("--format".to_owned());
            argv.push("json".to_owned());
        }
        argv.extend(req.args.iter().cloned());
        argv
    }

    fn build_env(&self, req: &ExecRequest) -> HashMap<String, String> {
        let mut env = Self::minimal_env();
        env.extend(req.environment.clone());
        env
    }

    /// The child sees PATH (so the tool can locate its own helpers) and
    /// nothing else from the parent.
    fn minimal_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_owned(), path);
        }
        env
    }

    /// Build the result envelope and write the execution audit record.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        req: &ExecRequest,
        start_time: DateTime<Utc>,
        duration: Duration,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        error: Option<String>,
        error_type: Option<ExecErrorKind>,
    ) -> ExecResult {
        let success = error_type.is_none() && exit_code == Some(0);
        let result = ExecResult {
            request_id: req.request_id.clone(),
            intent: req.intent,
            start_time,
            end_time: start_time
                + chrono::Duration::from_std(duration).unwrap_or_default(),
            duration,
            success,
            stdout,
            stderr,
            exit_code,
            error,
            error_type,
        };

        self.audit.record(
            AuditRecord::execution(
                req.user_id,
                req.tenant_id,
                req.request_id.clone(),
                req.intent,
                self.audit_args(req),
                result.success,
                result.error.clone(),
                duration,
            )
            .with_client(req.remote_addr.clone(), req.user_agent.clone()),
        );

        result
    }

    /// Arguments as they go to audit: redacted positions are masked.
    fn audit_args(&self, req: &ExecRequest) -> Vec<String> {
        let rules = self
            .whitelist
            .get(req.intent)
            .map(|e| e.arg_rules.clone())
            .unwrap_or_default();
        req.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if rules.get(i).is_some_and(|r| r.redact) {
                    "***".to_owned()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}
