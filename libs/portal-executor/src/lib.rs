//! Constrained invocation of the external container tool.
//!
//! Every container lifecycle operation the portal performs flows through
//! [`CliExecutor::execute`]: the request names an abstract [`CommandIntent`],
//! the whitelist decides admissibility and argument shape, the rate limiter
//! admits or rejects, and only then is exactly one child process spawned
//! with a fixed argv prefix. No shell is ever involved and no user string
//! ever becomes the program name.
//!
//! The pipeline is `validate → admit → spawn → wait/stream → audit`; see
//! [`executor`] for the orchestration and the individual modules for each
//! stage.

pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod process;
pub mod rate_limit;
pub mod validator;
pub mod whitelist;

pub use audit::{AuditRecord, AuditSink, AuditSeverity, AuditEventType, TracingAuditSink};
pub use config::ExecutorConfig;
pub use error::{ExecError, ExecErrorKind, ValidationCode, ValidationFinding};
pub use executor::{CliExecutor, ExecRequest, ExecResult};
pub use process::{ProcessHandle, SpawnError, start_process};
pub use rate_limit::{
    LimiterKind, RateLimitConfig, RateLimitExceeded, RateLimitStatus, RateLimiter,
};
pub use whitelist::{CommandIntent, Whitelist, WhitelistEntry};
