//! Request validation against the whitelist.
//!
//! Findings are collected in rule order; the executor short-circuits on the
//! first one but callers that want the full picture (e.g. the validate
//! endpoint) get every finding.

use portal_security::Role;

use crate::error::{ValidationCode, ValidationFinding};
use crate::whitelist::{CommandIntent, Whitelist, WhitelistEntry};

/// Substrings that must never appear in any argument, regardless of intent.
/// Arguments are handed to the child verbatim, so anything that smells like
/// shell structure, path escape or privileged container flags is rejected
/// outright.
const DANGEROUS_PATTERNS: &[&str] = &[
    "..",
    "~/",
    "/etc/",
    "/proc/",
    "--privileged",
    "--cap-add",
    "--security",
    "${",
    "$(",
    "`",
    ";",
    "&&",
    "||",
    "|",
    "<",
    ">",
    "\n",
    "\r",
];

fn scan_dangerous(arg: &str) -> bool {
    DANGEROUS_PATTERNS.iter().any(|p| arg.contains(p))
}

/// Validate `(intent, args)` for `role` against the whitelist.
///
/// Returns all findings in evaluation order: intent admissibility, role,
/// dangerous patterns, required arguments, forbidden arguments, per-argument
/// regex and length caps. An empty vector means the request is admissible.
#[must_use]
pub fn validate(
    whitelist: &Whitelist,
    intent: CommandIntent,
    args: &[String],
    role: Role,
) -> Vec<ValidationFinding> {
    let Some(entry) = whitelist.get(intent) else {
        return vec![ValidationFinding::new(
            ValidationCode::CommandNotWhitelisted,
            "intent",
            format!("command '{intent}' is not whitelisted"),
        )];
    };

    let mut findings = Vec::new();

    if role < entry.min_role {
        findings.push(ValidationFinding::new(
            ValidationCode::InsufficientPrivileges,
            "intent",
            format!(
                "command '{intent}' requires role '{}' or higher",
                entry.min_role
            ),
        ));
    }

    // Dangerous patterns are scanned on every argument before shape checks;
    // the finding names the position, never the content.
    for (i, arg) in args.iter().enumerate() {
        if scan_dangerous(arg) {
            findings.push(ValidationFinding::new(
                ValidationCode::DangerousPattern,
                arg_field(entry, i),
                "argument contains a forbidden pattern",
            ));
        }
    }

    if args.len() < entry.required_args {
        for i in args.len()..entry.required_args {
            findings.push(ValidationFinding::new(
                ValidationCode::RequiredArgMissing,
                arg_field(entry, i),
                "required argument is missing",
            ));
        }
    }

    for (i, arg) in args.iter().enumerate() {
        if entry.forbidden_args.contains(&arg.as_str()) {
            findings.push(ValidationFinding::new(
                ValidationCode::ForbiddenArgUsed,
                arg_field(entry, i),
                format!("argument '{arg}' is not permitted for '{intent}'"),
            ));
        }
    }

    for (i, arg) in args.iter().enumerate() {
        match entry.arg_rules.get(i) {
            Some(rule) => {
                if arg.len() > rule.max_len {
                    findings.push(ValidationFinding::new(
                        ValidationCode::ValidationError,
                        rule.name,
                        format!("argument exceeds {} characters", rule.max_len),
                    ));
                } else if !rule.pattern.is_match(arg) {
                    findings.push(ValidationFinding::new(
                        ValidationCode::ValidationError,
                        rule.name,
                        "argument does not match the allowed pattern",
                    ));
                }
            }
            None => {
                findings.push(ValidationFinding::new(
                    ValidationCode::ValidationError,
                    format!("arg{i}"),
                    format!("command '{intent}' does not accept this many arguments"),
                ));
            }
        }
    }

    findings
}

fn arg_field(entry: &WhitelistEntry, index: usize) -> String {
    entry
        .arg_rules
        .get(index)
        .map_or_else(|| format!("arg{index}"), |r| r.name.to_owned())
}
