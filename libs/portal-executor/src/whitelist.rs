//! The fixed command vocabulary and its admission rules.
//!
//! A [`CommandIntent`] is an abstract operation name; clients never supply
//! literal command strings. Each intent maps to a [`WhitelistEntry`]
//! describing who may call it, how long it may run, what arguments it
//! accepts, and how it is rate limited. The whitelist is built once at
//! startup and immutable afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use portal_security::Role;

/// Abstract, whitelisted operation names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandIntent {
    ServerList,
    ServerEnable,
    ServerDisable,
    ServerInspect,
    GatewayRun,
    GatewayStop,
    GatewayStatus,
    GatewayLogs,
    CatalogInit,
    CatalogList,
    CatalogShow,
    CatalogSync,
    ConfigRead,
    ConfigWrite,
    SecretSet,
    SecretGet,
    SecretList,
    SecretDelete,
    Version,
    Health,
}

impl CommandIntent {
    /// Wire name used in API requests and audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandIntent::ServerList => "server.list",
            CommandIntent::ServerEnable => "server.enable",
            CommandIntent::ServerDisable => "server.disable",
            CommandIntent::ServerInspect => "server.inspect",
            CommandIntent::GatewayRun => "gateway.run",
            CommandIntent::GatewayStop => "gateway.stop",
            CommandIntent::GatewayStatus => "gateway.status",
            CommandIntent::GatewayLogs => "gateway.logs",
            CommandIntent::CatalogInit => "catalog.init",
            CommandIntent::CatalogList => "catalog.list",
            CommandIntent::CatalogShow => "catalog.show",
            CommandIntent::CatalogSync => "catalog.sync",
            CommandIntent::ConfigRead => "config.read",
            CommandIntent::ConfigWrite => "config.write",
            CommandIntent::SecretSet => "secret.set",
            CommandIntent::SecretGet => "secret.get",
            CommandIntent::SecretList => "secret.list",
            CommandIntent::SecretDelete => "secret.delete",
            CommandIntent::Version => "version",
            CommandIntent::Health => "health",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.as_str() == s)
    }

    /// Fixed argv fragment inserted between the base arguments and the
    /// validated request arguments.
    #[must_use]
    pub fn argv_prefix(&self) -> &'static [&'static str] {
        match self {
            CommandIntent::ServerList => &["server", "list"],
            CommandIntent::ServerEnable => &["server", "enable"],
            CommandIntent::ServerDisable => &["server", "disable"],
            CommandIntent::ServerInspect => &["server", "inspect"],
            CommandIntent::GatewayRun => &["gateway", "run"],
            CommandIntent::GatewayStop => &["gateway", "stop"],
            CommandIntent::GatewayStatus => &["gateway", "status"],
            CommandIntent::GatewayLogs => &["gateway", "logs"],
            CommandIntent::CatalogInit => &["catalog", "init"],
            CommandIntent::CatalogList => &["catalog", "ls"],
            CommandIntent::CatalogShow => &["catalog", "show"],
            CommandIntent::CatalogSync => &["catalog", "sync"],
            CommandIntent::ConfigRead => &["config", "read"],
            CommandIntent::ConfigWrite => &["config", "write"],
            CommandIntent::SecretSet => &["secret", "set"],
            CommandIntent::SecretGet => &["secret", "get"],
            CommandIntent::SecretList => &["secret", "ls"],
            CommandIntent::SecretDelete => &["secret", "rm"],
            // Both liveness intents map to the tool's version command; it is
            // the cheapest call the tool offers.
            CommandIntent::Version | CommandIntent::Health => &["version"],
        }
    }

    pub const ALL: [CommandIntent; 20] = [
        CommandIntent::ServerList,
        CommandIntent::ServerEnable,
        CommandIntent::ServerDisable,
        CommandIntent::ServerInspect,
        CommandIntent::GatewayRun,
        CommandIntent::GatewayStop,
        CommandIntent::GatewayStatus,
        CommandIntent::GatewayLogs,
        CommandIntent::CatalogInit,
        CommandIntent::CatalogList,
        CommandIntent::CatalogShow,
        CommandIntent::CatalogSync,
        CommandIntent::ConfigRead,
        CommandIntent::ConfigWrite,
        CommandIntent::SecretSet,
        CommandIntent::SecretGet,
        CommandIntent::SecretList,
        CommandIntent::SecretDelete,
        CommandIntent::Version,
        CommandIntent::Health,
    ];
}

impl std::fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation rule for one positional argument.
#[derive(Clone, Debug)]
pub struct ArgRule {
    /// Human name used in findings (`"server"`, `"key"`, ...).
    pub name: &'static str,
    pub pattern: Regex,
    pub max_len: usize,
    /// Redacted arguments are replaced by `***` in audit records.
    pub redact: bool,
}

impl ArgRule {
    fn new(name: &'static str, pattern: &str, max_len: usize) -> Self {
        Self {
            name,
            // Table patterns are compile-time constants; a bad one is a
            // programming error caught by the whitelist unit tests.
            pattern: Regex::new(pattern).unwrap_or_else(|e| {
                panic!("invalid whitelist pattern for {name}: {e}");
            }),
            max_len,
            redact: false,
        }
    }

    fn redacted(mut self) -> Self {
        self.redact = true;
        self
    }
}

/// Per-intent token-bucket parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CommandRateSpec {
    pub capacity: u32,
    pub refill_per_minute: u32,
}

impl CommandRateSpec {
    const fn new(capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            capacity,
            refill_per_minute,
        }
    }
}

impl Default for CommandRateSpec {
    fn default() -> Self {
        Self::new(10, 10)
    }
}

/// Admission rules for one intent.
#[derive(Clone, Debug)]
pub struct WhitelistEntry {
    pub intent: CommandIntent,
    pub min_role: Role,
    pub max_timeout: Duration,
    pub description: &'static str,
    /// Positional rules; `arg_rules[i]` governs argument `i`.
    pub arg_rules: Vec<ArgRule>,
    /// Arguments `0..required_args` must be present.
    pub required_args: usize,
    /// Literal arguments that are never accepted for this intent.
    pub forbidden_args: &'static [&'static str],
    pub rate: CommandRateSpec,
}

/// Immutable intent → entry table, shared process-wide behind an `Arc`.
#[derive(Clone, Debug)]
pub struct Whitelist {
    entries: HashMap<CommandIntent, Arc<WhitelistEntry>>,
}

// Common argument patterns. Server/catalog/secret names follow the
// container-tool naming rules: leading alphanumeric, then a conservative
// charset.
const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$";
const KEY_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$";
// Secret values and config payloads: printable, no shell structure. The
// dangerous-pattern scan runs first and is the real gate; this narrows the
// residue.
const VALUE_PATTERN: &str = r"^[^\x00-\x1f]{1,512}$";
const URL_PATTERN: &str = r"^https?://[A-Za-z0-9][A-Za-z0-9_.:/%+-]{0,255}$";

impl Whitelist {
    /// The built-in production table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        let mut add = |e: WhitelistEntry| {
            entries.insert(e.intent, Arc::new(e));
        };

        let name = |field| ArgRule::new(field, NAME_PATTERN, 64);
        let key = |field| ArgRule::new(field, KEY_PATTERN, 128);

        add(WhitelistEntry {
            intent: CommandIntent::ServerList,
            min_role: Role::User,
            max_timeout: Duration::from_secs(30),
            description: "List configured MCP servers",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::ServerEnable,
            min_role: Role::User,
            max_timeout: Duration::from_secs(60),
            description: "Enable an MCP server",
            arg_rules: vec![name("server")],
            required_args: 1,
            forbidden_args: &["--privileged", "--force"],
            rate: CommandRateSpec::new(10, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::ServerDisable,
            min_role: Role::User,
            max_timeout: Duration::from_secs(60),
            description: "Disable an MCP server",
            arg_rules: vec![name("server")],
            required_args: 1,
            forbidden_args: &["--privileged", "--force"],
            rate: CommandRateSpec::new(10, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::ServerInspect,
            min_role: Role::User,
            max_timeout: Duration::from_secs(30),
            description: "Inspect an MCP server definition",
            arg_rules: vec![name("server")],
            required_args: 1,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::GatewayRun,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(120),
            description: "Start the MCP gateway",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &["--privileged"],
            rate: CommandRateSpec::new(5, 5),
        });
        add(WhitelistEntry {
            intent: CommandIntent::GatewayStop,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(60),
            description: "Stop the MCP gateway",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(5, 5),
        });
        add(WhitelistEntry {
            intent: CommandIntent::GatewayStatus,
            min_role: Role::User,
            max_timeout: Duration::from_secs(30),
            description: "Report gateway status",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::GatewayLogs,
            min_role: Role::User,
            max_timeout: Duration::from_secs(300),
            description: "Stream gateway logs",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &["--follow-forever"],
            rate: CommandRateSpec::new(5, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::CatalogInit,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(60),
            description: "Initialize the catalog store",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(2, 2),
        });
        add(WhitelistEntry {
            intent: CommandIntent::CatalogList,
            min_role: Role::User,
            max_timeout: Duration::from_secs(30),
            description: "List known catalogs",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::CatalogShow,
            min_role: Role::User,
            max_timeout: Duration::from_secs(30),
            description: "Show one catalog",
            arg_rules: vec![name("catalog")],
            required_args: 1,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::CatalogSync,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(120),
            description: "Synchronize a catalog from its source URL",
            arg_rules: vec![
                name("catalog"),
                ArgRule::new("source", URL_PATTERN, 256),
            ],
            required_args: 1,
            forbidden_args: &[],
            rate: CommandRateSpec::new(5, 5),
        });
        add(WhitelistEntry {
            intent: CommandIntent::ConfigRead,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "Read tool configuration",
            arg_rules: vec![key("key")],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(10, 20),
        });
        add(WhitelistEntry {
            intent: CommandIntent::ConfigWrite,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "Write tool configuration",
            arg_rules: vec![key("key"), ArgRule::new("value", VALUE_PATTERN, 512)],
            required_args: 2,
            forbidden_args: &[],
            rate: CommandRateSpec::new(5, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::SecretSet,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "Store a secret",
            arg_rules: vec![
                key("name"),
                ArgRule::new("value", VALUE_PATTERN, 512).redacted(),
            ],
            required_args: 2,
            forbidden_args: &[],
            rate: CommandRateSpec::new(5, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::SecretGet,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "Fetch a secret's metadata",
            arg_rules: vec![key("name")],
            required_args: 1,
            forbidden_args: &[],
            rate: CommandRateSpec::new(10, 20),
        });
        add(WhitelistEntry {
            intent: CommandIntent::SecretList,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "List secret names",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(10, 20),
        });
        add(WhitelistEntry {
            intent: CommandIntent::SecretDelete,
            min_role: Role::Admin,
            max_timeout: Duration::from_secs(30),
            description: "Delete a secret",
            arg_rules: vec![key("name")],
            required_args: 1,
            forbidden_args: &[],
            rate: CommandRateSpec::new(5, 10),
        });
        add(WhitelistEntry {
            intent: CommandIntent::Version,
            min_role: Role::Guest,
            max_timeout: Duration::from_secs(10),
            description: "Report tool version",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });
        add(WhitelistEntry {
            intent: CommandIntent::Health,
            min_role: Role::Guest,
            max_timeout: Duration::from_secs(10),
            description: "Probe tool liveness",
            arg_rules: vec![],
            required_args: 0,
            forbidden_args: &[],
            rate: CommandRateSpec::new(30, 60),
        });

        Self { entries }
    }

    /// Build a custom table, e.g. a deployment that switches intents off.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = WhitelistEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.intent, Arc::new(e)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, intent: CommandIntent) -> Option<&Arc<WhitelistEntry>> {
        self.entries.get(&intent)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_every_intent() {
        let wl = Whitelist::builtin();
        for intent in CommandIntent::ALL {
            assert!(wl.get(intent).is_some(), "missing entry for {intent}");
        }
        assert_eq!(wl.len(), CommandIntent::ALL.len());
    }

    #[test]
    fn wire_names_round_trip() {
        for intent in CommandIntent::ALL {
            assert_eq!(CommandIntent::from_wire(intent.as_str()), Some(intent));
        }
        assert_eq!(CommandIntent::from_wire("server.destroy"), None);
    }

    #[test]
    fn config_write_requires_admin() {
        let wl = Whitelist::builtin();
        let entry = wl.get(CommandIntent::ConfigWrite).unwrap();
        assert_eq!(entry.min_role, Role::Admin);
    }

    #[test]
    fn secret_value_is_redacted() {
        let wl = Whitelist::builtin();
        let entry = wl.get(CommandIntent::SecretSet).unwrap();
        assert!(entry.arg_rules[1].redact);
        assert!(!entry.arg_rules[0].redact);
    }

    #[test]
    fn name_pattern_accepts_container_style_names() {
        let rule = ArgRule::new("server", NAME_PATTERN, 64);
        for ok in ["github", "github-mcp", "a1.b_2", "X"] {
            assert!(rule.pattern.is_match(ok), "{ok} should match");
        }
        for bad in ["", "-leading", ".dot", "has space", "semi;colon"] {
            assert!(!rule.pattern.is_match(bad), "{bad} should not match");
        }
    }

    #[test]
    fn timeouts_stay_under_a_few_minutes() {
        let wl = Whitelist::builtin();
        for intent in CommandIntent::ALL {
            assert!(wl.get(intent).unwrap().max_timeout <= Duration::from_secs(300));
        }
    }
}
