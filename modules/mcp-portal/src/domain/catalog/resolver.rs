//! Deterministic catalog resolution.
//!
//! Pure data-in/data-out: the service fetches catalogs and customizations,
//! this module merges them. Same input, same output; the only wall-clock
//! dependency is the `resolved_at` stamp.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_db::entities::catalog_config::{self, catalog_type};
use portal_db::entities::catalog_server;
use portal_db::entities::customization::{self, action};

/// Where a resolved entry came from. Variant order is the tie-break order:
/// lower wins when precedence numbers are equal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    UserOverride,
    UserPersonal,
    AdminBase,
    SystemDefault,
}

/// One entry of a resolved catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResolvedServer {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub image: String,
    pub tag: String,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub ports: Vec<String>,
    pub command: Vec<String>,
    pub enabled: bool,
    pub source: EntrySource,
    /// Catalog the entry (or its override target) belongs to.
    pub catalog_id: Uuid,
    pub precedence: i32,
}

/// Partial replacement payload carried by `override` and `add`
/// customizations. Absent fields keep the base entry's values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverridePayload {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub volumes: Option<Vec<String>>,
    pub ports: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

/// The per-user derived view.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ResolvedCatalog {
    pub servers: BTreeMap<String, ResolvedServer>,
    /// Names removed by effective disable customizations.
    #[schema(value_type = Vec<String>)]
    pub disabled: BTreeSet<String>,
    pub admin_count: usize,
    pub override_count: usize,
    pub custom_count: usize,
    pub disabled_count: usize,
    pub resolved_at: DateTime<Utc>,
}

/// Everything resolution needs, fetched by the service in one pass.
#[derive(Debug, Default)]
pub struct ResolutionInput {
    /// Enabled `system_default` and `admin_base` catalogs with their
    /// entries.
    pub base: Vec<(catalog_config::Model, Vec<catalog_server::Model>)>,
    /// The user's customizations across those catalogs.
    pub customizations: Vec<customization::Model>,
    /// The user's enabled personal catalogs with their entries.
    pub personal: Vec<(catalog_config::Model, Vec<catalog_server::Model>)>,
}

fn source_of(catalog: &catalog_config::Model) -> EntrySource {
    if catalog.catalog_type == catalog_type::SYSTEM_DEFAULT {
        EntrySource::SystemDefault
    } else {
        EntrySource::AdminBase
    }
}

fn entry_from_row(
    row: &catalog_server::Model,
    catalog: &catalog_config::Model,
    source: EntrySource,
) -> ResolvedServer {
    ResolvedServer {
        name: row.name.clone(),
        display_name: row.display_name.clone(),
        description: row.description.clone(),
        image: row.image.clone(),
        tag: row.tag.clone(),
        env: serde_json::from_value(row.env.clone()).unwrap_or_default(),
        volumes: serde_json::from_value(row.volumes.clone()).unwrap_or_default(),
        ports: serde_json::from_value(row.ports.clone()).unwrap_or_default(),
        command: serde_json::from_value(row.command.clone()).unwrap_or_default(),
        enabled: row.enabled,
        source,
        catalog_id: catalog.id,
        precedence: catalog.precedence,
    }
}

fn apply_payload(entry: &mut ResolvedServer, payload: &OverridePayload) {
    if let Some(v) = &payload.display_name {
        entry.display_name = v.clone();
    }
    if let Some(v) = &payload.description {
        entry.description = v.clone();
    }
    if let Some(v) = &payload.image {
        entry.image = v.clone();
    }
    if let Some(v) = &payload.tag {
        entry.tag = v.clone();
    }
    if let Some(v) = &payload.env {
        entry.env = v.clone();
    }
    if let Some(v) = &payload.volumes {
        entry.volumes = v.clone();
    }
    if let Some(v) = &payload.ports {
        entry.ports = v.clone();
    }
    if let Some(v) = &payload.command {
        entry.command = v.clone();
    }
    if let Some(v) = payload.enabled {
        entry.enabled = v;
    }
}

/// Merge base catalogs with the user's customizations and personal
/// catalogs. See the field docs on [`ResolvedCatalog`] for the outcome
/// shape.
#[must_use]
pub fn resolve(input: &ResolutionInput) -> ResolvedCatalog {
    let mut working: BTreeMap<String, ResolvedServer> = BTreeMap::new();
    let mut disabled: BTreeSet<String> = BTreeSet::new();

    // Step 1: base material, ascending precedence; first insertion wins.
    // Equal precedence breaks on source order, then catalog name.
    let mut base: Vec<&(catalog_config::Model, Vec<catalog_server::Model>)> =
        input.base.iter().collect();
    base.sort_by(|(a, _), (b, _)| {
        a.precedence
            .cmp(&b.precedence)
            .then(source_of(a).cmp(&source_of(b)))
            .then(a.name.cmp(&b.name))
    });

    let mandatory: HashMap<Uuid, bool> = input
        .base
        .iter()
        .map(|(c, _)| (c.id, c.is_mandatory))
        .collect();

    for (catalog, rows) in base {
        let source = source_of(catalog);
        for row in rows {
            if !working.contains_key(&row.name) {
                working.insert(row.name.clone(), entry_from_row(row, catalog, source));
            }
        }
    }

    // Step 2: disables. Mandatory base catalogs are immune; the row still
    // exists in the store for audit, it just has no effect here.
    for custom in &input.customizations {
        if custom.action != action::DISABLE {
            continue;
        }
        if mandatory.get(&custom.base_catalog_id).copied().unwrap_or(false) {
            continue;
        }
        disabled.insert(custom.base_server_name.clone());
        working.remove(&custom.base_server_name);
    }

    // Step 3: overrides replace whatever is (or is not) there.
    let mut override_count = 0;
    for custom in &input.customizations {
        if custom.action != action::OVERRIDE {
            continue;
        }
        let payload: OverridePayload = custom
            .custom_data
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let mut entry = working
            .remove(&custom.base_server_name)
            .unwrap_or_else(|| ResolvedServer {
                name: custom.base_server_name.clone(),
                display_name: custom.base_server_name.clone(),
                description: String::new(),
                image: String::new(),
                tag: "latest".to_owned(),
                env: BTreeMap::new(),
                volumes: Vec::new(),
                ports: Vec::new(),
                command: Vec::new(),
                enabled: true,
                source: EntrySource::UserOverride,
                catalog_id: custom.base_catalog_id,
                precedence: 0,
            });
        apply_payload(&mut entry, &payload);
        entry.source = EntrySource::UserOverride;
        override_count += 1;
        working.insert(custom.base_server_name.clone(), entry);
    }

    // Step 4: additions. They overwrite base entries but never overrides.
    let mut custom_count = 0;
    for custom in &input.customizations {
        if custom.action != action::ADD {
            continue;
        }
        if working
            .get(&custom.base_server_name)
            .is_some_and(|e| e.source == EntrySource::UserOverride)
        {
            continue;
        }
        let payload: OverridePayload = custom
            .custom_data
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let mut entry = ResolvedServer {
            name: custom.base_server_name.clone(),
            display_name: custom.base_server_name.clone(),
            description: String::new(),
            image: String::new(),
            tag: "latest".to_owned(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            ports: Vec::new(),
            command: Vec::new(),
            enabled: true,
            source: EntrySource::UserPersonal,
            catalog_id: custom.base_catalog_id,
            precedence: 0,
        };
        apply_payload(&mut entry, &payload);
        custom_count += 1;
        working.insert(custom.base_server_name.clone(), entry);
    }

    // Step 5: personal catalogs. Entries respect overrides, replace
    // everything else.
    let mut personal: Vec<&(catalog_config::Model, Vec<catalog_server::Model>)> =
        input.personal.iter().collect();
    personal.sort_by(|(a, _), (b, _)| a.precedence.cmp(&b.precedence).then(a.name.cmp(&b.name)));

    for (catalog, rows) in personal {
        for row in rows {
            if working
                .get(&row.name)
                .is_some_and(|e| e.source == EntrySource::UserOverride)
            {
                continue;
            }
            custom_count += 1;
            working.insert(
                row.name.clone(),
                entry_from_row(row, catalog, EntrySource::UserPersonal),
            );
        }
    }

    let admin_count = working
        .values()
        .filter(|e| matches!(e.source, EntrySource::AdminBase | EntrySource::SystemDefault))
        .count();
    let disabled_count = disabled.len();

    ResolvedCatalog {
        servers: working,
        disabled,
        admin_count,
        override_count,
        custom_count,
        disabled_count,
        resolved_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(
        name: &str,
        kind: &str,
        precedence: i32,
        mandatory: bool,
    ) -> catalog_config::Model {
        let now = Utc::now();
        catalog_config::Model {
            id: Uuid::new_v4(),
            catalog_type: kind.to_owned(),
            name: name.to_owned(),
            display_name: name.to_owned(),
            description: String::new(),
            owner_id: None,
            tenant_id: None,
            enabled: true,
            is_mandatory: mandatory,
            precedence,
            version: "1".to_owned(),
            source_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn row(catalog_id: Uuid, name: &str, image: &str, tag: &str) -> catalog_server::Model {
        let now = Utc::now();
        catalog_server::Model {
            id: Uuid::new_v4(),
            catalog_id,
            name: name.to_owned(),
            display_name: name.to_owned(),
            description: String::new(),
            image: image.to_owned(),
            tag: tag.to_owned(),
            env: serde_json::json!({}),
            volumes: serde_json::json!([]),
            ports: serde_json::json!([]),
            command: serde_json::json!([]),
            enabled: true,
            is_override: false,
            overrides_server: None,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn disable(catalog_id: Uuid, name: &str) -> customization::Model {
        custom(catalog_id, name, action::DISABLE, None)
    }

    fn custom(
        catalog_id: Uuid,
        name: &str,
        action_: &str,
        data: Option<serde_json::Value>,
    ) -> customization::Model {
        let now = Utc::now();
        customization::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            base_catalog_id: catalog_id,
            base_server_name: name.to_owned(),
            action: action_.to_owned(),
            custom_data: data,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn base_entries_flow_through() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let rows = vec![row(base.id, "github", "mcp/github", "1")];
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, rows)],
            ..ResolutionInput::default()
        });
        assert_eq!(resolved.servers.len(), 1);
        assert_eq!(resolved.admin_count, 1);
        let entry = &resolved.servers["github"];
        assert_eq!(entry.source, EntrySource::AdminBase);
        assert_eq!(entry.image, "mcp/github");
    }

    #[test]
    fn lower_precedence_number_wins() {
        let high = catalog("high", catalog_type::ADMIN_BASE, 10, false);
        let low = catalog("low", catalog_type::ADMIN_BASE, 200, false);
        let high_rows = vec![row(high.id, "github", "mcp/github", "priority")];
        let low_rows = vec![row(low.id, "github", "mcp/github", "fallback")];

        // Input order must not matter.
        let resolved = resolve(&ResolutionInput {
            base: vec![(low, low_rows), (high, high_rows)],
            ..ResolutionInput::default()
        });
        assert_eq!(resolved.servers["github"].tag, "priority");
    }

    #[test]
    fn equal_precedence_prefers_admin_base_over_system_default() {
        let admin = catalog("admin", catalog_type::ADMIN_BASE, 100, false);
        let system = catalog("system", catalog_type::SYSTEM_DEFAULT, 100, false);
        let admin_rows = vec![row(admin.id, "github", "mcp/github", "admin")];
        let system_rows = vec![row(system.id, "github", "mcp/github", "system")];

        let resolved = resolve(&ResolutionInput {
            base: vec![(system, system_rows), (admin, admin_rows)],
            ..ResolutionInput::default()
        });
        assert_eq!(resolved.servers["github"].tag, "admin");
    }

    #[test]
    fn disable_removes_entry_and_records_name() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let rows = vec![row(base_id, "github", "mcp/github", "1")];
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, rows)],
            customizations: vec![disable(base_id, "github")],
            ..ResolutionInput::default()
        });
        assert!(!resolved.servers.contains_key("github"));
        assert!(resolved.disabled.contains("github"));
        assert_eq!(resolved.disabled_count, 1);
    }

    #[test]
    fn mandatory_catalog_ignores_disable() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, true);
        let base_id = base.id;
        let rows = vec![row(base_id, "critical", "mcp/critical", "1")];
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, rows)],
            customizations: vec![disable(base_id, "critical")],
            ..ResolutionInput::default()
        });
        assert!(resolved.servers.contains_key("critical"));
        assert!(resolved.disabled.is_empty());
    }

    #[test]
    fn override_replaces_payload_fields_and_tags_source() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let rows = vec![row(base_id, "github", "a", "1")];
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, rows)],
            customizations: vec![custom(
                base_id,
                "github",
                action::OVERRIDE,
                Some(serde_json::json!({"image": "b", "tag": "2"})),
            )],
            ..ResolutionInput::default()
        });
        let entry = &resolved.servers["github"];
        assert_eq!(entry.image, "b");
        assert_eq!(entry.tag, "2");
        assert_eq!(entry.source, EntrySource::UserOverride);
        assert_eq!(resolved.override_count, 1);
    }

    #[test]
    fn override_applied_twice_is_idempotent() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let make_input = || ResolutionInput {
            base: vec![(
                catalog_with_id(base_id, "base1", catalog_type::ADMIN_BASE, 100, false),
                vec![row(base_id, "github", "a", "1")],
            )],
            customizations: vec![custom(
                base_id,
                "github",
                action::OVERRIDE,
                Some(serde_json::json!({"image": "b"})),
            )],
            ..ResolutionInput::default()
        };
        let first = resolve(&make_input());
        let second = resolve(&make_input());
        assert_eq!(first.servers, second.servers);
    }

    fn catalog_with_id(
        id: Uuid,
        name: &str,
        kind: &str,
        precedence: i32,
        mandatory: bool,
    ) -> catalog_config::Model {
        let mut c = catalog(name, kind, precedence, mandatory);
        c.id = id;
        c
    }

    #[test]
    fn personal_entries_respect_overrides_but_replace_base() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let personal = catalog("mine", catalog_type::USER_PERSONAL, 50, false);
        let personal_rows = vec![
            row(personal.id, "github", "personal/github", "p"),
            row(personal.id, "jira", "personal/jira", "p"),
        ];
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, vec![row(base_id, "github", "base/github", "b")])],
            customizations: vec![custom(
                base_id,
                "github",
                action::OVERRIDE,
                Some(serde_json::json!({"image": "override/github"})),
            )],
            personal: vec![(personal, personal_rows)],
        });

        // github keeps the override; jira comes from the personal catalog.
        assert_eq!(resolved.servers["github"].image, "override/github");
        assert_eq!(resolved.servers["github"].source, EntrySource::UserOverride);
        assert_eq!(resolved.servers["jira"].source, EntrySource::UserPersonal);
    }

    #[test]
    fn add_customization_creates_entry() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let resolved = resolve(&ResolutionInput {
            base: vec![(base, vec![])],
            customizations: vec![custom(
                base_id,
                "scratch",
                action::ADD,
                Some(serde_json::json!({"image": "me/scratch", "tag": "dev"})),
            )],
            ..ResolutionInput::default()
        });
        let entry = &resolved.servers["scratch"];
        assert_eq!(entry.image, "me/scratch");
        assert_eq!(entry.source, EntrySource::UserPersonal);
        assert_eq!(resolved.custom_count, 1);
    }

    #[test]
    fn resolution_is_deterministic() {
        let base = catalog("base1", catalog_type::ADMIN_BASE, 100, false);
        let base_id = base.id;
        let make_input = || ResolutionInput {
            base: vec![(
                catalog_with_id(base_id, "base1", catalog_type::ADMIN_BASE, 100, false),
                vec![
                    row(base_id, "alpha", "a", "1"),
                    row(base_id, "beta", "b", "1"),
                ],
            )],
            customizations: vec![disable(base_id, "beta")],
            ..ResolutionInput::default()
        };
        let first = resolve(&make_input());
        let second = resolve(&make_input());
        assert_eq!(
            first.servers.keys().collect::<Vec<_>>(),
            second.servers.keys().collect::<Vec<_>>()
        );
        assert_eq!(first.servers, second.servers);
        assert_eq!(first.disabled, second.disabled);
    }
}
