use std::str::FromStr;

use opalcms_core::{AppError, AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};

/// Resource kinds that permission rules can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A content container within a tenant.
    Project,
    /// An isolated content branch within a project.
    Environment,
    /// A schema definition for entries.
    ContentType,
    /// A content record conforming to a content type.
    Entry,
    /// A media file.
    Asset,
    /// A locale configuration.
    Locale,
    /// A workspace member.
    User,
    /// A permission role.
    Role,
    /// A delivery/management API key.
    ApiKey,
    /// An outbound webhook configuration.
    Webhook,
}

impl ResourceKind {
    /// Returns a stable storage value for this resource kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Environment => "environment",
            Self::ContentType => "content_type",
            Self::Entry => "entry",
            Self::Asset => "asset",
            Self::Locale => "locale",
            Self::User => "user",
            Self::Role => "role",
            Self::ApiKey => "api_key",
            Self::Webhook => "webhook",
        }
    }

    /// Returns the general (tenant-wide toggle) resources in stable order.
    #[must_use]
    pub fn general() -> &'static [Self] {
        const GENERAL: &[ResourceKind] = &[
            ResourceKind::Project,
            ResourceKind::Environment,
            ResourceKind::ContentType,
            ResourceKind::Locale,
            ResourceKind::User,
            ResourceKind::Role,
            ResourceKind::ApiKey,
            ResourceKind::Webhook,
        ];

        GENERAL
    }

    /// Returns whether rule context is meaningful for this resource.
    ///
    /// Only entry and asset rules are scoped by project/environment/
    /// content-type; every other resource is a tenant-wide toggle.
    #[must_use]
    pub fn is_content_scoped(&self) -> bool {
        matches!(self, Self::Entry | Self::Asset)
    }

    /// Returns the fixed set of actions valid for this resource.
    #[must_use]
    pub fn valid_actions(&self) -> &'static [ActionKind] {
        const CRUD: &[ActionKind] = &[
            ActionKind::Create,
            ActionKind::Read,
            ActionKind::Update,
            ActionKind::Delete,
        ];

        if self.is_content_scoped() {
            ActionKind::content_actions()
        } else {
            CRUD
        }
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "project" => Ok(Self::Project),
            "environment" => Ok(Self::Environment),
            "content_type" => Ok(Self::ContentType),
            "entry" => Ok(Self::Entry),
            "asset" => Ok(Self::Asset),
            "locale" => Ok(Self::Locale),
            "user" => Ok(Self::User),
            "role" => Ok(Self::Role),
            "api_key" => Ok(Self::ApiKey),
            "webhook" => Ok(Self::Webhook),
            _ => Err(AppError::Validation(format!(
                "unknown resource kind '{value}'"
            ))),
        }
    }
}

/// Actions a permission rule can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a resource instance.
    Create,
    /// Read a resource instance.
    Read,
    /// Update a resource instance.
    Update,
    /// Delete a resource instance.
    Delete,
    /// Publish a content item.
    Publish,
    /// Unpublish a content item.
    Unpublish,
    /// Archive a content item.
    Archive,
}

impl ActionKind {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Archive => "archive",
        }
    }

    /// Returns the full action set valid for content-scoped resources.
    #[must_use]
    pub fn content_actions() -> &'static [Self] {
        const CONTENT: &[ActionKind] = &[
            ActionKind::Read,
            ActionKind::Update,
            ActionKind::Create,
            ActionKind::Delete,
            ActionKind::Publish,
            ActionKind::Unpublish,
            ActionKind::Archive,
        ];

        CONTENT
    }
}

impl FromStr for ActionKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            "archive" => Ok(Self::Archive),
            _ => Err(AppError::Validation(format!("unknown action '{value}'"))),
        }
    }
}

/// Optional scoping dimensions for content-scoped rules.
///
/// A `None` dimension means "applies to all values of that dimension".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleContext {
    /// Optional project scope.
    pub project_id: Option<String>,
    /// Optional environment scope.
    pub environment_id: Option<String>,
    /// Optional content-type scope.
    pub content_type_id: Option<String>,
}

impl RuleContext {
    /// Returns whether every dimension is a wildcard.
    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.project_id.is_none() && self.environment_id.is_none() && self.content_type_id.is_none()
    }

    fn covers(&self, query: &RuleContext) -> bool {
        dimension_covers(self.project_id.as_deref(), query.project_id.as_deref())
            && dimension_covers(
                self.environment_id.as_deref(),
                query.environment_id.as_deref(),
            )
            && dimension_covers(
                self.content_type_id.as_deref(),
                query.content_type_id.as_deref(),
            )
    }
}

fn dimension_covers(rule_value: Option<&str>, query_value: Option<&str>) -> bool {
    match rule_value {
        None => true,
        Some(scoped) => query_value == Some(scoped),
    }
}

/// One persisted allow rule: (resource, actions, context).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Stable rule identifier.
    pub rule_id: String,
    /// Resource kind the rule targets.
    pub resource: ResourceKind,
    /// Reserved pass-through field, currently unused.
    pub scope: Option<String>,
    /// Granted actions; order is preserved for the row transform.
    pub actions: Vec<ActionKind>,
    /// Scoping context; ignored for general resources.
    pub context: RuleContext,
}

impl PermissionRule {
    /// Creates a validated rule against the fixed action validity table.
    pub fn new(
        rule_id: String,
        resource: ResourceKind,
        actions: Vec<ActionKind>,
        context: RuleContext,
    ) -> AppResult<Self> {
        let valid = resource.valid_actions();
        for action in &actions {
            if !valid.contains(action) {
                return Err(AppError::Validation(format!(
                    "action '{}' is not valid for resource '{}'",
                    action.as_str(),
                    resource.as_str()
                )));
            }
        }

        for (index, action) in actions.iter().enumerate() {
            if actions[..index].contains(action) {
                return Err(AppError::Validation(format!(
                    "duplicate action '{}' in rule for resource '{}'",
                    action.as_str(),
                    resource.as_str()
                )));
            }
        }

        Ok(Self {
            rule_id,
            resource,
            scope: None,
            actions,
            context,
        })
    }

    /// Returns whether this rule grants nothing and can be dropped.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns whether this rule grants the queried action.
    #[must_use]
    pub fn matches(&self, query: &AccessQuery) -> bool {
        if self.resource != query.resource || !self.actions.contains(&query.action) {
            return false;
        }

        if !self.resource.is_content_scoped() {
            return true;
        }

        self.context.covers(&query.context)
    }
}

/// One permission check: can `action` be performed on `resource` here?
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessQuery {
    /// Resource kind under evaluation.
    pub resource: ResourceKind,
    /// Action under evaluation.
    pub action: ActionKind,
    /// Optional instance context of the check.
    pub context: RuleContext,
}

impl AccessQuery {
    /// Creates a tenant-wide query with no instance context.
    #[must_use]
    pub fn unscoped(resource: ResourceKind, action: ActionKind) -> Self {
        Self {
            resource,
            action,
            context: RuleContext::default(),
        }
    }
}

/// Role kind: the three fixed system roles plus tenant-defined roles.
///
/// The owner superuser bypass hangs off this tag rather than a role
/// name comparison, so it cannot be spoofed by naming a custom role
/// "owner".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Tenant owner; bypasses rule evaluation entirely.
    SystemOwner,
    /// Fixed administrative system role.
    SystemAdmin,
    /// Fixed member system role.
    SystemMember,
    /// Tenant-defined custom role evaluated from its rules.
    Custom,
}

impl RoleKind {
    /// Returns whether this is one of the immutable system roles.
    #[must_use]
    pub fn is_system(&self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Returns the fixed role name for system kinds.
    #[must_use]
    pub fn system_name(&self) -> Option<&'static str> {
        match self {
            Self::SystemOwner => Some("owner"),
            Self::SystemAdmin => Some("admin"),
            Self::SystemMember => Some("member"),
            Self::Custom => None,
        }
    }

    /// Maps a fixed system role name to its kind.
    #[must_use]
    pub fn from_system_name(name: &str) -> Option<Self> {
        match name {
            "owner" => Some(Self::SystemOwner),
            "admin" => Some(Self::SystemAdmin),
            "member" => Some(Self::SystemMember),
            _ => None,
        }
    }
}

/// Tenant-scoped permission role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub role_id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Unique role name in tenant scope.
    pub name: NonEmptyString,
    /// Optional role description.
    pub description: Option<String>,
    /// Role kind tag.
    pub kind: RoleKind,
    /// Allow rules evaluated for non-owner kinds.
    pub rules: Vec<PermissionRule>,
}

impl Role {
    /// Returns whether this role is an immutable system role.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind.is_system()
    }

    /// Decides whether this role grants the queried action.
    ///
    /// Any-match-grants across rules; there is no deny rule, so the
    /// absence of a matching allow rule is a deny. Pure function of
    /// (rules, query), safe to memoize per query tuple.
    #[must_use]
    pub fn permits(&self, query: &AccessQuery) -> bool {
        if self.kind == RoleKind::SystemOwner {
            return true;
        }

        self.rules.iter().any(|rule| rule.matches(query))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use opalcms_core::{NonEmptyString, TenantId};

    use super::{
        AccessQuery, ActionKind, PermissionRule, ResourceKind, Role, RoleKind, RuleContext,
    };

    fn entry_rule(actions: Vec<ActionKind>, context: RuleContext) -> PermissionRule {
        PermissionRule::new("rule-1".to_owned(), ResourceKind::Entry, actions, context)
            .unwrap_or_else(|_| unreachable!("test rule must be valid"))
    }

    fn custom_role(rules: Vec<PermissionRule>) -> Role {
        Role {
            role_id: "role-1".to_owned(),
            tenant_id: TenantId::new(),
            name: NonEmptyString::new("Editors").unwrap_or_else(|_| unreachable!()),
            description: None,
            kind: RoleKind::Custom,
            rules,
        }
    }

    #[test]
    fn rule_with_null_environment_matches_any_environment_in_project() {
        let rule = entry_rule(
            vec![ActionKind::Read, ActionKind::Update],
            RuleContext {
                project_id: Some("p1".to_owned()),
                environment_id: None,
                content_type_id: None,
            },
        );
        let role = custom_role(vec![rule]);

        let matching = AccessQuery {
            resource: ResourceKind::Entry,
            action: ActionKind::Read,
            context: RuleContext {
                project_id: Some("p1".to_owned()),
                environment_id: Some("e9".to_owned()),
                content_type_id: None,
            },
        };
        assert!(role.permits(&matching));

        let other_project = AccessQuery {
            resource: ResourceKind::Entry,
            action: ActionKind::Read,
            context: RuleContext {
                project_id: Some("p2".to_owned()),
                environment_id: Some("e9".to_owned()),
                content_type_id: None,
            },
        };
        assert!(!role.permits(&other_project));
    }

    #[test]
    fn absence_of_matching_rule_is_deny() {
        let role = custom_role(vec![entry_rule(
            vec![ActionKind::Read],
            RuleContext::default(),
        )]);

        assert!(!role.permits(&AccessQuery::unscoped(
            ResourceKind::Entry,
            ActionKind::Publish
        )));
        assert!(!role.permits(&AccessQuery::unscoped(
            ResourceKind::Asset,
            ActionKind::Read
        )));
    }

    #[test]
    fn general_resource_rule_ignores_query_context() {
        let rule = PermissionRule::new(
            "rule-2".to_owned(),
            ResourceKind::Webhook,
            vec![ActionKind::Create],
            RuleContext::default(),
        )
        .unwrap_or_else(|_| unreachable!());
        let role = custom_role(vec![rule]);

        let query = AccessQuery {
            resource: ResourceKind::Webhook,
            action: ActionKind::Create,
            context: RuleContext {
                project_id: Some("p1".to_owned()),
                environment_id: None,
                content_type_id: None,
            },
        };
        assert!(role.permits(&query));
    }

    #[test]
    fn owner_role_bypasses_rules_entirely() {
        let mut role = custom_role(Vec::new());
        role.kind = RoleKind::SystemOwner;

        for resource in [
            ResourceKind::Entry,
            ResourceKind::Role,
            ResourceKind::ApiKey,
        ] {
            assert!(role.permits(&AccessQuery::unscoped(resource, ActionKind::Delete)));
        }
    }

    #[test]
    fn custom_role_named_owner_does_not_bypass() {
        let mut role = custom_role(Vec::new());
        role.name = NonEmptyString::new("owner").unwrap_or_else(|_| unreachable!());

        assert!(!role.permits(&AccessQuery::unscoped(
            ResourceKind::Entry,
            ActionKind::Read
        )));
    }

    #[test]
    fn publish_is_rejected_for_general_resources() {
        let result = PermissionRule::new(
            "rule-3".to_owned(),
            ResourceKind::Locale,
            vec![ActionKind::Publish],
            RuleContext::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_actions_are_rejected() {
        let result = PermissionRule::new(
            "rule-4".to_owned(),
            ResourceKind::Entry,
            vec![ActionKind::Read, ActionKind::Read],
            RuleContext::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn resource_kind_roundtrips_storage_value() {
        for resource in ResourceKind::general() {
            let restored = ResourceKind::from_str(resource.as_str());
            assert_eq!(restored.ok(), Some(*resource));
        }
    }

    #[test]
    fn system_role_names_map_to_kinds() {
        assert_eq!(
            RoleKind::from_system_name("owner"),
            Some(RoleKind::SystemOwner)
        );
        assert_eq!(RoleKind::from_system_name("editor"), None);
        assert!(RoleKind::SystemMember.is_system());
        assert!(!RoleKind::Custom.is_system());
    }
}
