use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::security::{ActionKind, PermissionRule, ResourceKind, RuleContext};

/// Action choice for one content/asset rule row.
///
/// The row editor offers a single action or "all"; a persisted rule
/// with a partial multi-action set collapses to its first action on
/// parse. That loss is the authoring contract of this transform, not
/// something to repair here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSelection {
    /// Grants the full content action set.
    All,
    /// Grants exactly one action.
    Single(ActionKind),
}

impl ActionSelection {
    /// Expands the selection into the flat action list.
    #[must_use]
    pub fn expand(&self) -> Vec<ActionKind> {
        match self {
            Self::All => ActionKind::content_actions().to_vec(),
            Self::Single(action) => vec![*action],
        }
    }
}

/// One entry-rule row scoped by project/environment/content-type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRuleRow {
    /// Stable rule identifier carried through re-edits.
    pub rule_id: String,
    /// Project selection; `None` means "All".
    pub project_id: Option<String>,
    /// Environment selection; `None` means "All".
    pub environment_id: Option<String>,
    /// Content-type selection; `None` means "All".
    pub content_type_id: Option<String>,
    /// Action selection for the row.
    pub selection: ActionSelection,
}

/// One asset-rule row scoped by project/environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRuleRow {
    /// Stable rule identifier carried through re-edits.
    pub rule_id: String,
    /// Project selection; `None` means "All".
    pub project_id: Option<String>,
    /// Environment selection; `None` means "All".
    pub environment_id: Option<String>,
    /// Action selection for the row.
    pub selection: ActionSelection,
}

/// UI-facing grouped shape of a role's flat rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    /// Tenant-wide toggles per general resource; empty list = deny.
    pub general: BTreeMap<ResourceKind, Vec<ActionKind>>,
    /// Entry rule rows.
    pub content: Vec<ContentRuleRow>,
    /// Asset rule rows.
    pub assets: Vec<AssetRuleRow>,
}

/// Parses a persisted flat rule list into the grouped editor state.
///
/// General resources absent from the input are initialized to an empty
/// action set so every toggle renders as deny-by-default.
#[must_use]
pub fn parse_rules(rules: &[PermissionRule]) -> RuleState {
    let mut general: BTreeMap<ResourceKind, Vec<ActionKind>> = ResourceKind::general()
        .iter()
        .map(|resource| (*resource, Vec::new()))
        .collect();
    let mut content = Vec::new();
    let mut assets = Vec::new();

    for rule in rules {
        match rule.resource {
            ResourceKind::Entry => {
                if let Some(selection) = collapse_actions(&rule.actions) {
                    content.push(ContentRuleRow {
                        rule_id: rule.rule_id.clone(),
                        project_id: rule.context.project_id.clone(),
                        environment_id: rule.context.environment_id.clone(),
                        content_type_id: rule.context.content_type_id.clone(),
                        selection,
                    });
                }
            }
            ResourceKind::Asset => {
                if let Some(selection) = collapse_actions(&rule.actions) {
                    assets.push(AssetRuleRow {
                        rule_id: rule.rule_id.clone(),
                        project_id: rule.context.project_id.clone(),
                        environment_id: rule.context.environment_id.clone(),
                        selection,
                    });
                }
            }
            // Last rule per general resource wins; no merge.
            resource => {
                general.insert(resource, rule.actions.clone());
            }
        }
    }

    RuleState {
        general,
        content,
        assets,
    }
}

/// Serializes the grouped editor state back into a flat rule list.
///
/// General resources with an empty action list and rows that would
/// grant nothing are dropped; no-op rules are never persisted.
#[must_use]
pub fn rules_from_state(state: &RuleState) -> Vec<PermissionRule> {
    let mut rules = Vec::new();

    for (resource, actions) in &state.general {
        if actions.is_empty() {
            continue;
        }

        rules.push(PermissionRule {
            rule_id: fresh_rule_id(),
            resource: *resource,
            scope: None,
            actions: actions.clone(),
            context: RuleContext::default(),
        });
    }

    for row in &state.content {
        rules.push(PermissionRule {
            rule_id: row_rule_id(&row.rule_id),
            resource: ResourceKind::Entry,
            scope: None,
            actions: row.selection.expand(),
            context: RuleContext {
                project_id: row.project_id.clone(),
                environment_id: row.environment_id.clone(),
                content_type_id: row.content_type_id.clone(),
            },
        });
    }

    for row in &state.assets {
        rules.push(PermissionRule {
            rule_id: row_rule_id(&row.rule_id),
            resource: ResourceKind::Asset,
            scope: None,
            actions: row.selection.expand(),
            context: RuleContext {
                project_id: row.project_id.clone(),
                environment_id: row.environment_id.clone(),
                content_type_id: None,
            },
        });
    }

    rules
}

fn collapse_actions(actions: &[ActionKind]) -> Option<ActionSelection> {
    if actions.is_empty() {
        return None;
    }

    let full_set = ActionKind::content_actions();
    let is_full = actions.len() == full_set.len()
        && full_set.iter().all(|action| actions.contains(action));
    if is_full {
        return Some(ActionSelection::All);
    }

    Some(ActionSelection::Single(actions[0]))
}

fn fresh_rule_id() -> String {
    Uuid::new_v4().to_string()
}

fn row_rule_id(existing: &str) -> String {
    if existing.trim().is_empty() {
        fresh_rule_id()
    } else {
        existing.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{
        ActionKind, ActionSelection, PermissionRule, ResourceKind, RuleContext, parse_rules,
        rules_from_state,
    };

    fn rule(
        resource: ResourceKind,
        actions: Vec<ActionKind>,
        context: RuleContext,
    ) -> PermissionRule {
        PermissionRule {
            rule_id: uuid::Uuid::new_v4().to_string(),
            resource,
            scope: None,
            actions,
            context,
        }
    }

    fn normalized(rules: &[PermissionRule]) -> BTreeSet<(ResourceKind, Vec<ActionKind>, String)> {
        rules
            .iter()
            .map(|rule| {
                let mut actions = rule.actions.clone();
                actions.sort();
                let context = format!(
                    "{:?}/{:?}/{:?}",
                    rule.context.project_id, rule.context.environment_id, rule.context.content_type_id
                );
                (rule.resource, actions, context)
            })
            .collect()
    }

    #[test]
    fn full_entry_action_set_collapses_to_all() {
        let rules = vec![rule(
            ResourceKind::Entry,
            ActionKind::content_actions().to_vec(),
            RuleContext::default(),
        )];

        let state = parse_rules(&rules);
        assert_eq!(state.content.len(), 1);
        assert_eq!(state.content[0].selection, ActionSelection::All);
    }

    #[test]
    fn partial_action_set_keeps_only_first_action() {
        let rules = vec![rule(
            ResourceKind::Entry,
            vec![ActionKind::Read, ActionKind::Publish],
            RuleContext::default(),
        )];

        let state = parse_rules(&rules);
        assert_eq!(
            state.content[0].selection,
            ActionSelection::Single(ActionKind::Read)
        );
    }

    #[test]
    fn absent_general_resources_default_to_empty_deny() {
        let state = parse_rules(&[]);

        for resource in ResourceKind::general() {
            assert_eq!(state.general.get(resource), Some(&Vec::new()));
        }
        assert!(state.content.is_empty());
        assert!(state.assets.is_empty());
    }

    #[test]
    fn last_general_rule_per_resource_wins() {
        let rules = vec![
            rule(
                ResourceKind::Locale,
                vec![ActionKind::Read],
                RuleContext::default(),
            ),
            rule(
                ResourceKind::Locale,
                vec![ActionKind::Create, ActionKind::Delete],
                RuleContext::default(),
            ),
        ];

        let state = parse_rules(&rules);
        assert_eq!(
            state.general.get(&ResourceKind::Locale),
            Some(&vec![ActionKind::Create, ActionKind::Delete])
        );
    }

    #[test]
    fn empty_general_action_sets_are_not_serialized() {
        let state = parse_rules(&[]);
        let rules = rules_from_state(&state);
        assert!(rules.is_empty());
    }

    #[test]
    fn ui_produced_rules_round_trip_as_a_set() {
        let source = vec![
            rule(
                ResourceKind::Role,
                vec![ActionKind::Read, ActionKind::Update],
                RuleContext::default(),
            ),
            rule(
                ResourceKind::Entry,
                ActionKind::content_actions().to_vec(),
                RuleContext {
                    project_id: Some("p1".to_owned()),
                    environment_id: None,
                    content_type_id: Some("article".to_owned()),
                },
            ),
            rule(
                ResourceKind::Entry,
                vec![ActionKind::Read],
                RuleContext {
                    project_id: Some("p1".to_owned()),
                    environment_id: Some("main".to_owned()),
                    content_type_id: None,
                },
            ),
            rule(
                ResourceKind::Asset,
                vec![ActionKind::Publish],
                RuleContext {
                    project_id: None,
                    environment_id: None,
                    content_type_id: None,
                },
            ),
        ];

        let round_tripped = rules_from_state(&parse_rules(&source));
        assert_eq!(normalized(&source), normalized(&round_tripped));
    }

    #[test]
    fn row_serialization_expands_all_back_to_full_set() {
        let source = vec![rule(
            ResourceKind::Asset,
            ActionKind::content_actions().to_vec(),
            RuleContext::default(),
        )];

        let rules = rules_from_state(&parse_rules(&source));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].actions.len(), ActionKind::content_actions().len());
    }
}
