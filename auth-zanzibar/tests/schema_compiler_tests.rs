//! Schema compiler tests
//!
//! Fragments are compared as line sets: the order of namespaces and of
//! lines inside a fragment is not part of the contract.

use auth_zanzibar::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Key each fragment by its `definition` line and sort its lines.
fn fragment_map(fragments: &[String]) -> HashMap<String, Vec<String>> {
    fragments
        .iter()
        .map(|fragment| {
            let mut lines: Vec<String> = fragment.lines().map(str::to_string).collect();
            let key = lines.first().cloned().unwrap_or_default();
            lines.sort();
            (key, lines)
        })
        .collect()
}

const PREDEFINED_SCHEMA: &str = "definition user {}
--
definition organization {
\trelation admin: user | group#membership
\trelation member: user | group#membership
\tpermission edit = admin
\tpermission view = admin + member
\tpermission delete = admin
}
--
definition project {
\trelation organization: organization
\trelation admin: user | group#membership
\trelation viewer: user | group#membership
\tpermission edit = admin + organization->admin
\tpermission view = admin + viewer + organization->admin + organization->member
\tpermission delete = admin + organization->admin
}
--
definition group {
\trelation organization: organization
\trelation manager: user
\trelation member: user
\tpermission membership = member + manager
\tpermission edit = manager + organization->admin
\tpermission view = member + manager + organization->admin
\tpermission delete = manager + organization->admin
}";

// =============================================================================
// Reference fragments
// =============================================================================

#[test]
fn test_predefined_schema_matches_reference() {
    let generated = generate_schema(&predefined_system_namespaces()).unwrap();
    let expected: Vec<String> = PREDEFINED_SCHEMA.split("\n--\n").map(str::to_string).collect();

    assert_eq!(fragment_map(&generated), fragment_map(&expected));
    println!("✅ Predefined schema matches reference fragments");
}

#[test]
fn test_group_member_edit_scenario() {
    let mut namespaces = NamespaceConfigMap::new();
    namespaces.insert(
        "group".to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .with_role("member", &["user"])
            .with_permission("group.edit", &["member"]),
    );

    let generated = generate_schema(&namespaces).unwrap();
    let expected = vec![
        "definition group {\n\tpermission group.edit = member\n\trelation member: user\n}".to_string(),
    ];

    assert_eq!(fragment_map(&generated), fragment_map(&expected));
}

#[test]
fn test_resource_group_inherits_project_and_organization() {
    let configs = parse_config_yaml(
        r#"
entropy:
  type: resource_group
  resource_types:
    - name: firehose
      roles:
        - name: sink_editor
          principals: [user, group]
      permissions:
        - name: sink_edit
          roles: [sink_editor, owner, organization:admin]
"#,
    )
    .unwrap();
    let configured = namespaces_from_resource_config(&configs).unwrap();
    let namespaces = with_predefined_namespaces(&configured);

    let definitions = compile(&namespaces).unwrap();
    let firehose = definitions
        .iter()
        .find(|d| d.name == "entropy/firehose")
        .expect("resource group definition");
    let rendered = firehose.to_string();

    assert!(rendered.contains("\trelation sink_editor: user | group#membership\n"));
    assert!(rendered.contains("\trelation project: project\n"));
    assert!(rendered.contains("\trelation organization: organization\n"));
    assert!(rendered.contains("\tpermission sink_edit = sink_editor + owner + organization->admin\n"));
    assert!(rendered.contains("project->admin"));
}

#[test]
fn test_namespace_principal_is_allowed() {
    let mut namespaces = NamespaceConfigMap::new();
    namespaces.insert(
        "team".to_string(),
        NamespaceConfig::new(NamespaceType::System).with_role("lead", &["user"]),
    );
    namespaces.insert(
        "board".to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .with_role("owner", &["team"])
            .with_permission("manage", &["owner"]),
    );

    let generated = generate_schema(&namespaces).unwrap();
    let map = fragment_map(&generated);
    let board = &map["definition board {"];
    assert!(board.contains(&"\trelation owner: team".to_string()));
}

#[test]
fn test_one_bad_namespace_fails_whole_batch() {
    let mut namespaces = predefined_system_namespaces();
    namespaces.insert(
        "document".to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .with_role("viewer", &["user"])
            .with_permission("view", &["viewer", "organization:admin"]),
    );

    // document never declared an organization relation
    let err = generate_schema(&namespaces).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownRole { ref namespace, .. } if namespace == "document"));
}

// =============================================================================
// Determinism
// =============================================================================

fn namespace_strategy() -> impl Strategy<Value = NamespaceConfig> {
    prop::collection::btree_set("[a-z]{1,8}", 1..6)
        .prop_flat_map(|roles| {
            let roles: Vec<String> = roles.into_iter().collect();
            let count = roles.len();
            let principals = prop::collection::vec(
                prop::sample::subsequence(vec!["user", "group"], 1..=2),
                count,
            );
            let permissions = prop::collection::btree_map(
                "[a-z]{1,8}_perm",
                prop::collection::vec(0..count, 1..4),
                0..5,
            );
            (Just(roles), principals, permissions)
        })
        .prop_map(|(roles, principals, permissions)| {
            let mut config = NamespaceConfig::new(NamespaceType::System);
            for (role, allowed) in roles.iter().zip(principals) {
                config = config.with_role(role, &allowed);
            }
            for (permission, indexes) in permissions {
                let granted: Vec<&str> = indexes.iter().map(|i| roles[*i].as_str()).collect();
                config = config.with_permission(&permission, &granted);
            }
            config
        })
}

proptest! {
    #[test]
    fn prop_generation_is_deterministic_as_a_set(
        namespaces in prop::collection::btree_map("[a-z]{3,10}", namespace_strategy(), 1..5)
    ) {
        let build = |source: &BTreeMap<String, NamespaceConfig>| -> NamespaceConfigMap {
            source.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let first = generate_schema(&build(&namespaces)).unwrap();
        let second = generate_schema(&build(&namespaces)).unwrap();

        prop_assert_eq!(first.len(), namespaces.len());
        prop_assert_eq!(fragment_map(&first), fragment_map(&second));
    }

    #[test]
    fn prop_every_role_gets_a_relation_line(
        namespaces in prop::collection::btree_map("[a-z]{3,10}", namespace_strategy(), 1..5)
    ) {
        let map: NamespaceConfigMap = namespaces.clone().into_iter().collect();
        let definitions = compile(&map).unwrap();

        for definition in definitions {
            let config = &namespaces[&definition.name];
            prop_assert_eq!(definition.relations.len(), config.roles.len());
            prop_assert_eq!(definition.permissions.len(), config.permissions.len());
        }
    }
}
