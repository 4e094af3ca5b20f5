use super::document::{key_label, FlowSection};
use super::error::SectionShapeError;
use super::flow_key::FlowConfigKey;
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// The configuration one run resolved: flat settings plus the `global` and
/// `overrides` sections it threads down to its descendants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    values: Mapping,
    global: Option<Mapping>,
    overrides: Option<Mapping>,
}

impl ResolvedConfig {
    pub fn values(&self) -> &Mapping {
        &self.values
    }

    pub fn global(&self) -> Option<&Mapping> {
        self.global.as_ref()
    }

    pub fn overrides(&self) -> Option<&Mapping> {
        self.overrides.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.global.is_none() && self.overrides.is_none()
    }

    /// Record layout: settings at the top level, reserved sections alongside.
    pub fn to_document(&self) -> Mapping {
        FlowSection {
            global: self.global.clone(),
            overrides: self.overrides.clone(),
            settings: self.values.clone(),
        }
        .into_mapping()
    }

    pub fn from_document(document: Mapping) -> Result<Self, SectionShapeError> {
        let section = FlowSection::split(document)?;
        Ok(Self {
            values: section.settings,
            global: section.global,
            overrides: section.overrides,
        })
    }
}

/// What a run inherits: a flat base plus the sections to thread down.
///
/// For a root run the base is empty and the sections come from the profile
/// document; otherwise all three come from the parent's record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestorPayload {
    pub base: Mapping,
    pub global: Option<Mapping>,
    pub overrides: Option<Mapping>,
}

impl AncestorPayload {
    pub fn from_profile_section(section: FlowSection) -> Self {
        Self {
            base: Mapping::new(),
            global: section.global,
            overrides: section.overrides,
        }
    }

    pub fn from_resolved(parent: ResolvedConfig) -> Self {
        Self {
            base: parent.values,
            global: parent.global,
            overrides: parent.overrides,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeLayer {
    Ancestor,
    Module,
    Global,
    Override,
}

impl std::fmt::Display for MergeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeLayer::Ancestor => write!(f, "ancestor"),
            MergeLayer::Module => write!(f, "module"),
            MergeLayer::Global => write!(f, "global"),
            MergeLayer::Override => write!(f, "override"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeDecision {
    pub layer: MergeLayer,
    pub key: String,
}

pub fn merge(
    module_config: FlowSection,
    ancestor: &AncestorPayload,
    flow_key: &FlowConfigKey,
) -> ResolvedConfig {
    merge_with_decisions(module_config, ancestor, flow_key).0
}

/// Layers, later wins: ancestor base, module settings, `global`, then the
/// override entry targeted at `flow_key`. Inherited `global` and `overrides`
/// replace the module's own sections wholesale.
pub fn merge_with_decisions(
    module_config: FlowSection,
    ancestor: &AncestorPayload,
    flow_key: &FlowConfigKey,
) -> (ResolvedConfig, Vec<MergeDecision>) {
    let FlowSection {
        global: module_global,
        overrides: module_overrides,
        settings,
    } = module_config;

    let global = match &ancestor.global {
        Some(inherited) => {
            if module_global.is_some() {
                debug!(%flow_key, "ignoring module `global`; inherited section wins");
            }
            Some(inherited.clone())
        }
        None => module_global,
    };
    let overrides = ancestor.overrides.clone().or(module_overrides);

    let mut values = Mapping::new();
    let mut decisions = Vec::new();
    apply_layer(&mut values, &mut decisions, &ancestor.base, MergeLayer::Ancestor);
    apply_layer(&mut values, &mut decisions, &settings, MergeLayer::Module);
    if let Some(global) = &global {
        apply_layer(&mut values, &mut decisions, global, MergeLayer::Global);
    }
    if let Some(Value::Mapping(targeted)) = overrides
        .as_ref()
        .and_then(|rules| rules.get(flow_key.as_str()))
    {
        debug!(%flow_key, keys = targeted.len(), "applying targeted override");
        apply_layer(&mut values, &mut decisions, targeted, MergeLayer::Override);
    }

    (
        ResolvedConfig {
            values,
            global,
            overrides,
        },
        decisions,
    )
}

fn apply_layer(
    values: &mut Mapping,
    decisions: &mut Vec<MergeDecision>,
    layer: &Mapping,
    kind: MergeLayer,
) {
    for (key, value) in layer {
        decisions.push(MergeDecision {
            layer: kind,
            key: key_label(key),
        });
        values.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowModule;
    use crate::shared::ids::FlowName;

    fn section(raw: &str) -> FlowSection {
        FlowSection::split(serde_yaml::from_str(raw).expect("yaml")).expect("split")
    }

    fn key(module: &str, flow: &str) -> FlowConfigKey {
        let module = FlowModule::new(module, "/srv").expect("module");
        FlowConfigKey::derive(&module, &FlowName::parse(flow).expect("flow"))
    }

    #[test]
    fn module_settings_overwrite_ancestor_base() {
        let ancestor = AncestorPayload::from_resolved(
            ResolvedConfig::from_document(serde_yaml::from_str("a: 1\nb: 1\n").expect("yaml"))
                .expect("record"),
        );
        let resolved = merge(section("b: 2\n"), &ancestor, &key("m", "f"));
        assert_eq!(resolved.get("a"), Some(&Value::from(1)));
        assert_eq!(resolved.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn global_beats_module_settings_and_override_beats_global() {
        let ancestor = AncestorPayload::from_profile_section(section(
            r#"
global:
  retries: 3
  region: AU
overrides:
  buoys.WIS2-buoys-APOLLO_BAY:
    retries: 5
"#,
        ));
        let (resolved, decisions) = merge_with_decisions(
            section("region: US\nretries: 1\n"),
            &ancestor,
            &key("pkg.buoys", "WIS2-buoys-APOLLO_BAY"),
        );
        assert_eq!(resolved.get("region"), Some(&Value::from("AU")));
        assert_eq!(resolved.get("retries"), Some(&Value::from(5)));
        let last_retries = decisions
            .iter()
            .rev()
            .find(|decision| decision.key == "retries")
            .expect("retries decision");
        assert_eq!(last_retries.layer, MergeLayer::Override);
    }

    #[test]
    fn overrides_for_other_flows_are_threaded_but_not_applied() {
        let ancestor = AncestorPayload::from_profile_section(section(
            "overrides:\n  other.flow:\n    x: 1\n",
        ));
        let resolved = merge(FlowSection::default(), &ancestor, &key("m", "f"));
        assert!(resolved.get("x").is_none());
        assert!(resolved.overrides().expect("threaded").contains_key("other.flow"));
    }

    #[test]
    fn module_global_stands_when_nothing_is_inherited() {
        let resolved = merge(
            section("global:\n  region: AU\n"),
            &AncestorPayload::default(),
            &key("m", "f"),
        );
        assert_eq!(resolved.get("region"), Some(&Value::from("AU")));
        assert!(resolved.global().is_some());
    }
}
