//! Config tree: category → subcategory → name → entry
//!
//! Built either from an Advisor answer (sanitized and filtered against the
//! batch) or by the deterministic fallback.

use crate::models::{Issue, IssueDetail};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Storage type of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
}

impl ValueKind {
    pub fn of(value: &Number) -> Self {
        if value.is_f64() {
            ValueKind::Float
        } else {
            ValueKind::Int
        }
    }

    /// C++ member type
    pub fn cpp_type(&self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "double",
        }
    }
}

/// One leaf of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub value: Number,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    /// Member name inside the category struct, unique per category
    pub cpp_name: String,
}

pub type Subcategory = BTreeMap<String, ConfigEntry>;
pub type Category = BTreeMap<String, Subcategory>;

/// Where a tree came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingSource {
    Advisor,
    Fallback,
}

impl std::fmt::Display for GroupingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupingSource::Advisor => write!(f, "advisor"),
            GroupingSource::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(pub BTreeMap<String, Category>);

/// A leaf together with its position in the tree
#[derive(Debug, Clone, Copy)]
pub struct Triple<'a> {
    pub category: &'a str,
    pub subcategory: &'a str,
    pub name: &'a str,
    pub entry: &'a ConfigEntry,
}

impl ConfigTree {
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn leaf_count(&self) -> usize {
        self.triples().len()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&String, &Category)> {
        self.0.iter()
    }

    /// Every leaf in tree order
    pub fn triples(&self) -> Vec<Triple<'_>> {
        self.0
            .iter()
            .flat_map(|(category, subs)| {
                subs.iter().flat_map(move |(subcategory, names)| {
                    names.iter().map(move |(name, entry)| Triple {
                        category,
                        subcategory,
                        name,
                        entry,
                    })
                })
            })
            .collect()
    }

    /// First leaf (in tree order) holding `value` with the same storage kind.
    ///
    /// `150` never resolves to a `double` leaf nor `150.0f` to an `int` one.
    pub fn lookup_by_value(&self, value: &Number) -> Option<Triple<'_>> {
        let key = literal_key(value)?;
        self.triples()
            .into_iter()
            .find(|t| t.entry.value.as_f64() == Some(key.1) && t.entry.kind == key.0)
    }
}

/// Identity of a literal: its kind and numeric value
fn literal_key(value: &Number) -> Option<(ValueKind, f64)> {
    value.as_f64().map(|v| (ValueKind::of(value), v))
}

/// Distinct literals of a batch, in batch order
fn distinct_values(issues: &[Issue]) -> Vec<Number> {
    let mut seen: Vec<(ValueKind, f64)> = Vec::new();
    let mut values = Vec::new();
    for issue in issues {
        if let IssueDetail::MagicNumber { value, .. } = &issue.detail {
            if let Some(key) = literal_key(value) {
                if !seen.contains(&key) {
                    seen.push(key);
                    values.push(value.clone());
                }
            }
        }
    }
    values
}

/// Deterministic grouping: `general.values.value_N` over distinct values
pub fn fallback_grouping(issues: &[Issue]) -> ConfigTree {
    let names: Subcategory = distinct_values(issues)
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let name = format!("value_{}", i + 1);
            let entry = ConfigEntry {
                kind: ValueKind::of(&value),
                value,
                cpp_name: name.clone(),
            };
            (name, entry)
        })
        .collect();

    let mut tree = ConfigTree::default();
    if !names.is_empty() {
        tree.0
            .entry("general".to_string())
            .or_default()
            .insert("values".to_string(), names);
    }
    tree
}

/// Interpret an Advisor answer as a config tree.
///
/// Keys are sanitized into identifiers, leaves whose value is not in the
/// batch are dropped, and duplicate member names inside a category get a
/// numeric suffix. A subcategory level the Advisor skipped is filled in as
/// `values`. The result may be empty.
pub fn parse_advisor_tree(answer: &Value, issues: &[Issue]) -> ConfigTree {
    let batch_keys: Vec<(ValueKind, f64)> = distinct_values(issues).iter().filter_map(literal_key).collect();
    let mut tree = ConfigTree::default();
    let Some(categories) = answer.as_object() else {
        return tree;
    };

    for (raw_category, subs) in categories {
        let Some(category) = sanitize_identifier(raw_category) else {
            continue;
        };
        let Some(subs) = subs.as_object() else {
            continue;
        };
        let mut taken: BTreeSet<String> = tree
            .0
            .get(&category)
            .map(|c| c.values().flat_map(|s| s.values().map(|e| e.cpp_name.clone())).collect())
            .unwrap_or_default();

        for (raw_sub, names) in subs {
            // Two-level answer: {category: {name: leaf}}
            let (sub_key, leaves): (&str, Vec<(&String, &Value)>) = if is_leaf(names) {
                ("values", vec![(raw_sub, names)])
            } else {
                match names.as_object() {
                    Some(map) => (raw_sub.as_str(), map.iter().collect()),
                    None => continue,
                }
            };
            let Some(subcategory) = sanitize_identifier(sub_key) else {
                continue;
            };

            for (raw_name, leaf) in leaves {
                let Some(name) = sanitize_identifier(raw_name) else {
                    continue;
                };
                let Some(value) = leaf.get("value").and_then(Value::as_number).cloned() else {
                    continue;
                };
                let Some(v) = value.as_f64() else {
                    continue;
                };
                // The declared type wins when the batch has such a literal
                let declared = match leaf.get("type").and_then(Value::as_str) {
                    Some("float") | Some("double") => ValueKind::Float,
                    Some("int") => ValueKind::Int,
                    _ => ValueKind::of(&value),
                };
                let kind = if batch_keys.contains(&(declared, v)) {
                    declared
                } else if batch_keys.contains(&(ValueKind::of(&value), v)) {
                    ValueKind::of(&value)
                } else {
                    debug!("Dropping advisor leaf {}: value {} not in batch", name, value);
                    continue;
                };
                let value = match kind {
                    ValueKind::Float if !value.is_f64() => Number::from_f64(v).unwrap_or(value),
                    ValueKind::Int if value.is_f64() => Number::from(v as i64),
                    _ => value,
                };
                let base = leaf
                    .get("cpp_name")
                    .and_then(Value::as_str)
                    .and_then(sanitize_identifier)
                    .unwrap_or_else(|| name.clone());
                let cpp_name = unique_name(&base, &mut taken);

                tree.0
                    .entry(category.clone())
                    .or_default()
                    .entry(subcategory.clone())
                    .or_default()
                    .entry(name)
                    .or_insert(ConfigEntry {
                        value,
                        kind,
                        cpp_name,
                    });
            }
        }
    }

    // Drop categories and subcategories left empty by filtering
    tree.0.retain(|_, subs| {
        subs.retain(|_, names| !names.is_empty());
        !subs.is_empty()
    });
    tree
}

fn is_leaf(value: &Value) -> bool {
    value.get("value").is_some_and(Value::is_number)
}

fn unique_name(base: &str, taken: &mut BTreeSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

const CPP_KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "class", "const", "continue", "default", "delete",
    "do", "double", "else", "enum", "explicit", "float", "for", "friend", "goto", "if", "int",
    "long", "namespace", "new", "operator", "private", "protected", "public", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "template", "this", "throw", "typedef",
    "union", "unsigned", "using", "virtual", "void", "volatile", "while",
];

/// Turn an arbitrary key into a snake_case C++ identifier
pub fn sanitize_identifier(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c.to_ascii_lowercase());
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        return None;
    }
    let mut ident = trimmed.to_string();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "v_");
    }
    if CPP_KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    Some(ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn magic(n: usize, value: Number) -> Issue {
        Issue {
            id: format!("MAGIC_{:04}", n),
            file: "a.cpp".into(),
            line: n as u32,
            severity: Severity::Medium,
            detail: IssueDetail::MagicNumber {
                value_str: value.to_string(),
                value,
                column: 0,
                context: String::new(),
            },
        }
    }

    fn batch() -> Vec<Issue> {
        vec![
            magic(1, 150.into()),
            magic(2, Number::from_f64(2.5).unwrap()),
            magic(3, 150.into()),
            magic(4, 35.into()),
        ]
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_grouping(&batch());
        let b = fallback_grouping(&batch());
        assert_eq!(a, b);

        let triples = a.triples();
        let names: Vec<(&str, &str, &str)> =
            triples.iter().map(|t| (t.category, t.subcategory, t.name)).collect();
        assert_eq!(
            names,
            vec![
                ("general", "values", "value_1"),
                ("general", "values", "value_2"),
                ("general", "values", "value_3"),
            ]
        );
        assert_eq!(triples[0].entry.value, Number::from(150));
        assert_eq!(triples[1].entry.kind, ValueKind::Float);
        assert_eq!(triples[2].entry.value, Number::from(35));
    }

    #[test]
    fn test_fallback_of_empty_batch_is_empty() {
        assert!(fallback_grouping(&[]).is_empty());
    }

    #[test]
    fn test_parse_advisor_tree_sanitizes_and_filters() {
        let answer = json!({
            "Combat": {
                "melee": {
                    "Base Damage": {"value": 150, "type": "int", "cpp_name": "baseDamage"},
                    "crit": {"value": 2.5, "type": "float", "cpp_name": "crit_mult"},
                    "invented": {"value": 999, "type": "int", "cpp_name": "invented"}
                },
                "ranged": {
                    "range": {"value": 35, "type": "int", "cpp_name": "base_damage"}
                }
            },
            "empty": {"nothing": {"x": {"value": 12345}}}
        });

        let tree = parse_advisor_tree(&answer, &batch());
        assert_eq!(tree.leaf_count(), 3);
        assert!(!tree.0.contains_key("empty"));

        let melee = &tree.0["combat"]["melee"];
        assert_eq!(melee["base_damage"].cpp_name, "base_damage");
        assert_eq!(melee["crit"].kind, ValueKind::Float);
        // Collides with melee.base_damage inside the same category
        assert_eq!(tree.0["combat"]["ranged"]["range"].cpp_name, "base_damage_2");
    }

    #[test]
    fn test_parse_two_level_answer() {
        let answer = json!({"general": {"value_0": {"value": 35, "type": "int", "cpp_name": "value_0"}}});
        let tree = parse_advisor_tree(&answer, &batch());
        assert_eq!(tree.0["general"]["values"]["value_0"].value, Number::from(35));
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_advisor_tree(&json!([1, 2, 3]), &batch()).is_empty());
        assert!(parse_advisor_tree(&json!({"a": 5}), &batch()).is_empty());
    }

    #[test]
    fn test_lookup_by_value() {
        let tree = fallback_grouping(&batch());
        assert_eq!(tree.lookup_by_value(&Number::from(35)).unwrap().name, "value_3");
        assert!(tree.lookup_by_value(&Number::from(7)).is_none());
        // Same value, other kind
        assert!(tree.lookup_by_value(&Number::from_f64(35.0).unwrap()).is_none());
    }

    #[test]
    fn test_int_and_float_of_equal_value_stay_apart() {
        let issues = vec![magic(1, 150.into()), magic(2, Number::from_f64(150.0).unwrap())];
        let tree = fallback_grouping(&issues);
        assert_eq!(tree.leaf_count(), 2);

        let int_leaf = tree.lookup_by_value(&Number::from(150)).unwrap();
        let float_leaf = tree.lookup_by_value(&Number::from_f64(150.0).unwrap()).unwrap();
        assert_eq!(int_leaf.entry.kind, ValueKind::Int);
        assert_eq!(float_leaf.entry.kind, ValueKind::Float);
        assert_ne!(int_leaf.entry.cpp_name, float_leaf.entry.cpp_name);
    }

    #[test]
    fn test_advisor_leaf_kind_must_match_a_literal() {
        let issues = vec![magic(1, 150.into()), magic(2, Number::from_f64(150.0).unwrap())];
        let answer = json!({
            "player": {"stats": {
                "max_hp": {"value": 150, "type": "int", "cpp_name": "max_hp"},
                "hp_scale": {"value": 150, "type": "float", "cpp_name": "hp_scale"}
            }}
        });
        let tree = parse_advisor_tree(&answer, &issues);
        let stats = &tree.0["player"]["stats"];
        assert_eq!(stats["max_hp"].kind, ValueKind::Int);
        assert_eq!(stats["hp_scale"].kind, ValueKind::Float);
        assert!(stats["hp_scale"].value.is_f64());
        assert_eq!(
            tree.lookup_by_value(&Number::from_f64(150.0).unwrap()).unwrap().entry.cpp_name,
            "hp_scale"
        );

        // No float literal 35 in the batch: the declared type yields to the literal
        let answer = json!({"enemy": {"stats": {"range": {"value": 35, "type": "float"}}}});
        let tree = parse_advisor_tree(&answer, &batch());
        assert_eq!(tree.0["enemy"]["stats"]["range"].kind, ValueKind::Int);
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Health Potion-Heal").as_deref(), Some("health_potion_heal"));
        assert_eq!(sanitize_identifier("maxHP").as_deref(), Some("max_hp"));
        assert_eq!(sanitize_identifier("3d_range").as_deref(), Some("v_3d_range"));
        assert_eq!(sanitize_identifier("default").as_deref(), Some("default_"));
        assert_eq!(sanitize_identifier("!!!"), None);
    }

    #[test]
    fn test_tree_json_shape() {
        let json = serde_json::to_value(fallback_grouping(&batch())).unwrap();
        assert_eq!(json["general"]["values"]["value_1"]["type"], "int");
        assert_eq!(json["general"]["values"]["value_1"]["cpp_name"], "value_1");
    }
}
