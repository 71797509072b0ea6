//! Generated configuration artifacts
//!
//! Three files derived from one [`ConfigTree`] and nothing else:
//! - the JSON data file loaded at runtime
//! - the C++ header declaring one struct per category and the `Config` class
//! - the C++ source that fills those structs from the JSON data
//!
//! `Config` is an explicitly constructed immutable object. Code that needs
//! values builds one with `Config::fromFile()` and passes it around.

use super::grouping::ConfigTree;
use crate::config::RefactorSettings;
use serde_json::{Map, Value};

const GENERATED_BANNER: &str = "// Generated by codemend. Do not edit by hand.";

/// Contents of the three generated files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub data: String,
    pub declaration: String,
    pub initializer: String,
}

impl Artifacts {
    pub fn generate(tree: &ConfigTree, settings: &RefactorSettings) -> Self {
        Self {
            data: render_data(tree),
            declaration: render_declaration(tree, settings),
            initializer: render_initializer(tree, settings),
        }
    }
}

/// `combat` → `CombatConfig`
fn struct_name(category: &str) -> String {
    format!("{}Config", pascal_case(category))
}

fn pascal_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// JSON data: category → subcategory → name → value
pub fn render_data(tree: &ConfigTree) -> String {
    let mut root = Map::new();
    for (category, subs) in tree.categories() {
        let mut cat = Map::new();
        for (sub, names) in subs {
            let leaves: Map<String, Value> = names
                .iter()
                .map(|(name, entry)| (name.clone(), Value::Number(entry.value.clone())))
                .collect();
            cat.insert(sub.clone(), Value::Object(leaves));
        }
        root.insert(category.clone(), Value::Object(cat));
    }
    let mut text = serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_else(|_| "{}".into());
    text.push('\n');
    text
}

/// C++ header
pub fn render_declaration(tree: &ConfigTree, settings: &RefactorSettings) -> String {
    let mut lines = vec![
        GENERATED_BANNER.to_string(),
        "#pragma once".to_string(),
        String::new(),
        "#include <nlohmann/json.hpp>".to_string(),
        "#include <string>".to_string(),
        String::new(),
    ];

    for (category, subs) in tree.categories() {
        lines.push(format!("struct {} {{", struct_name(category)));
        for (sub, names) in subs {
            for (name, entry) in names {
                lines.push(format!(
                    "    {} {};  // {}.{}.{}",
                    entry.kind.cpp_type(),
                    entry.cpp_name,
                    category,
                    sub,
                    name
                ));
            }
        }
        lines.push("};".to_string());
        lines.push(String::new());
    }

    lines.push("class Config {".to_string());
    lines.push("public:".to_string());
    lines.push("    explicit Config(const nlohmann::json& data);".to_string());
    lines.push(format!(
        "    static Config fromFile(const std::string& path = \"{}\");",
        settings.runtime_data_path
    ));
    if !tree.0.is_empty() {
        lines.push(String::new());
    }
    for category in tree.0.keys() {
        lines.push(format!("    const {} {};", struct_name(category), category));
    }
    lines.push("};".to_string());

    lines.join("\n") + "\n"
}

/// C++ source
pub fn render_initializer(tree: &ConfigTree, settings: &RefactorSettings) -> String {
    let mut lines = vec![
        GENERATED_BANNER.to_string(),
        format!("#include \"{}\"", settings.declaration_include),
        String::new(),
        "#include <fstream>".to_string(),
        "#include <stdexcept>".to_string(),
        String::new(),
        "namespace {".to_string(),
        String::new(),
    ];

    for (category, subs) in tree.categories() {
        let name = struct_name(category);
        lines.push(format!(
            "{} load{}(const nlohmann::json& data) {{",
            name,
            pascal_case(category)
        ));
        lines.push(format!("    {} c;", name));
        for (sub, names) in subs {
            for (leaf, entry) in names {
                lines.push(format!(
                    "    c.{} = data.at(\"{}\").at(\"{}\").at(\"{}\").get<{}>();",
                    entry.cpp_name,
                    category,
                    sub,
                    leaf,
                    entry.kind.cpp_type()
                ));
            }
        }
        lines.push("    return c;".to_string());
        lines.push("}".to_string());
        lines.push(String::new());
    }
    lines.push("}  // namespace".to_string());
    lines.push(String::new());

    if tree.0.is_empty() {
        lines.push("Config::Config(const nlohmann::json& /*data*/) {}".to_string());
    } else {
        lines.push("Config::Config(const nlohmann::json& data)".to_string());
        let inits: Vec<String> = tree
            .0
            .keys()
            .map(|c| format!("{}(load{}(data))", c, pascal_case(c)))
            .collect();
        lines.push(format!("    : {} {{}}", inits.join(",\n      ")));
    }
    lines.push(String::new());

    lines.extend(
        [
            "Config Config::fromFile(const std::string& path) {",
            "    std::ifstream file(path);",
            "    if (!file.is_open()) {",
            "        throw std::runtime_error(\"Failed to open config file: \" + path);",
            "    }",
            "    nlohmann::json data;",
            "    file >> data;",
            "    return Config(data);",
            "}",
        ]
        .map(String::from),
    );

    lines.join("\n") + "\n"
}
