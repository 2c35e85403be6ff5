//! YAML statement definitions and placeholder value files.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    builtin,
    data::Value,
    error::TemplateError,
    metadata::NameStyle,
    record::value_from_json,
    rows::ResultMapper,
    statement::Statement,
    template::{PlaceholderTemplate, TemplateOptions},
};

/// One statement: its template and how results map onto targets.
///
/// ```yaml
/// template: "MATCH (n:`#label`) <[WHERE n.id = #id]> RETURN n"
/// fill: add(row)
/// row_fill: put(colName, colValue)
/// name_style: lower
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatementConfig {
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_fill: Option<String>,
    pub name_style: NameStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_keys: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<char>,
}

impl StatementConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Opening statement file {path:?}"))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing statement file {path:?}"))?;
        if config.template.trim().is_empty() {
            return Err(anyhow!("Statement file {path:?} has no template"));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self).context("Serializing statement")?;
        fs::write(path, serialized).with_context(|| format!("Writing statement file {path:?}"))
    }

    pub fn template_options(&self) -> TemplateOptions {
        self.marker
            .map(|marker| TemplateOptions { marker })
            .unwrap_or_default()
    }

    pub fn parse_template(&self) -> Result<PlaceholderTemplate, TemplateError> {
        PlaceholderTemplate::parse_with(&self.template, self.template_options())
    }

    /// Applies the fill, row fill, name style and relation keys to `mapper`.
    pub fn configure(&self, mapper: &mut ResultMapper) {
        if let Some(fill) = &self.fill {
            mapper.set_fill(fill.as_str());
        }
        if let Some(row_fill) = &self.row_fill {
            mapper.set_row_fill(row_fill.as_str());
        }
        mapper.set_name_style(self.name_style);
        if let Some(keys) = &self.relation_keys {
            mapper.set_relation_keys(keys.as_str());
        }
    }

    /// Statement mapping onto the built-in list-of-maps targets.
    pub fn builtin_statement(&self) -> Result<Statement> {
        let template = self
            .parse_template()
            .with_context(|| format!("Parsing template '{}'", self.template))?;
        let mut mapper = builtin::builtin_mapper();
        self.configure(&mut mapper);
        Ok(Statement::new(template, mapper))
    }
}

/// Loads placeholder values from a YAML or JSON mapping. Nested mappings
/// are flattened into dotted names (`order: {id: 1}` becomes `order.id`).
pub fn load_values(path: &Path) -> Result<BTreeMap<String, Value>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Opening values file {path:?}"))?;
    parse_values(&raw).with_context(|| format!("Parsing values file {path:?}"))
}

pub fn parse_values(raw: &str) -> Result<BTreeMap<String, Value>> {
    let parsed: JsonValue = serde_yaml::from_str(raw)?;
    let JsonValue::Object(entries) = parsed else {
        return Err(anyhow!("Values must be a mapping of names to values"));
    };
    let mut values = BTreeMap::new();
    flatten_into(&mut values, None, &entries);
    Ok(values)
}

fn flatten_into(
    values: &mut BTreeMap<String, Value>,
    prefix: Option<&str>,
    entries: &serde_json::Map<String, JsonValue>,
) {
    for (key, value) in entries {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            JsonValue::Object(nested) => flatten_into(values, Some(&name), nested),
            other => {
                values.insert(name, value_from_json(other));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn statement_config_round_trips_through_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("statement.yaml");
        let config = StatementConfig {
            template: "MATCH (n) WHERE n.id = #id RETURN n".into(),
            fill: Some("add(row)".into()),
            name_style: NameStyle::Lower,
            marker: Some('#'),
            ..StatementConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(StatementConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unknown_keys_and_empty_templates_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "template: x\nfil: add(row)\n").unwrap();
        assert!(StatementConfig::load(&path).is_err());
        fs::write(&path, "fill: add(row)\n").unwrap();
        assert!(StatementConfig::load(&path).is_err());
    }

    #[test]
    fn values_flatten_nested_mappings() {
        let values = parse_values("label: Person\norder:\n  id: 7\n  paid: true\n").unwrap();
        assert_eq!(values.get("label"), Some(&Value::from("Person")));
        assert_eq!(values.get("order.id"), Some(&Value::Long(7)));
        assert_eq!(values.get("order.paid"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn custom_marker_reaches_the_template() {
        let config = StatementConfig {
            template: "RETURN $x".into(),
            marker: Some('$'),
            ..StatementConfig::default()
        };
        assert_eq!(config.parse_template().unwrap().tokens(), ["x"]);
    }
}
