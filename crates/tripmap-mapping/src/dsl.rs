//! Mapping DSL
//!
//! The declarative model interpreted by the transform engine, plus loaders
//! for YAML and JSON mapping files.
//!
//! ```yaml
//! field_set:
//!   - from: booking.reference
//!     to: reference
//!     is_unique_id: true
//!   - for_each:
//!       from: segments
//!       to: legs
//!       field_set:
//!         - from: carrier.code
//!           to: carrier
//! ```

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tripmap_tree::{DottedPath, type_name};

/// Root of a mapping specification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MappingSpec {
    /// Optional label, reported by tooling only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Root rules, evaluated in declaration order
    #[serde(default)]
    pub field_set: Vec<MappingRule>,
}

/// One node of the mapping tree
///
/// Decoded from its literal shape: `{for_each: {..}}`, `{field_set: [..]}`
/// or a leaf field rule. A node carrying `for_each` or `field_set` may not
/// carry any other key.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingRule {
    /// Apply a rule set to every element of a source array
    ForEach(ForEachRule),

    /// Nested group evaluated against the same source subtree
    FieldSet(Vec<MappingRule>),

    /// Leaf copy of one value
    Field(FieldRule),
}

/// Leaf rule copying (and optionally post-processing) one value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    /// Source path; when absent `default_value` is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DottedPath>,

    /// Destination path in the output
    pub to: DottedPath,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,

    /// Downgrade a failed lookup to a debug note instead of a warning
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,

    /// Keep the value in the cache store under the first segment of `to`
    #[serde(default, skip_serializing_if = "is_false")]
    pub add_to_cache: bool,

    /// Record the value in the seen unique ids
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_unique_id: bool,

    /// Resolve `from` against the parent subtree instead of the current one
    #[serde(default, skip_serializing_if = "is_false")]
    pub from_parent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// Loop over a source array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ForEachRule {
    pub from: DottedPath,
    pub to: DottedPath,
    #[serde(default)]
    pub field_set: Vec<MappingRule>,

    /// Post-processor applied to the whole collected array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(flag: &bool) -> bool {
    !*flag
}

impl FieldRule {
    /// Plain copy from `from` to `to`.
    pub fn copy(from: impl Into<DottedPath>, to: impl Into<DottedPath>) -> Self {
        Self {
            from: Some(from.into()),
            to: to.into(),
            action: None,
            is_optional: false,
            add_to_cache: false,
            is_unique_id: false,
            from_parent: false,
            default_value: None,
        }
    }
}

impl Serialize for MappingRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::ForEach(rule) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("for_each", rule)?;
                map.end()
            }
            Self::FieldSet(rules) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("field_set", rules)?;
                map.end()
            }
            Self::Field(rule) => rule.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MappingRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = match Value::deserialize(deserializer)? {
            Value::Object(map) => map,
            other => {
                return Err(de::Error::custom(format!(
                    "mapping rule must be a mapping, found {}",
                    type_name(&other)
                )));
            }
        };

        for group_key in ["for_each", "field_set"] {
            if !map.contains_key(group_key) {
                continue;
            }
            if map.len() > 1 {
                let mut extra: Vec<&str> = map
                    .keys()
                    .map(String::as_str)
                    .filter(|key| *key != group_key)
                    .collect();
                extra.sort_unstable();
                return Err(de::Error::custom(format!(
                    "a {group_key} node cannot carry other keys (found: {})",
                    extra.join(", ")
                )));
            }
            let body = map.remove(group_key).unwrap_or(Value::Null);
            let rule = if group_key == "for_each" {
                serde_json::from_value(body).map(Self::ForEach)
            } else {
                serde_json::from_value(body).map(Self::FieldSet)
            };
            return rule.map_err(de::Error::custom);
        }

        serde_json::from_value(Value::Object(map))
            .map(Self::Field)
            .map_err(de::Error::custom)
    }
}

/// Post-processing action applied to a resolved value
///
/// The catalog is closed: an `action_type` that is not listed here is
/// rejected when the mapping is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Concatenate a literal or resolved field values after the input
    Append {
        value: String,
        #[serde(default)]
        value_type: ValueType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },

    /// Concatenate a literal or resolved field values before the input
    Prepend {
        value: String,
        #[serde(default)]
        value_type: ValueType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },

    /// Sum `key` across the records of one or more comma-separated list paths
    #[serde(alias = "add")]
    SumFieldInDictList { fields: String, key: String },

    /// Title-case a string
    Capitalise,

    /// Membership test against literal values and/or resolved fields
    ValueIn {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<String>,
    },

    /// Pick one element of an array
    ExtractIndexData { index: i64 },

    /// Key an array of records by one of their fields (last record wins)
    ListToDict { key: String },

    /// Flatten a list, optionally joining the result into a string
    Flat {
        strategy: FlatStrategy,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        join: Option<String>,
    },

    /// Explicit type conversion
    TypeCast { to: CastType },

    Uppercase,

    Lowercase,

    Trim,

    /// Replace `null` or an empty string
    Default { value: Value },

    /// Apply several actions in order
    Chain { actions: Vec<ActionSpec> },

    /// Reserved, not implemented
    Divide,

    /// Reserved, not implemented
    Multiply,

    /// Reserved, not implemented
    CustomEval,
}

/// How the `value` of `append`/`prepend` is interpreted
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// A literal string
    #[default]
    Const,
    /// Comma-separated field paths resolved against the source subtree
    Var,
}

/// Strategy of the `flat` action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlatStrategy {
    /// Concatenate a list of lists
    NestedList,
    /// Pluck one field from every record
    ListDict,
    /// Concatenate one list-valued field from every record
    ListDictList,
}

/// Target type of the `type_cast` action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Int,
    Float,
    Str,
    List,
    Bool,
}

impl ActionSpec {
    /// Catalog name as written in mapping files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::Prepend { .. } => "prepend",
            Self::SumFieldInDictList { .. } => "sum_field_in_dict_list",
            Self::Capitalise => "capitalise",
            Self::ValueIn { .. } => "value_in",
            Self::ExtractIndexData { .. } => "extract_index_data",
            Self::ListToDict { .. } => "list_to_dict",
            Self::Flat { .. } => "flat",
            Self::TypeCast { .. } => "type_cast",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Trim => "trim",
            Self::Default { .. } => "default",
            Self::Chain { .. } => "chain",
            Self::Divide => "divide",
            Self::Multiply => "multiply",
            Self::CustomEval => "custom_eval",
        }
    }

    /// False for reserved catalog entries, and for chains containing one.
    #[must_use]
    pub fn is_implemented(&self) -> bool {
        match self {
            Self::Divide | Self::Multiply | Self::CustomEval => false,
            Self::Chain { actions } => actions.iter().all(Self::is_implemented),
            _ => true,
        }
    }
}

impl MappingSpec {
    /// Build a specification from root rules.
    #[must_use]
    pub fn new(field_set: Vec<MappingRule>) -> Self {
        Self {
            name: None,
            field_set,
        }
    }

    /// Total number of rule nodes, nested ones included.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        fn count(rules: &[MappingRule]) -> usize {
            rules
                .iter()
                .map(|rule| match rule {
                    MappingRule::ForEach(for_each) => 1 + count(&for_each.field_set),
                    MappingRule::FieldSet(children) => 1 + count(children),
                    MappingRule::Field(_) => 1,
                })
                .sum()
        }
        count(&self.field_set)
    }

    /// Nesting depth; a flat specification has depth 1, an empty one 0.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        fn depth(rules: &[MappingRule]) -> usize {
            rules
                .iter()
                .map(|rule| match rule {
                    MappingRule::ForEach(for_each) => 1 + depth(&for_each.field_set).max(1),
                    MappingRule::FieldSet(children) => 1 + depth(children).max(1),
                    MappingRule::Field(_) => 1,
                })
                .max()
                .unwrap_or(0)
        }
        depth(&self.field_set)
    }

    /// Every action used, depth first, chained actions flattened.
    #[must_use]
    pub fn actions(&self) -> Vec<&ActionSpec> {
        fn push_action<'a>(action: &'a ActionSpec, out: &mut Vec<&'a ActionSpec>) {
            out.push(action);
            if let ActionSpec::Chain { actions } = action {
                for inner in actions {
                    push_action(inner, out);
                }
            }
        }

        fn walk<'a>(rules: &'a [MappingRule], out: &mut Vec<&'a ActionSpec>) {
            for rule in rules {
                match rule {
                    MappingRule::ForEach(for_each) => {
                        walk(&for_each.field_set, out);
                        if let Some(action) = &for_each.action {
                            push_action(action, out);
                        }
                    }
                    MappingRule::FieldSet(children) => walk(children, out),
                    MappingRule::Field(field) => {
                        if let Some(action) = &field.action {
                            push_action(action, out);
                        }
                    }
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.field_set, &mut out);
        out
    }
}

/// DSL loader
pub struct MappingDsl;

/// Parse error type
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, " at line {line}, column {col}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn without_location(message: String) -> Self {
        Self {
            message,
            line: None,
            column: None,
        }
    }
}

impl MappingDsl {
    /// Parse a mapping from YAML (JSON input is accepted as well)
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid YAML or does not match the
    /// mapping grammar, including unknown action types.
    pub fn parse(yaml: &str) -> Result<MappingSpec, ParseError> {
        serde_yaml::from_str(yaml).map_err(|e| ParseError {
            message: format!("Failed to parse mapping: {e}"),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
        })
    }

    /// Parse a mapping from JSON
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid JSON or does not match the
    /// mapping grammar.
    pub fn parse_json(json: &str) -> Result<MappingSpec, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError {
            message: format!("Failed to parse mapping: {e}"),
            line: Some(e.line()),
            column: Some(e.column()),
        })
    }

    /// Parse a mapping file, choosing JSON for `.json` and YAML otherwise
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn parse_file(path: &std::path::Path) -> Result<MappingSpec, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ParseError::without_location(format!("Failed to read {}: {e}", path.display()))
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(&content)
        } else {
            Self::parse(&content)
        }
    }

    /// Serialize a mapping to YAML
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_yaml(spec: &MappingSpec) -> Result<String, ParseError> {
        serde_yaml::to_string(spec)
            .map_err(|e| ParseError::without_location(format!("Failed to serialize: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_field_rules() {
        let dsl = r"
name: hotel_offer
field_set:
  - from: hotel.code
    to: hotel_id
    is_unique_id: true
  - from: hotel.rating
    to: stars
    is_optional: true
  - to: source
    default_value: vendor_a
";

        let spec = MappingDsl::parse(dsl).unwrap();
        assert_eq!(spec.name.as_deref(), Some("hotel_offer"));
        assert_eq!(spec.field_set.len(), 3);

        match &spec.field_set[0] {
            MappingRule::Field(field) => {
                assert_eq!(field.from.as_ref().unwrap().to_string(), "hotel.code");
                assert_eq!(field.to.to_string(), "hotel_id");
                assert!(field.is_unique_id);
                assert!(!field.is_optional);
            }
            _ => panic!("Expected Field rule"),
        }

        match &spec.field_set[2] {
            MappingRule::Field(field) => {
                assert!(field.from.is_none());
                assert_eq!(field.default_value, Some(json!("vendor_a")));
            }
            _ => panic!("Expected Field rule"),
        }
    }

    #[test]
    fn test_parse_for_each_with_action() {
        let dsl = r"
field_set:
  - for_each:
      from: rooms
      to: rooms_by_code
      action:
        action_type: list_to_dict
        key: code
      field_set:
        - from: room_code
          to: code
        - from: hotel_name
          to: hotel
          from_parent: true
";

        let spec = MappingDsl::parse(dsl).unwrap();
        match &spec.field_set[0] {
            MappingRule::ForEach(for_each) => {
                assert_eq!(for_each.from.to_string(), "rooms");
                assert_eq!(for_each.field_set.len(), 2);
                assert_eq!(
                    for_each.action,
                    Some(ActionSpec::ListToDict {
                        key: "code".to_string()
                    })
                );
                match &for_each.field_set[1] {
                    MappingRule::Field(field) => assert!(field.from_parent),
                    _ => panic!("Expected Field rule"),
                }
            }
            _ => panic!("Expected ForEach rule"),
        }
    }

    #[test]
    fn test_parse_nested_field_set() {
        let dsl = r"
field_set:
  - field_set:
      - from: a
        to: b
      - for_each:
          from: items
          to: out
          field_set: []
";

        let spec = MappingDsl::parse(dsl).unwrap();
        assert_eq!(spec.rule_count(), 3);
        assert_eq!(spec.max_depth(), 3);
        match &spec.field_set[0] {
            MappingRule::FieldSet(children) => {
                assert!(matches!(children[1], MappingRule::ForEach(_)));
            }
            _ => panic!("Expected FieldSet rule"),
        }
    }

    #[test]
    fn test_parse_actions() {
        let dsl = r#"
field_set:
  - from: price
    to: price_label
    action:
      action_type: append
      value: " EUR"
  - from: first
    to: full_name
    action:
      action_type: append
      value: "middle,last"
      value_type: var
      separator: " "
  - from: ""
    to: total
    action:
      action_type: add
      fields: fares,taxes
      key: amount
  - from: legs
    to: carriers
    action:
      action_type: flat
      strategy: list_dict
      key: carrier
      join: ","
  - from: count
    to: count
    action:
      action_type: type_cast
      to: int
"#;

        let spec = MappingDsl::parse(dsl).unwrap();
        let actions = spec.actions();
        assert_eq!(actions.len(), 5);
        assert_eq!(
            actions[1],
            &ActionSpec::Append {
                value: "middle,last".to_string(),
                value_type: ValueType::Var,
                separator: Some(" ".to_string()),
            }
        );
        assert_eq!(actions[2].name(), "sum_field_in_dict_list");
        assert!(matches!(
            actions[3],
            ActionSpec::Flat {
                strategy: FlatStrategy::ListDict,
                ..
            }
        ));
        assert_eq!(actions[4], &ActionSpec::TypeCast { to: CastType::Int });
    }

    #[test]
    fn test_empty_from_is_current_value() {
        let spec = MappingDsl::parse("field_set:\n  - from: ''\n    to: raw\n").unwrap();
        match &spec.field_set[0] {
            MappingRule::Field(field) => assert!(field.from.as_ref().unwrap().is_empty()),
            _ => panic!("Expected Field rule"),
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let dsl = r"
field_set:
  - from: a
    to: b
    action:
      action_type: teleport
";

        let err = MappingDsl::parse(dsl).unwrap_err();
        assert!(err.message.contains("teleport"), "{}", err.message);
    }

    #[test]
    fn test_for_each_with_leaf_keys_is_rejected() {
        let dsl = r"
field_set:
  - for_each:
      from: items
      to: out
      field_set: []
    to: somewhere
";

        let err = MappingDsl::parse(dsl).unwrap_err();
        assert!(err.message.contains("cannot carry other keys"), "{}", err.message);
    }

    #[test]
    fn test_unknown_field_key_is_rejected() {
        let err = MappingDsl::parse("field_set:\n  - from: a\n    to: b\n    optional: true\n")
            .unwrap_err();
        assert!(err.message.contains("optional"), "{}", err.message);
    }

    #[test]
    fn test_missing_to_is_rejected() {
        assert!(MappingDsl::parse("field_set:\n  - from: a\n").is_err());
    }

    #[test]
    fn test_invalid_yaml_reports_location() {
        let err = MappingDsl::parse("field_set: [\n").unwrap_err();
        assert!(err.message.contains("Failed to parse mapping"));
        assert!(err.line.is_some());
    }

    #[test]
    fn test_parse_json_mapping() {
        let spec = MappingDsl::parse_json(
            r#"{"field_set":[{"for_each":{"from":"items","to":"leg","field_set":[{"from":"name","to":"n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(spec.rule_count(), 2);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_literal_shape() {
        let spec = MappingSpec::new(vec![
            MappingRule::Field(FieldRule::copy("a.b", "c")),
            MappingRule::ForEach(ForEachRule {
                from: "items".into(),
                to: "out".into(),
                field_set: vec![MappingRule::Field(FieldRule::copy("x", "y"))],
                action: Some(ActionSpec::Capitalise),
            }),
        ]);

        let yaml = MappingDsl::to_yaml(&spec).unwrap();
        assert!(yaml.contains("for_each"));
        assert!(!yaml.contains("is_optional"));
        assert_eq!(MappingDsl::parse(&yaml).unwrap(), spec);
    }

    #[test]
    fn test_reserved_actions_are_not_implemented() {
        assert!(!ActionSpec::Divide.is_implemented());
        assert!(!ActionSpec::Chain {
            actions: vec![ActionSpec::Trim, ActionSpec::CustomEval]
        }
        .is_implemented());
        assert!(ActionSpec::Trim.is_implemented());
    }
}
