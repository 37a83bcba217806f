//! Wire schema of `/.well-known/adagents.json` and its normalization.
//!
//! Documents are external input, so parsing is total: any JSON object
//! deserializes into [`RawAuthorizationDocument`] and every anomaly lands
//! in an errors or warnings bucket instead of aborting. The rules:
//!
//! - `authorized_agents` must be an array for the document to be valid;
//!   an empty array is a valid revocation of everything
//! - malformed agent entries are dropped with a schema warning, never
//!   invalidating the rest of the document
//! - `properties` and `tags` are optional; malformed parts are dropped
//!   with warnings, and top-level tags apply to every property
//! - a valid document with no usable property yields the publisher's own
//!   domain as one implicit `website` property, so publisher-level domain
//!   lookups always resolve

use serde::Deserialize;
use serde_json::Value;

use federated_index::{
    normalize_agent_url, normalize_domain, AuthorizedAgent, IdentifierType, IssueKind,
    NormalizedDocument, Property, PropertyIdentifier, PropertyType, ValidationIssue,
};

// ---------------------------------------------------------------------------
// Wire forms
// ---------------------------------------------------------------------------

/// `/.well-known/adagents.json` as published. Every field is optional and
/// shape-tolerant; unknown top-level fields are collected for warnings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuthorizationDocument {
    #[serde(rename = "$schema")]
    pub schema: Option<Value>,
    pub authorized_agents: Option<Value>,
    pub properties: Option<Value>,
    pub tags: Option<Value>,
    pub last_updated: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `/.well-known/agent.json` — the subset of an agent self-description
/// card the registry reads. Cards corroborate registry data; they never
/// grant authorization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentCard {
    pub name: Option<String>,
    pub description: Option<String>,
    pub protocol: Option<String>,
    pub capabilities: Option<Value>,
    pub skills: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AgentCard {
    /// True when the card's declared capabilities or skills mention the
    /// given surface keyword (case-insensitive substring over the card's
    /// visible text). Cards vary wildly in shape, so this is a heuristic
    /// corroboration check, not schema validation.
    pub fn advertises(&self, surface: &str) -> bool {
        let needle = surface.to_ascii_lowercase();
        self.searchable_text()
            .iter()
            .any(|text| text.to_ascii_lowercase().contains(&needle))
    }

    /// Distinct capability and skill terms the card declares, in
    /// document order.
    pub fn capability_terms(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_strings(self.capabilities.as_ref(), &mut out);
        collect_strings(self.skills.as_ref(), &mut out);
        let mut seen = std::collections::BTreeSet::new();
        out.retain(|term| seen.insert(term.clone()));
        out
    }

    fn searchable_text(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(name.clone());
        }
        if let Some(description) = &self.description {
            out.push(description.clone());
        }
        collect_strings(self.capabilities.as_ref(), &mut out);
        collect_strings(self.skills.as_ref(), &mut out);
        out
    }
}

/// Recursively pull every string out of a JSON fragment: array items,
/// object keys and values, bare strings.
fn collect_strings(value: Option<&Value>, out: &mut Vec<String>) {
    match value {
        None => {}
        Some(Value::String(s)) => out.push(s.clone()),
        Some(Value::Array(items)) => {
            for item in items {
                collect_strings(Some(item), out);
            }
        }
        Some(Value::Object(map)) => {
            for (key, item) in map {
                out.push(key.clone());
                collect_strings(Some(item), out);
            }
        }
        Some(_) => {}
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Result of normalizing a parsed document. `document` is `None` exactly
/// when `errors` is non-empty.
#[derive(Debug)]
pub struct NormalizationOutcome {
    pub document: Option<NormalizedDocument>,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Normalize a wire document published by `domain` into the strict
/// internal form.
pub fn normalize(raw: &RawAuthorizationDocument, domain: &str) -> NormalizationOutcome {
    let domain = normalize_domain(domain);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for key in raw.extra.keys() {
        warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("unknown top-level field: {key}"),
        ));
    }
    if let Some(schema) = &raw.schema {
        if !schema.is_string() {
            warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                "$schema must be a string",
            ));
        }
    }
    if let Some(last_updated) = &raw.last_updated {
        match last_updated.as_str() {
            Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => {}
            Some(s) => warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("last_updated is not an RFC 3339 timestamp: {s}"),
            )),
            None => warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                "last_updated must be a string",
            )),
        }
    }

    let doc_tags = string_list(raw.tags.as_ref(), "tags", &mut warnings);

    let agents = match &raw.authorized_agents {
        None => {
            errors.push(ValidationIssue::new(
                IssueKind::Schema,
                "missing authorized_agents",
            ));
            None
        }
        Some(Value::Array(entries)) => {
            let mut agents = Vec::new();
            for (i, entry) in entries.iter().enumerate() {
                if let Some(agent) = parse_agent_entry(i, entry, &mut warnings) {
                    agents.push(agent);
                }
            }
            Some(agents)
        }
        Some(_) => {
            errors.push(ValidationIssue::new(
                IssueKind::Schema,
                "authorized_agents must be an array",
            ));
            None
        }
    };

    let mut properties = Vec::new();
    match &raw.properties {
        None => {}
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                if let Some(property) =
                    parse_property_entry(i, entry, &domain, &doc_tags, &mut warnings)
                {
                    properties.push(property);
                }
            }
        }
        Some(_) => warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            "properties must be an array",
        )),
    }

    let Some(agents) = agents else {
        return NormalizationOutcome {
            document: None,
            errors,
            warnings,
        };
    };

    // No usable property means domain lookups against this publisher would
    // dead-end, so the publisher's own site stands in.
    if properties.is_empty() {
        properties.push(Property::new(
            &domain,
            PropertyType::Website,
            None,
            doc_tags.clone(),
            vec![PropertyIdentifier::new(
                IdentifierType::Domain,
                domain.as_str(),
            )],
        ));
    }

    match NormalizedDocument::new(agents, properties) {
        Ok(document) => NormalizationOutcome {
            document: Some(document),
            errors,
            warnings,
        },
        Err(e) => {
            errors.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("canonicalization failed: {e}"),
            ));
            NormalizationOutcome {
                document: None,
                errors,
                warnings,
            }
        }
    }
}

fn parse_agent_entry(
    idx: usize,
    entry: &Value,
    warnings: &mut Vec<ValidationIssue>,
) -> Option<AuthorizedAgent> {
    let Some(obj) = entry.as_object() else {
        warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("authorized_agents[{idx}]: not an object"),
        ));
        return None;
    };
    let Some(raw_url) = obj.get("url").and_then(Value::as_str) else {
        warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("authorized_agents[{idx}]: missing url"),
        ));
        return None;
    };
    let url = match normalize_agent_url(raw_url) {
        Ok(url) => url,
        Err(e) => {
            warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("authorized_agents[{idx}]: {e}"),
            ));
            return None;
        }
    };
    let authorized_for = match obj.get("authorized_for") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("authorized_agents[{idx}]: authorized_for must be a string"),
            ));
            None
        }
    };
    Some(AuthorizedAgent {
        url,
        authorized_for,
    })
}

fn parse_property_entry(
    idx: usize,
    entry: &Value,
    domain: &str,
    doc_tags: &[String],
    warnings: &mut Vec<ValidationIssue>,
) -> Option<Property> {
    let Some(obj) = entry.as_object() else {
        warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("properties[{idx}]: not an object"),
        ));
        return None;
    };

    let property_type = match obj.get("property_type").and_then(Value::as_str) {
        Some(raw) => {
            let parsed = PropertyType::parse(raw);
            if parsed == PropertyType::Unknown {
                warnings.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("properties[{idx}]: unknown property_type '{}'", raw.trim()),
                ));
            }
            parsed
        }
        None => {
            warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("properties[{idx}]: missing property_type"),
            ));
            return None;
        }
    };

    let name = obj.get("name").and_then(Value::as_str).map(str::to_string);

    let mut identifiers = Vec::new();
    if let Some(entries) = obj.get("identifiers").and_then(Value::as_array) {
        for (j, ident) in entries.iter().enumerate() {
            let Some(ident_obj) = ident.as_object() else {
                warnings.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("properties[{idx}].identifiers[{j}]: not an object"),
                ));
                continue;
            };
            let Some(raw_type) = ident_obj.get("type").and_then(Value::as_str) else {
                warnings.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("properties[{idx}].identifiers[{j}]: missing type"),
                ));
                continue;
            };
            let Some(identifier_type) = IdentifierType::parse(raw_type) else {
                warnings.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!(
                        "properties[{idx}].identifiers[{j}]: unknown type '{}'",
                        raw_type.trim()
                    ),
                ));
                continue;
            };
            let Some(raw_value) = ident_obj.get("value").and_then(Value::as_str) else {
                warnings.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("properties[{idx}].identifiers[{j}]: missing value"),
                ));
                continue;
            };
            let value = match identifier_type {
                IdentifierType::Domain => normalize_domain(raw_value),
                _ => raw_value.trim().to_string(),
            };
            identifiers.push(PropertyIdentifier::new(identifier_type, value));
        }
    }
    if identifiers.is_empty() {
        warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("properties[{idx}]: no usable identifiers"),
        ));
        return None;
    }

    let mut tags: Vec<String> = doc_tags.to_vec();
    tags.extend(string_list(
        obj.get("tags"),
        &format!("properties[{idx}].tags"),
        warnings,
    ));

    Some(Property::new(domain, property_type, name, tags, identifiers))
}

fn string_list(
    value: Option<&Value>,
    field: &str,
    warnings: &mut Vec<ValidationIssue>,
) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => warnings.push(ValidationIssue::new(
                        IssueKind::Schema,
                        format!("{field}[{i}]: not a string"),
                    )),
                }
            }
            out
        }
        Some(_) => {
            warnings.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("{field}: must be an array of strings"),
            ));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawAuthorizationDocument {
        serde_json::from_value(value).expect("object deserializes")
    }

    #[test]
    fn test_minimal_valid_document() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [
                    {"url": "https://agent.example.net", "authorized_for": "display"}
                ]
            })),
            "example.com",
        );
        assert!(outcome.errors.is_empty());
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.authorized_agents.len(), 1);
        assert_eq!(doc.authorized_agents[0].url, "https://agent.example.net");
        // Implicit self-property.
        assert_eq!(doc.properties.len(), 1);
        assert!(doc.properties[0].has_identifier(IdentifierType::Domain, "example.com"));
        assert_eq!(doc.properties[0].property_type, PropertyType::Website);
    }

    #[test]
    fn test_empty_agent_list_is_valid() {
        let outcome = normalize(&raw(json!({"authorized_agents": []})), "example.com");
        assert!(outcome.errors.is_empty());
        let doc = outcome.document.expect("valid");
        assert!(doc.authorized_agents.is_empty());
    }

    #[test]
    fn test_missing_authorized_agents_is_invalid() {
        let outcome = normalize(&raw(json!({"properties": []})), "example.com");
        assert!(outcome.document.is_none());
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.message.contains("missing authorized_agents")));
    }

    #[test]
    fn test_non_array_authorized_agents_is_invalid() {
        let outcome = normalize(
            &raw(json!({"authorized_agents": "https://agent.example.net"})),
            "example.com",
        );
        assert!(outcome.document.is_none());
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.message.contains("must be an array")));
    }

    #[test]
    fn test_bad_entries_dropped_with_warnings() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [
                    {"url": "https://good.example.net"},
                    {"url": "ftp://bad.example.net"},
                    {"name": "no url"},
                    "not an object"
                ]
            })),
            "example.com",
        );
        assert!(outcome.errors.is_empty(), "document stays valid");
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.authorized_agents.len(), 1);
        assert_eq!(outcome.warnings.len(), 3);
    }

    #[test]
    fn test_unknown_top_level_fields_warn() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [],
                "x_custom": true
            })),
            "example.com",
        );
        assert!(outcome.errors.is_empty());
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("unknown top-level field: x_custom")));
    }

    #[test]
    fn test_declared_properties_with_tag_union() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [{"url": "https://agent.example.net"}],
                "tags": ["network"],
                "properties": [
                    {
                        "property_type": "website",
                        "name": "Example News",
                        "identifiers": [{"type": "domain", "value": "News.Example.COM."}],
                        "tags": ["news"]
                    },
                    {
                        "property_type": "mobile_app",
                        "identifiers": [{"type": "app_bundle_id", "value": "com.example.app"}]
                    }
                ]
            })),
            "example.com",
        );
        assert!(outcome.errors.is_empty());
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.properties.len(), 2, "no implicit property when declared");

        let site = doc
            .properties
            .iter()
            .find(|p| p.property_type == PropertyType::Website)
            .unwrap();
        assert!(site.has_identifier(IdentifierType::Domain, "news.example.com"));
        assert!(site.has_tag("news"));
        assert!(site.has_tag("network"), "top-level tags apply everywhere");

        let app = doc
            .properties
            .iter()
            .find(|p| p.property_type == PropertyType::MobileApp)
            .unwrap();
        assert!(app.has_tag("network"));
        assert_eq!(app.publisher_domain, "example.com");
    }

    #[test]
    fn test_unknown_identifier_type_dropped() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [{"url": "https://agent.example.net"}],
                "properties": [
                    {
                        "property_type": "website",
                        "identifiers": [
                            {"type": "imaginary", "value": "x"},
                            {"type": "domain", "value": "example.com"}
                        ]
                    }
                ]
            })),
            "example.com",
        );
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.properties[0].identifiers.len(), 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("unknown type 'imaginary'")));
    }

    #[test]
    fn test_property_without_identifiers_falls_back_to_self() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [{"url": "https://agent.example.net"}],
                "properties": [{"property_type": "website", "identifiers": []}]
            })),
            "example.com",
        );
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.properties.len(), 1);
        assert!(doc.properties[0].has_identifier(IdentifierType::Domain, "example.com"));
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("no usable identifiers")));
    }

    #[test]
    fn test_unknown_property_type_kept_with_warning() {
        let outcome = normalize(
            &raw(json!({
                "authorized_agents": [{"url": "https://agent.example.net"}],
                "properties": [
                    {
                        "property_type": "hologram",
                        "identifiers": [{"type": "domain", "value": "example.com"}]
                    }
                ]
            })),
            "example.com",
        );
        let doc = outcome.document.expect("valid");
        assert_eq!(doc.properties[0].property_type, PropertyType::Unknown);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("unknown property_type 'hologram'")));
    }

    #[test]
    fn test_agent_card_advertises_surface() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Acme Sales Agent",
            "skills": [
                {"id": "media-buy", "description": "programmatic sales negotiation"}
            ]
        }))
        .unwrap();
        assert!(card.advertises("sales"));
        assert!(!card.advertises("signals"));
    }
}
