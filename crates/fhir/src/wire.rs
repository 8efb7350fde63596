//! Shared FHIR datatypes and the lenient field decoders used by every resource.
//!
//! Every optional field is decoded through [`lenient`] and every list through [`lenient_seq`]:
//! a value of the wrong JSON type becomes `None` / an empty list instead of an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

// ============================================================================
// Lenient decoders (internal)
// ============================================================================

/// Decode a field, falling back to `T::default()` when the stored value has the wrong shape.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Decode a list field, dropping elements that do not decode and treating a non-array as empty.
pub(crate) fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

// ============================================================================
// Datatypes
// ============================================================================

/// Human-readable XHTML summary attached to a resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Narrative {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub div: Option<String>,
}

impl Narrative {
    /// A `generated` narrative with the given XHTML.
    pub fn generated(div: impl Into<String>) -> Self {
        Self {
            status: Some("generated".into()),
            div: Some(div.into()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Meta {
    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Coding {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A concept given as codings plus free text. In stored documents `text` is the discriminator
/// that matters; codings are informational.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CodeableConcept {
    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.into()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Identifier {
    #[serde(
        rename = "use",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_type: Option<String>,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub identifier_type: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HumanName {
    #[serde(
        rename = "use",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_type: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ContactPoint {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(
        rename = "use",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Address {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Attachment {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Reference {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    pub fn to(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            display: None,
        }
    }

    pub fn display(display: impl Into<String>) -> Self {
        Self {
            reference: None,
            display: Some(display.into()),
        }
    }
}

/// A measured amount. `value` keeps the stored JSON number so integers and decimals render as
/// they were written.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Quantity {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value: Option<Number>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Period {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Annotation {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
}

impl ObservationComponent {
    /// The component's `code.text`, if any.
    pub fn label(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.text.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Participant {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub actor: Option<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ProvenanceAgent {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_type: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub who: Option<Reference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DocumentContent {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrong_typed_fields_decode_as_empty() {
        let id: Identifier = serde_json::from_value(json!({
            "system": 42,
            "value": "MH001",
            "type": "not-an-object"
        }))
        .unwrap();
        assert_eq!(id.system, None);
        assert_eq!(id.value.as_deref(), Some("MH001"));
        assert_eq!(id.identifier_type, None);
    }

    #[test]
    fn list_fields_drop_bad_elements() {
        let name: HumanName = serde_json::from_value(json!({
            "given": ["Asha", 7, "Rani"],
            "family": "Kumar"
        }))
        .unwrap();
        assert_eq!(name.given, vec!["Asha", "Rani"]);

        let scalar: HumanName = serde_json::from_value(json!({ "given": "Asha" })).unwrap();
        assert!(scalar.given.is_empty());
    }

    #[test]
    fn quantity_keeps_number_form() {
        let q: Quantity = serde_json::from_value(json!({ "value": 170.0, "unit": "cm" })).unwrap();
        assert_eq!(q.value.map(|n| n.to_string()).as_deref(), Some("170.0"));

        let q: Quantity = serde_json::from_value(json!({ "value": 70, "unit": "kg" })).unwrap();
        assert_eq!(q.value.map(|n| n.to_string()).as_deref(), Some("70"));
    }

    #[test]
    fn serialisation_omits_empty_fields() {
        let concept = CodeableConcept::from_text("Blood Group");
        assert_eq!(
            serde_json::to_value(&concept).unwrap(),
            json!({ "text": "Blood Group" })
        );
    }
}
