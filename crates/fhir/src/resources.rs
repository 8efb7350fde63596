//! Typed FHIR resources carried inside bundle entries.
//!
//! Each resource is a plain wire struct. The `resourceType` tag is not a field: it is supplied by
//! [`FhirResource::RESOURCE_TYPE`] when a resource is written into an entry and read by
//! [`Resource::from_value`] when an entry is decoded.

use crate::labels::{COMPLETION_STATUS_LABEL, UHID_SYSTEM};
use crate::wire::{
    lenient, lenient_seq, Address, Annotation, Attachment, CodeableConcept, ContactPoint,
    DocumentContent, HumanName, Identifier, Meta, Narrative, ObservationComponent, Participant,
    Period, ProvenanceAgent, Quantity, Reference,
};
use crate::FhirResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Common behaviour of typed resources.
pub trait FhirResource: Serialize + DeserializeOwned {
    /// The `resourceType` tag for this resource.
    const RESOURCE_TYPE: &'static str;

    fn narrative(&self) -> Option<&Narrative>;

    /// The narrative XHTML, if present.
    fn narrative_div(&self) -> Option<&str> {
        self.narrative().and_then(|n| n.div.as_deref())
    }

    /// Serialise to a JSON object with the `resourceType` tag set.
    fn to_value(&self) -> FhirResult<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "resourceType".into(),
                Value::String(Self::RESOURCE_TYPE.into()),
            );
        }
        Ok(value)
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<ContactPoint>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub photo: Vec<Attachment>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl Patient {
    /// Value of the last identifier issued under the hospital UHID system.
    pub fn uhid_identifier(&self) -> Option<&str> {
        self.identifier
            .iter()
            .filter(|i| i.system.as_deref() == Some(UHID_SYSTEM))
            .filter_map(|i| i.value.as_deref())
            .next_back()
    }

    /// Value of the last telecom entry with the given system (`phone`, `email`).
    pub fn last_telecom(&self, system: &str) -> Option<&str> {
        self.telecom
            .iter()
            .filter(|t| t.system.as_deref() == Some(system))
            .filter_map(|t| t.value.as_deref())
            .next_back()
    }
}

impl FhirResource for Patient {
    const RESOURCE_TYPE: &'static str = "Patient";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Practitioner {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl FhirResource for Practitioner {
    const RESOURCE_TYPE: &'static str = "Practitioner";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Appointment {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub participant: Vec<Participant>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl FhirResource for Appointment {
    const RESOURCE_TYPE: &'static str = "Appointment";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

/// An observation. Fields this crate does not model are kept in `extra` so an observation can
/// be updated in place without losing them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub effective_period: Option<Period>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<ObservationComponent>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<Annotation>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Observation {
    /// The free-text code label (`code.text`).
    pub fn code_text(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.text.as_deref())
    }

    /// Boolean of the first `Completion Status` component. `None` when there is no such
    /// component or it carries no boolean.
    pub fn completion_status(&self) -> Option<bool> {
        self.component
            .iter()
            .find(|c| c.label() == Some(COMPLETION_STATUS_LABEL))
            .and_then(|c| c.value_boolean)
    }

    /// Non-empty note texts in document order.
    pub fn note_texts(&self) -> Vec<String> {
        self.note
            .iter()
            .filter_map(|n| n.text.as_deref())
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl FhirResource for Observation {
    const RESOURCE_TYPE: &'static str = "Observation";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Provenance {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub recorded: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub activity: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub agent: Vec<ProvenanceAgent>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl Provenance {
    pub fn activity_text(&self) -> Option<&str> {
        self.activity.as_ref().and_then(|a| a.text.as_deref())
    }
}

impl FhirResource for Provenance {
    const RESOURCE_TYPE: &'static str = "Provenance";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Coverage {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub coverage_type: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<Reference>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl FhirResource for Coverage {
    const RESOURCE_TYPE: &'static str = "Coverage";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DocumentReference {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_type: Option<CodeableConcept>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<DocumentContent>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl FhirResource for DocumentReference {
    const RESOURCE_TYPE: &'static str = "DocumentReference";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Organization {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
}

impl FhirResource for Organization {
    const RESOURCE_TYPE: &'static str = "Organization";

    fn narrative(&self) -> Option<&Narrative> {
        self.text.as_ref()
    }
}

// ============================================================================
// Tagged decoding
// ============================================================================

/// A decoded entry resource, discriminated by its `resourceType` tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Patient(Patient),
    Practitioner(Practitioner),
    Appointment(Appointment),
    Observation(Observation),
    Provenance(Provenance),
    Coverage(Coverage),
    DocumentReference(DocumentReference),
    Organization(Organization),
    /// A resource type this crate does not model; carries the tag.
    Other(String),
}

impl Resource {
    /// Decode a raw entry resource.
    ///
    /// Returns `None` when the value is not an object or has no string `resourceType`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let tag = value.as_object()?.get("resourceType")?.as_str()?;
        let resource = match tag {
            Patient::RESOURCE_TYPE => Resource::Patient(decode(value)?),
            Practitioner::RESOURCE_TYPE => Resource::Practitioner(decode(value)?),
            Appointment::RESOURCE_TYPE => Resource::Appointment(decode(value)?),
            Observation::RESOURCE_TYPE => Resource::Observation(decode(value)?),
            Provenance::RESOURCE_TYPE => Resource::Provenance(decode(value)?),
            Coverage::RESOURCE_TYPE => Resource::Coverage(decode(value)?),
            DocumentReference::RESOURCE_TYPE => Resource::DocumentReference(decode(value)?),
            Organization::RESOURCE_TYPE => Resource::Organization(decode(value)?),
            other => Resource::Other(other.to_owned()),
        };
        Some(resource)
    }

    pub fn resource_type(&self) -> &str {
        match self {
            Resource::Patient(_) => Patient::RESOURCE_TYPE,
            Resource::Practitioner(_) => Practitioner::RESOURCE_TYPE,
            Resource::Appointment(_) => Appointment::RESOURCE_TYPE,
            Resource::Observation(_) => Observation::RESOURCE_TYPE,
            Resource::Provenance(_) => Provenance::RESOURCE_TYPE,
            Resource::Coverage(_) => Coverage::RESOURCE_TYPE,
            Resource::DocumentReference(_) => DocumentReference::RESOURCE_TYPE,
            Resource::Organization(_) => Organization::RESOURCE_TYPE,
            Resource::Other(tag) => tag,
        }
    }
}

fn decode<R: DeserializeOwned>(value: &Value) -> Option<R> {
    R::deserialize(value).ok()
}
