//! Bundle and entry wire models.
//!
//! A bundle is an ordered list of entries, each wrapping one raw resource object. Entries keep
//! their resource as JSON and are decoded on demand with [`Entry::decode`], so resources this
//! crate does not model survive a read-modify-write cycle untouched.

use crate::resources::{FhirResource, Resource};
use crate::wire::{lenient, lenient_seq};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `resourceType` marker carried by every bundle document.
pub const BUNDLE_RESOURCE_TYPE: &str = "Bundle";

// ============================================================================
// Public wire types
// ============================================================================

/// A stored bundle document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType", default, deserialize_with = "lenient")]
    pub resource_type: String,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub bundle_type: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, deserialize_with = "lenient_seq")]
    pub entry: Vec<Entry>,

    /// Top-level fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One bundle entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Entry {
    #[serde(
        rename = "fullUrl",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub full_url: Option<String>,

    #[serde(default)]
    pub resource: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Bundle operations
// ============================================================================

impl Bundle {
    /// An empty `collection` bundle.
    pub fn collection() -> Self {
        Self {
            resource_type: BUNDLE_RESOURCE_TYPE.into(),
            bundle_type: Some("collection".into()),
            ..Default::default()
        }
    }

    /// Parse a bundle from JSON text.
    ///
    /// Field-level problems never fail the parse. An error is returned only when the text is
    /// not JSON or the document is not an object; the message carries the path at which
    /// decoding stopped.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] for malformed documents.
    pub fn from_json_str(text: &str) -> FhirResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        serde_path_to_error::deserialize::<_, Bundle>(&mut deserializer).map_err(|err| {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            FhirError::Translation(format!("Bundle schema mismatch at {path}: {source}"))
        })
    }

    /// Decode a bundle from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if the value is not an object.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if serialisation fails.
    pub fn to_json_pretty(&self) -> FhirResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether the document carries the `Bundle` marker.
    pub fn is_bundle(&self) -> bool {
        self.resource_type == BUNDLE_RESOURCE_TYPE
    }

    /// Decoded resources in entry order. Entries that do not decode are skipped.
    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        self.entry.iter().filter_map(Entry::decode)
    }

    /// Append a typed resource as a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if the resource cannot be serialised.
    pub fn push<R: FhirResource>(&mut self, full_url: Option<String>, resource: &R) -> FhirResult<()> {
        self.entry.push(Entry::new(full_url, resource)?);
        Ok(())
    }
}

// ============================================================================
// Entry operations
// ============================================================================

impl Entry {
    /// Wrap a typed resource in an entry.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if the resource cannot be serialised.
    pub fn new<R: FhirResource>(full_url: Option<String>, resource: &R) -> FhirResult<Self> {
        Ok(Self {
            full_url,
            resource: resource.to_value()?,
            extra: Map::new(),
        })
    }

    /// The raw `resourceType` tag, if any.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource.get("resourceType").and_then(Value::as_str)
    }

    /// The raw resource `id`, if it is a string.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource.get("id").and_then(Value::as_str)
    }

    /// The raw narrative div, if it is a string.
    pub fn narrative_div(&self) -> Option<&str> {
        self.resource
            .get("text")
            .and_then(|t| t.get("div"))
            .and_then(Value::as_str)
    }

    /// String values of every identifier on the resource.
    pub fn identifier_values(&self) -> impl Iterator<Item = &str> + '_ {
        self.resource
            .get("identifier")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|i| i.get("value").and_then(Value::as_str))
    }

    pub fn decode(&self) -> Option<Resource> {
        Resource::from_value(&self.resource)
    }

    /// Replace the wrapped resource, keeping `fullUrl`.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if the resource cannot be serialised.
    pub fn replace_resource<R: FhirResource>(&mut self, resource: &R) -> FhirResult<()> {
        self.resource = resource.to_value()?;
        Ok(())
    }
}
