//! Character-catalog payload model as returned by the upstream API.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
// self
use crate::_prelude::*;

/// Envelope of a character listing response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPage {
	/// Upstream status code echoed in the body.
	#[serde(default)]
	pub code: i64,
	/// Upstream status text.
	#[serde(default)]
	pub status: String,
	/// Copyright notice.
	#[serde(default)]
	pub copyright: String,
	/// Plain-text attribution.
	#[serde(default)]
	pub attribution_text: String,
	/// HTML attribution.
	#[serde(default, rename = "attributionHTML")]
	pub attribution_html: String,
	/// Validator echoed in the body; mirrors the `ETag` header.
	#[serde(default)]
	pub etag: Option<String>,
	/// Result page.
	pub data: CharacterData,
}
impl CharacterPage {
	/// Decode a response body, classifying shape errors as malformed payloads.
	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		let value: Value = serde_json::from_slice(bytes)?;

		Self::from_value(value)
	}

	/// Decode an already-parsed JSON document.
	pub fn from_value(value: Value) -> Result<Self> {
		let data = value
			.get("data")
			.ok_or_else(|| Error::MalformedPayload("Missing 'data' object.".into()))?;

		if data.get("results").is_none_or(|results| !results.is_array()) {
			return Err(Error::MalformedPayload("Missing 'data.results' array.".into()));
		}

		serde_json::from_value(value).map_err(|err| Error::MalformedPayload(err.to_string()))
	}

	/// Characters on this page.
	pub fn characters(&self) -> &[Character] {
		&self.data.results
	}
}

/// Pagination metadata plus the page's characters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterData {
	/// Offset of the first result.
	#[serde(default)]
	pub offset: u32,
	/// Requested page size.
	#[serde(default)]
	pub limit: u32,
	/// Total number of matches upstream.
	#[serde(default)]
	pub total: u32,
	/// Number of results on this page.
	#[serde(default)]
	pub count: u32,
	/// Characters on this page.
	pub results: Vec<Character>,
}

/// A single catalog character.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Character {
	/// Upstream identifier.
	pub id: u64,
	/// Display name.
	pub name: String,
	/// Free-text description.
	pub description: String,
	/// Last modification timestamp as reported upstream.
	pub modified: Option<String>,
	/// Canonical resource URI.
	#[serde(rename = "resourceURI")]
	pub resource_uri: Option<String>,
	/// Portrait image.
	pub thumbnail: Option<Image>,
	/// Comics featuring the character.
	pub comics: ResourceList,
	/// Series featuring the character.
	pub series: ResourceList,
	/// Stories featuring the character.
	pub stories: ResourceList,
	/// Events featuring the character.
	pub events: ResourceList,
}

/// Image reference split into path and extension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
	/// Path without extension.
	pub path: String,
	/// File extension.
	pub extension: String,
}
impl Image {
	/// Full image URL.
	pub fn url(&self) -> String {
		format!("{}.{}", self.path, self.extension)
	}
}

/// Related-resource listing attached to a character.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceList {
	/// Total resources available upstream.
	pub available: u32,
	/// Resources included in `items`.
	pub returned: u32,
	/// URI of the full collection.
	#[serde(rename = "collectionURI")]
	pub collection_uri: String,
	/// Summaries included in this listing.
	pub items: Vec<ResourceSummary>,
}

/// Summary of a related resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSummary {
	/// Resource URI.
	#[serde(rename = "resourceURI")]
	pub resource_uri: String,
	/// Resource name.
	pub name: String,
	/// Story type; only present on story summaries.
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
}
