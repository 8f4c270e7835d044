//! Canonical request fingerprints shared by the cache and the subscription registry.
//!
//! A [`Fingerprint`] is the form-urlencoded rendering of a [`QueryParams`] set with names sorted,
//! absent values dropped and multi-valued parameters sorted. Two logically identical requests
//! therefore always map to the same cache key and the same subscription topic.

// std
use std::{
	collections::BTreeMap,
	fmt::{Display, Formatter, Result as FmtResult},
};
// crates.io
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
// self
use crate::_prelude::*;

/// Page size the upstream applies when a query leaves it unset.
pub const DEFAULT_LIMIT: u32 = 20;

const NAME: &str = "name";
const NAME_STARTS_WITH: &str = "name_starts_with";
const MODIFIED_SINCE: &str = "modified_since";
const COMICS: &str = "comics";
const SERIES: &str = "series";
const EVENTS: &str = "events";
const STORIES: &str = "stories";
const ORDER_BY: &str = "order_by";
const LIMIT: &str = "limit";
const OFFSET: &str = "offset";

/// Canonical, order-independent key derived from a request's query parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Arc<str>);
impl Fingerprint {
	/// Adopt a key previously produced by [`QueryParams::fingerprint`], e.g. one received from a
	/// transport layer.
	pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
		Self(raw.into())
	}

	/// Borrow the canonical string form.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl AsRef<str> for Fingerprint {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Conversion of a typed parameter value into its textual values.
///
/// Absent values (`None`) and empty lists yield nothing, which drops the parameter.
pub trait ParamValue {
	/// Render the value as zero or more strings.
	fn into_values(self) -> Vec<String>;
}
impl ParamValue for String {
	fn into_values(self) -> Vec<String> {
		vec![self]
	}
}
impl ParamValue for &str {
	fn into_values(self) -> Vec<String> {
		vec![self.to_owned()]
	}
}
impl ParamValue for &String {
	fn into_values(self) -> Vec<String> {
		vec![self.clone()]
	}
}
impl<T> ParamValue for Option<T>
where
	T: ParamValue,
{
	fn into_values(self) -> Vec<String> {
		self.map(ParamValue::into_values).unwrap_or_default()
	}
}
impl<T> ParamValue for Vec<T>
where
	T: ParamValue,
{
	fn into_values(self) -> Vec<String> {
		self.into_iter().flat_map(ParamValue::into_values).collect()
	}
}
impl<T> ParamValue for &[T]
where
	T: ParamValue + Clone,
{
	fn into_values(self) -> Vec<String> {
		self.iter().cloned().flat_map(ParamValue::into_values).collect()
	}
}
macro_rules! impl_numeric_param {
	($($ty:ty),+ $(,)?) => {
		$(
			impl ParamValue for $ty {
				fn into_values(self) -> Vec<String> {
					vec![self.to_string()]
				}
			}
		)+
	};
}
impl_numeric_param!(i32, i64, u16, u32, u64, usize);

/// Named, possibly multi-valued query parameters with deterministic iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
	params: BTreeMap<String, Vec<String>>,
}
impl QueryParams {
	/// Create an empty parameter set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace a parameter.
	///
	/// Empty strings are discarded, remaining values are sorted and de-duplicated, and a parameter
	/// left without values is removed altogether.
	pub fn insert(&mut self, name: impl Into<String>, value: impl ParamValue) {
		let name = name.into();
		let mut values: Vec<String> =
			value.into_values().into_iter().filter(|value| !value.is_empty()).collect();

		if values.is_empty() {
			self.params.remove(&name);

			return;
		}

		values.sort_unstable();
		values.dedup();

		self.params.insert(name, values);
	}

	/// Builder-style [`insert`](Self::insert).
	pub fn with(mut self, name: impl Into<String>, value: impl ParamValue) -> Self {
		self.insert(name, value);

		self
	}

	/// Values recorded for `name`.
	pub fn get(&self, name: &str) -> Option<&[String]> {
		self.params.get(name).map(Vec::as_slice)
	}

	/// Number of distinct parameter names.
	pub fn len(&self) -> usize {
		self.params.len()
	}

	/// Whether no parameter is set.
	pub fn is_empty(&self) -> bool {
		self.params.is_empty()
	}

	/// Iterate parameters in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
		self.params.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
	}

	/// Derive the canonical fingerprint.
	pub fn fingerprint(&self) -> Fingerprint {
		let mut serializer = form_urlencoded::Serializer::new(String::new());

		for (name, values) in &self.params {
			for value in values {
				serializer.append_pair(name, value);
			}
		}

		Fingerprint(Arc::from(serializer.finish()))
	}

	/// Parse a fingerprint back into its parameters.
	pub fn from_fingerprint(fingerprint: &Fingerprint) -> Result<Self> {
		let mut grouped = BTreeMap::<String, Vec<String>>::new();

		for (name, value) in form_urlencoded::parse(fingerprint.as_str().as_bytes()) {
			if name.is_empty() {
				return Err(Error::Validation {
					field: "fingerprint",
					reason: format!("Empty parameter name in '{fingerprint}'."),
				});
			}

			grouped.entry(name.into_owned()).or_default().push(value.into_owned());
		}

		Ok(grouped.into_iter().collect())
	}
}
impl<K, V> FromIterator<(K, V)> for QueryParams
where
	K: Into<String>,
	V: ParamValue,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		let mut params = Self::new();

		for (name, value) in iter {
			params.insert(name, value);
		}

		params
	}
}

/// Typed inbound read request against the character catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterQuery {
	/// Exact character name.
	pub name: Option<String>,
	/// Name prefix filter.
	pub name_starts_with: Option<String>,
	/// Only characters modified since this date.
	pub modified_since: Option<String>,
	/// Characters appearing in any of these comics.
	pub comics: Vec<u64>,
	/// Characters appearing in any of these series.
	pub series: Vec<u64>,
	/// Characters appearing in any of these events.
	pub events: Vec<u64>,
	/// Characters appearing in any of these stories.
	pub stories: Vec<u64>,
	/// Sort order, e.g. `name` or `-modified`.
	pub order_by: Option<String>,
	/// Page size.
	pub limit: Option<u32>,
	/// Page offset.
	pub offset: Option<u32>,
}
impl CharacterQuery {
	/// Create an unfiltered query.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the exact name filter.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Set the page size.
	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);

		self
	}

	/// Set the page offset.
	pub fn with_offset(mut self, offset: u32) -> Self {
		self.offset = Some(offset);

		self
	}

	/// Collapse the query into named parameters.
	pub fn to_params(&self) -> QueryParams {
		QueryParams::new()
			.with(NAME, self.name.as_deref())
			.with(NAME_STARTS_WITH, self.name_starts_with.as_deref())
			.with(MODIFIED_SINCE, self.modified_since.as_deref())
			.with(COMICS, self.comics.as_slice())
			.with(SERIES, self.series.as_slice())
			.with(EVENTS, self.events.as_slice())
			.with(STORIES, self.stories.as_slice())
			.with(ORDER_BY, self.order_by.as_deref())
			.with(LIMIT, self.limit)
			.with(OFFSET, self.offset)
	}

	/// Rebuild a query from named parameters.
	///
	/// Identifier lists come back sorted numerically; unknown names and unparsable numbers are
	/// rejected.
	pub fn from_params(params: &QueryParams) -> Result<Self> {
		let mut query = Self::default();

		for (name, values) in params.iter() {
			match name {
				NAME => query.name = Some(single(NAME, values)?.to_owned()),
				NAME_STARTS_WITH =>
					query.name_starts_with = Some(single(NAME_STARTS_WITH, values)?.to_owned()),
				MODIFIED_SINCE =>
					query.modified_since = Some(single(MODIFIED_SINCE, values)?.to_owned()),
				COMICS => query.comics = parse_ids(COMICS, values)?,
				SERIES => query.series = parse_ids(SERIES, values)?,
				EVENTS => query.events = parse_ids(EVENTS, values)?,
				STORIES => query.stories = parse_ids(STORIES, values)?,
				ORDER_BY => query.order_by = Some(single(ORDER_BY, values)?.to_owned()),
				LIMIT => query.limit = Some(parse_number(LIMIT, single(LIMIT, values)?)?),
				OFFSET => query.offset = Some(parse_number(OFFSET, single(OFFSET, values)?)?),
				other => {
					return Err(Error::Validation {
						field: "fingerprint",
						reason: format!("Unknown query parameter '{other}'."),
					});
				},
			}
		}

		Ok(query)
	}

	/// Canonical fingerprint of this query.
	pub fn fingerprint(&self) -> Fingerprint {
		self.canonical().to_params().fingerprint()
	}

	/// Rebuild the query a fingerprint was derived from.
	pub fn from_fingerprint(fingerprint: &Fingerprint) -> Result<Self> {
		Self::from_params(&QueryParams::from_fingerprint(fingerprint)?)
	}

	/// Normalised copy: empty strings dropped, identifier lists sorted and de-duplicated, and
	/// pagination equal to the upstream defaults (`limit` 20, `offset` 0) cleared.
	pub fn canonical(&self) -> Self {
		let mut query = self.clone();

		if query.limit == Some(DEFAULT_LIMIT) {
			query.limit = None;
		}
		if query.offset == Some(0) {
			query.offset = None;
		}

		for text in
			[&mut query.name, &mut query.name_starts_with, &mut query.modified_since, &mut query.order_by]
		{
			if text.as_deref().is_some_and(str::is_empty) {
				*text = None;
			}
		}
		for ids in [&mut query.comics, &mut query.series, &mut query.events, &mut query.stories] {
			ids.sort_unstable();
			ids.dedup();
		}

		query
	}
}

fn single<'a>(field: &'static str, values: &'a [String]) -> Result<&'a str> {
	match values {
		[value] => Ok(value),
		_ => Err(Error::Validation { field, reason: "Expected exactly one value.".into() }),
	}
}

fn parse_number<T>(field: &'static str, raw: &str) -> Result<T>
where
	T: std::str::FromStr,
	T::Err: Display,
{
	raw.parse().map_err(|err| Error::Validation { field, reason: format!("'{raw}': {err}.") })
}

fn parse_ids(field: &'static str, values: &[String]) -> Result<Vec<u64>> {
	let mut ids = values
		.iter()
		.map(|value| parse_number::<u64>(field, value))
		.collect::<Result<Vec<_>>>()?;

	ids.sort_unstable();
	ids.dedup();

	Ok(ids)
}
