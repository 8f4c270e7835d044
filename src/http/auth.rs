//! Request signing for the upstream character API.
//!
//! Every request carries the public key, a timestamp, and an MD5 digest of
//! `timestamp + private key + public key`. The private key itself never leaves the process.

// self
use crate::{_prelude::*, config::UpstreamConfig};

/// Authentication parameters attached to a single upstream request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
	/// Public API key.
	pub apikey: String,
	/// Timestamp the digest was computed for.
	pub ts: String,
	/// Lowercase hex MD5 digest.
	pub hash: String,
}
impl Signature {
	/// Sign a request issued at `now`.
	pub fn new(config: &UpstreamConfig, now: DateTime<Utc>) -> Self {
		let ts = now.timestamp().to_string();
		let hash = digest(&ts, &config.private_key, &config.public_key);

		Self { apikey: config.public_key.clone(), ts, hash }
	}

	/// Query pairs in wire order.
	pub fn into_pairs(self) -> [(&'static str, String); 3] {
		[("apikey", self.apikey), ("ts", self.ts), ("hash", self.hash)]
	}
}

/// Compute the request digest for a timestamp and key pair.
pub fn digest(ts: &str, private_key: &str, public_key: &str) -> String {
	format!("{:x}", md5::compute(format!("{ts}{private_key}{public_key}")))
}
