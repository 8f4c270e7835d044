//! Revalidation task model and per-attempt outcomes.

// self
use crate::{
	_prelude::*,
	fingerprint::{CharacterQuery, Fingerprint},
};

/// Request to revalidate one cached fingerprint.
#[derive(Clone, Debug, PartialEq)]
pub struct RevalidationTask {
	/// Cache key and subscription topic.
	pub fingerprint: Fingerprint,
	/// Query replayed against the upstream.
	pub query: CharacterQuery,
	/// Attempts already made.
	pub attempts: u32,
}
impl RevalidationTask {
	/// Derive a task from a cache key.
	pub fn from_fingerprint(fingerprint: Fingerprint) -> Result<Self> {
		let query = CharacterQuery::from_fingerprint(&fingerprint)?;

		Ok(Self { fingerprint, query, attempts: 0 })
	}

	/// Derive a task from an inbound query.
	pub fn from_query(query: &CharacterQuery) -> Self {
		let query = query.canonical();

		Self { fingerprint: query.fingerprint(), query, attempts: 0 }
	}
}

/// Lifecycle of a [`RevalidationTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
	/// Waiting for an attempt.
	Pending,
	/// An attempt is in flight.
	Running,
	/// Upstream answered; the cache is current.
	Succeeded,
	/// Given up after a terminal failure or the last allowed attempt.
	Exhausted,
}

/// What a successful revalidation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevalidationOutcome {
	/// Content unchanged; nothing stored or broadcast.
	NotModified,
	/// Fresh content stored and broadcast.
	Updated {
		/// Subscribers that received the update.
		delivered: usize,
		/// Subscribers dropped because delivery failed.
		failed: usize,
	},
}

/// Result of a single revalidation attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
	/// The attempt completed.
	Success(RevalidationOutcome),
	/// The attempt failed and may be retried.
	Retryable(Error),
	/// The attempt failed in a way retrying cannot fix.
	Terminal(Error),
}
impl AttemptOutcome {
	/// Classify an upstream error.
	pub fn from_error(err: Error) -> Self {
		if err.is_retryable() { Self::Retryable(err) } else { Self::Terminal(err) }
	}
}
