//! Retry budgeting for background revalidations.

// crates.io
use tokio::time;
// self
use crate::{_prelude::*, config::RetryPolicy};

/// Result of budgeting a retry attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptBudget {
	/// Another attempt is permitted.
	Granted {
		/// One-based attempt number.
		attempt: u32,
	},
	/// Attempt budget exhausted; no further attempts allowed.
	Exhausted,
}

/// Counts attempts against a [`RetryPolicy`] and computes backoff between them.
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	attempts_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Create a new executor respecting the supplied retry policy.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, attempts_used: 0 }
	}

	/// Resume counting from attempts already spent (e.g. recorded on a task).
	pub fn resume(policy: &'a RetryPolicy, attempts_used: u32) -> Self {
		Self { policy, attempts_used }
	}

	/// Reserve the next attempt, or report exhaustion.
	pub fn begin_attempt(&mut self) -> AttemptBudget {
		if !self.can_retry() {
			return AttemptBudget::Exhausted;
		}

		self.attempts_used = self.attempts_used.saturating_add(1);

		AttemptBudget::Granted { attempt: self.attempts_used }
	}

	/// Whether another attempt is permitted under the policy.
	pub fn can_retry(&self) -> bool {
		self.attempts_used < self.policy.max_attempts
	}

	/// Number of attempts that have already been consumed.
	pub fn attempts_used(&self) -> u32 {
		self.attempts_used
	}

	/// Backoff to wait before the next attempt, `None` once the budget is spent.
	pub fn next_backoff(&self) -> Option<Duration> {
		if !self.can_retry() {
			tracing::debug!(attempt = self.attempts_used, "retry budget exhausted");

			return None;
		}

		let delay = self.policy.compute_backoff(self.attempts_used.saturating_sub(1));

		tracing::debug!(attempt = self.attempts_used, ?delay, "retry backoff computed");

		Some(delay)
	}

	/// Sleep for the computed backoff window if retrying is permitted.
	pub async fn sleep_backoff(&self) {
		if let Some(delay) = self.next_backoff()
			&& !delay.is_zero()
		{
			time::sleep(delay).await;
		}
	}
}
