//! Retry worker draining the revalidation queue.

// self
use crate::{
	_prelude::*,
	cache::manager::CacheManager,
	config::RetryPolicy,
	fingerprint::Fingerprint,
	http::retry::{AttemptBudget, RetryExecutor},
	refresh::{
		queue::TaskQueue,
		task::{AttemptOutcome, RevalidationTask, TaskState},
	},
};

/// Executes revalidation tasks with a bounded number of attempts.
///
/// Failures stay inside the worker: they are logged and the task is abandoned, never surfaced to
/// a reader.
#[derive(Clone, Debug)]
pub struct RetryWorker {
	id: usize,
	manager: CacheManager,
	queue: TaskQueue,
	policy: RetryPolicy,
}
impl RetryWorker {
	/// Create worker `id` consuming `queue`.
	pub fn new(id: usize, manager: CacheManager, queue: TaskQueue, policy: RetryPolicy) -> Self {
		Self { id, manager, queue, policy }
	}

	/// Process tasks until the queue closes.
	pub async fn run(self) {
		tracing::debug!(worker = self.id, "retry worker started");

		while let Some(task) = self.queue.dequeue().await {
			self.execute(task).await;
		}

		tracing::debug!(worker = self.id, "retry worker stopped");
	}

	/// Drive one task to `Succeeded` or `Exhausted`.
	pub async fn execute(&self, mut task: RevalidationTask) -> TaskState {
		let mut executor = RetryExecutor::resume(&self.policy, task.attempts);
		let mut state = TaskState::Pending;

		while let AttemptBudget::Granted { attempt } = executor.begin_attempt() {
			task.attempts = attempt;

			self.transition(&task.fingerprint, &mut state, TaskState::Running);

			match self.manager.revalidate(&task).await {
				AttemptOutcome::Success(outcome) => {
					tracing::debug!(
						worker = self.id,
						fingerprint = %task.fingerprint,
						attempt,
						?outcome,
						"revalidation succeeded"
					);

					self.transition(&task.fingerprint, &mut state, TaskState::Succeeded);

					return state;
				},
				AttemptOutcome::Terminal(err) => {
					tracing::error!(
						worker = self.id,
						fingerprint = %task.fingerprint,
						attempt,
						error = %err,
						"revalidation failed permanently"
					);

					break;
				},
				AttemptOutcome::Retryable(err) =>
					if executor.can_retry() {
						tracing::warn!(
							worker = self.id,
							fingerprint = %task.fingerprint,
							attempt,
							error = %err,
							"revalidation failed; retrying"
						);

						self.transition(&task.fingerprint, &mut state, TaskState::Pending);

						executor.sleep_backoff().await;
					} else {
						tracing::error!(
							worker = self.id,
							fingerprint = %task.fingerprint,
							attempt,
							error = %err,
							"revalidation attempts exhausted"
						);
					},
			}
		}

		self.transition(&task.fingerprint, &mut state, TaskState::Exhausted);

		state
	}

	fn transition(&self, fingerprint: &Fingerprint, state: &mut TaskState, next: TaskState) {
		tracing::trace!(
			worker = self.id,
			fingerprint = %fingerprint,
			from = ?state,
			to = ?next,
			"task state"
		);

		*state = next;
	}
}
