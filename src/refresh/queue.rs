//! Bounded multi-producer/multi-consumer revalidation queue.

// crates.io
use tokio::sync::{
	Mutex,
	mpsc::{self, error::TrySendError},
};
// self
use crate::{_prelude::*, refresh::task::RevalidationTask};

/// Rejected enqueue, handing the task back.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
	/// The queue is at capacity.
	#[error("Revalidation queue is full.")]
	Full(RevalidationTask),
	/// Every consumer is gone.
	#[error("Revalidation queue is closed.")]
	Closed(RevalidationTask),
}
impl From<EnqueueError> for Error {
	fn from(err: EnqueueError) -> Self {
		Self::Queue(err.to_string())
	}
}

/// Cloneable handle to a bounded task queue.
///
/// Producers never wait: [`try_enqueue`](Self::try_enqueue) fails fast when the queue is full.
/// Consumers share one receiver and take turns waiting on it.
#[derive(Clone, Debug)]
pub struct TaskQueue {
	capacity: usize,
	sender: mpsc::Sender<RevalidationTask>,
	receiver: Arc<Mutex<mpsc::Receiver<RevalidationTask>>>,
}
impl TaskQueue {
	/// Create a queue holding at most `capacity` pending tasks.
	pub fn new(capacity: usize) -> Result<Self> {
		if capacity == 0 {
			return Err(Error::Validation {
				field: "refresh.queue_capacity",
				reason: "Must be greater than zero.".into(),
			});
		}

		let (sender, receiver) = mpsc::channel(capacity);

		Ok(Self { capacity, sender, receiver: Arc::new(Mutex::new(receiver)) })
	}

	/// Enqueue without waiting.
	pub fn try_enqueue(&self, task: RevalidationTask) -> std::result::Result<(), EnqueueError> {
		self.sender.try_send(task).map_err(|err| match err {
			TrySendError::Full(task) => EnqueueError::Full(task),
			TrySendError::Closed(task) => EnqueueError::Closed(task),
		})
	}

	/// Wait for the next task.
	pub async fn dequeue(&self) -> Option<RevalidationTask> {
		self.receiver.lock().await.recv().await
	}

	/// Tasks currently waiting.
	pub fn len(&self) -> usize {
		self.capacity - self.sender.capacity()
	}

	/// Whether no task is waiting.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Maximum number of waiting tasks.
	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
