//! Topic-keyed publish/subscribe registry for pushing refreshed values to listeners.
//!
//! Topics are the same [`Fingerprint`]s the cache uses as keys. A broadcast copies the topic's
//! subscriber set under the map's shard lock, releases it, and then delivers to every subscriber
//! concurrently. Subscribers whose delivery fails or outlasts the delivery timeout are removed at
//! that point.

// std
use std::{
	collections::HashMap,
	fmt::{Debug, Formatter, Result as FmtResult},
	pin::Pin,
	sync::{
		Weak,
		atomic::{AtomicU64, Ordering},
	},
	task::{Context, Poll},
};
// crates.io
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future;
use tokio::{
	sync::mpsc::{self, error::TrySendError},
	time,
};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
// self
use crate::{
	_prelude::*, config::DEFAULT_DELIVERY_TIMEOUT, error::DeliveryError, fingerprint::Fingerprint,
	metrics,
};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscriber identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);
impl SubscriberId {
	/// Allocate a fresh identifier.
	pub fn allocate() -> Self {
		Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
	}

	/// Raw numeric value.
	pub fn get(self) -> u64 {
		self.0
	}
}

/// Sink that accepts pushed messages.
#[async_trait]
pub trait Subscriber<M>: Send + Sync {
	/// Stable identity used for idempotent subscribe and for removal.
	fn id(&self) -> SubscriberId;

	/// Push one message. Any error removes the subscriber from the topic.
	async fn deliver(&self, message: M) -> std::result::Result<(), DeliveryError>;
}

/// Per-broadcast delivery counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
	/// Subscribers that accepted the message.
	pub delivered: usize,
	/// Subscribers whose delivery failed and were removed.
	pub failed: usize,
}

type SubscriberSet<M> = HashMap<SubscriberId, Arc<dyn Subscriber<M>>>;

/// Maps topics to their live subscribers.
pub struct SubscriptionRegistry<M> {
	topics: DashMap<Fingerprint, SubscriberSet<M>>,
	delivery_timeout: Duration,
}
impl<M> SubscriptionRegistry<M>
where
	M: Clone + Send + 'static,
{
	/// Create an empty registry with the default delivery timeout.
	pub fn new() -> Self {
		Self::with_delivery_timeout(DEFAULT_DELIVERY_TIMEOUT)
	}

	/// Create an empty registry whose deliveries are cut off after `delivery_timeout`.
	pub fn with_delivery_timeout(delivery_timeout: Duration) -> Self {
		Self { topics: DashMap::new(), delivery_timeout }
	}

	/// Time a single subscriber gets to accept a message.
	pub fn delivery_timeout(&self) -> Duration {
		self.delivery_timeout
	}

	/// Add `subscriber` to `topic`. Returns `false` if it was already registered there.
	pub fn subscribe(&self, topic: Fingerprint, subscriber: Arc<dyn Subscriber<M>>) -> bool {
		let id = subscriber.id();
		let mut subscribers = self.topics.entry(topic.clone()).or_default();

		if subscribers.contains_key(&id) {
			return false;
		}

		subscribers.insert(id, subscriber);

		tracing::debug!(topic = %topic, subscriber = id.get(), "subscribed");

		true
	}

	/// Remove a subscriber from `topic`, deleting the topic once nobody is left.
	pub fn unsubscribe(&self, topic: &Fingerprint, id: SubscriberId) -> bool {
		let removed = self
			.topics
			.get_mut(topic)
			.map(|mut subscribers| subscribers.remove(&id).is_some())
			.unwrap_or(false);

		self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());

		if removed {
			tracing::debug!(topic = %topic, subscriber = id.get(), "unsubscribed");
		}

		removed
	}

	/// Deliver `message` to every current subscriber of `topic`.
	///
	/// A topic nobody listens to is a no-op. Failed or timed-out subscribers are unsubscribed and
	/// counted; the remaining deliveries are unaffected.
	pub async fn broadcast_if_subscribed(
		&self,
		topic: &Fingerprint,
		message: M,
	) -> BroadcastReport {
		let snapshot: Vec<Arc<dyn Subscriber<M>>> = match self.topics.get(topic) {
			Some(subscribers) => subscribers.values().cloned().collect(),
			None => return BroadcastReport::default(),
		};

		if snapshot.is_empty() {
			return BroadcastReport::default();
		}

		let timeout = self.delivery_timeout;
		let deliveries = snapshot.iter().map(|subscriber| {
			let message = message.clone();

			async move {
				let result = time::timeout(timeout, subscriber.deliver(message))
					.await
					.unwrap_or(Err(DeliveryError::TimedOut(timeout)));

				(subscriber.id(), result)
			}
		});
		let mut report = BroadcastReport::default();

		for (id, result) in future::join_all(deliveries).await {
			match result {
				Ok(()) => report.delivered += 1,
				Err(err) => {
					tracing::warn!(
						topic = %topic,
						subscriber = id.get(),
						error = %err,
						"delivery failed; removing subscriber"
					);

					self.unsubscribe(topic, id);

					report.failed += 1;
				},
			}
		}

		metrics::record_broadcast(report.delivered, report.failed);

		tracing::debug!(
			topic = %topic,
			delivered = report.delivered,
			failed = report.failed,
			"broadcast complete"
		);

		report
	}

	/// Number of subscribers on `topic`.
	pub fn subscriber_count(&self, topic: &Fingerprint) -> usize {
		self.topics.get(topic).map(|subscribers| subscribers.len()).unwrap_or(0)
	}

	/// Number of topics with at least one subscriber.
	pub fn topic_count(&self) -> usize {
		self.topics.len()
	}

	/// Whether `id` is registered on `topic`.
	pub fn is_subscribed(&self, topic: &Fingerprint, id: SubscriberId) -> bool {
		self.topics.get(topic).is_some_and(|subscribers| subscribers.contains_key(&id))
	}
}
impl<M> SubscriptionRegistry<M>
where
	M: Clone + Send + Sync + 'static,
{
	/// Register a bounded channel on `topic` and return its receiving end.
	///
	/// Dropping the returned [`Subscription`] unsubscribes it.
	pub fn subscribe_channel(
		self: &Arc<Self>,
		topic: Fingerprint,
		capacity: usize,
	) -> Subscription<M> {
		let (subscriber, receiver) = ChannelSubscriber::new(capacity);
		let id = subscriber.id();

		self.subscribe(topic.clone(), Arc::new(subscriber));

		Subscription {
			topic,
			id,
			receiver: ReceiverStream::new(receiver),
			registry: Arc::downgrade(self),
		}
	}
}
impl<M> Default for SubscriptionRegistry<M>
where
	M: Clone + Send + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<M> Debug for SubscriptionRegistry<M> {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("SubscriptionRegistry")
			.field("topics", &self.topics.len())
			.field("delivery_timeout", &self.delivery_timeout)
			.finish()
	}
}

/// Subscriber backed by a bounded `mpsc` channel.
///
/// A full buffer counts as a failed delivery: a listener that stops draining is dropped rather
/// than allowed to stall broadcasts.
#[derive(Debug)]
pub struct ChannelSubscriber<M> {
	id: SubscriberId,
	sender: mpsc::Sender<M>,
}
impl<M> ChannelSubscriber<M> {
	/// Create a subscriber and the receiver its messages arrive on. Capacity is at least one.
	pub fn new(capacity: usize) -> (Self, mpsc::Receiver<M>) {
		let (sender, receiver) = mpsc::channel(capacity.max(1));

		(Self { id: SubscriberId::allocate(), sender }, receiver)
	}
}
#[async_trait]
impl<M> Subscriber<M> for ChannelSubscriber<M>
where
	M: Send + 'static,
{
	fn id(&self) -> SubscriberId {
		self.id
	}

	async fn deliver(&self, message: M) -> std::result::Result<(), DeliveryError> {
		self.sender.try_send(message).map_err(|err| match err {
			TrySendError::Full(_) => DeliveryError::Full,
			TrySendError::Closed(_) => DeliveryError::Closed,
		})
	}
}

/// Long-lived listener on a single topic.
///
/// Yields pushed messages as a [`Stream`]; dropping it unsubscribes from the topic.
pub struct Subscription<M>
where
	M: Clone + Send + 'static,
{
	topic: Fingerprint,
	id: SubscriberId,
	receiver: ReceiverStream<M>,
	registry: Weak<SubscriptionRegistry<M>>,
}
impl<M> Subscription<M>
where
	M: Clone + Send + 'static,
{
	/// Topic this subscription listens on.
	pub fn topic(&self) -> &Fingerprint {
		&self.topic
	}

	/// Identity registered in the registry.
	pub fn id(&self) -> SubscriberId {
		self.id
	}

	/// Wait for the next message; `None` once the registry is gone.
	pub async fn recv(&mut self) -> Option<M> {
		self.receiver.next().await
	}
}
impl<M> Stream for Subscription<M>
where
	M: Clone + Send + 'static,
{
	type Item = M;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<M>> {
		Pin::new(&mut self.receiver).poll_next(cx)
	}
}
impl<M> Unpin for Subscription<M> where M: Clone + Send + 'static {}
impl<M> Drop for Subscription<M>
where
	M: Clone + Send + 'static,
{
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.unsubscribe(&self.topic, self.id);
		}
	}
}
impl<M> Debug for Subscription<M>
where
	M: Clone + Send + 'static,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Subscription").field("topic", &self.topic).field("id", &self.id).finish()
	}
}
