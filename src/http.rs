//! HTTP helpers for upstream catalog retrieval and retry budgeting.

pub mod auth;
pub mod client;
pub mod retry;
