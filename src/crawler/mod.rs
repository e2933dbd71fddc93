//! Crawler module for paced, fail-soft page harvesting
//!
//! This module contains the core harvesting logic, including:
//! - Global request pacing shared by every worker
//! - Renewable page sessions and their HTTP implementation
//! - The task queue and the worker threads draining it
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod limiter;
mod queue;
mod session;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{worker_count, Coordinator, RunSettings};
pub use fetcher::{
    build_http_client, classify_status, HttpFetcher, HttpSession, HttpSessionFactory,
};
pub use limiter::RateLimiter;
pub use queue::{Task, TaskQueue};
pub use session::{FetchError, Page, Session, SessionFactory, SessionOptions, SessionSlot};
pub use worker::{RetryPolicy, TaskOutcome, Worker, WorkerContext, WorkerReport};
