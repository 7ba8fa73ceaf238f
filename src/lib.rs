//! # Marquee
//!
//! Converging lifecycle containers for long-lived media modules.
//!
//! Marquee manages a small set of long-lived "module" processes (video
//! players, text displays, image viewers, …) whose activation must be either
//! mutually exclusive or fully concurrent depending on container policy, and
//! keeps them consistent with a desired list even as individual modules fail
//! or are added and removed concurrently by remote clients.
//!
//! ## Core Problem Solved
//!
//! Media modules are stateful external processes with minds of their own:
//!
//! - **They fail mid-command**: a player can die while being told to play
//! - **Clients mutate concurrently**: several remotes edit the same queue
//! - **Activation is a shared resource**: at most one module may own the
//!   screen at a time in a queue, while a pool runs everything at once
//! - **They finish on their own**: a song ends and the module must leave the
//!   queue without racing a client-driven removal
//!
//! The answer is a converging reconciliation engine: every mutation diffs the
//! desired state against the last settled snapshot, issues the lifecycle
//! commands concurrently, terminates and evicts whatever failed, and repeats
//! until a round completes clean. Whenever no mutation is in flight, the
//! external world matches the tracked state.
//!
//! ## Containers
//!
//! Two container flavors share the engine:
//!
//! - [`QueueContainer`](crate::core::QueueContainer) — an ordered foreground
//!   where only the head plays, with an optional background module as
//!   fallback when the foreground is empty
//! - [`PoolContainer`](crate::core::PoolContainer) — unordered membership
//!   where every member runs concurrently until removed
//!
//! ```rust,ignore
//! use marquee::core::{ModuleRegistry, QueueContainer, ReconcileLimits, UidAllocator};
//!
//! let queue = QueueContainer::new(
//!     ModuleRegistry::new(vec![text_factory, video_factory]),
//!     ModuleRegistry::new(vec![image_factory]),
//!     UidAllocator::random(),
//!     ReconcileLimits::default(),
//! );
//!
//! let uid = queue.add("video", args).await?;
//! queue.reorder(&[uid]).await;
//! ```
//!
//! ## Command surface
//!
//! Each container exposes one TCP endpoint speaking line-delimited JSON; the
//! [`dispatch`](crate::dispatch) module maps wire command names onto
//! container operations and records the mutating subset to an append-only
//! audit log.
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core container state, module contract, and the reconciliation engine.
pub mod core;
/// Configuration models for containers and audit backends.
pub mod config;
/// Builders to construct containers and dispatchers from configuration.
pub mod builders;
/// Command-name dispatch and selective audit logging.
pub mod dispatch;
/// TCP line-delimited JSON command endpoints.
pub mod service;
/// Shared utilities.
pub mod util;
