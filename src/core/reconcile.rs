//! The reconciliation engine: diff desired against settled state and drive
//! module activation to match.

use std::collections::HashSet;

use futures::future::join_all;
use parking_lot::RwLock;

use crate::core::error::ModuleError;
use crate::core::module::ModuleHandle;
use crate::core::uid::Uid;

/// Which activation shape a container converges toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Exactly one on-top item: the head of the foreground order if any,
    /// otherwise the background. Everything else is suspended.
    ExclusiveTop,
    /// Every member active at once; nothing is ever suspended.
    AllActive,
}

/// Bounds on the terminate-and-retry failure loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileLimits {
    /// After this many failed rounds every remaining desired handle is
    /// terminated and evicted. `None` retries until clean.
    pub max_rounds: Option<u32>,
}

/// Lifecycle command issued to a module during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleOp {
    Remove,
    Suspend,
    Play,
}

/// Desired state plus the settled snapshot of the last converged round.
///
/// Pool containers leave `background` permanently `None`; the all-active
/// policy never reads it.
#[derive(Default)]
pub(crate) struct ContainerState {
    pub foreground: Vec<ModuleHandle>,
    pub background: Option<ModuleHandle>,
    pub settled_foreground: Vec<ModuleHandle>,
    pub settled_background: Option<ModuleHandle>,
}

impl ContainerState {
    /// Compute one round's actions: removals, then suspensions, then plays.
    fn plan(&self, policy: ActivationPolicy) -> Vec<(ModuleHandle, LifecycleOp)> {
        let desired: HashSet<&Uid> = self.foreground.iter().map(|h| &h.uid).collect();

        let mut actions = Vec::new();
        for handle in &self.settled_foreground {
            if !desired.contains(&handle.uid) && handle.instance.alive() {
                actions.push((handle.clone(), LifecycleOp::Remove));
            }
        }
        if let Some(old_bg) = &self.settled_background {
            let displaced = self
                .background
                .as_ref()
                .map_or(true, |bg| bg.uid != old_bg.uid);
            if displaced && old_bg.instance.alive() {
                actions.push((old_bg.clone(), LifecycleOp::Remove));
            }
        }

        match policy {
            ActivationPolicy::ExclusiveTop => {
                for handle in self.foreground.iter().skip(1) {
                    if handle.instance.is_on_top() {
                        actions.push((handle.clone(), LifecycleOp::Suspend));
                    }
                }
                if let Some(bg) = &self.background {
                    if !self.foreground.is_empty() && bg.instance.is_on_top() {
                        actions.push((bg.clone(), LifecycleOp::Suspend));
                    }
                }
                let target = self.foreground.first().or(self.background.as_ref());
                if let Some(top) = target {
                    if !top.instance.is_on_top() {
                        actions.push((top.clone(), LifecycleOp::Play));
                    }
                }
            }
            ActivationPolicy::AllActive => {
                for handle in &self.foreground {
                    if !handle.instance.is_on_top() {
                        actions.push((handle.clone(), LifecycleOp::Play));
                    }
                }
            }
        }
        actions
    }

    /// Commit the settled snapshot to the current desired state.
    fn commit(&mut self) {
        self.settled_foreground = self.foreground.clone();
        self.settled_background = self.background.clone();
    }

    /// Drop the given uids from desired state, wherever they reside.
    fn evict_uids(&mut self, uids: &HashSet<Uid>) {
        self.foreground.retain(|h| !uids.contains(&h.uid));
        if self
            .background
            .as_ref()
            .is_some_and(|bg| uids.contains(&bg.uid))
        {
            self.background = None;
        }
    }
}

async fn run_op(handle: &ModuleHandle, op: LifecycleOp) -> Result<(), ModuleError> {
    match op {
        LifecycleOp::Remove => handle.instance.remove().await,
        LifecycleOp::Suspend => handle.instance.suspend().await,
        LifecycleOp::Play => handle.instance.play().await,
    }
}

/// Drive module activation to match desired state, retrying until a round
/// completes with zero failures.
///
/// The settled snapshot is committed before the batch runs: actions may take
/// arbitrarily long and later diffs must be computed against the desired
/// state as of this round, not a stale one. Handles whose action failed are
/// terminated, evicted from desired state, and the diff is recomputed until
/// fixed point. The caller must hold the container's mutation gate.
pub(crate) async fn converge(
    state: &RwLock<ContainerState>,
    policy: ActivationPolicy,
    limits: ReconcileLimits,
) {
    let mut failed_rounds: u32 = 0;
    loop {
        let actions = {
            let mut guard = state.write();
            let actions = guard.plan(policy);
            guard.commit();
            actions
        };
        if actions.is_empty() {
            return;
        }
        tracing::debug!(actions = actions.len(), "reconciliation round");

        // The plan is ordered remove, suspend, play, and join_all first-polls
        // in vector order, so a play is never issued ahead of the removals
        // and suspensions that make room for it.
        let results = join_all(actions.iter().map(|(handle, op)| run_op(handle, *op))).await;

        let failed: Vec<&ModuleHandle> = actions
            .iter()
            .zip(&results)
            .filter_map(|((handle, op), result)| match result {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(uid = %handle.uid, ?op, error = %e, "module action failed");
                    Some(handle)
                }
            })
            .collect();

        if failed.is_empty() {
            return;
        }

        for handle in &failed {
            handle.instance.terminate();
        }
        let evicted: HashSet<Uid> = failed.iter().map(|h| h.uid.clone()).collect();
        state.write().evict_uids(&evicted);

        failed_rounds += 1;
        if limits.max_rounds.is_some_and(|cap| failed_rounds >= cap) {
            force_clear(state);
            return;
        }
    }
}

/// Terminate and evict everything still desired; the container converges
/// empty. Reached only when the configured round cap is exhausted.
fn force_clear(state: &RwLock<ContainerState>) {
    let mut guard = state.write();
    tracing::error!(
        remaining = guard.foreground.len(),
        "round cap exhausted, force-evicting all handles"
    );
    for handle in &guard.foreground {
        handle.instance.terminate();
    }
    if let Some(bg) = &guard.background {
        bg.instance.terminate();
    }
    guard.foreground.clear();
    guard.background = None;
    guard.commit();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::core::module::Module;

    struct StubModule {
        kind: &'static str,
        alive: AtomicBool,
        on_top: AtomicBool,
    }

    impl StubModule {
        fn handle(uid: &str, alive: bool, on_top: bool) -> ModuleHandle {
            ModuleHandle {
                uid: Uid::from(uid),
                instance: Arc::new(Self {
                    kind: "stub",
                    alive: AtomicBool::new(alive),
                    on_top: AtomicBool::new(on_top),
                }),
            }
        }
    }

    #[async_trait]
    impl Module for StubModule {
        fn kind(&self) -> &str {
            self.kind
        }
        fn alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        fn is_on_top(&self) -> bool {
            self.on_top.load(Ordering::SeqCst)
        }
        async fn play(&self) -> Result<(), ModuleError> {
            self.on_top.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn suspend(&self) -> Result<(), ModuleError> {
            self.on_top.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn remove(&self) -> Result<(), ModuleError> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn terminate(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
        async fn tell(&self, _cmd: &str, _args: Value) -> Result<Value, ModuleError> {
            Ok(Value::Null)
        }
        fn read_parameters(&self, _names: &[String]) -> Map<String, Value> {
            Map::new()
        }
    }

    #[test]
    fn exclusive_top_orders_removals_before_suspends_before_play() {
        let gone = StubModule::handle("gone", true, true);
        let head = StubModule::handle("head", true, false);
        let tail = StubModule::handle("tail", true, true);
        let state = ContainerState {
            foreground: vec![head.clone(), tail.clone()],
            background: None,
            settled_foreground: vec![gone.clone(), head, tail],
            settled_background: None,
        };

        let ops: Vec<(String, LifecycleOp)> = state
            .plan(ActivationPolicy::ExclusiveTop)
            .into_iter()
            .map(|(h, op)| (h.uid.to_string(), op))
            .collect();

        assert_eq!(
            ops,
            vec![
                ("gone".to_owned(), LifecycleOp::Remove),
                ("tail".to_owned(), LifecycleOp::Suspend),
                ("head".to_owned(), LifecycleOp::Play),
            ]
        );
    }

    #[test]
    fn dead_departures_are_not_removed() {
        let dead = StubModule::handle("dead", false, false);
        let state = ContainerState {
            foreground: Vec::new(),
            background: None,
            settled_foreground: vec![dead],
            settled_background: None,
        };
        assert!(state.plan(ActivationPolicy::ExclusiveTop).is_empty());
    }

    #[test]
    fn background_plays_only_when_foreground_empty() {
        let bg = StubModule::handle("bg", true, false);
        let state = ContainerState {
            foreground: Vec::new(),
            background: Some(bg.clone()),
            settled_foreground: Vec::new(),
            settled_background: Some(bg),
        };
        let ops = state.plan(ActivationPolicy::ExclusiveTop);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].1, LifecycleOp::Play);
        assert_eq!(ops[0].0.uid.as_str(), "bg");
    }

    #[test]
    fn occupied_foreground_suspends_background() {
        let fg = StubModule::handle("fg", true, true);
        let bg = StubModule::handle("bg", true, true);
        let state = ContainerState {
            foreground: vec![fg.clone()],
            background: Some(bg.clone()),
            settled_foreground: vec![fg],
            settled_background: Some(bg),
        };
        let ops = state.plan(ActivationPolicy::ExclusiveTop);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].1, LifecycleOp::Suspend);
        assert_eq!(ops[0].0.uid.as_str(), "bg");
    }

    #[test]
    fn all_active_never_suspends() {
        let a = StubModule::handle("a", true, true);
        let b = StubModule::handle("b", true, false);
        let state = ContainerState {
            foreground: vec![a.clone(), b.clone()],
            background: None,
            settled_foreground: vec![a, b],
            settled_background: None,
        };
        let ops = state.plan(ActivationPolicy::AllActive);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].1, LifecycleOp::Play);
        assert_eq!(ops[0].0.uid.as_str(), "b");
    }

    #[test]
    fn converged_state_plans_nothing() {
        let a = StubModule::handle("a", true, true);
        let b = StubModule::handle("b", true, false);
        let state = ContainerState {
            foreground: vec![a.clone(), b.clone()],
            background: None,
            settled_foreground: vec![a, b],
            settled_background: None,
        };
        assert!(state.plan(ActivationPolicy::ExclusiveTop).is_empty());
    }
}
