//! Tick dispatcher.
//!
//! The scheduler owns a list of recurring actions. Each tick it snapshots
//! the list, runs every snapshot member whose execution predicate holds, and
//! then prunes snapshot members whose discard predicate holds. Actions may
//! register or remove actions while running; the snapshot keeps the current
//! tick's iteration stable.

use crate::config::Cadence;
use im::Vector;
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;
use tracing::instrument;

pub type ActionId = u64;

/// A context that carries its own scheduler.
pub trait Scheduled: Sized {
    fn current_tick(&self) -> u64;
    fn scheduler(&self) -> &ActionScheduler<Self>;
    fn scheduler_mut(&mut self) -> &mut ActionScheduler<Self>;
}

type Predicate<C> = Box<dyn Fn(&C) -> bool>;
type Effect<C> = Box<dyn Fn(&mut C)>;

pub struct ScheduledAction<C> {
    id: ActionId,
    label: String,
    should_execute: Predicate<C>,
    should_discard: Predicate<C>,
    effect: Effect<C>,
}

impl<C: 'static> ScheduledAction<C> {
    /// An action that is never discarded.
    pub fn new(
        label: impl Into<String>,
        should_execute: impl Fn(&C) -> bool + 'static,
        effect: impl Fn(&mut C) + 'static,
    ) -> Self {
        Self {
            id: 0,
            label: label.into(),
            should_execute: Box::new(should_execute),
            should_discard: Box::new(|_| false),
            effect: Box::new(effect),
        }
    }

    pub fn with_discard(mut self, should_discard: impl Fn(&C) -> bool + 'static) -> Self {
        self.should_discard = Box::new(should_discard);
        self
    }
}

impl<C: Scheduled + 'static> ScheduledAction<C> {
    /// Runs on every tick matching `cadence`.
    pub fn on_cadence(
        label: impl Into<String>,
        cadence: Cadence,
        effect: impl Fn(&mut C) + 'static,
    ) -> Self {
        Self::new(label, move |ctx: &C| cadence.fires_at(ctx.current_tick()), effect)
    }
}

impl<C> ScheduledAction<C> {
    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn should_execute(&self, ctx: &C) -> bool {
        (self.should_execute)(ctx)
    }

    pub fn should_discard(&self, ctx: &C) -> bool {
        (self.should_discard)(ctx)
    }

    pub fn execute(&self, ctx: &mut C) {
        (self.effect)(ctx)
    }
}

impl<C> fmt::Debug for ScheduledAction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduledAction#{}({})", self.id, self.label)
    }
}

/// Registry of recurring actions, in registration order.
pub struct ActionScheduler<C> {
    actions: Vector<Rc<ScheduledAction<C>>>,
    next_id: ActionId,
}

impl<C> Default for ActionScheduler<C> {
    fn default() -> Self {
        Self {
            actions: Vector::new(),
            next_id: 1,
        }
    }
}

impl<C> fmt::Debug for ActionScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions.iter()).finish()
    }
}

impl<C> ActionScheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut action: ScheduledAction<C>) -> ActionId {
        let id = self.next_id;
        self.next_id += 1;
        action.id = id;
        log::trace!("Registered {:?}", action);
        self.actions.push_back(Rc::new(action));
        id
    }

    /// Remove an action from the live registry. A running tick still finishes
    /// its snapshot.
    pub fn remove(&mut self, id: ActionId) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.id != id);
        self.actions.len() != before
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.iter().any(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label()).collect()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    fn snapshot(&self) -> Vector<Rc<ScheduledAction<C>>> {
        self.actions.clone()
    }

    fn prune(&mut self, ids: &FxHashSet<ActionId>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let before = self.actions.len();
        self.actions.retain(|a| !ids.contains(&a.id));
        before - self.actions.len()
    }
}

/// Counts from one scheduler pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub executed: usize,
    pub discarded: usize,
}

/// Run one tick of `ctx`'s scheduler.
#[instrument(skip_all, name = "scheduler")]
pub fn run_tick<C: Scheduled>(ctx: &mut C) -> TickReport {
    let snapshot = ctx.scheduler().snapshot();
    let mut report = TickReport::default();

    for action in snapshot.iter() {
        if action.should_execute(ctx) {
            action.execute(ctx);
            report.executed += 1;
        }
    }

    let discard: FxHashSet<ActionId> = snapshot
        .iter()
        .filter(|a| a.should_discard(ctx))
        .map(|a| a.id)
        .collect();
    report.discarded = ctx.scheduler_mut().prune(&discard);

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        tick: u64,
        log: Vec<String>,
        scheduler: ActionScheduler<Ctx>,
    }

    impl Scheduled for Ctx {
        fn current_tick(&self) -> u64 {
            self.tick
        }
        fn scheduler(&self) -> &ActionScheduler<Self> {
            &self.scheduler
        }
        fn scheduler_mut(&mut self) -> &mut ActionScheduler<Self> {
            &mut self.scheduler
        }
    }

    fn step(ctx: &mut Ctx) -> TickReport {
        let report = run_tick(ctx);
        ctx.tick += 1;
        report
    }

    fn logger(name: &'static str) -> impl Fn(&mut Ctx) {
        move |ctx: &mut Ctx| {
            let entry = format!("{}@{}", name, ctx.tick);
            ctx.log.push(entry);
        }
    }

    #[test]
    fn test_runs_in_registration_order() {
        let mut ctx = Ctx::default();
        ctx.scheduler
            .register(ScheduledAction::new("a", |_| true, logger("a")));
        ctx.scheduler
            .register(ScheduledAction::new("b", |_| true, logger("b")));
        step(&mut ctx);
        assert_eq!(ctx.log, vec!["a@0", "b@0"]);
    }

    #[test]
    fn test_cadence_predicate() {
        let mut ctx = Ctx::default();
        ctx.scheduler
            .register(ScheduledAction::on_cadence("daily", Cadence::new(10, 3), logger("d")));
        for _ in 0..25 {
            step(&mut ctx);
        }
        assert_eq!(ctx.log, vec!["d@3", "d@13", "d@23"]);
    }

    #[test]
    fn test_discard_after_execution() {
        let mut ctx = Ctx::default();
        ctx.scheduler.register(
            ScheduledAction::new("once", |_| true, logger("once")).with_discard(|c: &Ctx| !c.log.is_empty()),
        );
        let report = step(&mut ctx);
        assert_eq!(report, TickReport { executed: 1, discarded: 1 });
        assert!(ctx.scheduler.is_empty());
        step(&mut ctx);
        assert_eq!(ctx.log, vec!["once@0"]);
    }

    #[test]
    fn test_registering_during_tick_waits_for_next_tick() {
        let mut ctx = Ctx::default();
        ctx.scheduler.register(
            ScheduledAction::new("spawner", |c: &Ctx| c.tick == 0, |c: &mut Ctx| {
                c.log.push("spawn".into());
                c.scheduler
                    .register(ScheduledAction::new("child", |_| true, logger("child")));
            }),
        );
        ctx.scheduler
            .register(ScheduledAction::new("tail", |_| true, logger("tail")));

        let report = step(&mut ctx);
        assert_eq!(report.executed, 2);
        assert_eq!(ctx.log, vec!["spawn", "tail@0"]);

        step(&mut ctx);
        assert_eq!(ctx.log, vec!["spawn", "tail@0", "tail@1", "child@1"]);
    }

    #[test]
    fn test_self_removal_does_not_skip_others() {
        let mut ctx = Ctx::default();
        ctx.scheduler
            .register(ScheduledAction::new("first", |_| true, logger("first")));
        // Gets id 2.
        ctx.scheduler.register(ScheduledAction::new("quitter", |_| true, |c: &mut Ctx| {
            c.log.push(format!("quitter@{}", c.tick));
            c.scheduler.remove(2);
        }));
        ctx.scheduler
            .register(ScheduledAction::new("last", |_| true, logger("last")));

        step(&mut ctx);
        assert_eq!(ctx.log, vec!["first@0", "quitter@0", "last@0"]);
        assert_eq!(ctx.scheduler.labels(), vec!["first", "last"]);

        step(&mut ctx);
        assert_eq!(ctx.log.len(), 5);
        assert_eq!(&ctx.log[3..], &["first@1", "last@1"]);
    }

    #[test]
    fn test_action_removed_mid_tick_still_runs_from_snapshot() {
        let mut ctx = Ctx::default();
        ctx.scheduler.register(ScheduledAction::new("killer", |_| true, |c: &mut Ctx| {
            c.scheduler.remove(2);
        }));
        ctx.scheduler
            .register(ScheduledAction::new("victim", |_| true, logger("victim")));

        step(&mut ctx);
        assert_eq!(ctx.log, vec!["victim@0"]);
        step(&mut ctx);
        assert_eq!(ctx.log, vec!["victim@0"]);
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut ctx = Ctx::default();
        let id = ctx
            .scheduler
            .register(ScheduledAction::new("a", |_| false, logger("a")));
        assert!(ctx.scheduler.contains(id));
        assert!(!ctx.scheduler.remove(id + 10));
        assert!(ctx.scheduler.remove(id));
        assert!(!ctx.scheduler.contains(id));
    }
}
