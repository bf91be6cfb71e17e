//! Randomized linearizability checking for the list.
//!
//! A scenario is an initial list plus one short script per executor. Every
//! executor owns a cursor node and runs its script on its own thread; each
//! call is stamped with a start and end tick from a shared [`LogicalClock`].
//!
//! The checker then searches for a sequential order of all recorded calls
//! that
//!
//!   - keeps each executor's calls in program order,
//!   - never puts a call before one that ended before it started,
//!   - reproduces every recorded outcome on a [`SequentialList`],
//!   - ends with the same live values the concurrent list ended with.
//!
//! Values are [`Item`]s tagged with the id of the node that first carried
//! them, so equal outcomes really are the same outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;
use rand::rngs::StdRng;

use super::sequential_list::{Key, SequentialList};
use crate::data_structures::{List, Node};
use crate::guard::Guard;

/// Monotonic tick source shared by all executors.
#[derive(Debug, Default)]
pub struct LogicalClock {
    ticks: AtomicU64,
}

/// Ticks taken immediately before and after one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst)
    }

    /// Run `f` between two ticks.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> (R, Span) {
        let start = self.tick();
        let result = f();
        let end = self.tick();
        (result, Span { start, end })
    }
}

/// A list value: the node it was created for and a small payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Item {
    pub node: u64,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    PushLeft(Item),
    PushRight(Item),
    InsertBefore(Item),
    InsertAfter(Item),
    InsertAfterIf { item: Item, expected: u32 },
    Next,
    Prev,
    Remove,
    PopRightNode,
    GetValue,
    SetValue(u32),
    CompareExchangeValue { expected: u32, new: u32 },
    SelectKnownNode(usize),
}

/// What a call returned, reduced to something both lists can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Flag(bool),
    Node(Option<u64>),
    Value(Option<Item>),
}

#[derive(Debug, Clone)]
pub struct Script {
    /// Index of the data node the cursor starts on.
    pub start_index: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub initial: Vec<Item>,
    pub scripts: Vec<Script>,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub operation: Operation,
    pub outcome: Outcome,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct History {
    pub scenario: Scenario,
    /// One entry per script, in program order.
    pub records: Vec<Vec<Recorded>>,
    pub final_items: Vec<Item>,
}

/// Shape of randomly generated scenarios.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioParams {
    pub list_size: usize,
    pub executors: usize,
    pub operations_per_executor: usize,
    pub value_range: u32,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        ScenarioParams {
            list_size: 4,
            executors: 3,
            operations_per_executor: 4,
            value_range: 3,
        }
    }
}

impl Scenario {
    pub fn random(rng: &mut StdRng, params: &ScenarioParams) -> Self {
        let mut next_node = params.list_size as u64;
        let mut fresh = |rng: &mut StdRng| {
            let item = Item {
                node: next_node,
                value: rng.random_range(0..params.value_range),
            };
            next_node += 1;
            item
        };

        let initial = (0..params.list_size as u64)
            .map(|node| Item {
                node,
                value: rng.random_range(0..params.value_range),
            })
            .collect();

        let scripts = (0..params.executors)
            .map(|_| Script {
                start_index: rng.random_range(0..params.list_size.max(1)),
                operations: (0..params.operations_per_executor)
                    .map(|_| match rng.random_range(0..13) {
                        0 => Operation::PushLeft(fresh(rng)),
                        1 => Operation::PushRight(fresh(rng)),
                        2 => Operation::InsertBefore(fresh(rng)),
                        3 => Operation::InsertAfter(fresh(rng)),
                        4 => Operation::InsertAfterIf {
                            item: fresh(rng),
                            expected: rng.random_range(0..params.value_range),
                        },
                        5 => Operation::Next,
                        6 => Operation::Prev,
                        7 => Operation::Remove,
                        8 => Operation::PopRightNode,
                        9 => Operation::GetValue,
                        10 => Operation::SetValue(rng.random_range(0..params.value_range)),
                        11 => Operation::CompareExchangeValue {
                            expected: rng.random_range(0..params.value_range),
                            new: rng.random_range(0..params.value_range),
                        },
                        _ => Operation::SelectKnownNode(rng.random_range(0..8)),
                    })
                    .collect(),
            })
            .collect();

        Scenario { initial, scripts }
    }
}

// =============================================================================
// Concurrent side
// =============================================================================

struct LiveExecutor<G: Guard> {
    list: List<Item, G>,
    cursor: Option<Node<Item, G>>,
    known: Vec<Option<Node<Item, G>>>,
}

impl<G: Guard> LiveExecutor<G> {
    fn new(list: &List<Item, G>, start_index: usize) -> Self {
        let mut cursor = list.head().next();
        for _ in 0..start_index {
            cursor = cursor.and_then(|node| node.next());
        }
        LiveExecutor {
            list: list.clone(),
            known: vec![cursor.clone()],
            cursor,
        }
    }

    fn created(&mut self, node: Option<Node<Item, G>>, item: Item) -> Outcome {
        let outcome = Outcome::Node(node.as_ref().map(|_| item.node));
        self.known.push(node);
        outcome
    }

    fn apply(&mut self, operation: &Operation) -> Outcome {
        match *operation {
            Operation::PushLeft(item) => {
                let node = self.list.push_left(item);
                self.created(Some(node), item)
            }
            Operation::PushRight(item) => {
                let node = self.list.push_right(item);
                self.created(Some(node), item)
            }
            Operation::InsertBefore(item) => match &self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let node = cursor.insert_before(item);
                    self.created(Some(node), item)
                }
            },
            Operation::InsertAfter(item) => match &self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let node = cursor.insert_after(item);
                    self.created(Some(node), item)
                }
            },
            Operation::InsertAfterIf { item, expected } => match &self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let node = cursor.insert_after_if(item, |current| current.value == expected);
                    self.created(node, item)
                }
            },
            Operation::Next => {
                self.cursor = match &self.cursor {
                    None => self.list.tail().prev(),
                    Some(cursor) => cursor.next(),
                };
                Outcome::Done
            }
            Operation::Prev => {
                self.cursor = match &self.cursor {
                    None => self.list.head().next(),
                    Some(cursor) => cursor.prev(),
                };
                Outcome::Done
            }
            Operation::Remove => {
                Outcome::Flag(self.cursor.as_ref().is_some_and(|cursor| cursor.remove()))
            }
            Operation::PopRightNode => {
                let popped = self.list.pop_right_node();
                let node = popped
                    .as_ref()
                    .map(|node| node.value().expect("popped a data node").node);
                if popped.is_some() {
                    self.known.push(popped);
                }
                Outcome::Node(node)
            }
            Operation::GetValue => Outcome::Value(
                self.cursor
                    .as_ref()
                    .map(|cursor| *cursor.value().expect("cursor is a data node")),
            ),
            Operation::SetValue(value) => {
                if let Some(cursor) = &self.cursor {
                    let node = cursor.value().expect("cursor is a data node").node;
                    cursor
                        .set_value(Item { node, value })
                        .expect("cursor is a data node");
                }
                Outcome::Done
            }
            Operation::CompareExchangeValue { expected, new } => {
                Outcome::Value(self.cursor.as_ref().map(|cursor| {
                    let (prevalent, _) = cursor
                        .compare_exchange_value_if(|current| {
                            (current.value == expected).then_some(Item {
                                node: current.node,
                                value: new,
                            })
                        })
                        .expect("cursor is a data node");
                    *prevalent
                }))
            }
            Operation::SelectKnownNode(index) => {
                self.cursor = self.known[index % self.known.len()].clone();
                Outcome::Done
            }
        }
    }
}

/// Run every script of `scenario` on its own thread against a fresh list.
pub fn run_concurrently<G>(scenario: &Scenario) -> History
where
    G: Guard + 'static,
{
    let list: List<Item, G> = scenario.initial.iter().copied().collect();
    let clock = Arc::new(LogicalClock::new());
    let barrier = Arc::new(Barrier::new(scenario.scripts.len()));

    // Cursors are placed before anything is modified.
    let executors: Vec<_> = scenario
        .scripts
        .iter()
        .map(|script| LiveExecutor::new(&list, script.start_index))
        .collect();

    let handles: Vec<_> = executors
        .into_iter()
        .zip(scenario.scripts.iter().cloned())
        .map(|(mut executor, script)| {
            let clock = Arc::clone(&clock);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                script
                    .operations
                    .into_iter()
                    .map(|operation| {
                        let (outcome, span) = clock.time(|| executor.apply(&operation));
                        Recorded {
                            operation,
                            outcome,
                            span,
                        }
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let records = handles
        .into_iter()
        .map(|handle| handle.join().expect("executor thread panicked"))
        .collect();

    History {
        scenario: scenario.clone(),
        records,
        final_items: list.to_vec(),
    }
}

// =============================================================================
// Sequential replay
// =============================================================================

#[derive(Clone)]
struct ModelExecutor {
    cursor: Option<Key>,
    known: Vec<Option<Key>>,
}

impl ModelExecutor {
    fn new(keys: &[Key], start_index: usize) -> Self {
        let cursor = keys.get(start_index).copied();
        ModelExecutor {
            cursor,
            known: vec![cursor],
        }
    }

    fn created(&mut self, key: Option<Key>, item: Item) -> Outcome {
        self.known.push(key);
        Outcome::Node(key.map(|_| item.node))
    }

    fn apply(&mut self, model: &mut SequentialList<Item>, operation: &Operation) -> Outcome {
        match *operation {
            Operation::PushLeft(item) => {
                let key = model.push_left(item);
                self.created(Some(key), item)
            }
            Operation::PushRight(item) => {
                let key = model.push_right(item);
                self.created(Some(key), item)
            }
            Operation::InsertBefore(item) => match self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let key = model.insert_before(cursor, item);
                    self.created(Some(key), item)
                }
            },
            Operation::InsertAfter(item) => match self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let key = model.insert_after(cursor, item);
                    self.created(Some(key), item)
                }
            },
            Operation::InsertAfterIf { item, expected } => match self.cursor {
                None => Outcome::Node(None),
                Some(cursor) => {
                    let key = model.insert_after_if(cursor, item, |current| {
                        current.value == expected
                    });
                    self.created(key, item)
                }
            },
            Operation::Next => {
                self.cursor = model.next(self.cursor);
                Outcome::Done
            }
            Operation::Prev => {
                self.cursor = model.prev(self.cursor);
                Outcome::Done
            }
            Operation::Remove => Outcome::Flag(self.cursor.is_some_and(|key| model.remove(key))),
            Operation::PopRightNode => {
                let popped = model.pop_right();
                if popped.is_some() {
                    self.known.push(popped);
                }
                Outcome::Node(popped.map(|key| model.value(key).node))
            }
            Operation::GetValue => Outcome::Value(self.cursor.map(|key| *model.value(key))),
            Operation::SetValue(value) => {
                if let Some(key) = self.cursor {
                    let node = model.value(key).node;
                    model.set_value(key, Item { node, value });
                }
                Outcome::Done
            }
            Operation::CompareExchangeValue { expected, new } => {
                Outcome::Value(self.cursor.map(|key| {
                    let prevalent = *model.value(key);
                    if prevalent.value == expected {
                        model.set_value(
                            key,
                            Item {
                                node: prevalent.node,
                                value: new,
                            },
                        );
                    }
                    prevalent
                }))
            }
            Operation::SelectKnownNode(index) => {
                self.cursor = self.known[index % self.known.len()];
                Outcome::Done
            }
        }
    }
}

/// A call by position: (executor, index within its script).
pub type CallRef = (usize, usize);

struct Search<'h> {
    history: &'h History,
    explored: usize,
}

impl Search<'_> {
    /// Whether `(executor, index)` may go next: no other executor has a
    /// pending call that ended before this one started.
    fn may_go_next(&self, progress: &[usize], executor: usize) -> bool {
        let start = self.history.records[executor][progress[executor]].span.start;
        progress.iter().enumerate().all(|(other, &index)| {
            other == executor
                || self.history.records[other]
                    .get(index)
                    .is_none_or(|pending| pending.span.end > start)
        })
    }

    fn explore(
        &mut self,
        model: &SequentialList<Item>,
        executors: &[ModelExecutor],
        progress: &mut Vec<usize>,
        order: &mut Vec<CallRef>,
    ) -> bool {
        let history = self.history;
        let records = &history.records;
        if progress
            .iter()
            .zip(records)
            .all(|(&index, calls)| index == calls.len())
        {
            self.explored += 1;
            return model.live_values() == history.final_items;
        }

        for executor in 0..records.len() {
            let index = progress[executor];
            if index == records[executor].len() || !self.may_go_next(progress, executor) {
                continue;
            }
            let call = &records[executor][index];

            let mut model = model.clone();
            let mut executors = executors.to_vec();
            let outcome = executors[executor].apply(&mut model, &call.operation);
            if outcome != call.outcome {
                continue;
            }

            progress[executor] += 1;
            order.push((executor, index));
            if self.explore(&model, &executors, progress, order) {
                return true;
            }
            order.pop();
            progress[executor] -= 1;
        }
        false
    }
}

/// Search for a sequential order that explains `history`.
///
/// Returns the order found, or `None` if the history is not linearizable.
pub fn find_linearization(history: &History) -> Option<Vec<CallRef>> {
    let (model, keys) = SequentialList::with_values(history.scenario.initial.iter().copied());
    let executors: Vec<_> = history
        .scenario
        .scripts
        .iter()
        .map(|script| ModelExecutor::new(&keys, script.start_index))
        .collect();

    let mut search = Search {
        history,
        explored: 0,
    };
    let mut progress = vec![0; history.records.len()];
    let mut order = Vec::new();
    let found = search.explore(&model, &executors, &mut progress, &mut order);
    log::debug!(
        "linearization search explored {} complete orders, found: {}",
        search.explored,
        found
    );
    found.then_some(order)
}

/// Run `iterations` random scenarios and check each one.
///
/// Panics with the offending history on the first violation.
pub fn check_random_histories<G>(rng: &mut StdRng, params: &ScenarioParams, iterations: usize)
where
    G: Guard + 'static,
{
    for iteration in 0..iterations {
        let scenario = Scenario::random(rng, params);
        let history = run_concurrently::<G>(&scenario);
        if find_linearization(&history).is_none() {
            panic!(
                "iteration {}: history is not linearizable\n{:#?}",
                iteration, history
            );
        }
    }
}
