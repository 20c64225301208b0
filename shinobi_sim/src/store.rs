// The state store: the one current `GameState` snapshot plus observers.
//
// `update` runs a reducer against the current snapshot. A reducer signals
// "no change" by handing back the very same `Arc`; anything else becomes the
// new snapshot and is published to every subscriber before `update`
// returns. A failing reducer leaves the snapshot untouched.
//
// Subscribers register a projection of the state and are called only when
// the projected value changes under `ShallowEq`: primitives by value,
// `Arc`s by pointer, tuples and options field-wise. There is deliberately no
// deep comparison; reducers keep untouched collections pointer-identical, so
// pointer equality is exact for "did this collection change".
//
// The store is single-threaded. Subscribers cannot reach back into the store
// (the borrow checker forbids it); reacting to a change means queuing a
// reducer elsewhere, which is what the engine's effects do.

use crate::error::SimResult;
use crate::state::GameState;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub type SubscriptionId = u64;

/// Cheap equality for change detection.
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

impl<T: ?Sized> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! shallow_eq_by_value {
    ($($t:ty),*) => {
        $(impl ShallowEq for $t {
            fn shallow_eq(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

shallow_eq_by_value!(u8, u16, u32, u64, usize, i32, i64, f64, bool, char, String);

impl<T: ShallowEq> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.shallow_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<A: ShallowEq, B: ShallowEq> ShallowEq for (A, B) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0.shallow_eq(&other.0) && self.1.shallow_eq(&other.1)
    }
}

impl<A: ShallowEq, B: ShallowEq, C: ShallowEq> ShallowEq for (A, B, C) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0.shallow_eq(&other.0) && self.1.shallow_eq(&other.1) && self.2.shallow_eq(&other.2)
    }
}

struct Subscriber {
    id: SubscriptionId,
    notify: Box<dyn FnMut(&GameState)>,
}

pub struct Store {
    state: Arc<GameState>,
    subscribers: Vec<Subscriber>,
    next_subscription: SubscriptionId,
}

impl Store {
    pub fn new(state: GameState) -> Self {
        Self {
            state: Arc::new(state),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The current snapshot. Stays pointer-stable until the next accepted
    /// update.
    pub fn get(&self) -> Arc<GameState> {
        Arc::clone(&self.state)
    }

    /// Apply `reducer` to the current snapshot. Returns whether a new
    /// snapshot was accepted (and published).
    pub fn update<R>(&mut self, reducer: R) -> SimResult<bool>
    where
        R: FnOnce(&Arc<GameState>) -> SimResult<Arc<GameState>>,
    {
        let next = reducer(&self.state)?;
        if Arc::ptr_eq(&next, &self.state) {
            return Ok(false);
        }
        self.state = next;
        for subscriber in &mut self.subscribers {
            (subscriber.notify)(&self.state);
        }
        Ok(true)
    }

    /// Call `on_change` whenever `projection` of the state changes. The
    /// current value is the baseline; the callback does not fire for it.
    pub fn subscribe<P, F, C>(&mut self, projection: F, mut on_change: C) -> SubscriptionId
    where
        P: ShallowEq + 'static,
        F: Fn(&GameState) -> P + 'static,
        C: FnMut(&P) + 'static,
    {
        let mut last = projection(&self.state);
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            notify: Box::new(move |state: &GameState| {
                let next = projection(state);
                if !next.shallow_eq(&last) {
                    on_change(&next);
                    last = next;
                }
            }),
        });
        id
    }

    /// Keep the latest value of `projection` readable through a handle.
    pub fn watch<P, F>(&mut self, projection: F) -> Watch<P>
    where
        P: ShallowEq + Clone + 'static,
        F: Fn(&GameState) -> P + 'static,
    {
        let value = Rc::new(RefCell::new(projection(&self.state)));
        let sink = Rc::clone(&value);
        let id = self.subscribe(projection, move |next: &P| {
            *sink.borrow_mut() = next.clone();
        });
        Watch { id, value }
    }

    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Latest value of a projection, updated by the store on change.
pub struct Watch<P> {
    id: SubscriptionId,
    value: Rc<RefCell<P>>,
}

impl<P: Clone> Watch<P> {
    pub fn get(&self) -> P {
        self.value.borrow().clone()
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}
