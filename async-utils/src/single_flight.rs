use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use std::future::Future;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// A memoized value computed at most once per generation.
///
/// The first caller of [`SingleFlight::get_or_run`] publishes its computation
/// as a shared future; every caller that arrives before it completes awaits
/// that same future. The completed value is cached until
/// [`SingleFlight::invalidate`] is called.
///
/// Invalidation bumps a generation counter. A computation that was already in
/// flight still resolves for the callers awaiting it, but its result is not
/// written back to the cache, and the next caller starts a fresh computation.
pub struct SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    slot: Mutex<Slot<T>>,
}

struct Slot<T>
where
    T: Clone + Send + Sync + 'static,
{
    value: Option<T>,
    in_flight: Option<Shared<BoxFuture<'static, T>>>,
    generation: u64,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                in_flight: None,
                generation: 0,
            }),
        }
    }

    /// Returns the cached value without starting a computation.
    pub fn cached(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Clears the cached value and detaches any in-flight computation.
    ///
    /// Once this returns, the next `get_or_run` runs its closure.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.value = None;
        slot.in_flight = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Returns the cached value, joins the in-flight computation, or starts
    /// `compute` if neither exists.
    pub async fn get_or_run<F, Fut>(&self, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shared, generation) = {
            let mut slot = self.lock();
            if let Some(value) = &slot.value {
                return value.clone();
            }
            let generation = slot.generation;
            match &slot.in_flight {
                Some(shared) => (shared.clone(), generation),
                None => {
                    let shared = compute().boxed().shared();
                    slot.in_flight = Some(shared.clone());
                    (shared, generation)
                }
            }
        };

        let value = shared.await;

        let mut slot = self.lock();
        if slot.generation == generation && slot.value.is_none() {
            slot.value = Some(value.clone());
            slot.in_flight = None;
        }
        value
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
