//! Right-to-left composition of synchronous and asynchronous steps.
//!
//! A [`Step`] turns an input into a future of `Result<Output, Error>`.
//! Synchronous functions are lifted with [`sync_step`], functions returning a
//! future with [`async_step`]. [`compose`] (or the [`compose!`](crate::compose)
//! macro for more than two steps) runs the right-most step first and feeds each
//! resolved value leftwards; the first error short-circuits the chain.

use std::future::Future;
use std::marker::PhantomData;

use futures::future::{self, BoxFuture, FutureExt};

pub trait Step<I: Send + 'static>: Send + Sync {
    type Output: Send + 'static;
    type Error: Send + 'static;

    fn apply(&self, input: I) -> BoxFuture<'_, Result<Self::Output, Self::Error>>;
}

/// A step backed by a plain function.
pub struct SyncStep<F, I> {
    function: F,
    _input: PhantomData<fn(I)>,
}

/// A step backed by a function returning a future.
pub struct AsyncStep<F, I> {
    function: F,
    _input: PhantomData<fn(I)>,
}

/// Runs `inner`, then `outer` on its result.
pub struct Composed<F, G> {
    outer: F,
    inner: G,
}

pub fn sync_step<F, I, O, E>(function: F) -> SyncStep<F, I>
where
    F: Fn(I) -> Result<O, E> + Send + Sync,
{
    SyncStep {
        function,
        _input: PhantomData,
    }
}

pub fn async_step<F, I, Fut, O, E>(function: F) -> AsyncStep<F, I>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    AsyncStep {
        function,
        _input: PhantomData,
    }
}

/// `compose(outer, inner)` applies `inner` first.
pub fn compose<F, G>(outer: F, inner: G) -> Composed<F, G> {
    Composed { outer, inner }
}

impl<F, I, O, E> Step<I> for SyncStep<F, I>
where
    F: Fn(I) -> Result<O, E> + Send + Sync,
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, input: I) -> BoxFuture<'_, Result<O, E>> {
        future::ready((self.function)(input)).boxed()
    }
}

impl<F, I, Fut, O, E> Step<I> for AsyncStep<F, I>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, input: I) -> BoxFuture<'_, Result<O, E>> {
        (self.function)(input).boxed()
    }
}

impl<F, G, I> Step<I> for Composed<F, G>
where
    I: Send + 'static,
    G: Step<I>,
    F: Step<G::Output, Error = G::Error>,
{
    type Output = F::Output;
    type Error = G::Error;

    fn apply(&self, input: I) -> BoxFuture<'_, Result<F::Output, G::Error>> {
        async move {
            let intermediate = self.inner.apply(input).await?;
            self.outer.apply(intermediate).await
        }
        .boxed()
    }
}

/// Composes any number of steps right to left: `compose!(c, b, a)` runs
/// `a`, then `b`, then `c`.
#[macro_export]
macro_rules! compose {
    ($step:expr $(,)?) => {
        $step
    };
    ($outer:expr, $($rest:expr),+ $(,)?) => {
        $crate::util::compose::compose($outer, $crate::compose!($($rest),+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::{Arc, Mutex};

    #[test]
    fn inner_step_runs_before_outer() {
        let double = sync_step(|value: i64| Ok::<_, String>(value * 2));
        let increment = async_step(|value: i64| async move { Ok::<_, String>(value + 1) });

        // compose(f, g)(x) == f(g(x))
        let pipeline = compose(double, increment);
        assert_eq!(block_on(pipeline.apply(3)), Ok(8));
    }

    #[test]
    fn macro_chains_steps_in_declaration_order_reversed() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let trace = Arc::clone(&trace);
            sync_step(move |value: String| {
                trace.lock().unwrap().push(label);
                Ok::<_, String>(format!("{value}{label}"))
            })
        };

        let pipeline = crate::compose!(record("c"), record("b"), record("a"));
        assert_eq!(block_on(pipeline.apply(String::new())), Ok("abc".to_string()));
        assert_eq!(*trace.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failure_short_circuits_remaining_steps() {
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);
        let outer = sync_step(move |value: i64| {
            *flag.lock().unwrap() = true;
            Ok::<_, String>(value)
        });
        let failing =
            async_step(|_: i64| async { Err::<i64, _>("store unavailable".to_string()) });

        let result = block_on(compose(outer, failing).apply(1));
        assert_eq!(result, Err("store unavailable".to_string()));
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn composed_pipeline_is_reusable() {
        let pipeline = compose(
            sync_step(|text: String| Ok::<_, ()>(text.len())),
            async_step(|text: &'static str| async move { Ok::<_, ()>(text.to_uppercase()) }),
        );
        assert_eq!(block_on(pipeline.apply("abc")), Ok(3));
        assert_eq!(block_on(pipeline.apply("hello")), Ok(5));
    }
}
