//! Thin async-runtime abstraction so `BridgeState`'s throttled flush timer
//! doesn't hard-depend on either executor. Mirrors the `async-io`/`tokio`
//! feature split the rest of the crate's dependency stack already carries.

use std::future::Future;
use std::time::Duration;

/// Runs `fut` to completion without blocking the caller, on a dedicated
/// thread driven by `async-io`'s portable reactor.
#[cfg(feature = "async-io")]
pub fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    std::thread::spawn(move || async_io::block_on(fut));
}

#[cfg(all(feature = "tokio", not(feature = "async-io")))]
pub fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

#[cfg(not(any(feature = "async-io", feature = "tokio")))]
pub fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    futures_util::future::FutureExt::now_or_never(fut);
}

/// Runs `f` after `delay` elapses, detached from the caller.
#[cfg(feature = "async-io")]
pub fn spawn_delayed(delay: Duration, f: impl FnOnce() + Send + 'static) {
    blocking::unblock(move || {
        std::thread::sleep(delay);
        f();
    })
    .detach();
}

#[cfg(all(feature = "tokio", not(feature = "async-io")))]
pub fn spawn_delayed(delay: Duration, f: impl FnOnce() + Send + 'static) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    });
}

#[cfg(not(any(feature = "async-io", feature = "tokio")))]
pub fn spawn_delayed(_delay: Duration, f: impl FnOnce() + Send + 'static) {
    f();
}
