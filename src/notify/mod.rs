// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write notifications.
//!
//! The decorators here forward every call to the wrapped handle and, once a
//! write has been applied, hand a description of it to an async handler.
//! Failed or rejected writes are never reported. A handler error is logged
//! and counted; the caller still gets the write's own result.
//!
//! ```
//! # use std::sync::Arc;
//! # use resilience_engine::{write_handler, Map, MapWrite, MemoryMap, NotifyWriteMap};
//! # use tokio_util::sync::CancellationToken;
//! # tokio_test_block_on(async {
//! let map = NotifyWriteMap::new(
//!     Arc::new(MemoryMap::<String, u32>::new()),
//!     write_handler(|write: MapWrite<String, u32>, _cancel| async move {
//!         println!("{write:?}");
//!         Ok(())
//!     }),
//! );
//! map.try_add("a".into(), 1, false, &CancellationToken::new()).await?;
//! # Ok::<_, resilience_engine::StorageError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod map;
pub mod set;
pub mod set_map;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics;
use crate::storage::traits::StorageError;

pub use map::{MapWrite, NotifyWriteMap};
pub use set::{NotifyWriteSet, SetWrite};
pub use set_map::{NotifyWriteSetMap, SetMapWrite};

/// Async callback receiving applied writes.
pub type WriteHandler<E> =
    Arc<dyn Fn(E, CancellationToken) -> BoxFuture<'static, Result<(), StorageError>> + Send + Sync>;

/// Box an async closure into a [`WriteHandler`].
pub fn write_handler<E, F, Fut>(f: F) -> WriteHandler<E>
where
    F: Fn(E, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StorageError>> + Send + 'static,
{
    Arc::new(move |event, cancel| f(event, cancel).boxed())
}

/// Hand `event` to `handler`. The write is already applied, so a handler
/// error is only logged.
pub(crate) async fn notify<E>(
    kind: &'static str,
    handler: &WriteHandler<E>,
    event: E,
    cancel: &CancellationToken,
) {
    let result = handler(event, cancel.clone()).await;
    metrics::record_notification(kind, result.is_ok());
    if let Err(err) = result {
        warn!(kind, error = %err, "Write handler failed, write result kept");
    }
}
