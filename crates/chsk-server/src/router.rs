// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drains the receive queue sequentially and isolates handler failures from
//! the loop itself (§4.7).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::event_msg::EventMsg;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Starts the router loop on the current Tokio runtime and returns a
/// `stop()` closure that signals the loop to exit at the next opportunity.
///
/// Dispatch is strictly sequential: handlers that need parallelism spawn
/// their own workers rather than relying on the router to do it for them.
pub fn start_router<F, Fut>(
    mut recv: mpsc::Receiver<EventMsg>,
    handler: F,
    on_error: Option<Arc<dyn Fn(&HandlerError) + Send + Sync>>,
) -> impl FnOnce() + Send + Sync
where
    F: Fn(EventMsg) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_task = stop.clone();
    tokio::spawn(async move {
        while let Some(msg) = recv.recv().await {
            if stop_for_task.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = handler(msg).await {
                match &on_error {
                    Some(on_error) => on_error(&e),
                    None => error!(error = %e, "router handler failed"),
                }
            }
        }
    });
    move || stop.store(true, Ordering::Relaxed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    use chsk_core::{Event, Uid};

    #[tokio::test]
    async fn dispatches_every_message_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_task = seen.clone();
        let _stop = start_router(
            rx,
            move |_msg| {
                let seen = seen_task.clone();
                async move {
                    seen.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            },
            None,
        );
        for _ in 0..3 {
            tx.send(EventMsg { event: Event::new("app/x"), uid: Uid::Nil, client_id: "c".into(), reply: None })
                .await
                .unwrap();
        }
        drop(tx);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn handler_error_does_not_stop_the_loop() {
        let (tx, rx) = mpsc::channel(8);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_task = seen.clone();
        let _stop = start_router(
            rx,
            move |_msg| {
                let seen = seen_task.clone();
                async move {
                    let n = seen.fetch_add(1, Ordering::Relaxed);
                    if n == 0 {
                        return Err("boom".into());
                    }
                    Ok(())
                }
            },
            None,
        );
        for _ in 0..2 {
            tx.send(EventMsg { event: Event::new("app/x"), uid: Uid::Nil, client_id: "c".into(), reply: None })
                .await
                .unwrap();
        }
        drop(tx);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }
}
