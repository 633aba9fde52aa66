use super::test_helpers::*;
use super::*;
use crate::error::{AuthError, Error};
use crate::types::{DownloadProgress, RegistryKind, Stage, SubmitOptions};
use std::time::Duration;

mod auth;

const MOVIE: &[u8] = b"0123456789";

/// Submit `name` from a well-formed URL with default options
async fn submit_ok(manager: &PipelineManager, name: &str) -> crate::types::TaskHandle {
    manager
        .submit(
            &format!("http://files.example.com/{name}"),
            name,
            SubmitOptions::default(),
        )
        .await
        .unwrap()
}

/// Drain every event currently buffered in `rx`
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Receive events until one satisfies `pred`, panicking after five seconds
async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}
