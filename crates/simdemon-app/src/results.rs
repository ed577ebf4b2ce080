//! Structured result consumers

use simdemon_core::prelude::*;
use simdemon_core::StructuredResult;

use crate::event::LifecycleEvent;
use crate::supervisor::LaunchStream;

/// Consume `stream` until the first closed result region.
///
/// Other events are discarded. Returns `None` if the stream ends first.
pub async fn watch_results(stream: &mut LaunchStream) -> Option<StructuredResult> {
    while let Some(event) = stream.next().await {
        match event {
            LifecycleEvent::StructuredResult { result, .. } => return Some(result),
            LifecycleEvent::Error(e) => {
                warn!("Launch failed before results arrived: {}", e);
                return None;
            }
            other => trace!("Skipping {} while waiting for results", other.name()),
        }
    }
    None
}
