//! Aggregate progress across all layers of a pull or push

use std::collections::HashMap;

use crate::error::Result;
use crate::update::{ImageProgressUpdateEvent, UpdateListener};

const PULL_STATUS_KEYS: &[&str] = &["Downloading", "Extracting"];
const PUSH_STATUS_KEYS: &[&str] = &["Pushing"];
const COMPLETE_STATUSES: &[&str] = &["Pull complete", "Already exists", "Pushed", "Layer already exists"];

/// Overall completion of an image transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalProgressEvent {
    percent: u8,
}

impl TotalProgressEvent {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
        }
    }

    /// Completion between 0 and 100
    pub fn percent(&self) -> u8 {
        self.percent
    }
}

#[derive(Debug)]
struct LayerProgress {
    by_status: HashMap<&'static str, u8>,
}

impl LayerProgress {
    fn new(keys: &'static [&'static str]) -> Self {
        Self {
            by_status: keys.iter().map(|key| (*key, 0)).collect(),
        }
    }

    fn update<E: ImageProgressUpdateEvent>(&mut self, event: &E) {
        let Some(status) = event.status() else {
            return;
        };
        if COMPLETE_STATUSES.contains(&status) {
            self.finish();
            return;
        }
        let percent = event.progress_detail().and_then(|detail| detail.percent());
        if let (Some(current), Some(percent)) = (self.by_status.get_mut(status), percent) {
            *current = (*current).max(percent);
        }
    }

    fn finish(&mut self) {
        self.by_status.values_mut().for_each(|value| *value = 100);
    }

    fn percent(&self) -> u32 {
        let total: u32 = self.by_status.values().map(|value| *value as u32).sum();
        total / self.by_status.len() as u32
    }
}

/// Listener turning per-layer events into [`TotalProgressEvent`]s
pub struct TotalProgressListener<F> {
    keys: &'static [&'static str],
    layers: HashMap<String, LayerProgress>,
    consumer: F,
}

impl<F: FnMut(TotalProgressEvent)> TotalProgressListener<F> {
    /// Tracks the `Downloading` and `Extracting` phases of a pull
    pub fn pull(consumer: F) -> Self {
        Self::new(PULL_STATUS_KEYS, consumer)
    }

    /// Tracks the `Pushing` phase of a push
    pub fn push(consumer: F) -> Self {
        Self::new(PUSH_STATUS_KEYS, consumer)
    }

    fn new(keys: &'static [&'static str], consumer: F) -> Self {
        Self {
            keys,
            layers: HashMap::new(),
            consumer,
        }
    }

    fn percent(&self) -> u8 {
        if self.layers.is_empty() {
            return 0;
        }
        let total: u32 = self.layers.values().map(LayerProgress::percent).sum();
        (total / self.layers.len() as u32).min(100) as u8
    }
}

impl<E, F> UpdateListener<E> for TotalProgressListener<F>
where
    E: ImageProgressUpdateEvent,
    F: FnMut(TotalProgressEvent),
{
    fn on_start(&mut self) {
        (self.consumer)(TotalProgressEvent::new(0));
    }

    fn on_update(&mut self, event: &E) -> Result<()> {
        if let Some(id) = event.id() {
            let keys = self.keys;
            self.layers
                .entry(id.to_string())
                .or_insert_with(|| LayerProgress::new(keys))
                .update(event);
        }
        let percent = self.percent();
        (self.consumer)(TotalProgressEvent::new(percent));
        Ok(())
    }

    fn on_finish(&mut self) {
        self.layers.values_mut().for_each(LayerProgress::finish);
        (self.consumer)(TotalProgressEvent::new(100));
    }
}
