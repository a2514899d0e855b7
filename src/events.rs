//! Typed chart events and the listener registry.

use bitchart_core::{Bar, Viewport};

/// Crosshair position resolved against the data.
#[derive(Clone, Debug, PartialEq)]
pub struct Crosshair {
    /// Content-space pixel position.
    pub x: f64,
    pub y: f64,
    /// Data-space position under the pointer.
    pub time: f64,
    pub price: f64,
    /// The nearest bar, when one resolves.
    pub bar: Option<Bar>,
}

/// Everything the chart reports to its embedder.
#[derive(Clone, Debug)]
pub enum ChartEvent {
    Ready {
        backend: String,
        device_name: String,
    },
    DataChange {
        count: usize,
    },
    ViewportChange(Viewport),
    Crosshair(Option<Crosshair>),
    Click {
        x: f64,
        y: f64,
        time: f64,
        price: f64,
    },
    Error {
        message: String,
    },
}

pub type SubscriptionId = u64;
type Listener = Box<dyn Fn(&ChartEvent) + Send>;

/// Concrete listener registry; subscription ids unsubscribe.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: SubscriptionId,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ChartEvent) + Send + 'static) -> SubscriptionId {
        self.next_id += 1;
        self.listeners.push((self.next_id, Box::new(listener)));
        self.next_id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn emit(&self, event: &ChartEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
