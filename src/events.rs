use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use serde::Serialize;

use crate::dataset::{Coord, DimensionKind, TrialId};
use crate::sync::SyncMode;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "field")]
pub enum StateField {
    Selection {
        dimension: String,
        kind: DimensionKind,
        value: Coord,
    },
    SyncMode {
        from: SyncMode,
        to: SyncMode,
    },
    PlotSettings,
    FilePath,
    VideoFolder,
    AudioFolder,
    FpsPlayback,
    Extra {
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorSource {
    Video,
    Plot,
    Stream,
    SeekLanded,
}

/// Notifications components exchange. Consumers depend on these only, never on
/// the concrete component that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AppEvent {
    StateChanged {
        field: StateField,
    },
    DatasetLoaded {
        trial: Option<TrialId>,
    },
    #[serde(rename_all = "camelCase")]
    LabelsUpdated {
        trial: TrialId,
        keypoint: String,
        start_frame: usize,
        end_frame: usize,
    },
    CursorMoved {
        trial: TrialId,
        time: f64,
        source: CursorSource,
    },
    PlaybackChanged {
        playing: bool,
    },
    UserMessage {
        level: MessageLevel,
        text: String,
    },
}

impl AppEvent {
    pub fn message(level: MessageLevel, text: impl Into<String>) -> Self {
        AppEvent::UserMessage {
            level,
            text: text.into(),
        }
    }

    /// True for selection changes that switch the active trial.
    pub fn is_trial_change(&self) -> bool {
        matches!(
            self,
            AppEvent::StateChanged {
                field: StateField::Selection {
                    kind: DimensionKind::Trial,
                    ..
                }
            } | AppEvent::DatasetLoaded { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&AppEvent)>;

/// Single-threaded observer registry.
///
/// Handlers run synchronously in registration order. An event emitted from
/// inside a handler is queued and delivered after the current event has
/// reached every handler, still before the outermost `emit` returns.
#[derive(Default)]
pub struct EventBus {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(SubscriptionId, Handler)>>,
    pending: RefCell<VecDeque<AppEvent>>,
    removed: RefCell<Vec<SubscriptionId>>,
    dispatching: Cell<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl FnMut(&AppEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.dispatching.get() {
            self.removed.borrow_mut().push(id);
        } else {
            self.handlers.borrow_mut().retain(|(sid, _)| *sid != id);
        }
    }

    pub fn emit(&self, event: AppEvent) {
        self.pending.borrow_mut().push_back(event);
        if self.dispatching.get() {
            return;
        }

        self.dispatching.set(true);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };

            let mut active = std::mem::take(&mut *self.handlers.borrow_mut());
            for (id, handler) in active.iter_mut() {
                if self.removed.borrow().contains(id) {
                    continue;
                }
                handler(&event);
            }

            let mut handlers = self.handlers.borrow_mut();
            let added = std::mem::take(&mut *handlers);
            *handlers = active;
            handlers.extend(added);
            let mut removed = self.removed.borrow_mut();
            handlers.retain(|(id, _)| !removed.contains(id));
            removed.clear();
        }
        self.dispatching.set(false);
    }

    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn info(text: &str) -> AppEvent {
        AppEvent::message(MessageLevel::Info, text)
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = log.clone();
            bus.subscribe(move |_| log.borrow_mut().push(tag));
        }
        bus.emit(info("x"));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn nested_emit_is_delivered_before_outer_returns() {
        let bus = Rc::new(EventBus::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let bus_inner = Rc::downgrade(&bus);
            bus.subscribe(move |event| {
                if let AppEvent::UserMessage { text, .. } = event {
                    if text == "outer" {
                        if let Some(bus) = bus_inner.upgrade() {
                            bus.emit(info("inner"));
                        }
                    }
                }
            });
        }
        {
            let seen = seen.clone();
            bus.subscribe(move |event| {
                if let AppEvent::UserMessage { text, .. } = event {
                    seen.borrow_mut().push(text.clone());
                }
            });
        }

        bus.emit(info("outer"));
        assert_eq!(*seen.borrow(), vec!["outer".to_string(), "inner".to_string()]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));
        let id = {
            let count = count.clone();
            bus.subscribe(move |_| count.set(count.get() + 1))
        };
        bus.emit(info("one"));
        bus.unsubscribe(id);
        bus.emit(info("two"));
        assert_eq!(count.get(), 1);
        assert!(bus.is_empty());
    }
}
