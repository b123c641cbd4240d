//! Volume synchronizer.
//!
//! Keeps every media element on the page at one persisted volume:
//!
//! - elements present at startup and inserted later are attached once and
//!   set to the persisted value;
//! - a user-driven change on any attached element is copied to every media
//!   element in the document and persisted;
//! - each attached element gets the persisted value re-applied on a fixed
//!   period, converging it back after players reset it.
//!
//! For a settle delay after startup the synchronizer ignores volume changes,
//! since applying the initial value to a batch of elements fires change
//! notifications of its own.
//!
//! Everything runs on a single-threaded [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::page::{ElementId, MediaElement, Page, PageEvent};
use crate::store::{LocalStorage, VOLUME_KEY};

/// Volume used when nothing valid is persisted.
pub const DEFAULT_VOLUME: f64 = 0.0;

/// Default bootstrap settle delay.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Default period between reapplications to one element.
pub const DEFAULT_REAPPLY_INTERVAL: Duration = Duration::from_secs(2);

/// Timing for a [`VolumeSynchronizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSettings {
    pub settle_delay: Duration,
    pub reapply_interval: Duration,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            reapply_interval: DEFAULT_REAPPLY_INTERVAL,
        }
    }
}

/// Parses a persisted volume, falling back to [`DEFAULT_VOLUME`] for absent,
/// unparseable or out-of-range values.
pub fn parse_volume(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|volume| (0.0..=1.0).contains(volume))
        .unwrap_or(DEFAULT_VOLUME)
}

/// Clamps a volume into `[0.0, 1.0]`; non-finite values are rejected.
fn clamp_volume(volume: f64) -> Option<f64> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}

struct Tracked<E> {
    element: E,
    reapply: JoinHandle<()>,
}

/// Synchronizes the volume of every media element of one page.
pub struct VolumeSynchronizer<P: Page, S: LocalStorage + 'static> {
    page: P,
    storage: S,
    settings: VolumeSettings,
    volume: Cell<f64>,
    bootstrapping: Cell<bool>,
    tracked: RefCell<HashMap<ElementId, Tracked<P::Element>>>,
}

impl<P: Page, S: LocalStorage + 'static> fmt::Debug for VolumeSynchronizer<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeSynchronizer")
            .field("volume", &self.volume.get())
            .field("bootstrapping", &self.bootstrapping.get())
            .field("tracked", &self.tracked.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<P: Page, S: LocalStorage + 'static> VolumeSynchronizer<P, S> {
    /// Loads the persisted volume and enters the bootstrap phase.
    ///
    /// Must be called inside a [`tokio::task::LocalSet`]; the settle timer
    /// is spawned onto it.
    pub fn initialize(page: P, storage: S, settings: VolumeSettings) -> Rc<Self> {
        let volume = parse_volume(storage.get(VOLUME_KEY).as_deref());
        info!(volume, "volume synchronizer initialized");

        let sync = Rc::new(Self {
            page,
            storage,
            settings,
            volume: Cell::new(volume),
            bootstrapping: Cell::new(true),
            tracked: RefCell::new(HashMap::new()),
        });

        let weak = Rc::downgrade(&sync);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(settings.settle_delay).await;
            if let Some(sync) = weak.upgrade() {
                sync.bootstrapping.set(false);
                debug!("bootstrap phase complete");
            }
        });

        sync
    }

    /// The most recently committed volume.
    pub fn volume(&self) -> f64 {
        self.volume.get()
    }

    /// Commits and persists a volume. Elements pick it up on their next
    /// reapplication.
    pub fn set_volume(&self, volume: f64) {
        let Some(volume) = clamp_volume(volume) else {
            warn!(volume, "ignoring non-finite volume");
            return;
        };

        self.volume.set(volume);
        if let Err(e) = self.storage.set(VOLUME_KEY, &volume.to_string()) {
            warn!(error = %e, "failed to persist volume");
        }
        debug!(volume, "volume committed");
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.bootstrapping.get()
    }

    /// Number of elements currently managed.
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    pub fn is_tracked(&self, id: ElementId) -> bool {
        self.tracked.borrow().contains_key(&id)
    }

    /// Attaches every media element at or under `root`.
    pub fn discover_and_track(self: &Rc<Self>, root: &P::Node) {
        for element in self.page.media_in(root) {
            self.attach_and_apply(element);
        }
    }

    /// Starts managing `element` (once) and sets it to the persisted volume.
    ///
    /// A detached element is left alone.
    pub fn attach_and_apply(self: &Rc<Self>, element: P::Element) {
        if !element.is_connected() {
            debug!(id = element.id(), "skipping detached element");
            return;
        }

        let id = element.id();
        if !self.is_tracked(id) {
            let reapply = self.spawn_reapply(element.clone());
            self.tracked.borrow_mut().insert(
                id,
                Tracked {
                    element: element.clone(),
                    reapply,
                },
            );
            debug!(id, "tracking media element");
        }

        element.set_volume(self.volume.get());
    }

    /// Handles one page event.
    pub fn handle_event(self: &Rc<Self>, event: PageEvent<P::Node>) {
        match event {
            PageEvent::Mutations(records) => {
                for record in records {
                    for node in &record.removed {
                        for element in self.page.media_in(node) {
                            if !element.is_connected() {
                                self.forget(element.id());
                            }
                        }
                    }
                    for node in &record.added {
                        self.discover_and_track(node);
                    }
                }
            }
            PageEvent::VolumeChange(id) => self.on_volume_change(id),
        }
    }

    /// Attaches the elements already in the document, then handles page
    /// events until the page goes away.
    pub async fn run(self: Rc<Self>, mut events: UnboundedReceiver<PageEvent<P::Node>>) {
        let body = self.page.body();
        self.discover_and_track(&body);
        let tracked = self.tracked_count();
        info!(tracked, "initial media scan complete");

        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("page event stream closed");
    }

    fn on_volume_change(&self, id: ElementId) {
        let element = self.tracked.borrow().get(&id).map(|t| t.element.clone());
        let Some(element) = element else {
            return;
        };
        if self.bootstrapping.get() {
            debug!(id, "ignoring volume change during bootstrap");
            return;
        }

        let volume = element.volume();
        if (volume - self.volume.get()).abs() < f64::EPSILON {
            return;
        }

        info!(id, volume, "propagating volume change");
        for other in self.page.media_elements() {
            other.set_volume(volume);
        }
        self.set_volume(volume);
    }

    fn forget(&self, id: ElementId) {
        let removed = self.tracked.borrow_mut().remove(&id);
        if let Some(tracked) = removed {
            tracked.reapply.abort();
            debug!(id, "stopped tracking detached element");
        }
    }

    fn spawn_reapply(self: &Rc<Self>, element: P::Element) -> JoinHandle<()> {
        let weak: Weak<Self> = Rc::downgrade(self);
        let period = self.settings.reapply_interval;

        tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(sync) = weak.upgrade() else {
                    break;
                };
                if !element.is_connected() {
                    sync.tracked.borrow_mut().remove(&element.id());
                    debug!(id = element.id(), "element detached, reapply stopped");
                    break;
                }
                element.set_volume(sync.volume.get());
            }
        })
    }
}

impl<P: Page, S: LocalStorage + 'static> Drop for VolumeSynchronizer<P, S> {
    fn drop(&mut self) {
        for (_, tracked) in self.tracked.get_mut().drain() {
            tracked.reapply.abort();
        }
    }
}
