//! Idle action trigger.
//!
//! A poll loop compares the time since the last user interaction with the
//! inactivity threshold. Once the page is idle, every tick checks the
//! allow-list and, unless the page is exempt, closes the active tab. Nothing
//! latches: the tab close is retried on every idle tick until activity
//! resumes or there is no tab left to close.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityKind, ActivitySource};
use crate::allowlist::contains_base_url;
use crate::page::Location;
use crate::store::PatternStore;

/// Default inactivity threshold (5 minutes).
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Default poll interval (1 second).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Browser tab identifier.
pub type TabId = u64;

/// Tabs API errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("tab query failed: {0}")]
    Query(String),
    #[error("failed to close tab {tab}: {reason}")]
    Close { tab: TabId, reason: String },
}

/// The browser tabs API, as seen from the current window.
pub trait TabHost {
    /// The active tab of the current window, if any.
    fn active_tab(&self) -> impl Future<Output = Result<Option<TabId>, HostError>>;

    fn close_tab(&self, tab: TabId) -> impl Future<Output = Result<(), HostError>>;
}

impl<T: TabHost + ?Sized> TabHost for Rc<T> {
    fn active_tab(&self) -> impl Future<Output = Result<Option<TabId>, HostError>> {
        (**self).active_tab()
    }

    fn close_tab(&self, tab: TabId) -> impl Future<Output = Result<(), HostError>> {
        (**self).close_tab(tab)
    }
}

/// What an allow-list check resolves to when the pattern store cannot be
/// read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Treat the page as exempt; the tab stays open.
    #[default]
    Spare,
    /// Treat the page as not exempt; the tab is closed.
    Terminate,
}

impl UnavailablePolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spare => "spare",
            Self::Terminate => "terminate",
        }
    }

    const fn excludes(self) -> bool {
        matches!(self, Self::Spare)
    }
}

impl fmt::Display for UnavailablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnavailablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spare" => Ok(Self::Spare),
            "terminate" => Ok(Self::Terminate),
            _ => Err(format!("invalid store-unavailable policy: {s}")),
        }
    }
}

/// Timing and failure policy for an [`IdleTrigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    pub threshold: Duration,
    pub poll_interval: Duration,
    pub on_store_unavailable: UnavailablePolicy,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_INACTIVITY_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            on_store_unavailable: UnavailablePolicy::default(),
        }
    }
}

/// Logical state of the trigger at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Active,
    IdleChecking,
}

/// What a single poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Activity is recent; nothing checked.
    Active,
    /// Idle, but the page is on the allow-list.
    Excluded,
    /// Idle and not exempt; the tab was closed.
    Terminated(TabId),
    /// Idle and not exempt, but no active tab was found.
    NoActiveTab,
    /// Idle and not exempt; the tabs API failed.
    TerminateFailed,
}

/// Closes the active tab after prolonged inactivity unless the page is
/// allow-listed.
pub struct IdleTrigger<L, S, H> {
    location: L,
    store: S,
    host: H,
    settings: IdleSettings,
    last_activity: Rc<Cell<Instant>>,
}

impl<L, S, H> fmt::Debug for IdleTrigger<L, S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleTrigger")
            .field("settings", &self.settings)
            .field("last_activity", &self.last_activity.get())
            .finish_non_exhaustive()
    }
}

impl<L: Location, S: PatternStore, H: TabHost> IdleTrigger<L, S, H> {
    /// Creates a trigger whose idle clock starts now.
    pub fn new(location: L, store: S, host: H, settings: IdleSettings) -> Self {
        Self {
            location,
            store,
            host,
            settings,
            last_activity: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub const fn settings(&self) -> &IdleSettings {
        &self.settings
    }

    /// Records a user interaction. Never blocks or awaits.
    pub fn record_activity(&self, kind: ActivityKind) {
        touch(&self.last_activity, kind);
    }

    /// Registers a listener for every [`ActivityKind`] on `source`, so each
    /// interaction resets the idle clock.
    pub fn observe<A: ActivitySource + ?Sized>(&self, source: &A) {
        for kind in ActivityKind::ALL {
            let last_activity = Rc::clone(&self.last_activity);
            source.add_listener(kind, Rc::new(move |kind| touch(&last_activity, kind)));
        }
        debug!("activity listeners registered");
    }

    /// Time since the last recorded interaction.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.get().elapsed()
    }

    pub fn state(&self) -> IdleState {
        if self.idle_for() >= self.settings.threshold {
            IdleState::IdleChecking
        } else {
            IdleState::Active
        }
    }

    /// Whether `url` (default: the current page URL) is exempt from
    /// termination.
    ///
    /// A page is exempt when its base URL is on the allow-list. If the list
    /// cannot be read the answer comes from the configured
    /// [`UnavailablePolicy`].
    pub async fn is_excluded(&self, url: Option<&str>) -> bool {
        let url = url.map_or_else(|| self.location.href(), str::to_string);

        match self.store.load_patterns().await {
            Ok(patterns) => {
                let excluded = contains_base_url(&patterns, &url);
                debug!(%url, excluded, "allow-list check");
                excluded
            }
            Err(e) => {
                let policy = self.settings.on_store_unavailable;
                warn!(error = %e, %policy, "allow-list unavailable");
                policy.excludes()
            }
        }
    }

    /// Runs one poll evaluation.
    pub async fn tick(&self) -> TickOutcome {
        if self.state() == IdleState::Active {
            return TickOutcome::Active;
        }

        if self.is_excluded(None).await {
            debug!("page idle but allow-listed");
            return TickOutcome::Excluded;
        }

        info!(
            idle_secs = self.idle_for().as_secs(),
            "page inactive, closing tab"
        );
        self.terminate().await
    }

    /// Closes the active tab of the current window. Failures are logged,
    /// never returned.
    pub async fn terminate(&self) -> TickOutcome {
        let tab = match self.host.active_tab().await {
            Ok(Some(tab)) => tab,
            Ok(None) => {
                warn!("no active tab to close");
                return TickOutcome::NoActiveTab;
            }
            Err(e) => {
                warn!(error = %e, "failed to query active tab");
                return TickOutcome::TerminateFailed;
            }
        };

        match self.host.close_tab(tab).await {
            Ok(()) => {
                info!(tab, "tab closed");
                TickOutcome::Terminated(tab)
            }
            Err(e) => {
                warn!(error = %e, "failed to close tab");
                TickOutcome::TerminateFailed
            }
        }
    }

    /// Polls forever.
    pub async fn run(&self) {
        self.run_with(|_| {}).await;
    }

    /// Polls forever, handing every tick outcome to `on_tick`.
    pub async fn run_with<F: FnMut(TickOutcome)>(&self, mut on_tick: F) {
        let period = self.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = self.tick().await;
            if outcome != TickOutcome::Active {
                debug!(?outcome, "idle tick");
            }
            on_tick(outcome);
        }
    }
}

fn touch(last_activity: &Cell<Instant>, kind: ActivityKind) {
    trace!(%kind, "activity");
    last_activity.set(Instant::now());
}
