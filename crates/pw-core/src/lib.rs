//! Core engines for pagewarden.
//!
//! This crate contains the page-side logic for:
//! - Volume synchronization: one persisted volume for every media element
//! - Idle termination: closing the tab after prolonged inactivity unless the
//!   page is allow-listed
//! - The allow-list editor and base-URL normalization
//!
//! The host (DOM, tabs API, browser storage) is reached through the traits in
//! [`page`], [`store`] and [`idle`]; [`sim`] provides in-memory stand-ins.

pub mod activity;
pub mod allowlist;
mod base_url;
pub mod idle;
pub mod page;
pub mod sim;
pub mod store;
pub mod volume;

pub use activity::{ActivityKind, ActivityListener, ActivitySource};
pub use allowlist::{AddOutcome, AllowList, AllowListError, contains_base_url};
pub use base_url::{base_url, origin_of};
pub use idle::{
    HostError, IdleSettings, IdleState, IdleTrigger, TabHost, TabId, TickOutcome, UnavailablePolicy,
};
pub use page::{ElementId, Location, MediaElement, MutationRecord, Page, PageEvent};
pub use store::{
    LocalStorage, MemoryPatternStore, MemoryStorage, PatternStore, StoreError, URL_PATTERNS_KEY,
    VOLUME_KEY,
};
pub use volume::{VolumeSettings, VolumeSynchronizer, parse_volume};
