//! User-interaction events that count as activity.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// An interaction that resets the idle clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerMove,
    KeyDown,
    Click,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    /// Every kind, in the order listeners are registered.
    pub const ALL: [Self; 5] = [
        Self::PointerMove,
        Self::KeyDown,
        Self::Click,
        Self::Scroll,
        Self::TouchStart,
    ];

    /// The DOM event type observed for this kind.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::PointerMove => "mousemove",
            Self::KeyDown => "keydown",
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
        }
    }
}

/// Callback invoked for each observed interaction.
pub type ActivityListener = Rc<dyn Fn(ActivityKind)>;

/// A page that reports user interactions to registered listeners.
///
/// Listeners run synchronously inside the event dispatch and must not block.
pub trait ActivitySource {
    fn add_listener(&self, kind: ActivityKind, listener: ActivityListener);
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_name() == s)
            .ok_or_else(|| format!("not an activity event: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_round_trip() {
        for kind in ActivityKind::ALL {
            assert_eq!(kind.event_name().parse::<ActivityKind>(), Ok(kind));
        }
    }

    #[test]
    fn unrelated_events_are_not_activity() {
        assert!("volumechange".parse::<ActivityKind>().is_err());
        assert!("focus".parse::<ActivityKind>().is_err());
    }
}
