//! In-memory page and browser.
//!
//! [`SimPage`] is a minimal document tree that behaves like the DOM where the
//! engines can observe it: media elements fire a volume change only when
//! their value actually changes while attached, and structural changes under
//! the body are reported as mutation batches. [`SimBrowser`] stands in for the
//! tabs API. Both back `pw simulate` and the engine tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::activity::{ActivityKind, ActivityListener, ActivitySource};
use crate::idle::{HostError, TabHost, TabId};
use crate::page::{ElementId, Location, MediaElement, MutationRecord, Page, PageEvent};

/// Index of a node in a [`SimPage`].
pub type NodeId = usize;

const BODY: NodeId = 0;

/// Tags treated as media elements.
const MEDIA_TAGS: &[&str] = &["video", "audio"];

/// Volume a freshly created media element starts with.
const INITIAL_VOLUME: f64 = 1.0;

#[derive(Debug)]
struct NodeData {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    volume: f64,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            parent: None,
            children: Vec::new(),
            volume: INITIAL_VOLUME,
        }
    }

    fn is_media(&self) -> bool {
        MEDIA_TAGS.contains(&self.tag.as_str())
    }
}

#[derive(Default)]
struct Listeners(Vec<(ActivityKind, ActivityListener)>);

impl Listeners {
    fn matching(&self, kind: ActivityKind) -> Vec<ActivityListener> {
        self.0
            .iter()
            .filter(|(registered, _)| *registered == kind)
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} listeners", self.0.len())
    }
}

#[derive(Debug)]
struct PageState {
    url: String,
    nodes: Vec<NodeData>,
    listeners: Listeners,
}

impl PageState {
    /// Whether `node` is `ancestor` or nested under it.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn is_connected(&self, mut node: NodeId) -> bool {
        loop {
            if node == BODY {
                return true;
            }
            match self.nodes[node].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn collect_media(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.nodes[node].is_media() {
            out.push(node);
        }
        for &child in &self.nodes[node].children {
            self.collect_media(child, out);
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|&child| child != node);
        }
    }
}

/// A simulated document. Clones share the same tree.
#[derive(Debug, Clone)]
pub struct SimPage {
    state: Rc<RefCell<PageState>>,
    events: UnboundedSender<PageEvent<NodeId>>,
}

impl SimPage {
    /// Creates an empty page and the receiving end of its event stream.
    pub fn new(url: impl Into<String>) -> (Self, UnboundedReceiver<PageEvent<NodeId>>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = PageState {
            url: url.into(),
            nodes: vec![NodeData::new("body")],
            listeners: Listeners::default(),
        };
        let page = Self {
            state: Rc::new(RefCell::new(state)),
            events,
        };
        (page, rx)
    }

    /// Changes the URL without reloading, as single-page apps do.
    pub fn navigate(&self, url: impl Into<String>) {
        self.state.borrow_mut().url = url.into();
    }

    /// Creates a detached node.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        state.nodes.push(NodeData::new(tag));
        state.nodes.len() - 1
    }

    /// Appends `child` under `parent`, moving it if it is already attached.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.append_children(parent, &[child]);
    }

    /// Appends several nodes under `parent` and reports them as one
    /// mutation batch.
    ///
    /// Like the DOM, a node cannot be inserted under itself or one of its
    /// descendants, and the body cannot be moved; such children are skipped.
    pub fn append_children(&self, parent: NodeId, children: &[NodeId]) {
        let mut records = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            for &child in children {
                if child == BODY || state.is_inclusive_ancestor(child, parent) {
                    warn!(parent, child, "hierarchy request rejected");
                    continue;
                }
                if state.nodes[child].parent.is_some() {
                    let was_connected = state.is_connected(child);
                    state.detach(child);
                    if was_connected {
                        records.push(MutationRecord::removed(vec![child]));
                    }
                }
                state.nodes[child].parent = Some(parent);
                state.nodes[parent].children.push(child);
                if state.is_connected(parent) {
                    records.push(MutationRecord::added(vec![child]));
                }
            }
        }
        self.emit_mutations(records);
    }

    /// Detaches `node` (and its subtree) from the document.
    pub fn remove(&self, node: NodeId) {
        let was_connected = {
            let mut state = self.state.borrow_mut();
            let was_connected = state.nodes[node].parent.is_some() && state.is_connected(node);
            state.detach(node);
            was_connected
        };
        if was_connected {
            self.emit_mutations(vec![MutationRecord::removed(vec![node])]);
        }
    }

    /// Creates a media element and appends it under `parent`.
    pub fn add_media(&self, parent: NodeId, tag: &str) -> SimElement {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        SimElement {
            page: self.clone(),
            node,
        }
    }

    /// Returns the media element for `node`, if it is one.
    pub fn element(&self, node: NodeId) -> Option<SimElement> {
        let is_media = self.state.borrow().nodes.get(node)?.is_media();
        is_media.then(|| SimElement {
            page: self.clone(),
            node,
        })
    }

    /// Dispatches a user interaction to the listeners registered for it.
    pub fn interact(&self, kind: ActivityKind) {
        let listeners = self.state.borrow().listeners.matching(kind);
        for listener in listeners {
            listener(kind);
        }
    }

    fn emit_mutations(&self, records: Vec<MutationRecord<NodeId>>) {
        if records.is_empty() {
            return;
        }
        // Nobody is observing once the receiver is gone.
        let _ = self.events.send(PageEvent::Mutations(records));
    }

    fn elements(&self, nodes: Vec<NodeId>) -> Vec<SimElement> {
        nodes
            .into_iter()
            .map(|node| SimElement {
                page: self.clone(),
                node,
            })
            .collect()
    }
}

impl ActivitySource for SimPage {
    fn add_listener(&self, kind: ActivityKind, listener: ActivityListener) {
        self.state.borrow_mut().listeners.0.push((kind, listener));
    }
}

impl Location for SimPage {
    fn href(&self) -> String {
        self.state.borrow().url.clone()
    }
}

impl Page for SimPage {
    type Element = SimElement;
    type Node = NodeId;

    fn body(&self) -> NodeId {
        BODY
    }

    fn media_elements(&self) -> Vec<SimElement> {
        self.media_in(&BODY)
    }

    fn media_in(&self, node: &NodeId) -> Vec<SimElement> {
        let mut found = Vec::new();
        self.state.borrow().collect_media(*node, &mut found);
        self.elements(found)
    }
}

/// A media element of a [`SimPage`].
#[derive(Debug, Clone)]
pub struct SimElement {
    page: SimPage,
    node: NodeId,
}

impl SimElement {
    pub const fn node(&self) -> NodeId {
        self.node
    }
}

impl MediaElement for SimElement {
    fn id(&self) -> ElementId {
        self.node as ElementId
    }

    fn volume(&self) -> f64 {
        self.page.state.borrow().nodes[self.node].volume
    }

    fn set_volume(&self, volume: f64) {
        let fire = {
            let mut state = self.page.state.borrow_mut();
            let changed = (state.nodes[self.node].volume - volume).abs() > f64::EPSILON;
            state.nodes[self.node].volume = volume;
            changed && state.is_connected(self.node)
        };
        if fire {
            let _ = self.page.events.send(PageEvent::VolumeChange(self.id()));
        }
    }

    fn is_connected(&self) -> bool {
        self.page.state.borrow().is_connected(self.node)
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    tabs: Vec<TabId>,
    active: Option<TabId>,
    closed: Vec<TabId>,
    close_attempts: usize,
    failing: bool,
}

/// A simulated browser window. Clones share the same tabs.
#[derive(Debug, Clone, Default)]
pub struct SimBrowser {
    state: Rc<RefCell<BrowserState>>,
}

impl SimBrowser {
    /// A window with a single active tab.
    pub fn with_active_tab(tab: TabId) -> Self {
        let browser = Self::default();
        browser.open_tab(tab);
        browser
    }

    /// Opens a tab and makes it active.
    pub fn open_tab(&self, tab: TabId) {
        let mut state = self.state.borrow_mut();
        state.tabs.push(tab);
        state.active = Some(tab);
    }

    /// Makes every tabs API call fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn active(&self) -> Option<TabId> {
        self.state.borrow().active
    }

    pub fn closed_tabs(&self) -> Vec<TabId> {
        self.state.borrow().closed.clone()
    }

    /// Number of close requests issued, successful or not.
    pub fn close_attempts(&self) -> usize {
        self.state.borrow().close_attempts
    }
}

impl TabHost for SimBrowser {
    async fn active_tab(&self) -> Result<Option<TabId>, HostError> {
        let state = self.state.borrow();
        if state.failing {
            return Err(HostError::Query("tabs API unavailable".to_string()));
        }
        Ok(state.active)
    }

    async fn close_tab(&self, tab: TabId) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.close_attempts += 1;
        if state.failing {
            return Err(HostError::Close {
                tab,
                reason: "tabs API unavailable".to_string(),
            });
        }
        let Some(position) = state.tabs.iter().position(|&open| open == tab) else {
            return Err(HostError::Close {
                tab,
                reason: "no such tab".to_string(),
            });
        };
        state.tabs.remove(position);
        state.closed.push(tab);
        // The closed tab hosted this page; nothing is active from its view.
        if state.active == Some(tab) {
            state.active = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut UnboundedReceiver<PageEvent<NodeId>>) -> Vec<PageEvent<NodeId>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn media_queries_follow_document_order() {
        let (page, _rx) = SimPage::new("https://example.com");
        let first = page.add_media(page.body(), "video");
        let wrapper = page.create_element("div");
        let nested = page.create_element("audio");
        page.append_child(wrapper, nested);
        page.append_child(page.body(), wrapper);
        let last = page.add_media(page.body(), "VIDEO");

        let ids: Vec<_> = page.media_elements().iter().map(MediaElement::id).collect();
        assert_eq!(ids, vec![first.id(), nested as ElementId, last.id()]);
        assert_eq!(page.media_in(&wrapper).len(), 1);
    }

    #[test]
    fn only_connected_changes_are_reported() {
        let (page, mut rx) = SimPage::new("https://example.com");
        let detached = page.create_element("video");
        let wrapper = page.create_element("div");
        page.append_child(wrapper, detached);
        assert!(drain(&mut rx).is_empty());

        page.element(detached).unwrap().set_volume(0.2);
        assert!(drain(&mut rx).is_empty());

        page.append_child(page.body(), wrapper);
        let events = drain(&mut rx);
        let [PageEvent::Mutations(records)] = events.as_slice() else {
            panic!("expected one mutation batch, got {events:?}");
        };
        assert_eq!(records[0].added, vec![wrapper]);
    }

    #[test]
    fn volume_change_fires_only_when_value_changes() {
        let (page, mut rx) = SimPage::new("https://example.com");
        let video = page.add_media(page.body(), "video");
        drain(&mut rx);

        video.set_volume(INITIAL_VOLUME);
        assert!(drain(&mut rx).is_empty());

        video.set_volume(0.3);
        let events = drain(&mut rx);
        let [PageEvent::VolumeChange(id)] = events.as_slice() else {
            panic!("expected one volume change, got {events:?}");
        };
        assert_eq!(*id, video.id());
    }

    #[test]
    fn removing_reports_and_disconnects_subtree() {
        let (page, mut rx) = SimPage::new("https://example.com");
        let wrapper = page.create_element("section");
        page.append_child(page.body(), wrapper);
        let video = page.add_media(wrapper, "video");
        drain(&mut rx);

        page.remove(wrapper);

        assert!(!video.is_connected());
        assert!(page.media_elements().is_empty());
        let events = drain(&mut rx);
        let [PageEvent::Mutations(records)] = events.as_slice() else {
            panic!("expected one mutation batch, got {events:?}");
        };
        assert_eq!(records[0].removed, vec![wrapper]);
    }

    #[test]
    fn inserting_a_node_under_itself_is_rejected() {
        let (page, mut rx) = SimPage::new("https://example.com");
        let outer = page.create_element("div");
        let inner = page.create_element("div");
        page.append_child(outer, inner);
        page.append_child(page.body(), outer);
        drain(&mut rx);

        page.append_child(inner, outer);
        page.append_child(outer, outer);
        page.append_child(inner, page.body());

        assert!(drain(&mut rx).is_empty());
        let video = page.add_media(inner, "video");
        assert!(video.is_connected());
        assert_eq!(page.media_elements().len(), 1);
    }

    #[test]
    fn interactions_reach_matching_listeners_only() {
        let (page, _rx) = SimPage::new("https://example.com");
        let seen: Rc<RefCell<Vec<ActivityKind>>> = Rc::default();
        for kind in [ActivityKind::Click, ActivityKind::Scroll] {
            let seen = Rc::clone(&seen);
            let listener: ActivityListener = Rc::new(move |kind| seen.borrow_mut().push(kind));
            page.add_listener(kind, listener);
        }

        for kind in ActivityKind::ALL {
            page.interact(kind);
        }

        assert_eq!(
            *seen.borrow(),
            vec![ActivityKind::Click, ActivityKind::Scroll]
        );
    }

    #[tokio::test]
    async fn closing_the_active_tab_leaves_nothing_active() {
        let browser = SimBrowser::with_active_tab(7);

        assert_eq!(browser.active_tab().await.unwrap(), Some(7));
        browser.close_tab(7).await.unwrap();

        assert_eq!(browser.active_tab().await.unwrap(), None);
        assert_eq!(browser.active(), None);
        assert_eq!(browser.closed_tabs(), vec![7]);
        assert!(browser.close_tab(7).await.is_err());
        assert_eq!(browser.close_attempts(), 2);
    }

    #[tokio::test]
    async fn failing_browser_rejects_calls() {
        let browser = SimBrowser::with_active_tab(1);
        browser.set_failing(true);

        assert!(matches!(
            browser.active_tab().await,
            Err(HostError::Query(_))
        ));
        assert!(matches!(
            browser.close_tab(1).await,
            Err(HostError::Close { tab: 1, .. })
        ));
    }
}
