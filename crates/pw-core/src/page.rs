//! Host page seams: media elements, document queries and the events a page
//! delivers to the volume synchronizer.

/// Stable identity of a media element for the lifetime of the page.
pub type ElementId = u64;

/// A media element (`<video>`, `<audio>`).
pub trait MediaElement: Clone + 'static {
    fn id(&self) -> ElementId;

    fn volume(&self) -> f64;

    /// Sets the element volume. On a detached element this has no visible
    /// effect.
    fn set_volume(&self, volume: f64);

    /// Whether the element is still attached to the document.
    fn is_connected(&self) -> bool;
}

/// Anything that can report the URL of the current page.
pub trait Location {
    fn href(&self) -> String;
}

impl Location for String {
    fn href(&self) -> String {
        self.clone()
    }
}

impl Location for &'static str {
    fn href(&self) -> String {
        (*self).to_string()
    }
}

/// A document that can be queried for media elements.
pub trait Page: Location + Clone + 'static {
    type Element: MediaElement;
    type Node: Clone + 'static;

    /// The node observed for structural mutations.
    fn body(&self) -> Self::Node;

    /// Every media element currently in the document, in document order.
    fn media_elements(&self) -> Vec<Self::Element>;

    /// `node` itself if it is a media element, followed by the media
    /// elements nested under it, in document order.
    fn media_in(&self, node: &Self::Node) -> Vec<Self::Element>;
}

/// One structural mutation: nodes inserted under and removed from the
/// observed subtree.
#[derive(Debug, Clone)]
pub struct MutationRecord<N> {
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

impl<N> MutationRecord<N> {
    pub fn added(nodes: Vec<N>) -> Self {
        Self {
            added: nodes,
            removed: Vec::new(),
        }
    }

    pub fn removed(nodes: Vec<N>) -> Self {
        Self {
            added: Vec::new(),
            removed: nodes,
        }
    }
}

/// Events the page delivers to the synchronizer.
#[derive(Debug, Clone)]
pub enum PageEvent<N> {
    /// A batch of mutation records, in the order they happened.
    Mutations(Vec<MutationRecord<N>>),
    /// A `volumechange` fired on the element.
    VolumeChange(ElementId),
}
