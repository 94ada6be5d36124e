//! Marker sets
//!
//! Markers stand in for annotations. They are attached to descriptors at
//! registration time and never re-derived afterwards.

use ahash::AHashMap;
use bitflags::bitflags;

bitflags! {
    /// Class-, field- and method-level markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Markers: u16 {
        /// Managed by the container
        const COMPONENT = 1 << 0;
        /// Service stereotype (implies `COMPONENT`)
        const SERVICE = 1 << 1;
        /// Repository stereotype (implies `COMPONENT`); on an interface it
        /// requests a generated repository proxy
        const REPOSITORY = 1 << 2;
        /// Controller stereotype (implies `COMPONENT`)
        const CONTROLLER = 1 << 3;
        /// Calls run inside a transaction
        const TRANSACTIONAL = 1 << 4;
        /// Constructor or field participates in injection
        const INJECT = 1 << 5;
        /// Bean takes part in the post-processor chain
        const POST_PROCESSOR = 1 << 6;
    }
}

impl Markers {
    /// Stereotypes that carry `COMPONENT` themselves.
    const STEREOTYPES: Markers = Markers::SERVICE
        .union(Markers::REPOSITORY)
        .union(Markers::CONTROLLER);

    /// Expand stereotype markers into the markers they imply.
    #[inline]
    pub fn expand(self) -> Self {
        if self.intersects(Self::STEREOTYPES) {
            self | Markers::COMPONENT
        } else {
            self
        }
    }

    /// True for anything the scanner should hand to the container.
    #[inline]
    pub fn is_component(self) -> bool {
        self.expand().contains(Markers::COMPONENT)
    }
}

/// Transactional markers of one type: the class-level flag plus the
/// declared methods that carry it.
#[derive(Debug, Clone, Default)]
pub struct MethodMarkers {
    class: Markers,
    methods: AHashMap<&'static str, Markers>,
}

impl MethodMarkers {
    pub(crate) fn new(class: Markers) -> Self {
        Self {
            class,
            methods: AHashMap::new(),
        }
    }

    pub(crate) fn set_class(&mut self, class: Markers) {
        self.class = class;
    }

    pub(crate) fn declare(&mut self, method: &'static str, markers: Markers) {
        *self.methods.entry(method).or_default() |= markers;
    }

    /// Markers of the declaring type.
    #[inline]
    pub fn class(&self) -> Markers {
        self.class
    }

    /// Markers declared on a single method.
    #[inline]
    pub fn method(&self, name: &str) -> Markers {
        self.methods.get(name).copied().unwrap_or_default()
    }

    /// Whether a call to `method` must run in a transaction: either the
    /// method or its declaring type is marked.
    #[inline]
    pub fn is_transactional(&self, method: &str) -> bool {
        self.class.contains(Markers::TRANSACTIONAL)
            || self.method(method).contains(Markers::TRANSACTIONAL)
    }

    /// Whether anything on the type is transactional.
    pub fn any_transactional(&self) -> bool {
        self.class.contains(Markers::TRANSACTIONAL)
            || self
                .methods
                .values()
                .any(|m| m.contains(Markers::TRANSACTIONAL))
    }

    /// Declared method names, unordered.
    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }
}
