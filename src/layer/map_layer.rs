use std::sync::Arc;
use std::time::Duration;

use crate::fetch::{TileFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::geometry::{GeoBBox, ZoomRange, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use crate::imaging::ImageFormat;

use super::source::TileSource;

/// A configured layer backed by one [`TileSource`].
///
/// The layer owns its [`TileFetcher`], created once at registration.
#[derive(Debug, Clone)]
pub struct ConcreteLayer {
    name: String,
    title: String,
    bbox: GeoBBox,
    range: ZoomRange,
    visible: bool,
    formats: Vec<ImageFormat>,
    fetcher: TileFetcher,
}

impl ConcreteLayer {
    /// Create a visible world-covering layer with zooms 0-20, PNG and JPEG.
    pub fn new(name: impl Into<String>, source: Arc<dyn TileSource>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            bbox: GeoBBox::world(),
            range: ZoomRange::new(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM),
            visible: true,
            formats: vec![ImageFormat::Png, ImageFormat::Jpeg],
            fetcher: TileFetcher::new(name.as_str(), source, DEFAULT_FETCH_TIMEOUT),
            name,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_bbox(mut self, bbox: GeoBBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn with_range(mut self, range: ZoomRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_formats(mut self, formats: Vec<ImageFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Per-attempt fetch deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetcher = TileFetcher::new(
            self.name.as_str(),
            self.fetcher.source().clone(),
            timeout,
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn bbox(&self) -> &GeoBBox {
        &self.bbox
    }

    pub fn range(&self) -> &ZoomRange {
        &self.range
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn formats(&self) -> &[ImageFormat] {
        &self.formats
    }

    pub fn fetcher(&self) -> &TileFetcher {
        &self.fetcher
    }
}

/// Several concrete layers requested together, bottom-most first.
///
/// Envelope and zoom range are the unions of the members'. A member may have
/// no tile at an address the composite accepts; it is then left out.
#[derive(Debug, Clone)]
pub struct CompositeLayer {
    name: String,
    members: Vec<Arc<ConcreteLayer>>,
    bbox: GeoBBox,
    range: ZoomRange,
}

impl CompositeLayer {
    /// Returns `None` for an empty member list.
    pub fn new(members: Vec<Arc<ConcreteLayer>>) -> Option<Self> {
        let first = members.first()?;
        let mut bbox = *first.bbox();
        let mut range = *first.range();
        for member in &members[1..] {
            bbox = bbox.union(member.bbox());
            range = range.union(member.range());
        }

        let name = members
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(",");

        Some(Self {
            name,
            members,
            bbox,
            range,
        })
    }

    pub fn members(&self) -> &[Arc<ConcreteLayer>] {
        &self.members
    }
}

/// A layer resolved for one request.
#[derive(Debug, Clone)]
pub enum MapLayer {
    Concrete(Arc<ConcreteLayer>),
    Composite(CompositeLayer),
}

impl MapLayer {
    pub fn name(&self) -> &str {
        match self {
            MapLayer::Concrete(layer) => layer.name(),
            MapLayer::Composite(layer) => &layer.name,
        }
    }

    pub fn bbox(&self) -> &GeoBBox {
        match self {
            MapLayer::Concrete(layer) => layer.bbox(),
            MapLayer::Composite(layer) => &layer.bbox,
        }
    }

    pub fn range(&self) -> &ZoomRange {
        match self {
            MapLayer::Concrete(layer) => layer.range(),
            MapLayer::Composite(layer) => &layer.range,
        }
    }

    /// A composite is visible only if every member is.
    pub fn visible(&self) -> bool {
        match self {
            MapLayer::Concrete(layer) => layer.visible(),
            MapLayer::Composite(layer) => layer.members.iter().all(|m| m.visible()),
        }
    }
}
