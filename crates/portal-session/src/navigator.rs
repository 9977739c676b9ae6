//! HTML navigation over `scraper`.
//!
//! A [`Document`] is queried with [`Landmark`]s rather than raw selectors so
//! that every structural assumption about the portal lives in
//! [`crate::landmarks`].

use scraper::{ElementRef, Html, Selector};

use crate::landmarks::Landmark;
use crate::types::{PortalError, PortalResult};

/// A parsed page.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// All elements matching `landmark`, in document order.
    pub fn query(&self, landmark: &Landmark) -> PortalResult<Vec<Node<'_>>> {
        let selector = compile(landmark)?;
        Ok(self
            .html
            .select(&selector)
            .map(Node::from)
            .filter(|node| landmark.text.accepts(&node.text()))
            .collect())
    }

    pub fn contains(&self, landmark: &Landmark) -> PortalResult<bool> {
        Ok(!self.query(landmark)?.is_empty())
    }

    pub fn first(&self, landmark: &Landmark) -> PortalResult<Option<Node<'_>>> {
        Ok(self.query(landmark)?.into_iter().next())
    }

    /// The one element matching `landmark`.
    ///
    /// Zero or several matches mean the page no longer looks the way the
    /// client expects and yield [`PortalError::PageStructureChanged`].
    pub fn single(&self, landmark: &Landmark) -> PortalResult<Node<'_>> {
        let mut nodes = self.query(landmark)?;
        match nodes.len() {
            1 => Ok(nodes.remove(0)),
            n => Err(PortalError::structure(
                landmark.name,
                format!("expected exactly one match, found {n}"),
            )),
        }
    }
}

/// An element inside a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    element: ElementRef<'a>,
}

impl<'a> From<ElementRef<'a>> for Node<'a> {
    fn from(element: ElementRef<'a>) -> Self {
        Self { element }
    }
}

impl<'a> Node<'a> {
    pub fn tag(&self) -> &'a str {
        self.element.value().name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Attribute that must be present for the page to make sense.
    pub fn require_attr(&self, landmark: &Landmark, name: &str) -> PortalResult<&'a str> {
        self.attr(name).ok_or_else(|| {
            PortalError::structure(landmark.name, format!("element has no '{name}' attribute"))
        })
    }

    /// Visible text, whitespace-collapsed.
    pub fn text(&self) -> String {
        self.element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Descendants matching `landmark`.
    pub fn query(&self, landmark: &Landmark) -> PortalResult<Vec<Node<'a>>> {
        let selector = compile(landmark)?;
        Ok(self
            .element
            .select(&selector)
            .map(Node::from)
            .filter(|node| landmark.text.accepts(&node.text()))
            .collect())
    }

    /// Direct child elements with the given tag name.
    pub fn children_named(&self, tag: &str) -> Vec<Node<'a>> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == tag)
            .map(Node::from)
            .collect()
    }
}

fn compile(landmark: &Landmark) -> PortalResult<Selector> {
    Selector::parse(landmark.selector)
        .map_err(|e| PortalError::Selector(format!("{}: {e:?}", landmark.name)))
}
