use crate::model::RawDocument;
use scraper::{ElementRef, Html};

/// The element operations the extractor needs from a parsed document.
pub trait TreeNode: Sized {
    fn tag_name(&self) -> &str;
    fn attr(&self, name: &str) -> Option<&str>;
    /// Concatenated text of every descendant text node.
    fn text(&self) -> String;
    fn child_elements(&self) -> Vec<Self>;
    fn has_ancestor(&self, tag: &str) -> bool;
}

impl<'a> TreeNode for ElementRef<'a> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn text(&self) -> String {
        ElementRef::text(self).collect()
    }

    fn child_elements(&self) -> Vec<Self> {
        self.children().filter_map(ElementRef::wrap).collect()
    }

    fn has_ancestor(&self, tag: &str) -> bool {
        self.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| el.value().name() == tag)
    }
}

/// Read-only parse of a fetched page. Not `Send`: build, query and drop it
/// without crossing an `.await`.
pub struct ParsedTree {
    html: Html,
}

impl ParsedTree {
    /// Never fails; broken markup is repaired the way browsers do it.
    pub fn parse(doc: &RawDocument) -> Self {
        Self {
            html: Html::parse_document(&doc.body),
        }
    }

    /// Every element of the document, in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
    }
}
