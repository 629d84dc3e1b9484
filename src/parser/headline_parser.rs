// Headline extraction: `article h2` matches, title and link from the heading's `a` children
use crate::model::{ArticleCandidate, RawDocument};
use crate::parser::tree::{ParsedTree, TreeNode};

/// Structural pattern for one headline: a `heading` somewhere inside a
/// `container`, whose direct `leaf` children carry the text and the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlinePattern {
    pub container: String,
    pub heading: String,
    pub leaf: String,
    pub attribute: String,
}

impl Default for HeadlinePattern {
    fn default() -> Self {
        Self {
            container: "article".to_string(),
            heading: "h2".to_string(),
            leaf: "a".to_string(),
            attribute: "href".to_string(),
        }
    }
}

impl HeadlinePattern {
    /// Parses `doc` and runs one extraction pass. The tree is dropped before returning.
    pub fn extract_document(&self, doc: &RawDocument) -> Vec<ArticleCandidate> {
        let tree = ParsedTree::parse(doc);
        self.extract(&tree)
    }

    pub fn extract(&self, tree: &ParsedTree) -> Vec<ArticleCandidate> {
        self.extract_from(tree.elements())
    }

    /// One candidate per matching heading, in the order the nodes are given.
    pub fn extract_from<N: TreeNode>(&self, nodes: impl IntoIterator<Item = N>) -> Vec<ArticleCandidate> {
        nodes
            .into_iter()
            .filter(|node| self.matches(node))
            .map(|node| self.candidate(&node))
            .collect()
    }

    fn matches<N: TreeNode>(&self, node: &N) -> bool {
        node.tag_name() == self.heading && node.has_ancestor(&self.container)
    }

    fn candidate<N: TreeNode>(&self, heading: &N) -> ArticleCandidate {
        let leaves: Vec<N> = heading
            .child_elements()
            .into_iter()
            .filter(|child| child.tag_name() == self.leaf)
            .collect();

        let text: String = leaves.iter().map(TreeNode::text).collect();
        let link = leaves
            .first()
            .and_then(|leaf| leaf.attr(&self.attribute))
            .map(str::to_string);

        ArticleCandidate {
            title: text.trim().to_string(),
            link,
        }
    }
}
