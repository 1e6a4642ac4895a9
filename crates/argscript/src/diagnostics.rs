//! Editor-facing surfaces
//!
//! Besides errors and warnings, a processed document yields three data sets
//! that editors consume: syntax-highlight spans, hyperlink anchors (color
//! literals can be clicked to open a picker), and a hierarchical outline of
//! the document's commands and blocks. All three are collected only when the
//! stream is in full-parsing mode; fast parsing and included files skip
//! them.

/// Style class of comments.
pub const SYNTAX_COMMENT: &str = "argscript-comment";
/// Style class of keywords that open a block.
pub const SYNTAX_BLOCK: &str = "argscript-block";
/// Style class of plain command keywords.
pub const SYNTAX_COMMAND: &str = "argscript-command";
/// Style class of `-option` names.
pub const SYNTAX_OPTION: &str = "argscript-option";
/// Style class of enumeration values.
pub const SYNTAX_ENUM: &str = "argscript-enum";
/// Style class of `$variable` references.
pub const SYNTAX_VARIABLE: &str = "argscript-variable";

/// Hyperlink kind of color literals.
pub const HYPERLINK_COLOR: &str = "COLOR";

/// A styled range of the document, in char offsets from the start of the
/// whole processed text.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyntaxSpan {
    pub start: usize,
    pub length: usize,
    pub style: &'static str,
}

/// An append-only collection of syntax-highlight spans.
///
/// Comments and variables are collected into separate highlighters during
/// processing and merged in at the end, so their styles land on top of the
/// command styles added per line.
#[derive(Debug, Default)]
pub struct SyntaxHighlighter {
    spans: Vec<SyntaxSpan>,
}

impl SyntaxHighlighter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, start: usize, length: usize, style: &'static str) {
        self.spans.push(SyntaxSpan {
            start,
            length,
            style,
        });
    }

    pub fn add_extras(&mut self, other: &SyntaxHighlighter) {
        self.spans.extend(other.spans.iter().cloned());
    }

    pub fn spans(&self) -> &[SyntaxSpan] {
        &self.spans
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }
}

/// A clickable anchor inside the document.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hyperlink {
    /// What the anchor points at, like [`HYPERLINK_COLOR`].
    pub kind: String,
    /// A textual rendition of the linked value.
    pub value: String,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

/// Index of a fragment inside a [`DocumentStructure`].
pub type FragmentId = usize;

/// One outline entry: a command or block of the document.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fragment {
    pub description: String,
    /// Nesting depth; top-level fragments are level 1.
    pub level: usize,
    /// Char offset of the fragment's first line in the document.
    pub start: usize,
    /// Char offset where the fragment ends. `None` for a block whose `end`
    /// line was never reached.
    pub end: Option<usize>,
    children: Vec<FragmentId>,
}

impl Fragment {
    pub fn children(&self) -> &[FragmentId] {
        &self.children
    }
}

/// The hierarchical outline of a document.
///
/// Fragments are stored in one arena and addressed by [`FragmentId`], with
/// blocks owning their nested fragments as children.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentStructure {
    fragments: Vec<Fragment>,
    roots: Vec<FragmentId>,
}

impl DocumentStructure {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a fragment under `parent`, or at the top level.
    pub fn add(
        &mut self,
        parent: Option<FragmentId>,
        description: String,
        start: usize,
    ) -> FragmentId {
        let id = self.fragments.len();
        let level = match parent {
            Some(parent) => self.fragments[parent].level + 1,
            None => 1,
        };
        self.fragments.push(Fragment {
            description,
            level,
            start,
            end: None,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.fragments[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn set_end(&mut self, id: FragmentId, end: usize) {
        self.fragments[id].end = Some(end);
    }

    pub fn get(&self, id: FragmentId) -> &Fragment {
        &self.fragments[id]
    }

    pub fn roots(&self) -> &[FragmentId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_nest_with_levels() {
        let mut structure = DocumentStructure::new();
        let block = structure.add(None, "effect fire".to_string(), 0);
        let inner = structure.add(Some(block), "particles".to_string(), 12);
        let leaf = structure.add(Some(inner), "rate".to_string(), 30);
        structure.set_end(leaf, 38);

        assert_eq!(structure.roots(), [block]);
        assert_eq!(structure.get(block).level, 1);
        assert_eq!(structure.get(inner).level, 2);
        assert_eq!(structure.get(leaf).level, 3);
        assert_eq!(structure.get(block).children(), [inner]);
        assert_eq!(structure.get(block).end, None);
        assert_eq!(structure.get(leaf).end, Some(38));
    }

    #[test]
    fn highlighter_merges_extras_in_order() {
        let mut syntax = SyntaxHighlighter::new();
        syntax.add(0, 7, SYNTAX_COMMAND);
        let mut comments = SyntaxHighlighter::new();
        comments.add(10, 5, SYNTAX_COMMENT);
        syntax.add_extras(&comments);

        assert_eq!(syntax.spans().len(), 2);
        assert_eq!(syntax.spans()[1].style, SYNTAX_COMMENT);
    }
}
