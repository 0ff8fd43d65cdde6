use std::fmt;

/// Location of a value inside a mapping tree, used in error reports.
///
/// Paths are built on the stack as the traversal descends; each segment only
/// borrows its parent, so no allocation happens until a path is rendered.
#[derive(Debug, Clone, Copy)]
pub struct KeyPath<'a> {
    parent: Option<&'a KeyPath<'a>>,
    segment: Segment<'a>,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
enum Segment<'a> {
    Root,
    Key(&'a str),
    Index(usize),
}

impl<'a> KeyPath<'a> {
    pub fn root() -> Self {
        Self {
            parent: None,
            segment: Segment::Root,
            depth: 0,
        }
    }

    pub fn key(&'a self, key: &'a str) -> KeyPath<'a> {
        KeyPath {
            parent: Some(self),
            segment: Segment::Key(key),
            depth: self.depth + 1,
        }
    }

    pub fn index(&'a self, index: usize) -> KeyPath<'a> {
        KeyPath {
            parent: Some(self),
            segment: Segment::Index(index),
            depth: self.depth + 1,
        }
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        matches!(self.segment, Segment::Root)
    }
}

impl fmt::Display for KeyPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent {
            if !parent.is_root() {
                write!(f, "{parent}")?;
            }
        }

        match self.segment {
            Segment::Root => match self.parent {
                None => f.write_str("$"),
                Some(_) => Ok(()),
            },
            Segment::Key(key) => match self.parent {
                Some(parent) if !parent.is_root() => write!(f, ".{key}"),
                _ => f.write_str(key),
            },
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}
