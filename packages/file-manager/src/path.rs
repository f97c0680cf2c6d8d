//! Virtual paths anchored at a contract root.
//!
//! A [`VirtualPath`] is `<root_prefix>/<contractId>` followed by at most
//! `max_depth` sanitized folder segments. Paths are immutable; navigation
//! returns a new path.

use std::fmt;

use crate::error::{Error, Result};
use crate::sanitize::{is_sanitized, SafeSegment};

/// The fixed root of one contract's folder tree, e.g. `uploads/c42`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContractRoot {
    prefix: String,
    contract_id: String,
}

impl ContractRoot {
    /// Build a root from a prefix and a contract id, both single segments.
    pub fn new(prefix: &str, contract_id: &str) -> Result<Self> {
        if !is_sanitized(prefix) || !is_sanitized(contract_id) {
            return Err(Error::InvalidScope {
                path: format!("{}/{}", prefix, contract_id),
                root: prefix.to_string(),
            });
        }
        Ok(Self {
            prefix: prefix.to_string(),
            contract_id: contract_id.to_string(),
        })
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    /// The root rendered as an object key prefix.
    pub fn key(&self) -> String {
        format!("{}/{}", self.prefix, self.contract_id)
    }

    /// The path of the root folder itself.
    pub fn path(&self) -> VirtualPath {
        VirtualPath {
            root: self.clone(),
            segments: Vec::new(),
        }
    }
}

impl fmt::Display for ContractRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.contract_id)
    }
}

/// A folder location inside one contract's tree.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualPath {
    root: ContractRoot,
    segments: Vec<SafeSegment>,
}

impl VirtualPath {
    /// Parse a rendered path, checking it belongs to `root`.
    ///
    /// Empty segments are ignored, which normalizes `//` and a trailing `/`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidScope`] if `s` is not `root` or beneath it.
    /// * [`Error::InvalidName`] if a segment is not in sanitized form.
    /// * [`Error::MaxDepthExceeded`] if there are more than `max_depth` segments.
    pub fn parse(s: &str, root: &ContractRoot, max_depth: usize) -> Result<Self> {
        let root_key = root.key();
        let rest = match s.strip_prefix(root_key.as_str()) {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => rest,
            _ => {
                return Err(Error::InvalidScope {
                    path: s.to_string(),
                    root: root_key,
                })
            }
        };

        let segments = rest
            .split('/')
            .filter(|c| !c.is_empty())
            .map(SafeSegment::try_new)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if segments.len() > max_depth {
            return Err(Error::MaxDepthExceeded { max_depth });
        }

        Ok(Self {
            root: root.clone(),
            segments,
        })
    }

    /// The contract root this path lives under.
    pub fn contract_root(&self) -> &ContractRoot {
        &self.root
    }

    /// Number of folder segments below the contract root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[SafeSegment] {
        &self.segments
    }

    /// The last segment, or `None` at the contract root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(SafeSegment::as_str)
    }

    /// Append a segment.
    ///
    /// Fails with [`Error::MaxDepthExceeded`] if the result would be deeper
    /// than `max_depth`; `self` is untouched either way.
    pub fn join(&self, segment: &SafeSegment, max_depth: usize) -> Result<Self> {
        if self.segments.len() >= max_depth {
            return Err(Error::MaxDepthExceeded { max_depth });
        }
        let mut segments = self.segments.clone();
        segments.push(segment.clone());
        Ok(Self {
            root: self.root.clone(),
            segments,
        })
    }

    /// The containing folder. Fails with [`Error::AtRoot`] at the contract root.
    pub fn parent(&self) -> Result<Self> {
        if self.is_root() {
            return Err(Error::AtRoot);
        }
        Ok(Self {
            root: self.root.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The object key prefix for this folder, e.g. `uploads/c42/Drafts/Q3`.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// The key of a direct child named `name`.
    pub fn child_key(&self, name: &str) -> String {
        format!("{}/{}", self, name)
    }

    /// True if `self` is `ancestor` or lies beneath it.
    pub fn has_prefix(&self, ancestor: &VirtualPath) -> bool {
        self.root == ancestor.root
            && ancestor.segments.len() <= self.segments.len()
            && ancestor.segments == self.segments[..ancestor.segments.len()]
    }

    /// Strip this folder's key prefix from a full object key.
    ///
    /// Returns `None` if `key` is not strictly beneath this folder.
    pub fn relative_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let prefix = self.render();
        key.strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for VirtualPath {
    type Output = SafeSegment;

    fn index(&self, i: usize) -> &Self::Output {
        &self.segments[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ContractRoot {
        ContractRoot::new("uploads", "c42").unwrap()
    }

    fn seg(s: &str) -> SafeSegment {
        SafeSegment::try_new(s).unwrap()
    }

    #[test]
    fn contract_root_validation() {
        assert!(ContractRoot::new("uploads", "c-42_x").is_ok());
        assert!(ContractRoot::new("uploads", "").is_err());
        assert!(ContractRoot::new("uploads", "a/b").is_err());
        assert!(ContractRoot::new("up loads", "c1").is_err());
        assert_eq!(root().key(), "uploads/c42");
    }

    #[test]
    fn render_root_and_nested() {
        let p = root().path();
        assert!(p.is_root());
        assert_eq!(p.render(), "uploads/c42");

        let p = p.join(&seg("Drafts"), 4).unwrap();
        let p = p.join(&seg("Q3"), 4).unwrap();
        assert_eq!(p.render(), "uploads/c42/Drafts/Q3");
        assert_eq!(p.depth(), 2);
        assert_eq!(p.name(), Some("Q3"));
        assert_eq!(p[0].as_str(), "Drafts");
    }

    #[test]
    fn parse_normalizes_slashes() {
        let a = VirtualPath::parse("uploads/c42/a/b/", &root(), 4).unwrap();
        let b = VirtualPath::parse("uploads/c42/a//b", &root(), 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.render(), "uploads/c42/a/b");
    }

    #[test]
    fn parse_rejects_other_contracts() {
        for s in ["uploads/c43/a", "uploads/c420", "other/c42", "", "uploads"] {
            let err = VirtualPath::parse(s, &root(), 4).unwrap_err();
            assert!(matches!(err, Error::InvalidScope { .. }), "{s} accepted");
        }
    }

    #[test]
    fn parse_rejects_unsanitized_segments() {
        let err = VirtualPath::parse("uploads/c42/has space", &root(), 4).unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
        let err = VirtualPath::parse("uploads/c42/..", &root(), 4).unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn parse_enforces_depth() {
        let err = VirtualPath::parse("uploads/c42/a/b/c/d/e", &root(), 4).unwrap_err();
        assert!(matches!(err, Error::MaxDepthExceeded { max_depth: 4 }));
        assert!(VirtualPath::parse("uploads/c42/a/b/c/d", &root(), 4).is_ok());
    }

    #[test]
    fn join_refuses_past_max_depth() {
        let mut p = root().path();
        for name in ["a", "b", "c", "d"] {
            p = p.join(&seg(name), 4).unwrap();
        }
        let before = p.clone();
        let err = p.join(&seg("e"), 4).unwrap_err();
        assert!(matches!(err, Error::MaxDepthExceeded { max_depth: 4 }));
        assert_eq!(p, before);
    }

    #[test]
    fn parent_walks_up_and_stops_at_root() {
        let p = VirtualPath::parse("uploads/c42/a/b", &root(), 4).unwrap();
        let up = p.parent().unwrap();
        assert_eq!(up.render(), "uploads/c42/a");
        let top = up.parent().unwrap();
        assert!(top.is_root());
        assert!(matches!(top.parent(), Err(Error::AtRoot)));
    }

    #[test]
    fn relative_key_strips_folder() {
        let p = VirtualPath::parse("uploads/c42/a", &root(), 4).unwrap();
        assert_eq!(p.relative_key("uploads/c42/a/b/c.txt"), Some("b/c.txt"));
        assert_eq!(p.relative_key("uploads/c42/ab/c.txt"), None);
        assert_eq!(p.relative_key("uploads/c42/a"), None);
        assert_eq!(p.child_key("x.pdf"), "uploads/c42/a/x.pdf");
    }

    #[test]
    fn has_prefix_works() {
        let a = VirtualPath::parse("uploads/c42/a", &root(), 4).unwrap();
        let ab = VirtualPath::parse("uploads/c42/a/b", &root(), 4).unwrap();
        assert!(ab.has_prefix(&a));
        assert!(ab.has_prefix(&root().path()));
        assert!(!a.has_prefix(&ab));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const MAX_DEPTH: usize = 4;

    fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[A-Za-z0-9_-]{1,12}", 0..=MAX_DEPTH)
    }

    proptest! {
        #[test]
        fn prop_parse_render_roundtrip(contract in "[a-z0-9]{1,8}", names in segments()) {
            let root = ContractRoot::new("uploads", &contract).unwrap();
            let mut p = root.path();
            for name in &names {
                p = p.join(&SafeSegment::try_new(name).unwrap(), MAX_DEPTH).unwrap();
            }
            let parsed = VirtualPath::parse(&p.render(), &root, MAX_DEPTH).unwrap();
            prop_assert_eq!(parsed, p);
        }

        #[test]
        fn prop_join_never_exceeds_depth(names in prop::collection::vec("[a-z]{1,4}", 0..10)) {
            let root = ContractRoot::new("uploads", "c1").unwrap();
            let mut p = root.path();
            for name in &names {
                let before = p.clone();
                match p.join(&SafeSegment::try_new(name).unwrap(), MAX_DEPTH) {
                    Ok(next) => p = next,
                    Err(Error::MaxDepthExceeded { .. }) => {
                        prop_assert_eq!(before.depth(), MAX_DEPTH);
                        prop_assert_eq!(&p, &before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {}", other),
                }
                prop_assert!(p.depth() <= MAX_DEPTH);
            }
        }
    }
}
