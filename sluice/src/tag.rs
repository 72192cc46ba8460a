//! optional runtime schema tags for connection time compatibility checks.

/// A named tag describing the kind of item a fount emits or a drain accepts,
/// with an optional parent forming an "extends" chain.
///
/// Tags are meant to be declared as statics so a hierarchy can be spelled out
/// in const context:
///
/// ```rust
/// use sluice::TypeTag;
///
/// static SEGMENTS: TypeTag = TypeTag::new("segments");
/// static LINES: TypeTag = TypeTag::extending("lines", &SEGMENTS);
///
/// assert!(LINES.is_or_extends(&SEGMENTS));
/// assert!(!SEGMENTS.is_or_extends(&LINES));
/// ```
///
/// Tags are identified by name; two tags with the same name are the same tag.
/// A connection is compatible when the fount's tag is the drain's tag or
/// extends it. Nodes that declare no tag are compatible with everything.
#[derive(Clone, Copy)]
pub struct TypeTag {
    name: &'static str,
    parent: Option<&'static TypeTag>,
}

impl TypeTag {
    /// a root tag with no parent.
    pub const fn new(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// a tag extending `parent`.
    pub const fn extending(name: &'static str, parent: &'static TypeTag) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// the tag's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// true when `self` is `base` or transitively extends it.
    pub fn is_or_extends(&self, base: &TypeTag) -> bool {
        let mut current = Some(self);
        while let Some(tag) = current {
            if tag.name == base.name {
                return true;
            }
            current = tag.parent;
        }
        false
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeTag {}

impl std::fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}
