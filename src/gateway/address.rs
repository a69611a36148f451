//! Tag address parsing.
//!
//! Tags that are not found on the default controller are addressed as
//! `controller/remainder`, e.g. `"press2/Hydraulic.Pressure"`.

/// A tag split into its controller namespace and the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAddress<'a> {
    /// Candidate controller id; empty when the tag has no namespace.
    pub controller: &'a str,

    /// Tag name (or literal address) on that controller.
    pub remainder: &'a str,
}

impl<'a> TagAddress<'a> {
    /// Split a tag name.
    ///
    /// The namespace is everything before the first `/` and must be one or
    /// more ASCII letters, digits, `_` or `-`; the remainder must be
    /// non-empty. Anything else yields an empty controller with the whole tag
    /// as remainder.
    pub fn parse(tag: &'a str) -> Self {
        split_namespace(tag).unwrap_or(Self {
            controller: "",
            remainder: tag,
        })
    }

    /// True when the tag named a controller.
    pub fn has_namespace(&self) -> bool {
        !self.controller.is_empty()
    }
}

/// Split `controller/remainder`, or `None` when the tag does not have that shape.
pub fn split_namespace(tag: &str) -> Option<TagAddress<'_>> {
    let (controller, remainder) = tag.split_once('/')?;

    if controller.is_empty() || remainder.is_empty() {
        return None;
    }
    if !controller
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return None;
    }

    Some(TagAddress {
        controller,
        remainder,
    })
}
