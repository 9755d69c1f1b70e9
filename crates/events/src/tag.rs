/// Addresses either one event by its user-visible tag, or every live event
/// at once — the `tag_or_all` parameter of spec §4.5's `modify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSelector {
    One(u32),
    All,
}

impl From<u32> for TagSelector {
    fn from(tag: u32) -> Self {
        TagSelector::One(tag)
    }
}
