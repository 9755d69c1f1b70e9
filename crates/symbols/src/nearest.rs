/// Result of an `address_to_nearest` query: the containing symbol's name,
/// the byte offset from its start, and the module it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestSymbol {
    pub name: String,
    pub delta: u64,
    pub module: String,
}

impl std::fmt::Display for NearestSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.delta == 0 {
            write!(f, "{}!{}", self.module, self.name)
        } else {
            write!(f, "{}!{}+0x{:x}", self.module, self.name, self.delta)
        }
    }
}
