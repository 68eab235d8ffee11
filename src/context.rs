/// Opaque alignment/versioning token passed through every spatial query.
///
/// The navigation core never inspects it; it is forwarded so that callers
/// with time-dependent alignment can thread their own state through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeometryContext {
    tag: u64,
}

impl GeometryContext {
    pub fn new(tag: u64) -> Self {
        Self { tag }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }
}
