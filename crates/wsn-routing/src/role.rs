/// Which half of a protocol's sink/sensing split a concrete instance plays.
/// Mirrors the spec's guidance to parameterize by role via a small enum
/// rather than by inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sink,
    Sensing,
}

impl Role {
    pub fn is_sink(self) -> bool {
        matches!(self, Role::Sink)
    }
}
