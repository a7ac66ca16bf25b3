use std::fmt::Display;

/// One atomic observation of the node's chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadSnapshot {
    pub head: String,
    pub height: u64,
}

impl HeadSnapshot {
    pub fn new(head: impl Display, height: u64) -> Self {
        Self { head: head.to_string(), height }
    }
}

/// Supplies the current chain head on demand.
///
/// Called synchronously once per beat, from the service's run loop. It must
/// return quickly; no timeout is applied around it.
pub trait HeadSource: Send + Sync {
    fn head(&self) -> HeadSnapshot;
}

impl<F> HeadSource for F
where
    F: Fn() -> HeadSnapshot + Send + Sync,
{
    fn head(&self) -> HeadSnapshot {
        self()
    }
}
