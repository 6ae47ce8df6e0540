/// The priority of a peer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Dispatched ahead of normal requests.
    High,
    /// Dispatched in arrival order.
    #[default]
    Normal,
}

impl Priority {
    /// Whether this is high priority.
    pub fn is_high(&self) -> bool {
        matches!(self, Priority::High)
    }
}
