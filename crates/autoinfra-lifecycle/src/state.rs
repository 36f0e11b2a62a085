use core::fmt;

/// Position of a [`ServiceProcess`] in its one-way lifecycle.
///
/// Variants are ordered: a process only ever moves to a strictly greater
/// state, and `Stopped` is terminal.
///
/// ```text
/// Created -> Bound -> Serving -> Draining -> Stopped
///                        \__________________/
///                          (serve failure)
/// ```
///
/// [`ServiceProcess`]: crate::ServiceProcess
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created,
    Bound,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Bound => write!(f, "bound"),
            Self::Serving => write!(f, "serving"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn states_are_ordered_along_the_lifecycle() {
        let states = [Created, Bound, Serving, Draining, Stopped];
        assert!(states.windows(2).all(|w| w[0] < w[1]));
        assert!(Stopped.is_terminal());
        assert!(!Draining.is_terminal());
    }
}
