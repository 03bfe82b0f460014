use std::cmp::Ordering;
use strum_macros::{AsRefStr, Display, EnumIter};

/// Ordered lifecycle states.
///
/// Every state carries a globally unique rank; a higher rank is always a later
/// state and transitions never move to a lower rank. The ranks between
/// `NotStarted` and `Starting` are used by object definitions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    NotStarted,
    Instantiating,
    Instantiated,
    SettingProperties,
    PropertiesSet,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub const fn rank(self) -> u32 {
        match self {
            Self::NotStarted => 0,
            Self::Instantiating => 100,
            Self::Instantiated => 200,
            Self::SettingProperties => 300,
            Self::PropertiesSet => 400,
            Self::Starting => 1000,
            Self::Started => 2000,
            Self::Stopping => 10000,
            Self::Stopped => 10001,
        }
    }
}

impl PartialOrd for LifecycleState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LifecycleState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_ranks_are_unique_and_ordered() {
        let states: Vec<_> = LifecycleState::iter().collect();
        let ranks: HashSet<_> = states.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks.len(), states.len());
        assert!(states.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(LifecycleState::NotStarted.to_string(), "NOT_STARTED");
        assert_eq!(LifecycleState::PropertiesSet.as_ref(), "PROPERTIES_SET");
    }
}
