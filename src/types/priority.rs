use serde::{Deserialize, Serialize};

/// Standard priority levels. Lower values load and boot earlier and terminate later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    System = 0,
    Core = 10,
    Infrastructure = 50,
    Framework = 100,
    #[default]
    Application = 200,
    Extensions = 300,
    Low = 500,
}

impl PriorityTier {
    pub const fn value(self) -> i32 {
        self as i32
    }

    /// Tier whose value matches exactly, if any.
    pub fn from_value(value: i32) -> Option<Self> {
        [
            Self::System,
            Self::Core,
            Self::Infrastructure,
            Self::Framework,
            Self::Application,
            Self::Extensions,
            Self::Low,
        ]
        .into_iter()
        .find(|tier| tier.value() == value)
    }
}

impl From<PriorityTier> for i32 {
    fn from(tier: PriorityTier) -> Self {
        tier.value()
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Core => write!(f, "core"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Framework => write!(f, "framework"),
            Self::Application => write!(f, "application"),
            Self::Extensions => write!(f, "extensions"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_values_are_ordered() {
        assert!(PriorityTier::System.value() < PriorityTier::Core.value());
        assert!(PriorityTier::Framework < PriorityTier::Application);
        assert_eq!(i32::from(PriorityTier::default()), 200);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(PriorityTier::from_value(50), Some(PriorityTier::Infrastructure));
        assert_eq!(PriorityTier::from_value(42), None);
    }
}
