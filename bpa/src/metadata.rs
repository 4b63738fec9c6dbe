/// Custody status of one stored copy of a bundle.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BundleStatus {
    #[default]
    Pending,
    InTransit,
    Delivered,
    Expired,
    Failed,
}

impl BundleStatus {
    /// Terminal states are final: a copy never leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Expired | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BundleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            s => Err(format!("Unknown bundle status '{s}'")),
        }
    }
}
