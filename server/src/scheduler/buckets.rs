use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The closed set of work/personal categories a task or block belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Bucket {
    ClientDeepWork,
    SystemsDevelopment,
    MarketingCreative,
    AdminProcessing,
    Personal,
}

impl Bucket {
    pub fn label(&self) -> &'static str {
        match self {
            Bucket::ClientDeepWork => "Client Deep Work",
            Bucket::SystemsDevelopment => "Systems Development",
            Bucket::MarketingCreative => "Marketing Creative",
            Bucket::AdminProcessing => "Admin Processing",
            Bucket::Personal => "Personal",
        }
    }

    /// Canonical short tag -> bucket, the way tasks are tagged by hand.
    pub fn from_tag(tag: &str) -> Option<Bucket> {
        match tag.trim().to_lowercase().as_str() {
            "client" => Some(Bucket::ClientDeepWork),
            "systems" => Some(Bucket::SystemsDevelopment),
            "marketing" => Some(Bucket::MarketingCreative),
            "admin" => Some(Bucket::AdminProcessing),
            "personal" => Some(Bucket::Personal),
            other => other.parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_round_trips_snake_case() {
        assert_eq!(Bucket::ClientDeepWork.to_string(), "client_deep_work");
        assert_eq!(
            "systems_development".parse::<Bucket>().unwrap(),
            Bucket::SystemsDevelopment
        );
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Bucket::from_tag("Client"), Some(Bucket::ClientDeepWork));
        assert_eq!(Bucket::from_tag("personal"), Some(Bucket::Personal));
        assert_eq!(Bucket::from_tag("admin_processing"), Some(Bucket::AdminProcessing));
        assert_eq!(Bucket::from_tag("unrelated"), None);
    }
}
