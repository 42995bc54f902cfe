use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Session fee ranges offered by the search page.
///
/// Each bucket is `(lower, upper]`; the first starts at zero inclusive and
/// the last is unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeBucket {
    UpTo6000,
    From6000To10000,
    From10000To15000,
    From15000To20000,
    Over20000,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fee bucket label: {0:?}")]
pub struct UnknownFeeBucket(pub String);

impl FeeBucket {
    pub const ALL: [FeeBucket; 5] = [
        FeeBucket::UpTo6000,
        FeeBucket::From6000To10000,
        FeeBucket::From10000To15000,
        FeeBucket::From15000To20000,
        FeeBucket::Over20000,
    ];

    /// `(exclusive lower, inclusive upper)`; `None` lower means from zero.
    fn bounds(self) -> (Option<u64>, Option<u64>) {
        match self {
            FeeBucket::UpTo6000 => (None, Some(6000)),
            FeeBucket::From6000To10000 => (Some(6000), Some(10000)),
            FeeBucket::From10000To15000 => (Some(10000), Some(15000)),
            FeeBucket::From15000To20000 => (Some(15000), Some(20000)),
            FeeBucket::Over20000 => (Some(20000), None),
        }
    }

    pub fn contains(self, fee: u64) -> bool {
        let (lower, upper) = self.bounds();
        lower.map_or(true, |lo| fee > lo) && upper.map_or(true, |hi| fee <= hi)
    }

    /// The bucket a fee falls in.
    pub fn for_fee(fee: u64) -> FeeBucket {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.contains(fee))
            .unwrap_or(FeeBucket::Over20000)
    }

    pub fn label(self) -> &'static str {
        match self {
            FeeBucket::UpTo6000 => "≤6000",
            FeeBucket::From6000To10000 => "6000-10000",
            FeeBucket::From10000To15000 => "10000-15000",
            FeeBucket::From15000To20000 => "15000-20000",
            FeeBucket::Over20000 => "20000+",
        }
    }

    /// Parse a select-box value where `"any"` (or nothing) means no bucket.
    pub fn parse_optional(label: &str) -> Result<Option<FeeBucket>, UnknownFeeBucket> {
        match label.trim() {
            "" | "any" | "all" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for FeeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FeeBucket {
    type Err = UnknownFeeBucket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "≤6000" | "<=6000" | "under-6000" => Ok(FeeBucket::UpTo6000),
            "6000-10000" => Ok(FeeBucket::From6000To10000),
            "10000-15000" => Ok(FeeBucket::From10000To15000),
            "15000-20000" => Ok(FeeBucket::From15000To20000),
            "20000+" | "over-20000" => Ok(FeeBucket::Over20000),
            other => Err(UnknownFeeBucket(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_belong_to_the_lower_bucket() {
        assert!(FeeBucket::UpTo6000.contains(0));
        assert!(FeeBucket::UpTo6000.contains(6000));
        assert!(!FeeBucket::From6000To10000.contains(6000));
        assert!(FeeBucket::From6000To10000.contains(6001));
        assert!(FeeBucket::From6000To10000.contains(10000));
        assert!(!FeeBucket::Over20000.contains(20000));
        assert!(FeeBucket::Over20000.contains(20001));
    }

    #[test]
    fn every_fee_has_exactly_one_bucket() {
        for fee in [0, 5999, 6000, 6001, 10000, 14999, 15000, 20000, 20001, u64::MAX] {
            let hits = FeeBucket::ALL.iter().filter(|b| b.contains(fee)).count();
            assert_eq!(hits, 1, "fee {fee}");
        }
        assert_eq!(FeeBucket::for_fee(12000), FeeBucket::From10000To15000);
    }

    #[test]
    fn parses_page_labels() {
        assert_eq!("≤6000".parse::<FeeBucket>().unwrap(), FeeBucket::UpTo6000);
        assert_eq!("under-6000".parse::<FeeBucket>().unwrap(), FeeBucket::UpTo6000);
        assert_eq!("20000+".parse::<FeeBucket>().unwrap(), FeeBucket::Over20000);
        assert_eq!(FeeBucket::parse_optional("any").unwrap(), None);
        assert!("cheap".parse::<FeeBucket>().is_err());
    }

    #[test]
    fn labels_parse_back() {
        for bucket in FeeBucket::ALL {
            assert_eq!(bucket.to_string().parse::<FeeBucket>().unwrap(), bucket);
        }
    }
}
