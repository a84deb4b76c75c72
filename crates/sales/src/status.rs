use serde::{Deserialize, Serialize};

/// Authorization state of a sale's electronic invoice, as mirrored from the
/// tax authority (SRI).
///
/// `Processing` covers both "not yet submitted" and "submitted, awaiting the
/// authority"; the presence of an access key distinguishes the two.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SriStatus {
    /// The sale does not require e-invoicing. Terminal.
    NoElectronic,
    /// Awaiting submission or an authority verdict.
    Processing,
    /// Authority issued the voucher. Terminal.
    Authorized,
    /// Authority rejected the document, or retries were exhausted. Terminal.
    Error,
}

impl SriStatus {
    /// Terminal states are never overwritten by the pipeline or the sweeper.
    pub fn is_terminal(self) -> bool {
        match self {
            SriStatus::NoElectronic | SriStatus::Authorized | SriStatus::Error => true,
            SriStatus::Processing => false,
        }
    }

    /// Stable string form used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            SriStatus::NoElectronic => "NO_ELECTRONIC",
            SriStatus::Processing => "PROCESSING",
            SriStatus::Authorized => "AUTHORIZED",
            SriStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NO_ELECTRONIC" => Some(SriStatus::NoElectronic),
            "PROCESSING" => Some(SriStatus::Processing),
            "AUTHORIZED" => Some(SriStatus::Authorized),
            "ERROR" => Some(SriStatus::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!SriStatus::Processing.is_terminal());
        assert!(SriStatus::NoElectronic.is_terminal());
        assert!(SriStatus::Authorized.is_terminal());
        assert!(SriStatus::Error.is_terminal());
    }

    #[test]
    fn serde_matches_the_external_contract() {
        assert_eq!(
            serde_json::to_string(&SriStatus::NoElectronic).unwrap(),
            "\"NO_ELECTRONIC\""
        );
        assert_eq!(
            serde_json::to_string(&SriStatus::Authorized).unwrap(),
            "\"AUTHORIZED\""
        );
    }
}
