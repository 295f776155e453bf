//! Lookup keys: the five-field identifier addressing one certificate.
//!
//! A [`LookupKey`] is transient — produced by the caller (spreadsheet rows,
//! a key file, manual entry) and never persisted on its own. What *is*
//! durable is the artifact name it derives: the name must be stable across
//! runs so that re-running a batch skips already-downloaded certificates
//! instead of fetching them again.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The literal sub-division value meaning "no sub-division".
///
/// This is a real value the revenue service accepts, not a sentinel we
/// invented: survey numbers without sub-divisions are queried with `"-"`.
pub const NO_SUB_DIVISION: &str = "-";

/// Width the service expects for village codes (`40` → `040`).
const VILLAGE_CODE_WIDTH: usize = 3;

/// Identifies one certificate to retrieve.
///
/// Equality is exact over all five fields; `"-"` is a valid, distinct
/// sub-division value. Two keys differing only in sub-division address two
/// different certificates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupKey {
    pub district_code: String,
    pub taluk_code: String,
    pub village_code: String,
    pub survey_number: String,
    pub sub_division: String,
}

impl LookupKey {
    /// Build a key, zero-padding the village code to the service's fixed
    /// width. Other fields are taken verbatim.
    pub fn new(
        district_code: impl Into<String>,
        taluk_code: impl Into<String>,
        village_code: impl Into<String>,
        survey_number: impl Into<String>,
        sub_division: impl Into<String>,
    ) -> Self {
        let village_code = village_code.into();
        Self {
            district_code: district_code.into(),
            taluk_code: taluk_code.into(),
            village_code: format!("{:0>width$}", village_code, width = VILLAGE_CODE_WIDTH),
            survey_number: survey_number.into(),
            sub_division: sub_division.into(),
        }
    }

    /// Whether this key addresses a concrete sub-division (anything but `"-"`).
    pub fn has_sub_division(&self) -> bool {
        self.sub_division != NO_SUB_DIVISION
    }

    /// Deterministic artifact file name for this key.
    ///
    /// `{district}_{taluk}_{village}_{survey}_{subdiv}_EC.pdf`, with the
    /// sub-division segment omitted for `"-"`. Survey numbers routinely
    /// contain `/` (e.g. `384/2A`), so free-text fields are sanitised to
    /// keep the name a single path component.
    pub fn artifact_name(&self) -> String {
        let d = sanitize(&self.district_code);
        let t = sanitize(&self.taluk_code);
        let v = sanitize(&self.village_code);
        let s = sanitize(&self.survey_number);
        if self.has_sub_division() {
            let sd = sanitize(&self.sub_division);
            format!("{d}_{t}_{v}_{s}_{sd}_EC.pdf")
        } else {
            format!("{d}_{t}_{v}_{s}_EC.pdf")
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "village {} survey {} sub-division '{}'",
            self.village_code, self.survey_number, self.sub_division
        )
    }
}

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9.-]").unwrap());

/// Replace every character outside `[A-Za-z0-9.-]` with `-`.
fn sanitize(field: &str) -> String {
    RE_UNSAFE.replace_all(field, "-").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn village_code_is_zero_padded() {
        let key = LookupKey::new("29", "08", "40", "384", "2A");
        assert_eq!(key.village_code, "040");
        // Already-wide codes are left alone.
        let key = LookupKey::new("29", "08", "1234", "384", "2A");
        assert_eq!(key.village_code, "1234");
    }

    #[test]
    fn artifact_name_with_sub_division() {
        let key = LookupKey::new("29", "08", "040", "384", "2A");
        assert_eq!(key.artifact_name(), "29_08_040_384_2A_EC.pdf");
    }

    #[test]
    fn dash_sub_division_omits_the_segment() {
        let key = LookupKey::new("29", "08", "040", "384", NO_SUB_DIVISION);
        assert!(!key.has_sub_division());
        assert_eq!(key.artifact_name(), "29_08_040_384_EC.pdf");
    }

    #[test]
    fn dash_is_a_distinct_value_for_equality() {
        let dash = LookupKey::new("29", "08", "040", "384", "-");
        let one = LookupKey::new("29", "08", "040", "384", "1");
        assert_ne!(dash, one);
        assert_eq!(dash, dash.clone());
    }

    #[test]
    fn survey_number_slash_is_sanitised() {
        let key = LookupKey::new("29", "08", "040", "384/2", "1B");
        assert_eq!(key.artifact_name(), "29_08_040_384-2_1B_EC.pdf");
        // The name must be a single path component.
        assert!(!key.artifact_name().contains('/'));
    }

    #[test]
    fn key_round_trips_through_json() {
        let key = LookupKey::new("37", "01", "084", "12", "-");
        let json = serde_json::to_string(&key).unwrap();
        let back: LookupKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
