use regex::Regex;

/// Swiss QR/ISR references are 26 or 27 contiguous digits. Shorter or
/// longer digit runs are customer numbers, phone numbers, or line noise.
const REFERENCE_MIN_DIGITS: usize = 26;
const REFERENCE_MAX_DIGITS: usize = 27;

/// Finds the canonical structured payment reference in the remittance
/// fields of a transaction. Banks deliver it either in the dedicated
/// creditor-reference element or buried in free text, so both are
/// scanned — creditor reference first.
pub struct ReferenceExtractor {
    digit_run: Regex,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        ReferenceExtractor {
            digit_run: Regex::new(r"[0-9]+").unwrap(),
        }
    }
}

impl ReferenceExtractor {
    pub fn extract(
        &self,
        creditor_reference: Option<&str>,
        remittance: Option<&str>,
    ) -> Option<String> {
        creditor_reference
            .and_then(|text| self.scan(text))
            .or_else(|| remittance.and_then(|text| self.scan(text)))
    }

    /// First digit run of canonical length; runs of any other length are
    /// never considered, even as a prefix.
    fn scan(&self, text: &str) -> Option<String> {
        self.digit_run
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|run| (REFERENCE_MIN_DIGITS..=REFERENCE_MAX_DIGITS).contains(&run.len()))
            .map(str::to_string)
    }
}
