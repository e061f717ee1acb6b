//! Profiled device values.

/// Previously profiled Mermin correlator values for known backends.
pub const EXPECTED_CORRELATOR: &[(&str, f64)] = &[("ibmq_ourense", 3.15), ("ibmq_valencia", 2.98)];

/// Profiled correlator for `backend_name`, if known.
pub fn expected_correlator(backend_name: &str) -> Option<f64> {
    EXPECTED_CORRELATOR
        .iter()
        .find(|(name, _)| *name == backend_name)
        .map(|&(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_correlator_lookup() {
        assert_eq!(expected_correlator("ibmq_ourense"), Some(3.15));
        assert_eq!(expected_correlator("ibmq_valencia"), Some(2.98));
        assert_eq!(expected_correlator("statevector_simulator"), None);
    }
}
