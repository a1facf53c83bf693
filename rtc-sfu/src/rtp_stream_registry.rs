use crate::error::{Error, Result};
use std::collections::HashMap;

/// Routing table from incoming SSRC to the id of the producer sending it.
#[derive(Debug, Default)]
pub struct RtpStreamRegistry {
    streams: HashMap<u32, String>,
}

impl RtpStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every SSRC in `ssrcs` for `producer_id`.
    ///
    /// Either all SSRCs are registered or none is: if any of them is owned
    /// by another producer the table is left untouched and
    /// [`Error::ErrSsrcConflict`] names the first offending SSRC. SSRCs
    /// already owned by the same producer are accepted.
    pub fn add_producer(&mut self, producer_id: &str, ssrcs: &[u32]) -> Result<()> {
        if let Some(ssrc) = ssrcs.iter().copied().find(|ssrc| {
            self.streams
                .get(ssrc)
                .is_some_and(|owner| owner != producer_id)
        }) {
            return Err(Error::ErrSsrcConflict(ssrc));
        }

        for &ssrc in ssrcs {
            self.streams.insert(ssrc, producer_id.to_owned());
        }

        Ok(())
    }

    /// Releases every SSRC owned by `producer_id`.
    pub fn remove_producer(&mut self, producer_id: &str) {
        self.streams.retain(|_, owner| owner != producer_id);
    }

    pub fn lookup(&self, ssrc: u32) -> Option<&str> {
        self.streams.get(&ssrc).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut registry = RtpStreamRegistry::new();
        registry.add_producer("p1", &[1000, 1001]).unwrap();

        assert_eq!(registry.lookup(1000), Some("p1"));
        assert_eq!(registry.lookup(1001), Some("p1"));
        assert_eq!(registry.lookup(1002), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_conflict_is_all_or_nothing() {
        let mut registry = RtpStreamRegistry::new();
        registry.add_producer("p1", &[1000]).unwrap();

        assert_eq!(
            registry.add_producer("p2", &[2000, 1000, 3000]),
            Err(Error::ErrSsrcConflict(1000))
        );
        assert_eq!(registry.lookup(2000), None);
        assert_eq!(registry.lookup(3000), None);
        assert_eq!(registry.lookup(1000), Some("p1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_producer_only_drops_its_ssrcs() {
        let mut registry = RtpStreamRegistry::new();
        registry.add_producer("p1", &[1000, 1001]).unwrap();
        registry.add_producer("p2", &[2000]).unwrap();

        registry.remove_producer("p1");
        registry.remove_producer("missing");

        assert_eq!(registry.lookup(1000), None);
        assert_eq!(registry.lookup(2000), Some("p2"));
        assert_eq!(registry.len(), 1);
    }
}
