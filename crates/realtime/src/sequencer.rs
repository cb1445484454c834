/// Strict sequential ordering of server messages.
///
/// `client_version` is the version of the last server-ordered message fully
/// applied. An ordered message is accepted only when it is exactly one past
/// it; anything further ahead means messages were missed, anything at or
/// below it is a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    Accept,
    Gap { expected: u64, received: u64 },
    Stale { current: u64, received: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sequencer {
    client_version: u64,
}

impl Sequencer {
    pub fn new(client_version: u64) -> Self {
        Self { client_version }
    }

    pub fn client_version(&self) -> u64 {
        self.client_version
    }

    /// Checks `version` and advances the counter when it is accepted.
    pub fn validate(&mut self, version: u64) -> SequenceCheck {
        // at u64::MAX nothing can follow, every version is at or below the counter
        let Some(expected) = self.client_version.checked_add(1) else {
            return SequenceCheck::Stale {
                current: self.client_version,
                received: version,
            };
        };
        if version == expected {
            self.client_version = version;
            SequenceCheck::Accept
        } else if version > expected {
            SequenceCheck::Gap {
                expected,
                received: version,
            }
        } else {
            SequenceCheck::Stale {
                current: self.client_version,
                received: version,
            }
        }
    }

    /// Acks confirm our own optimistic sends, so they only move forward and
    /// never count as a gap.
    pub fn ratchet(&mut self, version: u64) -> bool {
        if version > self.client_version {
            self.client_version = version;
            true
        } else {
            false
        }
    }

    /// Unconditional reset from a bulk `init`.
    pub fn reset(&mut self, version: u64) {
        self.client_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_consecutive_versions_and_stops_at_gap() {
        let mut seq = Sequencer::default();
        assert_eq!(seq.validate(1), SequenceCheck::Accept);
        assert_eq!(seq.validate(2), SequenceCheck::Accept);
        assert_eq!(
            seq.validate(4),
            SequenceCheck::Gap {
                expected: 3,
                received: 4
            }
        );
        assert_eq!(seq.client_version(), 2);
    }

    #[test]
    fn duplicates_do_not_move_the_counter() {
        let mut seq = Sequencer::new(2);
        assert_eq!(
            seq.validate(2),
            SequenceCheck::Stale {
                current: 2,
                received: 2
            }
        );
        assert!(matches!(seq.validate(0), SequenceCheck::Stale { .. }));
        assert_eq!(seq.client_version(), 2);
    }

    #[test]
    fn ack_only_ratchets_forward() {
        let mut seq = Sequencer::new(3);
        assert!(seq.ratchet(5));
        assert!(!seq.ratchet(2));
        assert_eq!(seq.client_version(), 5);
    }

    #[test]
    fn saturated_counter_after_init_treats_everything_as_stale() {
        let mut seq = Sequencer::default();
        seq.reset(u64::MAX);
        assert_eq!(
            seq.validate(1),
            SequenceCheck::Stale {
                current: u64::MAX,
                received: 1
            }
        );
        assert!(matches!(seq.validate(u64::MAX), SequenceCheck::Stale { .. }));
        assert_eq!(seq.client_version(), u64::MAX);
    }

    #[test]
    fn saturated_counter_after_ack_treats_everything_as_stale() {
        let mut seq = Sequencer::new(3);
        assert!(seq.ratchet(u64::MAX));
        assert!(matches!(seq.validate(4), SequenceCheck::Stale { .. }));
        assert!(!seq.ratchet(u64::MAX));
        assert_eq!(seq.client_version(), u64::MAX);
    }

    #[test]
    fn reset_may_move_backwards() {
        let mut seq = Sequencer::new(10);
        seq.reset(4);
        assert_eq!(seq.client_version(), 4);
        assert_eq!(seq.validate(5), SequenceCheck::Accept);
    }
}
