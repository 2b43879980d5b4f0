//! Element lifecycle phases.

use crate::error::ElementError;

/// Where an element is in its lifecycle.
///
/// ```text
/// Defined -> Interpreted -> Instantiating -> Live
///     \____________\_____________\____________\___> Destroyed
/// ```
///
/// An interpreted element may be updated any number of times. A live element stays live across
/// updates, unless it is updated into a placeholder. An element whose instantiation fails drops
/// back to `Interpreted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Defined,
    Interpreted,
    Instantiating,
    Live,
    Destroyed,
}

impl Phase {
    pub fn can_transition(self, to: Phase) -> bool {
        use Phase::*;
        match (self, to) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Defined, Interpreted) => true,
            (Interpreted, Interpreted) => true,
            (Interpreted, Instantiating) => true,
            (Instantiating, Live) => true,
            (Instantiating, Interpreted) => true,
            (Live, Live) => true,
            // updated into a placeholder
            (Live, Interpreted) => true,
            _ => false,
        }
    }

    pub(crate) fn transition(&mut self, to: Phase) -> Result<(), ElementError> {
        if self.can_transition(to) {
            *self = to;
            Ok(())
        } else {
            Err(ElementError::Lifecycle { from: *self, to })
        }
    }

    /// Whether the element has been bound to a model set.
    pub fn is_instantiated(self) -> bool {
        matches!(self, Phase::Instantiating | Phase::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        let mut phase = Phase::Defined;
        phase.transition(Phase::Interpreted).unwrap();
        phase.transition(Phase::Instantiating).unwrap();
        phase.transition(Phase::Live).unwrap();
        phase.transition(Phase::Live).unwrap();
        assert!(phase.transition(Phase::Instantiating).is_err());
        phase.transition(Phase::Destroyed).unwrap();
        assert_eq!(
            phase.transition(Phase::Destroyed),
            Err(ElementError::Lifecycle {
                from: Phase::Destroyed,
                to: Phase::Destroyed
            })
        );
    }
}
