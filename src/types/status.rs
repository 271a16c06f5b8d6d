//! Connection status

use serde::{Deserialize, Serialize};

/// Connection lifecycle state.
///
/// Transitions:
/// - `Disconnected -> NoData` on connect
/// - `NoData -> Receiving` when a receive yields a frame
/// - `Receiving -> NoData` when a receive times out
/// - any state `-> Disconnected` on disconnect or a fatal socket error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[repr(u8)]
pub enum ConnectionStatus {
    #[default]
    Disconnected = 0,
    Receiving = 1,
    NoData = 2,
}

impl ConnectionStatus {
    /// Whether the socket is open
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Staying in the same state is always allowed; it is simply not observable.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (_, Disconnected) => true,
            (Disconnected, NoData) => true,
            (NoData, Receiving) | (Receiving, NoData) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionStatus::*;

    #[test]
    fn numeric_values_match_wire_enumeration() {
        assert_eq!(Disconnected as u8, 0);
        assert_eq!(Receiving as u8, 1);
        assert_eq!(NoData as u8, 2);
    }

    #[test]
    fn only_defined_edges_are_allowed() {
        assert!(Disconnected.can_transition_to(NoData));
        assert!(!Disconnected.can_transition_to(Receiving));
        assert!(NoData.can_transition_to(Receiving));
        assert!(Receiving.can_transition_to(NoData));
        assert!(Receiving.can_transition_to(Disconnected));
        assert!(NoData.can_transition_to(Disconnected));
        assert!(NoData.can_transition_to(NoData));
    }

    #[test]
    fn connected_states() {
        assert!(!Disconnected.is_connected());
        assert!(NoData.is_connected());
        assert!(Receiving.is_connected());
    }
}
