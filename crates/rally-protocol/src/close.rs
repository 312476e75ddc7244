//! Close codes the server uses when it hangs up on a client.
//!
//! Codes in the 4000 range are application-defined; clients match on the
//! number, and the reason text is only for humans reading logs.

use rally_transport::CloseReason;

/// Ordinary shutdown.
pub const NORMAL: u16 = 1000;

/// The client could not keep up with outbound traffic.
pub const POLICY_VIOLATION: u16 = 1008;

/// Missing or rejected credential.
pub const AUTH_FAILED: u16 = 4001;

/// The requested match session does not exist.
pub const SESSION_NOT_FOUND: u16 = 4004;

/// The same user is already seated in the requested match.
pub const DUPLICATE_PARTICIPANT: u16 = 4005;

/// The connection path matched no known endpoint.
pub const UNKNOWN_ROUTE: u16 = 4008;

pub fn normal() -> CloseReason {
    CloseReason::new(NORMAL, "bye")
}

pub fn game_closed() -> CloseReason {
    CloseReason::new(NORMAL, "game closed")
}

pub fn slow_consumer() -> CloseReason {
    CloseReason::new(POLICY_VIOLATION, "outbound queue full")
}

pub fn auth_failed() -> CloseReason {
    CloseReason::new(AUTH_FAILED, "authentication failed")
}

pub fn session_not_found() -> CloseReason {
    CloseReason::new(SESSION_NOT_FOUND, "game not found")
}

pub fn duplicate_participant() -> CloseReason {
    CloseReason::new(DUPLICATE_PARTICIPANT, "already in this game")
}

pub fn unknown_route() -> CloseReason {
    CloseReason::new(UNKNOWN_ROUTE, "unknown endpoint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_helpers_carry_expected_codes() {
        assert_eq!(auth_failed().code, 4001);
        assert_eq!(session_not_found().code, 4004);
        assert_eq!(duplicate_participant().code, 4005);
        assert_eq!(unknown_route().code, 4008);
        assert_eq!(slow_consumer().code, 1008);
        assert_eq!(normal().code, 1000);
        assert_eq!(game_closed().code, 1000);
    }
}
