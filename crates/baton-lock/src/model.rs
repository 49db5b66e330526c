//! Lock state model

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use baton_api::{PeerId, TokenSnapshot};

/// Per-peer lock state
///
/// Exactly one peer in the cluster is in `TokenPresent` or `TokenHeld` at
/// any instant under normal operation; all others are `NoToken`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Token is elsewhere (or in flight)
    #[default]
    NoToken,
    /// Token is here, critical section not entered
    TokenPresent,
    /// Token is here and the critical section is occupied
    TokenHeld,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::NoToken => "no_token",
            LockState::TokenPresent => "token_present",
            LockState::TokenHeld => "token_held",
        }
    }

    /// Whether the token is physically at this peer
    pub fn has_token(&self) -> bool {
        !matches!(self, LockState::NoToken)
    }
}

impl Display for LockState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LockState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_token" => Ok(LockState::NoToken),
            "token_present" => Ok(LockState::TokenPresent),
            "token_held" => Ok(LockState::TokenHeld),
            _ => Err(format!("Invalid lock state: {}", s)),
        }
    }
}

/// Read-only snapshot of the engine state, for diagnostics
#[derive(Clone, Debug, Serialize)]
pub struct LockStatus {
    pub state: LockState,
    /// Logical clock, not wall-clock time
    pub time: u64,
    /// Highest request time seen per known peer
    pub requests: Vec<(PeerId, u64)>,
    /// Token map, present only while this peer holds the token
    pub token: Option<TokenSnapshot>,
}

impl Display for LockStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "State   :: {}", self.state)?;
        write!(f, "Request :: {{")?;
        for (i, (id, time)) in self.requests.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", id, time)?;
        }
        writeln!(f, "}}")?;
        match &self.token {
            Some(token) => {
                write!(f, "Token   :: {{")?;
                for (i, (id, time)) in token.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", id, time)?;
                }
                writeln!(f, "}}")?;
            }
            None => writeln!(f, "Token   :: (absent)")?,
        }
        write!(f, "Time    :: {}", self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state_round_trip() {
        for state in [
            LockState::NoToken,
            LockState::TokenPresent,
            LockState::TokenHeld,
        ] {
            assert_eq!(state.as_str().parse::<LockState>().unwrap(), state);
        }
        assert!("held".parse::<LockState>().is_err());
    }

    #[test]
    fn test_has_token() {
        assert!(!LockState::NoToken.has_token());
        assert!(LockState::TokenPresent.has_token());
        assert!(LockState::TokenHeld.has_token());
    }

    #[test]
    fn test_status_display() {
        let status = LockStatus {
            state: LockState::TokenPresent,
            time: 7,
            requests: vec![(PeerId(1), 0), (PeerId(3), 5)],
            token: Some(TokenSnapshot(vec![(PeerId(1), 2), (PeerId(3), 2)])),
        };
        let text = status.to_string();
        assert!(text.contains("State   :: token_present"));
        assert!(text.contains("Request :: {1: 0, 3: 5}"));
        assert!(text.contains("Token   :: {1: 2, 3: 2}"));
        assert!(text.contains("Time    :: 7"));
    }
}
