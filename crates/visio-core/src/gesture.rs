//! Touch line edges and the gestures classified from them.

use std::fmt;

use tokio::time::Instant;

/// Direction of a touch line transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Line went low to high (finger down)
    Rising,
    /// Line went high to low (finger up)
    Falling,
}

/// A single observed transition of the touch line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEdge {
    pub kind: EdgeKind,
    pub timestamp: Instant,
}

impl TouchEdge {
    pub fn rising(timestamp: Instant) -> Self {
        Self {
            kind: EdgeKind::Rising,
            timestamp,
        }
    }

    pub fn falling(timestamp: Instant) -> Self {
        Self {
            kind: EdgeKind::Falling,
            timestamp,
        }
    }
}

/// One resolved physical interaction with the touch sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Single,
    Double,
    Long,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gesture::Single => f.write_str("single"),
            Gesture::Double => f.write_str("double"),
            Gesture::Long => f.write_str("long"),
        }
    }
}
