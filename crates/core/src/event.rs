//! Events accepted by the dispatcher.

use std::fmt;
use std::str::FromStr;

/// Signal driving the dispatcher. Consumed synchronously, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Perform one remote call on the worker pool.
    Invoke,
    /// Surface a diagnostic; no work is scheduled.
    Error,
    /// Do nothing.
    Nothing,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Invoke => "invoke",
            Event::Error => "error",
            Event::Nothing => "nothing",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoke" => Ok(Event::Invoke),
            "error" => Ok(Event::Error),
            "nothing" | "none" => Ok(Event::Nothing),
            other => Err(format!("Unknown event: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        assert_eq!("invoke".parse::<Event>().unwrap(), Event::Invoke);
        assert_eq!(" ERROR ".parse::<Event>().unwrap(), Event::Error);
        assert_eq!("nothing".parse::<Event>().unwrap(), Event::Nothing);
        assert_eq!("none".parse::<Event>().unwrap(), Event::Nothing);
        assert!("explode".parse::<Event>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for event in [Event::Invoke, Event::Error, Event::Nothing] {
            assert_eq!(event.to_string().parse::<Event>().unwrap(), event);
        }
    }
}
