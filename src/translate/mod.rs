//! API translation between the Anthropic Messages and OpenAI Responses formats.
//!
//! The core of the bridge: converts requests, responses, and streaming events
//! in both directions. Everything here is pure or lazily pull-driven (no I/O).

pub mod convert;
pub mod messages_types;
pub mod request;
pub mod response;
pub mod responses_types;
pub mod sse;
pub mod streaming;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which way a payload is being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// OpenAI Responses payloads in, Anthropic Messages payloads out.
    ResponsesToMessages,
    /// Anthropic Messages payloads in, OpenAI Responses payloads out.
    MessagesToResponses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Messages,
    Responses,
}

impl Direction {
    pub fn source(self) -> Protocol {
        match self {
            Direction::ResponsesToMessages => Protocol::Responses,
            Direction::MessagesToResponses => Protocol::Messages,
        }
    }

    pub fn target(self) -> Protocol {
        match self {
            Direction::ResponsesToMessages => Protocol::Messages,
            Direction::MessagesToResponses => Protocol::Responses,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::ResponsesToMessages => Direction::MessagesToResponses,
            Direction::MessagesToResponses => Direction::ResponsesToMessages,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ResponsesToMessages => write!(f, "responses-to-messages"),
            Direction::MessagesToResponses => write!(f, "messages-to-responses"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "responses-to-messages" | "openai-to-anthropic" => Ok(Direction::ResponsesToMessages),
            "messages-to-responses" | "anthropic-to-openai" => Ok(Direction::MessagesToResponses),
            other => Err(format!(
                "unknown direction '{}' (expected responses-to-messages or messages-to-responses)",
                other
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Messages => write!(f, "messages"),
            Protocol::Responses => write!(f, "responses"),
        }
    }
}

/// Knobs shared by the request, response and stream converters.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Used for `max_tokens` when a Responses request omits `max_output_tokens`.
    pub default_max_tokens: Option<u64>,
    /// Model name reported to the client in place of the upstream one.
    pub model: Option<String>,
    /// Id for the synthesized Messages `message_start`.
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing() {
        assert_eq!(
            "responses-to-messages".parse::<Direction>().unwrap(),
            Direction::ResponsesToMessages
        );
        assert_eq!(
            "Anthropic_To_OpenAI".parse::<Direction>().unwrap(),
            Direction::MessagesToResponses
        );
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_round_trips_through_display() {
        for d in [Direction::ResponsesToMessages, Direction::MessagesToResponses] {
            assert_eq!(d.to_string().parse::<Direction>().unwrap(), d);
            assert_eq!(d.reverse().source(), d.target());
        }
    }
}
