//! Topic names and patterns.
//!
//! Patterns follow MQTT filter syntax: `+` matches exactly one level and `#`, which may only appear as the final level,
//! matches any number of remaining levels.
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::vm_types::{CorrelationToken, LogCategory, MachineCode};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid topic pattern '{pattern}'. {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Exact(String),
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    levels: Vec<Level>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, InvalidPattern> {
        let invalid = |reason: &str| InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() };
        if pattern.is_empty() {
            return Err(invalid("Patterns cannot be empty"));
        }
        let parts = pattern.split('/').collect::<Vec<_>>();
        let last = parts.len() - 1;
        let levels = parts
            .iter()
            .enumerate()
            .map(|(i, part)| match *part {
                "+" => Ok(Level::Single),
                "#" if i == last => Ok(Level::Multi),
                "#" => Err(invalid("'#' is only allowed as the last level")),
                p if p.contains(['+', '#']) => Err(invalid("Wildcards must occupy a whole level")),
                p => Ok(Level::Exact(p.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { source: pattern.to_string(), levels })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// If the topic matches, returns the topic levels captured by the wildcards, in order. A trailing `#` captures the
    /// remainder of the topic as a single string.
    pub fn captures<'t>(&self, topic: &'t str) -> Option<Vec<&'t str>> {
        let mut captures = Vec::new();
        let mut rest = Some(topic);
        for level in &self.levels {
            let current = match (level, rest) {
                (Level::Multi, rest) => {
                    captures.push(rest.unwrap_or_default());
                    return Some(captures);
                },
                (_, None) => return None,
                (_, Some(current)) => current,
            };
            let (head, tail) = match current.split_once('/') {
                Some((h, t)) => (h, Some(t)),
                None => (current, None),
            };
            match level {
                Level::Exact(s) if s == head => {},
                Level::Single => captures.push(head),
                _ => return None,
            }
            rest = tail;
        }
        rest.is_none().then_some(captures)
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.captures(topic).is_some()
    }
}

impl Display for TopicPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Builds concrete topics and subscription patterns under a common root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topics {
    root: String,
}

impl Topics {
    pub fn new(root: &str) -> Self {
        Self { root: root.trim_matches('/').to_string() }
    }

    fn topic(&self, path: &str) -> String {
        if self.root.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", self.root)
        }
    }

    pub fn heartbeat(&self, code: &MachineCode) -> String {
        self.topic(&format!("device/{code}/heartbeat"))
    }

    pub fn state(&self, code: &MachineCode) -> String {
        self.topic(&format!("device/{code}/state"))
    }

    pub fn command(&self, code: &MachineCode) -> String {
        self.topic(&format!("device/{code}/command"))
    }

    pub fn intent(&self, token: &CorrelationToken) -> String {
        self.topic(&format!("order/intent/{token}"))
    }

    pub fn outcome(&self, token: &CorrelationToken) -> String {
        self.topic(&format!("order/outcome/{token}"))
    }

    /// The routing table: one pattern per classified category.
    pub fn routes(&self) -> Vec<(String, LogCategory)> {
        vec![
            (self.topic("device/+/heartbeat"), LogCategory::Heartbeat),
            (self.topic("device/+/state"), LogCategory::State),
            (self.topic("order/intent/+"), LogCategory::Order),
            (self.topic("order/outcome/+"), LogCategory::Outcome),
            (self.topic("device/+/command"), LogCategory::Command),
        ]
    }

    /// The patterns an inbound bridge subscribes to. Commands are excluded since the dispatcher logs them as it sends
    /// them.
    pub fn subscriptions(&self) -> Vec<String> {
        self.routes().into_iter().filter(|(_, c)| *c != LogCategory::Command).map(|(p, _)| p).collect()
    }
}
