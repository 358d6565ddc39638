//! Typed message templates.
//!
//! Templates carry a closed set of named placeholders resolved against the
//! lead and agent projections. Unknown placeholders are rejected when a
//! sequence is authored, not silently left unresolved at send time.

use serde::{Deserialize, Serialize};

use super::domain::{AgentProfile, LeadContact};

/// The closed placeholder vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    FirstName,
    LastName,
    Email,
    Phone,
    PropertyAddress,
    AgentName,
    AgentSignature,
}

impl Placeholder {
    pub const fn token(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::PropertyAddress => "property_address",
            Self::AgentName => "agent_name",
            Self::AgentSignature => "agent_signature",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "first_name" => Some(Self::FirstName),
            "last_name" => Some(Self::LastName),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "property_address" => Some(Self::PropertyAddress),
            "agent_name" => Some(Self::AgentName),
            "agent_signature" => Some(Self::AgentSignature),
            _ => None,
        }
    }

    /// Resolve against the typed projections. Absent fields render as the
    /// empty string rather than failing the dispatch.
    fn resolve(self, lead: &LeadContact, agent: Option<&AgentProfile>) -> String {
        match self {
            Self::FirstName => lead.first_name.clone(),
            Self::LastName => lead.last_name.clone(),
            Self::Email => lead.email.clone().unwrap_or_default(),
            Self::Phone => lead.phone.clone().unwrap_or_default(),
            Self::PropertyAddress => lead.property_address.clone().unwrap_or_default(),
            Self::AgentName => agent.map(|a| a.name.clone()).unwrap_or_default(),
            Self::AgentSignature => agent.map(|a| a.signature.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed, authoring-time-validated message template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices();

        while let Some((start, c)) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }

            let rest = &raw[start + 1..];
            let Some(end) = rest.find('}') else {
                return Err(TemplateError::UnclosedPlaceholder { position: start });
            };
            let token = &rest[..end];
            let placeholder = Placeholder::from_token(token).ok_or_else(|| {
                TemplateError::UnknownPlaceholder {
                    name: token.to_string(),
                }
            })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(placeholder));

            // Skip past the placeholder body and closing brace.
            for _ in 0..=end {
                chars.next();
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn render(&self, lead: &LeadContact, agent: Option<&AgentProfile>) -> String {
        let mut rendered = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Field(placeholder) => {
                    rendered.push_str(&placeholder.resolve(lead, agent));
                }
            }
        }
        rendered
    }

    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(placeholder) => Some(*placeholder),
            Segment::Literal(_) => None,
        })
    }
}

impl std::fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for MessageTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MessageTemplate> for String {
    fn from(value: MessageTemplate) -> Self {
        value.raw
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{name}}}'")]
    UnknownPlaceholder { name: String },
    #[error("unclosed placeholder starting at byte {position}")]
    UnclosedPlaceholder { position: usize },
}
