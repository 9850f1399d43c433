//! Contact and persona directory.
//!
//! Personas are read-only input to a call: the live stream is told who to
//! impersonate through the system instruction built here.

use serde::{Deserialize, Serialize};

/// Id of the default assistant persona.
pub const ASSISTANT_ID: &str = "1";

/// Presence shown next to a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Online,
    Offline,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Online => write!(f, "online"),
            Presence::Offline => write!(f, "offline"),
        }
    }
}

/// A contact the user can chat with or call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(default)]
    pub presence: Presence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub personality: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<String>,
}

impl Persona {
    /// System instruction for a voice call with this persona.
    pub fn system_instruction(&self) -> String {
        format!(
            "You are on a voice call. You are simulating {}. Personality: {}. Keep your verbal responses natural, and friendly. Since it's a voice call, avoid saying long sentences unless necessary.",
            self.name, self.personality
        )
    }

    /// Id that replies in this conversation are attributed to.
    ///
    /// Groups answer as their first member, or as the assistant when empty.
    pub fn reply_sender_id(&self) -> &str {
        if self.is_group {
            self.member_ids
                .first()
                .map(String::as_str)
                .unwrap_or(ASSISTANT_ID)
        } else {
            &self.id
        }
    }
}

fn avatar(seed: &str) -> String {
    format!("https://picsum.photos/seed/{}/200", seed)
}

/// In-memory directory of personas.
#[derive(Debug, Clone, Default)]
pub struct PersonaDirectory {
    personas: Vec<Persona>,
}

impl PersonaDirectory {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    /// The built-in contacts.
    pub fn built_in() -> Self {
        Self::new(vec![
            Persona {
                id: ASSISTANT_ID.to_string(),
                name: "Gemini AI Assistant".to_string(),
                avatar: avatar("gemini"),
                presence: Presence::Online,
                last_seen: None,
                personality: "A helpful and efficient AI assistant that can generate images, answer complex questions, and chat about anything.".to_string(),
                is_group: false,
                member_ids: Vec::new(),
            },
            Persona {
                id: "group_1".to_string(),
                name: "Tech Enthusiasts".to_string(),
                avatar: avatar("techgroup"),
                presence: Presence::Online,
                last_seen: None,
                personality: "A group of tech lovers. Members: Alex and Sarah.".to_string(),
                is_group: true,
                member_ids: vec!["2".to_string(), "3".to_string()],
            },
            Persona {
                id: "2".to_string(),
                name: "Alex Rivera".to_string(),
                avatar: avatar("alex"),
                presence: Presence::Offline,
                last_seen: Some("last seen today at 10:45 AM".to_string()),
                personality: "A creative professional who loves talking about design, tech trends, and coffee.".to_string(),
                is_group: false,
                member_ids: Vec::new(),
            },
            Persona {
                id: "3".to_string(),
                name: "Sarah Chen".to_string(),
                avatar: avatar("sarah"),
                presence: Presence::Online,
                last_seen: None,
                personality: "A software engineer who likes solving hard problems and sharing coding tips.".to_string(),
                is_group: false,
                member_ids: Vec::new(),
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    /// Members of a group, in declaration order. Unknown ids are skipped.
    pub fn members(&self, group_id: &str) -> Vec<&Persona> {
        self.get(group_id)
            .map(|group| {
                group
                    .member_ids
                    .iter()
                    .filter_map(|id| self.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}
