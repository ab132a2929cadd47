//! Agent registry — resolved descriptors plus precomputed discovery cards.
//!
//! Cards are built once at construction so the discovery endpoints serve
//! them without per-request work. Lookup is O(1) by agent id.

use std::collections::HashMap;

use crate::config::{AgentDescriptor, ConfigError, TransportKind};
use crate::types::{AgentCapabilities, AgentCard};

/// Protocol version advertised on every card.
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Registry of all configured agents.
#[derive(Debug)]
pub struct AgentRegistry {
    descriptors: HashMap<String, AgentDescriptor>,
    cards: HashMap<String, AgentCard>,
    /// Configuration order, for stable listings.
    order: Vec<String>,
}

impl AgentRegistry {
    /// Build the registry from resolved descriptors.
    ///
    /// `public_base_url` is the gateway's externally visible base URL; each
    /// card's `url` points at `<base>/agents/<id>/`. Duplicate agent ids
    /// reject construction.
    pub fn new(
        descriptors: Vec<AgentDescriptor>,
        public_base_url: &str,
    ) -> Result<Self, ConfigError> {
        let base = public_base_url.trim_end_matches('/');
        let mut by_id = HashMap::with_capacity(descriptors.len());
        let mut cards = HashMap::with_capacity(descriptors.len());
        let mut order = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if by_id.contains_key(&descriptor.id) {
                return Err(ConfigError::DuplicateAgent {
                    id: descriptor.id.clone(),
                });
            }
            order.push(descriptor.id.clone());
            cards.insert(descriptor.id.clone(), build_card(&descriptor, base));
            by_id.insert(descriptor.id.clone(), descriptor);
        }

        Ok(Self {
            descriptors: by_id,
            cards,
            order,
        })
    }

    /// Descriptor lookup by id.
    pub fn get(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.descriptors.get(agent_id)
    }

    /// Discovery card lookup by id.
    pub fn card(&self, agent_id: &str) -> Option<&AgentCard> {
        self.cards.get(agent_id)
    }

    /// All discovery cards, in configuration order.
    pub fn cards(&self) -> Vec<&AgentCard> {
        self.order
            .iter()
            .filter_map(|id| self.cards.get(id))
            .collect()
    }

    /// All descriptors, in configuration order.
    pub fn descriptors(&self) -> Vec<&AgentDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.descriptors.get(id))
            .collect()
    }

    /// Whether an agent with this id exists.
    pub fn has(&self, agent_id: &str) -> bool {
        self.descriptors.contains_key(agent_id)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn build_card(descriptor: &AgentDescriptor, base: &str) -> AgentCard {
    AgentCard {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        version: descriptor.version.clone(),
        url: format!("{}/agents/{}/", base, descriptor.id),
        capabilities: AgentCapabilities {
            streaming: descriptor.transport == TransportKind::Socket,
            push_notifications: false,
            state_transition_history: false,
        },
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        skills: descriptor.skills.clone(),
    }
}
