//! # Personas
//!
//! The three task agents as one table: name, system prompt, temperature.
//! Plan tasks bind to these entries by position.

use serde::{Deserialize, Serialize};

use super::prompts::Prompts;
use crate::state::pipeline_state::AgentTask;

/// Persona names in table order
pub const PERSONA_NAMES: [&str; 3] = ["Isaac", "Layla", "Nova"];

/// One task agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
    pub temperature: f32,
}

impl Persona {
    /// Persona text followed by the delegated task
    pub fn system_prompt(&self, task: &str) -> String {
        format!("{}\nYour task is: {}", self.prompt.trim_end(), task)
    }
}

/// Ordered persona table
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaTable {
    personas: [Persona; 3],
}

impl PersonaTable {
    pub fn new(prompts: &Prompts, temperatures: [f32; 3]) -> Self {
        let persona = |i: usize| Persona {
            name: PERSONA_NAMES[i].to_string(),
            prompt: prompts.personas[i].clone(),
            temperature: temperatures[i],
        };
        Self {
            personas: [persona(0), persona(1), persona(2)],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.name.clone()).collect()
    }

    /// Pair task texts with personas positionally; the model's own names are ignored
    pub fn bind(&self, tasks: [String; 3]) -> Vec<AgentTask> {
        self.personas
            .iter()
            .zip(tasks)
            .map(|(persona, task)| AgentTask::new(persona.name.clone(), task))
            .collect()
    }
}

impl Default for PersonaTable {
    fn default() -> Self {
        Self::new(&Prompts::default(), [0.0, 0.7, 2.0])
    }
}
