//! Default prompt templates bundled at compile time.
//!
//! These are used for seeding the database on first run.
//! At runtime, prompts are loaded from the database to allow customization.

use std::sync::Arc;

use crate::state::db::TriadDb;

/// Planner (Eleanor) - reasons about the prompt and delegates three tasks
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// Isaac - strictly factual researcher
pub const ISAAC: &str = include_str!("defaults/isaac.md");

/// Layla - practical, lightly creative problem solver
pub const LAYLA: &str = include_str!("defaults/layla.md");

/// Nova - exploratory visionary
pub const NOVA: &str = include_str!("defaults/nova.md");

/// Simplifier - rewrites for a lay reader
pub const SIMPLIFIER: &str = include_str!("defaults/simplifier.md");

/// Validator - single clarity score 1-10
pub const VALIDATOR: &str = include_str!("defaults/validator.md");

/// Synthesizer - merges everything into the final answer
pub const SYNTHESIZER: &str = include_str!("defaults/synthesizer.md");

/// All default prompts with their slugs for seeding
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("planner", PLANNER),
        ("isaac", ISAAC),
        ("layla", LAYLA),
        ("nova", NOVA),
        ("simplifier", SIMPLIFIER),
        ("validator", VALIDATOR),
        ("synthesizer", SYNTHESIZER),
    ]
}

/// Bundled default for a slug
pub fn default_for(slug: &str) -> Option<&'static str> {
    all_defaults()
        .into_iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, content)| content)
}

/// Prompt lookup: the database copy when present, else the bundled default
#[derive(Clone, Default)]
pub struct PromptLibrary {
    db: Option<Arc<TriadDb>>,
}

impl PromptLibrary {
    /// Bundled defaults only
    pub fn defaults() -> Self {
        Self::default()
    }

    pub fn with_db(db: Arc<TriadDb>) -> Self {
        Self { db: Some(db) }
    }

    /// Resolve one prompt. Unknown slugs resolve to an empty string.
    pub fn get(&self, slug: &str) -> String {
        if let Some(db) = &self.db {
            match db.prompt(slug) {
                Ok(Some(template)) => return template.content,
                Ok(None) => tracing::debug!("Prompt '{}' not stored; using bundled copy", slug),
                Err(e) => tracing::warn!("Failed to read prompt '{}': {}", slug, e),
            }
        }
        default_for(slug).unwrap_or_default().to_string()
    }

    /// Snapshot every prompt a run needs, so edits mid-run have no effect on it
    pub fn resolve(&self) -> Prompts {
        Prompts {
            planner: self.get("planner"),
            personas: [self.get("isaac"), self.get("layla"), self.get("nova")],
            simplifier: self.get("simplifier"),
            validator: self.get("validator"),
            synthesizer: self.get("synthesizer"),
        }
    }
}

/// Prompt texts for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    pub planner: String,
    /// Persona prompts in persona-table order
    pub personas: [String; 3],
    pub simplifier: String,
    pub validator: String,
    pub synthesizer: String,
}

impl Default for Prompts {
    fn default() -> Self {
        PromptLibrary::defaults().resolve()
    }
}
