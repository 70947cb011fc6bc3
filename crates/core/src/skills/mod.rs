//! # Triad Skills
//!
//! One skill per pipeline stage. Each reads the state, talks to the
//! completion gateway, emits progress events and returns a state delta.
//!
//! ```text
//! PlannerSkill → DispatchSkill → (SimplifierSkill → ValidatorSkill)* → SynthesizerSkill
//! ```
//!
//! **Support:**
//! - `prompts` - bundled prompt templates and database overrides
//! - `personas` - the Isaac / Layla / Nova table
//! - `json_extract` - balanced JSON object extraction
//! - `llm_helpers` - stage context and the ordered per-agent join

pub mod json_extract;
pub mod llm_helpers;
pub mod personas;
pub mod prompts;

pub mod dispatch_skill;
pub mod planner_skill;
pub mod simplifier_skill;
pub mod synthesizer_skill;
pub mod validator_skill;

pub use dispatch_skill::DispatchSkill;
pub use llm_helpers::StageContext;
pub use personas::{Persona, PersonaTable};
pub use planner_skill::{PlanOutput, PlannerSkill};
pub use prompts::{PromptLibrary, Prompts};
pub use simplifier_skill::SimplifierSkill;
pub use synthesizer_skill::SynthesizerSkill;
pub use validator_skill::ValidatorSkill;
