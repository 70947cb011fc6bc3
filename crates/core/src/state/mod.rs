pub mod conversations;
pub mod db;
pub mod pipeline_state;

pub use db::{PromptTemplate, TriadDb};

pub use conversations::{
    ConversationRecord, ConversationStore, ConversationSummary, SqliteConversationStore,
};
pub use pipeline_state::{AgentTask, PipelineState, StateDelta};
