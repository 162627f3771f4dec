pub mod error;
pub mod config;
pub mod core {
    pub mod dsl;
    pub mod media;
    pub mod runtime;
    pub mod schema;
}
pub mod ai {
    pub mod client;
    pub mod flows;
    pub mod prompts;
    pub mod schema_utils;
}
pub mod catalog;
pub mod orchestrator;
pub mod server;
pub mod testing;

pub use ai::client::{GeminiClient, GeminiConfig, ModelClient, ModelRequest};
pub use ai::flows::{
    GenerateRecipeInput, GenerateRecipeOutput, IdentifyIngredientsInput, IdentifyIngredientsOutput,
    RecipeFlows,
};
pub use error::{FlowError, FlowErrorKind, ModelError, SchemaError};
pub use orchestrator::{Flow, FlowDefinition, Orchestrator};
