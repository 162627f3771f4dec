use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::ModelClient;
use super::prompts;
use super::schema_utils::record_schema_for;
use crate::core::media::DataUri;
use crate::core::schema::Constraint;
use crate::error::{DefinitionError, FlowError};
use crate::orchestrator::{Flow, FlowDefinition, Orchestrator};

pub const GENERATE_RECIPE_FLOW: &str = "generateRecipeFromIngredients";
pub const IDENTIFY_INGREDIENTS_FLOW: &str = "identifyIngredientsFromImage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRecipeInput {
    /// A list of ingredients available to use in the recipe.
    pub ingredients: Vec<String>,
    /// Whether the recipe should be vegetarian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vegetarian: Option<bool>,
    /// Whether the recipe should be vegan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vegan: Option<bool>,
    /// Whether the recipe should be gluten-free.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gluten_free: Option<bool>,
    /// Whether the recipe should be high in protein.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_protein: Option<bool>,
}

impl GenerateRecipeInput {
    pub fn new<S: Into<String>>(ingredients: impl IntoIterator<Item = S>) -> Self {
        Self {
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRecipeOutput {
    /// The name of the generated recipe.
    pub recipe_name: String,
    /// A list of steps to prepare the recipe.
    pub steps: Vec<String>,
    /// A list of ingredients required for the recipe.
    pub required_ingredients: Vec<String>,
    /// A list of alternative suggestions for the recipe.
    pub alternative_suggestions: Vec<String>,
    /// Nutritional information, label to display value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyIngredientsInput {
    /// A photo of ingredients, as a data URI that must include a MIME type and
    /// use Base64 encoding. Expected format: 'data:<mimetype>;base64,<encoded_data>'.
    pub photo_data_uri: String,
}

impl IdentifyIngredientsInput {
    pub fn from_image(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            photo_data_uri: DataUri::from_bytes(mime_type, bytes).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentifyIngredientsOutput {
    /// A list of identified ingredients.
    pub ingredients: Vec<String>,
}

type RecipeFlow = Flow<GenerateRecipeInput, GenerateRecipeOutput>;
type IdentifyFlow = Flow<IdentifyIngredientsInput, IdentifyIngredientsOutput>;

fn generate_recipe_flow() -> Result<RecipeFlow, DefinitionError> {
    let input = record_schema_for::<GenerateRecipeInput>()?
        .with_constraint("ingredients", Constraint::NonEmpty)?;
    let output = record_schema_for::<GenerateRecipeOutput>()?;
    let definition = FlowDefinition::new(
        GENERATE_RECIPE_FLOW,
        input,
        output,
        prompts::GENERATE_RECIPE_PROMPT,
    )?;
    Ok(Flow::new(definition))
}

fn identify_ingredients_flow() -> Result<IdentifyFlow, DefinitionError> {
    let input = record_schema_for::<IdentifyIngredientsInput>()?
        .with_constraint("photoDataUri", Constraint::DataUri)?;
    let output = record_schema_for::<IdentifyIngredientsOutput>()?;
    let definition = FlowDefinition::new(
        IDENTIFY_INGREDIENTS_FLOW,
        input,
        output,
        prompts::IDENTIFY_INGREDIENTS_PROMPT,
    )?;
    Ok(Flow::new(definition))
}

/// Both flow definitions, without binding them to a model client.
pub fn flow_definitions() -> Result<Vec<FlowDefinition>, DefinitionError> {
    Ok(vec![
        generate_recipe_flow()?.definition().clone(),
        identify_ingredients_flow()?.definition().clone(),
    ])
}

/// The recipe assistant's flow boundary: one method per flow, plus lookup by
/// name for RPC callers.
pub struct RecipeFlows<C> {
    orchestrator: Orchestrator<C>,
    generate_recipe: RecipeFlow,
    identify_ingredients: IdentifyFlow,
}

impl<C: ModelClient> RecipeFlows<C> {
    pub fn new(orchestrator: Orchestrator<C>) -> Result<Self, DefinitionError> {
        let flows = Self {
            orchestrator,
            generate_recipe: generate_recipe_flow()?,
            identify_ingredients: identify_ingredients_flow()?,
        };
        log::info!(
            "🍳 Flows ready: {}",
            flows.definitions().map(FlowDefinition::name).join(", ")
        );
        Ok(flows)
    }

    pub async fn generate_recipe_from_ingredients(
        &self,
        input: &GenerateRecipeInput,
    ) -> Result<GenerateRecipeOutput, FlowError> {
        self.orchestrator.run_typed(&self.generate_recipe, input).await
    }

    pub async fn identify_ingredients_from_image(
        &self,
        input: &IdentifyIngredientsInput,
    ) -> Result<IdentifyIngredientsOutput, FlowError> {
        self.orchestrator.run_typed(&self.identify_ingredients, input).await
    }

    pub fn definitions(&self) -> [&FlowDefinition; 2] {
        [self.generate_recipe.definition(), self.identify_ingredients.definition()]
    }

    pub fn definition(&self, name: &str) -> Option<&FlowDefinition> {
        self.definitions().into_iter().find(|d| d.name() == name)
    }

    /// Runs a flow by name on an untyped record.
    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, FlowError> {
        let definition = self
            .definition(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))?;
        self.orchestrator.run(definition, input).await
    }

    pub fn orchestrator(&self) -> &Orchestrator<C> {
        &self.orchestrator
    }
}
