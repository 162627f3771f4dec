//! End-to-end flow tests against a scripted model client.

use std::time::Duration;

use recipe_ai::ai::flows::{GENERATE_RECIPE_FLOW, IDENTIFY_INGREDIENTS_FLOW};
use recipe_ai::core::runtime::{self, Part};
use recipe_ai::testing::StubModelClient;
use recipe_ai::{
    FlowError, FlowErrorKind, GenerateRecipeInput, IdentifyIngredientsInput, ModelError,
    Orchestrator, RecipeFlows,
};
use serde_json::{Value, json};

fn flows_with(stub: &StubModelClient) -> RecipeFlows<StubModelClient> {
    RecipeFlows::new(Orchestrator::new(stub.clone())).expect("flows should build")
}

fn chicken_bowl() -> Value {
    json!({
        "recipeName": "Chicken Rice Bowl",
        "steps": ["Cook rice", "Grill chicken", "Combine"],
        "requiredIngredients": ["chicken", "rice"],
        "alternativeSuggestions": ["Use tofu"]
    })
}

#[tokio::test]
async fn missing_ingredients_is_invalid_input() {
    let stub = StubModelClient::new().respond_with(chicken_bowl());
    let flows = flows_with(&stub);

    let err = flows
        .invoke(GENERATE_RECIPE_FLOW, json!({ "vegetarian": true }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::InvalidInput);
    assert_eq!(err.field(), Some("ingredients"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn empty_ingredient_list_is_rejected_before_the_model() {
    let stub = StubModelClient::new().respond_with(chicken_bowl());
    let flows = flows_with(&stub);

    let err = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(Vec::<String>::new()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::InvalidInput);
    assert_eq!(stub.calls(), 0);
}

#[test]
fn ingredients_alone_satisfy_the_recipe_input() {
    let flows = flows_with(&StubModelClient::new());
    let definition = flows.definition(GENERATE_RECIPE_FLOW).unwrap();

    let input = json!({ "ingredients": ["egg", "rice"] });
    assert!(definition.input_schema().validate(&input).is_ok());
}

#[tokio::test]
async fn prompt_lists_ingredients_and_only_requested_preferences() {
    let stub = StubModelClient::new().respond_with(chicken_bowl()).respond_with(chicken_bowl());
    let flows = flows_with(&stub);

    let input = GenerateRecipeInput {
        vegan: Some(true),
        ..GenerateRecipeInput::new(["egg"])
    };
    flows.generate_recipe_from_ingredients(&input).await.unwrap();
    flows.generate_recipe_from_ingredients(&input).await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].prompt, requests[1].prompt);
    assert_eq!(requests[0].flow, GENERATE_RECIPE_FLOW);

    let text = requests[0].prompt.text();
    assert!(text.contains("ingredients:\n- egg\n\n"), "prompt was:\n{text}");
    assert!(text.contains("- Vegan"));
    assert!(!text.contains("Vegetarian"));
    assert!(!text.contains("Gluten-Free"));
    assert!(!text.contains("{{"));
}

#[test]
fn empty_list_renders_no_ingredient_lines() {
    let flows = flows_with(&StubModelClient::new());
    let definition = flows.definition(GENERATE_RECIPE_FLOW).unwrap();

    let input = json!({ "ingredients": [] });
    let prompt = runtime::render(definition.template(), input.as_object().unwrap()).unwrap();

    assert!(prompt.text().contains("these ingredients:\n\nDietary preferences:"));
}

#[tokio::test]
async fn partial_model_output_is_invalid_model_output() {
    let stub = StubModelClient::new().respond_with(json!({ "recipeName": "Omelette" }));
    let flows = flows_with(&stub);

    let err = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(["egg"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::InvalidModelOutput);
    assert_eq!(err.field(), Some("steps"));
}

#[tokio::test]
async fn model_failure_is_reported_as_retryable() {
    let stub = StubModelClient::new().fail_with(ModelError::Status {
        status: 503,
        body: "overloaded".into(),
    });
    let flows = flows_with(&stub);

    let err = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(["egg"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::ModelInvocationFailed);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn slow_model_times_out() {
    let stub = StubModelClient::new()
        .respond_with(chicken_bowl())
        .with_delay(Duration::from_millis(200));
    let orchestrator = Orchestrator::new(stub).with_timeout(Duration::from_millis(20));
    let flows = RecipeFlows::new(orchestrator).unwrap();

    let err = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(["egg"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::ModelInvocationFailed {
            source: ModelError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test]
async fn malformed_photo_never_reaches_the_model() {
    let stub = StubModelClient::new().respond_with(json!({ "ingredients": [] }));
    let flows = flows_with(&stub);

    let err = flows
        .identify_ingredients_from_image(&IdentifyIngredientsInput {
            photo_data_uri: "not-a-uri".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::InvalidInput);
    assert_eq!(err.field(), Some("photoDataUri"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn recipe_output_is_returned_unchanged() {
    let expected = json!({
        "recipeName": "High-Protein Chicken Bowl",
        "steps": ["Cook rice", "Sear chicken", "Steam broccoli", "Combine"],
        "requiredIngredients": ["chicken breast", "rice", "broccoli"],
        "alternativeSuggestions": ["Swap rice for quinoa"]
    });
    let stub = StubModelClient::new().respond_with(expected.clone());
    let flows = flows_with(&stub);

    let output = flows
        .invoke(
            GENERATE_RECIPE_FLOW,
            json!({ "ingredients": ["chicken breast", "rice", "broccoli"], "highProtein": true }),
        )
        .await
        .unwrap();

    assert_eq!(output, expected);
    assert!(stub.requests()[0].prompt.text().contains("- High Protein"));
}

#[tokio::test]
async fn extra_output_fields_are_tolerated_and_nutrition_is_kept() {
    let mut raw = chicken_bowl();
    raw["servings"] = json!(2);
    raw["nutrition"] = json!({ "Calories": "520 kcal", "Protein": "38 g" });
    let stub = StubModelClient::new().respond_with(raw);
    let flows = flows_with(&stub);

    let recipe = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(["chicken", "rice"]))
        .await
        .unwrap();

    assert_eq!(recipe.recipe_name, "Chicken Rice Bowl");
    assert_eq!(recipe.steps.len(), 3);
    let nutrition = recipe.nutrition.unwrap();
    assert_eq!(nutrition["Calories"], "520 kcal");
}

#[tokio::test]
async fn photo_is_sent_as_a_media_part() {
    let stub = StubModelClient::new().respond_with(json!({ "ingredients": ["tomato", "basil"] }));
    let flows = flows_with(&stub);

    let input = IdentifyIngredientsInput::from_image("image/png", b"\x89PNG fake");
    let output = flows.identify_ingredients_from_image(&input).await.unwrap();
    assert_eq!(output.ingredients, ["tomato", "basil"]);

    let requests = stub.requests();
    let request = &requests[0];
    assert_eq!(request.flow, IDENTIFY_INGREDIENTS_FLOW);
    let media: Vec<_> = request.prompt.media().collect();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].mime_type(), "image/png");
    assert_eq!(media[0].decode().unwrap(), b"\x89PNG fake");
    assert!(matches!(request.prompt.parts().first(), Some(Part::Text(t)) if t.contains("Image: ")));
    assert_eq!(request.response_schema["required"], json!(["ingredients"]));
}

#[tokio::test]
async fn unknown_flow_name() {
    let stub = StubModelClient::new();
    let flows = flows_with(&stub);

    let err = flows.invoke("summarizeRecipe", json!({})).await.unwrap_err();
    assert!(matches!(err, FlowError::UnknownFlow(ref name) if name == "summarizeRecipe"));
    assert_eq!(err.kind(), FlowErrorKind::UnknownFlow);
}

#[tokio::test]
async fn blank_ingredient_is_rejected_with_its_index() {
    let stub = StubModelClient::new().respond_with(chicken_bowl());
    let flows = flows_with(&stub);

    let err = flows
        .generate_recipe_from_ingredients(&GenerateRecipeInput::new(["rice", "", "   "]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FlowErrorKind::InvalidInput);
    assert_eq!(err.field(), Some("ingredients[1]"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn media_type_parameters_are_not_forwarded() {
    let stub = StubModelClient::new().respond_with(json!({ "ingredients": ["egg"] }));
    let flows = flows_with(&stub);

    let input = json!({ "photoDataUri": "data:image/png;charset=utf-8;base64,aGVsbG8=" });
    flows.invoke(IDENTIFY_INGREDIENTS_FLOW, input).await.unwrap();

    let requests = stub.requests();
    let media: Vec<_> = requests[0].prompt.media().collect();
    assert_eq!(media[0].mime_type(), "image/png");
}
