use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use recipe_ai::ai::flows::flow_definitions;
use recipe_ai::catalog::{self, DietTag};
use recipe_ai::config::ModelArgs;
use recipe_ai::core::media::mime_for_extension;
use recipe_ai::{
    FlowError, GeminiClient, GenerateRecipeInput, IdentifyIngredientsInput, Orchestrator,
    RecipeFlows, server,
};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "recipe-ai",
    version,
    about = "Recipes and ingredient recognition backed by Gemini"
)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a recipe from the ingredients at hand.
    Recipe {
        /// Ingredient to cook with; repeat the flag or separate with commas.
        #[arg(short, long = "ingredient", value_delimiter = ',', required = true)]
        ingredients: Vec<String>,
        #[arg(long)]
        vegetarian: bool,
        #[arg(long)]
        vegan: bool,
        #[arg(long)]
        gluten_free: bool,
        #[arg(long)]
        high_protein: bool,
    },
    /// Identify the ingredients in a photo.
    Identify {
        /// Image file; the extension decides the MIME type.
        #[arg(required_unless_present = "data_uri")]
        image: Option<PathBuf>,
        /// Pass a ready-made data URI instead of a file.
        #[arg(long, conflicts_with = "image")]
        data_uri: Option<String>,
    },
    /// Search the built-in ingredient catalog.
    Ingredients {
        #[arg(default_value = "")]
        search: String,
        #[arg(long)]
        diet: Option<DietTag>,
    },
    /// Print the flow definitions and their schemas.
    Flows,
    /// Serve the flows over HTTP.
    Serve {
        #[arg(long, env = "RECIPE_AI_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Recipe {
            ingredients,
            vegetarian,
            vegan,
            gluten_free,
            high_protein,
        } => {
            let flows = connect(&cli.model)?;
            let input = GenerateRecipeInput {
                ingredients: ingredients.iter().map(|i| canonical_ingredient(i)).collect(),
                vegetarian: vegetarian.then_some(true),
                vegan: vegan.then_some(true),
                gluten_free: gluten_free.then_some(true),
                high_protein: high_protein.then_some(true),
            };
            println!("🤖 Generating a recipe from: {}", input.ingredients.join(", "));
            report(flows.generate_recipe_from_ingredients(&input).await)?;
        }
        Command::Identify { image, data_uri } => {
            let flows = connect(&cli.model)?;
            let input = match (image, data_uri) {
                (_, Some(photo_data_uri)) => IdentifyIngredientsInput { photo_data_uri },
                (Some(path), None) => read_image(&path)?,
                (None, None) => return Err("an image path or --data-uri is required".into()),
            };
            report(flows.identify_ingredients_from_image(&input).await)?;
        }
        Command::Ingredients { search, diet } => {
            for found in catalog::search(&search, diet) {
                println!("{}", found.category);
                for ingredient in found.ingredients {
                    let tags: Vec<&str> = ingredient.tags.iter().map(DietTag::as_str).collect();
                    if tags.is_empty() {
                        println!("  - {}", ingredient.name);
                    } else {
                        println!("  - {} ({})", ingredient.name, tags.join(", "));
                    }
                }
            }
        }
        Command::Flows => {
            for definition in flow_definitions()? {
                println!("📦 {}", definition.name());
                println!("   input:  {}", serde_json::to_string(&definition.input_hint())?);
                println!("   output: {}", serde_json::to_string(definition.response_schema())?);
            }
        }
        Command::Serve { bind } => {
            let flows = Arc::new(connect(&cli.model)?);
            server::serve(flows, bind).await?;
        }
    }

    Ok(())
}

fn connect(args: &ModelArgs) -> Result<RecipeFlows<GeminiClient>, Box<dyn Error>> {
    let client = GeminiClient::new(args.gemini_config()?);
    log::info!("Using model '{}'", client.model());
    let orchestrator = Orchestrator::new(client).with_timeout(args.timeout());
    Ok(RecipeFlows::new(orchestrator)?)
}

/// Catalog spelling when the ingredient is known, the trimmed input otherwise.
fn canonical_ingredient(name: &str) -> String {
    catalog::lookup(name).map_or_else(|| name.trim().to_string(), |i| i.name.to_string())
}

fn read_image(path: &Path) -> Result<IdentifyIngredientsInput, Box<dyn Error>> {
    let mime_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .ok_or_else(|| format!("cannot tell the image type of '{}'", path.display()))?;
    let bytes = std::fs::read(path)?;
    Ok(IdentifyIngredientsInput::from_image(mime_type, &bytes))
}

fn report<T: Serialize>(result: Result<T, FlowError>) -> Result<(), Box<dyn Error>> {
    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {e}");
            if e.is_retryable() {
                eprintln!("   The model service could not be reached or failed. Please try again.");
            }
            std::process::exit(1);
        }
    }
}
