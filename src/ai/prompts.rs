pub const GENERATE_RECIPE_PROMPT: &str = r#"
You are a world-class chef who creates recipes from the ingredients a cook has
on hand, respecting their dietary preferences.

Create a recipe using these ingredients:
{{#each ingredients}}
- {{{this}}}
{{/each}}

Dietary preferences:
{{#if vegetarian}}
- Vegetarian
{{/if}}
{{#if vegan}}
- Vegan
{{/if}}
{{#if glutenFree}}
- Gluten-Free
{{/if}}
{{#if highProtein}}
- High Protein
{{/if}}

Provide the recipe name, the preparation steps in order, the full list of
required ingredients, and alternative suggestions.
Respond with valid JSON only.
"#;

pub const IDENTIFY_INGREDIENTS_PROMPT: &str = r#"
You are an expert at recognising food ingredients in photographs.

Identify every food ingredient visible in the image. Return only the ingredient names.

Image: {{media url=photoDataUri}}
"#;
