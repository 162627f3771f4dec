use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DietTag {
    Vegetarian,
    Vegan,
    GlutenFree,
}

impl DietTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DietTag::Vegetarian => "vegetarian",
            DietTag::Vegan => "vegan",
            DietTag::GlutenFree => "gluten-free",
        }
    }
}

impl fmt::Display for DietTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DietTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vegetarian" => Ok(DietTag::Vegetarian),
            "vegan" => Ok(DietTag::Vegan),
            "gluten-free" | "glutenfree" | "gluten_free" => Ok(DietTag::GlutenFree),
            other => Err(format!("unknown diet '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ingredient {
    pub name: &'static str,
    pub tags: &'static [DietTag],
}

impl Ingredient {
    pub fn suits(&self, tag: DietTag) -> bool {
        self.tags.contains(&tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    pub name: &'static str,
    pub ingredients: &'static [Ingredient],
}

/// Matching ingredients of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatch {
    pub category: &'static str,
    pub ingredients: Vec<Ingredient>,
}

use DietTag::{GlutenFree, Vegan, Vegetarian};

const PLANT: &[DietTag] = &[Vegetarian, Vegan, GlutenFree];

pub const CATALOG: &[Category] = &[
    Category {
        name: "PROTEIN",
        ingredients: &[
            Ingredient { name: "Chicken Breast", tags: &[] },
            Ingredient { name: "Salmon Fillet", tags: &[] },
            Ingredient { name: "Tofu", tags: &[Vegetarian, Vegan] },
            Ingredient { name: "Eggs", tags: &[Vegetarian] },
        ],
    },
    Category {
        name: "GRAINS",
        ingredients: &[
            Ingredient { name: "Quinoa", tags: PLANT },
            Ingredient { name: "Brown Rice", tags: PLANT },
            Ingredient { name: "Pasta", tags: &[Vegetarian, Vegan] },
            Ingredient { name: "Bread", tags: &[Vegetarian, Vegan] },
        ],
    },
    Category {
        name: "VEGETABLES",
        ingredients: &[
            Ingredient { name: "Onions", tags: PLANT },
            Ingredient { name: "Garlic", tags: PLANT },
            Ingredient { name: "Tomatoes", tags: PLANT },
            Ingredient { name: "Broccoli", tags: PLANT },
            Ingredient { name: "Spinach", tags: PLANT },
            Ingredient { name: "Bell Peppers", tags: PLANT },
            Ingredient { name: "Carrots", tags: PLANT },
            Ingredient { name: "Zucchini", tags: PLANT },
            Ingredient { name: "Mushrooms", tags: PLANT },
            Ingredient { name: "Bitter Gourd", tags: PLANT },
        ],
    },
    Category {
        name: "DAIRY",
        ingredients: &[
            Ingredient { name: "Milk", tags: &[Vegetarian] },
            Ingredient { name: "Cheese", tags: &[Vegetarian] },
            Ingredient { name: "Butter", tags: &[Vegetarian] },
        ],
    },
    Category {
        name: "OTHER",
        ingredients: &[
            Ingredient { name: "Olive Oil", tags: PLANT },
            Ingredient { name: "Salt", tags: PLANT },
            Ingredient { name: "Pepper", tags: PLANT },
        ],
    },
];

/// Case-insensitive substring search, optionally restricted to one diet.
/// Categories with no match are dropped.
pub fn search(term: &str, diet: Option<DietTag>) -> Vec<CategoryMatch> {
    let needle = term.trim().to_lowercase();
    CATALOG
        .iter()
        .filter_map(|category| {
            let ingredients: Vec<Ingredient> = category
                .ingredients
                .iter()
                .filter(|i| i.name.to_lowercase().contains(&needle))
                .filter(|i| diet.is_none_or(|tag| i.suits(tag)))
                .copied()
                .collect();
            (!ingredients.is_empty()).then_some(CategoryMatch {
                category: category.name,
                ingredients,
            })
        })
        .collect()
}

/// Canonical catalog spelling of an ingredient, if it is in the catalog.
pub fn lookup(name: &str) -> Option<&'static Ingredient> {
    CATALOG
        .iter()
        .flat_map(|c| c.ingredients.iter())
        .find(|i| i.name.eq_ignore_ascii_case(name.trim()))
}
