//! Recipe and ingredient persistence
//!
//! A recipe and its ingredients are always written together in one
//! transaction; replacing a recipe rewrites its ingredient rows.

use chrono::Utc;
use mealwise_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{parse_string_list, parse_ts, parse_uuid, to_json, ts};
use crate::models::{
    Ingredient, Page, Recipe, RecipeInput, RecipeListQuery, RecipeSummary, Unit,
};

/// Shared filter of list/count queries. Bind order: user_id, q (x4), tag (x2)
const LIST_FILTER: &str = r#"
    r.user_id = ?
    AND (? IS NULL
         OR r.title LIKE ? ESCAPE '\'
         OR r.description LIKE ? ESCAPE '\'
         OR EXISTS (SELECT 1 FROM ingredients i
                    WHERE i.recipe_id = r.id AND i.name LIKE ? ESCAPE '\'))
    AND (? IS NULL
         OR EXISTS (SELECT 1 FROM json_each(r.tags) WHERE json_each.value = ?))
"#;

/// `%term%` with LIKE wildcards escaped
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn insert_ingredients(
    tx: &mut Transaction<'_, Sqlite>,
    recipe_id: Uuid,
    input: &RecipeInput,
) -> Result<()> {
    for (position, ingredient) in input.ingredients.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO ingredients (id, recipe_id, position, name, quantity, unit, note)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(recipe_id.to_string())
        .bind(position as i64)
        .bind(&ingredient.name)
        .bind(ingredient.quantity)
        .bind(ingredient.unit.map(|u| u.as_str()))
        .bind(&ingredient.note)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Write a recipe row and its ingredients inside `tx`
pub(crate) async fn insert_recipe(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: Uuid,
    input: &RecipeInput,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = ts(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO recipes (
            id, user_id, title, description, servings, prep_minutes, cook_minutes,
            instructions, tags, source_url, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.servings)
    .bind(input.prep_minutes)
    .bind(input.cook_minutes)
    .bind(to_json(&input.instructions)?)
    .bind(to_json(&input.tags)?)
    .bind(&input.source_url)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;

    insert_ingredients(tx, id, input).await?;
    Ok(id)
}

/// Insert a recipe with its ingredients
///
/// `input` is expected to be normalized and validated.
pub async fn create_recipe(pool: &SqlitePool, user_id: Uuid, input: &RecipeInput) -> Result<Recipe> {
    let mut tx = pool.begin().await?;
    let id = insert_recipe(&mut tx, user_id, input).await?;
    tx.commit().await?;

    tracing::debug!(recipe_id = %id, user_id = %user_id, "Recipe created");

    get_recipe(pool, user_id, id)
        .await?
        .ok_or_else(|| Error::Internal("Recipe vanished after insert".to_string()))
}

/// Full replace; `None` when the recipe does not exist or belongs to someone else
pub async fn replace_recipe(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
    input: &RecipeInput,
) -> Result<Option<Recipe>> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE recipes
        SET title = ?, description = ?, servings = ?, prep_minutes = ?, cook_minutes = ?,
            instructions = ?, tags = ?, source_url = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.servings)
    .bind(input.prep_minutes)
    .bind(input.cook_minutes)
    .bind(to_json(&input.instructions)?)
    .bind(to_json(&input.tags)?)
    .bind(&input.source_url)
    .bind(ts(Utc::now()))
    .bind(id.to_string())
    .bind(user_id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    sqlx::query("DELETE FROM ingredients WHERE recipe_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    insert_ingredients(&mut tx, id, input).await?;
    tx.commit().await?;

    get_recipe(pool, user_id, id).await
}

pub async fn delete_recipe(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn ingredient_from_row(row: &SqliteRow) -> Result<Ingredient> {
    let id: String = row.get("id");
    let unit: Option<String> = row.get("unit");
    Ok(Ingredient {
        id: parse_uuid(&id)?,
        position: row.get("position"),
        name: row.get("name"),
        quantity: row.get("quantity"),
        unit: unit.as_deref().and_then(Unit::from_db),
        note: row.get("note"),
    })
}

/// Load one recipe with ingredients, scoped to its owner
pub async fn get_recipe(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<Recipe>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, description, servings, prep_minutes, cook_minutes,
               instructions, tags, source_url, created_at, updated_at
        FROM recipes
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let ingredient_rows = sqlx::query(
        "SELECT id, position, name, quantity, unit, note FROM ingredients WHERE recipe_id = ? ORDER BY position",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let ingredients = ingredient_rows
        .iter()
        .map(ingredient_from_row)
        .collect::<Result<Vec<_>>>()?;

    let instructions: String = row.get("instructions");
    let tags: String = row.get("tags");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Some(Recipe {
        id,
        title: row.get("title"),
        description: row.get("description"),
        servings: row.get("servings"),
        prep_minutes: row.get("prep_minutes"),
        cook_minutes: row.get("cook_minutes"),
        ingredients,
        instructions: parse_string_list(&instructions)?,
        tags: parse_string_list(&tags)?,
        source_url: row.get("source_url"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    }))
}

fn summary_from_row(row: &SqliteRow) -> Result<RecipeSummary> {
    let id: String = row.get("id");
    let tags: String = row.get("tags");
    let updated_at: String = row.get("updated_at");
    let prep: Option<i64> = row.get("prep_minutes");
    let cook: Option<i64> = row.get("cook_minutes");
    let total_minutes = match (prep, cook) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    };

    Ok(RecipeSummary {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        description: row.get("description"),
        servings: row.get("servings"),
        total_minutes,
        tags: parse_string_list(&tags)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

/// Paginated list of the user's recipes, newest first
pub async fn list_recipes(
    pool: &SqlitePool,
    user_id: Uuid,
    query: &RecipeListQuery,
) -> Result<Page<RecipeSummary>> {
    let pattern = query
        .q
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .map(like_pattern);
    let tag = query
        .tag
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    let count_sql = format!("SELECT COUNT(*) AS total FROM recipes r WHERE {}", LIST_FILTER);
    let total: i64 = sqlx::query(&count_sql)
        .bind(user_id.to_string())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&tag)
        .bind(&tag)
        .fetch_one(pool)
        .await?
        .get("total");

    let list_sql = format!(
        r#"
        SELECT r.id, r.title, r.description, r.servings, r.prep_minutes, r.cook_minutes,
               r.tags, r.updated_at
        FROM recipes r
        WHERE {}
        ORDER BY r.updated_at DESC, r.id
        LIMIT ? OFFSET ?
        "#,
        LIST_FILTER
    );
    let rows = sqlx::query(&list_sql)
        .bind(user_id.to_string())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&tag)
        .bind(&tag)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

    let items = rows
        .iter()
        .map(summary_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Page {
        items,
        total,
        limit: query.limit(),
        offset: query.offset(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_user, pool_with_user};
    use crate::models::IngredientInput;

    fn input(title: &str, tags: &[&str]) -> RecipeInput {
        RecipeInput {
            title: title.to_string(),
            description: Some("Weeknight favourite".into()),
            servings: Some(2),
            prep_minutes: Some(10),
            cook_minutes: None,
            ingredients: vec![
                IngredientInput {
                    name: "chickpeas".into(),
                    quantity: Some(400.0),
                    unit: Some(Unit::G),
                    note: Some("drained".into()),
                },
                IngredientInput {
                    name: "salt".into(),
                    quantity: None,
                    unit: Some(Unit::ToTaste),
                    note: None,
                },
            ],
            instructions: vec!["Mix".into()],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            source_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (pool, user_id) = pool_with_user().await;
        let recipe = create_recipe(&pool, user_id, &input("Hummus", &["dip"])).await.unwrap();

        assert_eq!(recipe.title, "Hummus");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.ingredients[0].position, 0);
        assert_eq!(recipe.ingredients[0].note.as_deref(), Some("drained"));
        assert_eq!(recipe.ingredients[1].unit, Some(Unit::ToTaste));
        assert_eq!(recipe.tags, vec!["dip"]);
    }

    #[tokio::test]
    async fn test_ownership_isolation() {
        let (pool, user_id) = pool_with_user().await;
        let other = add_user(&pool, "other@example.com").await;
        let recipe = create_recipe(&pool, user_id, &input("Hummus", &[])).await.unwrap();

        assert!(get_recipe(&pool, other, recipe.id).await.unwrap().is_none());
        assert!(replace_recipe(&pool, other, recipe.id, &input("Stolen", &[]))
            .await
            .unwrap()
            .is_none());
        assert!(!delete_recipe(&pool, other, recipe.id).await.unwrap());
        assert!(get_recipe(&pool, user_id, recipe.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_rewrites_ingredients() {
        let (pool, user_id) = pool_with_user().await;
        let recipe = create_recipe(&pool, user_id, &input("Hummus", &[])).await.unwrap();

        let mut replacement = input("Lemon Hummus", &["dip"]);
        replacement.ingredients.truncate(1);
        let updated = replace_recipe(&pool, user_id, recipe.id, &replacement)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Lemon Hummus");
        assert_eq!(updated.ingredients.len(), 1);
        assert_eq!(updated.created_at, recipe.created_at);
    }

    #[tokio::test]
    async fn test_delete_cascades_ingredients() {
        let (pool, user_id) = pool_with_user().await;
        let recipe = create_recipe(&pool, user_id, &input("Hummus", &[])).await.unwrap();
        assert!(delete_recipe(&pool, user_id, recipe.id).await.unwrap());

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM ingredients")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let (pool, user_id) = pool_with_user().await;
        let other = add_user(&pool, "other@example.com").await;
        create_recipe(&pool, user_id, &input("Hummus", &["dip", "vegan"])).await.unwrap();
        create_recipe(&pool, user_id, &input("Falafel", &["vegan"])).await.unwrap();
        create_recipe(&pool, user_id, &input("100% Rye Bread", &[])).await.unwrap();
        create_recipe(&pool, other, &input("Other Hummus", &["dip"])).await.unwrap();

        let all = list_recipes(&pool, user_id, &RecipeListQuery::default()).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items.len(), 3);
        assert_eq!(all.items[0].total_minutes, Some(10));

        let vegan = RecipeListQuery { tag: Some("Vegan".into()), ..Default::default() };
        assert_eq!(list_recipes(&pool, user_id, &vegan).await.unwrap().total, 2);

        let search = RecipeListQuery { q: Some("hum".into()), ..Default::default() };
        let found = list_recipes(&pool, user_id, &search).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].title, "Hummus");

        // matches ingredient names
        let by_ingredient = RecipeListQuery { q: Some("chickpea".into()), ..Default::default() };
        assert_eq!(list_recipes(&pool, user_id, &by_ingredient).await.unwrap().total, 3);

        // wildcard characters are literal
        let percent = RecipeListQuery { q: Some("100%".into()), ..Default::default() };
        assert_eq!(list_recipes(&pool, user_id, &percent).await.unwrap().total, 1);

        let paged = RecipeListQuery { limit: Some(2), offset: Some(2), ..Default::default() };
        let page = list_recipes(&pool, user_id, &paged).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
    }
}
