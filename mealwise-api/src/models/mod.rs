//! Domain models and request/response DTOs
//!
//! Request DTOs reject unknown fields and implement [`Validate`]; handlers
//! call `validate()` before touching the database.

pub mod chat;
pub mod draft;
pub mod meal_plan;
pub mod recipe;
pub mod user;
pub mod validation;

pub use chat::{
    ChatMessage, ChatRole, ChatTurnResponse, Conversation, ConversationDetail,
    NewConversationRequest, ProposalActionResponse, ProposalStatus, SendMessageRequest,
    ToolProposal,
};
pub use draft::{ConfirmDraftRequest, DraftOutcome, DraftResponse, ExtractRequest, RecipeDraft};
pub use meal_plan::{MealPlanEntry, MealPlanQuery, MealSlot, NewMealPlanEntry};
pub use recipe::{
    Ingredient, IngredientInput, Page, Recipe, RecipeInput, RecipeListQuery, RecipeSummary, Unit,
};
pub use user::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest, User};
pub use validation::{Validate, ValidationError};
