mod auth;
mod db;
mod discounts;
mod error;
mod events;
mod lists;
mod models;
mod validation;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use discounts::DiscountEngine;
use error::ApiError;
use events::{EventRegistry, StorefrontEvent};
use lists::ListStore;
use models::{CreateProduct, Product, UpdateProduct};
use validator::Validate;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        create_product,
        get_all_products,
        get_product_by_id,
        update_product,
        delete_product,
        discounts::handlers::create_rule_handler,
        discounts::handlers::list_rules_handler,
        discounts::handlers::get_rule_handler,
        discounts::handlers::update_rule_handler,
        discounts::handlers::deactivate_rule_handler,
    ),
    components(
        schemas(
            Product,
            CreateProduct,
            UpdateProduct,
            discounts::handlers::CreateRuleRequest,
            discounts::handlers::UpdateRuleRequest,
            discounts::handlers::RuleResponse,
            discounts::handlers::RuleSummary,
            discounts::RuleScope,
            discounts::DiscountKind,
        )
    ),
    tags(
        (name = "products", description = "Product catalog endpoints"),
        (name = "discounts", description = "Discount rule and pricing endpoints"),
        (name = "lists", description = "Stored product list endpoints")
    ),
    info(
        title = "Storefront Pricing API",
        version = "1.0.0",
        description = "Product catalog with a data-driven discount engine and stored product lists"
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub discount_engine: Arc<DiscountEngine>,
    pub list_store: Arc<ListStore>,
    pub events: Arc<EventRegistry>,
}

/// Handler for POST /api/products
/// Creates a new catalog product
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProduct,
    responses(
        (status = 201, description = "Product created successfully", body = Product),
        (status = 400, description = "Invalid input data"),
        (status = 409, description = "Duplicate product name"),
        (status = 500, description = "Internal server error")
    ),
    tag = "products"
)]
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    tracing::debug!("Creating new product: {}", payload.name);

    payload.validate()?;
    payload
        .check_prices()
        .map_err(|message| ApiError::Conflict { message })?;

    if db::check_duplicate_product(&state.db, &payload.name).await? {
        tracing::warn!("Attempt to create duplicate product: {}", payload.name);
        return Err(ApiError::Conflict {
            message: format!("Product with name '{}' already exists", payload.name),
        });
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (name, category, regular_price, sale_price, attributes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, category, regular_price, sale_price, attributes,
                  created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.category)
    .bind(payload.regular_price)
    .bind(payload.sale_price)
    .bind(&payload.attributes)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("Successfully created product with id: {}", product.id);
    Ok((StatusCode::CREATED, Json(product)))
}

/// Handler for GET /api/products
/// Retrieves all catalog products
#[utoipa::path(
    get,
    path = "/api/products",
    responses(
        (status = 200, description = "List of all products", body = Vec<Product>),
        (status = 500, description = "Internal server error")
    ),
    tag = "products"
)]
async fn get_all_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, category, regular_price, sale_price, attributes,
               created_at, updated_at
        FROM products
        ORDER BY id
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    tracing::debug!("Retrieved {} products", products.len());
    Ok(Json(products))
}

/// Handler for GET /api/products/:id
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 404, description = "Product not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "products"
)]
async fn get_product_by_id(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Product>, ApiError> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, category, regular_price, sale_price, attributes,
               created_at, updated_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound {
        resource: "Product".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(product))
}

/// Handler for PUT /api/products/:id
/// Updates a product, keeping current values for omitted fields
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body = UpdateProduct,
    responses(
        (status = 200, description = "Product updated successfully", body = Product),
        (status = 400, description = "Invalid input data"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Duplicate product name"),
        (status = 500, description = "Internal server error")
    ),
    tag = "products"
)]
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProduct>,
) -> Result<Json<Product>, ApiError> {
    tracing::debug!("Updating product with id: {}", id);

    payload.validate()?;

    // Multi-step update runs in a transaction so a mid-flight failure
    // leaves the row untouched
    let mut tx = state.db.begin().await?;

    let existing = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, category, regular_price, sale_price, attributes,
               created_at, updated_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound {
        resource: "Product".to_string(),
        id: id.to_string(),
    })?;

    if let Some(ref new_name) = payload.name {
        if new_name != &existing.name {
            let duplicate_exists: Option<bool> = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM products WHERE name = $1 AND id != $2)",
            )
            .bind(new_name)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if duplicate_exists.unwrap_or(false) {
                tracing::warn!("Attempt to rename product {} to duplicate name: {}", id, new_name);
                return Err(ApiError::Conflict {
                    message: format!("Product with name '{}' already exists", new_name),
                });
            }
        }
    }

    let regular_price = payload.regular_price.unwrap_or(existing.regular_price);
    let sale_price = payload.sale_price.or(existing.sale_price);
    if let Some(sale) = sale_price {
        if sale > regular_price {
            return Err(ApiError::Conflict {
                message: "sale_price cannot exceed regular_price".to_string(),
            });
        }
    }

    let updated_product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = $1,
            category = $2,
            regular_price = $3,
            sale_price = $4,
            attributes = $5,
            updated_at = NOW()
        WHERE id = $6
        RETURNING id, name, category, regular_price, sale_price, attributes,
                  created_at, updated_at
        "#,
    )
    .bind(payload.name.unwrap_or(existing.name))
    .bind(payload.category.unwrap_or(existing.category))
    .bind(regular_price)
    .bind(sale_price)
    .bind(payload.attributes.unwrap_or(existing.attributes))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!("Successfully updated product with id: {}", id);
    Ok(Json(updated_product))
}

/// Handler for DELETE /api/products/:id
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted successfully"),
        (status = 404, description = "Product not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "products"
)]
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound {
            resource: "Product".to_string(),
            id: id.to_string(),
        });
    }

    tracing::info!("Successfully deleted product with id: {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Default event subscribers
///
/// Order matters: the audit trail subscriber runs before the generic logger.
fn default_event_registry() -> EventRegistry {
    let mut registry = EventRegistry::new();

    registry.subscribe("checkout-audit", 10, |event| {
        if let StorefrontEvent::CheckoutCompleted { order_id, rule_ids } = event {
            tracing::info!(
                "Order {} completed with {} discount(s) recorded",
                order_id,
                rule_ids.len()
            );
        }
    });

    registry.subscribe("event-log", 100, |event| {
        tracing::debug!("Storefront event: {:?}", event);
    });

    registry
}

/// Build the shared application state from a connection pool
fn build_state(db: PgPool) -> AppState {
    AppState {
        db: db.clone(),
        discount_engine: Arc::new(DiscountEngine::new(db.clone())),
        list_store: Arc::new(ListStore::new(db)),
        events: Arc::new(default_event_registry()),
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS middleware
fn create_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Product catalog
        .route("/api/products", post(create_product))
        .route("/api/products", get(get_all_products))
        .route("/api/products/:id", get(get_product_by_id))
        .route("/api/products/:id", put(update_product))
        .route("/api/products/:id", delete(delete_product))
        .route("/api/products/:id/pricing-table", get(discounts::handlers::pricing_table_handler))
        // Discount rules (admin)
        .route("/api/discounts/rules", post(discounts::handlers::create_rule_handler))
        .route("/api/discounts/rules", get(discounts::handlers::list_rules_handler))
        .route("/api/discounts/rules/:rule_id", get(discounts::handlers::get_rule_handler))
        .route("/api/discounts/rules/:rule_id", put(discounts::handlers::update_rule_handler))
        .route("/api/discounts/rules/:rule_id", delete(discounts::handlers::deactivate_rule_handler))
        // Storefront pricing
        .route("/api/discounts/preview", post(discounts::handlers::preview_price_handler))
        .route("/api/discounts/quote", post(discounts::handlers::quote_cart_handler))
        .route("/api/checkout/complete", post(discounts::handlers::complete_checkout_handler))
        // Stored lists
        .route("/api/lists", post(lists::handlers::create_list_handler))
        .route("/api/lists", get(lists::handlers::get_lists_handler))
        .route("/api/lists/:list_id", get(lists::handlers::get_list_handler))
        .route("/api/lists/:list_id", put(lists::handlers::update_list_handler))
        .route("/api/lists/:list_id", delete(lists::handlers::delete_list_handler))
        .route("/api/lists/:list_id/evaluate", post(lists::handlers::evaluate_list_handler))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Storefront Pricing API - Starting...");

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in environment");
    let host = std::env::var("HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string());

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let state = build_state(db_pool);

    // Warm the rule cache so the first quote does not pay the load
    if let Err(e) = state.discount_engine.warm_cache().await {
        tracing::warn!("Rule cache warm-up failed: {}", e);
    }

    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Storefront Pricing API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
