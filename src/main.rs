mod database;
mod handlers;
mod middleware;
mod models;
mod services;
mod stats;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use dotenvy::dotenv;
use std::env;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::{create_database_pool, Database};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let app = create_router(db);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    log::info!("Cashflow Tuesday API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

fn create_router(db: Database) -> Router {
    Router::new()
        // Session
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/forgot-password", post(handlers::auth::forgot_password))
        .route(
            "/api/auth/reset-password",
            get(handlers::auth::validate_reset_token).post(handlers::auth::reset_password),
        )
        .route("/api/me", get(handlers::expenses::me))

        // Expense lifecycle
        .route("/api/expenses", get(handlers::expenses::list_own))
        .route("/api/expenses/pending", get(handlers::expenses::list_pending))
        .route("/api/expenses/submit", post(handlers::expenses::submit))
        .route("/api/expenses/stats/monthly", get(handlers::expenses::monthly_stats))
        .route("/api/expenses/reports", get(handlers::expenses::reports))
        .route("/api/expenses/export", get(handlers::expenses::export))
        .route("/api/expenses/:id/approve", post(handlers::expenses::approve))
        .route("/api/expenses/:id/reject", post(handlers::expenses::reject))
        .route("/api/expenses/:id", delete(handlers::expenses::delete))

        // Receipt uploads and the QR mobile flow
        .route("/api/expenses/upload", post(handlers::uploads::upload))
        .route("/api/expenses/upload-token", post(handlers::uploads::create_upload_token))
        .route("/api/expenses/verify-token", post(handlers::uploads::verify_upload_token))
        .route("/api/uploads/*path", get(handlers::uploads::serve_upload))

        // Accounting dashboard
        .route("/api/dashboard/stats", get(handlers::dashboard::stats))
        .route("/api/dashboard/category-stats", get(handlers::dashboard::category_stats))
        .route("/api/dashboard/user-stats", get(handlers::dashboard::user_stats))
        .route("/api/dashboard/individual-stats", get(handlers::dashboard::individual_stats))
        .route("/api/dashboard/export", get(handlers::dashboard::export))

        // Admin
        .route("/api/admin/users", get(handlers::admin::list_users).post(handlers::admin::create_user))
        .route("/api/admin/users/:id", get(handlers::admin::get_user).put(handlers::admin::update_user))
        .route("/api/admin/users/:id/roles", put(handlers::admin::set_user_roles))
        .route("/api/admin/users/:id/toggle-enabled", put(handlers::admin::toggle_enabled))
        .route("/api/admin/roles", get(handlers::admin::list_roles))
        .route("/api/admin/categories", get(handlers::admin::list_categories).post(handlers::admin::create_category))
        .route(
            "/api/admin/categories/:id",
            get(handlers::admin::get_category)
                .put(handlers::admin::update_category)
                .delete(handlers::admin::delete_category),
        )

        // User lookup and manager views
        .route("/api/users", get(handlers::users::list))
        .route("/api/users/search", get(handlers::users::search))
        .route("/api/manage/employees", get(handlers::manage::employees))

        // Legacy todos
        .route("/api/todos", get(handlers::todos::list).post(handlers::todos::create))
        .route(
            "/api/todos/:id",
            put(handlers::todos::update).delete(handlers::todos::delete),
        )

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(10 * 1024 * 1024)),
        )
        .with_state(db)
}
