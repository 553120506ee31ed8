//! School Registry Backend
//!
//! REST backend for users, students, teachers, subjects, courses and grades with
//! SQLite persistence and bearer-token role checks.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::{Students, Teachers};
use auth::Guard::{self, Admin, AtLeastTeacher, CurrentUser};
use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting School Registry Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.jwt_secret_generated {
        tracing::warn!(
            "No token secret configured (SCHOOL_JWT_SECRET). Tokens will not survive a restart!"
        );
    }
    if config.admin_psk.is_none() {
        tracing::warn!("No admin key configured (SCHOOL_ADMIN_PSK). Admin signup is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wrap a route in `require_auth` followed by `chain`, so the guards run in the
/// listed order before the handler.
fn guarded(
    route: MethodRouter<AppState>,
    state: &AppState,
    chain: &[Guard],
) -> MethodRouter<AppState> {
    // The last layer added runs first
    let route = chain.iter().rev().fold(route, |route, guard| match guard {
        Admin => route.layer(middleware::from_fn(auth::require_admin)),
        CurrentUser => route.layer(middleware::from_fn(auth::require_current_user)),
        AtLeastTeacher => route.layer(middleware::from_fn(auth::require_at_least_teacher)),
    });
    route.layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_auth,
    ))
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration for the single-page front end
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let s = &state;

    // Authentication
    let auth_routes = Router::new()
        .route("/auth/signup", post(api::signup))
        .route("/auth/login", post(api::login));

    // Users
    let user_routes = Router::new()
        .route("/users", guarded(get(api::list_users), s, &[Admin]))
        .route("/users/{id}", guarded(get(api::get_user), s, &[CurrentUser]))
        .route("/users/{id}", guarded(put(api::update_user), s, &[CurrentUser]))
        .route("/users/{id}", guarded(delete(api::delete_user), s, &[Admin]))
        .route(
            "/users/{id}/subjects",
            guarded(get(api::get_user_subjects), s, &[CurrentUser]),
        )
        .route("/users/{id}/subjects", post(api::attach_user_subject))
        .route(
            "/users/{id}/subjects/{id_subject}",
            guarded(delete(api::detach_user_subject), s, &[Admin]),
        )
        .route(
            "/users/{id}/grades",
            guarded(get(api::list_user_grades), s, &[CurrentUser]),
        )
        .route(
            "/users/{id}/grades",
            guarded(post(api::add_user_grade), s, &[Admin]),
        )
        .route(
            "/users/{id}/grades/{id_grade}",
            put(api::update_user_grade),
        )
        .route(
            "/users/{id}/grades/{id_grade}",
            guarded(delete(api::delete_user_grade), s, &[AtLeastTeacher]),
        );

    // Students and teachers share handlers
    let student_routes = roster_routes::<Students>("/students", s);
    let teacher_routes = roster_routes::<Teachers>("/teachers", s);

    // Subjects
    let subject_routes = Router::new()
        .route("/subjects", guarded(get(api::list_subjects), s, &[]))
        .route("/subjects", guarded(post(api::create_subject), s, &[Admin]))
        .route("/subjects/{id}", guarded(get(api::get_subject), s, &[]))
        .route(
            "/subjects/{id}",
            guarded(put(api::update_subject), s, &[Admin]),
        )
        .route(
            "/subjects/{id}",
            guarded(delete(api::delete_subject), s, &[Admin]),
        );

    // Courses
    let course_routes = Router::new()
        .route("/courses", guarded(get(api::list_courses), s, &[]))
        .route("/courses", guarded(post(api::create_course), s, &[Admin]))
        .route("/courses/{id}", guarded(get(api::get_course), s, &[]))
        .route("/courses/{id}", guarded(put(api::update_course), s, &[Admin]))
        .route(
            "/courses/{id}",
            guarded(delete(api::delete_course), s, &[Admin]),
        );

    // Grades
    let grade_routes = Router::new()
        .route(
            "/grades",
            guarded(get(api::list_grades), s, &[AtLeastTeacher]),
        )
        .route(
            "/grades/{id}",
            guarded(get(api::get_grade), s, &[AtLeastTeacher]),
        );

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(user_routes)
        .merge(student_routes)
        .merge(teacher_routes)
        .merge(subject_routes)
        .merge(course_routes)
        .merge(grade_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Routes for one roster of personal records (`/students` or `/teachers`).
fn roster_routes<R: api::RosterScope>(base: &str, s: &AppState) -> Router<AppState> {
    let item = format!("{}/{{id}}", base);
    let subjects = format!("{}/{{id}}/subjects", base);
    let subject = format!("{}/{{id}}/subjects/{{id_subject}}", base);

    Router::new()
        .route(
            base,
            guarded(get(api::list_people::<R>), s, &[AtLeastTeacher]),
        )
        .route(base, guarded(post(api::create_person::<R>), s, &[Admin]))
        .route(
            &item,
            guarded(get(api::get_person::<R>), s, &[AtLeastTeacher]),
        )
        .route(&item, guarded(put(api::update_person::<R>), s, &[Admin]))
        .route(
            &item,
            guarded(delete(api::delete_person::<R>), s, &[Admin]),
        )
        .route(
            &subjects,
            guarded(get(api::person_subjects::<R>), s, &[AtLeastTeacher]),
        )
        .route(
            &subjects,
            guarded(post(api::attach_person_subject::<R>), s, &[Admin]),
        )
        .route(
            &subject,
            guarded(delete(api::detach_person_subject::<R>), s, &[Admin]),
        )
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
