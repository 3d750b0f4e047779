//! OpenAPI documentation configuration.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::{
    ConfigurationResponse, CreateConfigurationRequest, CreateFileRequest, CreateServerRequest,
    CreateUserRequest, FileResponse, HealthResponse, ServerResponse, ServiceStatus, SyncResponse,
    UpdateConfigurationRequest, UpdateFileRequest, UserResponse,
};
use crate::error::ErrorResponse;
use crate::handlers::{accounts, configurations, files, health};

/// OpenAPI documentation for the duva API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "duva API",
        version = "1.0.0",
        description = "Keeps BI extracts of survey forms in sync.

duva periodically exports form submissions from an OnaData server, turns the
CSV into a columnar extract, stores it in object storage and optionally
publishes it to Tableau.

## Quick Start

1. Register the upstream server: `POST /api/v1/servers`
2. Store a user's credentials: `POST /api/v1/users`
3. Track a form: `POST /api/v1/users/{user_id}/files`
4. Force a sync: `POST /api/v1/files/{id}/sync`
",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        health::health_check,
        accounts::create_server,
        accounts::get_server,
        accounts::create_user,
        configurations::list_configurations,
        configurations::create_configuration,
        configurations::get_configuration,
        configurations::update_configuration,
        configurations::delete_configuration,
        files::list_files,
        files::create_file,
        files::get_file,
        files::update_file,
        files::delete_file,
        files::sync_file,
    ),
    components(
        schemas(
            // Request types
            CreateServerRequest,
            CreateUserRequest,
            CreateConfigurationRequest,
            UpdateConfigurationRequest,
            CreateFileRequest,
            UpdateFileRequest,
            // Response types
            HealthResponse,
            ServiceStatus,
            ServerResponse,
            UserResponse,
            ConfigurationResponse,
            FileResponse,
            SyncResponse,
            ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "system", description = "System health"),
        (name = "accounts", description = "Upstream servers and user credentials"),
        (name = "configurations", description = "BI publish configurations"),
        (name = "files", description = "Tracked forms and their extracts"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
