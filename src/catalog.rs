//! The fixed set of operations a run may call, and the login scenarios used
//! to fuzz the authentication endpoint.

use rand::{Rng, RngCore};
use reqwest::Method;
use serde_json::{Value, json};

use crate::error::ConfigError;
use crate::models::{EndpointDescriptor, LoginScenario};

pub const DEFAULT_LOGIN_PATH: &str = "/api/v2/auth/login";
pub const SIGN_UP_PATH: &str = "/api/obs/sign-up";

const DEFAULT_GET_PATHS: [&str; 8] = [
    "/api/v1/users",
    "/api/v2/users",
    "/api/v1/memory-leak",
    "/api/v2/memory-efficient",
    "/api/v1/external-api",
    "/api/v2/external-api",
    "/api/v1/cpu-intensive",
    "/api/v2/cpu-optimised",
];

pub const LOGIN_SCENARIOS: [LoginScenario; 8] = [
    LoginScenario {
        name: "valid",
        username: Some("test"),
        password: Some("password"),
    },
    LoginScenario {
        name: "wrong_password",
        username: Some("test"),
        password: Some("wrongpassword"),
    },
    LoginScenario {
        name: "nonexistent_user",
        username: Some("nonexistent"),
        password: Some("password"),
    },
    LoginScenario {
        name: "missing_password",
        username: Some("test"),
        password: None,
    },
    LoginScenario {
        name: "missing_username",
        username: None,
        password: Some("password"),
    },
    LoginScenario {
        name: "empty_credentials",
        username: None,
        password: None,
    },
    LoginScenario {
        name: "sql_injection",
        username: Some("test'; DROP TABLE users;--"),
        password: Some("password"),
    },
    LoginScenario {
        name: "xss_attempt",
        username: Some("<script>alert(\"XSS\")</script>"),
        password: Some("password"),
    },
];

/// Random user for the sign-up endpoint.
pub fn generate_user_payload(rng: &mut dyn RngCore) -> Value {
    let user_id: u32 = rng.gen_range(0..10_000);
    let age: u32 = rng.gen_range(20..60);
    json!({
        "name": format!("User{user_id}"),
        "email": format!("user{user_id}@test.com"),
        "age": age,
        "signupDate": chrono::Utc::now().to_rfc3339(),
    })
}

fn sign_up_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::new(Method::POST, SIGN_UP_PATH).with_payload(generate_user_payload)
}

fn is_sign_up(endpoint: &EndpointDescriptor) -> bool {
    endpoint.method == Method::POST && endpoint.path == SIGN_UP_PATH && !endpoint.login
}

/// Read-only after construction; shared between workers without locking.
#[derive(Debug, Clone)]
pub struct Catalog {
    regular: Vec<EndpointDescriptor>,
    login: Option<EndpointDescriptor>,
}

impl Catalog {
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Result<Self, ConfigError> {
        let mut regular = Vec::new();
        let mut login = None;

        for endpoint in endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::InvalidEndpoint(format!(
                    "path must start with '/': {}",
                    endpoint.path
                )));
            }
            if endpoint.login {
                if login.is_some() {
                    return Err(ConfigError::DuplicateLoginEndpoint);
                }
                login = Some(endpoint);
            } else {
                regular.push(endpoint);
            }
        }

        Ok(Self { regular, login })
    }

    /// The catalog exercised when no endpoints are configured explicitly.
    pub fn with_defaults(include_sign_up: bool) -> Self {
        let mut regular: Vec<EndpointDescriptor> = DEFAULT_GET_PATHS
            .iter()
            .map(|path| EndpointDescriptor::new(Method::GET, *path))
            .collect();

        if include_sign_up {
            regular.push(sign_up_endpoint());
        }

        Self {
            regular,
            login: Some(EndpointDescriptor::login(Method::POST, DEFAULT_LOGIN_PATH)),
        }
    }

    /// Catalog from explicit regular endpoints plus a login endpoint at `login_path`.
    ///
    /// A `POST` to the sign-up path gets the random user payload. With
    /// `include_sign_up` the sign-up endpoint is added unless already listed.
    pub fn with_endpoints(
        regular: Vec<EndpointDescriptor>,
        login_path: &str,
        include_sign_up: bool,
    ) -> Result<Self, ConfigError> {
        let mut endpoints: Vec<EndpointDescriptor> = regular
            .into_iter()
            .map(|endpoint| {
                if is_sign_up(&endpoint) && endpoint.payload.is_none() {
                    endpoint.with_payload(generate_user_payload)
                } else {
                    endpoint
                }
            })
            .collect();

        if include_sign_up && !endpoints.iter().any(is_sign_up) {
            endpoints.push(sign_up_endpoint());
        }
        endpoints.push(EndpointDescriptor::login(Method::POST, login_path));

        Self::new(endpoints)
    }

    pub fn regular(&self) -> &[EndpointDescriptor] {
        &self.regular
    }

    pub fn login_endpoint(&self) -> Option<&EndpointDescriptor> {
        self.login.as_ref()
    }

    /// Checks that the catalog can serve the requested traffic mix.
    pub fn check_login_percentage(&self, login_percentage: u8) -> Result<(), ConfigError> {
        if login_percentage > 0 && self.login.is_none() {
            return Err(ConfigError::MissingLoginEndpoint(login_percentage));
        }
        if login_percentage < 100 && self.regular.is_empty() {
            return Err(ConfigError::NoRegularEndpoints(login_percentage));
        }
        Ok(())
    }
}
