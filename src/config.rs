// ABOUTME: Command line and environment configuration for the server and the product import
// ABOUTME: Every option can be given as a flag or through the matching environment variable

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::assets::DEFAULT_MAX_UPLOAD_BYTES;
use crate::error::{AppError, Result};
use crate::identity::JwtVerifier;
use crate::payments::{StripeConfig, DEFAULT_STRIPE_API_BASE, DEFAULT_STRIPE_API_VERSION};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeConfig),
    /// Load a JSON product file into the article catalog
    ImportProducts(ImportConfig),
}

#[derive(Debug, Args)]
pub struct DatabaseConfig {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:storefront.db?mode=rwc")]
    pub database_url: String,
}

#[derive(Debug, Args)]
pub struct ServeConfig {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    #[arg(long, env = "ASSETS_DIR", default_value = "assets/products")]
    pub assets_dir: PathBuf,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: String,

    #[arg(long, env = "STRIPE_PUBLISHABLE_KEY")]
    pub stripe_publishable_key: String,

    #[arg(long, env = "STRIPE_API_VERSION", default_value = DEFAULT_STRIPE_API_VERSION)]
    pub stripe_api_version: String,

    #[arg(long, env = "STRIPE_API_BASE", default_value = DEFAULT_STRIPE_API_BASE)]
    pub stripe_api_base: String,

    /// PEM public key used to verify Clerk session tokens (RS256)
    #[arg(
        long,
        env = "CLERK_JWT_KEY",
        hide_env_values = true,
        required_unless_present = "clerk_jwt_secret"
    )]
    pub clerk_jwt_key: Option<String>,

    /// Shared HS256 secret, for local development without Clerk
    #[arg(long, env = "CLERK_JWT_SECRET", hide_env_values = true)]
    pub clerk_jwt_secret: Option<String>,
}

impl ServeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stripe(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            publishable_key: self.stripe_publishable_key.clone(),
            api_version: self.stripe_api_version.clone(),
            api_base: self.stripe_api_base.clone(),
        }
    }

    pub fn identity_verifier(&self) -> Result<JwtVerifier> {
        match (&self.clerk_jwt_key, &self.clerk_jwt_secret) {
            // Keys pasted into env files often carry escaped newlines.
            (Some(pem), _) => JwtVerifier::from_rsa_pem(&pem.replace("\\n", "\n")),
            (None, Some(secret)) => {
                tracing::warn!("verifying session tokens with a shared secret");
                Ok(JwtVerifier::from_secret(secret.as_bytes()))
            }
            (None, None) => Err(AppError::Internal(
                "CLERK_JWT_KEY or CLERK_JWT_SECRET must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Args)]
pub struct ImportConfig {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[arg(long, default_value = "assets/products/dummy_items.json")]
    pub file: PathBuf,
}
