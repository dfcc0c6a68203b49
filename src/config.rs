use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use color_eyre::eyre::{eyre, Result, WrapErr};

use crate::rate_limit::Limit;

/// Settings read from the environment (and `.env` when present)
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub auth: AuthConfig,
    pub cloudinary: Option<CloudinaryConfig>,
    pub road_network_path: Option<PathBuf>,
    pub public_rate_limit: Limit,
    pub authenticated_rate_limit: Limit,
}

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    pub hs256_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub upload_preset: String,
    pub folder: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port = optional("PORT")
            .map(|p| p.parse::<u16>().wrap_err("PORT must be a number"))
            .transpose()?
            .unwrap_or(3000);
        let database_max_connections = optional("DATABASE_MAX_CONNECTIONS")
            .map(|n| {
                n.parse::<u32>()
                    .wrap_err("DATABASE_MAX_CONNECTIONS must be a number")
            })
            .transpose()?
            .unwrap_or(5);

        let cloudinary = match optional("CLOUDINARY_CLOUD_NAME") {
            Some(cloud_name) => Some(CloudinaryConfig {
                cloud_name,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
                upload_preset: optional("CLOUDINARY_UPLOAD_PRESET")
                    .unwrap_or_else(|| "lutruwita".to_string()),
                folder: optional("CLOUDINARY_FOLDER").unwrap_or_else(|| "uploads".to_string()),
            }),
            None => None,
        };

        let window = optional("RATE_LIMIT_WINDOW_SECS")
            .map(|n| {
                n.parse::<u64>()
                    .wrap_err("RATE_LIMIT_WINDOW_SECS must be a number")
            })
            .transpose()?
            .map(Duration::from_secs);
        let public_rate_limit = limit_from_env("RATE_LIMIT_PUBLIC_MAX", Limit::public(), window)?;
        let authenticated_rate_limit =
            limit_from_env("RATE_LIMIT_AUTHENTICATED_MAX", Limit::authenticated(), window)?;

        Ok(Config {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url: optional("DATABASE_URL"),
            database_max_connections,
            auth: AuthConfig {
                auth0_domain: optional("AUTH0_DOMAIN"),
                auth0_audience: optional("AUTH0_AUDIENCE"),
                hs256_secret: optional("AUTH_HS256_SECRET"),
            },
            cloudinary,
            road_network_path: optional("ROAD_NETWORK_PATH").map(PathBuf::from),
            public_rate_limit,
            authenticated_rate_limit,
        })
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .wrap_err_with(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

fn limit_from_env(name: &str, default: Limit, window: Option<Duration>) -> Result<Limit> {
    let max_requests = optional(name)
        .map(|n| n.parse::<usize>().wrap_err_with(|| format!("{name} must be a number")))
        .transpose()?
        .unwrap_or(default.max_requests);
    Ok(Limit {
        max_requests,
        window: window.unwrap_or(default.window),
    })
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or(eyre!("{name} must be set"))
}
